pub mod init;
pub mod spans;
pub mod trace_id;
