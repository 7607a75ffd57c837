pub mod logger;

pub use logger::init::{LogFormat, init_logger};
pub use logger::spans::{block_span, warn_if_slow};
pub use logger::trace_id::TraceId;
