//! Decred daemon and wallet bindings over JSON-RPC.

pub mod chain;
pub mod client;
pub mod errors;
pub mod poller;
pub mod types;

pub use chain::DecredChain;
pub use client::{RpcClient, RpcEndpoint};
pub use errors::RpcError;
pub use poller::{BestBlockSource, run_block_poller};
