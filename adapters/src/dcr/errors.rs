use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} rejected the RPC credentials")]
    Unauthorized { service: &'static str },

    #[error("{method} returned error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("{method} returned no result")]
    MissingResult { method: &'static str },

    #[error("invalid response from {method}: {reason}")]
    InvalidResponse {
        method: &'static str,
        reason: String,
    },

    #[error("failed to read certificate {path}: {source}")]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
