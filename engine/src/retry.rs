//! Fixed-delay retry for collaborator calls that may briefly lag the chain tip.

use std::future::Future;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::PurchaseError;

/// Runs `operation` until it succeeds or `policy.max_attempts` attempts have
/// failed, sleeping `policy.delay` between attempts.
pub async fn retry_fixed<F, Fut, T>(
    policy: &RetryPolicy,
    op: &'static str,
    mut operation: F,
) -> Result<T, PurchaseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(out) => return Ok(out),
            Err(err) if attempt >= attempts => {
                warn!(op, attempts, error = %err, "giving up after final attempt");
                return Err(PurchaseError::RetriesExhausted {
                    op,
                    attempts,
                    source: err.into(),
                });
            }
            Err(err) => {
                debug!(op, attempt, error = %err, "attempt failed; retrying");
                sleep(policy.delay).await;
            }
        }
    }
}
