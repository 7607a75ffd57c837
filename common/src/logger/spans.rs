use std::time::Duration;

use tracing::{Span, field};

use super::trace_id::TraceId;

/// Root span for one block's purchase decision.
///
/// `outcome` is left empty and recorded by the dispatcher once the decision
/// is known.
pub fn block_span(height: u32, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "block",
        height = height,
        trace_id = %trace_id,
        outcome = field::Empty
    )
}

/// Awaits `fut` and emits a warning under the `performance` target when it
/// takes longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = tokio::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
