//! Best-block poller.
//!
//! Polls the daemon for its best block height and feeds every newly
//! connected height into the dispatcher's block channel.
//!
//! Data flow:
//! Daemon → Poller → BlockSender → BlockDispatcher

use std::time::Duration;

use async_trait::async_trait;
use engine::dispatcher::BlockSender;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Anything that can report the current chain tip height.
#[async_trait]
pub trait BestBlockSource: Send + Sync {
    async fn best_block_height(&self) -> anyhow::Result<u32>;
}

/// Heights to announce after observing `tip`, given the last announced one.
///
/// The first observation only sets the baseline. A tip at or below the last
/// announced height (no new block, or a reorg) announces nothing.
pub fn new_heights(last: Option<u32>, tip: u32) -> std::ops::RangeInclusive<u32> {
    match last {
        Some(last) if tip > last => (last + 1)..=tip,
        _ => 1..=0,
    }
}

/// Runs until shutdown is signalled or the block channel closes.
///
/// Polling errors are logged and retried on the next tick.
pub async fn run_block_poller<S: BestBlockSource + ?Sized>(
    source: &S,
    poll_every: Duration,
    tx: BlockSender,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        every_ms = poll_every.as_millis() as u64,
        "best block poller started"
    );

    let mut last: Option<u32> = None;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("best block poller stopping");
                    return;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let tip = match source.best_block_height().await {
            Ok(tip) => tip,
            Err(e) => {
                warn!(error = %e, "failed to fetch best block");
                continue;
            }
        };

        match last {
            None => info!(height = tip, "synced to chain tip"),
            Some(l) if tip < l => warn!(height = tip, last = l, "chain tip moved backwards"),
            Some(_) => {}
        }

        for height in new_heights(last, tip) {
            debug!(height, "block connected");
            if tx.send(height).await.is_err() {
                warn!("block channel closed; poller exiting");
                return;
            }
        }

        // After a reorg the rebuilt heights are announced again.
        last = Some(tip);
    }
}
