//! Serializes block-connected notifications into purchase decisions.
//!
//! Heights arrive on a bounded channel and are handled strictly one at a
//! time; a new height waits until the previous decision has finished.

use std::sync::atomic::Ordering;

use common::{TraceId, block_span};
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, error, info, warn};

use crate::chain::ChainData;
use crate::purchaser::TicketPurchaser;
use crate::types::PurchaseOutcome;

pub type BlockSender = mpsc::Sender<u32>;
pub type BlockReceiver = mpsc::Receiver<u32>;

/// Channel carrying connected block heights to the dispatcher.
pub fn block_channel(capacity: usize) -> (BlockSender, BlockReceiver) {
    mpsc::channel(capacity.max(1))
}

pub struct BlockDispatcher<C: ChainData> {
    purchaser: TicketPurchaser<C>,
    rx: BlockReceiver,
    shutdown: watch::Receiver<bool>,
}

impl<C: ChainData> BlockDispatcher<C> {
    pub fn new(
        purchaser: TicketPurchaser<C>,
        rx: BlockReceiver,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            purchaser,
            rx,
            shutdown,
        }
    }

    /// Runs until shutdown is signalled (or its sender dropped) or the block
    /// channel closes. A decision in progress always runs to completion.
    ///
    /// Returns the purchaser so callers can inspect its final state.
    pub async fn run(mut self) -> TicketPurchaser<C> {
        info!(
            component = "dispatcher",
            event = "startup",
            "block dispatcher started"
        );

        loop {
            if *self.shutdown.borrow() {
                info!(component = "dispatcher", event = "shutdown", "shutdown requested");
                break;
            }

            let height = tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        warn!(component = "dispatcher", "shutdown sender dropped; stopping");
                        break;
                    }
                    continue;
                }

                next = self.rx.recv() => match next {
                    Some(height) => height,
                    None => {
                        warn!(component = "dispatcher", event = "shutdown", "block channel closed");
                        break;
                    }
                },
            };

            self.handle(height).await;
        }

        self.purchaser
    }

    async fn handle(&mut self, height: u32) {
        let trace_id = TraceId::new();
        let span = block_span(height, &trace_id);

        info!(parent: &span, "block connected");

        match self.purchaser.purchase(height).instrument(span.clone()).await {
            Ok(PurchaseOutcome::Purchased { tickets, .. }) => {
                span.record("outcome", "purchased");
                info!(parent: &span, tickets = tickets.len(), "purchase round complete");
            }
            Ok(PurchaseOutcome::Skipped(reason)) => {
                span.record("outcome", reason.as_str());
            }
            Err(e) => {
                self.purchaser
                    .counters()
                    .failures
                    .fetch_add(1, Ordering::Relaxed);
                span.record("outcome", "failed");
                error!(parent: &span, error = %e, "failed to purchase tickets this round");
            }
        }
    }
}
