use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::SkipReason;

/// Minimal counters for operational visibility.
#[derive(Clone, Default, Debug)]
pub struct Counters {
    pub blocks_seen: Arc<AtomicU64>,
    pub purchases: Arc<AtomicU64>,
    pub tickets_purchased: Arc<AtomicU64>,
    pub failures: Arc<AtomicU64>,

    // skip reasons
    pub skip_absolute_ceiling: Arc<AtomicU64>,
    pub skip_scaled_ceiling: Arc<AtomicU64>,
    pub skip_backlog: Arc<AtomicU64>,
    pub skip_quota: Arc<AtomicU64>,
    pub skip_disabled: Arc<AtomicU64>,
    pub skip_not_scheduled: Arc<AtomicU64>,
    pub skip_balance: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub blocks_seen: u64,
    pub purchases: u64,
    pub tickets_purchased: u64,
    pub failures: u64,
    pub skipped: u64,
}

impl Counters {
    pub fn record_skip(&self, reason: SkipReason) {
        let c = match reason {
            SkipReason::PriceAboveAbsoluteCeiling => &self.skip_absolute_ceiling,
            SkipReason::PriceAboveScaledCeiling => &self.skip_scaled_ceiling,
            SkipReason::MempoolBacklog => &self.skip_backlog,
            SkipReason::QuotaExhausted => &self.skip_quota,
            SkipReason::PurchasingDisabled => &self.skip_disabled,
            SkipReason::NotScheduledThisBlock => &self.skip_not_scheduled,
            SkipReason::InsufficientBalance => &self.skip_balance,
        };
        c.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purchase(&self, tickets: u64) {
        self.purchases.fetch_add(1, Ordering::Relaxed);
        self.tickets_purchased.fetch_add(tickets, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let skipped = [
            &self.skip_absolute_ceiling,
            &self.skip_scaled_ceiling,
            &self.skip_backlog,
            &self.skip_quota,
            &self.skip_disabled,
            &self.skip_not_scheduled,
            &self.skip_balance,
        ]
        .iter()
        .map(|c| c.load(Ordering::Relaxed))
        .sum();

        CountersSnapshot {
            blocks_seen: self.blocks_seen.load(Ordering::Relaxed),
            purchases: self.purchases.load(Ordering::Relaxed),
            tickets_purchased: self.tickets_purchased.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped,
        }
    }
}
