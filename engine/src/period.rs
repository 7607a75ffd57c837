//! Difficulty-period bookkeeping.
//!
//! A period is `period_size` consecutive blocks sharing one stake difficulty.
//! Block `h` belongs to period `h / period_size` at offset `h % period_size`.
//! The first block of a new period is the transition point: the per-period
//! quota is recomputed there and both counters start again from zero.

/// Purchaser state that lives for the whole process.
///
/// Owned and mutated only by the purchaser; there is no persistence, so a
/// restart starts from `first_run` again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaserState {
    /// True until the first block has been processed.
    pub first_run: bool,

    /// Index of the current difficulty period.
    pub window_period: u32,

    /// Offset of the last processed block within its period.
    pub idx_in_period: u32,

    /// Tickets intended for the current period.
    pub quota_this_period: i64,

    /// Tickets already bought in the current period.
    pub purchased_this_period: i64,

    /// The current period's quota has not been computed yet. Set on the first
    /// block and on every period transition; cleared only by `set_quota`, so a
    /// block that fails before the quota is computed leaves it pending.
    pub quota_pending: bool,
}

impl Default for PurchaserState {
    fn default() -> Self {
        Self {
            first_run: true,
            window_period: 0,
            idx_in_period: 0,
            quota_this_period: 0,
            purchased_this_period: 0,
            quota_pending: false,
        }
    }
}

/// What `advance` observed for one height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodUpdate {
    /// The period quota must be (re)computed for this block.
    pub fill_queue: bool,

    /// This was the very first block processed.
    pub first_run: bool,

    /// Number of periods the window moved forward (more than 1 after a
    /// disconnect that skipped whole periods).
    pub periods_advanced: u32,

    /// The height belongs to a period older than the stored one.
    pub stale: bool,
}

impl PurchaserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the period cursors to `height`.
    ///
    /// Idempotent for a repeated height. A height from an earlier period
    /// leaves the state untouched, so the window never moves backwards and a
    /// late duplicate cannot wipe the current period's progress.
    pub fn advance(&mut self, height: u32, period_size: u32) -> PeriodUpdate {
        let size = period_size.max(1);
        let window = height / size;
        let idx = height % size;

        if self.first_run {
            self.first_run = false;
            self.window_period = window;
            self.idx_in_period = idx;
            self.quota_pending = true;

            return PeriodUpdate {
                fill_queue: true,
                first_run: true,
                periods_advanced: 0,
                stale: false,
            };
        }

        if window < self.window_period {
            return PeriodUpdate {
                fill_queue: false,
                first_run: false,
                periods_advanced: 0,
                stale: true,
            };
        }

        let periods_advanced = window - self.window_period;
        if periods_advanced > 0 {
            self.quota_this_period = 0;
            self.purchased_this_period = 0;
            self.quota_pending = true;
        }

        self.window_period = window;
        self.idx_in_period = idx;

        PeriodUpdate {
            fill_queue: periods_advanced > 0,
            first_run: false,
            periods_advanced,
            stale: false,
        }
    }

    /// Tickets still to buy this period (never negative).
    pub fn remaining(&self) -> i64 {
        (self.quota_this_period - self.purchased_this_period).max(0)
    }

    pub fn set_quota(&mut self, quota: i64) {
        self.quota_this_period = quota.max(0);
        self.quota_pending = false;
    }

    /// Commits a confirmed purchase.
    ///
    /// A forced purchase (price-floor defense) may go past the quota; the quota
    /// is raised to match so `purchased <= quota` keeps holding.
    pub fn record_purchase(&mut self, bought: i64) {
        self.purchased_this_period += bought.max(0);
        if self.purchased_this_period > self.quota_this_period {
            self.quota_this_period = self.purchased_this_period;
        }
    }
}
