//! Order sizing for one block.
//!
//! Turns the period's remaining quota into a ticket count the per-block cap
//! allows and the spendable balance can pay for.

use tracing::{debug, instrument};

use crate::types::SkipReason;

/// Per-block cap decoded from the signed `max_per_block` setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerBlockCap {
    /// 0: never buy.
    Disabled,
    /// N > 0: at most N tickets per block.
    Literal(i64),
    /// N < 0: exactly one ticket on blocks where `height % |N| == 0`.
    OneEvery(u32),
}

impl PerBlockCap {
    pub fn from_setting(max_per_block: i32) -> Self {
        match max_per_block {
            0 => PerBlockCap::Disabled,
            n if n > 0 => PerBlockCap::Literal(i64::from(n)),
            n => PerBlockCap::OneEvery(n.unsigned_abs()),
        }
    }

    /// Effective cap for `height`, or why nothing may be bought there.
    pub fn resolve(self, height: u32) -> Result<i64, SkipReason> {
        match self {
            PerBlockCap::Disabled => Err(SkipReason::PurchasingDisabled),
            PerBlockCap::Literal(n) => Ok(n),
            PerBlockCap::OneEvery(every) if height % every == 0 => Ok(1),
            PerBlockCap::OneEvery(_) => Err(SkipReason::NotScheduledThisBlock),
        }
    }
}

/// Mempool backlog throttle settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BacklogPolicy {
    pub enabled: bool,
    pub max_in_mempool: u32,
}

impl BacklogPolicy {
    /// Whether `own_mempool` pending tickets should hold back further buying.
    /// No partial reduction: either the block buys normally or not at all.
    pub fn blocks(&self, own_mempool: u32) -> bool {
        self.enabled && own_mempool > self.max_in_mempool
    }
}

/// Inputs for sizing one block's order.
#[derive(Clone, Copy, Debug)]
pub struct SizingInputs {
    pub height: u32,
    /// `quota_this_period - purchased_this_period`.
    pub remaining: i64,
    pub cap: PerBlockCap,
    pub own_mempool: u32,
    pub backlog: BacklogPolicy,
    pub spendable: f64,
    pub balance_to_maintain: f64,
    pub ticket_price: f64,
    /// Price-floor defense is active for this block.
    pub floor_defense: bool,
}

/// Converts the remaining period quota into a bounded order for this block.
///
/// Order of checks:
/// 1. per-block cap (disabled / off-schedule blocks skip outright)
/// 2. `want = min(remaining, cap)`; floor defense forces `want = cap`
/// 3. nothing left to buy => quota exhausted
/// 4. mempool backlog above threshold => skip
/// 5. shrink `want` until the balance to maintain is preserved
///
/// Returns the ticket count to order (always > 0) or the skip reason.
#[instrument(
    target = "sizing",
    level = "debug",
    skip(inputs),
    fields(height = inputs.height, remaining = inputs.remaining)
)]
pub fn size_order(inputs: &SizingInputs) -> Result<u32, SkipReason> {
    let cap = inputs.cap.resolve(inputs.height)?;

    let mut want = inputs.remaining.min(cap);

    if inputs.floor_defense {
        debug!(
            cap,
            own_mempool = inputs.own_mempool,
            "price below scaled floor; buying full per-block cap"
        );
        want = cap;
    } else {
        if want <= 0 {
            debug!("all tickets for this period have been purchased");
            return Err(SkipReason::QuotaExhausted);
        }

        if inputs.backlog.blocks(inputs.own_mempool) {
            debug!(
                own_mempool = inputs.own_mempool,
                max_in_mempool = inputs.backlog.max_in_mempool,
                "waiting for own tickets to leave the mempool"
            );
            return Err(SkipReason::MempoolBacklog);
        }
    }

    let affordable = affordable_want(
        want,
        inputs.spendable,
        inputs.ticket_price,
        inputs.balance_to_maintain,
    );

    if affordable <= 0 {
        debug!(
            spendable = inputs.spendable,
            ticket_price = inputs.ticket_price,
            balance_to_maintain = inputs.balance_to_maintain,
            "cannot afford a ticket while keeping the balance to maintain"
        );
        return Err(SkipReason::InsufficientBalance);
    }

    if affordable < want {
        debug!(want, affordable, "order reduced to preserve balance");
    }

    Ok(u32::try_from(affordable).unwrap_or(u32::MAX))
}

/// Decrements `want` until `spendable - want * price >= balance_to_maintain`
/// or `want` reaches 0.
pub fn affordable_want(mut want: i64, spendable: f64, price: f64, balance_to_maintain: f64) -> i64 {
    while want > 0 && spendable - want as f64 * price < balance_to_maintain {
        want -= 1;
    }
    want.max(0)
}
