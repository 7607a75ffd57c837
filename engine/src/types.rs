use std::fmt;

use crate::amount::Amount;

/// Deliberate reasons for not buying in a block. None of these are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Next stake difficulty is above the absolute price ceiling.
    PriceAboveAbsoluteCeiling,
    /// Estimated next-period difficulty is above the scaled ceiling.
    PriceAboveScaledCeiling,
    /// Own tickets are still waiting in the mempool.
    MempoolBacklog,
    /// The period quota has been bought.
    QuotaExhausted,
    /// Per-block cap is 0.
    PurchasingDisabled,
    /// Negative per-block cap and this height is not on the schedule.
    NotScheduledThisBlock,
    /// Buying even one ticket would leave less than the balance to maintain.
    InsufficientBalance,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::PriceAboveAbsoluteCeiling => "price above absolute ceiling",
            SkipReason::PriceAboveScaledCeiling => "price above scaled ceiling",
            SkipReason::MempoolBacklog => "mempool backlog",
            SkipReason::QuotaExhausted => "quota exhausted",
            SkipReason::PurchasingDisabled => "purchasing disabled",
            SkipReason::NotScheduledThisBlock => "not scheduled this block",
            SkipReason::InsufficientBalance => "insufficient balance",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order placed for one block.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderDecision {
    pub count_to_buy: u32,
    pub fee_to_use: Amount,
    pub target_address: String,
    pub expiry_height: u32,
}

/// Result of a successful `purchase` call.
#[derive(Clone, Debug, PartialEq)]
pub enum PurchaseOutcome {
    Purchased {
        decision: OrderDecision,
        tickets: Vec<String>,
    },
    Skipped(SkipReason),
}

impl PurchaseOutcome {
    pub fn tickets_bought(&self) -> usize {
        match self {
            PurchaseOutcome::Purchased { tickets, .. } => tickets.len(),
            PurchaseOutcome::Skipped(_) => 0,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            PurchaseOutcome::Skipped(r) => Some(*r),
            PurchaseOutcome::Purchased { .. } => None,
        }
    }
}
