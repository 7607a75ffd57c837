use thiserror::Error;

use crate::amount::AmountError;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures that abort one block's purchase decision.
///
/// None of these touch the purchaser's period counters; those only move after
/// a confirmed submission.
#[derive(Error, Debug)]
pub enum PurchaseError {
    #[error("{op} failed: {source}")]
    Collaborator {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{op} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        op: &'static str,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("not enough data: {0}")]
    NotEnoughData(&'static str),

    #[error("invalid amount for {what}: {source}")]
    InvalidAmount {
        what: &'static str,
        #[source]
        source: AmountError,
    },
}

impl PurchaseError {
    pub fn collaborator(op: &'static str, source: anyhow::Error) -> Self {
        Self::Collaborator {
            op,
            source: source.into(),
        }
    }

    pub fn invalid_amount(what: &'static str, source: AmountError) -> Self {
        Self::InvalidAmount { what, source }
    }
}
