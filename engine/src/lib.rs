//! Ticket purchase decision engine.
//!
//! Once per connected block the [`purchaser::TicketPurchaser`] decides how many
//! tickets to buy, at what fee, and whether to buy at all. Chain and wallet
//! access goes through the [`chain::ChainData`] trait.

pub mod address;
pub mod amount;
pub mod chain;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fees;
pub mod metrics;
pub mod period;
pub mod pricing;
pub mod purchaser;
pub mod retry;
pub mod sizing;
pub mod types;
