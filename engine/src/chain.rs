//! Read and write operations the purchaser needs from the chain daemon and the
//! wallet. Implementations live outside this crate.

use async_trait::async_trait;

use crate::amount::Amount;

/// Wallet view of the stake state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StakeStatus {
    /// Current ticket price in coins.
    pub ticket_price: f64,
    /// Own tickets submitted but not yet mined.
    pub own_mempool_tickets: u32,
}

/// Stake difficulty of the current and the next block, in coins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StakeDifficulty {
    pub current: f64,
    pub next: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolValue {
    pub total_value: Amount,
    pub pool_size: u32,
}

/// Fee statistics for one block or one difficulty window, in coins per kB.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeeSummary {
    /// Block height, or the first height of the window.
    pub start_height: u32,
    pub mean: f64,
    pub median: f64,
}

/// Stake pool fee routing attached to a purchase.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolFeeInfo {
    pub address: String,
    /// Percentage, 0.01 to 100.00.
    pub fee_percent: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TicketPurchaseRequest {
    pub account: String,
    pub spend_limit: Amount,
    pub count: u32,
    pub ticket_address: String,
    pub pool: Option<PoolFeeInfo>,
    pub expiry_height: u32,
}

/// Abstraction over the daemon and wallet RPC services.
///
/// Implementations hide transport, authentication and wire formats; errors
/// are reported as `anyhow::Error` and classified by the caller.
#[async_trait]
pub trait ChainData: Send + Sync {
    async fn stake_status(&self) -> anyhow::Result<StakeStatus>;

    async fn stake_difficulty(&self) -> anyhow::Result<StakeDifficulty>;

    /// Expected stake difficulty of the next period.
    async fn estimate_next_difficulty(&self) -> anyhow::Result<f64>;

    async fn ticket_pool_value(&self) -> anyhow::Result<PoolValue>;

    /// Volume-weighted average ticket price over the last `lookback` blocks.
    async fn ticket_vwap(&self, lookback: u32) -> anyhow::Result<f64>;

    /// Fee summaries of the last `blocks` blocks.
    async fn block_fee_summaries(&self, blocks: u32) -> anyhow::Result<Vec<FeeSummary>>;

    /// Fee summaries of the last `windows` difficulty windows.
    async fn window_fee_summaries(&self, windows: u32) -> anyhow::Result<Vec<FeeSummary>>;

    /// Stake difficulty that was in force at `height`.
    async fn stake_difficulty_at(&self, height: u32) -> anyhow::Result<f64>;

    async fn spendable_balance(&self, account: &str) -> anyhow::Result<Amount>;

    async fn set_tx_fee(&self, fee: Amount) -> anyhow::Result<()>;

    async fn set_ticket_fee(&self, fee: Amount) -> anyhow::Result<()>;

    async fn change_address(&self, account: &str) -> anyhow::Result<String>;

    /// Submits the order and returns the ids of the tickets created.
    async fn purchase_tickets(&self, req: TicketPurchaseRequest) -> anyhow::Result<Vec<String>>;
}
