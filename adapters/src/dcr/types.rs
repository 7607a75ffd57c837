//! Wire shapes of the daemon and wallet JSON-RPC results.
//!
//! Only the fields the purchaser reads are declared; serde ignores the rest.

use serde::Deserialize;

use super::errors::RpcError;

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl<T> RpcResponse<T> {
    pub fn into_result(self, method: &'static str) -> Result<T, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc {
                method,
                code: err.code,
                message: err.message,
            });
        }

        self.result.ok_or(RpcError::MissingResult { method })
    }
}

/// `getstakeinfo`
#[derive(Debug, Deserialize)]
pub struct StakeInfoResult {
    /// Current ticket price.
    pub difficulty: f64,
    #[serde(rename = "ownmempooltix")]
    pub own_mempool_tix: u32,
}

/// `getstakedifficulty`
#[derive(Debug, Deserialize)]
pub struct StakeDifficultyResult {
    pub current: f64,
    pub next: f64,
}

/// `estimatestakediff`
#[derive(Debug, Deserialize)]
pub struct EstimateStakeDiffResult {
    pub expected: f64,
}

/// `getblockheader <hash> true`
#[derive(Debug, Deserialize)]
pub struct BlockHeaderResult {
    /// Stake difficulty in force for this block.
    pub sbits: f64,
    #[serde(rename = "poolsize")]
    pub pool_size: u32,
}

/// `getbestblock`
#[derive(Debug, Deserialize)]
pub struct BestBlockResult {
    pub height: u32,
}

/// `ticketfeeinfo`
#[derive(Debug, Default, Deserialize)]
pub struct TicketFeeInfoResult {
    #[serde(rename = "feeinfoblocks", default)]
    pub blocks: Vec<FeeInfoBlock>,
    #[serde(rename = "feeinfowindows", default)]
    pub windows: Vec<FeeInfoWindow>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeeInfoBlock {
    pub height: u32,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeeInfoWindow {
    #[serde(rename = "startheight")]
    pub start_height: u32,
    pub mean: f64,
    pub median: f64,
}

/// `getbalance <account> 0`
#[derive(Debug, Deserialize)]
pub struct BalanceResult {
    pub balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
pub struct AccountBalance {
    #[serde(rename = "accountname")]
    pub account_name: String,
    pub spendable: f64,
}

impl BalanceResult {
    pub fn spendable_for(&self, account: &str) -> Option<f64> {
        self.balances
            .iter()
            .find(|b| b.account_name == account)
            .map(|b| b.spendable)
    }
}
