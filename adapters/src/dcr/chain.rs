use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use engine::amount::Amount;
use engine::chain::{
    ChainData, FeeSummary, PoolValue, StakeDifficulty, StakeStatus, TicketPurchaseRequest,
};

use super::client::RpcClient;
use super::poller::BestBlockSource;
use super::types::{
    BalanceResult, BestBlockResult, BlockHeaderResult, EstimateStakeDiffResult,
    StakeDifficultyResult, StakeInfoResult, TicketFeeInfoResult,
};

/// [`ChainData`] backed by a chain daemon and a wallet, each over JSON-RPC.
#[derive(Clone)]
pub struct DecredChain {
    daemon: RpcClient,
    wallet: RpcClient,
}

impl DecredChain {
    pub fn new(daemon: RpcClient, wallet: RpcClient) -> Self {
        Self { daemon, wallet }
    }

    pub async fn best_block(&self) -> anyhow::Result<BestBlockResult> {
        Ok(self.daemon.call("getbestblock", json!([])).await?)
    }

    async fn block_header_at(&self, height: u32) -> anyhow::Result<BlockHeaderResult> {
        let hash: String = self.daemon.call("getblockhash", json!([height])).await?;
        Ok(self
            .daemon
            .call("getblockheader", json!([hash, true]))
            .await?)
    }

    async fn ticket_fee_info(&self, blocks: u32, windows: u32) -> anyhow::Result<TicketFeeInfoResult> {
        Ok(self
            .daemon
            .call("ticketfeeinfo", json!([blocks, windows]))
            .await?)
    }
}

pub fn block_fee_summaries(info: &TicketFeeInfoResult) -> Vec<FeeSummary> {
    info.blocks
        .iter()
        .map(|b| FeeSummary {
            start_height: b.height,
            mean: b.mean,
            median: b.median,
        })
        .collect()
}

pub fn window_fee_summaries(info: &TicketFeeInfoResult) -> Vec<FeeSummary> {
    info.windows
        .iter()
        .map(|w| FeeSummary {
            start_height: w.start_height,
            mean: w.mean,
            median: w.median,
        })
        .collect()
}

/// Positional `purchaseticket` parameters. Unset pool settings are sent as
/// null so the expiry keeps its position.
pub fn purchase_params(req: &TicketPurchaseRequest) -> Value {
    let (pool_address, pool_fees) = match &req.pool {
        Some(pool) => (json!(pool.address), json!(pool.fee_percent)),
        None => (Value::Null, Value::Null),
    };

    json!([
        req.account,
        req.spend_limit.to_coin(),
        0,
        req.ticket_address,
        req.count,
        pool_address,
        pool_fees,
        req.expiry_height,
    ])
}

fn coin(v: f64, what: &'static str) -> anyhow::Result<Amount> {
    Amount::from_coin(v).with_context(|| format!("invalid {what} amount {v}"))
}

#[async_trait]
impl ChainData for DecredChain {
    async fn stake_status(&self) -> anyhow::Result<StakeStatus> {
        let info: StakeInfoResult = self.wallet.call("getstakeinfo", json!([])).await?;

        Ok(StakeStatus {
            ticket_price: info.difficulty,
            own_mempool_tickets: info.own_mempool_tix,
        })
    }

    async fn stake_difficulty(&self) -> anyhow::Result<StakeDifficulty> {
        let sd: StakeDifficultyResult = self.daemon.call("getstakedifficulty", json!([])).await?;

        Ok(StakeDifficulty {
            current: sd.current,
            next: sd.next,
        })
    }

    async fn estimate_next_difficulty(&self) -> anyhow::Result<f64> {
        let est: EstimateStakeDiffResult =
            self.daemon.call("estimatestakediff", json!([])).await?;
        Ok(est.expected)
    }

    async fn ticket_pool_value(&self) -> anyhow::Result<PoolValue> {
        let value: f64 = self.daemon.call("getticketpoolvalue", json!([])).await?;

        let best: String = self.daemon.call("getbestblockhash", json!([])).await?;
        let header: BlockHeaderResult = self
            .daemon
            .call("getblockheader", json!([best, true]))
            .await?;

        Ok(PoolValue {
            total_value: coin(value, "ticket pool value")?,
            pool_size: header.pool_size,
        })
    }

    async fn ticket_vwap(&self, lookback: u32) -> anyhow::Result<f64> {
        let best = self.best_block().await?;
        let start = best.height.saturating_sub(lookback);

        Ok(self
            .daemon
            .call("ticketvwap", json!([start, best.height]))
            .await?)
    }

    async fn block_fee_summaries(&self, blocks: u32) -> anyhow::Result<Vec<FeeSummary>> {
        let info = self.ticket_fee_info(blocks, 0).await?;
        Ok(block_fee_summaries(&info))
    }

    async fn window_fee_summaries(&self, windows: u32) -> anyhow::Result<Vec<FeeSummary>> {
        let info = self.ticket_fee_info(0, windows).await?;
        Ok(window_fee_summaries(&info))
    }

    async fn stake_difficulty_at(&self, height: u32) -> anyhow::Result<f64> {
        Ok(self.block_header_at(height).await?.sbits)
    }

    async fn spendable_balance(&self, account: &str) -> anyhow::Result<Amount> {
        let bal: BalanceResult = self.wallet.call("getbalance", json!([account, 0])).await?;

        let spendable = bal
            .spendable_for(account)
            .with_context(|| format!("wallet reported no balance for account {account}"))?;

        coin(spendable, "spendable balance")
    }

    async fn set_tx_fee(&self, fee: Amount) -> anyhow::Result<()> {
        let _: bool = self.wallet.call("settxfee", json!([fee.to_coin()])).await?;
        Ok(())
    }

    async fn set_ticket_fee(&self, fee: Amount) -> anyhow::Result<()> {
        let _: bool = self
            .wallet
            .call("setticketfee", json!([fee.to_coin()]))
            .await?;
        Ok(())
    }

    async fn change_address(&self, account: &str) -> anyhow::Result<String> {
        Ok(self
            .wallet
            .call("getrawchangeaddress", json!([account]))
            .await?)
    }

    async fn purchase_tickets(&self, req: TicketPurchaseRequest) -> anyhow::Result<Vec<String>> {
        let hashes: Vec<String> = self
            .wallet
            .call("purchaseticket", purchase_params(&req))
            .await?;

        debug!(count = hashes.len(), "wallet accepted ticket purchase");

        Ok(hashes)
    }
}

#[async_trait]
impl BestBlockSource for DecredChain {
    async fn best_block_height(&self) -> anyhow::Result<u32> {
        Ok(self.best_block().await?.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::chain::PoolFeeInfo;

    fn request(pool: Option<PoolFeeInfo>) -> TicketPurchaseRequest {
        TicketPurchaseRequest {
            account: "default".into(),
            spend_limit: Amount::from_coin(100.0).unwrap(),
            count: 3,
            ticket_address: "TsVoter".into(),
            pool,
            expiry_height: 116,
        }
    }

    #[test]
    fn purchase_params_keep_positions_without_pool() {
        let params = purchase_params(&request(None));

        assert_eq!(
            params,
            json!(["default", 100.0, 0, "TsVoter", 3, null, null, 116])
        );
    }

    #[test]
    fn purchase_params_carry_pool_fees() {
        let params = purchase_params(&request(Some(PoolFeeInfo {
            address: "TsPoolFee".into(),
            fee_percent: 7.5,
        })));

        assert_eq!(params[5], json!("TsPoolFee"));
        assert_eq!(params[6], json!(7.5));
        assert_eq!(params[7], json!(116));
    }

    #[test]
    fn fee_info_maps_to_summaries() {
        let info: TicketFeeInfoResult = serde_json::from_value(json!({
            "feeinfomempool": { "number": 0, "min": 0.0, "max": 0.0, "mean": 0.0, "median": 0.0, "stddev": 0.0 },
            "feeinfoblocks": [
                { "height": 500, "number": 4, "min": 0.01, "max": 0.05, "mean": 0.02, "median": 0.015, "stddev": 0.01 }
            ],
            "feeinfowindows": [
                { "startheight": 432, "endheight": 501, "number": 20, "min": 0.01, "max": 0.1, "mean": 0.03, "median": 0.02, "stddev": 0.01 }
            ]
        }))
        .unwrap();

        assert_eq!(
            block_fee_summaries(&info),
            vec![FeeSummary {
                start_height: 500,
                mean: 0.02,
                median: 0.015
            }]
        );
        assert_eq!(window_fee_summaries(&info)[0].start_height, 432);
    }
}
