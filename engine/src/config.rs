use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

use crate::address::{self, AddressError};
use crate::amount::{Amount, AmountError};

/// How the average ticket price is derived when no explicit target is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AvgPriceMode {
    /// Volume-weighted average price only.
    Vwap,
    /// Ticket pool value divided by pool size only.
    Pool,
    /// Mean of the two above.
    #[default]
    Dual,
}

/// Which per-block fee statistic feeds the fee estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FeeSource {
    #[default]
    Mean,
    Median,
}

/// Network the daemon and wallet run on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Simnet,
}

impl Network {
    /// Number of blocks in one stake difficulty period.
    pub fn period_size(self) -> u32 {
        match self {
            Network::Mainnet | Network::Testnet => 144,
            Network::Simnet => 8,
        }
    }

    pub fn daemon_rpc_port(self) -> u16 {
        match self {
            Network::Mainnet => 9109,
            Network::Testnet => 19109,
            Network::Simnet => 19556,
        }
    }

    pub fn wallet_rpc_port(self) -> u16 {
        match self {
            Network::Mainnet => 9110,
            Network::Testnet => 19110,
            Network::Simnet => 19557,
        }
    }
}

/// Bounded retry with a constant delay between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("pool address is set but pool fees are unset or 0.00%")]
    PoolFeesUnset,

    #[error("min fee {min} is greater than max fee {max}")]
    FeeBounds { min: f64, max: f64 },

    #[error("{field} must be at least 1")]
    ZeroValue { field: &'static str },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("high price penalty must be greater than 1.0 (got {0})")]
    PenaltyTooLow(f64),

    #[error("invalid {field} {address:?}: {source}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("invalid amount for {field}: {source}")]
    InvalidAmount {
        field: &'static str,
        #[source]
        source: AmountError,
    },
}

/// Everything the purchaser needs to decide and place a ticket order.
///
/// Coin-denominated values are plain `f64` coins; they are converted to
/// [`Amount`] at the collaborator boundary.
#[derive(Clone, Debug)]
pub struct BuyerConfig {
    // =========================
    // Account & destinations
    // =========================
    /// Wallet account tickets are bought from.
    pub account_name: String,

    /// Address receiving voting rights. When unset a fresh change address is
    /// requested from the wallet for every order.
    pub ticket_address: Option<String>,

    /// Stake pool fee address. Requires `pool_fees > 0`.
    pub pool_address: Option<String>,

    /// Stake pool fee rate, as a percentage (0.01 to 100.00).
    pub pool_fees: f64,

    // =========================
    // Price policy
    // =========================
    /// Absolute maximum ticket price. Purchasing stops for the block when the
    /// next stake difficulty is above it. Also used as the purchase spend
    /// limit. 0 disables.
    pub max_price_absolute: f64,

    /// Multiplier over the average price that the price should not be pushed
    /// above. Caps the target price and gates purchasing on the estimated
    /// next-period difficulty. 0 disables.
    pub max_price_scale: f64,

    /// Multiplier under the average price that the price should not drop
    /// below. When the estimated next-period difficulty falls under it, the
    /// purchaser buys a full block's worth regardless of backlog. 0 disables.
    pub min_price_scale: f64,

    /// Explicit price to steer towards instead of the average price. 0 disables.
    pub price_target: f64,

    /// How the average price is computed.
    pub avg_price_mode: AvgPriceMode,

    /// Number of blocks back from the tip used for the VWAP.
    pub avg_price_vwap_delta: u32,

    /// Base of the exponential decay applied to the period quota when the
    /// price is above target. Must be > 1.
    pub high_price_penalty: f64,

    // =========================
    // Fee policy
    // =========================
    /// Upper bound on the ticket fee per kB.
    pub max_fee: f64,

    /// Lower bound on the ticket fee per kB.
    pub min_fee: f64,

    /// Which per-block statistic to average.
    pub fee_source: FeeSource,

    /// Regular transaction fee per kB, applied once at startup.
    pub tx_fee: f64,

    /// Multiplier applied to the estimated fee, e.g. 1.05 = 105%.
    pub fee_target_scaling: f64,

    /// Number of recent blocks averaged for the fee. Until this many blocks
    /// have elapsed in the current period, the closest historical window is
    /// used instead.
    pub blocks_to_avg: u32,

    /// Number of historical windows searched by the fallback.
    pub windows_to_consider: u32,

    // =========================
    // Order sizing
    // =========================
    /// Tickets per block. Negative N buys one ticket every |N| blocks;
    /// 0 disables purchasing.
    pub max_per_block: i32,

    /// Spendable balance that must remain after an order.
    pub balance_to_maintain: f64,

    /// Keep buying while own tickets are still in the mempool.
    pub dont_wait_for_tickets: bool,

    /// Own mempool tickets tolerated before further purchases are held back.
    pub max_in_mempool: u32,

    /// Blocks after the current height at which an unmined order expires.
    pub expiry_delta: u32,

    // =========================
    // Chain & collaborators
    // =========================
    /// Network the configured addresses must belong to.
    pub network: Network,

    /// Blocks per difficulty period.
    pub period_size: u32,

    /// Retry policy for the stake status fetch, which lags the tip while the
    /// wallet syncs the newest block.
    pub stake_info_retry: RetryPolicy,
}

impl Default for BuyerConfig {
    fn default() -> Self {
        Self {
            account_name: "default".to_string(),
            ticket_address: None,
            pool_address: None,
            pool_fees: 0.0,

            max_price_absolute: 100.0,
            max_price_scale: 2.0,
            min_price_scale: 0.7,
            price_target: 0.0,
            avg_price_mode: AvgPriceMode::Dual,
            avg_price_vwap_delta: 2880,
            high_price_penalty: 1.3,

            max_fee: 1.0,
            min_fee: 0.01,
            fee_source: FeeSource::Mean,
            tx_fee: 0.01,
            fee_target_scaling: 1.05,
            blocks_to_avg: 11,
            windows_to_consider: 10,

            max_per_block: 3,
            balance_to_maintain: 0.0,
            dont_wait_for_tickets: false,
            max_in_mempool: 0,
            expiry_delta: 16,

            network: Network::Mainnet,
            period_size: Network::Mainnet.period_size(),
            stake_info_retry: RetryPolicy::default(),
        }
    }
}

impl BuyerConfig {
    /// Rejects configurations that would make every decision fail or
    /// misbehave. Called once at startup; errors are fatal there.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_address.is_some() && self.pool_fees == 0.0 {
            return Err(ConfigError::PoolFeesUnset);
        }

        for (field, addr) in [
            ("ticket address", &self.ticket_address),
            ("pool address", &self.pool_address),
        ] {
            if let Some(addr) = addr {
                address::check_address(addr, self.network).map_err(|source| {
                    ConfigError::InvalidAddress {
                        field,
                        address: addr.clone(),
                        source,
                    }
                })?;
            }
        }

        for (field, value) in [
            ("max_fee", self.max_fee),
            ("min_fee", self.min_fee),
            ("tx_fee", self.tx_fee),
            ("pool_fees", self.pool_fees),
            ("max_price_absolute", self.max_price_absolute),
            ("max_price_scale", self.max_price_scale),
            ("min_price_scale", self.min_price_scale),
            ("price_target", self.price_target),
            ("balance_to_maintain", self.balance_to_maintain),
            ("fee_target_scaling", self.fee_target_scaling),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }

        if self.min_fee > self.max_fee {
            return Err(ConfigError::FeeBounds {
                min: self.min_fee,
                max: self.max_fee,
            });
        }

        for (field, value) in [
            ("max_fee", self.max_fee),
            ("min_fee", self.min_fee),
            ("tx_fee", self.tx_fee),
            ("max_price_absolute", self.max_price_absolute),
        ] {
            Amount::from_coin(value)
                .map_err(|source| ConfigError::InvalidAmount { field, source })?;
        }

        for (field, value) in [
            ("blocks_to_avg", self.blocks_to_avg),
            ("windows_to_consider", self.windows_to_consider),
            ("period_size", self.period_size),
            ("stake_info_retry.max_attempts", self.stake_info_retry.max_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }

        if !(self.high_price_penalty > 1.0) {
            return Err(ConfigError::PenaltyTooLow(self.high_price_penalty));
        }

        Ok(())
    }

    /// Whether purchases are held back while own tickets sit in the mempool.
    pub fn waits_for_mempool(&self) -> bool {
        !self.dont_wait_for_tickets
    }
}
