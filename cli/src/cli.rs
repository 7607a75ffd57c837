use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use adapters::dcr::RpcEndpoint;
use engine::config::{AvgPriceMode, BuyerConfig, FeeSource, Network, RetryPolicy};

#[derive(Debug, Parser)]
#[command(name = "ticketbuyer", version, about = "Automated stake ticket purchaser")]
pub struct Cli {
    // =========================
    // Network & RPC
    // =========================
    /// Network the daemon and wallet run on
    #[arg(long, value_enum, env = "TICKETBUYER_NETWORK", default_value_t = Network::Mainnet)]
    pub network: Network,

    /// Daemon RPC host:port (defaults to localhost and the network's port)
    #[arg(long, env = "TICKETBUYER_DCRD_SERV")]
    pub dcrd_serv: Option<String>,

    /// Daemon RPC user name
    #[arg(long, env = "TICKETBUYER_DCRD_USER", default_value = "")]
    pub dcrd_user: String,

    /// Daemon RPC password
    #[arg(long, env = "TICKETBUYER_DCRD_PASS", default_value = "", hide_env_values = true)]
    pub dcrd_pass: String,

    /// Daemon RPC certificate (PEM)
    #[arg(long, env = "TICKETBUYER_DCRD_CERT")]
    pub dcrd_cert: Option<PathBuf>,

    /// Wallet RPC host:port (defaults to localhost and the network's port)
    #[arg(long, env = "TICKETBUYER_DCRW_SERV")]
    pub dcrw_serv: Option<String>,

    /// Wallet RPC user name
    #[arg(long, env = "TICKETBUYER_DCRW_USER", default_value = "")]
    pub dcrw_user: String,

    /// Wallet RPC password
    #[arg(long, env = "TICKETBUYER_DCRW_PASS", default_value = "", hide_env_values = true)]
    pub dcrw_pass: String,

    /// Wallet RPC certificate (PEM)
    #[arg(long, env = "TICKETBUYER_DCRW_CERT")]
    pub dcrw_cert: Option<PathBuf>,

    /// Disable TLS for the RPC clients (localhost only)
    #[arg(long = "noclienttls", env = "TICKETBUYER_NO_CLIENT_TLS")]
    pub no_client_tls: bool,

    /// Seconds between best block polls
    #[arg(long, env = "TICKETBUYER_POLL_SECS", default_value_t = 5)]
    pub poll_secs: u64,

    // =========================
    // Logging
    // =========================
    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "TICKETBUYER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "TICKETBUYER_LOG_JSON")]
    pub log_json: bool,

    // =========================
    // Purchasing
    // =========================
    /// Account to buy tickets from
    #[arg(long, env = "TICKETBUYER_ACCOUNT_NAME", default_value = "default")]
    pub account_name: String,

    /// Address to give ticket voting rights to
    #[arg(long, env = "TICKETBUYER_TICKET_ADDRESS")]
    pub ticket_address: Option<String>,

    /// Address to give pool fee rights to
    #[arg(long, env = "TICKETBUYER_POOL_ADDRESS")]
    pub pool_address: Option<String>,

    /// Pool fee rate as a percentage (0.01 to 100.00)
    #[arg(long, env = "TICKETBUYER_POOL_FEES", default_value_t = 0.0)]
    pub pool_fees: f64,

    /// Absolute maximum ticket price; also the spend limit (0 disables)
    #[arg(long, env = "TICKETBUYER_MAX_PRICE_ABSOLUTE", default_value_t = 100.0)]
    pub max_price_absolute: f64,

    /// Do not push the price above this multiple of the average (0 disables)
    #[arg(long, env = "TICKETBUYER_MAX_PRICE_SCALE", default_value_t = 2.0)]
    pub max_price_scale: f64,

    /// Defend the price from dropping below this multiple of the average (0 disables)
    #[arg(long, env = "TICKETBUYER_MIN_PRICE_SCALE", default_value_t = 0.7)]
    pub min_price_scale: f64,

    /// Price to steer towards instead of the average (0 disables)
    #[arg(long, env = "TICKETBUYER_PRICE_TARGET", default_value_t = 0.0)]
    pub price_target: f64,

    /// How the average price is computed
    #[arg(long, value_enum, env = "TICKETBUYER_AVG_PRICE_MODE", default_value_t = AvgPriceMode::Dual)]
    pub avg_price_mode: AvgPriceMode,

    /// Blocks back from the tip used for the VWAP
    #[arg(long, env = "TICKETBUYER_AVG_PRICE_VWAP_DELTA", default_value_t = 2880)]
    pub avg_price_vwap_delta: u32,

    /// Exponential penalty on the period quota above the target price
    #[arg(long, env = "TICKETBUYER_HIGH_PRICE_PENALTY", default_value_t = 1.3)]
    pub high_price_penalty: f64,

    /// Maximum ticket fee per kB
    #[arg(long, env = "TICKETBUYER_MAX_FEE", default_value_t = 1.0)]
    pub max_fee: f64,

    /// Minimum ticket fee per kB
    #[arg(long, env = "TICKETBUYER_MIN_FEE", default_value_t = 0.01)]
    pub min_fee: f64,

    /// Per-block fee statistic to average
    #[arg(long, value_enum, env = "TICKETBUYER_FEE_SOURCE", default_value_t = FeeSource::Mean)]
    pub fee_source: FeeSource,

    /// Regular transaction fee per kB, set once at startup
    #[arg(long, env = "TICKETBUYER_TX_FEE", default_value_t = 0.01)]
    pub tx_fee: f64,

    /// Multiplier on the estimated fee, e.g. 1.05 = 105%
    #[arg(long, env = "TICKETBUYER_FEE_TARGET_SCALING", default_value_t = 1.05)]
    pub fee_target_scaling: f64,

    /// Recent blocks averaged for the fee
    #[arg(long, env = "TICKETBUYER_BLOCKS_TO_AVG", default_value_t = 11)]
    pub blocks_to_avg: u32,

    /// Historical windows searched early in a period
    #[arg(long, env = "TICKETBUYER_WINDOWS_TO_CONSIDER", default_value_t = 10)]
    pub windows_to_consider: u32,

    /// Tickets per block; negative N buys one every N blocks, 0 disables
    #[arg(long, env = "TICKETBUYER_MAX_PER_BLOCK", default_value_t = 3, allow_negative_numbers = true)]
    pub max_per_block: i32,

    /// Spendable balance to keep after each purchase
    #[arg(long, env = "TICKETBUYER_BALANCE_TO_MAINTAIN", default_value_t = 0.0)]
    pub balance_to_maintain: f64,

    /// Keep buying while own tickets are still in the mempool
    #[arg(long, env = "TICKETBUYER_DONT_WAIT_FOR_TICKETS")]
    pub dont_wait_for_tickets: bool,

    /// Own mempool tickets tolerated before holding back
    #[arg(long, env = "TICKETBUYER_MAX_IN_MEMPOOL", default_value_t = 0)]
    pub max_in_mempool: u32,

    /// Blocks until an unmined ticket purchase expires
    #[arg(long, env = "TICKETBUYER_EXPIRY_DELTA", default_value_t = 16)]
    pub expiry_delta: u32,

    /// Attempts at fetching stake info before giving up on a block
    #[arg(long, env = "TICKETBUYER_STAKE_INFO_ATTEMPTS", default_value_t = 10)]
    pub stake_info_attempts: u32,

    /// Seconds between stake info attempts
    #[arg(long, env = "TICKETBUYER_STAKE_INFO_DELAY_SECS", default_value_t = 2)]
    pub stake_info_delay_secs: u64,
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl Cli {
    pub fn buyer_config(&self) -> BuyerConfig {
        BuyerConfig {
            account_name: self.account_name.clone(),
            ticket_address: non_empty(&self.ticket_address),
            pool_address: non_empty(&self.pool_address),
            pool_fees: self.pool_fees,

            max_price_absolute: self.max_price_absolute,
            max_price_scale: self.max_price_scale,
            min_price_scale: self.min_price_scale,
            price_target: self.price_target,
            avg_price_mode: self.avg_price_mode,
            avg_price_vwap_delta: self.avg_price_vwap_delta,
            high_price_penalty: self.high_price_penalty,

            max_fee: self.max_fee,
            min_fee: self.min_fee,
            fee_source: self.fee_source,
            tx_fee: self.tx_fee,
            fee_target_scaling: self.fee_target_scaling,
            blocks_to_avg: self.blocks_to_avg,
            windows_to_consider: self.windows_to_consider,

            max_per_block: self.max_per_block,
            balance_to_maintain: self.balance_to_maintain,
            dont_wait_for_tickets: self.dont_wait_for_tickets,
            max_in_mempool: self.max_in_mempool,
            expiry_delta: self.expiry_delta,

            network: self.network,
            period_size: self.network.period_size(),
            stake_info_retry: RetryPolicy {
                max_attempts: self.stake_info_attempts,
                delay: Duration::from_secs(self.stake_info_delay_secs),
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }

    pub fn daemon_endpoint(&self) -> RpcEndpoint {
        self.endpoint(
            &self.dcrd_serv,
            self.network.daemon_rpc_port(),
            &self.dcrd_user,
            &self.dcrd_pass,
            &self.dcrd_cert,
        )
    }

    pub fn wallet_endpoint(&self) -> RpcEndpoint {
        self.endpoint(
            &self.dcrw_serv,
            self.network.wallet_rpc_port(),
            &self.dcrw_user,
            &self.dcrw_pass,
            &self.dcrw_cert,
        )
    }

    fn endpoint(
        &self,
        serv: &Option<String>,
        default_port: u16,
        user: &str,
        pass: &str,
        cert: &Option<PathBuf>,
    ) -> RpcEndpoint {
        let host = non_empty(serv).unwrap_or_else(|| format!("localhost:{default_port}"));
        let scheme = if self.no_client_tls { "http" } else { "https" };

        RpcEndpoint {
            url: format!("{scheme}://{host}"),
            user: user.to_string(),
            pass: pass.to_string(),
            ca_cert: if self.no_client_tls { None } else { cert.clone() },
        }
    }

    /// Plain-text RPC is only accepted towards the local machine.
    pub fn check_tls(&self) -> anyhow::Result<()> {
        if !self.no_client_tls {
            return Ok(());
        }

        for endpoint in [self.daemon_endpoint(), self.wallet_endpoint()] {
            let host = endpoint.url.trim_start_matches("http://");
            if !is_loopback(host) {
                anyhow::bail!("noclienttls is only allowed for localhost RPC servers, not {host}");
            }
        }

        Ok(())
    }
}

fn is_loopback(host_port: &str) -> bool {
    let host = match host_port.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_port,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
