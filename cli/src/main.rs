mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use adapters::dcr::{DecredChain, RpcClient, run_block_poller};
use common::{LogFormat, init_logger};
use engine::chain::ChainData;
use engine::dispatcher::{BlockDispatcher, block_channel};
use engine::metrics::Counters;
use engine::purchaser::TicketPurchaser;

use crate::cli::Cli;

/// Connected blocks buffered between the poller and the dispatcher.
const BLOCK_CHANNEL_CAPACITY: usize = 100;

/// Confirms both services answer and logs where the chain stands.
async fn sync_startup(chain: &DecredChain, account: &str) -> anyhow::Result<()> {
    let best = chain.best_block().await.context("fetch best block")?;
    let balance = chain
        .spendable_balance(account)
        .await
        .context("fetch spendable balance")?;
    let sd = chain
        .stake_difficulty()
        .await
        .context("fetch stake difficulty")?;

    info!(
        height = best.height,
        %account,
        %balance,
        ticket_price = sd.next,
        "connected to daemon and wallet"
    );

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    let format = if cli.log_json || is_production {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logger("ticketbuyer", &cli.log_level, format);

    let cfg = cli.buyer_config();
    cfg.validate().context("invalid configuration")?;
    cli.check_tls()?;

    info!(network = ?cli.network, period_size = cfg.period_size, "Starting ticket buyer...");

    let daemon = RpcClient::new("dcrd", cli.daemon_endpoint()).context("daemon rpc client")?;
    let wallet = RpcClient::new("dcrwallet", cli.wallet_endpoint()).context("wallet rpc client")?;
    let chain = Arc::new(DecredChain::new(daemon, wallet));

    sync_startup(&chain, &cfg.account_name).await?;

    let counters = Counters::default();
    let purchaser = TicketPurchaser::new(Arc::clone(&chain), cfg, counters.clone())?;

    let (block_tx, block_rx) = block_channel(BLOCK_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher =
        tokio::spawn(BlockDispatcher::new(purchaser, block_rx, shutdown_rx.clone()).run());

    let poll_every = cli.poll_interval();
    let poller_chain = Arc::clone(&chain);
    let poller = tokio::spawn(async move {
        run_block_poller(poller_chain.as_ref(), poll_every, block_tx, shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Receivers may already be gone if both tasks exited on their own.
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller.await {
        error!(error = ?e, "block poller task failed");
    }

    match dispatcher.await {
        Ok(purchaser) => {
            let st = purchaser.state();
            info!(
                window = st.window_period,
                quota = st.quota_this_period,
                purchased = st.purchased_this_period,
                "dispatcher stopped"
            );
        }
        Err(e) => error!(error = ?e, "dispatcher task failed"),
    }

    let snap = counters.snapshot();
    info!(
        blocks_seen = snap.blocks_seen,
        purchases = snap.purchases,
        tickets_purchased = snap.tickets_purchased,
        failures = snap.failures,
        skipped = snap.skipped,
        "ticket buyer stopped"
    );

    Ok(())
}
