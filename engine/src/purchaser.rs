//! Per-block ticket purchase decision.
//!
//! Responsibilities:
//! - Track the difficulty period and reset the period counters on transition.
//! - Gate purchasing on absolute and scaled price ceilings.
//! - Recompute the period quota once per period.
//! - Hold back while own tickets are stuck in the mempool.
//! - Estimate and set the ticket fee, size the order and submit it.
//!
//! Non-responsibilities:
//! - Ordering or deduplicating block heights (the dispatcher feeds heights as
//!   they arrive).
//! - Transport, signing and retries of anything but the stake status fetch.
//!
//! Safety properties:
//! - `PurchaserState` is only reachable through `&mut self`, so at most one
//!   decision runs at a time.
//! - Counters move only after the wallet confirms a submission; any error
//!   before that leaves them as they were.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::warn_if_slow;
use tracing::{Span, debug, error, field, info, instrument, warn};

use crate::amount::Amount;
use crate::chain::{ChainData, PoolFeeInfo, StakeDifficulty, TicketPurchaseRequest};
use crate::config::{BuyerConfig, ConfigError};
use crate::error::PurchaseError;
use crate::fees::{self, FeeEstimator};
use crate::metrics::Counters;
use crate::period::PurchaserState;
use crate::pricing::{self, PriceSignal};
use crate::retry::retry_fixed;
use crate::sizing::{self, BacklogPolicy, PerBlockCap, SizingInputs};
use crate::types::{OrderDecision, PurchaseOutcome, SkipReason};

const SLOW_CALL: Duration = Duration::from_millis(500);

/// Calls a collaborator, warning when slow and tagging failures with `op`.
async fn rpc<T>(
    op: &'static str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, PurchaseError> {
    warn_if_slow(op, SLOW_CALL, fut)
        .await
        .map_err(|e| PurchaseError::collaborator(op, e))
}

/// Decides and places ticket orders, one block at a time.
pub struct TicketPurchaser<C: ChainData> {
    /// Daemon and wallet access.
    chain: Arc<C>,

    /// Validated purchasing policy.
    cfg: BuyerConfig,

    /// Period cursors and counters; owned here and nowhere else.
    state: PurchaserState,

    fees: FeeEstimator,

    /// Observability counters (does not affect behavior).
    counters: Counters,
}

impl<C: ChainData> TicketPurchaser<C> {
    pub fn new(chain: Arc<C>, cfg: BuyerConfig, counters: Counters) -> Result<Self, ConfigError> {
        cfg.validate()?;

        Ok(Self {
            fees: FeeEstimator::from_config(&cfg),
            chain,
            cfg,
            state: PurchaserState::new(),
            counters,
        })
    }

    pub fn state(&self) -> &PurchaserState {
        &self.state
    }

    pub fn config(&self) -> &BuyerConfig {
        &self.cfg
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Runs the full decision for a newly connected block at `height`.
    ///
    /// Flow:
    /// 1) Period update (first run also sets the regular tx fee).
    /// 2) Stake status, retried with a fixed delay.
    /// 3) Price signal and price gates.
    /// 4) Quota, when the current period has none yet.
    /// 5) Mempool backlog gate.
    /// 6) Ticket fee estimate, scaled, clamped and applied.
    /// 7) Order sizing.
    /// 8) Destination address.
    /// 9) Submission, then counters.
    ///
    /// Policy skips return `Ok(PurchaseOutcome::Skipped(..))`; collaborator
    /// failures and missing data return `Err` and leave the counters as they
    /// were.
    #[instrument(
        skip(self),
        target = "purchaser",
        fields(window = field::Empty, idx = field::Empty)
    )]
    pub async fn purchase(&mut self, height: u32) -> Result<PurchaseOutcome, PurchaseError> {
        self.counters.blocks_seen.fetch_add(1, Ordering::Relaxed);

        let update = self.state.advance(height, self.cfg.period_size);

        let span = Span::current();
        span.record("window", self.state.window_period);
        span.record("idx", self.state.idx_in_period);

        if update.first_run {
            debug!(
                idx_in_period = self.state.idx_in_period,
                "first run; initialized period cursors"
            );
            self.initialize().await;
        } else if update.fill_queue {
            info!(
                periods_advanced = update.periods_advanced,
                "entered new difficulty period; period counters reset"
            );
        } else if update.stale {
            warn!(
                stored_window = self.state.window_period,
                "height belongs to an earlier period; processing as given"
            );
        }

        let chain = self.chain.as_ref();
        let status = retry_fixed(&self.cfg.stake_info_retry, "getstakeinfo", move || {
            chain.stake_status()
        })
        .await?;

        let difficulty = rpc("getstakedifficulty", self.chain.stake_difficulty()).await?;

        if status.ticket_price != difficulty.current {
            debug!(
                wallet_ticket_price = status.ticket_price,
                daemon_ticket_price = difficulty.current,
                "wallet stake view differs from the daemon"
            );
        }

        let price = self.price_signal(difficulty).await?;

        if let Some(reason) = price.gate().skip_reason() {
            debug!(
                next_difficulty = price.next_difficulty,
                estimated_next = ?price.estimated_next,
                absolute_ceiling = ?price.absolute_ceiling,
                scaled_ceiling = ?price.scaled_ceiling,
                "price gate closed; not purchasing this block"
            );
            return Ok(self.skip(reason));
        }

        let spendable = rpc(
            "getbalance",
            self.chain.spendable_balance(&self.cfg.account_name),
        )
        .await?;

        debug!(
            account = %self.cfg.account_name,
            %spendable,
            "current spendable balance"
        );

        if self.state.quota_pending {
            self.fill_quota(&price, spendable.to_coin());
        }

        let floor_defense = price.floor_defense_active();
        let backlog = BacklogPolicy {
            enabled: self.cfg.waits_for_mempool(),
            max_in_mempool: self.cfg.max_in_mempool,
        };

        if self.state.remaining() > 0
            && !floor_defense
            && backlog.blocks(status.own_mempool_tickets)
        {
            debug!(
                own_mempool = status.own_mempool_tickets,
                max_in_mempool = self.cfg.max_in_mempool,
                "waiting for own tickets to enter the chain before buying more"
            );
            return Ok(self.skip(SkipReason::MempoolBacklog));
        }

        let fee_to_use = self.apply_ticket_fee(price.next_difficulty).await?;

        let sizing_inputs = SizingInputs {
            height,
            remaining: self.state.remaining(),
            cap: PerBlockCap::from_setting(self.cfg.max_per_block),
            own_mempool: status.own_mempool_tickets,
            backlog,
            spendable: spendable.to_coin(),
            balance_to_maintain: self.cfg.balance_to_maintain,
            ticket_price: price.next_difficulty,
            floor_defense,
        };

        let count_to_buy = match sizing::size_order(&sizing_inputs) {
            Ok(n) => n,
            Err(reason) => return Ok(self.skip(reason)),
        };

        let target_address = self.ticket_address().await?;

        let decision = OrderDecision {
            count_to_buy,
            fee_to_use,
            target_address,
            expiry_height: height.saturating_add(self.cfg.expiry_delta),
        };

        let tickets = self.submit(&decision, &price).await?;

        // Commit point: only a confirmed submission moves the counters.
        let bought = tickets.len() as i64;
        self.state.record_purchase(bought);
        self.counters.record_purchase(bought as u64);

        for ticket in &tickets {
            info!(
                %ticket,
                stake_difficulty = price.next_difficulty,
                fee_per_kb = %decision.fee_to_use,
                "purchased ticket"
            );
        }

        if tickets.len() != decision.count_to_buy as usize {
            warn!(
                requested = decision.count_to_buy,
                created = tickets.len(),
                "wallet created a different number of tickets than requested"
            );
        }

        debug!(
            purchased = self.state.purchased_this_period,
            remaining = self.state.remaining(),
            "period progress"
        );

        Ok(PurchaseOutcome::Purchased { decision, tickets })
    }

    /// One-time startup work. Best effort: failures are logged, not returned.
    async fn initialize(&self) {
        let fee = match Amount::from_coin(self.cfg.tx_fee) {
            Ok(fee) => fee,
            Err(e) => {
                error!(tx_fee = self.cfg.tx_fee, error = %e, "failed to decode tx fee from config");
                return;
            }
        };

        match rpc("settxfee", self.chain.set_tx_fee(fee)).await {
            Ok(()) => debug!(%fee, "regular transaction fee set"),
            Err(e) => error!(%fee, error = %e, "failed to set tx fee in wallet"),
        }
    }

    async fn price_signal(&self, difficulty: StakeDifficulty) -> Result<PriceSignal, PurchaseError> {
        let pool = rpc("getticketpoolvalue", self.chain.ticket_pool_value()).await?;
        let vwap = rpc(
            "ticketvwap",
            self.chain.ticket_vwap(self.cfg.avg_price_vwap_delta),
        )
        .await?;

        let estimated_next = if self.cfg.max_price_scale > 0.0 || self.cfg.min_price_scale > 0.0 {
            Some(rpc("estimatestakediff", self.chain.estimate_next_difficulty()).await?)
        } else {
            None
        };

        Ok(PriceSignal::new(
            &self.cfg,
            &pool,
            vwap,
            difficulty,
            estimated_next,
        ))
    }

    fn fill_quota(&mut self, price: &PriceSignal, spendable: f64) {
        let affordable = pricing::affordable_count(spendable, price.next_difficulty);
        let quota = pricing::period_quota(
            price.next_difficulty,
            price.target_price,
            affordable,
            self.cfg.high_price_penalty,
        );

        self.state.set_quota(quota);

        info!(
            quota,
            affordable,
            next_difficulty = price.next_difficulty,
            target_price = price.target_price,
            avg_price = price.avg_price,
            "queued tickets for this period"
        );
    }

    async fn apply_ticket_fee(&self, difficulty: f64) -> Result<Amount, PurchaseError> {
        let estimate = self
            .fees
            .estimate(self.chain.as_ref(), self.state.idx_in_period, difficulty)
            .await?;

        let fee = fees::scale_and_clamp(
            estimate.fee_per_kb,
            self.cfg.fee_target_scaling,
            self.cfg.min_fee,
            self.cfg.max_fee,
        );
        let fee_amt =
            Amount::from_coin(fee).map_err(|e| PurchaseError::invalid_amount("ticket fee", e))?;

        rpc("setticketfee", self.chain.set_ticket_fee(fee_amt)).await?;

        debug!(
            raw_fee = estimate.fee_per_kb,
            basis = ?estimate.basis,
            fee = %fee_amt,
            "ticket fee set"
        );

        Ok(fee_amt)
    }

    async fn ticket_address(&self) -> Result<String, PurchaseError> {
        match &self.cfg.ticket_address {
            Some(addr) => Ok(addr.clone()),
            None => {
                rpc(
                    "getrawchangeaddress",
                    self.chain.change_address(&self.cfg.account_name),
                )
                .await
            }
        }
    }

    async fn submit(
        &self,
        decision: &OrderDecision,
        price: &PriceSignal,
    ) -> Result<Vec<String>, PurchaseError> {
        // The absolute ceiling doubles as the wallet's spend limit.
        let limit = price.absolute_ceiling.unwrap_or(price.next_difficulty);
        let spend_limit =
            Amount::from_coin(limit).map_err(|e| PurchaseError::invalid_amount("spend limit", e))?;

        let pool = self.cfg.pool_address.as_ref().map(|address| PoolFeeInfo {
            address: address.clone(),
            fee_percent: self.cfg.pool_fees,
        });

        let req = TicketPurchaseRequest {
            account: self.cfg.account_name.clone(),
            spend_limit,
            count: decision.count_to_buy,
            ticket_address: decision.target_address.clone(),
            pool,
            expiry_height: decision.expiry_height,
        };

        debug!(
            count = decision.count_to_buy,
            %spend_limit,
            expiry_height = decision.expiry_height,
            "submitting ticket purchase"
        );

        rpc("purchaseticket", self.chain.purchase_tickets(req)).await
    }

    fn skip(&self, reason: SkipReason) -> PurchaseOutcome {
        self.counters.record_skip(reason);
        debug!(%reason, "no purchase this block");
        PurchaseOutcome::Skipped(reason)
    }
}
