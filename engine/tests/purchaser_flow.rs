
use std::sync::Arc;
use std::time::Duration;

use engine::chain::PoolFeeInfo;
use engine::config::{BuyerConfig, ConfigError, Network, RetryPolicy};
use engine::error::PurchaseError;
use engine::metrics::Counters;
use engine::purchaser::TicketPurchaser;
use engine::types::{PurchaseOutcome, SkipReason};

use mock_chain::{MockChain, MockState, coin};

const VOTER: &str = "TsYG5KZCddpyX8MkrA8i5roFGkqWYwGFvxf";
const POOL_FEE: &str = "TsWvfKhQEXgYYAt4W7zvMpnfTCM87igofEP";

fn mk_config() -> BuyerConfig {
    BuyerConfig {
        stake_info_retry: RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        },
        ..Default::default()
    }
}

fn make_purchaser(
    state: MockState,
    cfg: BuyerConfig,
) -> (TicketPurchaser<MockChain>, MockChain) {
    let chain = MockChain::with_state(state);
    let purchaser = TicketPurchaser::new(Arc::new(chain.clone()), cfg, Counters::default())
        .expect("valid config");
    (purchaser, chain)
}

fn bought(outcome: &PurchaseOutcome) -> u32 {
    match outcome {
        PurchaseOutcome::Purchased { decision, .. } => decision.count_to_buy,
        PurchaseOutcome::Skipped(reason) => panic!("expected a purchase, skipped: {reason}"),
    }
}

#[tokio::test]
async fn first_block_sets_tx_fee_and_buys_per_block_cap() {
    let (mut p, chain) = make_purchaser(MockState::default(), mk_config());

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(bought(&outcome), 3);
    assert_eq!(outcome.tickets_bought(), 3);

    let s = chain.state.lock().await;
    assert_eq!(s.tx_fees, vec![coin(0.01)]);
    // 11 blocks at 0.01 averaged, scaled by 1.05.
    assert_eq!(s.ticket_fees, vec![coin(0.0105)]);

    let req = &s.purchases[0];
    assert_eq!(req.count, 3);
    assert_eq!(req.account, "default");
    assert_eq!(req.spend_limit, coin(100.0));
    assert_eq!(req.expiry_height, 116);
    assert_eq!(req.ticket_address, "change-1");
    assert_eq!(req.pool, None);

    // 10_000 coins at a price of 90 => 111 affordable, price under target.
    assert_eq!(p.state().quota_this_period, 111);
    assert_eq!(p.state().purchased_this_period, 3);
    assert_eq!(p.counters().snapshot().tickets_purchased, 3);
}

#[tokio::test]
async fn tx_fee_is_only_set_on_first_run() {
    let (mut p, chain) = make_purchaser(MockState::default(), mk_config());

    p.purchase(100).await.unwrap();
    p.purchase(101).await.unwrap();

    assert_eq!(chain.state.lock().await.tx_fees.len(), 1);
}

#[tokio::test]
async fn period_transition_resets_counters_and_uses_closest_window_fee() {
    let (mut p, chain) = make_purchaser(MockState::default(), mk_config());

    p.purchase(143).await.unwrap();
    assert_eq!(p.state().window_period, 0);
    assert_eq!(p.state().idx_in_period, 143);
    assert_eq!(p.state().purchased_this_period, 3);

    chain.state.lock().await.spendable = coin(450.0);

    let outcome = p.purchase(144).await.unwrap();
    assert_eq!(bought(&outcome), 3);

    let st = p.state();
    assert_eq!(st.window_period, 1);
    assert_eq!(st.idx_in_period, 0);
    // Quota recomputed from the new balance (450 / 90 = 5), counters restarted.
    assert_eq!(st.quota_this_period, 5);
    assert_eq!(st.purchased_this_period, 3);

    // Early in the period: window starting at 144 ran at 91, closest to 90.
    let s = chain.state.lock().await;
    assert_eq!(s.ticket_fees.last(), Some(&coin(0.0315)));
}

#[tokio::test]
async fn repeated_height_does_not_refill_quota() {
    let (mut p, chain) = make_purchaser(MockState::default(), mk_config());

    p.purchase(144).await.unwrap();
    chain.state.lock().await.spendable = coin(1_000_000.0);
    p.purchase(144).await.unwrap();

    assert_eq!(p.state().quota_this_period, 111);
    assert_eq!(p.state().purchased_this_period, 6);
}

#[tokio::test]
async fn exhausted_quota_skips_even_with_backlog() {
    let state = MockState {
        spendable: coin(200.0),
        ..Default::default()
    };
    let (mut p, chain) = make_purchaser(state, mk_config());

    let first = p.purchase(100).await.unwrap();
    assert_eq!(bought(&first), 2);
    assert_eq!(p.state().remaining(), 0);

    chain.state.lock().await.stake_status.own_mempool_tickets = 5;

    let second = p.purchase(101).await.unwrap();
    assert_eq!(second.skip_reason(), Some(SkipReason::QuotaExhausted));
    assert_eq!(chain.state.lock().await.purchases.len(), 1);
    assert_eq!(p.counters().snapshot().skipped, 1);
}

#[tokio::test]
async fn next_difficulty_above_absolute_ceiling_skips() {
    let mut state = MockState::default();
    state.difficulty.next = 150.0;
    let (mut p, chain) = make_purchaser(state, mk_config());

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(
        outcome.skip_reason(),
        Some(SkipReason::PriceAboveAbsoluteCeiling)
    );
    let s = chain.state.lock().await;
    assert!(s.purchases.is_empty());
    assert!(s.ticket_fees.is_empty());
}

#[tokio::test]
async fn estimate_above_scaled_ceiling_skips() {
    let state = MockState {
        estimate: 250.0,
        ..Default::default()
    };
    let (mut p, _chain) = make_purchaser(state, mk_config());

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(
        outcome.skip_reason(),
        Some(SkipReason::PriceAboveScaledCeiling)
    );
}

#[tokio::test]
async fn estimate_is_not_fetched_when_scales_are_disabled() {
    let cfg = BuyerConfig {
        max_price_scale: 0.0,
        min_price_scale: 0.0,
        ..mk_config()
    };
    let (mut p, chain) = make_purchaser(MockState::default(), cfg);

    p.purchase(100).await.unwrap();

    assert_eq!(chain.state.lock().await.estimate_calls, 0);
}

#[tokio::test]
async fn own_mempool_backlog_holds_back_purchases() {
    let mut state = MockState::default();
    state.stake_status.own_mempool_tickets = 1;
    let (mut p, chain) = make_purchaser(state.clone(), mk_config());

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(outcome.skip_reason(), Some(SkipReason::MempoolBacklog));
    assert!(chain.state.lock().await.ticket_fees.is_empty());

    let cfg = BuyerConfig {
        dont_wait_for_tickets: true,
        ..mk_config()
    };
    let (mut p, _chain) = make_purchaser(state, cfg);
    assert_eq!(bought(&p.purchase(100).await.unwrap()), 3);
}

#[tokio::test]
async fn price_below_scaled_floor_buys_full_cap_despite_backlog() {
    let mut state = MockState {
        estimate: 60.0,
        ..Default::default()
    };
    state.stake_status.own_mempool_tickets = 5;
    let (mut p, _chain) = make_purchaser(state, mk_config());

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(bought(&outcome), 3);
}

#[tokio::test]
async fn balance_to_maintain_reduces_order() {
    let mut state = MockState {
        spendable: coin(100.0),
        ..Default::default()
    };
    state.difficulty.next = 30.0;
    let cfg = BuyerConfig {
        max_per_block: 4,
        balance_to_maintain: 20.0,
        ..mk_config()
    };
    let (mut p, _chain) = make_purchaser(state, cfg);

    let outcome = p.purchase(100).await.unwrap();

    // 100 - 3 * 30 = 10 < 20, 100 - 2 * 30 = 40 >= 20.
    assert_eq!(bought(&outcome), 2);
}

#[tokio::test]
async fn negative_per_block_cap_buys_one_on_schedule() {
    let cfg = BuyerConfig {
        max_per_block: -5,
        ..mk_config()
    };
    let (mut p, _chain) = make_purchaser(MockState::default(), cfg);

    assert_eq!(bought(&p.purchase(105).await.unwrap()), 1);
    assert_eq!(
        p.purchase(106).await.unwrap().skip_reason(),
        Some(SkipReason::NotScheduledThisBlock)
    );
}

#[tokio::test]
async fn zero_per_block_cap_disables_purchasing() {
    let cfg = BuyerConfig {
        max_per_block: 0,
        ..mk_config()
    };
    let (mut p, chain) = make_purchaser(MockState::default(), cfg);

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(outcome.skip_reason(), Some(SkipReason::PurchasingDisabled));
    assert!(chain.state.lock().await.purchases.is_empty());
}

#[tokio::test]
async fn configured_ticket_and_pool_addresses_are_used() {
    let cfg = BuyerConfig {
        network: Network::Testnet,
        ticket_address: Some(VOTER.into()),
        pool_address: Some(POOL_FEE.into()),
        pool_fees: 7.5,
        ..mk_config()
    };
    let (mut p, chain) = make_purchaser(MockState::default(), cfg);

    p.purchase(100).await.unwrap();

    let s = chain.state.lock().await;
    assert_eq!(s.change_address_calls, 0);
    assert_eq!(s.purchases[0].ticket_address, VOTER);
    assert_eq!(
        s.purchases[0].pool,
        Some(PoolFeeInfo {
            address: POOL_FEE.into(),
            fee_percent: 7.5,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn stake_status_is_retried_until_available() {
    let state = MockState {
        stake_status_failures: 2,
        ..Default::default()
    };
    let (mut p, chain) = make_purchaser(state, mk_config());

    let outcome = p.purchase(100).await.unwrap();

    assert_eq!(bought(&outcome), 3);
    assert_eq!(chain.state.lock().await.stake_status_calls, 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_stake_status_retries_leave_counters_untouched() {
    let state = MockState {
        stake_status_failures: 10,
        ..Default::default()
    };
    let (mut p, chain) = make_purchaser(state, mk_config());

    let err = p.purchase(100).await.unwrap_err();

    assert!(matches!(
        err,
        PurchaseError::RetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(chain.state.lock().await.stake_status_calls, 3);
    assert_eq!(p.state().purchased_this_period, 0);
    assert!(chain.state.lock().await.purchases.is_empty());
}

#[tokio::test(start_paused = true)]
async fn quota_is_computed_on_the_block_after_a_failed_first_block() {
    let state = MockState {
        stake_status_failures: 3,
        ..Default::default()
    };
    let (mut p, _chain) = make_purchaser(state, mk_config());

    assert!(p.purchase(100).await.is_err());
    assert!(p.state().quota_pending);

    let outcome = p.purchase(101).await.unwrap();

    assert_eq!(bought(&outcome), 3);
    assert_eq!(p.state().quota_this_period, 111);
    assert!(!p.state().quota_pending);
}

#[tokio::test(start_paused = true)]
async fn failure_on_period_transition_does_not_zero_the_new_period() {
    let (mut p, chain) = make_purchaser(MockState::default(), mk_config());

    p.purchase(143).await.unwrap();

    {
        let mut s = chain.state.lock().await;
        s.stake_status_failures = s.stake_status_calls + 3;
    }
    assert!(p.purchase(144).await.is_err());
    assert_eq!(p.state().window_period, 1);

    let outcome = p.purchase(145).await.unwrap();

    assert_eq!(bought(&outcome), 3);
    assert_eq!(p.state().quota_this_period, 111);
    assert_eq!(p.state().purchased_this_period, 3);
}

#[tokio::test]
async fn failed_submission_does_not_commit() {
    let state = MockState {
        fail_purchase: true,
        ..Default::default()
    };
    let (mut p, _chain) = make_purchaser(state, mk_config());

    let err = p.purchase(100).await.unwrap_err();

    assert!(matches!(
        err,
        PurchaseError::Collaborator {
            op: "purchaseticket",
            ..
        }
    ));
    assert_eq!(p.state().purchased_this_period, 0);
    assert_eq!(p.counters().snapshot().tickets_purchased, 0);
}

#[tokio::test]
async fn tx_fee_failure_on_first_run_is_not_fatal() {
    let state = MockState {
        fail_set_tx_fee: true,
        ..Default::default()
    };
    let (mut p, _chain) = make_purchaser(state, mk_config());

    assert_eq!(bought(&p.purchase(100).await.unwrap()), 3);
}

#[tokio::test]
async fn no_fee_windows_early_in_period_is_not_enough_data() {
    let state = MockState {
        window_fees: Vec::new(),
        ..Default::default()
    };
    let (mut p, chain) = make_purchaser(state, mk_config());

    let err = p.purchase(5).await.unwrap_err();

    assert!(matches!(err, PurchaseError::NotEnoughData(_)));
    assert!(chain.state.lock().await.purchases.is_empty());
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let cfg = BuyerConfig {
        network: Network::Testnet,
        pool_address: Some(POOL_FEE.into()),
        pool_fees: 0.0,
        ..mk_config()
    };

    let res = TicketPurchaser::new(Arc::new(MockChain::new()), cfg, Counters::default());

    assert!(matches!(res, Err(ConfigError::PoolFeesUnset)));
}

#[test]
fn ticket_address_from_another_network_is_rejected_at_construction() {
    let cfg = BuyerConfig {
        ticket_address: Some(VOTER.into()),
        ..mk_config()
    };

    let res = TicketPurchaser::new(Arc::new(MockChain::new()), cfg, Counters::default());

    assert!(matches!(
        res,
        Err(ConfigError::InvalidAddress {
            field: "ticket address",
            ..
        })
    ));
}
