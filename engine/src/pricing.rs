//! Average/target price, price gates and the per-period quota.

use tracing::{debug, instrument};

use crate::chain::{PoolValue, StakeDifficulty};
use crate::config::{AvgPriceMode, BuyerConfig};
use crate::types::SkipReason;

/// Price picture for one block. Recomputed on every decision.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSignal {
    pub avg_price: f64,
    pub target_price: f64,
    pub current_difficulty: f64,
    pub next_difficulty: f64,

    /// Expected difficulty of the following period; only fetched when a
    /// scaled ceiling or floor is enabled.
    pub estimated_next: Option<f64>,

    pub absolute_ceiling: Option<f64>,
    pub scaled_ceiling: Option<f64>,
    pub scaled_floor: Option<f64>,
}

/// The two independent reasons price can disable purchasing for a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PriceGate {
    pub above_absolute_ceiling: bool,
    pub above_scaled_ceiling: bool,
}

impl PriceGate {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.above_absolute_ceiling {
            Some(SkipReason::PriceAboveAbsoluteCeiling)
        } else if self.above_scaled_ceiling {
            Some(SkipReason::PriceAboveScaledCeiling)
        } else {
            None
        }
    }
}

/// Pool value per ticket. An empty pool counts as one ticket.
pub fn pool_price(pool: &PoolValue) -> f64 {
    pool.total_value.to_coin() / f64::from(pool.pool_size.max(1))
}

pub fn average_price(mode: AvgPriceMode, pool: &PoolValue, vwap: f64) -> f64 {
    match mode {
        AvgPriceMode::Vwap => vwap,
        AvgPriceMode::Pool => pool_price(pool),
        AvgPriceMode::Dual => (pool_price(pool) + vwap) / 2.0,
    }
}

fn enabled(v: f64) -> Option<f64> {
    (v > 0.0).then_some(v)
}

impl PriceSignal {
    pub fn new(
        cfg: &BuyerConfig,
        pool: &PoolValue,
        vwap: f64,
        difficulty: StakeDifficulty,
        estimated_next: Option<f64>,
    ) -> Self {
        let avg_price = average_price(cfg.avg_price_mode, pool, vwap);
        let scaled_ceiling = enabled(cfg.max_price_scale).map(|s| avg_price * s);
        let scaled_floor = enabled(cfg.min_price_scale).map(|s| avg_price * s);

        let mut target_price = enabled(cfg.price_target).unwrap_or(avg_price);
        if let Some(ceiling) = scaled_ceiling {
            if target_price > ceiling {
                debug!(target_price, ceiling, "target price clamped to scaled ceiling");
                target_price = ceiling;
            }
        }

        Self {
            avg_price,
            target_price,
            current_difficulty: difficulty.current,
            next_difficulty: difficulty.next,
            estimated_next,
            absolute_ceiling: enabled(cfg.max_price_absolute),
            scaled_ceiling,
            scaled_floor,
        }
    }

    pub fn gate(&self) -> PriceGate {
        let above_absolute_ceiling = self
            .absolute_ceiling
            .is_some_and(|ceiling| self.next_difficulty > ceiling);

        let above_scaled_ceiling = match (self.scaled_ceiling, self.estimated_next) {
            (Some(ceiling), Some(estimate)) => estimate > ceiling,
            _ => false,
        };

        PriceGate {
            above_absolute_ceiling,
            above_scaled_ceiling,
        }
    }

    /// The next-period estimate has fallen under the scaled floor; the order
    /// sizer then buys a full block's worth to hold the price up.
    pub fn floor_defense_active(&self) -> bool {
        match (self.scaled_floor, self.estimated_next) {
            (Some(floor), Some(estimate)) => estimate < floor,
            _ => false,
        }
    }
}

/// Whole tickets `spendable` can pay for at `price`.
pub fn affordable_count(spendable: f64, price: f64) -> i64 {
    if !(price > 0.0) || !(spendable > 0.0) {
        return 0;
    }
    (spendable / price).floor() as i64
}

/// Tickets to aim for over the period.
///
/// At or below target everything affordable is queued. Above target the
/// count decays as `penalty^-(current - target)`.
#[instrument(target = "pricing", level = "debug")]
pub fn period_quota(current_price: f64, target_price: f64, affordable: i64, penalty: f64) -> i64 {
    if current_price > target_price {
        let gap = (current_price - target_price).abs();
        let scaled = (penalty.powf(-gap) * affordable as f64).floor() as i64;

        debug!(
            current_price,
            target_price,
            affordable,
            quota = scaled,
            "price above target; quota scaled down"
        );
        scaled
    } else {
        debug!(
            current_price,
            target_price,
            quota = affordable,
            "price at or below target; queueing all affordable tickets"
        );
        affordable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;

    fn pool(total_coin: f64, size: u32) -> PoolValue {
        PoolValue {
            total_value: Amount::from_coin(total_coin).unwrap(),
            pool_size: size,
        }
    }

    fn diff(next: f64) -> StakeDifficulty {
        StakeDifficulty {
            current: next,
            next,
        }
    }

    #[test]
    fn average_price_modes() {
        let p = pool(1_000.0, 10); // 100 per ticket

        assert_eq!(average_price(AvgPriceMode::Pool, &p, 80.0), 100.0);
        assert_eq!(average_price(AvgPriceMode::Vwap, &p, 80.0), 80.0);
        assert_eq!(average_price(AvgPriceMode::Dual, &p, 80.0), 90.0);
    }

    #[test]
    fn empty_pool_is_treated_as_one_ticket() {
        assert_eq!(pool_price(&pool(50.0, 0)), 50.0);
    }

    #[test]
    fn explicit_target_overrides_average_but_respects_scaled_ceiling() {
        let cfg = BuyerConfig {
            price_target: 500.0,
            max_price_scale: 2.0,
            ..Default::default()
        };
        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(90.0), None);

        assert_eq!(s.avg_price, 100.0);
        assert_eq!(s.scaled_ceiling, Some(200.0));
        assert_eq!(s.target_price, 200.0);

        let cfg = BuyerConfig {
            price_target: 150.0,
            ..cfg
        };
        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(90.0), None);
        assert_eq!(s.target_price, 150.0);
    }

    #[test]
    fn absolute_ceiling_gates_on_next_difficulty() {
        let cfg = BuyerConfig {
            max_price_absolute: 95.0,
            ..Default::default()
        };
        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(96.0), None);

        assert_eq!(
            s.gate().skip_reason(),
            Some(SkipReason::PriceAboveAbsoluteCeiling)
        );

        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(95.0), None);
        assert_eq!(s.gate().skip_reason(), None);
    }

    #[test]
    fn scaled_ceiling_gates_on_estimate() {
        let cfg = BuyerConfig {
            max_price_absolute: 0.0,
            max_price_scale: 1.5,
            ..Default::default()
        };
        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(90.0), Some(151.0));

        let gate = s.gate();
        assert!(!gate.above_absolute_ceiling);
        assert!(gate.above_scaled_ceiling);
        assert_eq!(gate.skip_reason(), Some(SkipReason::PriceAboveScaledCeiling));
    }

    #[test]
    fn disabled_ceilings_never_gate() {
        let cfg = BuyerConfig {
            max_price_absolute: 0.0,
            max_price_scale: 0.0,
            min_price_scale: 0.0,
            ..Default::default()
        };
        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(1e9), Some(1e9));

        assert_eq!(s.gate(), PriceGate::default());
        assert!(!s.floor_defense_active());
    }

    #[test]
    fn floor_defense_triggers_below_scaled_floor() {
        let cfg = BuyerConfig::default(); // min scale 0.7
        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(90.0), Some(69.0));
        assert!(s.floor_defense_active());

        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(90.0), Some(71.0));
        assert!(!s.floor_defense_active());

        let s = PriceSignal::new(&cfg, &pool(1_000.0, 10), 100.0, diff(90.0), None);
        assert!(!s.floor_defense_active());
    }

    #[test]
    fn affordable_count_floors_and_guards() {
        assert_eq!(affordable_count(100.0, 30.0), 3);
        assert_eq!(affordable_count(29.9, 30.0), 0);
        assert_eq!(affordable_count(100.0, 0.0), 0);
        assert_eq!(affordable_count(-5.0, 30.0), 0);
    }

    #[test]
    fn quota_at_or_below_target_is_affordable_count() {
        assert_eq!(period_quota(90.0, 100.0, 7, 1.3), 7);
        assert_eq!(period_quota(100.0, 100.0, 7, 1.3), 7);
    }

    #[test]
    fn quota_decays_above_target() {
        // 1.3^-2 = 0.5917..., * 10 = 5.9 -> 5
        assert_eq!(period_quota(102.0, 100.0, 10, 1.3), 5);
        // Far above target the quota collapses to zero.
        assert_eq!(period_quota(200.0, 100.0, 10, 1.3), 0);
    }
}
