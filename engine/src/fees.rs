//! Ticket fee estimation from recent chain history.
//!
//! Early in a period there are too few blocks at the current difficulty to
//! average over, so the estimator falls back to the historical window whose
//! difficulty is closest to the current one.

use std::time::Duration;

use common::warn_if_slow;
use tracing::{debug, instrument};

use crate::chain::{ChainData, FeeSummary};
use crate::config::{BuyerConfig, FeeSource};
use crate::error::PurchaseError;

const SLOW_CALL: Duration = Duration::from_millis(500);

/// Where an estimate came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeeBasis {
    RecentBlocks { blocks: u32 },
    ClosestWindow { start_height: u32, difficulty: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeeEstimate {
    /// Raw fee per kB in coins, before scaling and clamping.
    pub fee_per_kb: f64,
    pub basis: FeeBasis,
}

/// A historical window paired with the stake difficulty it ran at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowCandidate {
    pub summary: FeeSummary,
    pub difficulty: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct FeeEstimator {
    source: FeeSource,
    blocks_to_avg: u32,
    windows_to_consider: u32,
}

impl FeeEstimator {
    pub fn new(source: FeeSource, blocks_to_avg: u32, windows_to_consider: u32) -> Self {
        Self {
            source,
            blocks_to_avg: blocks_to_avg.max(1),
            windows_to_consider,
        }
    }

    pub fn from_config(cfg: &BuyerConfig) -> Self {
        Self::new(cfg.fee_source, cfg.blocks_to_avg, cfg.windows_to_consider)
    }

    /// Estimates the fee per kB for a block at offset `idx_in_period`, where
    /// `difficulty` is the stake difficulty tickets will be bought at.
    #[instrument(skip(self, chain), target = "fees", level = "debug")]
    pub async fn estimate<C: ChainData + ?Sized>(
        &self,
        chain: &C,
        idx_in_period: u32,
        difficulty: f64,
    ) -> Result<FeeEstimate, PurchaseError> {
        if idx_in_period < self.blocks_to_avg {
            self.from_closest_window(chain, difficulty).await
        } else {
            self.from_recent_blocks(chain).await
        }
    }

    async fn from_recent_blocks<C: ChainData + ?Sized>(
        &self,
        chain: &C,
    ) -> Result<FeeEstimate, PurchaseError> {
        let blocks = warn_if_slow(
            "ticketfeeinfo",
            SLOW_CALL,
            chain.block_fee_summaries(self.blocks_to_avg),
        )
        .await
        .map_err(|e| PurchaseError::collaborator("ticketfeeinfo (blocks)", e))?;

        let fee_per_kb = average_over_blocks(&blocks, self.source, self.blocks_to_avg);

        debug!(
            fee_per_kb,
            blocks = blocks.len(),
            "fee averaged over recent blocks"
        );

        Ok(FeeEstimate {
            fee_per_kb,
            basis: FeeBasis::RecentBlocks {
                blocks: self.blocks_to_avg,
            },
        })
    }

    async fn from_closest_window<C: ChainData + ?Sized>(
        &self,
        chain: &C,
        difficulty: f64,
    ) -> Result<FeeEstimate, PurchaseError> {
        let windows = warn_if_slow(
            "ticketfeeinfo",
            SLOW_CALL,
            chain.window_fee_summaries(self.windows_to_consider),
        )
        .await
        .map_err(|e| PurchaseError::collaborator("ticketfeeinfo (windows)", e))?;

        if windows.is_empty() {
            return Err(PurchaseError::NotEnoughData(
                "no fee windows available to estimate from",
            ));
        }

        let mut candidates = Vec::with_capacity(windows.len());
        for summary in windows {
            let window_difficulty = chain
                .stake_difficulty_at(summary.start_height)
                .await
                .map_err(|e| PurchaseError::collaborator("window stake difficulty", e))?;

            candidates.push(WindowCandidate {
                summary,
                difficulty: window_difficulty,
            });
        }

        let Some(best) = closest_window(&candidates, difficulty) else {
            return Err(PurchaseError::NotEnoughData(
                "no fee windows available to estimate from",
            ));
        };

        let fee_per_kb = pick(&best.summary, self.source);

        debug!(
            fee_per_kb,
            window_start = best.summary.start_height,
            window_difficulty = best.difficulty,
            difficulty,
            "fee taken from closest-difficulty window"
        );

        Ok(FeeEstimate {
            fee_per_kb,
            basis: FeeBasis::ClosestWindow {
                start_height: best.summary.start_height,
                difficulty: best.difficulty,
            },
        })
    }
}

fn pick(summary: &FeeSummary, source: FeeSource) -> f64 {
    match source {
        FeeSource::Mean => summary.mean,
        FeeSource::Median => summary.median,
    }
}

/// Sum of the chosen statistic divided by the configured lookback `n`, not by
/// the number of summaries returned.
pub fn average_over_blocks(blocks: &[FeeSummary], source: FeeSource, n: u32) -> f64 {
    let sum: f64 = blocks.iter().map(|b| pick(b, source)).sum();
    sum / f64::from(n.max(1))
}

/// The candidate with the smallest `|difficulty - current|`. Ties go to the
/// earliest candidate in input order.
pub fn closest_window(candidates: &[WindowCandidate], current: f64) -> Option<&WindowCandidate> {
    let mut best: Option<(&WindowCandidate, f64)> = None;

    for c in candidates {
        let distance = (c.difficulty - current).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((c, distance)),
        }
    }

    best.map(|(c, _)| c)
}

/// Applies the operator's scaling factor and clamps into `[min_fee, max_fee]`.
pub fn scale_and_clamp(raw: f64, scaling: f64, min_fee: f64, max_fee: f64) -> f64 {
    let scaled = raw * scaling;
    if scaled > max_fee {
        debug!(scaled, max_fee, "scaled fee above max; using max");
        max_fee
    } else if scaled < min_fee {
        debug!(scaled, min_fee, "scaled fee below min; using min");
        min_fee
    } else {
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(start_height: u32, mean: f64, median: f64) -> FeeSummary {
        FeeSummary {
            start_height,
            mean,
            median,
        }
    }

    fn candidate(start_height: u32, difficulty: f64, mean: f64) -> WindowCandidate {
        WindowCandidate {
            summary: summary(start_height, mean, mean / 2.0),
            difficulty,
        }
    }

    #[test]
    fn closest_window_picks_minimum_distance() {
        let c = vec![
            candidate(0, 50.0, 0.1),
            candidate(144, 98.0, 0.2),
            candidate(288, 130.0, 0.3),
        ];

        let best = closest_window(&c, 100.0).unwrap();
        assert_eq!(best.summary.start_height, 144);
    }

    #[test]
    fn closest_window_ties_resolve_to_first() {
        let c = vec![
            candidate(0, 90.0, 0.1),
            candidate(144, 110.0, 0.2),
            candidate(288, 90.0, 0.3),
        ];

        let best = closest_window(&c, 100.0).unwrap();
        assert_eq!(best.summary.start_height, 0);
    }

    #[test]
    fn closest_window_of_nothing_is_none() {
        assert!(closest_window(&[], 100.0).is_none());
    }

    #[test]
    fn block_average_divides_by_lookback() {
        let blocks = vec![summary(10, 0.2, 0.1), summary(11, 0.4, 0.3)];

        // Two summaries, lookback of 4.
        assert!((average_over_blocks(&blocks, FeeSource::Mean, 4) - 0.15).abs() < 1e-12);
        assert!((average_over_blocks(&blocks, FeeSource::Median, 4) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn scaling_and_clamping() {
        assert!((scale_and_clamp(0.1, 1.05, 0.01, 1.0) - 0.105).abs() < 1e-12);
        assert_eq!(scale_and_clamp(2.0, 1.05, 0.01, 1.0), 1.0);
        assert_eq!(scale_and_clamp(0.0, 1.05, 0.01, 1.0), 0.01);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]
        #[test]
        fn closest_window_is_first_minimum(
            diffs in prop::collection::vec(0u32..50, 1..20),
            current in 0u32..50,
        ) {
            let candidates: Vec<WindowCandidate> = diffs
                .iter()
                .enumerate()
                .map(|(i, d)| WindowCandidate {
                    summary: FeeSummary { start_height: i as u32, mean: 0.0, median: 0.0 },
                    difficulty: f64::from(*d),
                })
                .collect();

            let best = closest_window(&candidates, f64::from(current)).unwrap();
            let best_idx = best.summary.start_height as usize;
            let best_dist = (best.difficulty - f64::from(current)).abs();

            for (i, c) in candidates.iter().enumerate() {
                let d = (c.difficulty - f64::from(current)).abs();
                prop_assert!(d >= best_dist);
                if i < best_idx {
                    prop_assert!(d > best_dist, "earlier tie at {} was skipped", i);
                }
            }
        }
    }
}
