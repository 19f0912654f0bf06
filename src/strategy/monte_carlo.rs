//! Monte Carlo risk simulation for a single fixed-odds bet.
//!
//! Each trial draws a uniform sample: below the win probability the bet
//! pays `stake × (odds − 1)`, otherwise it loses the stake. The sorted
//! trial outcomes give the return distribution reported alongside every
//! Kelly recommendation.
//!
//! The random source is a type parameter so callers (and tests) can inject
//! a seeded generator; `rng_from_seed(0)` falls back to system entropy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::MonteCarloResult;

/// Number of sorted outcomes kept on the result for display.
pub const DISPLAY_SAMPLE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Ruin definitions
// ---------------------------------------------------------------------------

/// How a simulated outcome counts towards ruin probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuinDefinition {
    /// A single trial whose loss is at least `loss_multiple × stake`.
    ///
    /// With a one-stake maximum loss this never triggers for multiples above 1.
    SingleTrialLoss { loss_multiple: f64 },
    /// Consecutive trials grouped into sequences of `sequence_length` bets.
    /// A sequence is ruined once its running loss reaches
    /// `ruin_fraction` of the bankroll the bet is sized against.
    CumulativeDrawdown {
        ruin_fraction: f64,
        sequence_length: usize,
    },
}

impl Default for RuinDefinition {
    fn default() -> Self {
        RuinDefinition::SingleTrialLoss { loss_multiple: 10.0 }
    }
}

impl RuinDefinition {
    /// Fraction of ruined trials (or sequences). `outcomes` must be in trial order.
    pub fn probability(&self, outcomes: &[f64], stake: f64, bankroll: f64) -> f64 {
        if outcomes.is_empty() {
            return 0.0;
        }
        match *self {
            RuinDefinition::SingleTrialLoss { loss_multiple } => {
                let threshold = loss_multiple * stake;
                let ruined = outcomes.iter().filter(|&&o| -o >= threshold).count();
                ruined as f64 / outcomes.len() as f64
            }
            RuinDefinition::CumulativeDrawdown {
                ruin_fraction,
                sequence_length,
            } => {
                let limit = ruin_fraction * bankroll;
                let mut sequences = 0usize;
                let mut ruined = 0usize;
                for chunk in outcomes.chunks(sequence_length.max(1)) {
                    sequences += 1;
                    let mut running = 0.0;
                    for outcome in chunk {
                        running += outcome;
                        if -running >= limit {
                            ruined += 1;
                            break;
                        }
                    }
                }
                ruined as f64 / sequences as f64
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Build the simulation RNG. Seed 0 means system entropy.
pub fn rng_from_seed(seed: u64) -> StdRng {
    if seed > 0 {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_entropy()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MonteCarloSimulator {
    ruin: RuinDefinition,
}

impl MonteCarloSimulator {
    pub fn new(ruin: RuinDefinition) -> Self {
        Self { ruin }
    }

    pub fn ruin_definition(&self) -> &RuinDefinition {
        &self.ruin
    }

    /// Simulate `iterations` independent trials of one bet placed from
    /// `bankroll`.
    ///
    /// `iterations` below 1 is treated as 1. A zero (or negative) stake
    /// yields all-zero statistics without drawing any samples.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        win_probability: f64,
        payout_odds: f64,
        stake: f64,
        bankroll: f64,
        iterations: usize,
    ) -> MonteCarloResult {
        let iterations = iterations.max(1);

        if stake <= 0.0 || !stake.is_finite() {
            return MonteCarloResult {
                iterations,
                ..MonteCarloResult::empty()
            };
        }

        let profit_on_win = stake * (payout_odds - 1.0);
        let mut outcomes = Vec::with_capacity(iterations);
        let mut wins = 0usize;

        for _ in 0..iterations {
            if rng.gen::<f64>() < win_probability {
                wins += 1;
                outcomes.push(profit_on_win);
            } else {
                outcomes.push(-stake);
            }
        }

        // Ruin may depend on trial order, so measure it before sorting.
        let ruin_probability = self.ruin.probability(&outcomes, stake, bankroll);

        let n = outcomes.len() as f64;
        let mean = outcomes.iter().sum::<f64>() / n;
        let variance = outcomes.iter().map(|o| (o - mean).powi(2)).sum::<f64>() / n;
        let volatility = variance.sqrt();
        let sharpe_ratio = if volatility > f64::EPSILON {
            mean / volatility
        } else {
            0.0
        };

        outcomes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let percentile = |q: f64| -> f64 {
            let idx = ((n * q) as usize).min(outcomes.len() - 1);
            outcomes[idx]
        };

        let result = MonteCarloResult {
            iterations,
            mean_return: mean,
            win_rate: wins as f64 / n,
            ruin_probability,
            percentile_5: percentile(0.05),
            percentile_50: percentile(0.50),
            percentile_95: percentile(0.95),
            volatility,
            sharpe_ratio,
            sample: outcomes.iter().take(DISPLAY_SAMPLE_SIZE).copied().collect(),
        };

        debug!(
            iterations,
            win_probability,
            payout_odds,
            stake,
            mean = format!("{:.2}", result.mean_return),
            win_rate = format!("{:.1}%", result.win_rate * 100.0),
            "Monte Carlo simulation complete"
        );

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
