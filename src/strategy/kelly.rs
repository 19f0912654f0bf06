//! Kelly criterion stake optimization.
//!
//! Picks the market with the largest edge, sizes it with a fractional
//! Kelly multiplier taken from the risk profile, caps the stake against
//! the bankroll, and attaches a Monte Carlo risk report. Rejections are
//! returned as `BettingRecommendation::Skip` values.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::monte_carlo::{rng_from_seed, MonteCarloSimulator, RuinDefinition};
use crate::types::{
    BetRecommendation, BettingRecommendation, CalibratedPrediction, ConfidenceTier,
    MonteCarloResult, Odds, Outcome, RiskProfile, RiskTier, SkipReason, SkipRecommendation,
};

/// Default number of bets kept by `optimize_batch`.
pub const DEFAULT_MAX_BETS: usize = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Minimum edge (model prob − implied prob) worth betting.
    pub min_edge: f64,
    /// Minimum model confidence.
    pub min_confidence: f64,
    /// Soft cap on a single stake as a fraction of bankroll.
    pub max_stake_pct: f64,
    /// Hard ceiling on a single stake as a fraction of bankroll.
    pub hard_cap_pct: f64,
    pub simulation_iterations: usize,
    /// Simulation seed (0 = system entropy).
    pub random_seed: u64,
    pub ruin: RuinDefinition,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            min_edge: 0.02,
            min_confidence: 0.60,
            max_stake_pct: 0.05,
            hard_cap_pct: 0.10,
            simulation_iterations: 10_000,
            random_seed: 0,
            ruin: RuinDefinition::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly math
// ---------------------------------------------------------------------------

/// Full Kelly fraction f* = (p·b − q) / b with b = odds − 1.
///
/// Returns 0 for odds that pay nothing (b ≤ 0). May be negative.
pub fn full_kelly(probability: f64, odds: f64) -> f64 {
    let b = odds - 1.0;
    if b <= 0.0 {
        return 0.0;
    }
    let q = 1.0 - probability;
    (probability * b - q) / b
}

/// Edge = model probability − bookmaker-implied probability.
pub fn edge(probability: f64, odds: f64) -> f64 {
    if odds <= 0.0 {
        return -1.0;
    }
    probability - 1.0 / odds
}

/// Market with the largest edge. Ties resolve in home, draw, away order.
pub fn best_market(prediction: &CalibratedPrediction, odds: &Odds) -> (Outcome, f64) {
    let mut best = (Outcome::Home, edge(prediction.home, odds.home));
    for outcome in [Outcome::Draw, Outcome::Away] {
        let e = edge(prediction.probability(outcome), odds.price(outcome));
        if e > best.1 {
            best = (outcome, e);
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Batch types
// ---------------------------------------------------------------------------

/// One match offered to `optimize_batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub match_id: String,
    pub prediction: CalibratedPrediction,
    pub odds: Odds,
}

/// A surviving bet from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedBet {
    pub match_id: String,
    pub recommendation: BetRecommendation,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KellyOptimizer {
    config: KellyConfig,
    simulator: MonteCarloSimulator,
}

impl KellyOptimizer {
    pub fn new(config: KellyConfig) -> Self {
        let simulator = MonteCarloSimulator::new(config.ruin);
        Self { config, simulator }
    }

    /// Access the Kelly configuration.
    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Produce a bet/skip recommendation for one match.
    pub fn optimize(
        &self,
        prediction: &CalibratedPrediction,
        odds: &Odds,
        bankroll: f64,
        profile: RiskProfile,
    ) -> BettingRecommendation {
        if let Err(e) = prediction.validate().and_then(|_| odds.validate()) {
            return Self::invalid(e.to_string());
        }
        if !(bankroll > 0.0) || !bankroll.is_finite() {
            return Self::invalid(format!("bankroll must be positive, got {bankroll}"));
        }

        let (market, best_edge) = best_market(prediction, odds);
        let price = odds.price(market);

        if best_edge < self.config.min_edge {
            debug!(
                market = %market,
                edge = format!("{:.2}%", best_edge * 100.0),
                "Edge below minimum, skipping"
            );
            return BettingRecommendation::Skip(SkipRecommendation {
                market,
                edge_pct: best_edge * 100.0,
                reason: SkipReason::InsufficientEdge {
                    edge: best_edge,
                    min_edge: self.config.min_edge,
                },
                reasoning: format!(
                    "Best edge {:.2}% on {market} @ {price:.2} is below the {:.2}% minimum",
                    best_edge * 100.0,
                    self.config.min_edge * 100.0
                ),
                simulation: MonteCarloResult::empty(),
            });
        }

        if prediction.confidence < self.config.min_confidence {
            debug!(
                confidence = format!("{:.0}%", prediction.confidence * 100.0),
                "Confidence below minimum, skipping"
            );
            return BettingRecommendation::Skip(SkipRecommendation {
                market,
                edge_pct: best_edge * 100.0,
                reason: SkipReason::LowConfidence {
                    confidence: prediction.confidence,
                    min_confidence: self.config.min_confidence,
                },
                reasoning: format!(
                    "Model confidence {:.1}% is below the {:.1}% minimum (edge {:.2}% on {market})",
                    prediction.confidence * 100.0,
                    self.config.min_confidence * 100.0,
                    best_edge * 100.0
                ),
                simulation: MonteCarloResult::empty(),
            });
        }

        let p = prediction.probability(market);
        let kelly = full_kelly(p, price);
        let adjusted = (kelly * profile.kelly_multiplier()).max(0.0);

        let stake = (adjusted * bankroll)
            .min(self.config.max_stake_pct * bankroll)
            .min(self.config.hard_cap_pct * bankroll)
            .max(0.0);

        let mut rng = rng_from_seed(self.config.random_seed);
        let simulation = self.simulator.simulate(
            &mut rng,
            p,
            price,
            stake,
            bankroll,
            self.config.simulation_iterations,
        );

        let expected_value = stake * (p * (price - 1.0) - (1.0 - p));
        let confidence = self.confidence_tier(prediction.confidence, best_edge, &simulation);
        let risk = self.risk_tier(stake / bankroll, &simulation);
        let reasoning = Self::compose_reasoning(
            market,
            price,
            best_edge,
            expected_value,
            prediction.confidence,
            &simulation,
        );

        info!(
            market = %market,
            odds = price,
            edge = format!("{:.2}%", best_edge * 100.0),
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            adjusted = format!("{:.2}%", adjusted * 100.0),
            stake = format!("{:.2}", stake),
            ev = format!("{:.2}", expected_value),
            profile = %profile,
            "Stake optimized"
        );

        BettingRecommendation::Bet(BetRecommendation {
            market,
            odds: price,
            stake,
            edge_pct: best_edge * 100.0,
            expected_value,
            kelly_fraction: adjusted,
            simulation,
            reasoning,
            confidence,
            risk,
        })
    }

    /// Scale a sized bet by `multiplier` (clamped to 0–1) and re-run the
    /// risk simulation at the reduced stake.
    pub fn scale_bet(
        &self,
        bet: &BetRecommendation,
        multiplier: f64,
        bankroll: f64,
    ) -> BetRecommendation {
        let multiplier = multiplier.clamp(0.0, 1.0);
        let p = bet.edge_pct / 100.0 + 1.0 / bet.odds;
        let stake = bet.stake * multiplier;

        let mut rng = rng_from_seed(self.config.random_seed);
        let simulation = self.simulator.simulate(
            &mut rng,
            p,
            bet.odds,
            stake,
            bankroll,
            self.config.simulation_iterations,
        );
        let risk = if bankroll > 0.0 {
            self.risk_tier(stake / bankroll, &simulation)
        } else {
            bet.risk
        };

        debug!(
            market = %bet.market,
            multiplier,
            stake = format!("{:.2}", stake),
            "Stake scaled"
        );

        BetRecommendation {
            stake,
            expected_value: bet.expected_value * multiplier,
            kelly_fraction: bet.kelly_fraction * multiplier,
            simulation,
            risk,
            ..bet.clone()
        }
    }

    /// Optimize every candidate concurrently, keep bets only, best edge first.
    pub async fn optimize_batch(
        &self,
        candidates: &[MatchCandidate],
        bankroll: f64,
        profile: RiskProfile,
        max_bets: usize,
    ) -> Vec<RankedBet> {
        let tasks = candidates.iter().cloned().map(|candidate| {
            let optimizer = self.clone();
            tokio::task::spawn_blocking(move || {
                let rec = optimizer.optimize(
                    &candidate.prediction,
                    &candidate.odds,
                    bankroll,
                    profile,
                );
                (candidate.match_id, rec)
            })
        });

        let mut bets: Vec<RankedBet> = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((match_id, rec)) => {
                    if let Some(recommendation) = rec.into_bet() {
                        bets.push(RankedBet { match_id, recommendation });
                    }
                }
                Err(e) => warn!(error = %e, "Batch optimization task failed"),
            }
        }

        bets.sort_by(|a, b| {
            b.recommendation
                .edge_pct
                .partial_cmp(&a.recommendation.edge_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        bets.truncate(max_bets);

        info!(
            candidates = candidates.len(),
            selected = bets.len(),
            max_bets,
            "Batch optimization complete"
        );

        bets
    }

    fn confidence_tier(
        &self,
        confidence: f64,
        edge: f64,
        simulation: &MonteCarloResult,
    ) -> ConfidenceTier {
        let ruin = simulation.ruin_probability;
        if confidence > 0.75 && edge > 0.05 && ruin < 0.01 {
            ConfidenceTier::High
        } else if confidence > 0.65 && edge > 0.03 && ruin < 0.05 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    fn risk_tier(&self, stake_fraction: f64, simulation: &MonteCarloResult) -> RiskTier {
        let ruin = simulation.ruin_probability;
        if ruin > 0.05 || stake_fraction >= self.config.max_stake_pct {
            RiskTier::High
        } else if ruin > 0.01 || stake_fraction >= self.config.max_stake_pct / 2.0 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    fn compose_reasoning(
        market: Outcome,
        price: f64,
        edge: f64,
        expected_value: f64,
        confidence: f64,
        simulation: &MonteCarloResult,
    ) -> String {
        let mut text = format!(
            "Bet {market} @ {price:.2}: edge {:.2}%, expected value {expected_value:+.2}, \
             simulated win rate {:.1}%, model confidence {:.0}%.",
            edge * 100.0,
            simulation.win_rate * 100.0,
            confidence * 100.0,
        );
        if simulation.ruin_probability > 0.05 {
            text.push_str(&format!(
                " Warning: elevated ruin probability ({:.1}%).",
                simulation.ruin_probability * 100.0
            ));
        }
        if simulation.sharpe_ratio > 1.5 {
            text.push_str(&format!(
                " Strong risk-adjusted return (Sharpe {:.2}).",
                simulation.sharpe_ratio
            ));
        }
        text
    }

    fn invalid(message: String) -> BettingRecommendation {
        warn!(reason = %message, "Rejecting invalid optimization input");
        BettingRecommendation::Skip(SkipRecommendation {
            market: Outcome::Home,
            edge_pct: 0.0,
            reasoning: format!("Cannot size bet: {message}"),
            reason: SkipReason::InvalidInput { message },
            simulation: MonteCarloResult::empty(),
        })
    }
}

impl Default for KellyOptimizer {
    fn default() -> Self {
        Self::new(KellyConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_optimizer() -> KellyOptimizer {
        KellyOptimizer::new(KellyConfig {
            random_seed: 7,
            ..KellyConfig::default()
        })
    }

    fn make_prediction() -> CalibratedPrediction {
        CalibratedPrediction::new(0.60, 0.25, 0.15, 0.80)
    }

    #[test]
    fn test_full_kelly_formula() {
        assert!((full_kelly(0.60, 1.80) - 0.10).abs() < 1e-9);
        assert!(full_kelly(0.10, 5.0) < 0.0);
        assert_eq!(full_kelly(0.9, 1.0), 0.0);
    }

    #[test]
    fn test_best_market_prefers_largest_edge() {
        let (market, e) = best_market(&make_prediction(), &Odds::new(1.80, 3.40, 5.50));
        assert_eq!(market, Outcome::Home);
        assert!((e - (0.60 - 1.0 / 1.80)).abs() < 1e-12);
    }

    #[test]
    fn test_best_market_tie_keeps_home_first() {
        let prediction = CalibratedPrediction::new(0.40, 0.20, 0.40, 0.9);
        let (market, _) = best_market(&prediction, &Odds::new(3.0, 6.0, 3.0));
        assert_eq!(market, Outcome::Home);
    }

    #[test]
    fn test_scenario_moderate_home_bet() {
        let rec = seeded_optimizer().optimize(
            &make_prediction(),
            &Odds::new(1.80, 3.40, 5.50),
            10_000.0,
            RiskProfile::Moderate,
        );
        let bet = rec.clone().into_bet().expect("should bet");
        assert_eq!(bet.market, Outcome::Home);
        assert!((bet.edge_pct - 4.444).abs() < 0.01);
        assert!((bet.kelly_fraction - 0.025).abs() < 1e-9);
        assert!((bet.stake - 250.0).abs() < 1e-6);
        // 250 × (0.6 × 0.8 − 0.4) = 20
        assert!((bet.expected_value - 20.0).abs() < 1e-6);
        assert_eq!(bet.simulation.iterations, 10_000);
        assert_eq!(bet.confidence, ConfidenceTier::Medium);
        assert!(bet.reasoning.contains("home"));
    }

    #[test]
    fn test_negative_edge_skips() {
        let rec = seeded_optimizer().optimize(
            &make_prediction(),
            &Odds::new(1.60, 3.40, 5.50),
            10_000.0,
            RiskProfile::Moderate,
        );
        assert!(!rec.is_bet());
        assert_eq!(rec.stake(), 0.0);
        assert!(rec.simulation().is_empty());
        match rec {
            BettingRecommendation::Skip(s) => {
                assert!(matches!(s.reason, SkipReason::InsufficientEdge { .. }));
                assert!(s.reasoning.contains('%'));
            }
            _ => panic!("expected skip"),
        }
    }

    #[test]
    fn test_low_confidence_skips_without_simulation() {
        let prediction = CalibratedPrediction::new(0.60, 0.25, 0.15, 0.55);
        let rec = seeded_optimizer().optimize(
            &prediction,
            &Odds::new(1.80, 3.40, 5.50),
            10_000.0,
            RiskProfile::Moderate,
        );
        match rec {
            BettingRecommendation::Skip(s) => {
                assert!(matches!(s.reason, SkipReason::LowConfidence { .. }));
                assert!(s.simulation.is_empty());
            }
            _ => panic!("expected skip"),
        }
    }

    #[test]
    fn test_kelly_fraction_monotonic_across_profiles() {
        let opt = seeded_optimizer();
        let odds = Odds::new(1.80, 3.40, 5.50);
        let fractions: Vec<f64> = [
            RiskProfile::Conservative,
            RiskProfile::Moderate,
            RiskProfile::Aggressive,
        ]
        .into_iter()
        .map(|p| opt.optimize(&make_prediction(), &odds, 10_000.0, p).kelly_fraction())
        .collect();
        assert!(fractions[0] <= fractions[1]);
        assert!(fractions[1] <= fractions[2]);
    }

    #[test]
    fn test_stake_capped_at_max_pct() {
        // huge edge: full Kelly ≈ 0.5, aggressive → 0.25, capped at 5%
        let prediction = CalibratedPrediction::new(0.75, 0.15, 0.10, 0.95);
        let rec = seeded_optimizer().optimize(
            &prediction,
            &Odds::new(2.0, 6.0, 10.0),
            1_000.0,
            RiskProfile::Aggressive,
        );
        assert!(rec.is_bet());
        assert!((rec.stake() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_stake_never_exceeds_hard_cap() {
        let opt = KellyOptimizer::new(KellyConfig {
            max_stake_pct: 0.5,
            random_seed: 3,
            simulation_iterations: 200,
            ..KellyConfig::default()
        });
        let bankroll = 5_000.0;
        for home in [0.45, 0.55, 0.65, 0.80] {
            let rest = (1.0 - home) / 2.0;
            let prediction = CalibratedPrediction::new(home, rest, rest, 0.9);
            for price in [1.5, 2.0, 3.0, 6.0] {
                for profile in [RiskProfile::Conservative, RiskProfile::Aggressive] {
                    let rec = opt.optimize(&prediction, &Odds::new(price, 4.0, 4.0), bankroll, profile);
                    assert!(rec.stake() >= 0.0);
                    assert!(rec.stake() <= 0.10 * bankroll + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_invalid_inputs_skip() {
        let opt = seeded_optimizer();
        let bad_odds = opt.optimize(&make_prediction(), &Odds::new(1.0, 3.4, 5.5), 1_000.0, RiskProfile::Moderate);
        assert!(matches!(
            bad_odds,
            BettingRecommendation::Skip(SkipRecommendation { reason: SkipReason::InvalidInput { .. }, .. })
        ));
        let bad_bankroll = opt.optimize(&make_prediction(), &Odds::new(1.8, 3.4, 5.5), 0.0, RiskProfile::Moderate);
        assert!(!bad_bankroll.is_bet());
    }

    #[test]
    fn test_reasoning_flags_high_sharpe() {
        let text = KellyOptimizer::compose_reasoning(
            Outcome::Away,
            4.0,
            0.1,
            12.0,
            0.9,
            &MonteCarloResult {
                iterations: 10,
                sharpe_ratio: 2.0,
                ruin_probability: 0.08,
                ..MonteCarloResult::empty()
            },
        );
        assert!(text.contains("Sharpe"));
        assert!(text.contains("ruin"));
    }

    #[tokio::test]
    async fn test_batch_keeps_bets_sorted_and_truncated() {
        let opt = KellyOptimizer::new(KellyConfig {
            random_seed: 11,
            simulation_iterations: 500,
            ..KellyConfig::default()
        });
        let candidates = vec![
            MatchCandidate {
                match_id: "small".into(),
                prediction: make_prediction(),
                odds: Odds::new(1.75, 3.40, 5.50), // edge ≈ 2.9%
            },
            MatchCandidate {
                match_id: "none".into(),
                prediction: make_prediction(),
                odds: Odds::new(1.60, 3.40, 5.50), // negative edge
            },
            MatchCandidate {
                match_id: "big".into(),
                prediction: make_prediction(),
                odds: Odds::new(2.00, 3.40, 5.50), // edge 10%
            },
            MatchCandidate {
                match_id: "mid".into(),
                prediction: make_prediction(),
                odds: Odds::new(1.80, 3.40, 5.50), // edge ≈ 4.4%
            },
        ];

        let all = opt.optimize_batch(&candidates, 10_000.0, RiskProfile::Moderate, DEFAULT_MAX_BETS).await;
        let ids: Vec<_> = all.iter().map(|b| b.match_id.as_str()).collect();
        assert_eq!(ids, vec!["big", "mid", "small"]);

        let top = opt.optimize_batch(&candidates, 10_000.0, RiskProfile::Moderate, 2).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].match_id, "big");
    }

    #[tokio::test]
    async fn test_batch_empty() {
        let bets = seeded_optimizer()
            .optimize_batch(&[], 1_000.0, RiskProfile::Moderate, 5)
            .await;
        assert!(bets.is_empty());
    }

    #[test]
    fn test_scale_bet_halves_stake_and_resimulates() {
        let optimizer = seeded_optimizer();
        let bet = optimizer
            .optimize(
                &make_prediction(),
                &Odds::new(1.80, 3.40, 5.50),
                10_000.0,
                RiskProfile::Moderate,
            )
            .into_bet()
            .unwrap();

        let scaled = optimizer.scale_bet(&bet, 0.5, 10_000.0);
        assert!((scaled.stake - 125.0).abs() < 1e-6);
        assert!((scaled.expected_value - 10.0).abs() < 1e-6);
        assert!((scaled.kelly_fraction - 0.0125).abs() < 1e-9);
        assert_eq!(scaled.market, bet.market);
        // win probability recovered from edge and price
        assert!((scaled.simulation.win_rate - 0.6).abs() < 0.03);
        assert!(scaled.simulation.mean_return.abs() < bet.simulation.mean_return.abs() + 1.0);
        assert_eq!(scaled.risk, RiskTier::Low);
    }

    #[test]
    fn test_drawdown_ruin_tracks_sized_bankroll() {
        let optimizer = KellyOptimizer::new(KellyConfig {
            random_seed: 7,
            ruin: RuinDefinition::CumulativeDrawdown {
                ruin_fraction: 0.5,
                sequence_length: 50,
            },
            ..KellyConfig::default()
        });

        let bets: Vec<BetRecommendation> = [1_000.0, 10_000.0, 1_000_000.0]
            .iter()
            .map(|&bankroll| {
                optimizer
                    .optimize(
                        &make_prediction(),
                        &Odds::new(1.80, 3.40, 5.50),
                        bankroll,
                        RiskProfile::Moderate,
                    )
                    .into_bet()
                    .unwrap()
            })
            .collect();

        // 2.5% of each bankroll, so the drawdown picture is identical.
        for bet in &bets[1..] {
            assert!((bet.simulation.ruin_probability - bets[0].simulation.ruin_probability).abs() < 1e-9);
            assert_eq!(bet.risk, bets[0].risk);
            assert_eq!(bet.confidence, bets[0].confidence);
        }
    }
}
