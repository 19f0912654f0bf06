//! Strategy engine: Monte Carlo risk, Kelly sizing and the ensemble
//! disagreement gate, composed with odds aggregation and bet timing.

pub mod disagreement;
pub mod kelly;
pub mod monte_carlo;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::odds::{OddsAggregator, OddsMovement, OddsProvider};
use crate::storage::OddsStore;
use crate::timing::{self, BetTimingOptimizer, MonitorHandle, TimingAlert, TimingRecommendation};
use crate::types::{
    AggregatedOdds, BettingRecommendation, CalibratedPrediction, EngineError, ModelVote, Odds,
    Outcome, RiskProfile, SkipReason, SkipRecommendation,
};
use disagreement::{DisagreementAnalysis, DisagreementFilter, EnsembleConfidence};
use kelly::{KellyOptimizer, MatchCandidate, RankedBet};

// ---------------------------------------------------------------------------
// Pipeline types
// ---------------------------------------------------------------------------

/// Everything needed to decide on one fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRequest {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub league: Option<String>,
    pub kickoff: DateTime<Utc>,
    pub prediction: CalibratedPrediction,
    /// Raw per-model votes. Empty skips the disagreement gate.
    #[serde(default)]
    pub votes: Vec<ModelVote>,
    pub bankroll: f64,
    #[serde(default)]
    pub risk_profile: RiskProfile,
}

/// Outcome of the full Disagreement → Odds → Kelly → Timing pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct MatchDecision {
    pub match_id: String,
    pub ensemble: Option<EnsembleConfidence>,
    /// Disagreement on the recommended market.
    pub disagreement: Option<DisagreementAnalysis>,
    pub odds: AggregatedOdds,
    pub movement: OddsMovement,
    pub recommendation: BettingRecommendation,
    /// Present only when the recommendation is a bet.
    pub timing: Option<TimingRecommendation>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Facade over the decision components.
///
/// Cheap to share behind an `Arc`; every entry point takes `&self`.
pub struct DecisionEngine {
    kelly: KellyOptimizer,
    disagreement: DisagreementFilter,
    aggregator: Arc<OddsAggregator>,
    timing: Arc<BetTimingOptimizer>,
}

impl DecisionEngine {
    pub fn new(
        kelly: KellyOptimizer,
        disagreement: DisagreementFilter,
        aggregator: Arc<OddsAggregator>,
        timing: Arc<BetTimingOptimizer>,
    ) -> Self {
        Self {
            kelly,
            disagreement,
            aggregator,
            timing,
        }
    }

    /// Build every component from configuration.
    pub fn from_config(
        config: &AppConfig,
        providers: Vec<Arc<dyn OddsProvider>>,
        store: Arc<dyn OddsStore>,
    ) -> Self {
        Self::new(
            KellyOptimizer::new(config.kelly.clone()),
            DisagreementFilter::new(config.disagreement.clone()),
            Arc::new(OddsAggregator::new(providers, config.aggregator.clone())),
            Arc::new(BetTimingOptimizer::new(config.timing.clone(), store)),
        )
    }

    pub fn kelly(&self) -> &KellyOptimizer {
        &self.kelly
    }

    pub fn disagreement(&self) -> &DisagreementFilter {
        &self.disagreement
    }

    pub fn aggregator(&self) -> &Arc<OddsAggregator> {
        &self.aggregator
    }

    pub fn timing(&self) -> &Arc<BetTimingOptimizer> {
        &self.timing
    }

    // -- Single-component entry points ----------------------------------------

    pub fn optimize_stake(
        &self,
        prediction: &CalibratedPrediction,
        odds: &Odds,
        bankroll: f64,
        profile: RiskProfile,
    ) -> BettingRecommendation {
        self.kelly.optimize(prediction, odds, bankroll, profile)
    }

    pub async fn optimize_batch(
        &self,
        candidates: &[MatchCandidate],
        bankroll: f64,
        profile: RiskProfile,
        max_bets: usize,
    ) -> Vec<RankedBet> {
        self.kelly
            .optimize_batch(candidates, bankroll, profile, max_bets)
            .await
    }

    pub async fn get_odds(
        &self,
        home: &str,
        away: &str,
        league: Option<&str>,
    ) -> Result<AggregatedOdds, EngineError> {
        self.aggregator.get_odds(home, away, league).await
    }

    pub async fn analyze_odds_pattern(
        &self,
        match_id: &str,
        market: Outcome,
        kickoff: DateTime<Utc>,
    ) -> TimingRecommendation {
        self.timing.analyze_pattern(match_id, market, kickoff).await
    }

    pub fn calculate_ensemble_disagreement(
        &self,
        votes: &[ModelVote],
        outcome: Outcome,
    ) -> DisagreementAnalysis {
        self.disagreement.analyze(votes, outcome)
    }

    pub fn ensemble_confidence(&self, votes: &[ModelVote]) -> EnsembleConfidence {
        self.disagreement.confidence(votes)
    }

    pub async fn record_snapshot(
        &self,
        match_id: &str,
        odds: &Odds,
        bookmaker: &str,
    ) -> Result<(), EngineError> {
        self.timing.record_snapshot(match_id, odds, bookmaker).await
    }

    /// Start a background timing monitor using the configured poll interval.
    pub fn monitor(
        &self,
        match_id: &str,
        market: Outcome,
        kickoff: DateTime<Utc>,
        alerts: mpsc::Sender<TimingAlert>,
    ) -> MonitorHandle {
        timing::monitor_and_alert(
            self.timing.clone(),
            match_id.to_string(),
            market,
            kickoff,
            self.timing.config().poll_interval(),
            alerts,
        )
    }

    // -- Composed pipeline ----------------------------------------------------

    /// Apply a disagreement analysis to a recommendation.
    ///
    /// A zero multiplier turns a bet into a skip; a partial multiplier
    /// shrinks the stake. Skips pass through unchanged.
    pub fn apply_disagreement(
        &self,
        recommendation: BettingRecommendation,
        analysis: &DisagreementAnalysis,
        bankroll: f64,
    ) -> BettingRecommendation {
        let bet = match recommendation {
            BettingRecommendation::Bet(bet) => bet,
            skip => return skip,
        };
        let multiplier = analysis.stake_multiplier;

        if multiplier <= 0.0 {
            info!(
                market = %bet.market,
                std_dev = format!("{:.1}pp", analysis.std_dev * 100.0),
                severity = %analysis.severity,
                outliers = analysis.outliers.len(),
                "Bet blocked by model disagreement"
            );
            return BettingRecommendation::Skip(SkipRecommendation {
                market: bet.market,
                edge_pct: bet.edge_pct,
                reason: SkipReason::ModelDisagreement {
                    std_dev: analysis.std_dev,
                    outliers: analysis.outliers.len(),
                },
                reasoning: format!(
                    "Models disagree on {} ({} severity, stdev {:.1}pp, {} outlier(s)); \
                     edge {:.2}% not trusted",
                    bet.market,
                    analysis.severity,
                    analysis.std_dev * 100.0,
                    analysis.outliers.len(),
                    bet.edge_pct
                ),
                simulation: bet.simulation,
            });
        }

        if multiplier < 1.0 {
            let mut scaled = self.kelly.scale_bet(&bet, multiplier, bankroll);
            scaled.reasoning.push_str(&format!(
                " Stake reduced to {:.0}% for {} model disagreement.",
                multiplier * 100.0,
                analysis.severity
            ));
            return BettingRecommendation::Bet(scaled);
        }

        BettingRecommendation::Bet(bet)
    }

    /// Run the full pipeline for one fixture.
    ///
    /// Fails only when no odds source answers; every other condition is
    /// expressed in the returned decision.
    pub async fn decide(&self, request: &MatchRequest) -> Result<MatchDecision, EngineError> {
        let ensemble = if request.votes.is_empty() {
            None
        } else {
            Some(self.disagreement.confidence(&request.votes))
        };

        let odds = self
            .aggregator
            .get_odds(
                &request.home_team,
                &request.away_team,
                request.league.as_deref(),
            )
            .await?;

        let since = Utc::now() - Duration::hours(self.timing.config().lookback_hours);
        let movement = self
            .aggregator
            .track_movement_for_match(
                &request.match_id,
                &odds.best,
                self.timing.store().as_ref(),
                since,
            )
            .await;

        if let Err(e) = self
            .timing
            .record_snapshot(&request.match_id, &odds.best, "best")
            .await
        {
            warn!(match_id = %request.match_id, error = %e, "Failed to record odds snapshot");
        }

        let mut recommendation = self.kelly.optimize(
            &request.prediction,
            &odds.best,
            request.bankroll,
            request.risk_profile,
        );

        let disagreement = ensemble.as_ref().and_then(|e| {
            e.per_outcome
                .iter()
                .find(|a| a.outcome == recommendation.market())
                .cloned()
        });
        if let Some(analysis) = &disagreement {
            recommendation = self.apply_disagreement(recommendation, analysis, request.bankroll);
        }

        let timing = if recommendation.is_bet() {
            Some(
                self.timing
                    .analyze_pattern(&request.match_id, recommendation.market(), request.kickoff)
                    .await,
            )
        } else {
            debug!(match_id = %request.match_id, "No bet, timing analysis skipped");
            None
        };

        info!(
            match_id = %request.match_id,
            decision = %recommendation,
            timing = timing.as_ref().map(|t| t.action.to_string()).unwrap_or_default(),
            sources = odds.source_count(),
            "Match decision"
        );

        Ok(MatchDecision {
            match_id: request.match_id.clone(),
            ensemble,
            disagreement,
            odds,
            movement,
            recommendation,
            timing,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
