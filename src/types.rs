//! Shared types for the betting engine.
//!
//! These types form the data model used across all modules.
//! Strategy, odds, timing, and storage modules depend on them
//! without depending on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance on the sum of outcome probabilities.
pub const PROBABILITY_SUM_TOLERANCE: f64 = 0.02;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Match outcome / market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    /// All outcomes in tie-break order (home, draw, away).
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Home => write!(f, "home"),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Away => write!(f, "away"),
        }
    }
}

/// Parse an outcome name (case-insensitive).
impl std::str::FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "home" | "1" => Ok(Outcome::Home),
            "draw" | "x" => Ok(Outcome::Draw),
            "away" | "2" => Ok(Outcome::Away),
            _ => Err(anyhow::anyhow!("Unknown outcome: {s}")),
        }
    }
}

/// One value per outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OutcomeMap<T> {
    pub home: T,
    pub draw: T,
    pub away: T,
}

impl<T> OutcomeMap<T> {
    pub fn new(home: T, draw: T, away: T) -> Self {
        Self { home, draw, away }
    }

    pub fn get(&self, outcome: Outcome) -> &T {
        match outcome {
            Outcome::Home => &self.home,
            Outcome::Draw => &self.draw,
            Outcome::Away => &self.away,
        }
    }

    pub fn get_mut(&mut self, outcome: Outcome) -> &mut T {
        match outcome {
            Outcome::Home => &mut self.home,
            Outcome::Draw => &mut self.draw,
            Outcome::Away => &mut self.away,
        }
    }

    /// Build a map by evaluating `f` for every outcome.
    pub fn from_fn(mut f: impl FnMut(Outcome) -> T) -> Self {
        Self {
            home: f(Outcome::Home),
            draw: f(Outcome::Draw),
            away: f(Outcome::Away),
        }
    }
}

// ---------------------------------------------------------------------------
// Predictions
// ---------------------------------------------------------------------------

/// Calibrated match-outcome probabilities supplied by the prediction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedPrediction {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    /// Model confidence (0–1).
    pub confidence: f64,
}

impl CalibratedPrediction {
    pub fn new(home: f64, draw: f64, away: f64, confidence: f64) -> Self {
        Self { home, draw, away, confidence }
    }

    pub fn probability(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn total(&self) -> f64 {
        self.home + self.draw + self.away
    }

    /// Probabilities must be within [0, 1] and sum to ≈1; confidence within [0, 1].
    pub fn validate(&self) -> Result<(), EngineError> {
        for outcome in Outcome::ALL {
            let p = self.probability(outcome);
            if !(0.0..=1.0).contains(&p) || p.is_nan() {
                return Err(EngineError::InvalidInput(format!(
                    "{outcome} probability must be between 0 and 1, got {p}"
                )));
            }
        }
        if (self.total() - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(EngineError::InvalidInput(format!(
                "probabilities must sum to 1, got {:.4}",
                self.total()
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::InvalidInput(format!(
                "confidence must be between 0 and 1, got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CalibratedPrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "H={:.1}% D={:.1}% A={:.1}% conf={:.0}%",
            self.home * 100.0,
            self.draw * 100.0,
            self.away * 100.0,
            self.confidence * 100.0,
        )
    }
}

/// One ensemble member's probability vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVote {
    pub model: String,
    pub probabilities: OutcomeMap<f64>,
}

impl ModelVote {
    pub fn new(model: impl Into<String>, home: f64, draw: f64, away: f64) -> Self {
        Self {
            model: model.into(),
            probabilities: OutcomeMap::new(home, draw, away),
        }
    }

    pub fn probability(&self, outcome: Outcome) -> f64 {
        *self.probabilities.get(outcome)
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// Decimal odds per outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odds {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Odds {
    pub fn new(home: f64, draw: f64, away: f64) -> Self {
        Self {
            home,
            draw,
            away,
            source: None,
            timestamp: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Bookmaker-implied probability (1 / odds).
    pub fn implied_probability(&self, outcome: Outcome) -> f64 {
        let price = self.price(outcome);
        if price <= 0.0 {
            0.0
        } else {
            1.0 / price
        }
    }

    /// Sum of implied probabilities minus one (the bookmaker margin).
    pub fn overround(&self) -> f64 {
        Outcome::ALL
            .iter()
            .map(|o| self.implied_probability(*o))
            .sum::<f64>()
            - 1.0
    }

    /// Every price must be a real payout multiplier (> 1.0).
    pub fn validate(&self) -> Result<(), EngineError> {
        for outcome in Outcome::ALL {
            let price = self.price(outcome);
            if price.is_nan() || price <= 1.0 {
                return Err(EngineError::InvalidInput(format!(
                    "{outcome} odds must be greater than 1.0, got {price}"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} / {:.2} / {:.2}", self.home, self.draw, self.away)?;
        if let Some(source) = &self.source {
            write!(f, " [{source}]")?;
        }
        Ok(())
    }
}

/// A single provider's quote, captured for one aggregation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsSource {
    pub name: String,
    pub odds: Odds,
    /// Provider reliability weight (0–1).
    pub reliability: f64,
    pub captured_at: DateTime<Utc>,
}

/// Qualitative tightness of quoted prices across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTier {
    High,
    Medium,
    Low,
}

impl fmt::Display for LiquidityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidityTier::High => write!(f, "high"),
            LiquidityTier::Medium => write!(f, "medium"),
            LiquidityTier::Low => write!(f, "low"),
        }
    }
}

/// Best available prices merged across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedOdds {
    pub home_team: String,
    pub away_team: String,
    pub league: Option<String>,
    /// Maximum quoted price per outcome.
    pub best: Odds,
    /// Provider quoting the best price per outcome.
    pub best_source: OutcomeMap<String>,
    /// max − min per outcome.
    pub spread: OutcomeMap<f64>,
    pub liquidity: LiquidityTier,
    pub sources: Vec<OddsSource>,
    pub fetched_at: DateTime<Utc>,
}

impl AggregatedOdds {
    pub fn average_spread(&self) -> f64 {
        (self.spread.home + self.spread.draw + self.spread.away) / 3.0
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl fmt::Display for AggregatedOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v {}: best {} (sources={} liquidity={} avg_spread={:.3})",
            self.home_team,
            self.away_team,
            self.best,
            self.sources.len(),
            self.liquidity,
            self.average_spread(),
        )
    }
}

/// Timestamped odds triple for one match, as stored in the time-series store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    pub bookmaker: String,
}

impl OddsSnapshot {
    pub fn new(timestamp: DateTime<Utc>, odds: &Odds, bookmaker: impl Into<String>) -> Self {
        Self {
            timestamp,
            home: odds.home,
            draw: odds.draw,
            away: odds.away,
            bookmaker: bookmaker.into(),
        }
    }

    pub fn price(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn to_odds(&self) -> Odds {
        Odds {
            home: self.home,
            draw: self.draw,
            away: self.away,
            source: Some(self.bookmaker.clone()),
            timestamp: Some(self.timestamp),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Distribution of simulated single-bet returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MonteCarloResult {
    pub iterations: usize,
    pub mean_return: f64,
    pub win_rate: f64,
    pub ruin_probability: f64,
    pub percentile_5: f64,
    pub percentile_50: f64,
    pub percentile_95: f64,
    /// Population standard deviation of returns.
    pub volatility: f64,
    /// mean / stdev (0 when stdev is 0).
    pub sharpe_ratio: f64,
    /// First sorted outcomes, for display only.
    pub sample: Vec<f64>,
}

impl MonteCarloResult {
    /// All-zero result attached to rejected recommendations.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations == 0
    }
}

impl fmt::Display for MonteCarloResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} mean={:.2} win={:.1}% ruin={:.2}% p5={:.2} p50={:.2} p95={:.2} vol={:.2} sharpe={:.2}",
            self.iterations,
            self.mean_return,
            self.win_rate * 100.0,
            self.ruin_probability * 100.0,
            self.percentile_5,
            self.percentile_50,
            self.percentile_95,
            self.volatility,
            self.sharpe_ratio,
        )
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

/// Fractional-Kelly risk appetite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskProfile {
    /// Multiplier applied to the full Kelly fraction.
    pub fn kelly_multiplier(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 0.125,
            RiskProfile::Moderate => 0.25,
            RiskProfile::Aggressive => 0.5,
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::Conservative => write!(f, "conservative"),
            RiskProfile::Moderate => write!(f, "moderate"),
            RiskProfile::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl std::str::FromStr for RiskProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskProfile::Conservative),
            "moderate" => Ok(RiskProfile::Moderate),
            "aggressive" => Ok(RiskProfile::Aggressive),
            _ => Err(anyhow::anyhow!("Unknown risk profile: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
        }
    }
}

/// A sized bet ready to be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecommendation {
    pub market: Outcome,
    pub odds: f64,
    pub stake: f64,
    /// Edge in percentage points.
    pub edge_pct: f64,
    pub expected_value: f64,
    /// Kelly fraction after the risk-profile multiplier.
    pub kelly_fraction: f64,
    pub simulation: MonteCarloResult,
    pub reasoning: String,
    pub confidence: ConfidenceTier,
    pub risk: RiskTier,
}

/// Why a bet was not recommended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientEdge { edge: f64, min_edge: f64 },
    LowConfidence { confidence: f64, min_confidence: f64 },
    ModelDisagreement { std_dev: f64, outliers: usize },
    InvalidInput { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientEdge { edge, min_edge } => write!(
                f,
                "edge {:.2}% below minimum {:.2}%",
                edge * 100.0,
                min_edge * 100.0
            ),
            SkipReason::LowConfidence { confidence, min_confidence } => write!(
                f,
                "confidence {:.1}% below minimum {:.1}%",
                confidence * 100.0,
                min_confidence * 100.0
            ),
            SkipReason::ModelDisagreement { std_dev, outliers } => write!(
                f,
                "ensemble disagreement too high (stdev {:.1}pp, {outliers} outliers)",
                std_dev * 100.0
            ),
            SkipReason::InvalidInput { message } => write!(f, "invalid input: {message}"),
        }
    }
}

/// A rejected opportunity. Carries the best market examined and an empty simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecommendation {
    pub market: Outcome,
    pub edge_pct: f64,
    pub reason: SkipReason,
    pub reasoning: String,
    pub simulation: MonteCarloResult,
}

/// Outcome of stake optimization: bet or skip, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BettingRecommendation {
    Bet(BetRecommendation),
    Skip(SkipRecommendation),
}

impl BettingRecommendation {
    pub fn is_bet(&self) -> bool {
        matches!(self, BettingRecommendation::Bet(_))
    }

    pub fn market(&self) -> Outcome {
        match self {
            BettingRecommendation::Bet(b) => b.market,
            BettingRecommendation::Skip(s) => s.market,
        }
    }

    /// Recommended stake (0 for skips).
    pub fn stake(&self) -> f64 {
        match self {
            BettingRecommendation::Bet(b) => b.stake,
            BettingRecommendation::Skip(_) => 0.0,
        }
    }

    pub fn edge_pct(&self) -> f64 {
        match self {
            BettingRecommendation::Bet(b) => b.edge_pct,
            BettingRecommendation::Skip(s) => s.edge_pct,
        }
    }

    pub fn kelly_fraction(&self) -> f64 {
        match self {
            BettingRecommendation::Bet(b) => b.kelly_fraction,
            BettingRecommendation::Skip(_) => 0.0,
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            BettingRecommendation::Bet(b) => &b.reasoning,
            BettingRecommendation::Skip(s) => &s.reasoning,
        }
    }

    pub fn simulation(&self) -> &MonteCarloResult {
        match self {
            BettingRecommendation::Bet(b) => &b.simulation,
            BettingRecommendation::Skip(s) => &s.simulation,
        }
    }

    pub fn into_bet(self) -> Option<BetRecommendation> {
        match self {
            BettingRecommendation::Bet(b) => Some(b),
            BettingRecommendation::Skip(_) => None,
        }
    }
}

impl fmt::Display for BettingRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BettingRecommendation::Bet(b) => write!(
                f,
                "BET {} @ {:.2} stake={:.2} edge={:.1}% ev={:.2} kelly={:.2}% conf={} risk={}",
                b.market,
                b.odds,
                b.stake,
                b.edge_pct,
                b.expected_value,
                b.kelly_fraction * 100.0,
                b.confidence,
                b.risk,
            ),
            BettingRecommendation::Skip(s) => write!(f, "SKIP {} ({})", s.market, s.reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the betting engine.
///
/// Only genuine data absence or malformed input becomes an error; business
/// rejections are returned as `Skip`/`Wait` values.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No odds sources returned prices for {home} v {away}")]
    NoOddsSources { home: String, away: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
