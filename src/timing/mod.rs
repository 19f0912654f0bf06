//! Bet timing: when to take a price.
//!
//! Reads the recent snapshot series for one market of a match, derives
//! velocity / volatility / momentum and maps them onto bet-now, wait or
//! skip. Snapshots are recorded through the same `OddsStore`.

pub mod monitor;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::{self, OddsStore};
use crate::types::{EngineError, Odds, OddsSnapshot, Outcome, RiskTier};

pub use monitor::{monitor_and_alert, MonitorHandle, TimingAlert};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Snapshots required before the series is analysed.
    pub min_snapshots: usize,
    pub lookback_hours: i64,
    pub retention_days: i64,
    /// Volatility above which the trend is classified as volatile.
    pub volatile_threshold: f64,
    /// Volatility above which waiting is always advised.
    pub wait_volatility: f64,
    /// |velocity| below this is a stable market (odds per hour).
    pub stable_velocity: f64,
    /// Momentum needed to expect a rising price to keep rising.
    pub momentum_threshold: f64,
    /// Hours to kickoff separating "time remaining" from "closing soon".
    pub closing_hours: f64,
    /// Horizon of the linear price projection.
    pub projection_hours: f64,
    pub poll_interval_secs: u64,
    /// Confidence a bet-now recommendation must exceed to raise an alert.
    pub alert_confidence: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_snapshots: 5,
            lookback_hours: 48,
            retention_days: 7,
            volatile_threshold: 0.15,
            wait_volatility: 0.20,
            stable_velocity: 0.05,
            momentum_threshold: 0.02,
            closing_hours: 6.0,
            projection_hours: 3.0,
            poll_interval_secs: 300,
            alert_confidence: 0.75,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::days(self.retention_days)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingAction {
    BetNow,
    Wait,
    Skip,
}

impl fmt::Display for TimingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingAction::BetNow => write!(f, "bet-now"),
            TimingAction::Wait => write!(f, "wait"),
            TimingAction::Skip => write!(f, "skip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsTrend {
    Rising,
    Falling,
    Stable,
    Volatile,
}

impl fmt::Display for OddsTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OddsTrend::Rising => write!(f, "rising"),
            OddsTrend::Falling => write!(f, "falling"),
            OddsTrend::Stable => write!(f, "stable"),
            OddsTrend::Volatile => write!(f, "volatile"),
        }
    }
}

/// Summary statistics of one market's price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub snapshots: usize,
    /// Mean of Δodds/Δhours between consecutive snapshots.
    pub velocity: f64,
    /// Population standard deviation of the prices.
    pub volatility: f64,
    /// Mean of the last three velocities minus `velocity`.
    pub momentum: f64,
    pub trend: OddsTrend,
    pub current_odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub expected_odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecommendation {
    pub match_id: String,
    pub market: Outcome,
    pub action: TimingAction,
    pub reasoning: String,
    pub confidence: f64,
    /// Expected price change over the projection horizon (odds units).
    pub expected_value: f64,
    pub window: Option<TimingWindow>,
    pub risk: RiskTier,
    pub hours_to_match: f64,
    pub pattern: Option<PatternStats>,
}

impl fmt::Display for TimingRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} (conf {:.0}%, risk {})",
            self.action,
            self.match_id,
            self.market,
            self.confidence * 100.0,
            self.risk
        )
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Compute velocity, volatility, momentum and trend for a time-ordered
/// `(timestamp, price)` series. Pairs with no elapsed time are ignored for
/// velocity. `None` for an empty series.
pub fn pattern_stats(series: &[(DateTime<Utc>, f64)], config: &TimingConfig) -> Option<PatternStats> {
    let (_, current_odds) = *series.last()?;
    let n = series.len() as f64;

    let mean = series.iter().map(|(_, p)| p).sum::<f64>() / n;
    let volatility = (series.iter().map(|(_, p)| (p - mean).powi(2)).sum::<f64>() / n).sqrt();

    let velocities: Vec<f64> = series
        .windows(2)
        .filter_map(|w| {
            let hours = (w[1].0 - w[0].0).num_milliseconds() as f64 / 3_600_000.0;
            (hours > 0.0).then(|| (w[1].1 - w[0].1) / hours)
        })
        .collect();

    let velocity = mean_or_zero(&velocities);
    let recent = &velocities[velocities.len().saturating_sub(3)..];
    let momentum = if recent.is_empty() {
        0.0
    } else {
        mean_or_zero(recent) - velocity
    };

    let trend = if volatility > config.volatile_threshold {
        OddsTrend::Volatile
    } else if velocity.abs() < config.stable_velocity {
        OddsTrend::Stable
    } else if velocity > 0.0 {
        OddsTrend::Rising
    } else {
        OddsTrend::Falling
    };

    Some(PatternStats {
        snapshots: series.len(),
        velocity,
        volatility,
        momentum,
        trend,
        current_odds,
    })
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

pub struct BetTimingOptimizer {
    config: TimingConfig,
    store: Arc<dyn OddsStore>,
}

impl BetTimingOptimizer {
    pub fn new(config: TimingConfig, store: Arc<dyn OddsStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OddsStore> {
        &self.store
    }

    /// Store the current quote for a match, timestamped now.
    pub async fn record_snapshot(
        &self,
        match_id: &str,
        odds: &Odds,
        bookmaker: &str,
    ) -> Result<(), EngineError> {
        let snapshot = OddsSnapshot::new(Utc::now(), odds, bookmaker);
        self.store
            .append(match_id, snapshot)
            .await
            .map_err(|e| EngineError::Storage(format!("{e:#}")))?;
        debug!(match_id, bookmaker, odds = %odds, "Odds snapshot recorded");
        Ok(())
    }

    pub async fn analyze_pattern(
        &self,
        match_id: &str,
        market: Outcome,
        kickoff: DateTime<Utc>,
    ) -> TimingRecommendation {
        self.analyze_pattern_at(match_id, market, kickoff, Utc::now()).await
    }

    /// Timing advice as of `now`. Store failures degrade to the
    /// insufficient-history answer.
    pub async fn analyze_pattern_at(
        &self,
        match_id: &str,
        market: Outcome,
        kickoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TimingRecommendation {
        let since = now - Duration::hours(self.config.lookback_hours);
        let history = storage::history_since(self.store.as_ref(), match_id, since)
            .await
            .unwrap_or_else(|e| {
                warn!(match_id, store = self.store.name(), error = %e, "Odds history unavailable");
                Vec::new()
            });

        let series: Vec<(DateTime<Utc>, f64)> = history
            .iter()
            .filter(|s| s.timestamp <= now)
            .map(|s| (s.timestamp, s.price(market)))
            .collect();

        let hours_to_match = (kickoff - now).num_milliseconds() as f64 / 3_600_000.0;
        let rec = self.decide(match_id, market, &series, hours_to_match, now);

        debug!(
            match_id,
            market = %market,
            action = %rec.action,
            confidence = format!("{:.2}", rec.confidence),
            snapshots = series.len(),
            "Timing analysed"
        );
        rec
    }

    fn decide(
        &self,
        match_id: &str,
        market: Outcome,
        series: &[(DateTime<Utc>, f64)],
        hours_to_match: f64,
        now: DateTime<Utc>,
    ) -> TimingRecommendation {
        let c = &self.config;
        let mut rec = TimingRecommendation {
            match_id: match_id.to_string(),
            market,
            action: TimingAction::BetNow,
            reasoning: String::new(),
            confidence: 0.5,
            expected_value: 0.0,
            window: None,
            risk: RiskTier::Medium,
            hours_to_match,
            pattern: None,
        };

        let stats = match pattern_stats(series, c) {
            Some(stats) if series.len() >= c.min_snapshots => stats,
            _ => {
                rec.reasoning = format!(
                    "Insufficient odds history ({} of {} snapshots in the last {}h); betting at current price",
                    series.len(),
                    c.min_snapshots,
                    c.lookback_hours
                );
                return rec;
            }
        };

        rec.pattern = Some(stats);
        rec.expected_value = stats.velocity * c.projection_hours;
        let trend_note = format!(
            "{} odds (velocity {:+.3}/h, volatility {:.3}, momentum {:+.3})",
            stats.trend, stats.velocity, stats.volatility, stats.momentum
        );

        if stats.volatility > c.wait_volatility {
            rec.action = TimingAction::Wait;
            rec.confidence = 0.6;
            rec.risk = RiskTier::High;
            rec.reasoning = format!("{trend_note}: market too volatile, wait for it to settle");
        } else if stats.trend == OddsTrend::Rising
            && stats.velocity > c.stable_velocity
            && stats.momentum > c.momentum_threshold
            && hours_to_match > c.closing_hours
        {
            let expected_odds = stats.current_odds + stats.velocity * c.projection_hours;
            rec.action = TimingAction::Wait;
            rec.confidence = 0.7;
            rec.risk = RiskTier::Medium;
            rec.window = Some(TimingWindow {
                start: now + Duration::hours(2),
                end: now + Duration::hours(4),
                expected_odds,
            });
            rec.reasoning = format!(
                "{trend_note}: price still accelerating, expect ~{expected_odds:.2} within {:.0}h",
                c.projection_hours
            );
        } else if stats.trend == OddsTrend::Rising {
            rec.action = TimingAction::BetNow;
            rec.confidence = 0.7;
            rec.risk = RiskTier::Low;
            rec.reasoning = format!("{trend_note}: rise is losing momentum, take the current price");
        } else if stats.trend == OddsTrend::Falling && stats.velocity < -c.stable_velocity {
            rec.action = TimingAction::BetNow;
            rec.confidence = 0.85;
            rec.risk = RiskTier::Low;
            rec.reasoning = format!("{trend_note}: price shortening, bet before it drops further");
        } else if stats.trend == OddsTrend::Stable && hours_to_match < c.closing_hours {
            rec.action = TimingAction::BetNow;
            rec.confidence = 0.8;
            rec.risk = RiskTier::Low;
            rec.reasoning = format!("{trend_note}: kickoff in {hours_to_match:.1}h, no reason to wait");
        } else if stats.trend == OddsTrend::Stable {
            rec.action = TimingAction::Wait;
            rec.confidence = 0.6;
            rec.risk = RiskTier::Low;
            rec.reasoning = format!("{trend_note}: {hours_to_match:.1}h to kickoff, keep monitoring");
        } else {
            rec.action = TimingAction::BetNow;
            rec.confidence = 0.4;
            rec.risk = RiskTier::Medium;
            rec.reasoning = format!("{trend_note}: no clear pattern, low-confidence bet");
        }

        rec
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
