//! Odds movement and closing-line value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Odds, Outcome, OutcomeMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    Up,
    Down,
    Stable,
}

impl fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementDirection::Up => write!(f, "up"),
            MovementDirection::Down => write!(f, "down"),
            MovementDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Where the comparison baseline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineSource {
    /// Earliest stored snapshot inside the lookback window.
    History,
    /// Supplied by the caller.
    Provided,
    /// Derived from the current odds because no history exists (degraded).
    Synthetic,
}

/// Price change of one outcome against the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMovement {
    pub baseline: f64,
    pub current: f64,
    pub change_pct: f64,
    pub direction: MovementDirection,
    /// |change_pct|
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsMovement {
    pub baseline_source: BaselineSource,
    pub baseline_at: Option<DateTime<Utc>>,
    pub outcomes: OutcomeMap<OutcomeMovement>,
}

impl OddsMovement {
    pub fn is_degraded(&self) -> bool {
        self.baseline_source == BaselineSource::Synthetic
    }

    /// Outcome with the largest absolute move.
    pub fn fastest(&self) -> Outcome {
        let mut best = Outcome::Home;
        for outcome in [Outcome::Draw, Outcome::Away] {
            if self.outcomes.get(outcome).velocity > self.outcomes.get(best).velocity {
                best = outcome;
            }
        }
        best
    }
}

/// Compare every outcome's current price with its baseline.
///
/// Moves within ±`threshold_pct` percent are `Stable`.
pub fn compare(current: &Odds, baseline: &Odds, threshold_pct: f64) -> OutcomeMap<OutcomeMovement> {
    OutcomeMap::from_fn(|outcome| {
        let base = baseline.price(outcome);
        let now = current.price(outcome);
        let change_pct = if base > 0.0 {
            (now / base - 1.0) * 100.0
        } else {
            0.0
        };
        let direction = if change_pct > threshold_pct {
            MovementDirection::Up
        } else if change_pct < -threshold_pct {
            MovementDirection::Down
        } else {
            MovementDirection::Stable
        };
        OutcomeMovement {
            baseline: base,
            current: now,
            change_pct,
            direction,
            velocity: change_pct.abs(),
        }
    })
}

// ---------------------------------------------------------------------------
// Closing line value
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClvRating {
    Excellent,
    Positive,
    Neutral,
    Negative,
}

impl fmt::Display for ClvRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClvRating::Excellent => write!(f, "excellent"),
            ClvRating::Positive => write!(f, "positive"),
            ClvRating::Neutral => write!(f, "neutral"),
            ClvRating::Negative => write!(f, "negative"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClvResult {
    pub placed_odds: f64,
    pub closing_odds: f64,
    /// (closing / placed − 1) × 100
    pub clv_pct: f64,
    pub rating: ClvRating,
}

/// Closing-line value of a placed bet.
pub fn closing_line_value(placed_odds: f64, closing_odds: f64) -> ClvResult {
    let clv_pct = if placed_odds > 0.0 {
        (closing_odds / placed_odds - 1.0) * 100.0
    } else {
        0.0
    };
    let rating = if clv_pct > 2.0 {
        ClvRating::Excellent
    } else if clv_pct > 0.0 {
        ClvRating::Positive
    } else if clv_pct > -2.0 {
        ClvRating::Neutral
    } else {
        ClvRating::Negative
    };
    ClvResult {
        placed_odds,
        closing_odds,
        clv_pct,
        rating,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
