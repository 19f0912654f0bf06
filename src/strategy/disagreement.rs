//! Ensemble disagreement filter.
//!
//! Measures how far the ensemble members' probabilities for one outcome
//! spread apart and turns the dispersion into a severity, a bet/no-bet
//! gate, and a stake multiplier applied downstream of Kelly sizing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::types::{ModelVote, Outcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Severity thresholds on the population stdev of model votes (probability units).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisagreementConfig {
    pub critical_threshold: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    /// Votes further than this many stdevs from the mean are outliers.
    pub outlier_sigma: f64,
    /// Outlier count that forces the stake multiplier to zero.
    pub max_outliers: usize,
}

impl Default for DisagreementConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 0.20,
            high_threshold: 0.15,
            medium_threshold: 0.10,
            outlier_sigma: 1.5,
            max_outliers: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisagreementSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for DisagreementSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisagreementSeverity::Low => write!(f, "low"),
            DisagreementSeverity::Medium => write!(f, "medium"),
            DisagreementSeverity::High => write!(f, "high"),
            DisagreementSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Dispersion of the ensemble's votes for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisagreementAnalysis {
    pub outcome: Outcome,
    pub model_count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// max − min.
    pub range: f64,
    pub severity: DisagreementSeverity,
    pub should_bet: bool,
    pub outliers: Vec<String>,
    /// Factor applied to the recommended stake (0 blocks the bet).
    pub stake_multiplier: f64,
}

/// Per-outcome disagreement rolled up into one confidence figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfidence {
    /// Outcome the models agree on most.
    pub most_confident: Outcome,
    pub max_disagreement: f64,
    /// 1 − min(2 × max_disagreement, 1).
    pub overall_confidence: f64,
    pub per_outcome: Vec<DisagreementAnalysis>,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DisagreementFilter {
    config: DisagreementConfig,
}

impl DisagreementFilter {
    pub fn new(config: DisagreementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DisagreementConfig {
        &self.config
    }

    /// Classify a vote stdev.
    pub fn severity_for(&self, std_dev: f64) -> DisagreementSeverity {
        if std_dev > self.config.critical_threshold {
            DisagreementSeverity::Critical
        } else if std_dev > self.config.high_threshold {
            DisagreementSeverity::High
        } else if std_dev > self.config.medium_threshold {
            DisagreementSeverity::Medium
        } else {
            DisagreementSeverity::Low
        }
    }

    /// Stake multiplier for a classified analysis.
    pub fn stake_multiplier(
        &self,
        severity: DisagreementSeverity,
        should_bet: bool,
        outlier_count: usize,
    ) -> f64 {
        if !should_bet || outlier_count >= self.config.max_outliers {
            return 0.0;
        }
        match severity {
            DisagreementSeverity::Low => 1.0,
            DisagreementSeverity::Medium => 0.5,
            DisagreementSeverity::High => 0.25,
            DisagreementSeverity::Critical => 0.0,
        }
    }

    /// Analyze ensemble dispersion for one outcome.
    pub fn analyze(&self, votes: &[ModelVote], outcome: Outcome) -> DisagreementAnalysis {
        if votes.len() < 2 {
            warn!(
                models = votes.len(),
                outcome = %outcome,
                "Too few model votes to measure disagreement"
            );
        }

        let values: Vec<f64> = votes.iter().map(|v| v.probability(outcome)).collect();
        let (mean, std_dev, range) = dispersion(&values);

        let outliers: Vec<String> = if std_dev > 0.0 {
            let limit = self.config.outlier_sigma * std_dev;
            votes
                .iter()
                .zip(&values)
                .filter(|(_, v)| (*v - mean).abs() > limit)
                .map(|(vote, _)| vote.model.clone())
                .collect()
        } else {
            Vec::new()
        };

        let severity = self.severity_for(std_dev);
        let should_bet = matches!(
            severity,
            DisagreementSeverity::Low | DisagreementSeverity::Medium
        );
        let stake_multiplier = self.stake_multiplier(severity, should_bet, outliers.len());

        debug!(
            outcome = %outcome,
            models = votes.len(),
            mean = format!("{:.3}", mean),
            std_dev = format!("{:.1}pp", std_dev * 100.0),
            severity = %severity,
            outliers = outliers.len(),
            "Ensemble disagreement analyzed"
        );

        DisagreementAnalysis {
            outcome,
            model_count: votes.len(),
            mean,
            std_dev,
            range,
            severity,
            should_bet,
            outliers,
            stake_multiplier,
        }
    }

    /// Run `analyze` for every outcome and summarize ensemble confidence.
    pub fn confidence(&self, votes: &[ModelVote]) -> EnsembleConfidence {
        let per_outcome: Vec<DisagreementAnalysis> = Outcome::ALL
            .iter()
            .map(|o| self.analyze(votes, *o))
            .collect();

        let mut most_confident = &per_outcome[0];
        for analysis in &per_outcome[1..] {
            if analysis.std_dev < most_confident.std_dev {
                most_confident = analysis;
            }
        }

        let max_disagreement = per_outcome
            .iter()
            .map(|a| a.std_dev)
            .fold(0.0_f64, f64::max);

        EnsembleConfidence {
            most_confident: most_confident.outcome,
            max_disagreement,
            overall_confidence: 1.0 - (2.0 * max_disagreement).min(1.0),
            per_outcome,
        }
    }
}

/// Mean, population stdev, and range. Zeros for an empty slice.
fn dispersion(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    (mean, variance.sqrt(), max - min)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
