//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a partial (or empty) file is valid. Secrets
//! (provider API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::fs;

use crate::odds::AggregatorConfig;
use crate::strategy::disagreement::DisagreementConfig;
use crate::strategy::kelly::KellyConfig;
use crate::strategy::monte_carlo::RuinDefinition;
use crate::timing::TimingConfig;
use crate::types::EngineError;

/// Upper bounds keeping every derived timestamp within chrono's range.
const MAX_RETENTION_DAYS: i64 = 3_650;
const MAX_CACHE_TTL_SECS: u64 = 86_400 * 365;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub kelly: KellyConfig,
    pub disagreement: DisagreementConfig,
    pub aggregator: AggregatorConfig,
    pub timing: TimingConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite URL (e.g. `sqlite://odds.db?mode=rwc`). Absent → in-memory store.
    pub database_url: Option<String>,
    /// JSON file the in-memory store is restored from and saved to on shutdown.
    pub snapshot_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_reliability() -> f64 {
    1.0
}

fn default_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let k = &self.kelly;
        if k.simulation_iterations == 0 {
            return Err(EngineError::Config(
                "kelly.simulation_iterations must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("kelly.max_stake_pct", k.max_stake_pct),
            ("kelly.hard_cap_pct", k.hard_cap_pct),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(EngineError::Config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !(0.0..1.0).contains(&k.min_confidence) || !(0.0..1.0).contains(&k.min_edge) {
            return Err(EngineError::Config(
                "kelly.min_edge and kelly.min_confidence must be in [0, 1)".into(),
            ));
        }

        let d = &self.disagreement;
        if !(d.medium_threshold < d.high_threshold && d.high_threshold < d.critical_threshold) {
            return Err(EngineError::Config(format!(
                "disagreement thresholds must increase: medium {} < high {} < critical {}",
                d.medium_threshold, d.high_threshold, d.critical_threshold
            )));
        }

        if let RuinDefinition::CumulativeDrawdown { ruin_fraction, .. } = k.ruin {
            if !(ruin_fraction > 0.0 && ruin_fraction <= 1.0) {
                return Err(EngineError::Config(format!(
                    "kelly.ruin.ruin_fraction must be in (0, 1], got {ruin_fraction}"
                )));
            }
        }

        let t = &self.timing;
        if t.min_snapshots < 2 {
            return Err(EngineError::Config("timing.min_snapshots must be at least 2".into()));
        }
        let lookback = Duration::try_hours(t.lookback_hours).ok_or_else(|| {
            EngineError::Config(format!("timing.lookback_hours out of range: {}", t.lookback_hours))
        })?;
        let retention = Duration::try_days(t.retention_days).ok_or_else(|| {
            EngineError::Config(format!("timing.retention_days out of range: {}", t.retention_days))
        })?;
        if t.retention_days > MAX_RETENTION_DAYS {
            return Err(EngineError::Config(format!(
                "timing.retention_days must be at most {MAX_RETENTION_DAYS}, got {}",
                t.retention_days
            )));
        }
        if t.lookback_hours <= 0 || retention < lookback {
            return Err(EngineError::Config(
                "timing.retention_days must cover timing.lookback_hours".into(),
            ));
        }

        let ttl = self.aggregator.cache_ttl_secs;
        let ttl_in_range = i64::try_from(ttl).ok().and_then(Duration::try_seconds).is_some();
        if ttl > MAX_CACHE_TTL_SECS || !ttl_in_range {
            return Err(EngineError::Config(format!(
                "aggregator.cache_ttl_secs out of range: {ttl}"
            )));
        }

        if self.aggregator.synthetic_baseline_scale <= 0.0 {
            return Err(EngineError::Config(
                "aggregator.synthetic_baseline_scale must be positive".into(),
            ));
        }

        for provider in &self.providers {
            if provider.name.is_empty() || provider.base_url.is_empty() {
                return Err(EngineError::Config(
                    "every provider needs a name and base_url".into(),
                ));
            }
        }
        Ok(())
    }
}
