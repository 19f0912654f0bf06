//! Multi-provider odds aggregation.
//!
//! Every configured provider is queried concurrently; failures are logged
//! and dropped. Surviving quotes are reduced to the best price per outcome,
//! the cross-source spread and a liquidity tier. Results are cached per
//! fixture for a short TTL.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::movement::{self, BaselineSource, ClvResult, OddsMovement};
use super::OddsProvider;
use crate::storage::{self, OddsStore};
use crate::types::{
    AggregatedOdds, EngineError, LiquidityTier, Odds, OddsSource, Outcome, OutcomeMap,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Seconds an aggregated quote stays in the cache.
    pub cache_ttl_secs: u64,
    pub high_liquidity_min_sources: usize,
    pub high_liquidity_max_spread: f64,
    pub medium_liquidity_min_sources: usize,
    pub medium_liquidity_max_spread: f64,
    /// Percentage move beyond which a price counts as up/down.
    pub movement_threshold_pct: f64,
    /// Multiplier applied to current odds when no history exists.
    pub synthetic_baseline_scale: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            high_liquidity_min_sources: 3,
            high_liquidity_max_spread: 0.2,
            medium_liquidity_min_sources: 2,
            medium_liquidity_max_spread: 0.4,
            movement_threshold_pct: 1.0,
            synthetic_baseline_scale: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct OddsCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

struct CacheEntry {
    odds: AggregatedOdds,
    inserted_at: DateTime<Utc>,
}

impl OddsCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    fn get(&self, key: &str) -> Option<&AggregatedOdds> {
        self.entries.get(key).and_then(|entry| {
            if Utc::now() - entry.inserted_at < self.ttl {
                Some(&entry.odds)
            } else {
                None
            }
        })
    }

    fn insert(&mut self, key: String, odds: AggregatedOdds) {
        self.entries.insert(
            key,
            CacheEntry {
                odds,
                inserted_at: Utc::now(),
            },
        );
    }

    fn evict_expired(&mut self) {
        let now = Utc::now();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.inserted_at < ttl);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct OddsAggregator {
    providers: Vec<Arc<dyn OddsProvider>>,
    config: AggregatorConfig,
    cache: Mutex<OddsCache>,
}

impl OddsAggregator {
    pub fn new(providers: Vec<Arc<dyn OddsProvider>>, config: AggregatorConfig) -> Self {
        let ttl = Duration::seconds(config.cache_ttl_secs as i64);
        Self {
            providers,
            config,
            cache: Mutex::new(OddsCache::new(ttl)),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    fn cache_key(home: &str, away: &str, league: Option<&str>) -> String {
        format!("{}-{}-{}", home, away, league.unwrap_or("any")).to_lowercase()
    }

    /// Best available odds for a fixture across all providers.
    ///
    /// Served from cache when a fresh entry exists. Fails only when no
    /// provider returns a usable quote.
    pub async fn get_odds(
        &self,
        home: &str,
        away: &str,
        league: Option<&str>,
    ) -> Result<AggregatedOdds, EngineError> {
        let key = Self::cache_key(home, away, league);

        {
            let mut cache = self.cache.lock().await;
            cache.evict_expired();
            if let Some(cached) = cache.get(&key) {
                debug!(cache_key = %key, "Odds cache hit");
                return Ok(cached.clone());
            }
        }

        let fetches = self.providers.iter().map(|provider| async move {
            let result = provider.fetch_odds(home, away, league).await;
            (provider, result)
        });
        let results = join_all(fetches).await;

        let mut sources = Vec::with_capacity(results.len());
        for (provider, result) in results {
            match result.and_then(|odds| odds.validate().map(|_| odds).map_err(Into::into)) {
                Ok(odds) => sources.push(OddsSource {
                    name: provider.name().to_string(),
                    captured_at: odds.timestamp.unwrap_or_else(Utc::now),
                    odds: odds.with_source(provider.name()),
                    reliability: provider.reliability(),
                }),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        fixture = %format!("{home} v {away}"),
                        error = %e,
                        "Odds provider failed, continuing without it"
                    );
                }
            }
        }

        let aggregated = aggregate(home, away, league, sources, &self.config).ok_or_else(|| {
            EngineError::NoOddsSources {
                home: home.to_string(),
                away: away.to_string(),
            }
        })?;

        info!(
            fixture = %format!("{home} v {away}"),
            sources = aggregated.source_count(),
            liquidity = %aggregated.liquidity,
            best = %aggregated.best,
            "Odds aggregated"
        );

        self.cache.lock().await.insert(key, aggregated.clone());
        Ok(aggregated)
    }

    /// Drop the cached entry for one fixture.
    pub async fn invalidate(&self, home: &str, away: &str, league: Option<&str>) -> bool {
        let key = Self::cache_key(home, away, league);
        self.cache.lock().await.entries.remove(&key).is_some()
    }

    pub async fn clear_cache(&self) {
        let mut cache = self.cache.lock().await;
        let dropped = cache.len();
        cache.entries.clear();
        debug!(dropped, "Odds cache cleared");
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    // -- Movement -------------------------------------------------------------

    /// Movement of `current` against an explicit baseline.
    pub fn track_movement(&self, current: &Odds, baseline: &Odds) -> OddsMovement {
        OddsMovement {
            baseline_source: BaselineSource::Provided,
            baseline_at: baseline.timestamp,
            outcomes: movement::compare(current, baseline, self.config.movement_threshold_pct),
        }
    }

    /// Movement of `current` against the earliest stored snapshot since `since`.
    ///
    /// Without stored history (or when the store fails) the baseline is the
    /// current odds scaled by `synthetic_baseline_scale` and the result is
    /// flagged as synthetic.
    pub async fn track_movement_for_match(
        &self,
        match_id: &str,
        current: &Odds,
        store: &dyn OddsStore,
        since: DateTime<Utc>,
    ) -> OddsMovement {
        let history = storage::history_since(store, match_id, since)
            .await
            .unwrap_or_else(|e| {
                warn!(match_id, store = store.name(), error = %e, "Odds history unavailable");
                Vec::new()
            });

        if let Some(first) = history.first() {
            return OddsMovement {
                baseline_source: BaselineSource::History,
                baseline_at: Some(first.timestamp),
                outcomes: movement::compare(
                    current,
                    &first.to_odds(),
                    self.config.movement_threshold_pct,
                ),
            };
        }

        warn!(match_id, "No odds history, using synthetic movement baseline");
        let scale = self.config.synthetic_baseline_scale;
        let baseline = Odds::new(current.home * scale, current.draw * scale, current.away * scale);
        OddsMovement {
            baseline_source: BaselineSource::Synthetic,
            baseline_at: None,
            outcomes: movement::compare(current, &baseline, self.config.movement_threshold_pct),
        }
    }

    /// Closing-line value of a placed bet.
    pub fn track_clv(&self, placed_odds: f64, closing_odds: f64) -> ClvResult {
        movement::closing_line_value(placed_odds, closing_odds)
    }
}

// ---------------------------------------------------------------------------
// Reduction
// ---------------------------------------------------------------------------

/// Liquidity tier from the number of sources and the average spread.
pub fn classify_liquidity(
    source_count: usize,
    average_spread: f64,
    config: &AggregatorConfig,
) -> LiquidityTier {
    if source_count >= config.high_liquidity_min_sources
        && average_spread < config.high_liquidity_max_spread
    {
        LiquidityTier::High
    } else if source_count >= config.medium_liquidity_min_sources
        && average_spread < config.medium_liquidity_max_spread
    {
        LiquidityTier::Medium
    } else {
        LiquidityTier::Low
    }
}

/// Reduce provider quotes to the aggregated view. `None` when `sources` is empty.
pub fn aggregate(
    home: &str,
    away: &str,
    league: Option<&str>,
    sources: Vec<OddsSource>,
    config: &AggregatorConfig,
) -> Option<AggregatedOdds> {
    let first = sources.first()?;

    let mut best_price = OutcomeMap::from_fn(|o| first.odds.price(o));
    let mut worst_price = best_price.clone();
    let mut best_source = OutcomeMap::from_fn(|_| first.name.clone());

    for source in sources.iter().skip(1) {
        for outcome in Outcome::ALL {
            let price = source.odds.price(outcome);
            if price > *best_price.get(outcome) {
                *best_price.get_mut(outcome) = price;
                *best_source.get_mut(outcome) = source.name.clone();
            }
            if price < *worst_price.get(outcome) {
                *worst_price.get_mut(outcome) = price;
            }
        }
    }

    let spread = OutcomeMap::from_fn(|o| best_price.get(o) - worst_price.get(o));
    let average_spread = (spread.home + spread.draw + spread.away) / 3.0;
    let liquidity = classify_liquidity(sources.len(), average_spread, config);
    let fetched_at = Utc::now();

    let mut best = Odds::new(best_price.home, best_price.draw, best_price.away);
    best.timestamp = Some(fetched_at);

    Some(AggregatedOdds {
        home_team: home.to_string(),
        away_team: away.to_string(),
        league: league.map(str::to_string),
        best,
        best_source,
        spread,
        liquidity,
        sources,
        fetched_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
