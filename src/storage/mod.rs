//! Persistence layer for odds history.
//!
//! The timing optimizer and movement tracker read snapshot series through
//! the `OddsStore` trait. Two backends exist: an in-memory store (which can
//! be saved to and restored from a JSON file across restarts) and a SQLite
//! store in `sqlite`.

pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::OddsSnapshot;

pub use sqlite::SqliteOddsStore;

/// Default snapshot retention (7 days).
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Time-series store of odds snapshots keyed by match id.
#[async_trait]
pub trait OddsStore: Send + Sync {
    /// All retained snapshots for a match, oldest first.
    async fn get(&self, match_id: &str) -> Result<Vec<OddsSnapshot>>;

    /// Append a snapshot. Entries older than the retention window are pruned.
    async fn append(&self, match_id: &str, snapshot: OddsSnapshot) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Snapshots for `match_id` no older than `since`, oldest first.
pub async fn history_since(
    store: &dyn OddsStore,
    match_id: &str,
    since: DateTime<Utc>,
) -> Result<Vec<OddsSnapshot>> {
    let mut snapshots = store.get(match_id).await?;
    snapshots.retain(|s| s.timestamp >= since);
    Ok(snapshots)
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

pub struct MemoryOddsStore {
    retention: Duration,
    history: RwLock<HashMap<String, Vec<OddsSnapshot>>>,
}

impl Default for MemoryOddsStore {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_RETENTION_DAYS))
    }
}

impl MemoryOddsStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub async fn match_count(&self) -> usize {
        self.history.read().await.len()
    }

    /// Write the whole history to a JSON file.
    pub async fn save_json(&self, path: &str) -> Result<()> {
        let history = self.history.read().await;
        let json = serde_json::to_string_pretty(&*history)
            .context("Failed to serialise odds history")?;

        std::fs::write(path, &json).context(format!("Failed to write odds history to {path}"))?;

        debug!(path, matches = history.len(), "Odds history saved");
        Ok(())
    }

    /// Restore a store from a JSON file written by `save_json`.
    /// A missing file yields an empty store.
    pub fn load_json(path: &str, retention: Duration) -> Result<Self> {
        let store = Self::new(retention);

        if !Path::new(path).exists() {
            info!(path, "No saved odds history found, starting fresh");
            return Ok(store);
        }

        let json = std::fs::read_to_string(path)
            .context(format!("Failed to read odds history from {path}"))?;
        let mut history: HashMap<String, Vec<OddsSnapshot>> = serde_json::from_str(&json)
            .context(format!("Failed to parse odds history from {path}"))?;

        let cutoff = Utc::now() - retention;
        for snapshots in history.values_mut() {
            snapshots.retain(|s| s.timestamp >= cutoff);
            snapshots.sort_by_key(|s| s.timestamp);
        }
        history.retain(|_, snapshots| !snapshots.is_empty());

        info!(path, matches = history.len(), "Odds history loaded from disk");

        Ok(Self {
            retention,
            history: RwLock::new(history),
        })
    }
}

#[async_trait]
impl OddsStore for MemoryOddsStore {
    async fn get(&self, match_id: &str) -> Result<Vec<OddsSnapshot>> {
        Ok(self
            .history
            .read()
            .await
            .get(match_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, match_id: &str, snapshot: OddsSnapshot) -> Result<()> {
        let cutoff = Utc::now() - self.retention;
        let mut history = self.history.write().await;
        let series = history.entry(match_id.to_string()).or_default();

        let at = series.partition_point(|s| s.timestamp <= snapshot.timestamp);
        series.insert(at, snapshot);

        let before = series.len();
        series.retain(|s| s.timestamp >= cutoff);
        let pruned = before - series.len();
        if pruned > 0 {
            debug!(match_id, pruned, "Pruned expired odds snapshots");
        }
        if series.is_empty() {
            history.remove(match_id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
