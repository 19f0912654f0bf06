//! SQLite-backed odds history (sqlx).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::OddsStore;
use crate::types::OddsSnapshot;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS odds_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id TEXT NOT NULL,
    ts_ms INTEGER NOT NULL,
    home REAL NOT NULL,
    draw REAL NOT NULL,
    away REAL NOT NULL,
    bookmaker TEXT NOT NULL
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_odds_snapshots_match ON odds_snapshots (match_id, ts_ms)";

pub struct SqliteOddsStore {
    pool: SqlitePool,
    retention: Duration,
}

impl SqliteOddsStore {
    /// Open (or create) the database and ensure the schema exists.
    pub async fn connect(database_url: &str, retention: Duration) -> Result<Self> {
        // Every connection to an in-memory database sees its own copy, and the
        // database is gone once that connection closes: keep exactly one alive.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .context(format!("Failed to open odds database {database_url}"))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .context("Failed to create odds_snapshots table")?;
        sqlx::query(CREATE_INDEX)
            .execute(&pool)
            .await
            .context("Failed to create odds_snapshots index")?;

        info!(database_url, "SQLite odds store ready");
        Ok(Self { pool, retention })
    }
}

#[async_trait]
impl OddsStore for SqliteOddsStore {
    async fn get(&self, match_id: &str) -> Result<Vec<OddsSnapshot>> {
        let rows = sqlx::query(
            "SELECT ts_ms, home, draw, away, bookmaker FROM odds_snapshots \
             WHERE match_id = ? ORDER BY ts_ms ASC, id ASC",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await
        .context(format!("Failed to load odds history for {match_id}"))?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let ts_ms: i64 = row.try_get("ts_ms")?;
            let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms)
                .context(format!("Invalid snapshot timestamp {ts_ms}"))?;
            snapshots.push(OddsSnapshot {
                timestamp,
                home: row.try_get("home")?,
                draw: row.try_get("draw")?,
                away: row.try_get("away")?,
                bookmaker: row.try_get("bookmaker")?,
            });
        }
        Ok(snapshots)
    }

    async fn append(&self, match_id: &str, snapshot: OddsSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO odds_snapshots (match_id, ts_ms, home, draw, away, bookmaker) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(match_id)
        .bind(snapshot.timestamp.timestamp_millis())
        .bind(snapshot.home)
        .bind(snapshot.draw)
        .bind(snapshot.away)
        .bind(&snapshot.bookmaker)
        .execute(&self.pool)
        .await
        .context(format!("Failed to store odds snapshot for {match_id}"))?;

        let cutoff = (Utc::now() - self.retention).timestamp_millis();
        let pruned = sqlx::query("DELETE FROM odds_snapshots WHERE ts_ms < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to prune expired odds snapshots")?
            .rows_affected();
        if pruned > 0 {
            debug!(pruned, "Pruned expired odds snapshots");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
