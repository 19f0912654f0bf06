//! Odds provider integrations and cross-provider aggregation.
//!
//! Defines the `OddsProvider` trait that every bookmaker/exchange feed
//! implements, plus the aggregator that merges their quotes into
//! best-available prices.

pub mod aggregator;
pub mod http;
pub mod movement;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Odds;

pub use aggregator::{AggregatorConfig, OddsAggregator};
pub use movement::{BaselineSource, ClvRating, ClvResult, MovementDirection, OddsMovement};

/// Abstraction over odds feeds.
///
/// Implementors return a parsed `{home, draw, away}` quote for a fixture or
/// an error. Failures of one provider never affect the others.
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Fetch the current 1X2 quote for a fixture.
    async fn fetch_odds(&self, home: &str, away: &str, league: Option<&str>) -> Result<Odds>;

    /// Provider name for logging and source attribution.
    fn name(&self) -> &str;

    /// Reliability weight (0–1) reported with every quote.
    fn reliability(&self) -> f64 {
        1.0
    }
}
