//! Mock odds provider for integration testing.
//!
//! Provides a deterministic `OddsProvider` implementation whose quote,
//! failure mode, and call count are fully controllable from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use betting_engine::odds::OddsProvider;
use betting_engine::types::Odds;

/// A mock odds feed. All state is in-memory.
pub struct MockOddsProvider {
    name: String,
    reliability: f64,
    odds: Mutex<Odds>,
    /// If set, every fetch returns this error.
    force_error: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockOddsProvider {
    pub fn new(name: &str, home: f64, draw: f64, away: f64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reliability: 1.0,
            odds: Mutex::new(Odds::new(home, draw, away)),
            force_error: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Replace the quote returned by later fetches.
    pub fn set_odds(&self, home: f64, draw: f64, away: f64) {
        *self.odds.lock().unwrap() = Odds::new(home, draw, away);
    }

    /// Force all subsequent fetches to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OddsProvider for MockOddsProvider {
    async fn fetch_odds(&self, _home: &str, _away: &str, _league: Option<&str>) -> Result<Odds> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!("{}: {msg}", self.name));
        }
        Ok(self.odds.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reliability(&self) -> f64 {
        self.reliability
    }
}
