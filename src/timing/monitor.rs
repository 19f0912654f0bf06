//! Background timing monitor.
//!
//! Re-runs the timing analysis on a fixed interval and pushes an alert
//! whenever the advice is a confident bet-now. Runs until cancelled (or
//! the handle is dropped), kickoff passes, or the alert receiver closes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::{BetTimingOptimizer, TimingAction, TimingRecommendation};
use crate::types::Outcome;

#[derive(Debug, Clone, Serialize)]
pub struct TimingAlert {
    pub monitor_id: Uuid,
    pub raised_at: DateTime<Utc>,
    pub recommendation: TimingRecommendation,
}

/// Handle to a running monitor. Dropping it stops the monitor.
pub struct MonitorHandle {
    id: Uuid,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the monitor to stop after its current poll.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the monitor task to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Whether a recommendation is strong enough to alert on.
pub fn should_alert(rec: &TimingRecommendation, min_confidence: f64) -> bool {
    rec.action == TimingAction::BetNow && rec.confidence > min_confidence
}

/// Spawn a monitor for one market of a match.
///
/// The first poll runs immediately, then every `poll_interval`. Alerts keep
/// firing on later polls while the condition holds.
pub fn monitor_and_alert(
    optimizer: Arc<BetTimingOptimizer>,
    match_id: String,
    market: Outcome,
    kickoff: DateTime<Utc>,
    poll_interval: Duration,
    alerts: mpsc::Sender<TimingAlert>,
) -> MonitorHandle {
    let id = Uuid::new_v4();
    let (cancel, mut cancelled) = watch::channel(false);
    let min_confidence = optimizer.config().alert_confidence;

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        info!(monitor = %id, match_id = %match_id, market = %market, "Timing monitor started");

        loop {
            tokio::select! {
                _ = cancelled.changed() => {
                    info!(monitor = %id, match_id = %match_id, "Timing monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if Utc::now() >= kickoff {
                        info!(monitor = %id, match_id = %match_id, "Kickoff reached, monitor stopping");
                        break;
                    }

                    let rec = optimizer.analyze_pattern(&match_id, market, kickoff).await;
                    if !should_alert(&rec, min_confidence) {
                        debug!(monitor = %id, action = %rec.action, "No alert this poll");
                        continue;
                    }

                    info!(
                        monitor = %id,
                        match_id = %match_id,
                        confidence = format!("{:.2}", rec.confidence),
                        "Bet-now alert"
                    );
                    let alert = TimingAlert {
                        monitor_id: id,
                        raised_at: Utc::now(),
                        recommendation: rec,
                    };
                    tokio::select! {
                        sent = alerts.send(alert) => {
                            if sent.is_err() {
                                debug!(monitor = %id, "Alert receiver dropped, monitor stopping");
                                break;
                            }
                        }
                        _ = cancelled.changed() => {
                            info!(monitor = %id, match_id = %match_id, "Timing monitor cancelled");
                            break;
                        }
                    }
                }
            }
        }
    });

    MonitorHandle { id, cancel, task }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
