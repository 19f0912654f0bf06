//! End-to-end pipeline: disagreement → odds → Kelly → timing.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

use betting_engine::config::AppConfig;
use betting_engine::odds::{BaselineSource, OddsProvider};
use betting_engine::storage::{MemoryOddsStore, OddsStore, SqliteOddsStore};
use betting_engine::strategy::disagreement::DisagreementSeverity;
use betting_engine::strategy::kelly::MatchCandidate;
use betting_engine::strategy::{DecisionEngine, MatchRequest};
use betting_engine::timing::TimingAction;
use betting_engine::types::*;

use crate::mock_provider::MockOddsProvider;

fn seeded_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.kelly.random_seed = 42;
    config
}

fn engine_with(providers: Vec<Arc<MockOddsProvider>>, store: Arc<dyn OddsStore>) -> DecisionEngine {
    let providers: Vec<Arc<dyn OddsProvider>> = providers
        .into_iter()
        .map(|p| p as Arc<dyn OddsProvider>)
        .collect();
    DecisionEngine::from_config(&seeded_config(), providers, store)
}

fn scenario_prediction() -> CalibratedPrediction {
    CalibratedPrediction::new(0.60, 0.25, 0.15, 0.80)
}

fn scenario_c_votes() -> Vec<ModelVote> {
    vec![
        ModelVote::new("dense", 0.70, 0.15, 0.15),
        ModelVote::new("lstm", 0.50, 0.30, 0.20),
        ModelVote::new("cnn", 0.45, 0.25, 0.30),
    ]
}

fn request(votes: Vec<ModelVote>) -> MatchRequest {
    MatchRequest {
        match_id: "ars-che-2030".into(),
        home_team: "Arsenal".into(),
        away_team: "Chelsea".into(),
        league: Some("EPL".into()),
        kickoff: Utc::now() + Duration::hours(36),
        prediction: scenario_prediction(),
        votes,
        bankroll: 10_000.0,
        risk_profile: RiskProfile::Moderate,
    }
}

#[test]
fn test_scenario_a_moderate_bet() {
    let engine = engine_with(vec![], Arc::new(MemoryOddsStore::default()));
    let rec = engine.optimize_stake(
        &scenario_prediction(),
        &Odds::new(1.80, 3.40, 5.50),
        10_000.0,
        RiskProfile::Moderate,
    );
    let bet = rec.into_bet().expect("scenario A bets");
    assert_eq!(bet.market, Outcome::Home);
    assert!((bet.edge_pct - 4.44).abs() < 0.01);
    assert!((bet.kelly_fraction - 0.025).abs() < 1e-9);
    assert!((bet.stake - 250.0).abs() < 1e-6);
    let sim = &bet.simulation;
    assert!(sim.percentile_5 <= sim.percentile_50 && sim.percentile_50 <= sim.percentile_95);
    assert!((sim.win_rate - 0.60).abs() < 0.02);
}

#[test]
fn test_scenario_b_negative_edge_skips() {
    let engine = engine_with(vec![], Arc::new(MemoryOddsStore::default()));
    let rec = engine.optimize_stake(
        &scenario_prediction(),
        &Odds::new(1.60, 3.40, 5.50),
        10_000.0,
        RiskProfile::Moderate,
    );
    assert!(!rec.is_bet());
    assert_eq!(rec.stake(), 0.0);
    assert!(rec.simulation().is_empty());
}

#[test]
fn test_scenario_c_medium_disagreement() {
    let engine = engine_with(vec![], Arc::new(MemoryOddsStore::default()));
    let analysis = engine.calculate_ensemble_disagreement(&scenario_c_votes(), Outcome::Home);
    assert!((analysis.std_dev - 0.108).abs() < 0.002);
    assert_eq!(analysis.severity, DisagreementSeverity::Medium);
    assert!(analysis.should_bet);
    assert_eq!(analysis.stake_multiplier, 0.5);
}

#[test]
fn test_stake_bounded_for_valid_inputs() {
    let engine = engine_with(vec![], Arc::new(MemoryOddsStore::default()));
    let bankroll = 5_000.0;
    for home_p in [0.35, 0.45, 0.55, 0.65, 0.75, 0.85] {
        let rest = (1.0 - home_p) / 2.0;
        let prediction = CalibratedPrediction::new(home_p, rest, rest, 0.9);
        for price in [1.3, 1.8, 2.5, 4.0, 8.0] {
            for profile in [RiskProfile::Conservative, RiskProfile::Moderate, RiskProfile::Aggressive] {
                let rec = engine.optimize_stake(&prediction, &Odds::new(price, 3.5, 4.0), bankroll, profile);
                assert!(rec.stake() >= 0.0);
                assert!(rec.stake() <= 0.10 * bankroll + 1e-9);
            }
        }
    }
}

#[tokio::test]
async fn test_full_pipeline_scales_stake_for_disagreement() {
    let books = MockOddsProvider::new("books", 1.75, 3.40, 5.20);
    let exchange = MockOddsProvider::new("exchange", 1.80, 3.30, 5.50);
    let engine = engine_with(vec![books, exchange], Arc::new(MemoryOddsStore::default()));

    let decision = engine.decide(&request(scenario_c_votes())).await.unwrap();

    assert_eq!(decision.odds.best.home, 1.80);
    assert_eq!(decision.odds.best_source.home, "exchange");
    assert_eq!(decision.odds.source_count(), 2);

    let analysis = decision.disagreement.as_ref().unwrap();
    assert_eq!(analysis.outcome, Outcome::Home);
    assert_eq!(analysis.stake_multiplier, 0.5);

    let bet = decision.recommendation.clone().into_bet().unwrap();
    assert!((bet.stake - 125.0).abs() < 1e-6);
    assert!((bet.expected_value - 10.0).abs() < 1e-6);

    let timing = decision.timing.unwrap();
    assert_eq!(timing.action, TimingAction::BetNow);
    assert_eq!(timing.confidence, 0.5);
}

#[tokio::test]
async fn test_failed_provider_does_not_block_decision() {
    let healthy = MockOddsProvider::new("healthy", 1.80, 3.40, 5.50);
    let broken = MockOddsProvider::new("broken", 1.90, 3.40, 5.50);
    broken.set_error("timeout");
    let engine = engine_with(vec![healthy, broken.clone()], Arc::new(MemoryOddsStore::default()));

    let decision = engine.decide(&request(vec![])).await.unwrap();
    assert_eq!(decision.odds.source_count(), 1);
    assert_eq!(decision.odds.best.home, 1.80);
    assert_eq!(broken.calls(), 1);
}

#[tokio::test]
async fn test_all_providers_down_is_an_error() {
    let a = MockOddsProvider::new("a", 1.80, 3.40, 5.50);
    let b = MockOddsProvider::new("b", 1.80, 3.40, 5.50);
    a.set_error("503");
    b.set_error("dns");
    let engine = engine_with(vec![a.clone(), b], Arc::new(MemoryOddsStore::default()));

    let err = engine.get_odds("Arsenal", "Chelsea", None).await.unwrap_err();
    assert!(matches!(err, EngineError::NoOddsSources { .. }));

    a.clear_error();
    let odds = engine.get_odds("Arsenal", "Chelsea", None).await.unwrap();
    assert_eq!(odds.source_count(), 1);
}

#[tokio::test]
async fn test_cache_serves_repeat_requests() {
    let provider = MockOddsProvider::new("p", 2.0, 3.4, 3.9);
    let engine = engine_with(vec![provider.clone()], Arc::new(MemoryOddsStore::default()));

    engine.get_odds("A", "B", Some("L")).await.unwrap();
    provider.set_odds(2.5, 3.4, 3.9);
    let cached = engine.get_odds("A", "B", Some("L")).await.unwrap();
    assert_eq!(cached.best.home, 2.0);
    assert_eq!(provider.calls(), 1);

    engine.aggregator().invalidate("A", "B", Some("L")).await;
    let fresh = engine.get_odds("A", "B", Some("L")).await.unwrap();
    assert_eq!(fresh.best.home, 2.5);
}

#[tokio::test]
async fn test_repeat_decisions_build_history() {
    let provider = MockOddsProvider::new("p", 1.80, 3.40, 5.50);
    let store = Arc::new(MemoryOddsStore::default());
    let engine = engine_with(vec![provider.clone()], store.clone());
    let req = request(vec![]);

    let first = engine.decide(&req).await.unwrap();
    assert_eq!(first.movement.baseline_source, BaselineSource::Synthetic);

    provider.set_odds(1.90, 3.40, 5.50);
    engine.aggregator().clear_cache().await;
    let second = engine.decide(&req).await.unwrap();
    assert_eq!(second.movement.baseline_source, BaselineSource::History);
    assert!(second.movement.outcomes.home.change_pct > 5.0);
    assert_eq!(store.get(&req.match_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_timing_uses_recorded_history() {
    let store = Arc::new(MemoryOddsStore::default());
    let now = Utc::now();
    for (i, home) in [2.40, 2.34, 2.28, 2.22, 2.16, 2.10].iter().enumerate() {
        let at = now - Duration::hours(5 - i as i64);
        store
            .append("m1", OddsSnapshot::new(at, &Odds::new(*home, 3.4, 3.2), "b"))
            .await
            .unwrap();
    }
    let engine = engine_with(vec![], store);

    let rec = engine
        .analyze_odds_pattern("m1", Outcome::Home, now + Duration::hours(24))
        .await;
    assert_eq!(rec.action, TimingAction::BetNow);
    assert!(rec.confidence > 0.75);

    // away price is flat: stable with plenty of time → wait
    let rec = engine
        .analyze_odds_pattern("m1", Outcome::Away, now + Duration::hours(24))
        .await;
    assert_eq!(rec.action, TimingAction::Wait);
}

#[tokio::test]
async fn test_monitor_alerts_and_cancels() {
    let store = Arc::new(MemoryOddsStore::default());
    let now = Utc::now();
    for (i, home) in [2.40, 2.34, 2.28, 2.22, 2.16, 2.10].iter().enumerate() {
        let at = now - Duration::hours(5 - i as i64);
        store
            .append("m1", OddsSnapshot::new(at, &Odds::new(*home, 3.4, 3.2), "b"))
            .await
            .unwrap();
    }
    let mut config = seeded_config();
    config.timing.poll_interval_secs = 1;
    let engine = DecisionEngine::from_config(&config, vec![], store);

    let (tx, mut rx) = mpsc::channel(8);
    let handle = engine.monitor("m1", Outcome::Home, now + Duration::hours(24), tx);
    let alert = tokio::time::timeout(std::time::Duration::from_secs(3), rx.recv())
        .await
        .expect("first poll alerts immediately")
        .expect("alert channel open");
    assert_eq!(alert.recommendation.market, Outcome::Home);

    handle.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(3), handle.join())
        .await
        .expect("monitor stops after cancel");
}

#[tokio::test]
async fn test_batch_selects_best_edges() {
    let engine = engine_with(vec![], Arc::new(MemoryOddsStore::default()));
    let candidates = vec![
        MatchCandidate {
            match_id: "small".into(),
            prediction: CalibratedPrediction::new(0.55, 0.25, 0.20, 0.8),
            odds: Odds::new(1.90, 3.40, 5.00),
        },
        MatchCandidate {
            match_id: "none".into(),
            prediction: CalibratedPrediction::new(0.40, 0.30, 0.30, 0.8),
            odds: Odds::new(2.00, 3.00, 3.00),
        },
        MatchCandidate {
            match_id: "big".into(),
            prediction: CalibratedPrediction::new(0.65, 0.20, 0.15, 0.8),
            odds: Odds::new(1.80, 4.00, 6.00),
        },
    ];
    let bets = engine
        .optimize_batch(&candidates, 10_000.0, RiskProfile::Moderate, 5)
        .await;
    let ids: Vec<&str> = bets.iter().map(|b| b.match_id.as_str()).collect();
    assert_eq!(ids, vec!["big", "small"]);
}

#[tokio::test]
async fn test_sqlite_store_backs_timing() {
    let store = Arc::new(
        SqliteOddsStore::connect("sqlite::memory:", Duration::days(7))
            .await
            .unwrap(),
    );
    let engine = engine_with(vec![], store.clone());
    for _ in 0..3 {
        engine
            .record_snapshot("m1", &Odds::new(2.0, 3.3, 3.8), "pinnacle")
            .await
            .unwrap();
    }
    assert_eq!(store.get("m1").await.unwrap().len(), 3);

    let rec = engine
        .analyze_odds_pattern("m1", Outcome::Home, Utc::now() + Duration::hours(10))
        .await;
    assert_eq!(rec.action, TimingAction::BetNow);
    assert_eq!(rec.confidence, 0.5);
}
