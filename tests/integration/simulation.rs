//! Bankroll replay.
//!
//! Generates a season of fixtures with known true probabilities, prices
//! them with a bookmaker margin, feeds a noisy model estimate through the
//! optimizer and settles each bet against the true outcome.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use betting_engine::strategy::kelly::{KellyConfig, KellyOptimizer};
use betting_engine::strategy::monte_carlo::MonteCarloSimulator;
use betting_engine::types::*;

const MARGIN: f64 = 1.05;

struct Fixture {
    truth: CalibratedPrediction,
    model: CalibratedPrediction,
    odds: Odds,
}

fn normalise(h: f64, d: f64, a: f64) -> (f64, f64, f64) {
    let total = h + d + a;
    (h / total, d / total, a / total)
}

fn generate_fixture(rng: &mut StdRng) -> Fixture {
    let (h, d, a) = normalise(
        rng.gen_range(0.2..0.7),
        rng.gen_range(0.15..0.35),
        rng.gen_range(0.1..0.5),
    );
    let truth = CalibratedPrediction::new(h, d, a, 1.0);

    // Bookmaker quotes the truth with a margin plus its own pricing error.
    let price = |p: f64, rng: &mut StdRng| {
        let skew = rng.gen_range(0.92..1.08);
        (1.0 / (p * MARGIN) * skew).max(1.01)
    };
    let odds = Odds::new(price(h, rng), price(d, rng), price(a, rng));

    let noisy = |p: f64, rng: &mut StdRng| (p + rng.gen_range(-0.02..0.02)).max(0.01);
    let (mh, md, ma) = normalise(noisy(h, rng), noisy(d, rng), noisy(a, rng));
    let model = CalibratedPrediction::new(mh, md, ma, rng.gen_range(0.55..0.95));

    Fixture { truth, model, odds }
}

fn settle(truth: &CalibratedPrediction, rng: &mut StdRng) -> Outcome {
    let roll: f64 = rng.gen();
    if roll < truth.home {
        Outcome::Home
    } else if roll < truth.home + truth.draw {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

#[test]
fn test_bankroll_replay_respects_caps_and_survives() {
    let optimizer = KellyOptimizer::new(KellyConfig {
        simulation_iterations: 500,
        random_seed: 7,
        ..KellyConfig::default()
    });
    let mut rng = StdRng::seed_from_u64(2024);
    let mut bankroll = 1_000.0;
    let mut bets = 0;

    for _ in 0..300 {
        let fixture = generate_fixture(&mut rng);
        let rec = optimizer.optimize(&fixture.model, &fixture.odds, bankroll, RiskProfile::Moderate);
        let result = settle(&fixture.truth, &mut rng);

        let Some(bet) = rec.into_bet() else {
            continue;
        };
        bets += 1;
        assert!(bet.stake > 0.0);
        assert!(
            bet.stake <= 0.05 * bankroll + 1e-9,
            "stake {} exceeds 5% of bankroll {}",
            bet.stake,
            bankroll
        );

        if result == bet.market {
            bankroll += bet.stake * (bet.odds - 1.0);
        } else {
            bankroll -= bet.stake;
        }
        assert!(bankroll > 0.0, "bankroll exhausted after {bets} bets");
    }

    assert!(bets > 0, "replay placed no bets");
}

#[test]
fn test_positive_edge_simulates_to_theoretical_ev() {
    let simulator = MonteCarloSimulator::default();
    let mut rng = StdRng::seed_from_u64(99);
    let (p, odds) = (0.55, 2.0);

    let result = simulator.simulate(&mut rng, p, odds, 1.0, 100.0, 10_000);

    // +0.10 units per bet, per-trial stdev ~1.0 → stdev of the mean ~0.01.
    let theoretical = p * (odds - 1.0) - (1.0 - p);
    assert!(result.mean_return > 0.0, "mean return {}", result.mean_return);
    assert!((result.mean_return - theoretical).abs() < 0.04);
    assert!((result.win_rate - p).abs() < 0.03);
    assert!(result.sharpe_ratio > 0.0);
}

#[test]
fn test_conservative_profile_never_outstakes_aggressive() {
    let optimizer = KellyOptimizer::new(KellyConfig {
        simulation_iterations: 200,
        random_seed: 11,
        ..KellyConfig::default()
    });
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..100 {
        let fixture = generate_fixture(&mut rng);
        let conservative =
            optimizer.optimize(&fixture.model, &fixture.odds, 1_000.0, RiskProfile::Conservative);
        let aggressive =
            optimizer.optimize(&fixture.model, &fixture.odds, 1_000.0, RiskProfile::Aggressive);
        assert!(conservative.stake() <= aggressive.stake() + 1e-9);
    }
}
