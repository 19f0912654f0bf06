//! API route handlers.
//!
//! All endpoints speak JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::strategy::disagreement::{DisagreementAnalysis, EnsembleConfidence};
use crate::strategy::kelly::{MatchCandidate, RankedBet, DEFAULT_MAX_BETS};
use crate::strategy::{DecisionEngine, MatchDecision, MatchRequest};
use crate::timing::TimingRecommendation;
use crate::types::{
    AggregatedOdds, BettingRecommendation, CalibratedPrediction, EngineError, ModelVote, Odds,
    Outcome, RiskProfile,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub engine: Arc<DecisionEngine>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(engine: Arc<DecisionEngine>) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Engine error rendered as `{"error": "..."}` with a matching status.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::NoOddsSources { .. } => StatusCode::BAD_GATEWAY,
            EngineError::Storage(_) | EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "API request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StakeRequest {
    pub prediction: CalibratedPrediction,
    pub odds: Odds,
    pub bankroll: f64,
    #[serde(default)]
    pub risk_profile: RiskProfile,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub matches: Vec<MatchCandidate>,
    pub bankroll: f64,
    #[serde(default)]
    pub risk_profile: RiskProfile,
    #[serde(default = "default_max_bets")]
    pub max_bets: usize,
}

fn default_max_bets() -> usize {
    DEFAULT_MAX_BETS
}

#[derive(Debug, Deserialize)]
pub struct OddsQuery {
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub league: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TimingQuery {
    pub kickoff: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub odds: Odds,
    #[serde(default = "default_bookmaker")]
    pub bookmaker: String,
}

fn default_bookmaker() -> String {
    "manual".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DisagreementRequest {
    pub votes: Vec<ModelVote>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Serialize)]
pub struct DisagreementResponse {
    pub analysis: Option<DisagreementAnalysis>,
    pub ensemble: EnsembleConfidence,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub providers: Vec<String>,
    pub store: String,
    pub cached_odds: usize,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /api/stake
pub async fn optimize_stake(
    State(state): State<AppState>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<BettingRecommendation> {
    req.prediction.validate()?;
    req.odds.validate()?;
    if !(req.bankroll > 0.0) {
        return Err(EngineError::InvalidInput(format!(
            "bankroll must be positive, got {}",
            req.bankroll
        ))
        .into());
    }
    Ok(Json(state.engine.optimize_stake(
        &req.prediction,
        &req.odds,
        req.bankroll,
        req.risk_profile,
    )))
}

/// POST /api/stake/batch
pub async fn optimize_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Vec<RankedBet>> {
    let bets = state
        .engine
        .optimize_batch(&req.matches, req.bankroll, req.risk_profile, req.max_bets)
        .await;
    Ok(Json(bets))
}

/// GET /api/odds?home=..&away=..&league=..
pub async fn get_odds(
    State(state): State<AppState>,
    Query(q): Query<OddsQuery>,
) -> ApiResult<AggregatedOdds> {
    let odds = state
        .engine
        .get_odds(&q.home, &q.away, q.league.as_deref())
        .await?;
    Ok(Json(odds))
}

/// GET /api/timing/:match_id/:market?kickoff=..
pub async fn get_timing(
    State(state): State<AppState>,
    Path((match_id, market)): Path<(String, String)>,
    Query(q): Query<TimingQuery>,
) -> ApiResult<TimingRecommendation> {
    let market: Outcome = market
        .parse()
        .map_err(|e: anyhow::Error| EngineError::InvalidInput(e.to_string()))?;
    let rec = state
        .engine
        .analyze_odds_pattern(&match_id, market, q.kickoff)
        .await;
    Ok(Json(rec))
}

/// POST /api/snapshots/:match_id
pub async fn record_snapshot(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(req): Json<SnapshotRequest>,
) -> Result<StatusCode, ApiError> {
    req.odds.validate()?;
    state
        .engine
        .record_snapshot(&match_id, &req.odds, &req.bookmaker)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/disagreement
pub async fn ensemble_disagreement(
    State(state): State<AppState>,
    Json(req): Json<DisagreementRequest>,
) -> ApiResult<DisagreementResponse> {
    if req.votes.is_empty() {
        return Err(EngineError::InvalidInput("at least one model vote is required".into()).into());
    }
    let analysis = req
        .outcome
        .map(|outcome| state.engine.calculate_ensemble_disagreement(&req.votes, outcome));
    let ensemble = state.engine.ensemble_confidence(&req.votes);
    Ok(Json(DisagreementResponse { analysis, ensemble }))
}

/// POST /api/decide
pub async fn decide(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> ApiResult<MatchDecision> {
    let decision = state.engine.decide(&req).await?;
    Ok(Json(decision))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        providers: engine.aggregator().provider_names(),
        store: engine.timing().store().name().to_string(),
        cached_odds: engine.aggregator().cached_entries().await,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
