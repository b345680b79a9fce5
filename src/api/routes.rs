//! HTTP surface of the settlement engine.
//!
//! Three kinds of callers: operators triggering a full-date recompute,
//! dashboards reading settlement sheets, and upstream writers notifying the
//! incremental recalculator of a data change.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

use crate::middleware::{admin_guard, AdminToken};
use crate::models::DailySummary;
use crate::settlement::{run_batch, BatchReport, ChangeEvent, PrizeTable};
use crate::store::SettlementDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: SettlementDb,
    pub prize_table: Arc<dyn PrizeTable>,
    pub events: mpsc::Sender<ChangeEvent>,
    pub admin_token: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let admin_token = AdminToken(state.admin_token.clone());

    Router::new()
        .route(
            "/api/settlements/run/:date",
            post(run_settlement).route_layer(axum::middleware::from_fn_with_state(
                admin_token,
                admin_guard,
            )),
        )
        .route("/health", get(health_check))
        .route("/api/settlements/:date", get(get_summaries))
        .route("/api/settlements/:date/:agent_id", get(get_summary))
        .route("/api/events", post(post_event))
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Manual "recompute this date for all agents" trigger. Idempotent and safe
/// to repeat; a response with failures listed still means the batch ran.
async fn run_settlement(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<BatchReport>, ApiError> {
    let date = parse_date(&date)?;
    let report = run_batch(&state.db, state.prize_table.as_ref(), date).await?;
    Ok(Json(report))
}

/// All settlement sheets for a date, ordered by (module, position).
async fn get_summaries(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<SummariesResponse>, ApiError> {
    let date = parse_date(&date)?;
    let summaries = state.db.summaries_for_date(date).await?;
    Ok(Json(SummariesResponse {
        date,
        count: summaries.len(),
        summaries,
    }))
}

/// One agent's settlement sheet for a date.
async fn get_summary(
    State(state): State<AppState>,
    Path((date, agent_id)): Path<(String, String)>,
) -> Result<Json<DailySummary>, ApiError> {
    let date = parse_date(&date)?;
    state
        .db
        .get_summary(&agent_id, date)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no summary for agent {agent_id} on {date}")))
}

/// Upstream change notification. Enqueued for the incremental
/// recalculator and acknowledged immediately (fire-and-forget).
async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<ChangeEvent>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state
        .events
        .send(event)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("event channel closed: {e}")))?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": true }))))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("'{raw}' is not a yyyy-MM-dd date")))
}

// ===== Request/Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct SummariesResponse {
    date: NaiveDate,
    count: usize,
    summaries: Vec<DailySummary>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(e) => {
                error!(error = %format!("{e:#}"), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
