//! HTTP routes and handlers

use adcomply_core::{CampaignArtifact, ComplianceVerdict, Error};
use adcomply_regulatory::MonitorStatus;
use adcomply_reporter::{Alert, PeriodKind, Report};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::ComplianceEngine;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ComplianceEngine>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(engine: Arc<ComplianceEngine>, metrics_handle: PrometheusHandle) -> Self {
        Self { engine, metrics_handle }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/check", post(check))
        .route("/v1/check/batch", post(check_batch))
        .route("/v1/reports/:kind", get(get_report))
        .route("/v1/reports/:kind/generate", post(generate_report))
        .route("/v1/alerts/:id/resolve", post(resolve_alert))
        .route("/v1/rules/reload", post(reload_rules))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while regulations are stale
    pub status: String,
    pub ruleset_version: u64,
    pub regulatory: MonitorStatus,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let regulatory = state.engine.regulatory().status();
    Json(HealthResponse {
        status: if regulatory.stale { "degraded" } else { "ok" }.to_string(),
        ruleset_version: state.engine.rule_store().version(),
        regulatory,
    })
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn check(
    State(state): State<AppState>,
    Json(artifact): Json<CampaignArtifact>,
) -> Result<Json<ComplianceVerdict>, AppError> {
    // Dropping the request future cancels the evaluation
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let verdict = state.engine.check(&artifact, &cancel).await?;
    Ok(Json(verdict))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub artifacts: Vec<CampaignArtifact>,
}

/// Per-artifact batch result, in request order
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItem {
    Evaluated { verdict: ComplianceVerdict },
    Rejected { artifact_id: String, error: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
}

async fn check_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let outcomes = state.engine.check_batch(&request.artifacts, &cancel).await?;

    let results = request
        .artifacts
        .iter()
        .zip(outcomes)
        .map(|(artifact, outcome)| match outcome {
            Ok(verdict) => BatchItem::Evaluated { verdict },
            Err(e) => BatchItem::Rejected {
                artifact_id: artifact.id.clone(),
                error: e.to_string(),
            },
        })
        .collect();
    Ok(Json(BatchResponse { results }))
}

async fn get_report(State(state): State<AppState>, Path(kind): Path<String>) -> Result<Json<Report>, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.engine.get_report(kind)))
}

async fn generate_report(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let kind = parse_kind(&kind)?;
    let report = state.engine.generate_report(kind);
    info!(report_id = %report.id, "Report generated on demand");
    Ok((StatusCode::ACCEPTED, Json(report)))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub notes: String,
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<Alert>, AppError> {
    let notes = body.map(|Json(request)| request.notes).unwrap_or_default();
    state
        .engine
        .reporter()
        .resolve_alert(&id, notes)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("alert {id} not found")))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub version: u64,
    pub rules: usize,
}

async fn reload_rules(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let version = state.engine.reload_rules().await?;
    Ok(Json(ReloadResponse {
        version,
        rules: state.engine.rule_store().current_snapshot().len(),
    }))
}

async fn fallback() -> AppError {
    AppError::NotFound("no such route".to_string())
}

fn parse_kind(raw: &str) -> Result<PeriodKind, AppError> {
    PeriodKind::parse(raw).ok_or_else(|| AppError::NotFound(format!("unknown report period {raw:?}")))
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Engine(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Engine(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Engine(err) => {
                let (status, kind) = match &err {
                    Error::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
                    Error::RuleLoad(_) => (StatusCode::UNPROCESSABLE_ENTITY, "rule_load_error"),
                    Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                    Error::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
                };
                if status.is_server_error() {
                    warn!(error = %err, "Request failed");
                }
                (status, kind, err.to_string())
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
