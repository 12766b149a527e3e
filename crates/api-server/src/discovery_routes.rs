use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use discovery_core::{ActionTag, Candidate, RunRecord, SystemState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, AppState};

pub fn discovery_routes() -> Router<AppState> {
    Router::new()
        .route("/discovery/trigger", post(trigger))
        .route("/discovery/status", get(status))
        .route("/discovery/contenders", get(contenders))
        .route("/discovery/squeeze-candidates", get(squeeze_candidates))
        .route("/discovery/health", get(health))
}

#[derive(Debug, Deserialize)]
struct TriggerParams {
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default = "default_limit")]
    #[allow(dead_code)]
    limit: usize,
}

fn default_strategy() -> String {
    "default".to_string()
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    run_id: Uuid,
    status: &'static str,
}

/// `POST /discovery/trigger?strategy={id}&limit={n}` - enqueues a run, or
/// returns the already-active one for that strategy unchanged (idempotent
/// trigger, invariant 6).
#[utoipa::path(
    post,
    path = "/discovery/trigger",
    params(("strategy" = String, Query, description = "strategy id"), ("limit" = usize, Query, description = "result cap applied by the reader endpoints")),
    responses((status = 202, description = "newly enqueued"), (status = 200, description = "already active"))
)]
async fn trigger(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> Result<Response, AppError> {
    if !state.strategies.contains_key(&params.strategy) {
        return Err(AppError {
            code: "unknown_strategy".to_string(),
            message: format!("no strategy registered for '{}'", params.strategy),
            run_id: None,
        });
    }

    let now = state.clock.now();
    let (run_id, newly_enqueued) = state
        .job_runner
        .enqueue(&params.strategy, params.limit, now)?;

    let status_code = if newly_enqueued {
        axum::http::StatusCode::ACCEPTED
    } else {
        axum::http::StatusCode::OK
    };
    let status_label = if newly_enqueued { "queued" } else { "running" };

    Ok((
        status_code,
        Json(TriggerResponse {
            run_id,
            status: status_label,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    run_id: Uuid,
}

/// `GET /discovery/status?run_id={id}` - returns the current `RunRecord`.
#[utoipa::path(
    get,
    path = "/discovery/status",
    params(("run_id" = Uuid, Query, description = "run id returned by trigger")),
    responses((status = 200, description = "run record"), (status = 404, description = "unknown run"))
)]
async fn status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<RunRecord>, AppError> {
    let record = state
        .job_runner
        .poll(params.run_id)
        .map_err(|e| AppError::from(e).with_run_id(params.run_id))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct ContendersParams {
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

/// `GET /discovery/contenders?strategy={id}&limit={n}` - reads the cache
/// directly, bypassing the pipeline. Never writes anything; a cache miss
/// or read failure degrades gracefully rather than 500ing (§7: the reader
/// endpoint never fails loudly due to stale or missing data).
#[utoipa::path(
    get,
    path = "/discovery/contenders",
    params(("strategy" = String, Query), ("limit" = usize, Query)),
    responses((status = 200, description = "candidate list"))
)]
async fn contenders(
    State(state): State<AppState>,
    Query(params): Query<ContendersParams>,
) -> Response {
    serve_from_cache(&state, &params.strategy, params.limit, None).await
}

#[derive(Debug, Deserialize)]
struct SqueezeParams {
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default)]
    min_score: f64,
    #[serde(default = "default_limit")]
    limit: usize,
}

/// `GET /discovery/squeeze-candidates?strategy={id}&min_score={v}&limit={n}`
/// - same cache read, filtered by a score threshold accepted in either the
/// 0-1 or 0-100 scale (invariant 8: `min_score=0.4` and `min_score=40` are
/// equivalent).
#[utoipa::path(
    get,
    path = "/discovery/squeeze-candidates",
    params(("strategy" = String, Query), ("min_score" = f64, Query), ("limit" = usize, Query)),
    responses((status = 200, description = "candidate list"))
)]
async fn squeeze_candidates(
    State(state): State<AppState>,
    Query(params): Query<SqueezeParams>,
) -> Response {
    let min_score = normalize_score_threshold(params.min_score);
    serve_from_cache(&state, &params.strategy, params.limit, Some(min_score)).await
}

/// Normalizes a score threshold accepted on either the 0-1 or 0-100 scale:
/// values at or below 1 are assumed fractional and scaled up, everything
/// else is taken as already on the 0-100 scale.
fn normalize_score_threshold(raw: f64) -> f64 {
    if raw <= 1.0 {
        raw * 100.0
    } else {
        raw.trunc()
    }
}

async fn serve_from_cache(
    state: &AppState,
    strategy_id: &str,
    limit: usize,
    min_score: Option<f64>,
) -> Response {
    let read = state.cache.read(strategy_id).await;

    let mut headers = HeaderMap::new();
    headers.insert("cache-control", "no-store".parse().unwrap());

    let candidates = match read {
        Ok(Some(candidates)) => candidates,
        Ok(None) => {
            headers.insert("x-system-state", "STALE".parse().unwrap());
            headers.insert("x-reason-stats", "{}".parse().unwrap());
            return (axum::http::StatusCode::OK, headers, Json(Vec::<Candidate>::new())).into_response();
        }
        Err(_) => {
            headers.insert("x-system-state", "DEGRADED".parse().unwrap());
            return (axum::http::StatusCode::SERVICE_UNAVAILABLE, headers, Json(())).into_response();
        }
    };

    let filtered: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| min_score.map(|m| c.composite_score >= m).unwrap_or(true))
        .take(limit)
        .collect();

    let system_state = classify_system_state(&filtered);
    headers.insert(
        "x-system-state",
        system_state_header(system_state).parse().unwrap(),
    );
    headers.insert(
        "x-reason-stats",
        reason_histogram_header(&filtered).parse().unwrap(),
    );

    (axum::http::StatusCode::OK, headers, Json(filtered)).into_response()
}

/// Best-effort system state derived from the published list itself: the
/// orchestrator caps every candidate's tier at `monitor` when the source
/// data was stale (§4.2), so an all-`monitor` non-empty list is read as
/// the stale signal since the cache doesn't separately persist it.
fn classify_system_state(candidates: &[Candidate]) -> SystemState {
    if candidates.is_empty() {
        return SystemState::Stale;
    }
    if candidates.iter().all(|c| c.action_tag == ActionTag::Monitor) {
        SystemState::Stale
    } else {
        SystemState::Healthy
    }
}

fn system_state_header(state: SystemState) -> &'static str {
    match state {
        SystemState::Healthy => "HEALTHY",
        SystemState::Stale => "STALE",
        SystemState::Degraded => "DEGRADED",
    }
}

fn reason_histogram_header(candidates: &[Candidate]) -> String {
    let mut counts = std::collections::BTreeMap::new();
    for candidate in candidates {
        for reason in &candidate.reasons {
            *counts.entry(reason.clone()).or_insert(0u32) += 1;
        }
    }
    serde_json::to_string(&counts).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    queue_depth: usize,
    provider: &'static str,
}

/// `GET /discovery/health` - liveness plus downstream provider status.
/// Never touches the network; "provider" reports whether a client is
/// wired, not whether the upstream is currently reachable.
#[utoipa::path(
    get,
    path = "/discovery/health",
    responses((status = 200, body = HealthResponse))
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let _ = &state.market_data;
    Json(HealthResponse {
        status: "ok",
        queue_depth: state.job_runner.queue_depth(),
        provider: "configured",
    })
}
