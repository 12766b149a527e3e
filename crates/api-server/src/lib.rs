mod discovery_routes;
mod request_id;
mod security_headers;
mod strategies;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{middleware, routing::get, Json, Router};
use discovery_core::{Clock, DiscoveryError, MarketCalendar, StrategyConfig, SystemClock};
use discovery_orchestrator::ExchangeCalendar;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

pub use request_id::RequestId;

/// Everything a handler needs, built once at startup and cloned (cheaply,
/// behind `Arc`s) into every request.
#[derive(Clone)]
pub struct AppState {
    pub job_runner: Arc<job_runner::JobRunner>,
    pub cache: Arc<dyn discovery_core::Cache>,
    pub market_data: Arc<dyn discovery_core::MarketDataClient>,
    pub strategies: Arc<HashMap<String, StrategyConfig>>,
    pub default_strategy_id: String,
    pub clock: Arc<dyn Clock>,
}

/// Envelope every success response is wrapped in, matching this corpus's
/// established route style.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// The `{code, message, run_id?}` error contract. `run_id` is only ever
/// attached by handlers that already have one to hand (trigger, status).
#[derive(Debug, Serialize)]
pub struct AppError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl AppError {
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "queue_busy" => StatusCode::SERVICE_UNAVAILABLE,
            "unknown_run" | "unknown_strategy" => StatusCode::NOT_FOUND,
            "cache_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "invalid_config" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DiscoveryError> for AppError {
    fn from(err: DiscoveryError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            run_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self)).into_response()
    }
}

fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(discovery_routes::discovery_routes())
        .layer(middleware::from_fn(security_headers::security_headers_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "amc-trader discovery pipeline"
}

/// Builds the application, spawns the job-runner worker loop, and serves
/// HTTP until the process is asked to shut down.
pub async fn run_server() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let _ = dotenvy::dotenv();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let provider_base_url =
        std::env::var("PROVIDER_BASE_URL").unwrap_or_else(|_| "https://api.polygon.io".to_string());
    let provider_api_key = std::env::var("PROVIDER_API_KEY").unwrap_or_default();

    let strategies = Arc::new(strategies::load()?);
    let default_strategy_id = "default".to_string();
    let default_concurrency = strategies
        .get(&default_strategy_id)
        .map(|s| s.enrichment_concurrency)
        .unwrap_or(8);

    let cache: Arc<dyn discovery_core::Cache> = Arc::new(
        cache_layer::RedisCache::connect(&redis_url, default_strategy_id.clone()).await?,
    );

    let provider = market_data_client::ProviderClient::new(provider_base_url, provider_api_key);
    let market_data = Arc::new(market_data_client::DiscoveryMarketDataClient::new(
        provider,
        default_concurrency,
    ));
    let market_data_dyn: Arc<dyn discovery_core::MarketDataClient> = market_data.clone();

    let calendar: Arc<dyn MarketCalendar> = Arc::new(ExchangeCalendar);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let orchestrator = Arc::new(discovery_orchestrator::Orchestrator::new(
        market_data_dyn.clone(),
        market_data.clone(),
        cache.clone(),
        calendar,
    ));

    let (job_runner, receiver) = job_runner::JobRunner::new(job_runner::DEFAULT_QUEUE_CAPACITY);

    tokio::spawn(job_runner.clone().run_worker(
        orchestrator,
        strategies.clone(),
        receiver,
        clock.clone(),
    ));

    let state = AppState {
        job_runner,
        cache,
        market_data: market_data_dyn,
        strategies,
        default_strategy_id,
        clock,
    };

    let app = app_router(state);
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;

    info!(%addr, "amc-trader discovery pipeline listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Exposed so tests (and a scheduler process) can build a router/state
/// without going through environment variables.
pub fn test_router(state: AppState) -> Router {
    app_router(state)
}
