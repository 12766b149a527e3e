use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use api_server::{test_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, NaiveDate, Utc};
use discovery_core::{
    Candidate, Cache, Clock, DiscoveryError, EnrichedSymbol, MarketDataClient, StrategyConfig,
    SystemClock, TickerSnapshot,
};
use tower::ServiceExt;

struct FakeCache {
    store: Mutex<HashMap<String, Vec<Candidate>>>,
}

impl FakeCache {
    fn seeded(strategy_id: &str, candidates: Vec<Candidate>) -> Self {
        let mut store = HashMap::new();
        store.insert(strategy_id.to_string(), candidates);
        Self {
            store: Mutex::new(store),
        }
    }
}

#[async_trait]
impl Cache for FakeCache {
    async fn publish(&self, strategy_id: &str, candidates: &[Candidate]) -> Result<(), DiscoveryError> {
        self.store
            .lock()
            .unwrap()
            .insert(strategy_id.to_string(), candidates.to_vec());
        Ok(())
    }

    async fn read(&self, strategy_id: &str) -> Result<Option<Vec<Candidate>>, DiscoveryError> {
        Ok(self.store.lock().unwrap().get(strategy_id).cloned())
    }
}

struct UnreachableMarketData;

#[async_trait]
impl MarketDataClient for UnreachableMarketData {
    async fn fetch_universe(
        &self,
        _trading_date: NaiveDate,
    ) -> Result<(Vec<TickerSnapshot>, DateTime<Utc>), DiscoveryError> {
        unreachable!("HTTP facade tests never trigger a run")
    }

    async fn enrich_symbol(&self, _snapshot: &TickerSnapshot) -> Result<EnrichedSymbol, DiscoveryError> {
        unreachable!()
    }

    async fn avg_volume_20d(&self, _symbol: &str) -> Result<Option<i64>, DiscoveryError> {
        unreachable!()
    }
}

fn candidate(symbol: &str, composite: f64) -> Candidate {
    use discovery_core::{ActionTag, Field, SubScores};
    use rust_decimal::Decimal;

    Candidate {
        symbol: symbol.to_string(),
        price: Decimal::new(1000, 2),
        composite_score: composite,
        sub_scores: SubScores {
            volume_momentum: Field::Known(80.0),
            squeeze: Field::Known(70.0),
            catalyst: Field::Known(60.0),
            sentiment: Field::Known(50.0),
            options: Field::Known(40.0),
            technical: Field::Known(30.0),
        },
        action_tag: ActionTag::Watchlist,
        reasons: vec!["relvol:4.2x".to_string()],
        entry: Decimal::new(1000, 2),
        stop: Decimal::new(950, 2),
        target_1: Decimal::new(1100, 2),
        target_2: Decimal::new(1200, 2),
        computed_at: Utc::now(),
        strategy_id: "default".to_string(),
        confidence: 1.0,
        intraday_relvol: Field::Known(4.2),
    }
}

/// The worker loop is never spawned in these tests, so the receiver half
/// of the job queue must be kept alive by the caller for as long as the
/// router is exercised - dropping it would close the channel and turn
/// every `enqueue` into an immediate `QueueBusy`.
fn test_state(cache: Arc<dyn Cache>) -> (AppState, tokio::sync::mpsc::Receiver<job_runner::QueuedJob>) {
    let mut strategies = HashMap::new();
    strategies.insert("default".to_string(), StrategyConfig::default_alphastack("default"));
    let (job_runner, receiver) = job_runner::JobRunner::new(job_runner::DEFAULT_QUEUE_CAPACITY);

    let state = AppState {
        job_runner,
        cache,
        market_data: Arc::new(UnreachableMarketData),
        strategies: Arc::new(strategies),
        default_strategy_id: "default".to_string(),
        clock: Arc::new(SystemClock),
    };
    (state, receiver)
}

#[tokio::test]
async fn trigger_is_idempotent_for_an_active_strategy() {
    let cache: Arc<dyn Cache> = Arc::new(FakeCache::seeded("default", vec![]));
    let (state, _receiver) = test_state(cache);
    let app = test_router(state);

    let first = app
        .clone()
        .oneshot(
            Request::post("/discovery/trigger?strategy=default&limit=50")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .clone()
        .oneshot(
            Request::post("/discovery/trigger?strategy=default&limit=50")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let first_body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
    let second_body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let first_json: serde_json::Value = serde_json::from_slice(&first_body).unwrap();
    let second_json: serde_json::Value = serde_json::from_slice(&second_body).unwrap();
    assert_eq!(first_json["run_id"], second_json["run_id"]);
}

#[tokio::test]
async fn trigger_rejects_unknown_strategy() {
    let cache: Arc<dyn Cache> = Arc::new(FakeCache::seeded("default", vec![]));
    let (state, _receiver) = test_state(cache);
    let app = test_router(state);

    let response = app
        .oneshot(
            Request::post("/discovery/trigger?strategy=nonexistent&limit=50")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contenders_read_returns_no_store_and_system_state() {
    let candidates = vec![candidate("AAA", 82.5)];
    let cache: Arc<dyn Cache> = Arc::new(FakeCache::seeded("default", candidates));
    let (state, _receiver) = test_state(cache);
    let app = test_router(state);

    let response = app
        .oneshot(
            Request::get("/discovery/contenders?strategy=default&limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
    assert_eq!(response.headers().get("x-system-state").unwrap(), "HEALTHY");
    assert!(response.headers().contains_key("x-reason-stats"));
}

#[tokio::test]
async fn squeeze_candidates_min_score_normalization_is_scale_invariant() {
    let candidates = vec![candidate("AAA", 82.5)];
    let cache: Arc<dyn Cache> = Arc::new(FakeCache::seeded("default", candidates));
    let (state, _receiver) = test_state(cache);
    let app = test_router(state);

    let fractional = app
        .clone()
        .oneshot(
            Request::get("/discovery/squeeze-candidates?strategy=default&min_score=0.4&limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let integer = app
        .oneshot(
            Request::get("/discovery/squeeze-candidates?strategy=default&min_score=40&limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(fractional.status(), StatusCode::OK);
    assert_eq!(integer.status(), StatusCode::OK);

    let fractional_body = axum::body::to_bytes(fractional.into_body(), usize::MAX).await.unwrap();
    let integer_body = axum::body::to_bytes(integer.into_body(), usize::MAX).await.unwrap();
    assert_eq!(fractional_body, integer_body);
}

#[tokio::test]
async fn health_reports_queue_depth() {
    let cache: Arc<dyn Cache> = Arc::new(FakeCache::seeded("default", vec![]));
    let (state, _receiver) = test_state(cache);
    let app = test_router(state);

    let response = app
        .oneshot(Request::get("/discovery/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
