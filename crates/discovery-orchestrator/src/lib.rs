pub mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use discovery_core::{
    previous_trading_day, Cache, DiscoveryError, MarketCalendar, MarketDataClient, RunRecord,
    RunState, StrategyConfig,
};
use scoring_engine::ScoringContext;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use universe_filter::UniverseFilter;
use uuid::Uuid;

pub use support::{BarsSource, ExchangeCalendar};

const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(300);

/// Ties together the capabilities a discovery run needs: a market data
/// source, a trailing-bar source (usually the same concrete client), a
/// published-candidate cache, a market calendar, and a clock. Built once
/// and shared across runs - the value itself carries no run-specific
/// state.
pub struct Orchestrator {
    market_data: Arc<dyn MarketDataClient>,
    bars_source: Arc<dyn BarsSource>,
    cache: Arc<dyn Cache>,
    calendar: Arc<dyn MarketCalendar>,
    run_deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        market_data: Arc<dyn MarketDataClient>,
        bars_source: Arc<dyn BarsSource>,
        cache: Arc<dyn Cache>,
        calendar: Arc<dyn MarketCalendar>,
    ) -> Self {
        Self {
            market_data,
            bars_source,
            cache,
            calendar,
            run_deadline: DEFAULT_RUN_DEADLINE,
        }
    }

    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = deadline;
        self
    }

    /// Runs one discovery pass for `strategy`, producing a `RunRecord`
    /// that's always returned, even on failure or timeout - the caller
    /// (job-runner) is responsible for persisting it.
    pub async fn run(&self, strategy: &StrategyConfig, run_id: Uuid, now: DateTime<Utc>) -> RunRecord {
        let mut record = RunRecord::new(run_id, strategy.id.clone(), now);
        record.started_at = Some(now);
        record.state = RunState::Running;

        match tokio::time::timeout(self.run_deadline, self.run_inner(strategy, &mut record, now)).await {
            Ok(Ok(())) => {
                record.state = RunState::Succeeded;
            }
            Ok(Err(e)) => {
                warn!(run_id = %run_id, strategy_id = %strategy.id, error = %e, "discovery run failed");
                record.state = RunState::Failed;
                record.error = Some(e.to_string());
            }
            Err(_) => {
                warn!(run_id = %run_id, strategy_id = %strategy.id, deadline = ?self.run_deadline, "discovery run timed out");
                record.state = RunState::TimedOut;
                record.error = Some(format!("run exceeded {:?}", self.run_deadline));
            }
        }

        record.finished_at = Some(Utc::now());
        record
    }

    async fn run_inner(
        &self,
        strategy: &StrategyConfig,
        record: &mut RunRecord,
        now: DateTime<Utc>,
    ) -> Result<(), DiscoveryError> {
        let trading_date = previous_trading_day(now);

        // Universe fetch is the one stage whose failure is fatal; every
        // later stage degrades per-symbol instead.
        let (universe, freshness) = self.market_data.fetch_universe(trading_date).await?;
        record.record_stage("universe", universe.len(), universe.len());
        info!(run_id = %record.run_id, count = universe.len(), "universe fetched");

        let filter = UniverseFilter::new(strategy.guards);
        let filter_result = filter.apply(universe, freshness, now, self.calendar.as_ref());
        let rejected: usize = filter_result.rejections.values().sum();
        record.record_stage(
            "filter",
            filter_result.kept.len() + rejected,
            filter_result.kept.len(),
        );
        for (reason, count) in &filter_result.rejections {
            debug!(run_id = %record.run_id, reason, count, "universe rejections");
        }

        let mut bounded = filter_result.kept;
        bounded.sort_by(|a, b| {
            support::coarse_activity(b)
                .partial_cmp(&support::coarse_activity(a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let pre_bound = bounded.len();
        bounded.truncate(strategy.universe_cap);
        record.record_stage("bound", pre_bound, bounded.len());

        let enriched_with_bars = self.enrich_all(&bounded, strategy.enrichment_concurrency).await;
        record.record_stage("enrich", bounded.len(), enriched_with_bars.len());

        let spy_bars = self
            .bars_source
            .recent_bars("SPY")
            .await
            .unwrap_or_default();
        let regime = support::determine_regime(&spy_bars);

        let hour = support::exchange_local_hour(now);
        let pre_score = enriched_with_bars.len();
        let mut candidates = Vec::with_capacity(pre_score);
        for (mut enriched, bars) in enriched_with_bars {
            feature_calculator::compute_features(&mut enriched, &bars, hour);

            let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
            let consecutive_up_days = if closes.len() >= 2 {
                discovery_core::Field::Known(scoring_engine::consecutive_up_days(&closes))
            } else {
                discovery_core::Field::Unknown
            };

            let ctx = ScoringContext {
                regime,
                consecutive_up_days,
                atr_pct_10d_mean: support::atr_pct_10d_mean(&bars),
            };

            match scoring_engine::score_candidate(
                &enriched,
                &ctx,
                &strategy.weights,
                &strategy.tier_thresholds,
                &strategy.id,
                filter_result.stale,
                now,
            ) {
                Some(candidate) => candidates.push(candidate),
                None => debug!(symbol = %enriched.symbol(), "dropped: composite confidence below 0.5"),
            }
        }
        record.record_stage("score", pre_score, candidates.len());

        scoring_engine::sort_candidates(&mut candidates);
        scoring_engine::apply_elastic_floor(
            &mut candidates,
            &strategy.tier_thresholds,
            strategy.elastic_floor,
            filter_result.stale,
        );
        record.record_stage("tier", candidates.len(), candidates.len());

        self.cache.publish(&strategy.id, &candidates).await?;
        record.record_stage("publish", candidates.len(), candidates.len());

        Ok(())
    }

    /// Bounded-concurrency enrichment fan-out: one task per symbol,
    /// acquiring a local semaphore permit sized from the strategy config
    /// before calling into the (separately throttled) market data client.
    async fn enrich_all(
        &self,
        bounded: &[discovery_core::TickerSnapshot],
        concurrency: usize,
    ) -> Vec<(discovery_core::EnrichedSymbol, Vec<feature_calculator::Bar>)> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for snapshot in bounded {
            let symbol = snapshot.symbol.clone();
            let snapshot = snapshot.clone();
            let market_data = self.market_data.clone();
            let bars_source = self.bars_source.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let enriched = market_data.enrich_symbol(&snapshot).await;
                let bars = bars_source.recent_bars(&symbol).await;
                (symbol, enriched, bars)
            });
        }

        let mut out = Vec::with_capacity(bounded.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_symbol, Ok(enriched), Ok(bars))) => out.push((enriched, bars)),
                Ok((symbol, Err(e), _)) => {
                    warn!(%symbol, error = %e, "enrichment failed, dropping symbol");
                }
                Ok((symbol, _, Err(e))) => {
                    warn!(%symbol, error = %e, "bar fetch failed, dropping symbol");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "enrichment task panicked");
                }
            }
        }
        out
    }
}
