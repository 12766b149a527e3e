use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use discovery_core::{DiscoveryError, EnrichedSymbol, Field, TickerSnapshot};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::provider::ProviderClient;
use crate::volume_cache::VolumeAverageCache;

const TRAILING_WINDOW_DAYS: i64 = 60;

/// Implements `discovery_core::MarketDataClient` against the abstract
/// upstream provider, with a concurrency cap on outstanding enrichment
/// calls (design default 8) and a write-through volume-average cache.
pub struct DiscoveryMarketDataClient {
    provider: ProviderClient,
    volume_cache: Option<VolumeAverageCache>,
    enrichment_semaphore: Arc<Semaphore>,
}

impl DiscoveryMarketDataClient {
    pub fn new(provider: ProviderClient, enrichment_concurrency: usize) -> Self {
        Self {
            provider,
            volume_cache: None,
            enrichment_semaphore: Arc::new(Semaphore::new(enrichment_concurrency.max(1))),
        }
    }

    pub fn with_volume_cache(mut self, cache: VolumeAverageCache) -> Self {
        self.volume_cache = Some(cache);
        self
    }

    fn trading_date_close(trading_date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&trading_date.and_hms_opt(21, 0, 0).expect("valid time"))
    }
}

#[async_trait]
impl discovery_core::MarketDataClient for DiscoveryMarketDataClient {
    async fn fetch_universe(
        &self,
        trading_date: NaiveDate,
    ) -> Result<(Vec<TickerSnapshot>, DateTime<Utc>), DiscoveryError> {
        let bars = self.provider.grouped_daily(trading_date).await?;

        let prior_date = trading_date
            .pred_opt()
            .ok_or_else(|| DiscoveryError::InvalidConfig("trading_date underflow".into()))?;
        let prior_bars = self.provider.grouped_daily(prior_date).await.unwrap_or_default();
        let prior_closes: std::collections::HashMap<&str, Decimal> =
            prior_bars.iter().map(|b| (b.symbol.as_str(), b.close)).collect();

        // Fetched once for the whole universe so the ETP name-regex guard in
        // `universe-filter` has something to match against before the
        // filter stage runs, rather than only after per-symbol enrichment.
        let names = self.provider.reference_names().await.unwrap_or_else(|e| {
            warn!(error = %e, "reference ticker name lookup failed, names unknown for this run");
            std::collections::HashMap::new()
        });

        let snapshots = bars
            .into_iter()
            .map(|b| {
                let prev_close = prior_closes.get(b.symbol.as_str()).copied().unwrap_or(b.close);
                let symbol = b.symbol.to_uppercase();
                let name = names
                    .get(&symbol)
                    .cloned()
                    .map(Field::Known)
                    .unwrap_or(Field::Unknown);
                TickerSnapshot {
                    symbol,
                    last_price: b.close,
                    session_volume: b.volume,
                    prev_close,
                    session_high: b.high,
                    session_low: b.low,
                    vwap: b.vwap.into(),
                    open: b.open,
                    name,
                }
            })
            .collect();

        Ok((snapshots, Self::trading_date_close(trading_date)))
    }

    async fn enrich_symbol(&self, snapshot: &TickerSnapshot) -> Result<EnrichedSymbol, DiscoveryError> {
        let symbol = snapshot.symbol.as_str();
        let _permit = self
            .enrichment_semaphore
            .acquire()
            .await
            .expect("semaphore never closed");

        let (details, short_interest, options, catalyst, sentiment) = tokio::join!(
            self.provider.ticker_details(symbol),
            self.provider.short_interest(symbol),
            self.provider.options_summary(symbol),
            self.provider.catalyst(symbol),
            self.provider.sentiment(symbol),
        );

        let name_field: Field<String> = details
            .as_ref()
            .ok()
            .and_then(|d| d.name.clone())
            .into();

        let float_shares: Field<i64> = details
            .map(|d| d.weighted_shares_outstanding.or(d.share_class_shares_outstanding))
            .unwrap_or_else(|e| {
                warn!(symbol, error = %e, "ticker details unavailable, float unknown");
                None
            })
            .into();

        let short_interest = short_interest.unwrap_or_default();
        let options = options.unwrap_or_default();
        let catalyst = catalyst.unwrap_or_default();
        let sentiment = sentiment.unwrap_or_default();

        let avg_volume_20d = self.avg_volume_20d(symbol).await.unwrap_or(None).into();

        // Reuse the snapshot fetch_universe already produced (and the
        // filter stage already validated) rather than re-deriving one from
        // a fresh bar fetch - `prev_close` in particular is the actual prior
        // session's close computed there, not today's close repeated.
        let mut enriched_snapshot = snapshot.clone();
        if let Field::Known(name) = name_field {
            enriched_snapshot.name = Field::Known(name);
        }

        Ok(EnrichedSymbol {
            snapshot: enriched_snapshot,
            avg_volume_20d,
            float_shares,
            short_interest_pct: short_interest.short_interest_pct.into(),
            borrow_fee_pct: short_interest.borrow_fee_pct.into(),
            utilization_pct: short_interest.utilization_pct.into(),
            call_put_ratio: options.call_put_ratio.into(),
            iv_percentile: options.iv_percentile.into(),
            catalyst_strength: catalyst.strength.into(),
            catalyst_age_hours: catalyst.age_hours.into(),
            catalyst_source_verified: catalyst.source_verified.unwrap_or(false),
            sentiment_z_score: sentiment.z_score.into(),
            ema9: Field::Unknown,
            ema20: Field::Unknown,
            rsi14: Field::Unknown,
            atr_pct: Field::Unknown,
            intraday_relvol: Field::Unknown,
            float_rotation_pct: Field::Unknown,
            friction_index: Field::Unknown,
        })
    }

    async fn avg_volume_20d(&self, symbol: &str) -> Result<Option<i64>, DiscoveryError> {
        if let Some(cache) = &self.volume_cache {
            if let Some(fresh) = cache.get_fresh(symbol).await? {
                return Ok(Some(fresh));
            }
        }

        let fetched = self.provider.avg_volume_20d_upstream(symbol).await?;
        if let (Some(cache), Some(avg)) = (&self.volume_cache, fetched) {
            cache.upsert(symbol, avg).await?;
        }
        Ok(fetched)
    }
}

impl DiscoveryMarketDataClient {
    /// Trailing daily bar window for feature computation, oldest first.
    /// Not part of the `MarketDataClient` trait - the orchestrator depends
    /// on this crate directly for it, same as it does for construction.
    pub async fn recent_bars(
        &self,
        symbol: &str,
    ) -> Result<Vec<feature_calculator::Bar>, DiscoveryError> {
        let bars = self.provider.daily_bars(symbol, TRAILING_WINDOW_DAYS).await?;
        Ok(bars
            .into_iter()
            .map(|b| feature_calculator::Bar {
                open: b.open.to_f64().unwrap_or(0.0),
                high: b.high.to_f64().unwrap_or(0.0),
                low: b.low.to_f64().unwrap_or(0.0),
                close: b.close.to_f64().unwrap_or(0.0),
                volume: b.volume,
            })
            .collect())
    }
}

/// `now -> previous trading day`, re-exported for callers that only need
/// this crate.
pub fn previous_trading_day(now: DateTime<Utc>) -> NaiveDate {
    discovery_core::previous_trading_day(now)
}

#[allow(dead_code)]
fn stale_after() -> ChronoDuration {
    ChronoDuration::hours(24)
}
