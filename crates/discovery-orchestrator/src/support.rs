use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::US::Eastern;
use discovery_core::{DiscoveryError, Field, MarketCalendar, Regime, TickerSnapshot};
use feature_calculator::Bar;
use market_data_client::DiscoveryMarketDataClient;
use rust_decimal::prelude::ToPrimitive;

const SESSION_OPEN_MINUTES: u32 = 9 * 60 + 30;
const SESSION_CLOSE_MINUTES: u32 = 16 * 60;

/// Neutral VIX stand-in. This pipeline has no wired VIX feed (§4.1 only
/// names grouped bars and per-symbol details); holding it at the midpoint
/// of the regime bands means regime classification is driven by SPY ATR%
/// alone rather than silently always landing on `normal`.
const NEUTRAL_VIX: f64 = 18.0;

/// Separate from `MarketDataClient` so discovery-core stays free of a
/// dependency on `feature_calculator::Bar`. Both traits are usually
/// implemented by the same concrete client.
#[async_trait]
pub trait BarsSource: Send + Sync {
    async fn recent_bars(&self, symbol: &str) -> Result<Vec<Bar>, DiscoveryError>;
}

#[async_trait]
impl BarsSource for DiscoveryMarketDataClient {
    async fn recent_bars(&self, symbol: &str) -> Result<Vec<Bar>, DiscoveryError> {
        DiscoveryMarketDataClient::recent_bars(self, symbol).await
    }
}

/// Coarse pre-enrichment activity proxy used only to bound the universe
/// to `universe_cap` before the expensive per-symbol enrichment fan-out -
/// `avg_volume_20d` isn't known yet at this stage, so true relvol isn't
/// available.
pub fn coarse_activity(s: &TickerSnapshot) -> f64 {
    let dollar_volume = s.session_volume as f64 * s.last_price.to_f64().unwrap_or(0.0);
    let move_pct = if !s.prev_close.is_zero() {
        ((s.last_price - s.prev_close) / s.prev_close).to_f64().unwrap_or(0.0).abs()
    } else {
        0.0
    };
    dollar_volume * (1.0 + move_pct)
}

/// Exchange-local (US/Eastern) hour from a UTC timestamp, correct across
/// the EST/EDT transition via the IANA tz database.
pub fn exchange_local_hour(now: DateTime<Utc>) -> u32 {
    now.with_timezone(&Eastern).hour()
}

/// Regular-session `MarketCalendar`: 9:30-16:00 America/New_York, Monday
/// through Friday. Carries no holiday calendar - a holiday reads as
/// "closed" only insofar as the provider's freshness timestamp will lag
/// behind `last_close`, which is what actually drives the staleness check.
pub struct ExchangeCalendar;

impl ExchangeCalendar {
    fn et_minutes_of_day(ts: DateTime<Utc>) -> (Weekday, u32) {
        let et = ts.with_timezone(&Eastern);
        (et.weekday(), et.hour() * 60 + et.minute())
    }
}

impl MarketCalendar for ExchangeCalendar {
    fn is_open(&self, ts: DateTime<Utc>) -> bool {
        let (weekday, minutes) = Self::et_minutes_of_day(ts);
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            return false;
        }
        (SESSION_OPEN_MINUTES..SESSION_CLOSE_MINUTES).contains(&minutes)
    }

    /// Most recent prior 16:00 ET close strictly before (or at) `ts`,
    /// skipping weekends.
    fn last_close(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let et = ts.with_timezone(&Eastern);
        let (weekday, minutes) = (et.weekday(), et.hour() * 60 + et.minute());

        let mut date = et.date_naive();
        let closed_already_today = minutes >= SESSION_CLOSE_MINUTES && !matches!(weekday, Weekday::Sat | Weekday::Sun);
        if !closed_already_today {
            date = date.pred_opt().expect("date arithmetic in range");
        }
        while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date = date.pred_opt().expect("date arithmetic in range");
        }

        let naive_close = date.and_hms_opt(16, 0, 0).expect("valid time");
        Eastern
            .from_local_datetime(&naive_close)
            .earliest()
            .unwrap_or_else(|| Eastern.from_utc_datetime(&naive_close))
            .with_timezone(&Utc)
    }
}

/// Classifies regime from the SPY trailing bar window. Falls back to
/// `Normal` when there isn't enough history to compute a 14-period ATR.
pub fn determine_regime(spy_bars: &[Bar]) -> Regime {
    let atr_pct = atr_pct_at(spy_bars, spy_bars.len());
    match atr_pct {
        Some(pct) => scoring_engine::classify_regime(pct, NEUTRAL_VIX),
        None => Regime::Normal,
    }
}

/// ATR% computed over `bars[..upto]`, i.e. as of that many trailing bars.
fn atr_pct_at(bars: &[Bar], upto: usize) -> Option<f64> {
    let window = bars.get(..upto)?;
    let highs: Vec<f64> = window.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = window.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
    let last_close = *closes.last()?;
    if last_close <= 0.0 {
        return None;
    }
    feature_calculator::atr(&highs, &lows, &closes, 14).map(|atr| (atr / last_close) * 100.0)
}

/// Mean ATR% over the last 10 trailing-window positions, feeding the
/// volume-momentum sub-score's "ATR expansion" component.
pub fn atr_pct_10d_mean(bars: &[Bar]) -> Field<f64> {
    if bars.len() < 15 {
        return Field::Unknown;
    }
    let start = bars.len().saturating_sub(10);
    let samples: Vec<f64> = (start..bars.len())
        .filter_map(|i| atr_pct_at(bars, i + 1))
        .collect();
    if samples.is_empty() {
        Field::Unknown
    } else {
        Field::Known(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}
