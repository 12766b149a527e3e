use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DiscoveryError;
use crate::types::{Candidate, EnrichedSymbol, TickerSnapshot};

/// Upstream market data provider. One implementation wraps the real HTTP
/// client; tests substitute a fixture-backed fake.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn fetch_universe(
        &self,
        trading_date: NaiveDate,
    ) -> Result<(Vec<TickerSnapshot>, DateTime<Utc>), DiscoveryError>;

    /// Enriches a symbol already produced (and filtered) by `fetch_universe`.
    /// Takes the snapshot by reference rather than re-deriving one from a
    /// fresh bar fetch, so the price/volume fields a candidate is ultimately
    /// scored against are always the same ones the universe and filter
    /// stages already validated.
    async fn enrich_symbol(&self, snapshot: &TickerSnapshot) -> Result<EnrichedSymbol, DiscoveryError>;

    async fn avg_volume_20d(&self, symbol: &str) -> Result<Option<i64>, DiscoveryError>;
}

/// Published-candidate cache, keyed by strategy.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn publish(
        &self,
        strategy_id: &str,
        candidates: &[Candidate],
    ) -> Result<(), DiscoveryError>;

    async fn read(&self, strategy_id: &str) -> Result<Option<Vec<Candidate>>, DiscoveryError>;
}

/// Market open/close awareness, injected so tests can simulate weekends
/// and holidays without a wall clock.
pub trait MarketCalendar: Send + Sync {
    fn is_open(&self, ts: DateTime<Utc>) -> bool;
    fn last_close(&self, ts: DateTime<Utc>) -> DateTime<Utc>;
}

/// Injected wall clock, so trading-day math is deterministic in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `now() -> previous_trading_day` rule: walk back from `now`, skip
/// Saturday/Sunday, return the date only.
pub fn previous_trading_day(now: DateTime<Utc>) -> NaiveDate {
    use chrono::Datelike;
    use chrono::Weekday;

    let mut date = now.date_naive();
    loop {
        date = date.pred_opt().expect("date arithmetic in range");
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => continue,
            _ => return date,
        }
    }
}
