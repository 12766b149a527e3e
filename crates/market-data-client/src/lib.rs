pub mod client;
pub mod provider;
pub mod rate_limiter;
pub mod retry;
pub mod volume_cache;

pub use client::{previous_trading_day, DiscoveryMarketDataClient};
pub use provider::ProviderClient;
pub use rate_limiter::RateLimiter;
pub use volume_cache::VolumeAverageCache;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn previous_trading_day_skips_weekend() {
        // Saturday 12:00 UTC -> preceding Friday.
        let saturday = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        assert_eq!(previous_trading_day(saturday), expected);
    }

    #[test]
    fn previous_trading_day_from_sunday_is_friday() {
        let sunday = Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap();
        let friday = chrono::NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        assert_eq!(previous_trading_day(sunday), friday);
    }

    #[tokio::test]
    async fn rate_limiter_allows_burst_under_limit() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            limiter.acquire().await;
        }
    }
}
