use std::collections::HashMap;
use std::env;

use discovery_core::DiscoveryError;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::rate_limiter::RateLimiter;
use crate::retry::BackoffPolicy;

/// Hard cap on cursor-paginated reference pages followed per run. The name
/// lookup is a nice-to-have for the ETP regex guard, not a stage the run
/// can fail on, so an unbounded follow of `next_url` is not worth the risk.
const MAX_REFERENCE_PAGES: usize = 20;

/// Thin wire client for the upstream grouped-bars/per-symbol-details
/// provider. The vendor is abstracted behind `base_url`; any provider
/// exposing the two endpoints named in the design (daily grouped bars,
/// per-symbol details) can be wired in here.
pub struct ProviderClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    rate_limiter: RateLimiter,
    backoff: BackoffPolicy,
}

#[derive(Debug, Deserialize)]
pub struct RawBar {
    #[serde(rename = "T")]
    pub symbol: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v")]
    pub volume: i64,
    #[serde(rename = "vw")]
    pub vwap: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct GroupedDailyResponse {
    results: Option<Vec<RawBar>>,
}

#[derive(Debug, Deserialize)]
struct RawTickerRef {
    ticker: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickersReferenceResponse {
    results: Option<Vec<RawTickerRef>>,
    next_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawTickerDetails {
    pub name: Option<String>,
    pub share_class_shares_outstanding: Option<i64>,
    pub weighted_shares_outstanding: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawShortInterest {
    pub short_interest_pct: Option<f64>,
    pub borrow_fee_pct: Option<f64>,
    pub utilization_pct: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawOptionsSummary {
    pub call_put_ratio: Option<f64>,
    pub iv_percentile: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawCatalyst {
    pub strength: Option<f64>,
    pub age_hours: Option<f64>,
    pub source_verified: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSentiment {
    pub z_score: Option<f64>,
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT
}

impl ProviderClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let rate_limit = env::var("PROVIDER_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            rate_limiter: RateLimiter::new(rate_limit),
            backoff: BackoffPolicy::default(),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, DiscoveryError> {
        let url = format!("{}{}", self.base_url, path);
        self.backoff
            .retry(
                |e: &DiscoveryError| matches!(e, DiscoveryError::ProviderUnavailable(_)),
                || async {
                    self.rate_limiter.acquire().await;
                    let resp = self
                        .http
                        .get(&url)
                        .query(query)
                        .query(&[("apiKey", self.api_key.as_str())])
                        .send()
                        .await
                        .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))?;

                    let status = resp.status();
                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        // Graceful degradation: caller treats this field as
                        // unknown, not a hard failure.
                        return Err(DiscoveryError::ProviderUnavailable(format!(
                            "{path}: unauthorized ({status})"
                        )));
                    }
                    if is_retryable_status(status) {
                        return Err(DiscoveryError::ProviderUnavailable(format!(
                            "{path}: {status}"
                        )));
                    }
                    if !status.is_success() {
                        return Err(DiscoveryError::ProviderUnavailable(format!(
                            "{path}: {status}"
                        )));
                    }
                    Ok(resp)
                },
            )
            .await
    }

    /// Same retry/rate-limit/status handling as `get`, but against an
    /// already-absolute URL (used to follow a paginated `next_url` cursor,
    /// which the provider returns fully qualified).
    async fn get_absolute(&self, url: &str) -> Result<reqwest::Response, DiscoveryError> {
        self.backoff
            .retry(
                |e: &DiscoveryError| matches!(e, DiscoveryError::ProviderUnavailable(_)),
                || async {
                    self.rate_limiter.acquire().await;
                    let resp = self
                        .http
                        .get(url)
                        .query(&[("apiKey", self.api_key.as_str())])
                        .send()
                        .await
                        .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))?;

                    let status = resp.status();
                    if is_retryable_status(status) || !status.is_success() {
                        return Err(DiscoveryError::ProviderUnavailable(format!(
                            "{url}: {status}"
                        )));
                    }
                    Ok(resp)
                },
            )
            .await
    }

    /// Bulk symbol -> issuer/company name lookup, used to populate
    /// `TickerSnapshot::name` for the whole universe in a handful of calls
    /// rather than one call per symbol, so the ETP name-regex guard in
    /// `universe-filter` can run before enrichment instead of after it.
    /// Best-effort: a failed or partial fetch just leaves those symbols
    /// with an unknown name, never fails the run.
    pub async fn reference_names(&self) -> Result<HashMap<String, String>, DiscoveryError> {
        let mut names = HashMap::new();
        let mut next_url: Option<String> = None;

        for page in 0..MAX_REFERENCE_PAGES {
            let resp = if let Some(url) = &next_url {
                self.get_absolute(url).await?
            } else {
                self.get(
                    "/v3/reference/tickers",
                    &[
                        ("market", "stocks".to_string()),
                        ("active", "true".to_string()),
                        ("limit", "1000".to_string()),
                    ],
                )
                .await?
            };

            let parsed: TickersReferenceResponse = resp
                .json()
                .await
                .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))?;

            for entry in parsed.results.unwrap_or_default() {
                if let Some(name) = entry.name {
                    names.insert(entry.ticker.to_uppercase(), name);
                }
            }

            match parsed.next_url {
                Some(url) => next_url = Some(url),
                None => break,
            }

            if page == MAX_REFERENCE_PAGES - 1 {
                warn!(pages = MAX_REFERENCE_PAGES, "reference ticker pagination cap reached");
            }
        }

        Ok(names)
    }

    pub async fn grouped_daily(&self, trading_date: chrono::NaiveDate) -> Result<Vec<RawBar>, DiscoveryError> {
        let path = format!("/v2/aggs/grouped/locale/us/market/stocks/{trading_date}");
        let resp = self.get(&path, &[]).await?;
        let parsed: GroupedDailyResponse = resp
            .json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))?;
        Ok(parsed.results.unwrap_or_default())
    }

    pub async fn ticker_details(&self, symbol: &str) -> Result<RawTickerDetails, DiscoveryError> {
        let path = format!("/v3/reference/tickers/{symbol}");
        let resp = self.get(&path, &[]).await?;
        resp.json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))
    }

    pub async fn short_interest(&self, symbol: &str) -> Result<RawShortInterest, DiscoveryError> {
        let path = format!("/v1/short-interest/{symbol}");
        let resp = self.get(&path, &[]).await?;
        resp.json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))
    }

    pub async fn options_summary(&self, symbol: &str) -> Result<RawOptionsSummary, DiscoveryError> {
        let path = format!("/v3/snapshot/options/{symbol}/summary");
        let resp = self.get(&path, &[]).await?;
        resp.json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))
    }

    pub async fn catalyst(&self, symbol: &str) -> Result<RawCatalyst, DiscoveryError> {
        let path = format!("/v2/catalysts/{symbol}");
        let resp = self.get(&path, &[]).await?;
        resp.json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))
    }

    pub async fn sentiment(&self, symbol: &str) -> Result<RawSentiment, DiscoveryError> {
        let path = format!("/v2/sentiment/{symbol}");
        let resp = self.get(&path, &[]).await?;
        resp.json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))
    }

    pub async fn daily_bars(&self, symbol: &str, days_back: i64) -> Result<Vec<RawBar>, DiscoveryError> {
        let path = format!("/v2/aggs/ticker/{symbol}/range/1/day/{days_back}");
        let resp = self.get(&path, &[]).await?;
        let parsed: GroupedDailyResponse = resp
            .json()
            .await
            .map_err(|e| DiscoveryError::ProviderUnavailable(e.to_string()))?;
        Ok(parsed.results.unwrap_or_default())
    }

    pub async fn avg_volume_20d_upstream(&self, symbol: &str) -> Result<Option<i64>, DiscoveryError> {
        let bars = self.daily_bars(symbol, 20).await?;
        if bars.is_empty() {
            return Ok(None);
        }
        let total: i64 = bars.iter().map(|b| b.volume).sum();
        Ok(Some(total / bars.len() as i64))
    }
}
