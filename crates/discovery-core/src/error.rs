use thiserror::Error;

/// One variant per error kind named in the discovery pipeline design.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("stale data: {0}")]
    StaleData(String),

    #[error("partial enrichment for {symbol}: {reason}")]
    PartialEnrichment { symbol: String, reason: String },

    #[error("score underconfident for {symbol}: confidence {confidence:.2} < 0.5")]
    ScoreUnderconfident { symbol: String, confidence: f64 },

    #[error("run timed out after {0:?}")]
    RunTimeout(std::time::Duration),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("queue busy")]
    QueueBusy,

    #[error("unknown run id: {0}")]
    UnknownRun(uuid::Uuid),
}

impl DiscoveryError {
    /// Machine-readable code surfaced in the `{code, message, run_id?}`
    /// HTTP error payload.
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::InvalidConfig(_) => "invalid_config",
            DiscoveryError::ProviderUnavailable(_) => "provider_unavailable",
            DiscoveryError::StaleData(_) => "stale_data",
            DiscoveryError::PartialEnrichment { .. } => "partial_enrichment",
            DiscoveryError::ScoreUnderconfident { .. } => "score_underconfident",
            DiscoveryError::RunTimeout(_) => "run_timeout",
            DiscoveryError::CacheUnavailable(_) => "cache_unavailable",
            DiscoveryError::QueueBusy => "queue_busy",
            DiscoveryError::UnknownRun(_) => "unknown_run",
        }
    }
}
