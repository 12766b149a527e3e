use std::sync::Arc;

use async_trait::async_trait;
use discovery_core::{Cache, Candidate, DiscoveryError};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const KEY_PREFIX: &str = "amc:discovery:v2:contenders.latest";
const TTL_SECS: usize = 600;

/// Redis-backed implementation of `discovery_core::Cache`. Grounded on
/// this corpus's `RedisPool` wrapper: an `Arc<ConnectionManager>` cloned
/// cheaply per call, `SET key val EX ttl` / `GET` for JSON blobs.
///
/// Publish writes the strategy-specific key, and - only for the default
/// strategy - the unsuffixed fallback key readers fall back to when a
/// specific strategy key is absent. Each write is a single atomic `SET`;
/// there's never a partially-written candidate list.
pub struct RedisCache {
    manager: Arc<ConnectionManager>,
    default_strategy_id: String,
}

impl RedisCache {
    pub async fn connect(url: &str, default_strategy_id: impl Into<String>) -> Result<Self, DiscoveryError> {
        let client = redis::Client::open(url)
            .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;
        Ok(Self {
            manager: Arc::new(manager),
            default_strategy_id: default_strategy_id.into(),
        })
    }

    fn key_for(strategy_id: &str) -> String {
        format!("{KEY_PREFIX}:{strategy_id}")
    }

    async fn set_json(&self, key: &str, value: &[Candidate]) -> Result<(), DiscoveryError> {
        let mut con = self.manager.as_ref().clone();
        let payload = serde_json::to_string(value)
            .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;

        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("EX")
            .arg(TTL_SECS)
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<Vec<Candidate>>, DiscoveryError> {
        let mut con = self.manager.as_ref().clone();
        let raw: Option<String> = con
            .get(key)
            .await
            .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;

        match raw {
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn publish(&self, strategy_id: &str, candidates: &[Candidate]) -> Result<(), DiscoveryError> {
        self.set_json(&Self::key_for(strategy_id), candidates).await?;
        if strategy_id == self.default_strategy_id {
            self.set_json(KEY_PREFIX, candidates).await?;
        }
        Ok(())
    }

    async fn read(&self, strategy_id: &str) -> Result<Option<Vec<Candidate>>, DiscoveryError> {
        if let Some(found) = self.get_json(&Self::key_for(strategy_id)).await? {
            return Ok(Some(found));
        }
        self.get_json(KEY_PREFIX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_for_matches_the_documented_keyspace() {
        assert_eq!(
            RedisCache::key_for("default"),
            "amc:discovery:v2:contenders.latest:default"
        );
        assert_eq!(KEY_PREFIX, "amc:discovery:v2:contenders.latest");
    }
}
