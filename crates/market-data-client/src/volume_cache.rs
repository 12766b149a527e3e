use chrono::{DateTime, Utc};
use discovery_core::DiscoveryError;
use sqlx::PgPool;

/// `volume_averages` table accessor. Read-mostly; writes are upserts keyed
/// by symbol, last-writer-wins.
#[derive(Clone)]
pub struct VolumeAverageCache {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct VolumeRow {
    avg_volume_20d: i64,
    last_updated: DateTime<Utc>,
}

const STALE_AFTER_HOURS: i64 = 24;

impl VolumeAverageCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns `Some(avg)` only if a fresh (< 24h) row exists.
    pub async fn get_fresh(&self, symbol: &str) -> Result<Option<i64>, DiscoveryError> {
        let row = sqlx::query_as::<_, VolumeRow>(
            "SELECT avg_volume_20d, last_updated FROM volume_averages WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;

        Ok(row.and_then(|r| {
            let age = Utc::now() - r.last_updated;
            if age.num_hours() < STALE_AFTER_HOURS {
                Some(r.avg_volume_20d)
            } else {
                None
            }
        }))
    }

    pub async fn upsert(&self, symbol: &str, avg_volume_20d: i64) -> Result<(), DiscoveryError> {
        sqlx::query(
            r#"
            INSERT INTO volume_averages (symbol, avg_volume_20d, last_updated)
            VALUES ($1, $2, now())
            ON CONFLICT (symbol)
            DO UPDATE SET avg_volume_20d = EXCLUDED.avg_volume_20d, last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(symbol)
        .bind(avg_volume_20d)
        .execute(&self.pool)
        .await
        .map_err(|e| DiscoveryError::CacheUnavailable(e.to_string()))?;
        Ok(())
    }
}
