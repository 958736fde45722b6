//! Calendar cache repository

use super::PostgresStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelvault_core::domain::repositories::{CalendarCacheRepository, CalendarCacheRow};
use reelvault_core::error::Result;
use sqlx::Row;

#[async_trait]
impl CalendarCacheRepository for PostgresStore {
    async fn get_fresh(
        &self,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CalendarCacheRow>> {
        let row = sqlx::query(
            "SELECT cache_key, payload, expires_at FROM calendar_cache
             WHERE cache_key = $1 AND expires_at > $2",
        )
        .bind(cache_key)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(row
            .map(|row| -> Result<CalendarCacheRow> {
                Ok(CalendarCacheRow {
                    cache_key: row.try_get("cache_key")?,
                    payload: row.try_get("payload")?,
                    expires_at: row.try_get("expires_at")?,
                })
            })
            .transpose()?)
    }

    async fn upsert(&self, row: &CalendarCacheRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO calendar_cache (cache_key, payload, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (cache_key) DO UPDATE SET
                 payload = EXCLUDED.payload,
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(&row.cache_key)
        .bind(&row.payload)
        .bind(row.expires_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM calendar_cache")
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
