//! Blocklist repository

use super::{enum_from_text, enum_to_text, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::BlocklistRepository;
use reelvault_core::error::Result;
use reelvault_core::models::BlocklistEntry;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

fn entry_from_row(row: &PgRow) -> Result<BlocklistEntry> {
    Ok(BlocklistEntry {
        id: row.try_get("id")?,
        movie_id: row.try_get("movie_id")?,
        source_title: row.try_get("source_title")?,
        guid: row.try_get("guid")?,
        indexer_id: row.try_get("indexer_id")?,
        protocol: enum_from_text(&row.try_get::<String, _>("protocol")?)?,
        date: row.try_get("date")?,
        reason: row.try_get("reason")?,
    })
}

#[async_trait]
impl BlocklistRepository for PostgresStore {
    async fn insert(&self, entry: &BlocklistEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO blocklist (id, movie_id, source_title, guid, indexer_id,
                 protocol, date, reason)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.movie_id)
        .bind(&entry.source_title)
        .bind(&entry.guid)
        .bind(entry.indexer_id)
        .bind(enum_to_text(&entry.protocol))
        .bind(entry.date)
        .bind(&entry.reason)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn contains_guid(&self, guid: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM blocklist WHERE guid = $1) AS blocked")
            .bind(guid)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("blocked")?)
    }

    async fn list(&self) -> Result<Vec<BlocklistEntry>> {
        let rows = sqlx::query(
            "SELECT id, movie_id, source_title, guid, indexer_id, protocol, date, reason
             FROM blocklist ORDER BY date DESC",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM blocklist WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
