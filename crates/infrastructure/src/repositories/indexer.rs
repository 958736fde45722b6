//! Indexer repository

use super::{enum_from_text, enum_to_text, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::IndexerRepository;
use reelvault_core::error::Result;
use reelvault_core::models::Indexer;
use sqlx::postgres::PgRow;
use sqlx::Row;

const INDEXER_COLUMNS: &str =
    "id, name, implementation, settings, protocol, enable_search, enable_rss, priority,
     created_at, updated_at";

fn indexer_from_row(row: &PgRow) -> Result<Indexer> {
    Ok(Indexer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        implementation: row.try_get("implementation")?,
        settings: row.try_get("settings")?,
        protocol: enum_from_text(&row.try_get::<String, _>("protocol")?)?,
        enable_search: row.try_get("enable_search")?,
        enable_rss: row.try_get("enable_rss")?,
        priority: row.try_get("priority")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl IndexerRepository for PostgresStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<Indexer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM indexers WHERE id = $1",
            INDEXER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(indexer_from_row).transpose()
    }

    async fn find_enabled(&self) -> Result<Vec<Indexer>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM indexers WHERE enable_search OR enable_rss
             ORDER BY priority, name",
            INDEXER_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(indexer_from_row).collect()
    }

    async fn list(&self) -> Result<Vec<Indexer>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM indexers ORDER BY name",
            INDEXER_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(indexer_from_row).collect()
    }

    async fn create(&self, indexer: &Indexer) -> Result<i32> {
        indexer.validate()?;
        let row = sqlx::query(
            "INSERT INTO indexers (name, implementation, settings, protocol,
                 enable_search, enable_rss, priority, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(&indexer.name)
        .bind(&indexer.implementation)
        .bind(&indexer.settings)
        .bind(enum_to_text(&indexer.protocol))
        .bind(indexer.enable_search)
        .bind(indexer.enable_rss)
        .bind(indexer.priority)
        .bind(indexer.created_at)
        .bind(indexer.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, indexer: &Indexer) -> Result<()> {
        indexer.validate()?;
        sqlx::query(
            "UPDATE indexers SET name = $2, implementation = $3, settings = $4,
                 protocol = $5, enable_search = $6, enable_rss = $7, priority = $8,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(indexer.id)
        .bind(&indexer.name)
        .bind(&indexer.implementation)
        .bind(&indexer.settings)
        .bind(enum_to_text(&indexer.protocol))
        .bind(indexer.enable_search)
        .bind(indexer.enable_rss)
        .bind(indexer.priority)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM indexers WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
