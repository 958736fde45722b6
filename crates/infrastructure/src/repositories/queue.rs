//! Queue repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::QueueRepository;
use reelvault_core::error::Result;
use reelvault_core::models::QueueItem;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const QUEUE_COLUMNS: &str = "id, movie_id, release_id, title, download_client_id, download_id,
    protocol, size_bytes, size_left, status, status_messages, output_path,
    import_attempts, added_at, updated_at";

/// Statuses that keep an item visible to the poller.
const TERMINAL_STATUSES: &str = "('imported', 'failed', 'ignored')";

pub(super) fn queue_item_from_row(row: &PgRow) -> Result<QueueItem> {
    Ok(QueueItem {
        id: row.try_get("id")?,
        movie_id: row.try_get("movie_id")?,
        release_id: row.try_get("release_id")?,
        title: row.try_get("title")?,
        download_client_id: row.try_get("download_client_id")?,
        download_id: row.try_get("download_id")?,
        protocol: enum_from_text(&row.try_get::<String, _>("protocol")?)?,
        size_bytes: row.try_get("size_bytes")?,
        size_left: row.try_get("size_left")?,
        status: enum_from_text(&row.try_get::<String, _>("status")?)?,
        status_messages: from_json(row.try_get("status_messages")?)?,
        output_path: row.try_get("output_path")?,
        import_attempts: row.try_get("import_attempts")?,
        added_at: row.try_get("added_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) const QUEUE_UPSERT: &str =
    "INSERT INTO queue_items (id, movie_id, release_id, title, download_client_id,
         download_id, protocol, size_bytes, size_left, status, status_messages,
         output_path, import_attempts, added_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
     ON CONFLICT (download_client_id, download_id) DO UPDATE SET
         release_id = EXCLUDED.release_id,
         size_bytes = EXCLUDED.size_bytes,
         size_left = EXCLUDED.size_left,
         status = EXCLUDED.status,
         status_messages = EXCLUDED.status_messages,
         output_path = EXCLUDED.output_path,
         import_attempts = EXCLUDED.import_attempts,
         updated_at = EXCLUDED.updated_at";

pub(super) fn bind_queue_item<'q>(
    query: &'q str,
    item: &QueueItem,
) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
    Ok(sqlx::query(query)
        .bind(item.id)
        .bind(item.movie_id)
        .bind(item.release_id)
        .bind(item.title.clone())
        .bind(item.download_client_id)
        .bind(item.download_id.clone())
        .bind(enum_to_text(&item.protocol))
        .bind(item.size_bytes)
        .bind(item.size_left)
        .bind(enum_to_text(&item.status))
        .bind(to_json(&item.status_messages)?)
        .bind(item.output_path.clone())
        .bind(item.import_attempts)
        .bind(item.added_at)
        .bind(item.updated_at))
}

#[async_trait]
impl QueueRepository for PostgresStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM queue_items WHERE id = $1",
            QUEUE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(queue_item_from_row).transpose()
    }

    async fn find_by_download_id(
        &self,
        download_client_id: i32,
        download_id: &str,
    ) -> Result<Option<QueueItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM queue_items WHERE download_client_id = $1 AND download_id = $2",
            QUEUE_COLUMNS
        ))
        .bind(download_client_id)
        .bind(download_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(queue_item_from_row).transpose()
    }

    async fn find_active(&self) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM queue_items WHERE status NOT IN {} ORDER BY added_at",
            QUEUE_COLUMNS, TERMINAL_STATUSES
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(queue_item_from_row).collect()
    }

    async fn find_by_client(&self, download_client_id: i32) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM queue_items WHERE download_client_id = $1 ORDER BY added_at",
            QUEUE_COLUMNS
        ))
        .bind(download_client_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(queue_item_from_row).collect()
    }

    async fn list(&self) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM queue_items ORDER BY added_at",
            QUEUE_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(queue_item_from_row).collect()
    }

    async fn update(&self, item: &QueueItem) -> Result<()> {
        bind_queue_item(QUEUE_UPSERT, item)?
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM queue_items WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
