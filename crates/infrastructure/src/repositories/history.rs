//! History repository (append-only)

use super::{enum_from_text, enum_to_text, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::HistoryRepository;
use reelvault_core::error::Result;
use reelvault_core::models::History;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const HISTORY_COLUMNS: &str =
    "id, event_type, date, movie_id, quality, source_title, download_id, payload,
     successful, message";

pub(super) fn history_from_row(row: &PgRow) -> Result<History> {
    Ok(History {
        id: row.try_get("id")?,
        event_type: enum_from_text(&row.try_get::<String, _>("event_type")?)?,
        date: row.try_get("date")?,
        movie_id: row.try_get("movie_id")?,
        quality: row
            .try_get::<Option<String>, _>("quality")?
            .as_deref()
            .map(enum_from_text)
            .transpose()?,
        source_title: row.try_get("source_title")?,
        download_id: row.try_get("download_id")?,
        payload: row.try_get("payload")?,
        successful: row.try_get("successful")?,
        message: row.try_get("message")?,
    })
}

pub(super) const HISTORY_INSERT: &str =
    "INSERT INTO history (id, event_type, date, movie_id, quality, source_title,
         download_id, payload, successful, message)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

pub(super) fn bind_history<'q>(
    query: &'q str,
    event: &History,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(query)
        .bind(event.id)
        .bind(enum_to_text(&event.event_type))
        .bind(event.date)
        .bind(event.movie_id)
        .bind(event.quality.as_ref().map(enum_to_text))
        .bind(event.source_title.clone())
        .bind(event.download_id.clone())
        .bind(event.payload.clone())
        .bind(event.successful)
        .bind(event.message.clone())
}

#[async_trait]
impl HistoryRepository for PostgresStore {
    async fn append(&self, event: &History) -> Result<()> {
        bind_history(HISTORY_INSERT, event)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn list_for_movie(&self, movie_id: Uuid) -> Result<Vec<History>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM history WHERE movie_id = $1 ORDER BY date DESC",
            HISTORY_COLUMNS
        ))
        .bind(movie_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<History>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM history ORDER BY date DESC LIMIT $1",
            HISTORY_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(history_from_row).collect()
    }
}
