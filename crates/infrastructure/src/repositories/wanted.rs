//! Wanted repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelvault_core::domain::repositories::{WantedFilter, WantedRepository};
use reelvault_core::error::Result;
use reelvault_core::models::WantedMovie;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const WANTED_COLUMNS: &str = "id, movie_id, status, priority, search_attempts,
    max_search_attempts, last_search_time, next_search_time, search_in_flight,
    search_failures, created_at, updated_at";

pub(super) fn wanted_from_row(row: &PgRow) -> Result<WantedMovie> {
    Ok(WantedMovie {
        id: row.try_get("id")?,
        movie_id: row.try_get("movie_id")?,
        status: enum_from_text(&row.try_get::<String, _>("status")?)?,
        priority: row.try_get("priority")?,
        search_attempts: row.try_get("search_attempts")?,
        max_search_attempts: row.try_get("max_search_attempts")?,
        last_search_time: row.try_get("last_search_time")?,
        next_search_time: row.try_get("next_search_time")?,
        search_in_flight: row.try_get("search_in_flight")?,
        search_failures: from_json(row.try_get("search_failures")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) const WANTED_UPSERT: &str =
    "INSERT INTO wanted_movies (id, movie_id, status, priority, search_attempts,
         max_search_attempts, last_search_time, next_search_time, search_in_flight,
         search_failures, created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
     ON CONFLICT (movie_id) DO UPDATE SET
         status = EXCLUDED.status,
         priority = EXCLUDED.priority,
         search_attempts = EXCLUDED.search_attempts,
         max_search_attempts = EXCLUDED.max_search_attempts,
         last_search_time = EXCLUDED.last_search_time,
         next_search_time = EXCLUDED.next_search_time,
         search_in_flight = EXCLUDED.search_in_flight,
         search_failures = EXCLUDED.search_failures,
         updated_at = EXCLUDED.updated_at";

pub(super) fn bind_wanted<'q>(
    query: &'q str,
    wanted: &WantedMovie,
) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
    Ok(sqlx::query(query)
        .bind(wanted.id)
        .bind(wanted.movie_id)
        .bind(enum_to_text(&wanted.status))
        .bind(wanted.priority)
        .bind(wanted.search_attempts)
        .bind(wanted.max_search_attempts)
        .bind(wanted.last_search_time)
        .bind(wanted.next_search_time)
        .bind(wanted.search_in_flight)
        .bind(to_json(&wanted.search_failures)?)
        .bind(wanted.created_at)
        .bind(wanted.updated_at))
}

#[async_trait]
impl WantedRepository for PostgresStore {
    async fn find_by_movie_id(&self, movie_id: Uuid) -> Result<Option<WantedMovie>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM wanted_movies WHERE movie_id = $1",
            WANTED_COLUMNS
        ))
        .bind(movie_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(wanted_from_row).transpose()
    }

    async fn list(&self, filter: &WantedFilter) -> Result<Vec<WantedMovie>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wanted_movies
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::int IS NULL OR priority = $2)
             ORDER BY priority DESC, next_search_time ASC NULLS FIRST",
            WANTED_COLUMNS
        ))
        .bind(filter.status.as_ref().map(enum_to_text))
        .bind(filter.priority)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(wanted_from_row).collect()
    }

    async fn find_search_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WantedMovie>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM wanted_movies
             WHERE NOT search_in_flight
               AND search_attempts < max_search_attempts
               AND (next_search_time IS NULL OR next_search_time <= $1)
             ORDER BY priority DESC, next_search_time ASC NULLS FIRST
             LIMIT $2",
            WANTED_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(wanted_from_row).collect()
    }

    async fn upsert(&self, wanted: &WantedMovie) -> Result<()> {
        bind_wanted(WANTED_UPSERT, wanted)?
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn update(&self, wanted: &WantedMovie) -> Result<()> {
        self.upsert(wanted).await
    }

    async fn delete_by_movie_id(&self, movie_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM wanted_movies WHERE movie_id = $1")
            .bind(movie_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
