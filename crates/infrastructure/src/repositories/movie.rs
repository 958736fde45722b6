//! Movie repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelvault_core::domain::repositories::{MovieFilter, MovieRepository};
use reelvault_core::error::Result;
use reelvault_core::models::Movie;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const MOVIE_COLUMNS: &str = "id, tmdb_id, imdb_id, title, title_slug, original_title, year,
    runtime_minutes, status, monitored, quality_profile_id, minimum_availability,
    in_cinemas, physical_release, digital_release, root_folder, path, tags,
    has_file, movie_file_id, size_on_disk, created_at, updated_at";

pub(super) fn movie_from_row(row: &PgRow) -> Result<Movie> {
    Ok(Movie {
        id: row.try_get("id")?,
        tmdb_id: row.try_get("tmdb_id")?,
        imdb_id: row.try_get("imdb_id")?,
        title: row.try_get("title")?,
        title_slug: row.try_get("title_slug")?,
        original_title: row.try_get("original_title")?,
        year: row.try_get("year")?,
        runtime_minutes: row.try_get("runtime_minutes")?,
        status: enum_from_text(&row.try_get::<String, _>("status")?)?,
        monitored: row.try_get("monitored")?,
        quality_profile_id: row.try_get("quality_profile_id")?,
        minimum_availability: enum_from_text(&row.try_get::<String, _>("minimum_availability")?)?,
        in_cinemas: row.try_get("in_cinemas")?,
        physical_release: row.try_get("physical_release")?,
        digital_release: row.try_get("digital_release")?,
        root_folder: row.try_get("root_folder")?,
        path: row.try_get("path")?,
        tags: from_json(row.try_get("tags")?)?,
        has_file: row.try_get("has_file")?,
        movie_file_id: row.try_get("movie_file_id")?,
        size_on_disk: row.try_get("size_on_disk")?,
        // Projection recomputed by the service layer on read.
        is_available: false,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MovieRepository for PostgresStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM movies WHERE id = $1",
            MOVIE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(movie_from_row).transpose()
    }

    async fn find_by_tmdb_id(&self, tmdb_id: i32) -> Result<Option<Movie>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM movies WHERE tmdb_id = $1",
            MOVIE_COLUMNS
        ))
        .bind(tmdb_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(movie_from_row).transpose()
    }

    async fn find_monitored(&self) -> Result<Vec<Movie>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM movies WHERE monitored ORDER BY title",
            MOVIE_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(movie_from_row).collect()
    }

    async fn list(&self, filter: &MovieFilter) -> Result<Vec<Movie>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM movies
             WHERE ($1::boolean IS NULL OR monitored = $1)
               AND ($2::boolean IS NULL OR has_file = $2)
               AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%')
             ORDER BY title",
            MOVIE_COLUMNS
        ))
        .bind(filter.monitored)
        .bind(filter.has_file)
        .bind(filter.title_contains.as_deref())
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(movie_from_row).collect()
    }

    async fn find_in_release_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movie>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM movies
             WHERE (in_cinemas BETWEEN $1 AND $2)
                OR (physical_release BETWEEN $1 AND $2)
                OR (digital_release BETWEEN $1 AND $2)",
            MOVIE_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(movie_from_row).collect()
    }

    async fn create(&self, movie: &Movie) -> Result<()> {
        sqlx::query(
            "INSERT INTO movies (id, tmdb_id, imdb_id, title, title_slug, original_title,
                 year, runtime_minutes, status, monitored, quality_profile_id,
                 minimum_availability, in_cinemas, physical_release, digital_release,
                 root_folder, path, tags, has_file, movie_file_id, size_on_disk,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                 $16, $17, $18, $19, $20, $21, $22, $23)",
        )
        .bind(movie.id)
        .bind(movie.tmdb_id)
        .bind(&movie.imdb_id)
        .bind(&movie.title)
        .bind(&movie.title_slug)
        .bind(&movie.original_title)
        .bind(movie.year)
        .bind(movie.runtime_minutes)
        .bind(enum_to_text(&movie.status))
        .bind(movie.monitored)
        .bind(movie.quality_profile_id)
        .bind(enum_to_text(&movie.minimum_availability))
        .bind(movie.in_cinemas)
        .bind(movie.physical_release)
        .bind(movie.digital_release)
        .bind(&movie.root_folder)
        .bind(&movie.path)
        .bind(to_json(&movie.tags)?)
        .bind(movie.has_file)
        .bind(movie.movie_file_id)
        .bind(movie.size_on_disk)
        .bind(movie.created_at)
        .bind(movie.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update(&self, movie: &Movie) -> Result<()> {
        sqlx::query(
            "UPDATE movies SET imdb_id = $2, title = $3, title_slug = $4,
                 original_title = $5, year = $6, runtime_minutes = $7, status = $8,
                 monitored = $9, quality_profile_id = $10, minimum_availability = $11,
                 in_cinemas = $12, physical_release = $13, digital_release = $14,
                 root_folder = $15, path = $16, tags = $17, has_file = $18,
                 movie_file_id = $19, size_on_disk = $20, updated_at = $21
             WHERE id = $1",
        )
        .bind(movie.id)
        .bind(&movie.imdb_id)
        .bind(&movie.title)
        .bind(&movie.title_slug)
        .bind(&movie.original_title)
        .bind(movie.year)
        .bind(movie.runtime_minutes)
        .bind(enum_to_text(&movie.status))
        .bind(movie.monitored)
        .bind(movie.quality_profile_id)
        .bind(enum_to_text(&movie.minimum_availability))
        .bind(movie.in_cinemas)
        .bind(movie.physical_release)
        .bind(movie.digital_release)
        .bind(&movie.root_folder)
        .bind(&movie.path)
        .bind(to_json(&movie.tags)?)
        .bind(movie.has_file)
        .bind(movie.movie_file_id)
        .bind(movie.size_on_disk)
        .bind(movie.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        // Files, wanted and queue rows cascade; history keeps its rows with
        // the movie reference nulled. All enforced by the schema.
        sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM movies")
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("count")?)
    }
}
