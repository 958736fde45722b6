//! Movie file repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::MovieFileRepository;
use reelvault_core::error::Result;
use reelvault_core::models::MovieFile;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const FILE_COLUMNS: &str = "id, movie_id, path, relative_path, size_bytes, quality, revision,
    languages, custom_format_ids, format_score, release_group, edition, media_info, date_added";

pub(super) fn file_from_row(row: &PgRow) -> Result<MovieFile> {
    Ok(MovieFile {
        id: row.try_get("id")?,
        movie_id: row.try_get("movie_id")?,
        path: row.try_get("path")?,
        relative_path: row.try_get("relative_path")?,
        size_bytes: row.try_get("size_bytes")?,
        quality: enum_from_text(&row.try_get::<String, _>("quality")?)?,
        revision: row.try_get("revision")?,
        languages: from_json(row.try_get("languages")?)?,
        custom_format_ids: from_json(row.try_get("custom_format_ids")?)?,
        format_score: row.try_get("format_score")?,
        release_group: row.try_get("release_group")?,
        edition: row.try_get("edition")?,
        media_info: row
            .try_get::<Option<serde_json::Value>, _>("media_info")?
            .map(from_json)
            .transpose()?,
        date_added: row.try_get("date_added")?,
    })
}

pub(super) fn bind_file_insert<'q>(
    query: &'q str,
    file: &MovieFile,
) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
    Ok(sqlx::query(query)
        .bind(file.id)
        .bind(file.movie_id)
        .bind(file.path.clone())
        .bind(file.relative_path.clone())
        .bind(file.size_bytes)
        .bind(enum_to_text(&file.quality))
        .bind(file.revision)
        .bind(to_json(&file.languages)?)
        .bind(to_json(&file.custom_format_ids)?)
        .bind(file.format_score)
        .bind(file.release_group.clone())
        .bind(file.edition.clone())
        .bind(file.media_info.as_ref().map(to_json).transpose()?)
        .bind(file.date_added))
}

pub(super) const FILE_INSERT: &str =
    "INSERT INTO movie_files (id, movie_id, path, relative_path, size_bytes, quality,
         revision, languages, custom_format_ids, format_score, release_group, edition,
         media_info, date_added)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)";

#[async_trait]
impl MovieFileRepository for PostgresStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<MovieFile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM movie_files WHERE id = $1",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    async fn find_by_movie_id(&self, movie_id: Uuid) -> Result<Option<MovieFile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM movie_files WHERE movie_id = $1",
            FILE_COLUMNS
        ))
        .bind(movie_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    async fn create(&self, file: &MovieFile) -> Result<()> {
        bind_file_insert(FILE_INSERT, file)?
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM movie_files WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
