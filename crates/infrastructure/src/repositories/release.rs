//! Release repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::{ReleaseFilter, ReleaseRepository};
use reelvault_core::error::Result;
use reelvault_core::models::Release;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const RELEASE_COLUMNS: &str = "id, guid, indexer_id, movie_id, title, download_url, info_url,
    size_bytes, age_hours, publish_date, seeders, leechers, protocol, quality,
    quality_weight, languages, release_group, status, rejection_reasons,
    download_client_id, grabbed_at, created_at";

pub(super) fn release_from_row(row: &PgRow) -> Result<Release> {
    Ok(Release {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        indexer_id: row.try_get("indexer_id")?,
        movie_id: row.try_get("movie_id")?,
        title: row.try_get("title")?,
        download_url: row.try_get("download_url")?,
        info_url: row.try_get("info_url")?,
        size_bytes: row.try_get("size_bytes")?,
        age_hours: row.try_get("age_hours")?,
        publish_date: row.try_get("publish_date")?,
        seeders: row.try_get("seeders")?,
        leechers: row.try_get("leechers")?,
        protocol: enum_from_text(&row.try_get::<String, _>("protocol")?)?,
        quality: enum_from_text(&row.try_get::<String, _>("quality")?)?,
        quality_weight: row.try_get("quality_weight")?,
        languages: from_json(row.try_get("languages")?)?,
        release_group: row.try_get("release_group")?,
        status: enum_from_text(&row.try_get::<String, _>("status")?)?,
        rejection_reasons: from_json(row.try_get("rejection_reasons")?)?,
        download_client_id: row.try_get("download_client_id")?,
        grabbed_at: row.try_get("grabbed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) const RELEASE_UPSERT: &str =
    "INSERT INTO releases (id, guid, indexer_id, movie_id, title, download_url, info_url,
         size_bytes, age_hours, publish_date, seeders, leechers, protocol, quality,
         quality_weight, languages, release_group, status, rejection_reasons,
         download_client_id, grabbed_at, created_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
         $17, $18, $19, $20, $21, $22)
     ON CONFLICT (guid, indexer_id) DO UPDATE SET
         movie_id = EXCLUDED.movie_id,
         title = EXCLUDED.title,
         download_url = EXCLUDED.download_url,
         size_bytes = EXCLUDED.size_bytes,
         age_hours = EXCLUDED.age_hours,
         seeders = EXCLUDED.seeders,
         leechers = EXCLUDED.leechers,
         quality = EXCLUDED.quality,
         quality_weight = EXCLUDED.quality_weight,
         languages = EXCLUDED.languages,
         release_group = EXCLUDED.release_group,
         status = EXCLUDED.status,
         rejection_reasons = EXCLUDED.rejection_reasons";

pub(super) fn bind_release<'q>(
    query: &'q str,
    release: &Release,
) -> Result<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
    Ok(sqlx::query(query)
        .bind(release.id)
        .bind(release.guid.clone())
        .bind(release.indexer_id)
        .bind(release.movie_id)
        .bind(release.title.clone())
        .bind(release.download_url.clone())
        .bind(release.info_url.clone())
        .bind(release.size_bytes)
        .bind(release.age_hours)
        .bind(release.publish_date)
        .bind(release.seeders)
        .bind(release.leechers)
        .bind(enum_to_text(&release.protocol))
        .bind(enum_to_text(&release.quality))
        .bind(release.quality_weight)
        .bind(to_json(&release.languages)?)
        .bind(release.release_group.clone())
        .bind(enum_to_text(&release.status))
        .bind(to_json(&release.rejection_reasons)?)
        .bind(release.download_client_id)
        .bind(release.grabbed_at)
        .bind(release.created_at))
}

#[async_trait]
impl ReleaseRepository for PostgresStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Release>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM releases WHERE id = $1",
            RELEASE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(release_from_row).transpose()
    }

    async fn find_by_guid(&self, guid: &str, indexer_id: i32) -> Result<Option<Release>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM releases WHERE guid = $1 AND indexer_id = $2",
            RELEASE_COLUMNS
        ))
        .bind(guid)
        .bind(indexer_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(release_from_row).transpose()
    }

    async fn list(&self, filter: &ReleaseFilter) -> Result<Vec<Release>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM releases
             WHERE ($1::uuid IS NULL OR movie_id = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC",
            RELEASE_COLUMNS
        ))
        .bind(filter.movie_id)
        .bind(filter.status.as_ref().map(enum_to_text))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(release_from_row).collect()
    }

    async fn upsert(&self, release: &Release) -> Result<()> {
        bind_release(RELEASE_UPSERT, release)?
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        sqlx::query(
            "UPDATE releases SET status = $2, rejection_reasons = $3,
                 download_client_id = $4, grabbed_at = $5, movie_id = $6
             WHERE id = $1",
        )
        .bind(release.id)
        .bind(enum_to_text(&release.status))
        .bind(to_json(&release.rejection_reasons)?)
        .bind(release.download_client_id)
        .bind(release.grabbed_at)
        .bind(release.movie_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
