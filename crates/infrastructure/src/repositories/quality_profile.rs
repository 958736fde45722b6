//! Quality profile repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::QualityProfileRepository;
use reelvault_core::error::{ReelvaultError, Result};
use reelvault_core::models::QualityProfile;
use sqlx::postgres::PgRow;
use sqlx::Row;

const PROFILE_COLUMNS: &str = "id, name, items, cutoff, upgrade_allowed, min_format_score,
    cutoff_format_score, format_scores, languages, created_at, updated_at";

fn profile_from_row(row: &PgRow) -> Result<QualityProfile> {
    Ok(QualityProfile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        items: from_json(row.try_get("items")?)?,
        cutoff: enum_from_text(&row.try_get::<String, _>("cutoff")?)?,
        upgrade_allowed: row.try_get("upgrade_allowed")?,
        min_format_score: row.try_get("min_format_score")?,
        cutoff_format_score: row.try_get("cutoff_format_score")?,
        format_scores: from_json(row.try_get("format_scores")?)?,
        languages: from_json(row.try_get("languages")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl QualityProfileRepository for PostgresStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<QualityProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM quality_profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<QualityProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM quality_profiles ORDER BY name",
            PROFILE_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn create(&self, profile: &QualityProfile) -> Result<i32> {
        profile.validate()?;
        let row = sqlx::query(
            "INSERT INTO quality_profiles (name, items, cutoff, upgrade_allowed,
                 min_format_score, cutoff_format_score, format_scores, languages,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id",
        )
        .bind(&profile.name)
        .bind(to_json(&profile.items)?)
        .bind(enum_to_text(&profile.cutoff))
        .bind(profile.upgrade_allowed)
        .bind(profile.min_format_score)
        .bind(profile.cutoff_format_score)
        .bind(to_json(&profile.format_scores)?)
        .bind(to_json(&profile.languages)?)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, profile: &QualityProfile) -> Result<()> {
        profile.validate()?;
        sqlx::query(
            "UPDATE quality_profiles SET name = $2, items = $3, cutoff = $4,
                 upgrade_allowed = $5, min_format_score = $6, cutoff_format_score = $7,
                 format_scores = $8, languages = $9, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(to_json(&profile.items)?)
        .bind(enum_to_text(&profile.cutoff))
        .bind(profile.upgrade_allowed)
        .bind(profile.min_format_score)
        .bind(profile.cutoff_format_score)
        .bind(to_json(&profile.format_scores)?)
        .bind(to_json(&profile.languages)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        if self.in_use(id).await? {
            return Err(ReelvaultError::Conflict {
                message: format!("quality profile {} is referenced by movies", id),
            });
        }
        sqlx::query("DELETE FROM quality_profiles WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn in_use(&self, id: i32) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM movies WHERE quality_profile_id = $1) AS used")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("used")?)
    }
}
