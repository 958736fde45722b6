//! Custom format repository

use super::{from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::CustomFormatRepository;
use reelvault_core::error::Result;
use reelvault_core::models::CustomFormat;
use sqlx::postgres::PgRow;
use sqlx::Row;

fn format_from_row(row: &PgRow) -> Result<CustomFormat> {
    Ok(CustomFormat {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        specifications: from_json(row.try_get("specifications")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CustomFormatRepository for PostgresStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<CustomFormat>> {
        let row = sqlx::query(
            "SELECT id, name, specifications, created_at, updated_at
             FROM custom_formats WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(format_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<CustomFormat>> {
        let rows = sqlx::query(
            "SELECT id, name, specifications, created_at, updated_at
             FROM custom_formats ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(format_from_row).collect()
    }

    async fn create(&self, format: &CustomFormat) -> Result<i32> {
        format.validate()?;
        let row = sqlx::query(
            "INSERT INTO custom_formats (name, specifications, created_at, updated_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(&format.name)
        .bind(to_json(&format.specifications)?)
        .bind(format.created_at)
        .bind(format.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, format: &CustomFormat) -> Result<()> {
        format.validate()?;
        sqlx::query(
            "UPDATE custom_formats SET name = $2, specifications = $3, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(format.id)
        .bind(&format.name)
        .bind(to_json(&format.specifications)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM custom_formats WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
