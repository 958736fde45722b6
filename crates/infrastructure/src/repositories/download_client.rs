//! Download client repository

use super::{enum_from_text, enum_to_text, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::DownloadClientRepository;
use reelvault_core::error::Result;
use reelvault_core::models::DownloadClient;
use sqlx::postgres::PgRow;
use sqlx::Row;

const CLIENT_COLUMNS: &str =
    "id, name, implementation, settings, protocol, enabled, priority,
     remove_completed_downloads, created_at, updated_at";

fn client_from_row(row: &PgRow) -> Result<DownloadClient> {
    Ok(DownloadClient {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        implementation: row.try_get("implementation")?,
        settings: row.try_get("settings")?,
        protocol: enum_from_text(&row.try_get::<String, _>("protocol")?)?,
        enabled: row.try_get("enabled")?,
        priority: row.try_get("priority")?,
        remove_completed_downloads: row.try_get("remove_completed_downloads")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl DownloadClientRepository for PostgresStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<DownloadClient>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM download_clients WHERE id = $1",
            CLIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(client_from_row).transpose()
    }

    async fn find_enabled(&self) -> Result<Vec<DownloadClient>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM download_clients WHERE enabled ORDER BY priority, name",
            CLIENT_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn list(&self) -> Result<Vec<DownloadClient>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM download_clients ORDER BY name",
            CLIENT_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn create(&self, client: &DownloadClient) -> Result<i32> {
        client.validate()?;
        let row = sqlx::query(
            "INSERT INTO download_clients (name, implementation, settings, protocol,
                 enabled, priority, remove_completed_downloads, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(&client.name)
        .bind(&client.implementation)
        .bind(&client.settings)
        .bind(enum_to_text(&client.protocol))
        .bind(client.enabled)
        .bind(client.priority)
        .bind(client.remove_completed_downloads)
        .bind(client.created_at)
        .bind(client.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, client: &DownloadClient) -> Result<()> {
        client.validate()?;
        sqlx::query(
            "UPDATE download_clients SET name = $2, implementation = $3, settings = $4,
                 protocol = $5, enabled = $6, priority = $7,
                 remove_completed_downloads = $8, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(client.id)
        .bind(&client.name)
        .bind(&client.implementation)
        .bind(&client.settings)
        .bind(enum_to_text(&client.protocol))
        .bind(client.enabled)
        .bind(client.priority)
        .bind(client.remove_completed_downloads)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM download_clients WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
