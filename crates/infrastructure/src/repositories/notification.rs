//! Notification and import-list configuration repositories

use super::{from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::{ImportListRepository, NotificationConfigRepository};
use reelvault_core::error::Result;
use reelvault_core::models::{ImportListConfig, NotificationConfig};
use sqlx::postgres::PgRow;
use sqlx::Row;

fn notification_from_row(row: &PgRow) -> Result<NotificationConfig> {
    Ok(NotificationConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        implementation: row.try_get("implementation")?,
        settings: row.try_get("settings")?,
        enabled: row.try_get("enabled")?,
        event_types: from_json(row.try_get("event_types")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn import_list_from_row(row: &PgRow) -> Result<ImportListConfig> {
    Ok(ImportListConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        implementation: row.try_get("implementation")?,
        settings: row.try_get("settings")?,
        enabled: row.try_get("enabled")?,
        quality_profile_id: row.try_get("quality_profile_id")?,
        root_folder: row.try_get("root_folder")?,
        monitor_added: row.try_get("monitor_added")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const NOTIFICATION_COLUMNS: &str =
    "id, name, implementation, settings, enabled, event_types, created_at, updated_at";

#[async_trait]
impl NotificationConfigRepository for PostgresStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<NotificationConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE id = $1",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(notification_from_row).transpose()
    }

    async fn find_enabled(&self) -> Result<Vec<NotificationConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications WHERE enabled ORDER BY name",
            NOTIFICATION_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn list(&self) -> Result<Vec<NotificationConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications ORDER BY name",
            NOTIFICATION_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn create(&self, config: &NotificationConfig) -> Result<i32> {
        config.validate()?;
        let row = sqlx::query(
            "INSERT INTO notifications (name, implementation, settings, enabled,
                 event_types, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&config.name)
        .bind(&config.implementation)
        .bind(&config.settings)
        .bind(config.enabled)
        .bind(to_json(&config.event_types)?)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, config: &NotificationConfig) -> Result<()> {
        config.validate()?;
        sqlx::query(
            "UPDATE notifications SET name = $2, implementation = $3, settings = $4,
                 enabled = $5, event_types = $6, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(config.id)
        .bind(&config.name)
        .bind(&config.implementation)
        .bind(&config.settings)
        .bind(config.enabled)
        .bind(to_json(&config.event_types)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

const IMPORT_LIST_COLUMNS: &str =
    "id, name, implementation, settings, enabled, quality_profile_id, root_folder,
     monitor_added, created_at, updated_at";

#[async_trait]
impl ImportListRepository for PostgresStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<ImportListConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM import_lists WHERE id = $1",
            IMPORT_LIST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(import_list_from_row).transpose()
    }

    async fn find_enabled(&self) -> Result<Vec<ImportListConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM import_lists WHERE enabled ORDER BY name",
            IMPORT_LIST_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(import_list_from_row).collect()
    }

    async fn list(&self) -> Result<Vec<ImportListConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM import_lists ORDER BY name",
            IMPORT_LIST_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(import_list_from_row).collect()
    }

    async fn create(&self, config: &ImportListConfig) -> Result<i32> {
        config.validate()?;
        let row = sqlx::query(
            "INSERT INTO import_lists (name, implementation, settings, enabled,
                 quality_profile_id, root_folder, monitor_added, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(&config.name)
        .bind(&config.implementation)
        .bind(&config.settings)
        .bind(config.enabled)
        .bind(config.quality_profile_id)
        .bind(&config.root_folder)
        .bind(config.monitor_added)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update(&self, config: &ImportListConfig) -> Result<()> {
        config.validate()?;
        sqlx::query(
            "UPDATE import_lists SET name = $2, implementation = $3, settings = $4,
                 enabled = $5, quality_profile_id = $6, root_folder = $7,
                 monitor_added = $8, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(config.id)
        .bind(&config.name)
        .bind(&config.implementation)
        .bind(&config.settings)
        .bind(config.enabled)
        .bind(config.quality_profile_id)
        .bind(&config.root_folder)
        .bind(config.monitor_added)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM import_lists WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
