//! Configuration rows: singletons stored as keyed JSONB documents plus the
//! root-folder table

use super::{from_json, to_json, PostgresStore};
use async_trait::async_trait;
use reelvault_core::domain::repositories::ConfigRepository;
use reelvault_core::error::Result;
use reelvault_core::models::{HostConfig, MediaManagementConfig, NamingConfig, RootFolder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::Row;

impl PostgresStore {
    async fn config_document<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let row = sqlx::query("SELECT value FROM config WHERE key = $1")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => from_json(row.try_get("value")?),
            None => Ok(T::default()),
        }
    }

    async fn set_config_document<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(to_json(value)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigRepository for PostgresStore {
    async fn naming(&self) -> Result<NamingConfig> {
        self.config_document("naming").await
    }

    async fn set_naming(&self, config: &NamingConfig) -> Result<()> {
        self.set_config_document("naming", config).await
    }

    async fn media_management(&self) -> Result<MediaManagementConfig> {
        self.config_document("media_management").await
    }

    async fn set_media_management(&self, config: &MediaManagementConfig) -> Result<()> {
        self.set_config_document("media_management", config).await
    }

    async fn host(&self) -> Result<HostConfig> {
        self.config_document("host").await
    }

    async fn set_host(&self, config: &HostConfig) -> Result<()> {
        self.set_config_document("host", config).await
    }

    async fn root_folders(&self) -> Result<Vec<RootFolder>> {
        let rows = sqlx::query("SELECT id, path FROM root_folders ORDER BY path")
            .fetch_all(self.pool())
            .await?;
        rows.iter()
            .map(|row| {
                Ok(RootFolder {
                    id: row.try_get("id")?,
                    path: row.try_get("path")?,
                })
            })
            .collect()
    }

    async fn add_root_folder(&self, folder: &RootFolder) -> Result<i32> {
        folder.validate()?;
        let row = sqlx::query("INSERT INTO root_folders (path) VALUES ($1) RETURNING id")
            .bind(&folder.path)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("id")?)
    }

    async fn remove_root_folder(&self, id: i32) -> Result<()> {
        sqlx::query("DELETE FROM root_folders WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
