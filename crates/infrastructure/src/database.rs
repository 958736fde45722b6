//! Connection pool setup

use reelvault_core::error::{ReelvaultError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

pub type DatabasePool = PgPool;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Connect and verify the pool with a ping.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabasePool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| ReelvaultError::Transient {
            service: "database".to_string(),
            message: format!("connect: {}", e),
        })?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(max_connections = config.max_connections, "database pool ready");
    Ok(pool)
}
