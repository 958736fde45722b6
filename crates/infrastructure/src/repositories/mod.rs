//! Repository implementations over Postgres
//!
//! One `PostgresStore` implements every store trait; the impls live in one
//! file per aggregate. Enum columns are stored as their serde string form,
//! list and nested fields as JSONB.

mod blocklist;
mod calendar;
mod config;
mod custom_format;
mod download_client;
mod history;
mod indexer;
mod movie;
mod movie_file;
mod notification;
mod quality_profile;
mod queue;
mod release;
mod task;
mod transactional;
mod wanted;

use crate::database::DatabasePool;
use reelvault_core::error::{ReelvaultError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// The authoritative relational store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: DatabasePool,
}

impl PostgresStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ReelvaultError::Internal {
                message: format!("migrations: {}", e),
            })
    }
}

/// Serialize an enum to the text form its serde rename rules produce.
pub(crate) fn enum_to_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        other => panic!("enum did not serialize to a string: {:?}", other),
    }
}

/// Parse an enum from its serde text form.
pub(crate) fn enum_from_text<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string())).map_err(|e| {
        ReelvaultError::Internal {
            message: format!("corrupt enum column '{}': {}", text, e),
        }
    })
}

/// Serialize a field to JSONB.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ReelvaultError::Internal {
        message: format!("serialize: {}", e),
    })
}

/// Parse a JSONB column.
pub(crate) fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ReelvaultError::Internal {
        message: format!("corrupt jsonb column: {}", e),
    })
}
