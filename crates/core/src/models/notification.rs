//! Notification and import-list configuration rows
//!
//! Like indexers and download clients these are envelopes around
//! adapter-specific settings: an implementation id plus an opaque settings
//! map the adapter validates itself.

use crate::error::{ReelvaultError, Result};
use crate::events::EventType;
use serde::{Deserialize, Serialize};

/// Configured notification endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub id: i32,
    pub name: String,
    pub implementation: String,
    pub settings: serde_json::Value,
    pub enabled: bool,
    /// Event types this endpoint wants; empty subscribes to everything.
    pub event_types: Vec<EventType>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl NotificationConfig {
    pub fn new(name: String, implementation: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            name,
            implementation,
            settings: serde_json::json!({}),
            enabled: true,
            event_types: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReelvaultError::validation("name", "must not be empty"));
        }
        if self.implementation.trim().is_empty() {
            return Err(ReelvaultError::validation(
                "implementation",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// Configured import list feeding discovered movies into the library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportListConfig {
    pub id: i32,
    pub name: String,
    pub implementation: String,
    pub settings: serde_json::Value,
    pub enabled: bool,
    /// Profile and root folder applied to movies the list adds.
    pub quality_profile_id: i32,
    pub root_folder: String,
    pub monitor_added: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ImportListConfig {
    pub fn new(
        name: String,
        implementation: String,
        quality_profile_id: i32,
        root_folder: String,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            name,
            implementation,
            settings: serde_json::json!({}),
            enabled: true,
            quality_profile_id,
            root_folder,
            monitor_added: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReelvaultError::validation("name", "must not be empty"));
        }
        if self.root_folder.trim().is_empty() {
            return Err(ReelvaultError::validation("root_folder", "must not be empty"));
        }
        Ok(())
    }
}
