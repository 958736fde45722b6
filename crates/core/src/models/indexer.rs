//! Indexer and download client configuration rows
//!
//! Both are envelopes around adapter-specific settings the core does not
//! interpret: an implementation id plus an opaque settings map validated by
//! the adapter itself.

use crate::error::{ReelvaultError, Result};
use serde::{Deserialize, Serialize};

/// Download protocol of a release or client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Torrent,
    Usenet,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Torrent => write!(f, "torrent"),
            Protocol::Usenet => write!(f, "usenet"),
        }
    }
}

/// Configured indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indexer {
    pub id: i32,
    pub name: String,
    pub implementation: String,
    pub settings: serde_json::Value,
    pub protocol: Protocol,
    pub enable_search: bool,
    pub enable_rss: bool,
    /// Lower is preferred.
    pub priority: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Indexer {
    pub fn new(name: String, implementation: String, protocol: Protocol) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            name,
            implementation,
            settings: serde_json::json!({}),
            protocol,
            enable_search: true,
            enable_rss: true,
            priority: 25,
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

/// Configured download client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadClient {
    pub id: i32,
    pub name: String,
    pub implementation: String,
    pub settings: serde_json::Value,
    pub protocol: Protocol,
    pub enabled: bool,
    /// Lower is preferred.
    pub priority: i32,
    pub remove_completed_downloads: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DownloadClient {
    pub fn new(name: String, implementation: String, protocol: Protocol) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            name,
            implementation,
            settings: serde_json::json!({}),
            protocol,
            enabled: true,
            priority: 1,
            remove_completed_downloads: false,
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
