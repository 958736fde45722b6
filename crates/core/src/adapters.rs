//! Outbound adapter contracts
//!
//! Concrete wire protocols (Torznab, qBittorrent, TMDB, ...) are
//! collaborators; the core only sees these narrow interfaces. Adapters map
//! their native failures into `Transient` (retryable) or `Permanent`.

use crate::error::Result;
use crate::events::SystemEvent;
use crate::models::indexer::Protocol;
use crate::models::movie_file::MediaInfo;
use crate::models::release::Release;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A candidate as returned by an indexer, before parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRelease {
    pub guid: String,
    pub title: String,
    pub download_url: String,
    pub info_url: Option<String>,
    pub size_bytes: i64,
    pub publish_date: Option<DateTime<Utc>>,
    pub seeders: Option<i32>,
    pub leechers: Option<i32>,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub title: Option<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i32>,
    pub year: Option<i32>,
    pub categories: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct IndexerCapabilities {
    pub supports_search: bool,
    pub supports_rss: bool,
    pub categories: Vec<i32>,
}

/// Result of a connectivity test against a configured adapter.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub successful: bool,
    pub errors: Vec<String>,
}

impl TestResult {
    pub fn ok() -> Self {
        Self {
            successful: true,
            errors: Vec::new(),
        }
    }
}

#[async_trait]
pub trait IndexerAdapter: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawRelease>>;
    async fn rss(&self) -> Result<Vec<RawRelease>>;
    async fn test(&self) -> Result<TestResult>;
    fn capabilities(&self) -> IndexerCapabilities;
}

/// State of one download as reported by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadState {
    Queued,
    Downloading,
    Completed,
    Failed,
    Warning,
    Delayed,
}

#[derive(Debug, Clone)]
pub struct ClientDownload {
    pub download_id: String,
    pub state: DownloadState,
    pub size_bytes: i64,
    pub size_left: i64,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait DownloadClientAdapter: Send + Sync {
    /// Hands a release to the client; returns the client's opaque download
    /// id. Errors are `Transient` (retry) or `Permanent` (reject release).
    async fn add(&self, release: &Release) -> Result<String>;
    async fn list(&self) -> Result<Vec<ClientDownload>>;
    async fn remove(&self, download_id: &str, delete_data: bool) -> Result<()>;
    async fn test(&self) -> Result<TestResult>;
}

#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    async fn send(&self, event: &SystemEvent) -> Result<()>;
    fn supports(&self, event: &SystemEvent) -> bool;
}

/// Metadata returned by a provider lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieMetadata {
    pub tmdb_id: i32,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub in_cinemas: Option<DateTime<Utc>>,
    pub physical_release: Option<DateTime<Utc>>,
    pub digital_release: Option<DateTime<Utc>>,
    pub overview: Option<String>,
}

#[async_trait]
pub trait MetadataAdapter: Send + Sync {
    async fn lookup_by_tmdb(&self, tmdb_id: i32) -> Result<MovieMetadata>;
    async fn lookup_by_imdb(&self, imdb_id: &str) -> Result<MovieMetadata>;
    async fn search(&self, term: &str) -> Result<Vec<MovieMetadata>>;
}

/// A movie discovered on an import list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredMovie {
    pub tmdb_id: i32,
    pub title: String,
    pub year: Option<i32>,
}

#[async_trait]
pub trait ImportListAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<DiscoveredMovie>>;
}

/// Probes technical stream details of an imported file.
#[async_trait]
pub trait MediaInfoAdapter: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;
}
