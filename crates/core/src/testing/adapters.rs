//! Scripted adapter doubles

use crate::adapters::*;
use crate::error::{ReelvaultError, Result};
use crate::events::SystemEvent;
use crate::models::release::Release;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Indexer returning a scripted set of releases. Can be told to fail, or to
/// block long enough for cancellation tests.
#[derive(Default)]
pub struct ScriptedIndexer {
    releases: Mutex<Vec<RawRelease>>,
    fail_message: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    pub search_calls: AtomicUsize,
}

impl ScriptedIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_releases(releases: Vec<RawRelease>) -> Self {
        Self {
            releases: Mutex::new(releases),
            ..Default::default()
        }
    }

    pub fn set_releases(&self, releases: Vec<RawRelease>) {
        *self.releases.lock().unwrap() = releases;
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_message.lock().unwrap() = Some(message.into());
    }

    pub fn block_for(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl IndexerAdapter for ScriptedIndexer {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<RawRelease>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.fail_message.lock().unwrap().clone() {
            return Err(ReelvaultError::Transient {
                service: "indexer".to_string(),
                message,
            });
        }
        Ok(self.releases.lock().unwrap().clone())
    }

    async fn rss(&self) -> Result<Vec<RawRelease>> {
        Ok(self.releases.lock().unwrap().clone())
    }

    async fn test(&self) -> Result<TestResult> {
        Ok(TestResult::ok())
    }

    fn capabilities(&self) -> IndexerCapabilities {
        IndexerCapabilities {
            supports_search: true,
            supports_rss: true,
            categories: vec![2000],
        }
    }
}

/// Download client double recording adds and serving scripted download
/// states.
#[derive(Default)]
pub struct ScriptedDownloadClient {
    downloads: Mutex<HashMap<String, ClientDownload>>,
    pub added: Mutex<Vec<Release>>,
    fail_add: Mutex<Option<ReelvaultError>>,
    next_id: AtomicUsize,
    pub removed: Mutex<Vec<(String, bool)>>,
}

impl ScriptedDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `add` call fails once with the given error.
    pub fn fail_next_add(&self, error: ReelvaultError) {
        *self.fail_add.lock().unwrap() = Some(error);
    }

    /// Script the state the client reports for a download.
    pub fn set_download(&self, download: ClientDownload) {
        self.downloads
            .lock()
            .unwrap()
            .insert(download.download_id.clone(), download);
    }

    pub fn complete_download(&self, download_id: &str, output_path: &str) {
        let mut downloads = self.downloads.lock().unwrap();
        if let Some(d) = downloads.get_mut(download_id) {
            d.state = DownloadState::Completed;
            d.size_left = 0;
            d.output_path = Some(output_path.to_string());
        }
    }
}

#[async_trait]
impl DownloadClientAdapter for ScriptedDownloadClient {
    async fn add(&self, release: &Release) -> Result<String> {
        if let Some(err) = self.fail_add.lock().unwrap().take() {
            return Err(err);
        }
        self.added.lock().unwrap().push(release.clone());
        let download_id = format!("dl-{:04x}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.downloads.lock().unwrap().insert(
            download_id.clone(),
            ClientDownload {
                download_id: download_id.clone(),
                state: DownloadState::Queued,
                size_bytes: release.size_bytes,
                size_left: release.size_bytes,
                output_path: None,
                error_message: None,
            },
        );
        Ok(download_id)
    }

    async fn list(&self) -> Result<Vec<ClientDownload>> {
        Ok(self.downloads.lock().unwrap().values().cloned().collect())
    }

    async fn remove(&self, download_id: &str, delete_data: bool) -> Result<()> {
        self.downloads.lock().unwrap().remove(download_id);
        self.removed
            .lock()
            .unwrap()
            .push((download_id.to_string(), delete_data));
        Ok(())
    }

    async fn test(&self) -> Result<TestResult> {
        Ok(TestResult::ok())
    }
}

/// Import list double serving a scripted discovery set.
#[derive(Default)]
pub struct ScriptedImportList {
    pub movies: Mutex<Vec<DiscoveredMovie>>,
}

impl ScriptedImportList {
    pub fn with_movies(movies: Vec<DiscoveredMovie>) -> Self {
        Self {
            movies: Mutex::new(movies),
        }
    }
}

#[async_trait]
impl ImportListAdapter for ScriptedImportList {
    async fn fetch(&self) -> Result<Vec<DiscoveredMovie>> {
        Ok(self.movies.lock().unwrap().clone())
    }
}

/// Notification double recording everything it was asked to send.
#[derive(Default)]
pub struct ScriptedNotification {
    pub sent: Mutex<Vec<SystemEvent>>,
}

#[async_trait]
impl NotificationAdapter for ScriptedNotification {
    async fn send(&self, event: &SystemEvent) -> Result<()> {
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn supports(&self, _event: &SystemEvent) -> bool {
        true
    }
}
