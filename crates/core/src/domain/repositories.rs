//! Store contract
//!
//! One trait per aggregate. Implementations enforce the uniqueness
//! invariants (`tmdb_id` and `title_slug` on movies, `(guid, indexer_id)`
//! on releases, `name` on configuration entities, `movie_id` on wanted
//! rows) and surface violations as `AlreadyExists`/`InvalidReference`.
//! Multi-row mutations that cross entity boundaries go through
//! `TransactionalStore` so they commit atomically.

use crate::error::Result;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Filter for movie listings.
#[derive(Debug, Clone, Default)]
pub struct MovieFilter {
    pub monitored: Option<bool>,
    pub has_file: Option<bool>,
    pub title_contains: Option<String>,
}

#[async_trait]
pub trait MovieRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>>;
    async fn find_by_tmdb_id(&self, tmdb_id: i32) -> Result<Option<Movie>>;
    async fn find_monitored(&self) -> Result<Vec<Movie>>;
    async fn list(&self, filter: &MovieFilter) -> Result<Vec<Movie>>;
    /// Movies whose release window intersects `[start, end]` on any of
    /// in_cinemas/physical_release/digital_release.
    async fn find_in_release_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movie>>;
    /// Fails with `AlreadyExists` on a duplicate tmdb_id or title_slug, and
    /// with `InvalidReference` when the quality profile is unknown.
    async fn create(&self, movie: &Movie) -> Result<()>;
    async fn update(&self, movie: &Movie) -> Result<()>;
    /// Cascades to the movie's file, wanted row and queue rows; history
    /// rows are retained with movie_id nulled.
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait MovieFileRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<MovieFile>>;
    async fn find_by_movie_id(&self, movie_id: Uuid) -> Result<Option<MovieFile>>;
    async fn create(&self, file: &MovieFile) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait QualityProfileRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<QualityProfile>>;
    async fn list(&self) -> Result<Vec<QualityProfile>>;
    async fn create(&self, profile: &QualityProfile) -> Result<i32>;
    async fn update(&self, profile: &QualityProfile) -> Result<()>;
    /// Fails with `Conflict` while any movie references the profile.
    async fn delete(&self, id: i32) -> Result<()>;
    async fn in_use(&self, id: i32) -> Result<bool>;
}

#[async_trait]
pub trait CustomFormatRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<CustomFormat>>;
    async fn list(&self) -> Result<Vec<CustomFormat>>;
    async fn create(&self, format: &CustomFormat) -> Result<i32>;
    async fn update(&self, format: &CustomFormat) -> Result<()>;
    async fn delete(&self, id: i32) -> Result<()>;
}

#[async_trait]
pub trait IndexerRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<Indexer>>;
    async fn find_enabled(&self) -> Result<Vec<Indexer>>;
    async fn list(&self) -> Result<Vec<Indexer>>;
    async fn create(&self, indexer: &Indexer) -> Result<i32>;
    async fn update(&self, indexer: &Indexer) -> Result<()>;
    async fn delete(&self, id: i32) -> Result<()>;
}

#[async_trait]
pub trait DownloadClientRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<DownloadClient>>;
    /// Enabled clients ordered by (priority asc, name asc).
    async fn find_enabled(&self) -> Result<Vec<DownloadClient>>;
    async fn list(&self) -> Result<Vec<DownloadClient>>;
    async fn create(&self, client: &DownloadClient) -> Result<i32>;
    async fn update(&self, client: &DownloadClient) -> Result<()>;
    async fn delete(&self, id: i32) -> Result<()>;
}

#[async_trait]
pub trait NotificationConfigRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<NotificationConfig>>;
    async fn find_enabled(&self) -> Result<Vec<NotificationConfig>>;
    async fn list(&self) -> Result<Vec<NotificationConfig>>;
    async fn create(&self, config: &NotificationConfig) -> Result<i32>;
    async fn update(&self, config: &NotificationConfig) -> Result<()>;
    async fn delete(&self, id: i32) -> Result<()>;
}

#[async_trait]
pub trait ImportListRepository: Send + Sync {
    async fn find_by_id(&self, id: i32) -> Result<Option<ImportListConfig>>;
    async fn find_enabled(&self) -> Result<Vec<ImportListConfig>>;
    async fn list(&self) -> Result<Vec<ImportListConfig>>;
    async fn create(&self, config: &ImportListConfig) -> Result<i32>;
    async fn update(&self, config: &ImportListConfig) -> Result<()>;
    async fn delete(&self, id: i32) -> Result<()>;
}

/// Filter for release listings.
#[derive(Debug, Clone, Default)]
pub struct ReleaseFilter {
    pub movie_id: Option<Uuid>,
    pub status: Option<ReleaseStatus>,
}

#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Release>>;
    async fn find_by_guid(&self, guid: &str, indexer_id: i32) -> Result<Option<Release>>;
    async fn list(&self, filter: &ReleaseFilter) -> Result<Vec<Release>>;
    /// Upsert keyed on `(guid, indexer_id)`: a release seen again in a later
    /// search refreshes its mutable fields instead of duplicating the row.
    async fn upsert(&self, release: &Release) -> Result<()>;
    async fn update(&self, release: &Release) -> Result<()>;
}

#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueItem>>;
    async fn find_by_download_id(
        &self,
        download_client_id: i32,
        download_id: &str,
    ) -> Result<Option<QueueItem>>;
    async fn find_active(&self) -> Result<Vec<QueueItem>>;
    async fn find_by_client(&self, download_client_id: i32) -> Result<Vec<QueueItem>>;
    async fn list(&self) -> Result<Vec<QueueItem>>;
    async fn update(&self, item: &QueueItem) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Filter for wanted listings.
#[derive(Debug, Clone, Default)]
pub struct WantedFilter {
    pub status: Option<WantedStatus>,
    pub priority: Option<i32>,
}

#[async_trait]
pub trait WantedRepository: Send + Sync {
    async fn find_by_movie_id(&self, movie_id: Uuid) -> Result<Option<WantedMovie>>;
    async fn list(&self, filter: &WantedFilter) -> Result<Vec<WantedMovie>>;
    /// Eligible rows ordered by (priority desc, next_search_time asc with
    /// nulls first), limited to `limit`. Availability of the owning movie is
    /// checked by the caller.
    async fn find_search_candidates(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<WantedMovie>>;
    /// Upsert keyed on movie_id.
    async fn upsert(&self, wanted: &WantedMovie) -> Result<()>;
    async fn update(&self, wanted: &WantedMovie) -> Result<()>;
    async fn delete_by_movie_id(&self, movie_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &Task) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Task>>;
    async fn list_active(&self) -> Result<Vec<Task>>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<Task>>;
    /// Queued tasks ordered by (priority rank asc, queued_at asc).
    async fn queued(&self) -> Result<Vec<Task>>;
    /// Compare-and-swap transition; returns false when the row was not in
    /// `from` (e.g. a concurrent cancel won).
    async fn try_transition(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Terminal transition recording exception text and duration.
    async fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        exception: Option<String>,
        ended_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn update_progress(&self, id: Uuid, progress: &TaskProgress) -> Result<()>;
    /// Any task left in started/cancelling by a dead process becomes failed.
    async fn fail_orphaned(&self, reason: &str, at: DateTime<Utc>) -> Result<u64>;
    async fn has_active_for_command(&self, command_name: &str) -> Result<bool>;

    // Recurring sources
    async fn upsert_scheduled(&self, scheduled: &ScheduledTask) -> Result<()>;
    async fn list_scheduled(&self) -> Result<Vec<ScheduledTask>>;
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>>;
    async fn set_scheduled_run(
        &self,
        name: &str,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()>;
    /// On process start: `next_run = max(next_run, now)`.
    async fn reschedule_missed(&self, now: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, event: &History) -> Result<()>;
    async fn list_for_movie(&self, movie_id: Uuid) -> Result<Vec<History>>;
    async fn list_recent(&self, limit: i64) -> Result<Vec<History>>;
}

#[async_trait]
pub trait BlocklistRepository: Send + Sync {
    async fn insert(&self, entry: &BlocklistEntry) -> Result<()>;
    async fn contains_guid(&self, guid: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<BlocklistEntry>>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Materialized calendar rows keyed by request fingerprint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CalendarCacheRow {
    pub cache_key: String,
    pub payload: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CalendarCacheRepository: Send + Sync {
    /// Only returns a row that has not expired at `now`.
    async fn get_fresh(&self, cache_key: &str, now: DateTime<Utc>) -> Result<Option<CalendarCacheRow>>;
    async fn upsert(&self, row: &CalendarCacheRow) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn naming(&self) -> Result<NamingConfig>;
    async fn set_naming(&self, config: &NamingConfig) -> Result<()>;
    async fn media_management(&self) -> Result<MediaManagementConfig>;
    async fn set_media_management(&self, config: &MediaManagementConfig) -> Result<()>;
    async fn host(&self) -> Result<HostConfig>;
    async fn set_host(&self, config: &HostConfig) -> Result<()>;
    async fn root_folders(&self) -> Result<Vec<RootFolder>>;
    async fn add_root_folder(&self, folder: &RootFolder) -> Result<i32>;
    async fn remove_root_folder(&self, id: i32) -> Result<()>;
}

/// The committed grab: release marked grabbed, queue row upserted keyed on
/// `(download_client_id, download_id)`, history appended — atomically.
#[derive(Debug, Clone)]
pub struct GrabCommit {
    pub release: Release,
    pub queue_item: QueueItem,
    pub history: History,
}

/// The committed import: previous file replaced, new file registered, movie
/// flipped to has_file, wanted row resolved, history appended, queue item
/// finalized — atomically.
#[derive(Debug, Clone)]
pub struct ImportCommit {
    pub delete_file_id: Option<Uuid>,
    pub new_file: MovieFile,
    pub movie: Movie,
    pub delete_wanted: bool,
    pub wanted_update: Option<WantedMovie>,
    pub history: History,
    pub queue_item: QueueItem,
}

/// Cross-entity mutations that the contract requires to land in a single
/// transaction.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn commit_grab(&self, commit: GrabCommit) -> Result<QueueItem>;
    async fn commit_import(&self, commit: ImportCommit) -> Result<()>;
}
