//! In-memory store double

use crate::domain::repositories::*;
use crate::error::{ReelvaultError, Result};
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    movies: Mutex<HashMap<Uuid, Movie>>,
    movie_files: Mutex<HashMap<Uuid, MovieFile>>,
    profiles: Mutex<HashMap<i32, QualityProfile>>,
    formats: Mutex<HashMap<i32, CustomFormat>>,
    indexers: Mutex<HashMap<i32, Indexer>>,
    clients: Mutex<HashMap<i32, DownloadClient>>,
    notifications: Mutex<HashMap<i32, NotificationConfig>>,
    import_lists: Mutex<HashMap<i32, ImportListConfig>>,
    releases: Mutex<HashMap<Uuid, Release>>,
    queue: Mutex<HashMap<Uuid, QueueItem>>,
    wanted: Mutex<HashMap<Uuid, WantedMovie>>,
    tasks: Mutex<HashMap<Uuid, Task>>,
    scheduled: Mutex<HashMap<String, ScheduledTask>>,
    history: Mutex<Vec<History>>,
    blocklist: Mutex<Vec<BlocklistEntry>>,
    calendar: Mutex<HashMap<String, CalendarCacheRow>>,
    naming: Mutex<NamingConfig>,
    media_management: Mutex<MediaManagementConfig>,
    host: Mutex<HostConfig>,
    root_folders: Mutex<HashMap<i32, RootFolder>>,
    next_id: AtomicI32,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.next_id.store(1, Ordering::SeqCst);
        store
    }

    fn alloc_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl MovieRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Movie>> {
        Ok(self.movies.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_tmdb_id(&self, tmdb_id: i32) -> Result<Option<Movie>> {
        Ok(self
            .movies
            .lock()
            .unwrap()
            .values()
            .find(|m| m.tmdb_id == tmdb_id)
            .cloned())
    }

    async fn find_monitored(&self) -> Result<Vec<Movie>> {
        Ok(self
            .movies
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.monitored)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &MovieFilter) -> Result<Vec<Movie>> {
        let mut movies: Vec<Movie> = self
            .movies
            .lock()
            .unwrap()
            .values()
            .filter(|m| filter.monitored.map(|v| m.monitored == v).unwrap_or(true))
            .filter(|m| filter.has_file.map(|v| m.has_file == v).unwrap_or(true))
            .filter(|m| {
                filter
                    .title_contains
                    .as_ref()
                    .map(|t| m.title.to_lowercase().contains(&t.to_lowercase()))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        movies.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(movies)
    }

    async fn find_in_release_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movie>> {
        let in_window = |d: Option<DateTime<Utc>>| d.map(|d| d >= start && d <= end).unwrap_or(false);
        Ok(self
            .movies
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                in_window(m.in_cinemas) || in_window(m.physical_release) || in_window(m.digital_release)
            })
            .cloned()
            .collect())
    }

    async fn create(&self, movie: &Movie) -> Result<()> {
        if !self
            .profiles
            .lock()
            .unwrap()
            .contains_key(&movie.quality_profile_id)
        {
            return Err(ReelvaultError::InvalidReference {
                field: "quality_profile_id".to_string(),
                message: format!("quality profile {} does not exist", movie.quality_profile_id),
            });
        }
        let mut movies = self.movies.lock().unwrap();
        if movies
            .values()
            .any(|m| m.tmdb_id == movie.tmdb_id || m.title_slug == movie.title_slug)
        {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("movie tmdb:{}", movie.tmdb_id),
            });
        }
        movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn update(&self, movie: &Movie) -> Result<()> {
        let mut movies = self.movies.lock().unwrap();
        if !movies.contains_key(&movie.id) {
            return Err(ReelvaultError::not_found(format!("movie {}", movie.id)));
        }
        movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.movies
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| ReelvaultError::not_found(format!("movie {}", id)))?;
        // Cascades
        self.movie_files.lock().unwrap().retain(|_, f| f.movie_id != id);
        self.wanted.lock().unwrap().retain(|_, w| w.movie_id != id);
        self.queue.lock().unwrap().retain(|_, q| q.movie_id != id);
        // History retained with movie_id nulled
        for event in self.history.lock().unwrap().iter_mut() {
            if event.movie_id == Some(id) {
                event.movie_id = None;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.movies.lock().unwrap().len() as i64)
    }
}

#[async_trait]
impl MovieFileRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<MovieFile>> {
        Ok(self.movie_files.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_movie_id(&self, movie_id: Uuid) -> Result<Option<MovieFile>> {
        Ok(self
            .movie_files
            .lock()
            .unwrap()
            .values()
            .find(|f| f.movie_id == movie_id)
            .cloned())
    }

    async fn create(&self, file: &MovieFile) -> Result<()> {
        let mut files = self.movie_files.lock().unwrap();
        if files.values().any(|f| f.movie_id == file.movie_id) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("movie file for movie {}", file.movie_id),
            });
        }
        files.insert(file.id, file.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.movie_files.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl QualityProfileRepository for MemoryStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<QualityProfile>> {
        Ok(self.profiles.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<QualityProfile>> {
        Ok(self.profiles.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, profile: &QualityProfile) -> Result<i32> {
        let mut profiles = self.profiles.lock().unwrap();
        if profiles.values().any(|p| p.name == profile.name) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("quality profile {}", profile.name),
            });
        }
        let id = if profile.id > 0 { profile.id } else { self.alloc_id() };
        let mut profile = profile.clone();
        profile.id = id;
        profiles.insert(id, profile);
        Ok(id)
    }

    async fn update(&self, profile: &QualityProfile) -> Result<()> {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id, profile.clone());
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        if self.in_use(id).await? {
            return Err(ReelvaultError::Conflict {
                message: format!("quality profile {} is referenced by movies", id),
            });
        }
        self.profiles.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn in_use(&self, id: i32) -> Result<bool> {
        Ok(self
            .movies
            .lock()
            .unwrap()
            .values()
            .any(|m| m.quality_profile_id == id))
    }
}

#[async_trait]
impl CustomFormatRepository for MemoryStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<CustomFormat>> {
        Ok(self.formats.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<CustomFormat>> {
        Ok(self.formats.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, format: &CustomFormat) -> Result<i32> {
        let mut formats = self.formats.lock().unwrap();
        if formats.values().any(|f| f.name == format.name) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("custom format {}", format.name),
            });
        }
        let id = if format.id > 0 { format.id } else { self.alloc_id() };
        let mut format = format.clone();
        format.id = id;
        formats.insert(id, format);
        Ok(id)
    }

    async fn update(&self, format: &CustomFormat) -> Result<()> {
        self.formats.lock().unwrap().insert(format.id, format.clone());
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.formats.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl IndexerRepository for MemoryStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<Indexer>> {
        Ok(self.indexers.lock().unwrap().get(&id).cloned())
    }

    async fn find_enabled(&self) -> Result<Vec<Indexer>> {
        let mut indexers: Vec<Indexer> = self
            .indexers
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.enable_search || i.enable_rss)
            .cloned()
            .collect();
        indexers.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));
        Ok(indexers)
    }

    async fn list(&self) -> Result<Vec<Indexer>> {
        Ok(self.indexers.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, indexer: &Indexer) -> Result<i32> {
        let mut indexers = self.indexers.lock().unwrap();
        if indexers.values().any(|i| i.name == indexer.name) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("indexer {}", indexer.name),
            });
        }
        let id = if indexer.id > 0 { indexer.id } else { self.alloc_id() };
        let mut indexer = indexer.clone();
        indexer.id = id;
        indexers.insert(id, indexer);
        Ok(id)
    }

    async fn update(&self, indexer: &Indexer) -> Result<()> {
        self.indexers.lock().unwrap().insert(indexer.id, indexer.clone());
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.indexers.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl DownloadClientRepository for MemoryStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<DownloadClient>> {
        Ok(self.clients.lock().unwrap().get(&id).cloned())
    }

    async fn find_enabled(&self) -> Result<Vec<DownloadClient>> {
        let mut clients: Vec<DownloadClient> = self
            .clients
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.name.cmp(&b.name)));
        Ok(clients)
    }

    async fn list(&self) -> Result<Vec<DownloadClient>> {
        Ok(self.clients.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, client: &DownloadClient) -> Result<i32> {
        let mut clients = self.clients.lock().unwrap();
        if clients.values().any(|c| c.name == client.name) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("download client {}", client.name),
            });
        }
        let id = if client.id > 0 { client.id } else { self.alloc_id() };
        let mut client = client.clone();
        client.id = id;
        clients.insert(id, client);
        Ok(id)
    }

    async fn update(&self, client: &DownloadClient) -> Result<()> {
        self.clients.lock().unwrap().insert(client.id, client.clone());
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.clients.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl NotificationConfigRepository for MemoryStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<NotificationConfig>> {
        Ok(self.notifications.lock().unwrap().get(&id).cloned())
    }

    async fn find_enabled(&self) -> Result<Vec<NotificationConfig>> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.enabled)
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<NotificationConfig>> {
        Ok(self.notifications.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, config: &NotificationConfig) -> Result<i32> {
        let mut rows = self.notifications.lock().unwrap();
        if rows.values().any(|n| n.name == config.name) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("notification {}", config.name),
            });
        }
        let id = if config.id > 0 { config.id } else { self.alloc_id() };
        let mut config = config.clone();
        config.id = id;
        rows.insert(id, config);
        Ok(id)
    }

    async fn update(&self, config: &NotificationConfig) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .insert(config.id, config.clone());
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.notifications.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ImportListRepository for MemoryStore {
    async fn find_by_id(&self, id: i32) -> Result<Option<ImportListConfig>> {
        Ok(self.import_lists.lock().unwrap().get(&id).cloned())
    }

    async fn find_enabled(&self) -> Result<Vec<ImportListConfig>> {
        Ok(self
            .import_lists
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.enabled)
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<ImportListConfig>> {
        Ok(self.import_lists.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, config: &ImportListConfig) -> Result<i32> {
        let mut rows = self.import_lists.lock().unwrap();
        if rows.values().any(|l| l.name == config.name) {
            return Err(ReelvaultError::AlreadyExists {
                resource: format!("import list {}", config.name),
            });
        }
        let id = if config.id > 0 { config.id } else { self.alloc_id() };
        let mut config = config.clone();
        config.id = id;
        rows.insert(id, config);
        Ok(id)
    }

    async fn update(&self, config: &ImportListConfig) -> Result<()> {
        self.import_lists
            .lock()
            .unwrap()
            .insert(config.id, config.clone());
        Ok(())
    }

    async fn delete(&self, id: i32) -> Result<()> {
        self.import_lists.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ReleaseRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Release>> {
        Ok(self.releases.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_guid(&self, guid: &str, indexer_id: i32) -> Result<Option<Release>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .values()
            .find(|r| r.guid == guid && r.indexer_id == indexer_id)
            .cloned())
    }

    async fn list(&self, filter: &ReleaseFilter) -> Result<Vec<Release>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .values()
            .filter(|r| filter.movie_id.map(|id| r.movie_id == Some(id)).unwrap_or(true))
            .filter(|r| filter.status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn upsert(&self, release: &Release) -> Result<()> {
        let mut releases = self.releases.lock().unwrap();
        let existing = releases
            .values()
            .find(|r| r.guid == release.guid && r.indexer_id == release.indexer_id)
            .map(|r| r.id);
        match existing {
            Some(id) => {
                let mut updated = release.clone();
                updated.id = id;
                releases.insert(id, updated);
            }
            None => {
                releases.insert(release.id, release.clone());
            }
        }
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        self.releases.lock().unwrap().insert(release.id, release.clone());
        Ok(())
    }
}

#[async_trait]
impl QueueRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<QueueItem>> {
        Ok(self.queue.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_download_id(
        &self,
        download_client_id: i32,
        download_id: &str,
    ) -> Result<Option<QueueItem>> {
        Ok(self
            .queue
            .lock()
            .unwrap()
            .values()
            .find(|q| q.download_client_id == download_client_id && q.download_id == download_id)
            .cloned())
    }

    async fn find_active(&self) -> Result<Vec<QueueItem>> {
        Ok(self
            .queue
            .lock()
            .unwrap()
            .values()
            .filter(|q| !q.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn find_by_client(&self, download_client_id: i32) -> Result<Vec<QueueItem>> {
        Ok(self
            .queue
            .lock()
            .unwrap()
            .values()
            .filter(|q| q.download_client_id == download_client_id)
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<QueueItem>> {
        Ok(self.queue.lock().unwrap().values().cloned().collect())
    }

    async fn update(&self, item: &QueueItem) -> Result<()> {
        self.queue.lock().unwrap().insert(item.id, item.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.queue.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl WantedRepository for MemoryStore {
    async fn find_by_movie_id(&self, movie_id: Uuid) -> Result<Option<WantedMovie>> {
        Ok(self.wanted.lock().unwrap().get(&movie_id).cloned())
    }

    async fn list(&self, filter: &WantedFilter) -> Result<Vec<WantedMovie>> {
        let mut rows: Vec<WantedMovie> = self
            .wanted
            .lock()
            .unwrap()
            .values()
            .filter(|w| filter.status.map(|s| w.status == s).unwrap_or(true))
            .filter(|w| filter.priority.map(|p| w.priority == p).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rows)
    }

    async fn find_search_candidates(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<WantedMovie>> {
        let mut rows: Vec<WantedMovie> = self
            .wanted
            .lock()
            .unwrap()
            .values()
            .filter(|w| {
                !w.search_in_flight
                    && w.search_attempts < w.max_search_attempts
                    && w.next_search_time.map(|t| now >= t).unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| {
                match (a.next_search_time, b.next_search_time) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(&y),
                }
            })
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn upsert(&self, wanted: &WantedMovie) -> Result<()> {
        self.wanted
            .lock()
            .unwrap()
            .insert(wanted.movie_id, wanted.clone());
        Ok(())
    }

    async fn update(&self, wanted: &WantedMovie) -> Result<()> {
        crate::domain::repositories::WantedRepository::upsert(self, wanted).await
    }

    async fn delete_by_movie_id(&self, movie_id: Uuid) -> Result<()> {
        self.wanted.lock().unwrap().remove(&movie_id);
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    async fn queued(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.queued_at.cmp(&b.queued_at))
        });
        Ok(tasks)
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| ReelvaultError::not_found(format!("task {}", id)))?;
        if task.status != from {
            return Ok(false);
        }
        task.status = to;
        if to == TaskStatus::Started {
            task.started_at = Some(at);
        }
        Ok(true)
    }

    async fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        exception: Option<String>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| ReelvaultError::not_found(format!("task {}", id)))?;
        task.status = status;
        task.exception = exception;
        task.ended_at = Some(ended_at);
        if let Some(started) = task.started_at {
            task.duration_ms = Some((ended_at - started).num_milliseconds());
        }
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: &TaskProgress) -> Result<()> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&id) {
            task.progress = progress.clone();
        }
        Ok(())
    }

    async fn fail_orphaned(&self, reason: &str, at: DateTime<Utc>) -> Result<u64> {
        let mut count = 0;
        for task in self.tasks.lock().unwrap().values_mut() {
            if matches!(task.status, TaskStatus::Started | TaskStatus::Cancelling) {
                task.status = TaskStatus::Failed;
                task.exception = Some(reason.to_string());
                task.ended_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn has_active_for_command(&self, command_name: &str) -> Result<bool> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .any(|t| t.command_name == command_name && t.status.is_active()))
    }

    async fn upsert_scheduled(&self, scheduled: &ScheduledTask) -> Result<()> {
        let mut map = self.scheduled.lock().unwrap();
        match map.get_mut(&scheduled.name) {
            Some(existing) => {
                existing.command_name = scheduled.command_name.clone();
                existing.interval_seconds = scheduled.interval_seconds;
                existing.enabled = scheduled.enabled;
                existing.body = scheduled.body.clone();
            }
            None => {
                map.insert(scheduled.name.clone(), scheduled.clone());
            }
        }
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.scheduled.lock().unwrap().values().cloned().collect())
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        Ok(self
            .scheduled
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.enabled && s.next_run <= now)
            .cloned()
            .collect())
    }

    async fn set_scheduled_run(
        &self,
        name: &str,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(scheduled) = self.scheduled.lock().unwrap().get_mut(name) {
            scheduled.last_run = Some(last_run);
            scheduled.next_run = next_run;
        }
        Ok(())
    }

    async fn reschedule_missed(&self, now: DateTime<Utc>) -> Result<()> {
        for scheduled in self.scheduled.lock().unwrap().values_mut() {
            if scheduled.next_run < now {
                scheduled.next_run = now;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for MemoryStore {
    async fn append(&self, event: &History) -> Result<()> {
        self.history.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn list_for_movie(&self, movie_id: Uuid) -> Result<Vec<History>> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.movie_id == Some(movie_id))
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<History>> {
        let mut rows: Vec<History> = self.history.lock().unwrap().clone();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl BlocklistRepository for MemoryStore {
    async fn insert(&self, entry: &BlocklistEntry) -> Result<()> {
        self.blocklist.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn contains_guid(&self, guid: &str) -> Result<bool> {
        Ok(self.blocklist.lock().unwrap().iter().any(|b| b.guid == guid))
    }

    async fn list(&self) -> Result<Vec<BlocklistEntry>> {
        Ok(self.blocklist.lock().unwrap().clone())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.blocklist.lock().unwrap().retain(|b| b.id != id);
        Ok(())
    }
}

#[async_trait]
impl CalendarCacheRepository for MemoryStore {
    async fn get_fresh(
        &self,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CalendarCacheRow>> {
        Ok(self
            .calendar
            .lock()
            .unwrap()
            .get(cache_key)
            .filter(|row| row.expires_at > now)
            .cloned())
    }

    async fn upsert(&self, row: &CalendarCacheRow) -> Result<()> {
        self.calendar
            .lock()
            .unwrap()
            .insert(row.cache_key.clone(), row.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.calendar.lock().unwrap().clear();
        Ok(())
    }
}

#[async_trait]
impl ConfigRepository for MemoryStore {
    async fn naming(&self) -> Result<NamingConfig> {
        Ok(self.naming.lock().unwrap().clone())
    }

    async fn set_naming(&self, config: &NamingConfig) -> Result<()> {
        *self.naming.lock().unwrap() = config.clone();
        Ok(())
    }

    async fn media_management(&self) -> Result<MediaManagementConfig> {
        Ok(self.media_management.lock().unwrap().clone())
    }

    async fn set_media_management(&self, config: &MediaManagementConfig) -> Result<()> {
        *self.media_management.lock().unwrap() = config.clone();
        Ok(())
    }

    async fn host(&self) -> Result<HostConfig> {
        Ok(self.host.lock().unwrap().clone())
    }

    async fn set_host(&self, config: &HostConfig) -> Result<()> {
        *self.host.lock().unwrap() = config.clone();
        Ok(())
    }

    async fn root_folders(&self) -> Result<Vec<RootFolder>> {
        Ok(self.root_folders.lock().unwrap().values().cloned().collect())
    }

    async fn add_root_folder(&self, folder: &RootFolder) -> Result<i32> {
        let id = if folder.id > 0 { folder.id } else { self.alloc_id() };
        let mut folder = folder.clone();
        folder.id = id;
        self.root_folders.lock().unwrap().insert(id, folder);
        Ok(id)
    }

    async fn remove_root_folder(&self, id: i32) -> Result<()> {
        self.root_folders.lock().unwrap().remove(&id);
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn commit_grab(&self, commit: GrabCommit) -> Result<QueueItem> {
        ReleaseRepository::update(self, &commit.release).await?;
        // Idempotent on (download_client_id, download_id)
        let existing = self
            .find_by_download_id(
                commit.queue_item.download_client_id,
                &commit.queue_item.download_id,
            )
            .await?;
        let item = match existing {
            Some(mut current) => {
                current.size_bytes = commit.queue_item.size_bytes;
                current.release_id = commit.queue_item.release_id;
                QueueRepository::update(self, &current).await?;
                current
            }
            None => {
                QueueRepository::update(self, &commit.queue_item).await?;
                commit.queue_item.clone()
            }
        };
        HistoryRepository::append(self, &commit.history).await?;
        Ok(item)
    }

    async fn commit_import(&self, commit: ImportCommit) -> Result<()> {
        if let Some(old_id) = commit.delete_file_id {
            MovieFileRepository::delete(self, old_id).await?;
        }
        MovieFileRepository::create(self, &commit.new_file).await?;
        MovieRepository::update(self, &commit.movie).await?;
        if commit.delete_wanted {
            self.delete_by_movie_id(commit.movie.id).await?;
        } else if let Some(wanted) = &commit.wanted_update {
            WantedRepository::upsert(self, wanted).await?;
        }
        HistoryRepository::append(self, &commit.history).await?;
        QueueRepository::update(self, &commit.queue_item).await?;
        Ok(())
    }
}
