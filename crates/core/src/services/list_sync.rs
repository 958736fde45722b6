//! Import-list synchronization
//!
//! A recurring job pulls each enabled import list and adds discovered
//! movies that are not in the library yet, applying the list's quality
//! profile, root folder and monitoring policy.

use crate::domain::repositories::{ImportListRepository, MovieRepository};
use crate::error::Result;
use crate::events::{EventBus, SystemEvent};
use crate::models::movie::Movie;
use crate::registry::ExtRegistry;
use crate::scheduler::{CancellationHandle, CommandHandler, TaskContext};
use crate::wanted::WantedService;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one sync pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListSyncSummary {
    pub discovered: usize,
    pub added: usize,
    pub skipped_existing: usize,
}

pub struct ImportListSync {
    lists: Arc<dyn ImportListRepository>,
    movies: Arc<dyn MovieRepository>,
    wanted: Arc<WantedService>,
    registry: Arc<ExtRegistry>,
    events: EventBus,
}

impl ImportListSync {
    pub fn new(
        lists: Arc<dyn ImportListRepository>,
        movies: Arc<dyn MovieRepository>,
        wanted: Arc<WantedService>,
        registry: Arc<ExtRegistry>,
        events: EventBus,
    ) -> Self {
        Self {
            lists,
            movies,
            wanted,
            registry,
            events,
        }
    }

    pub async fn sync_all(&self, cancellation: &CancellationHandle) -> Result<ListSyncSummary> {
        let mut summary = ListSyncSummary::default();
        for config in self.lists.find_enabled().await? {
            cancellation.check("list_sync")?;
            let Some(adapter) = self.registry.import_list(config.id).await else {
                debug!(list = %config.name, "no adapter registered");
                continue;
            };
            let discovered = match adapter.fetch().await {
                Ok(discovered) => discovered,
                Err(e) => {
                    warn!(list = %config.name, "import list fetch failed: {}", e);
                    continue;
                }
            };
            summary.discovered += discovered.len();

            for entry in discovered {
                cancellation.check("list_sync")?;
                if self.movies.find_by_tmdb_id(entry.tmdb_id).await?.is_some() {
                    summary.skipped_existing += 1;
                    continue;
                }
                let mut movie = Movie::new(
                    entry.tmdb_id,
                    entry.title.clone(),
                    config.quality_profile_id,
                    config.root_folder.clone(),
                );
                movie.year = entry.year;
                movie.monitored = config.monitor_added;
                if let Some(year) = entry.year {
                    movie.title_slug =
                        crate::models::movie::slugify(&format!("{} {}", entry.title, year));
                }
                match self.movies.create(&movie).await {
                    Ok(()) => {
                        self.wanted.refresh_for_movie(movie.id).await?;
                        self.events
                            .publish(SystemEvent::MovieAdded { movie_id: movie.id });
                        debug!(movie = %movie.title, list = %config.name, "added from import list");
                        summary.added += 1;
                    }
                    Err(e) => {
                        warn!(movie = %entry.title, "could not add discovered movie: {}", e);
                    }
                }
            }
        }
        if summary.added > 0 {
            info!(
                added = summary.added,
                discovered = summary.discovered,
                "import list sync finished"
            );
        }
        Ok(summary)
    }
}

/// Task handler for the recurring list sync.
pub struct ListSyncHandler {
    sync: Arc<ImportListSync>,
}

impl ListSyncHandler {
    pub const COMMAND: &'static str = "ImportListSync";

    pub fn new(sync: Arc<ImportListSync>) -> Self {
        Self { sync }
    }
}

#[async_trait::async_trait]
impl CommandHandler for ListSyncHandler {
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        let summary = self.sync.sync_all(&ctx.cancellation).await?;
        ctx.progress
            .update(
                100.0,
                format!(
                    "List sync: {} discovered, {} added",
                    summary.discovered, summary.added
                ),
            )
            .await;
        ctx.progress.flush().await;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(900)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DiscoveredMovie;
    use crate::clock::SystemClock;
    use crate::domain::repositories::*;
    use crate::models::{ImportListConfig, ProfileItem, QualityId, QualityProfile, WantedStatus};
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use crate::testing::{MemoryStore, ScriptedImportList};
    use crate::wanted::WantedLoopConfig;

    #[tokio::test]
    async fn discovered_movies_are_added_once() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ExtRegistry::new());
        let clock: crate::SharedClock = Arc::new(SystemClock);
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            clock.clone(),
            SchedulerConfig::default(),
        ));

        let mut profile = QualityProfile::new(
            "Any".to_string(),
            vec![ProfileItem { quality: QualityId::Bluray1080p, allowed: true }],
            QualityId::Bluray1080p,
        );
        profile.id = 1;
        QualityProfileRepository::create(&*store, &profile).await.unwrap();

        let mut list = ImportListConfig::new(
            "watchlist".to_string(),
            "scripted-list".to_string(),
            1,
            "/movies".to_string(),
        );
        list.id = ImportListRepository::create(&*store, &list).await.unwrap();
        registry
            .register_import_list(
                list.id,
                Arc::new(ScriptedImportList::with_movies(vec![
                    DiscoveredMovie {
                        tmdb_id: 550,
                        title: "Fight Club".to_string(),
                        year: Some(1999),
                    },
                    DiscoveredMovie {
                        tmdb_id: 603,
                        title: "The Matrix".to_string(),
                        year: Some(1999),
                    },
                ])),
            )
            .await;

        let wanted = Arc::new(WantedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            scheduler.queue(),
            clock,
            WantedLoopConfig::default(),
        ));
        let sync = ImportListSync::new(
            store.clone(),
            store.clone(),
            wanted,
            registry,
            EventBus::new(),
        );

        let summary = sync.sync_all(&CancellationHandle::none()).await.unwrap();
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.added, 2);
        assert_eq!(MovieRepository::count(&*store).await.unwrap(), 2);

        // Added movies are monitored and hunted.
        let movie = MovieRepository::find_by_tmdb_id(&*store, 550)
            .await
            .unwrap()
            .unwrap();
        assert!(movie.monitored);
        let row = WantedRepository::find_by_movie_id(&*store, movie.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, WantedStatus::Missing);

        // A second pass discovers the same titles but adds nothing.
        let summary = sync.sync_all(&CancellationHandle::none()).await.unwrap();
        assert_eq!(summary.added, 0);
        assert_eq!(summary.skipped_existing, 2);
        assert_eq!(MovieRepository::count(&*store).await.unwrap(), 2);
    }
}
