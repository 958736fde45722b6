//! Movie search: query indexers, decide, persist releases, grab the best
//!
//! Shared by the `SearchMovie` task handler and the interactive release
//! search on the programmatic surface. Per-indexer errors never fail a
//! search pass; they are captured as timestamped search failures on the
//! wanted row.

use crate::adapters::{RawRelease, SearchRequest};
use crate::clock::SharedClock;
use crate::domain::repositories::*;
use crate::error::{ReelvaultError, Result};
use crate::models::decision::{CandidateOrder, Decision, DecisionRequest, ReleaseDecider};
use crate::models::indexer::Indexer;
use crate::models::movie::Movie;
use crate::models::release::Release;
use crate::models::wanted::{SearchFailure, WantedStatus};
use crate::scheduler::{CancellationHandle, CommandHandler, ProgressReporter, TaskContext};
use crate::services::grab::GrabService;
use crate::registry::ExtRegistry;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Time box per indexer call.
    pub indexer_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            indexer_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one search pass over all applicable indexers.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub releases: Vec<Release>,
    pub grabbed: Option<Release>,
    pub failures: Vec<SearchFailure>,
}

pub struct SearchRunner {
    movies: Arc<dyn MovieRepository>,
    profiles: Arc<dyn QualityProfileRepository>,
    files: Arc<dyn MovieFileRepository>,
    formats: Arc<dyn CustomFormatRepository>,
    indexers: Arc<dyn IndexerRepository>,
    releases: Arc<dyn ReleaseRepository>,
    wanted: Arc<dyn WantedRepository>,
    blocklist: Arc<dyn BlocklistRepository>,
    registry: Arc<ExtRegistry>,
    decider: Arc<dyn ReleaseDecider>,
    grab: Arc<GrabService>,
    clock: SharedClock,
    config: SearchConfig,
}

impl SearchRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        movies: Arc<dyn MovieRepository>,
        profiles: Arc<dyn QualityProfileRepository>,
        files: Arc<dyn MovieFileRepository>,
        formats: Arc<dyn CustomFormatRepository>,
        indexers: Arc<dyn IndexerRepository>,
        releases: Arc<dyn ReleaseRepository>,
        wanted: Arc<dyn WantedRepository>,
        blocklist: Arc<dyn BlocklistRepository>,
        registry: Arc<ExtRegistry>,
        decider: Arc<dyn ReleaseDecider>,
        grab: Arc<GrabService>,
        clock: SharedClock,
        config: SearchConfig,
    ) -> Self {
        Self {
            movies,
            profiles,
            files,
            formats,
            indexers,
            releases,
            wanted,
            blocklist,
            registry,
            decider,
            grab,
            clock,
            config,
        }
    }

    /// Run one full search pass for a movie: query, decide, persist, grab.
    #[instrument(skip(self, cancellation, progress), fields(movie_id = %movie_id))]
    pub async fn search_movie(
        &self,
        movie_id: Uuid,
        cancellation: &CancellationHandle,
        progress: Option<&ProgressReporter>,
    ) -> Result<SearchOutcome> {
        let movie = self
            .movies
            .find_by_id(movie_id)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("movie {}", movie_id)))?;
        let profile = self
            .profiles
            .find_by_id(movie.quality_profile_id)
            .await?
            .ok_or_else(|| ReelvaultError::InvalidReference {
                field: "quality_profile_id".to_string(),
                message: format!("quality profile {} is gone", movie.quality_profile_id),
            })?;
        let current_file = self.files.find_by_movie_id(movie.id).await?;
        let formats = self.formats.list().await?;

        if let Some(progress) = progress {
            progress.update(5.0, format!("Searching for {}", movie.title)).await;
        }

        // Query every searchable indexer; collect failures instead of
        // failing the pass.
        let (raw, failures) = self.query_indexers(&movie, cancellation).await?;
        cancellation.check("search")?;

        if let Some(progress) = progress {
            progress
                .update(50.0, format!("Scoring {} candidates", raw.len()))
                .await;
        }

        let mut outcome = SearchOutcome {
            failures,
            ..Default::default()
        };
        let mut approved: Vec<(CandidateOrder, Release)> = Vec::new();

        for (indexer, candidate) in raw {
            cancellation.check("search")?;
            if self.blocklist.contains_guid(&candidate.guid).await? {
                debug!(guid = %candidate.guid, "skipping blocklisted release");
                continue;
            }
            let (release, order) = self.evaluate_candidate(
                &movie,
                &profile,
                &formats,
                current_file.as_ref(),
                indexer.id,
                &candidate,
            );
            if let Some(order) = order {
                approved.push((order, release.clone()));
            }
            self.releases.upsert(&release).await?;
            outcome.releases.push(release);
        }

        // Deterministic best-candidate selection.
        approved.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some((_, best)) = approved.into_iter().next() {
            if let Some(progress) = progress {
                progress.update(80.0, format!("Grabbing {}", best.title)).await;
            }
            match self.grab.grab(&best, &movie, None).await {
                Ok(_) => {
                    self.resolve_wanted_after_grab(&movie, &best).await?;
                    outcome.grabbed = Some(best);
                }
                Err(err) => {
                    warn!(release = %best.title, "grab failed after approval: {}", err);
                }
            }
        }

        self.record_attempt(movie.id, &outcome).await?;
        if let Some(progress) = progress {
            progress
                .update(
                    100.0,
                    format!(
                        "Search finished: {} candidates, {}",
                        outcome.releases.len(),
                        if outcome.grabbed.is_some() { "grabbed" } else { "nothing grabbed" }
                    ),
                )
                .await;
        }
        Ok(outcome)
    }

    /// Parse, decide and build the persistable release row for one raw
    /// candidate. Returns the sort key when the candidate was approved.
    fn evaluate_candidate(
        &self,
        movie: &Movie,
        profile: &crate::models::quality::QualityProfile,
        formats: &[crate::models::custom_format::CustomFormat],
        current_file: Option<&crate::models::movie_file::MovieFile>,
        indexer_id: i32,
        candidate: &RawRelease,
    ) -> (Release, Option<CandidateOrder>) {
        let parsed = self.decider.parse_title(&candidate.title);
        let mut release = release_from_raw(candidate, indexer_id, self.clock.clone());
        release.movie_id = Some(movie.id);
        release.set_quality(parsed.quality);
        release.languages = parsed.languages.clone();
        release.release_group = parsed.release_group.clone();

        let decision = self.decider.decide(&DecisionRequest {
            parsed: &parsed,
            release_title: &candidate.title,
            size_bytes: candidate.size_bytes,
            age_hours: release.age_hours,
            protocol: candidate.protocol,
            seeders: candidate.seeders,
            movie,
            profile,
            formats,
            current_file,
        });

        match decision {
            Decision::Accepted { format_score, .. } => {
                let order = CandidateOrder {
                    format_score,
                    quality_weight: release.quality_weight,
                    protocol: release.protocol,
                    seeders: release.seeders.unwrap_or(0),
                    size_bytes: release.size_bytes,
                    age_hours: release.age_hours.unwrap_or(i64::MAX),
                    guid: release.guid.clone(),
                };
                (release, Some(order))
            }
            Decision::Rejected { reasons } => {
                release.reject(reasons);
                (release, None)
            }
        }
    }

    /// RSS sweep: pull each enabled indexer's feed once and run the normal
    /// decision path for every candidate that maps onto a hunted movie.
    pub async fn rss_sync(&self, cancellation: &CancellationHandle) -> Result<usize> {
        let formats = self.formats.list().await?;
        let wanted_rows = self.wanted.list(&Default::default()).await?;
        if wanted_rows.is_empty() {
            return Ok(0);
        }

        // Match index over the hunted movies: tmdb id and slugged
        // title/year both resolve a feed item.
        let mut by_tmdb: std::collections::HashMap<i32, Movie> = std::collections::HashMap::new();
        let mut by_slug: std::collections::HashMap<(String, Option<i32>), Uuid> =
            std::collections::HashMap::new();
        for row in &wanted_rows {
            let Some(mut movie) = self.movies.find_by_id(row.movie_id).await? else {
                continue;
            };
            movie.project_availability(&*self.clock);
            if !movie.is_available {
                continue;
            }
            by_slug.insert(
                (crate::models::movie::slugify(&movie.title), movie.year),
                movie.id,
            );
            by_tmdb.insert(movie.tmdb_id, movie);
        }

        let mut approved_per_movie: std::collections::HashMap<Uuid, Vec<(CandidateOrder, Release)>> =
            std::collections::HashMap::new();
        for indexer in self.indexers.find_enabled().await? {
            cancellation.check("rss_sync")?;
            if !indexer.enable_rss {
                continue;
            }
            let Some(registered) = self.registry.indexer(indexer.id).await else {
                continue;
            };
            if !registered.adapter.capabilities().supports_rss {
                continue;
            }
            let feed = {
                let _permit = registered.limiter.acquire().await.map_err(|_| {
                    ReelvaultError::internal("indexer limiter closed")
                })?;
                tokio::time::timeout(self.config.indexer_timeout, registered.adapter.rss()).await
            };
            let feed = match feed {
                Ok(Ok(feed)) => feed,
                Ok(Err(err)) => {
                    warn!(indexer = %indexer.name, "rss fetch failed: {}", err);
                    continue;
                }
                Err(_) => {
                    warn!(indexer = %indexer.name, "rss fetch timed out");
                    continue;
                }
            };

            for candidate in feed {
                cancellation.check("rss_sync")?;
                if self.blocklist.contains_guid(&candidate.guid).await? {
                    continue;
                }
                let parsed = self.decider.parse_title(&candidate.title);
                let movie = parsed
                    .tmdb_id
                    .and_then(|id| by_tmdb.get(&id))
                    .or_else(|| {
                        by_slug
                            .get(&(
                                crate::models::movie::slugify(&parsed.primary_title),
                                parsed.year,
                            ))
                            .and_then(|id| by_tmdb.values().find(|m| m.id == *id))
                    })
                    .cloned();
                let Some(movie) = movie else {
                    continue;
                };
                let Some(profile) = self.profiles.find_by_id(movie.quality_profile_id).await?
                else {
                    continue;
                };
                let current_file = self.files.find_by_movie_id(movie.id).await?;
                let (release, order) = self.evaluate_candidate(
                    &movie,
                    &profile,
                    &formats,
                    current_file.as_ref(),
                    indexer.id,
                    &candidate,
                );
                self.releases.upsert(&release).await?;
                if let Some(order) = order {
                    approved_per_movie
                        .entry(movie.id)
                        .or_default()
                        .push((order, release));
                }
            }
        }

        let mut grabbed = 0;
        for (movie_id, mut candidates) in approved_per_movie {
            cancellation.check("rss_sync")?;
            let Some(movie) = self.movies.find_by_id(movie_id).await? else {
                continue;
            };
            candidates.sort_by(|a, b| a.0.cmp(&b.0));
            let (_, best) = candidates.remove(0);
            match self.grab.grab(&best, &movie, None).await {
                Ok(_) => {
                    self.resolve_wanted_after_grab(&movie, &best).await?;
                    grabbed += 1;
                }
                Err(err) => {
                    warn!(release = %best.title, "rss grab failed: {}", err);
                }
            }
        }
        Ok(grabbed)
    }

    async fn query_indexers(
        &self,
        movie: &Movie,
        cancellation: &CancellationHandle,
    ) -> Result<(Vec<(Indexer, RawRelease)>, Vec<SearchFailure>)> {
        let request = SearchRequest {
            title: Some(movie.title.clone()),
            imdb_id: movie.imdb_id.clone(),
            tmdb_id: Some(movie.tmdb_id),
            year: movie.year,
            categories: Vec::new(),
        };

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for indexer in self.indexers.find_enabled().await? {
            cancellation.check("search")?;
            if !indexer.enable_search {
                continue;
            }
            let Some(registered) = self.registry.indexer(indexer.id).await else {
                debug!(indexer = %indexer.name, "no adapter registered");
                continue;
            };
            if !registered.adapter.capabilities().supports_search {
                continue;
            }

            let outcome = {
                let _permit = registered.limiter.acquire().await.map_err(|_| {
                    ReelvaultError::internal("indexer limiter closed")
                })?;
                tokio::time::timeout(
                    self.config.indexer_timeout,
                    registered.adapter.search(&request),
                )
                .await
            };

            match outcome {
                Ok(Ok(candidates)) => {
                    debug!(indexer = %indexer.name, count = candidates.len(), "indexer responded");
                    results.extend(candidates.into_iter().map(|c| (indexer.clone(), c)));
                }
                Ok(Err(err)) => {
                    warn!(indexer = %indexer.name, "indexer search failed: {}", err);
                    failures.push(SearchFailure {
                        indexer_id: indexer.id,
                        indexer_name: indexer.name.clone(),
                        message: err.to_string(),
                        occurred_at: self.clock.now(),
                    });
                }
                Err(_elapsed) => {
                    warn!(indexer = %indexer.name, "indexer search timed out");
                    failures.push(SearchFailure {
                        indexer_id: indexer.id,
                        indexer_name: indexer.name.clone(),
                        message: format!(
                            "timed out after {:?}",
                            self.config.indexer_timeout
                        ),
                        occurred_at: self.clock.now(),
                    });
                }
            }
        }
        Ok((results, failures))
    }

    /// After a grab the wanted row is removed, unless the movie still has a
    /// below-cutoff file, in which case it stays as cutoffUnmet.
    async fn resolve_wanted_after_grab(&self, movie: &Movie, grabbed: &Release) -> Result<()> {
        let Some(mut wanted) = self.wanted.find_by_movie_id(movie.id).await? else {
            return Ok(());
        };
        let profile = self.profiles.find_by_id(movie.quality_profile_id).await?;
        let below_cutoff = profile
            .map(|p| grabbed.quality_weight < p.cutoff_weight())
            .unwrap_or(false);
        if movie.has_file && below_cutoff {
            wanted.status = WantedStatus::CutoffUnmet;
            wanted.search_in_flight = false;
            wanted.updated_at = self.clock.now();
            self.wanted.update(&wanted).await?;
        } else {
            self.wanted.delete_by_movie_id(movie.id).await?;
        }
        Ok(())
    }

    async fn record_attempt(&self, movie_id: Uuid, outcome: &SearchOutcome) -> Result<()> {
        if let Some(mut wanted) = self.wanted.find_by_movie_id(movie_id).await? {
            wanted.record_search(self.clock.now(), outcome.failures.clone());
            self.wanted.update(&wanted).await?;
        }
        Ok(())
    }

    /// Drop the in-flight marker after a search task died without recording
    /// an attempt, so the movie stays eligible for the next tick.
    pub async fn clear_in_flight(&self, movie_id: Uuid) -> Result<()> {
        if let Some(mut wanted) = self.wanted.find_by_movie_id(movie_id).await? {
            if wanted.search_in_flight {
                wanted.search_in_flight = false;
                wanted.updated_at = self.clock.now();
                self.wanted.update(&wanted).await?;
            }
        }
        Ok(())
    }
}

fn release_from_raw(raw: &RawRelease, indexer_id: i32, clock: SharedClock) -> Release {
    let mut release = Release::new(
        raw.guid.clone(),
        indexer_id,
        raw.title.clone(),
        raw.download_url.clone(),
        raw.protocol,
    );
    release.info_url = raw.info_url.clone();
    release.size_bytes = raw.size_bytes;
    release.publish_date = raw.publish_date;
    release.seeders = raw.seeders;
    release.leechers = raw.leechers;
    release.age_hours = raw
        .publish_date
        .map(|d| (clock.now() - d).num_hours().max(0));
    release
}

/// Body of a `SearchMovie` task.
#[derive(Debug, Deserialize)]
struct SearchMovieBody {
    movie_id: Uuid,
}

/// Task handler for `SearchMovie`. Reentrant: searches for distinct movies
/// are independent and the wanted row's in-flight flag already prevents
/// duplicates per movie.
pub struct SearchMovieHandler {
    runner: Arc<SearchRunner>,
}

impl SearchMovieHandler {
    pub const COMMAND: &'static str = "SearchMovie";

    pub fn new(runner: Arc<SearchRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl CommandHandler for SearchMovieHandler {
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        let body: SearchMovieBody =
            serde_json::from_value(ctx.body.clone()).map_err(|e| ReelvaultError::Validation {
                field: "body".to_string(),
                message: format!("invalid SearchMovie body: {}", e),
            })?;
        let outcome = match self
            .runner
            .search_movie(body.movie_id, &ctx.cancellation, Some(&ctx.progress))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = self.runner.clear_in_flight(body.movie_id).await;
                return Err(e);
            }
        };
        ctx.progress.flush().await;
        info!(
            movie_id = %body.movie_id,
            candidates = outcome.releases.len(),
            grabbed = outcome.grabbed.is_some(),
            "search task finished"
        );
        Ok(())
    }

    fn reentrant(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(600)
    }
}

/// Task handler for the recurring RSS sweep.
pub struct RssSyncHandler {
    runner: Arc<SearchRunner>,
}

impl RssSyncHandler {
    pub const COMMAND: &'static str = "RssSync";

    pub fn new(runner: Arc<SearchRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl CommandHandler for RssSyncHandler {
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        let grabbed = self.runner.rss_sync(&ctx.cancellation).await?;
        ctx.progress
            .update(100.0, format!("RSS sweep grabbed {} releases", grabbed))
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
    use crate::clock::SystemClock;
    use crate::events::EventBus;
    use crate::models::movie::MovieStatus;
    use crate::models::quality::{ProfileItem, QualityId, QualityProfile};
    use crate::models::task::TaskStatus;
    use crate::models::{Language, ParsedMovieInfo};
    use crate::scheduler::{Scheduler, SchedulerConfig, TaskSpec};
    use crate::testing::{MemoryStore, ScriptedDownloadClient, ScriptedIndexer};
    use crate::wanted::{WantedLoopConfig, WantedService};
    use crate::SharedClock;
    use tokio::time::{sleep, timeout as tokio_timeout};

    /// Accept-everything decider; the real engine lives in the decision
    /// crate and is exercised in the import crate's integration tests.
    struct StubDecider;

    impl ReleaseDecider for StubDecider {
        fn parse_title(&self, title: &str) -> ParsedMovieInfo {
            ParsedMovieInfo {
                primary_title: title.to_string(),
                quality: QualityId::Bluray1080p,
                languages: vec![Language::English],
                ..Default::default()
            }
        }

        fn decide(&self, _request: &DecisionRequest<'_>) -> Decision {
            Decision::Accepted {
                upgrade: false,
                format_score: 0,
                matched_format_ids: Vec::new(),
            }
        }
    }

    struct Rig {
        store: Arc<MemoryStore>,
        scheduler: Arc<Scheduler>,
        runner: Arc<SearchRunner>,
        indexer: Arc<ScriptedIndexer>,
        movie: Movie,
    }

    async fn rig() -> Rig {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ExtRegistry::new());
        let clock: SharedClock = Arc::new(SystemClock);
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            clock.clone(),
            SchedulerConfig {
                workers: 2,
                grace_period: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
            },
        ));

        let mut profile = QualityProfile::new(
            "Any".to_string(),
            vec![ProfileItem { quality: QualityId::Bluray1080p, allowed: true }],
            QualityId::Bluray1080p,
        );
        profile.id = 1;
        QualityProfileRepository::create(&*store, &profile).await.unwrap();

        let mut movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        movie.status = MovieStatus::Released;
        MovieRepository::create(&*store, &movie).await.unwrap();

        let mut indexer_row = Indexer::new(
            "scripted".to_string(),
            "scripted-indexer".to_string(),
            crate::models::Protocol::Torrent,
        );
        indexer_row.id = IndexerRepository::create(&*store, &indexer_row).await.unwrap();
        let indexer = Arc::new(ScriptedIndexer::new());
        registry.register_indexer(indexer_row.id, indexer.clone()).await;

        let mut client = crate::models::DownloadClient::new(
            "qbit".to_string(),
            "torrent-client".to_string(),
            crate::models::Protocol::Torrent,
        );
        client.id = DownloadClientRepository::create(&*store, &client).await.unwrap();
        registry
            .register_download_client(client.id, Arc::new(ScriptedDownloadClient::new()))
            .await;

        let grab = Arc::new(GrabService::new(
            store.clone(),
            store.clone(),
            registry.clone(),
            store.clone(),
            EventBus::new(),
            clock.clone(),
        ));
        let runner = Arc::new(SearchRunner::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            registry,
            Arc::new(StubDecider),
            grab,
            clock.clone(),
            SearchConfig {
                indexer_timeout: Duration::from_secs(2),
            },
        ));

        // Wanted row for pacing assertions.
        let wanted = WantedService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            scheduler.queue(),
            clock,
            WantedLoopConfig::default(),
        );
        wanted.refresh_for_movie(movie.id).await.unwrap();

        Rig {
            store,
            scheduler,
            runner,
            indexer,
            movie,
        }
    }

    fn raw(guid: &str) -> RawRelease {
        RawRelease {
            guid: guid.to_string(),
            title: "Fight.Club.1999.1080p.BluRay.x264-GROUP".to_string(),
            download_url: "http://indexer/dl".to_string(),
            info_url: None,
            size_bytes: 8_500_000_000,
            publish_date: None,
            seeders: Some(12),
            leechers: None,
            protocol: crate::models::Protocol::Torrent,
        }
    }

    #[tokio::test]
    async fn search_grabs_best_and_paces_the_wanted_row() {
        let rig = rig().await;
        rig.indexer.set_releases(vec![raw("a"), raw("b")]);

        let outcome = rig
            .runner
            .search_movie(rig.movie.id, &CancellationHandle::none(), None)
            .await
            .unwrap();
        assert_eq!(outcome.releases.len(), 2);
        // Full tie except the guid: deterministic pick of "a".
        assert_eq!(outcome.grabbed.as_ref().unwrap().guid, "a");

        // Wanted row resolved by the grab (movie had no file).
        assert!(WantedRepository::find_by_movie_id(&*rig.store, rig.movie.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn indexer_failures_are_captured_not_fatal() {
        let rig = rig().await;
        rig.indexer.fail_with("tracker down");

        let outcome = rig
            .runner
            .search_movie(rig.movie.id, &CancellationHandle::none(), None)
            .await
            .unwrap();
        assert!(outcome.releases.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].message.contains("tracker down"));

        // The attempt was still recorded with its failures and backoff.
        let row = WantedRepository::find_by_movie_id(&*rig.store, rig.movie.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.search_attempts, 1);
        assert_eq!(row.search_failures.len(), 1);
        assert!(row.next_search_time.is_some());
        assert!(!row.search_in_flight);
    }

    #[tokio::test]
    async fn cancellation_mid_search_leaves_no_rows() {
        let rig = rig().await;
        // The indexer call blocks long enough for the cancel to land.
        rig.indexer.set_releases(vec![raw("a")]);
        rig.indexer.block_for(Duration::from_millis(300));

        rig.scheduler
            .register_handler(
                SearchMovieHandler::COMMAND,
                Arc::new(SearchMovieHandler::new(rig.runner.clone())),
            )
            .await;
        let _handles = rig.scheduler.start().await.unwrap();

        let task_id = rig
            .scheduler
            .enqueue(TaskSpec::new(
                SearchMovieHandler::COMMAND,
                serde_json::json!({ "movie_id": rig.movie.id }),
            ))
            .await
            .unwrap();

        // Wait for the task to start, then cancel while the indexer call is
        // in flight.
        tokio_timeout(Duration::from_secs(2), async {
            loop {
                let task = rig.scheduler.status(task_id).await.unwrap();
                if task.status == TaskStatus::Started {
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        rig.scheduler.cancel(task_id).await.unwrap();

        let task = tokio_timeout(Duration::from_secs(2), async {
            loop {
                let task = rig.scheduler.status(task_id).await.unwrap();
                if task.status.is_terminal() {
                    return task;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(task.status, TaskStatus::Aborted);

        // Give the detached handler time to run past the blocked call, then
        // confirm nothing was persisted.
        sleep(Duration::from_millis(400)).await;
        let releases = ReleaseRepository::list(&*rig.store, &ReleaseFilter::default())
            .await
            .unwrap();
        assert!(releases.is_empty());
        let history = HistoryRepository::list_recent(&*rig.store, 10).await.unwrap();
        assert!(history.is_empty());
        rig.scheduler.shutdown();
    }
}
