//! Wanted-movies loop
//!
//! Maintains the invariant that a wanted row exists exactly when a
//! monitored movie has no file or sits below its profile's cutoff, and
//! paces search attempts with the quadratic backoff. A recurring tick
//! enqueues `SearchMovie` tasks for the most urgent eligible rows.

use crate::clock::SharedClock;
use crate::domain::repositories::{
    MovieFileRepository, MovieRepository, QualityProfileRepository, WantedFilter, WantedRepository,
};
use crate::error::{ReelvaultError, Result};
use crate::models::movie::Movie;
use crate::models::wanted::{WantedMovie, WantedStatus};
use crate::scheduler::{CommandHandler, TaskContext, TaskQueue, TaskSpec};
use crate::services::search::SearchMovieHandler;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Bulk operations on wanted rows exposed to the programmatic surface.
#[derive(Debug, Clone)]
pub enum WantedBulkOp {
    Search,
    SetPriority(i32),
    ResetAttempts,
    Remove,
}

#[derive(Debug, Clone)]
pub struct WantedLoopConfig {
    /// Rows considered per tick.
    pub batch_size: i64,
}

impl Default for WantedLoopConfig {
    fn default() -> Self {
        Self { batch_size: 20 }
    }
}

pub struct WantedService {
    movies: Arc<dyn MovieRepository>,
    files: Arc<dyn MovieFileRepository>,
    profiles: Arc<dyn QualityProfileRepository>,
    wanted: Arc<dyn WantedRepository>,
    tasks: TaskQueue,
    clock: SharedClock,
    config: WantedLoopConfig,
}

impl WantedService {
    pub fn new(
        movies: Arc<dyn MovieRepository>,
        files: Arc<dyn MovieFileRepository>,
        profiles: Arc<dyn QualityProfileRepository>,
        wanted: Arc<dyn WantedRepository>,
        tasks: TaskQueue,
        clock: SharedClock,
        config: WantedLoopConfig,
    ) -> Self {
        Self {
            movies,
            files,
            profiles,
            wanted,
            tasks,
            clock,
            config,
        }
    }

    pub async fn list(&self, filter: &WantedFilter) -> Result<Vec<WantedMovie>> {
        self.wanted.list(filter).await
    }

    /// Enforce the row invariant for one movie: a wanted row exists iff the
    /// movie is monitored and (has no file, or the file is below cutoff
    /// with upgrades allowed).
    pub async fn refresh_for_movie(&self, movie_id: Uuid) -> Result<()> {
        let Some(movie) = self.movies.find_by_id(movie_id).await? else {
            self.wanted.delete_by_movie_id(movie_id).await?;
            return Ok(());
        };
        let desired = self.desired_status(&movie).await?;
        let existing = self.wanted.find_by_movie_id(movie_id).await?;

        match (existing, desired) {
            (Some(_), None) => {
                debug!(movie = %movie.title, "wanted row no longer needed");
                self.wanted.delete_by_movie_id(movie_id).await?;
            }
            (Some(mut row), Some(status)) => {
                if row.status != status {
                    row.status = status;
                    row.updated_at = self.clock.now();
                    self.wanted.update(&row).await?;
                }
            }
            (None, Some(status)) => {
                debug!(movie = %movie.title, status = %status, "creating wanted row");
                self.wanted
                    .upsert(&WantedMovie::new(movie_id, status))
                    .await?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    async fn desired_status(&self, movie: &Movie) -> Result<Option<WantedStatus>> {
        if !movie.monitored {
            return Ok(None);
        }
        let Some(file) = self.files.find_by_movie_id(movie.id).await? else {
            return Ok(Some(WantedStatus::Missing));
        };
        let Some(profile) = self.profiles.find_by_id(movie.quality_profile_id).await? else {
            return Ok(None);
        };
        if !profile.upgrade_allowed {
            return Ok(None);
        }
        let cutoff_met = file.quality_weight() >= profile.cutoff_weight()
            && file.format_score >= profile.cutoff_format_score;
        if cutoff_met {
            Ok(None)
        } else {
            Ok(Some(WantedStatus::CutoffUnmet))
        }
    }

    /// One pass of the recurring loop: pick the most urgent eligible rows
    /// and enqueue a search task for each.
    pub async fn tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let candidates = self
            .wanted
            .find_search_candidates(now, self.config.batch_size)
            .await?;
        let mut enqueued = 0;
        for mut row in candidates {
            let Some(mut movie) = self.movies.find_by_id(row.movie_id).await? else {
                self.wanted.delete_by_movie_id(row.movie_id).await?;
                continue;
            };
            movie.project_availability(&*self.clock);
            if !movie.is_available {
                continue;
            }
            self.enqueue_search(&movie, &mut row).await?;
            enqueued += 1;
        }
        if enqueued > 0 {
            info!(count = enqueued, "wanted tick enqueued search tasks");
        }
        Ok(enqueued)
    }

    async fn enqueue_search(&self, movie: &Movie, row: &mut WantedMovie) -> Result<()> {
        row.search_in_flight = true;
        row.updated_at = self.clock.now();
        self.wanted.update(row).await?;
        self.tasks
            .enqueue(
                TaskSpec::new(
                    SearchMovieHandler::COMMAND,
                    serde_json::json!({ "movie_id": movie.id }),
                )
                .named(format!("Search {}", movie.title)),
            )
            .await?;
        Ok(())
    }

    pub async fn bulk(&self, op: WantedBulkOp, movie_ids: &[Uuid]) -> Result<()> {
        for &movie_id in movie_ids {
            match &op {
                WantedBulkOp::Search => {
                    let Some(mut row) = self.wanted.find_by_movie_id(movie_id).await? else {
                        continue;
                    };
                    if row.search_in_flight {
                        continue;
                    }
                    let Some(movie) = self.movies.find_by_id(movie_id).await? else {
                        continue;
                    };
                    self.enqueue_search(&movie, &mut row).await?;
                }
                WantedBulkOp::SetPriority(priority) => {
                    if !(1..=5).contains(priority) {
                        return Err(ReelvaultError::validation(
                            "priority",
                            "must be between 1 and 5",
                        ));
                    }
                    if let Some(mut row) = self.wanted.find_by_movie_id(movie_id).await? {
                        row.priority = *priority;
                        row.updated_at = self.clock.now();
                        self.wanted.update(&row).await?;
                    }
                }
                WantedBulkOp::ResetAttempts => {
                    if let Some(mut row) = self.wanted.find_by_movie_id(movie_id).await? {
                        row.reset_attempts(self.clock.now());
                        self.wanted.update(&row).await?;
                    }
                }
                WantedBulkOp::Remove => {
                    self.wanted.delete_by_movie_id(movie_id).await?;
                }
            }
        }
        Ok(())
    }
}

/// Recurring task handler driving the wanted loop (default every 15
/// minutes).
pub struct WantedTickHandler {
    service: Arc<WantedService>,
}

impl WantedTickHandler {
    pub const COMMAND: &'static str = "WantedSearch";

    pub fn new(service: Arc<WantedService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl CommandHandler for WantedTickHandler {
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        ctx.cancellation.check(Self::COMMAND)?;
        let enqueued = self.service.tick().await?;
        ctx.progress
            .update(100.0, format!("Enqueued {} searches", enqueued))
            .await;
        ctx.progress.flush().await;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(300)
    }
}
