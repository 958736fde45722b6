//! Import state machine
//!
//! Drives a completed download through identify → parse → decide → plan →
//! free-space → transfer → post → register → cleanup. Every step before
//! the registration transaction is safe to re-run; registration is the
//! commit point, and a destination that already matches the plan
//! short-circuits the transfer on replay.

use crate::naming::{NamingInput, NamingPlanner};
use crate::scanner::{scan_candidates, CandidateFile};
use crate::transfer::transfer_file;
use reelvault_core::adapters::MediaInfoAdapter;
use reelvault_core::clock::SharedClock;
use reelvault_core::domain::repositories::*;
use reelvault_core::error::{ReelvaultError, Result};
use reelvault_core::events::{EventBus, SystemEvent};
use reelvault_core::models::*;
use reelvault_core::registry::ExtRegistry;
use reelvault_core::scheduler::{CancellationHandle, CommandHandler, ProgressReporter, TaskContext};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Free space on the destination volume. No portable std API exists, so
/// the check sits behind this seam; production wires a platform probe and
/// tests script it.
pub trait FreeSpace: Send + Sync {
    fn available_bytes(&self, path: &Path) -> Result<u64>;
}

/// Skips the check by reporting unlimited space.
pub struct UnlimitedFreeSpace;

impl FreeSpace for UnlimitedFreeSpace {
    fn available_bytes(&self, _path: &Path) -> Result<u64> {
        Ok(u64::MAX)
    }
}

/// Outcome of one import attempt.
#[derive(Debug)]
pub enum ImportOutcome {
    Imported { movie_file: MovieFile, upgrade: bool },
    /// Permanently failed; the queue item is terminal.
    Failed { reasons: Vec<Rejection> },
    /// Retryably failed; the poller will re-trigger the import.
    Deferred { reason: Rejection },
    /// The queue item was already terminal.
    Skipped,
}

/// Constructor bundle for the pipeline's collaborators.
pub struct ImportPipelineDeps {
    pub movies: Arc<dyn MovieRepository>,
    pub files: Arc<dyn MovieFileRepository>,
    pub profiles: Arc<dyn QualityProfileRepository>,
    pub formats: Arc<dyn CustomFormatRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub wanted: Arc<dyn WantedRepository>,
    pub clients: Arc<dyn DownloadClientRepository>,
    pub config: Arc<dyn ConfigRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub store: Arc<dyn TransactionalStore>,
    pub registry: Arc<ExtRegistry>,
    pub decider: Arc<dyn ReleaseDecider>,
    pub media_info: Arc<dyn MediaInfoAdapter>,
    pub free_space: Arc<dyn FreeSpace>,
    pub events: EventBus,
    pub clock: SharedClock,
}

pub struct ImportPipeline {
    deps: ImportPipelineDeps,
}

impl ImportPipeline {
    pub fn new(deps: ImportPipelineDeps) -> Self {
        Self { deps }
    }

    /// Run one import attempt for a queue item.
    #[instrument(skip(self, cancellation, progress), fields(queue_item_id = %queue_item_id))]
    pub async fn import(
        &self,
        queue_item_id: Uuid,
        cancellation: &CancellationHandle,
        progress: Option<&ProgressReporter>,
    ) -> Result<ImportOutcome> {
        let d = &self.deps;
        let mut item = d
            .queue
            .find_by_id(queue_item_id)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("queue item {}", queue_item_id)))?;
        if item.status.is_terminal() {
            debug!(status = %item.status, "queue item already terminal, skipping");
            return Ok(ImportOutcome::Skipped);
        }

        let mm = d.config.media_management().await?;
        item.import_attempts += 1;
        if item.import_attempts > mm.import_attempts {
            let reason = Rejection::new(
                RejectionReason::FileNotFound,
                format!("import gave up after {} attempts", mm.import_attempts),
            );
            return self.fail(item, vec![reason], "Attempts").await;
        }
        item.transition(QueueItemStatus::Importing);
        d.queue.update(&item).await?;

        // 2. Identify
        self.step(progress, 10.0, "Scanning download output").await;
        cancellation.check("import")?;
        let Some(output_path) = item.output_path.clone() else {
            let reason = Rejection::new(
                RejectionReason::InvalidPath,
                "download client reported no output path",
            );
            return self.fail(item, vec![reason], "Permissions").await;
        };
        let candidates = match scan_candidates(Path::new(&output_path)).await {
            Ok(candidates) => candidates,
            Err(ReelvaultError::NotFound { .. }) => {
                let reason = Rejection::new(
                    RejectionReason::FileNotFound,
                    format!("output path {} does not exist", output_path),
                );
                return self.defer(item, reason).await;
            }
            Err(e) => return Err(e),
        };
        if candidates.is_empty() {
            let reason = Rejection::new(
                RejectionReason::FileNotFound,
                format!("no importable video files under {}", output_path),
            );
            return self.defer(item, reason).await;
        }

        let movie = d
            .movies
            .find_by_id(item.movie_id)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("movie {}", item.movie_id)))?;
        let profile = d
            .profiles
            .find_by_id(movie.quality_profile_id)
            .await?
            .ok_or_else(|| ReelvaultError::InvalidReference {
                field: "quality_profile_id".to_string(),
                message: format!("quality profile {} is gone", movie.quality_profile_id),
            })?;
        let formats = d.formats.list().await?;
        let current_file = d.files.find_by_movie_id(movie.id).await?;

        // 3 + 4. Parse and decide, biggest candidate first.
        self.step(progress, 30.0, "Evaluating candidate files").await;
        let mut rejections = Vec::new();
        let mut accepted: Option<(CandidateFile, ParsedMovieInfo, i32, Vec<i32>, bool)> = None;
        for candidate in &candidates {
            let name = candidate
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let parsed = d.decider.parse_title(&name);
            let decision = d.decider.decide(&DecisionRequest {
                parsed: &parsed,
                release_title: &name,
                size_bytes: candidate.size_bytes,
                age_hours: None,
                protocol: item.protocol,
                seeders: None,
                movie: &movie,
                profile: &profile,
                formats: &formats,
                current_file: current_file.as_ref(),
            });
            match decision {
                Decision::Accepted {
                    upgrade,
                    format_score,
                    matched_format_ids,
                } => {
                    accepted = Some((
                        candidate.clone(),
                        parsed,
                        format_score,
                        matched_format_ids,
                        upgrade,
                    ));
                    break;
                }
                Decision::Rejected { reasons } => rejections.extend(reasons),
            }
        }
        let Some((chosen, parsed, format_score, matched_format_ids, upgrade)) = accepted else {
            info!("no candidate file was approved for import");
            return self.fail(item, rejections, "No Match").await;
        };

        // 5. Plan paths
        self.step(progress, 45.0, "Planning destination").await;
        let naming = d.config.naming().await?;
        let planner = NamingPlanner::new(naming);
        let media_info = match d.media_info.probe(&chosen.path).await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(path = %chosen.path.display(), "media info probe failed: {}", e);
                None
            }
        };
        let format_names: Vec<String> = formats
            .iter()
            .filter(|f| matched_format_ids.contains(&f.id))
            .map(|f| f.name.clone())
            .collect();
        let input = NamingInput {
            movie: Some(&movie),
            quality: Some(parsed.quality),
            revision: parsed.revision,
            media_info: media_info.as_ref(),
            edition: parsed.edition.as_deref(),
            custom_format_names: &format_names,
            release_group: parsed.release_group.as_deref(),
            collection: None,
        };
        let folder = planner.plan_folder(&input);
        let filename = planner.plan_filename(&input, &chosen.path);
        let destination = folder.join(&filename);

        if destination == chosen.path {
            let reason = Rejection::new(
                RejectionReason::SameFile,
                format!("destination equals source: {}", destination.display()),
            );
            return self.fail(item, vec![reason], "Qualitative").await;
        }

        // Replay safety: a destination that already matches the plan means
        // the transfer happened before a crash; skip straight to register.
        let mut already_transferred = false;
        if let Ok(existing) = fs::metadata(&destination).await {
            if existing.len() as i64 == chosen.size_bytes {
                info!(destination = %destination.display(), "destination already in place");
                already_transferred = true;
            } else if current_file
                .as_ref()
                .map(|f| Path::new(&f.path) == destination)
                .unwrap_or(false)
            {
                // Upgrading over the registered file; the rename replaces it.
            } else {
                let reason = Rejection::new(
                    RejectionReason::ExistingFile,
                    format!(
                        "unrelated file already at {}",
                        destination.display()
                    ),
                );
                return self.fail(item, vec![reason], "Qualitative").await;
            }
        }

        // 6. Free-space check
        if !mm.skip_free_space_check && !already_transferred {
            let required = chosen
                .size_bytes
                .max(mm.minimum_free_space_mb * 1024 * 1024) as u64;
            let available = d
                .free_space
                .available_bytes(Path::new(&movie.root_folder))?;
            if available < required {
                let reason = Rejection::new(
                    RejectionReason::FileNotFound,
                    format!(
                        "insufficient free space: {} available, {} required",
                        available, required
                    ),
                );
                return self.defer(item, reason).await;
            }
        }

        // 7. Transfer
        cancellation.check("import")?;
        if !already_transferred {
            self.step(progress, 60.0, "Transferring file").await;
            transfer_file(&chosen.path, &destination, mm.import_mechanism).await?;
        }

        // 8. Post: retire the previous file.
        if let Some(old) = &current_file {
            if Path::new(&old.path) != destination {
                self.retire_old_file(&mm, &movie, old).await;
            }
        }

        // 9. Register — the commit point.
        self.step(progress, 85.0, "Registering movie file").await;
        let now = self.deps.clock.now();
        let mut new_file = MovieFile::new(
            movie.id,
            destination.display().to_string(),
            filename.clone(),
            chosen.size_bytes,
            parsed.quality,
        );
        new_file.revision = parsed.revision;
        new_file.languages = parsed.languages.clone();
        new_file.custom_format_ids = matched_format_ids;
        new_file.format_score = format_score;
        new_file.release_group = parsed.release_group.clone();
        new_file.edition = parsed.edition.clone();
        new_file.media_info = media_info;

        let mut updated_movie = movie.clone();
        updated_movie.set_file(new_file.id, new_file.size_bytes);
        updated_movie.path = Some(folder.display().to_string());

        let cutoff_met = new_file.quality_weight() >= profile.cutoff_weight()
            && new_file.format_score >= profile.cutoff_format_score;
        let wanted_update = if cutoff_met {
            None
        } else {
            let mut row = d
                .wanted
                .find_by_movie_id(movie.id)
                .await?
                .unwrap_or_else(|| WantedMovie::new(movie.id, WantedStatus::CutoffUnmet));
            row.status = WantedStatus::CutoffUnmet;
            row.search_in_flight = false;
            row.updated_at = now;
            Some(row)
        };

        let event_type = if upgrade {
            HistoryEventType::QualityUpgraded
        } else {
            HistoryEventType::DownloadFolderImported
        };
        let history = History::new(event_type, now, item.title.clone())
            .for_movie(movie.id)
            .with_quality(new_file.quality)
            .with_download_id(item.download_id.clone());

        let mut done = item.clone();
        done.transition(QueueItemStatus::Imported);

        d.store
            .commit_import(ImportCommit {
                delete_file_id: current_file.as_ref().map(|f| f.id),
                new_file: new_file.clone(),
                movie: updated_movie,
                delete_wanted: cutoff_met,
                wanted_update,
                history,
                queue_item: done,
            })
            .await?;

        d.events.publish(SystemEvent::Imported {
            movie_id: movie.id,
            movie_file_id: new_file.id,
            path: new_file.path.clone(),
            upgrade,
        });
        info!(
            movie = %movie.title,
            path = %new_file.path,
            upgrade,
            "import registered"
        );

        // 10. Cleanup at the client; failures only logged.
        self.cleanup(&item).await;
        self.step(progress, 100.0, "Import complete").await;

        Ok(ImportOutcome::Imported {
            movie_file: new_file,
            upgrade,
        })
    }

    async fn step(&self, progress: Option<&ProgressReporter>, percent: f32, message: &str) {
        if let Some(progress) = progress {
            progress.update(percent, message).await;
        }
    }

    /// Terminal failure: record reasons, history and the event.
    async fn fail(
        &self,
        mut item: QueueItem,
        reasons: Vec<Rejection>,
        group: &str,
    ) -> Result<ImportOutcome> {
        let messages: Vec<String> = reasons.iter().map(|r| r.message.clone()).collect();
        item.push_message(StatusMessage::error(group, messages.clone()));
        item.transition(QueueItemStatus::Failed);
        self.deps.queue.update(&item).await?;

        self.deps
            .history
            .append(
                &History::new(
                    HistoryEventType::DownloadFailed,
                    self.deps.clock.now(),
                    item.title.clone(),
                )
                .for_movie(item.movie_id)
                .with_download_id(item.download_id.clone())
                .failed(messages.join("; ")),
            )
            .await?;
        self.deps.events.publish(SystemEvent::DownloadFailed {
            movie_id: item.movie_id,
            download_id: item.download_id.clone(),
            message: messages.join("; "),
        });
        warn!(title = %item.title, "import failed permanently: {}", messages.join("; "));
        Ok(ImportOutcome::Failed { reasons })
    }

    /// Retryable failure: the item returns to the poller's care and the
    /// attempt counter stands.
    async fn defer(&self, mut item: QueueItem, reason: Rejection) -> Result<ImportOutcome> {
        item.push_message(StatusMessage::warning("Import", vec![reason.message.clone()]));
        item.transition(QueueItemStatus::FailedPending);
        self.deps.queue.update(&item).await?;
        warn!(title = %item.title, "import deferred: {}", reason.message);
        Ok(ImportOutcome::Deferred { reason })
    }

    /// Move the replaced file to the recycle bin, or delete it.
    async fn retire_old_file(
        &self,
        mm: &MediaManagementConfig,
        movie: &Movie,
        old: &MovieFile,
    ) {
        let old_path = Path::new(&old.path);
        if fs::metadata(old_path).await.is_err() {
            return;
        }
        let outcome = match &mm.recycle_bin {
            Some(bin) => {
                let target = PathBuf::from(bin).join(
                    old_path
                        .file_name()
                        .map(|n| n.to_os_string())
                        .unwrap_or_else(|| "replaced".into()),
                );
                match fs::create_dir_all(bin).await {
                    Ok(()) => fs::rename(old_path, &target).await,
                    Err(e) => Err(e),
                }
            }
            None => fs::remove_file(old_path).await,
        };
        match outcome {
            Ok(()) => {
                self.deps.events.publish(SystemEvent::MovieFileDeleted {
                    movie_id: movie.id,
                    path: old.path.clone(),
                });
            }
            Err(e) => warn!(path = %old.path, "failed to retire replaced file: {}", e),
        }
    }

    async fn cleanup(&self, item: &QueueItem) {
        let client = match self.deps.clients.find_by_id(item.download_client_id).await {
            Ok(Some(client)) => client,
            _ => return,
        };
        if !client.remove_completed_downloads {
            return;
        }
        match self.deps.registry.download_client(client.id).await {
            Some(registered) => {
                if let Err(e) = registered.adapter.remove(&item.download_id, false).await {
                    warn!(download_id = %item.download_id, "cleanup at client failed: {}", e);
                }
            }
            None => debug!(client = %client.name, "no adapter registered for cleanup"),
        }
    }
}

/// Body of an `ImportDownload` task.
#[derive(Debug, Deserialize)]
struct ImportDownloadBody {
    queue_item_id: Uuid,
}

/// Task handler binding the pipeline to the scheduler.
pub struct ImportDownloadHandler {
    pipeline: Arc<ImportPipeline>,
}

impl ImportDownloadHandler {
    pub const COMMAND: &'static str = "ImportDownload";

    pub fn new(pipeline: Arc<ImportPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait::async_trait]
impl CommandHandler for ImportDownloadHandler {
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        let body: ImportDownloadBody =
            serde_json::from_value(ctx.body.clone()).map_err(|e| ReelvaultError::Validation {
                field: "body".to_string(),
                message: format!("invalid ImportDownload body: {}", e),
            })?;
        let outcome = self
            .pipeline
            .import(body.queue_item_id, &ctx.cancellation, Some(&ctx.progress))
            .await?;
        ctx.progress.flush().await;
        if let ImportOutcome::Failed { reasons } = &outcome {
            debug!(count = reasons.len(), "import ended with permanent rejections");
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1800)
    }
}
