//! Download polling: drain client state into the queue
//!
//! A recurring `PollDownloads` task asks each enabled download client for
//! its downloads, synchronizes the queue rows, and enqueues an
//! `ImportDownload` task the moment a download transitions to completed.

use crate::adapters::{ClientDownload, DownloadState};
use crate::clock::SharedClock;
use crate::domain::repositories::{
    DownloadClientRepository, HistoryRepository, QueueRepository,
};
use crate::error::{ReelvaultError, Result};
use crate::events::{EventBus, HealthLevel, SystemEvent};
use crate::models::history::{History, HistoryEventType};
use crate::models::queue::{QueueItem, QueueItemStatus, StatusMessage};
use crate::registry::ExtRegistry;
use crate::scheduler::{CommandHandler, TaskContext, TaskQueue, TaskSpec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct PollDownloadsHandler {
    clients: Arc<dyn DownloadClientRepository>,
    queue: Arc<dyn QueueRepository>,
    history: Arc<dyn HistoryRepository>,
    registry: Arc<ExtRegistry>,
    tasks: TaskQueue,
    events: EventBus,
    clock: SharedClock,
}

impl PollDownloadsHandler {
    pub const COMMAND: &'static str = "PollDownloads";
    pub const IMPORT_COMMAND: &'static str = "ImportDownload";

    pub fn new(
        clients: Arc<dyn DownloadClientRepository>,
        queue: Arc<dyn QueueRepository>,
        history: Arc<dyn HistoryRepository>,
        registry: Arc<ExtRegistry>,
        tasks: TaskQueue,
        events: EventBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            clients,
            queue,
            history,
            registry,
            tasks,
            events,
            clock,
        }
    }

    /// Startup recovery: any non-terminal item whose import was in flight
    /// when the process died goes back to importPending and gets a fresh
    /// `ImportDownload` task. The pipeline is idempotent up to its commit
    /// point, so re-running is safe.
    pub async fn resume_pending_imports(&self) -> Result<usize> {
        let mut resumed = 0;
        for mut item in self.queue.find_active().await? {
            if !matches!(
                item.status,
                QueueItemStatus::ImportPending | QueueItemStatus::Importing
            ) {
                continue;
            }
            if item.status == QueueItemStatus::Importing {
                item.transition(QueueItemStatus::ImportPending);
                self.queue.update(&item).await?;
            }
            self.tasks
                .enqueue(
                    TaskSpec::new(
                        Self::IMPORT_COMMAND,
                        serde_json::json!({ "queue_item_id": item.id }),
                    )
                    .named(format!("Import {}", item.title)),
                )
                .await?;
            resumed += 1;
        }
        if resumed > 0 {
            info!(count = resumed, "resumed interrupted imports");
        }
        Ok(resumed)
    }

    pub async fn poll_once(&self) -> Result<()> {
        for client in self.clients.find_enabled().await? {
            let items = self.queue.find_by_client(client.id).await?;
            let tracked: Vec<QueueItem> = items
                .into_iter()
                .filter(|i| !i.status.is_terminal())
                .collect();
            if tracked.is_empty() {
                continue;
            }

            let Some(registered) = self.registry.download_client(client.id).await else {
                continue;
            };
            let downloads = {
                let _permit = registered.limiter.acquire().await.map_err(|_| {
                    ReelvaultError::internal("download client limiter closed")
                })?;
                registered.adapter.list().await
            };
            let downloads = match downloads {
                Ok(list) => list,
                Err(err) => {
                    warn!(client = %client.name, "download client unreachable: {}", err);
                    for mut item in tracked {
                        if !item.status.is_import_ready() {
                            item.transition(QueueItemStatus::DownloadClientUnavailable);
                            self.queue.update(&item).await?;
                        }
                    }
                    self.events.publish(SystemEvent::Health {
                        component: format!("download-client/{}", client.name),
                        level: HealthLevel::Warning,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let by_id: HashMap<&str, &ClientDownload> = downloads
                .iter()
                .map(|d| (d.download_id.as_str(), d))
                .collect();

            for mut item in tracked {
                let Some(download) = by_id.get(item.download_id.as_str()) else {
                    // The client no longer knows this download.
                    if !item.status.is_import_ready() {
                        item.push_message(StatusMessage::warning(
                            "No Match",
                            vec!["download disappeared from the client".to_string()],
                        ));
                        item.transition(QueueItemStatus::Warning);
                        self.queue.update(&item).await?;
                    }
                    continue;
                };
                self.sync_item(&mut item, download).await?;
            }
        }
        Ok(())
    }

    async fn sync_item(&self, item: &mut QueueItem, download: &ClientDownload) -> Result<()> {
        // Import-side states are owned by the import pipeline.
        if matches!(
            item.status,
            QueueItemStatus::ImportPending | QueueItemStatus::Importing
        ) {
            return Ok(());
        }

        item.size_left = download.size_left;
        if download.size_bytes > 0 {
            item.size_bytes = download.size_bytes;
        }

        match download.state {
            DownloadState::Queued => item.transition(QueueItemStatus::Queued),
            DownloadState::Downloading => item.transition(QueueItemStatus::Downloading),
            DownloadState::Delayed => item.transition(QueueItemStatus::Delay),
            DownloadState::Warning => {
                if let Some(message) = &download.error_message {
                    item.push_message(StatusMessage::warning(
                        "Download Client",
                        vec![message.clone()],
                    ));
                }
                item.transition(QueueItemStatus::Warning);
            }
            DownloadState::Failed => {
                let message = download
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "download failed at the client".to_string());
                item.push_message(StatusMessage::error("Download Client", vec![message.clone()]));
                item.transition(QueueItemStatus::Failed);
                self.history
                    .append(
                        &History::new(
                            HistoryEventType::DownloadFailed,
                            self.clock.now(),
                            item.title.clone(),
                        )
                        .for_movie(item.movie_id)
                        .with_download_id(item.download_id.clone())
                        .failed(message.clone()),
                    )
                    .await?;
                self.events.publish(SystemEvent::DownloadFailed {
                    movie_id: item.movie_id,
                    download_id: item.download_id.clone(),
                    message,
                });
            }
            DownloadState::Completed => {
                item.output_path = download.output_path.clone();
                item.transition(QueueItemStatus::ImportPending);
                info!(
                    download_id = %item.download_id,
                    "download completed, queueing import"
                );
                self.tasks
                    .enqueue(
                        TaskSpec::new(
                            Self::IMPORT_COMMAND,
                            serde_json::json!({ "queue_item_id": item.id }),
                        )
                        .named(format!("Import {}", item.title)),
                    )
                    .await?;
            }
        }
        self.queue.update(item).await?;
        debug!(download_id = %item.download_id, status = %item.status, "queue item synced");
        Ok(())
    }
}

#[async_trait::async_trait]
impl CommandHandler for PollDownloadsHandler {
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        ctx.cancellation.check(Self::COMMAND)?;
        self.poll_once().await
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(300)
    }
}
