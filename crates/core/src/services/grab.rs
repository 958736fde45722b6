//! Grab handoff: hand an approved release to a download client
//!
//! Client selection prefers enabled clients matching the release protocol
//! with the lowest priority value, tiebroken by name. The commit is
//! idempotent keyed on `(download_client_id, download_id)` so a retried
//! handoff never duplicates queue items.

use crate::clock::SharedClock;
use crate::domain::repositories::{
    DownloadClientRepository, GrabCommit, ReleaseRepository, TransactionalStore,
};
use crate::error::{ReelvaultError, Result};
use crate::events::{EventBus, SystemEvent};
use crate::models::history::{History, HistoryEventType};
use crate::models::indexer::DownloadClient;
use crate::models::movie::Movie;
use crate::models::queue::QueueItem;
use crate::models::release::{Release, ReleaseStatus};
use crate::registry::ExtRegistry;
use crate::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use tracing::{info, warn};

pub struct GrabService {
    clients: Arc<dyn DownloadClientRepository>,
    releases: Arc<dyn ReleaseRepository>,
    registry: Arc<ExtRegistry>,
    store: Arc<dyn TransactionalStore>,
    events: EventBus,
    clock: SharedClock,
}

impl GrabService {
    pub fn new(
        clients: Arc<dyn DownloadClientRepository>,
        releases: Arc<dyn ReleaseRepository>,
        registry: Arc<ExtRegistry>,
        store: Arc<dyn TransactionalStore>,
        events: EventBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            clients,
            releases,
            registry,
            store,
            events,
            clock,
        }
    }

    /// Hand `release` to a download client and commit the grab. On a
    /// permanent client failure the release is marked failed and the error
    /// propagates; transient failures are retried first.
    pub async fn grab(
        &self,
        release: &Release,
        movie: &Movie,
        client_override: Option<i32>,
    ) -> Result<QueueItem> {
        let client = self.select_client(release, client_override).await?;
        let registered = self
            .registry
            .download_client(client.id)
            .await
            .ok_or_else(|| {
                ReelvaultError::not_found(format!("download client adapter {}", client.id))
            })?;

        let download_id = {
            let _permit = registered.limiter.acquire().await.map_err(|_| {
                ReelvaultError::internal("download client limiter closed")
            })?;
            let adapter = registered.adapter.clone();
            let outcome = retry_with_backoff(RetryConfig::quick(), "download_client_add", || {
                let adapter = adapter.clone();
                let release = release.clone();
                async move { adapter.add(&release).await }
            })
            .await;
            match outcome {
                Ok(download_id) => download_id,
                Err(err) => {
                    warn!(
                        release = %release.title,
                        client = %client.name,
                        "grab handoff failed: {}", err
                    );
                    let mut failed = release.clone();
                    failed.status = ReleaseStatus::Failed;
                    self.releases.update(&failed).await?;
                    return Err(err);
                }
            }
        };

        let now = self.clock.now();
        let mut grabbed = release.clone();
        grabbed.status = ReleaseStatus::Grabbed;
        grabbed.grabbed_at = Some(now);
        grabbed.download_client_id = Some(client.id);
        grabbed.movie_id = Some(movie.id);

        let mut queue_item = QueueItem::new(
            movie.id,
            release.title.clone(),
            client.id,
            download_id.clone(),
            release.protocol,
            release.size_bytes,
        );
        queue_item.release_id = Some(release.id);

        let history = History::new(HistoryEventType::Grabbed, now, release.title.clone())
            .for_movie(movie.id)
            .with_quality(release.quality)
            .with_download_id(download_id.clone());

        let committed = self
            .store
            .commit_grab(GrabCommit {
                release: grabbed,
                queue_item,
                history,
            })
            .await?;

        info!(
            movie = %movie.title,
            release = %release.title,
            client = %client.name,
            download_id = %download_id,
            "release grabbed"
        );
        self.events.publish(SystemEvent::Grabbed {
            movie_id: movie.id,
            release_title: release.title.clone(),
            quality: release.quality,
            download_id,
        });
        Ok(committed)
    }

    async fn select_client(
        &self,
        release: &Release,
        client_override: Option<i32>,
    ) -> Result<DownloadClient> {
        if let Some(id) = client_override {
            return self
                .clients
                .find_by_id(id)
                .await?
                .filter(|c| c.enabled)
                .ok_or_else(|| ReelvaultError::not_found(format!("download client {}", id)));
        }
        // find_enabled returns (priority asc, name asc)
        self.clients
            .find_enabled()
            .await?
            .into_iter()
            .find(|c| c.protocol == release.protocol)
            .ok_or_else(|| ReelvaultError::NotFound {
                resource: format!("enabled {} download client", release.protocol),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::indexer::Protocol;
    use crate::models::quality::QualityId;
    use crate::testing::{MemoryStore, ScriptedDownloadClient};

    async fn setup() -> (Arc<MemoryStore>, GrabService, Arc<ScriptedDownloadClient>, Movie, Release) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ExtRegistry::new());

        let mut profile = crate::models::quality::QualityProfile::new(
            "Any".to_string(),
            vec![crate::models::quality::ProfileItem {
                quality: QualityId::Bluray1080p,
                allowed: true,
            }],
            QualityId::Bluray1080p,
        );
        profile.id = 1;
        crate::domain::repositories::QualityProfileRepository::create(&*store, &profile)
            .await
            .unwrap();

        let movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        crate::domain::repositories::MovieRepository::create(&*store, &movie)
            .await
            .unwrap();

        let mut client = DownloadClient::new(
            "qbit".to_string(),
            "torrent-client".to_string(),
            Protocol::Torrent,
        );
        client.id =
            crate::domain::repositories::DownloadClientRepository::create(&*store, &client)
                .await
                .unwrap();
        let adapter = Arc::new(ScriptedDownloadClient::new());
        registry.register_download_client(client.id, adapter.clone()).await;

        let mut release = Release::new(
            "guid-1".to_string(),
            7,
            "Fight.Club.1999.1080p.BluRay.x264-GROUP".to_string(),
            "http://indexer/dl/1".to_string(),
            Protocol::Torrent,
        );
        release.set_quality(QualityId::Bluray1080p);
        release.size_bytes = 8_500_000_000;
        crate::domain::repositories::ReleaseRepository::upsert(&*store, &release)
            .await
            .unwrap();

        let service = GrabService::new(
            store.clone(),
            store.clone(),
            registry,
            store.clone(),
            EventBus::new(),
            Arc::new(SystemClock),
        );
        (store, service, adapter, movie, release)
    }

    #[tokio::test]
    async fn grab_commits_release_queue_and_history() {
        let (store, service, adapter, movie, release) = setup().await;

        let item = service.grab(&release, &movie, None).await.unwrap();
        assert_eq!(item.movie_id, movie.id);
        assert_eq!(item.size_bytes, 8_500_000_000);
        assert_eq!(adapter.added.lock().unwrap().len(), 1);

        let stored = crate::domain::repositories::ReleaseRepository::find_by_guid(
            &*store, "guid-1", 7,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.status, ReleaseStatus::Grabbed);
        assert!(stored.grabbed_at.is_some());

        let history =
            crate::domain::repositories::HistoryRepository::list_for_movie(&*store, movie.id)
                .await
                .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_type, HistoryEventType::Grabbed);
        assert!(history[0].successful);
    }

    #[tokio::test]
    async fn grab_is_idempotent_on_download_id() {
        let (store, service, _adapter, movie, release) = setup().await;

        let first = service.grab(&release, &movie, None).await.unwrap();
        // Scripted client hands out fresh ids per add; emulate a retried
        // handoff by committing the same download id again.
        let mut retry_item = QueueItem::new(
            movie.id,
            release.title.clone(),
            first.download_client_id,
            first.download_id.clone(),
            release.protocol,
            release.size_bytes,
        );
        retry_item.release_id = Some(release.id);
        let commit = GrabCommit {
            release: release.clone(),
            queue_item: retry_item,
            history: History::new(
                HistoryEventType::Grabbed,
                chrono::Utc::now(),
                release.title.clone(),
            ),
        };
        let second = TransactionalStore::commit_grab(&*store, commit).await.unwrap();

        assert_eq!(first.id, second.id);
        let all = crate::domain::repositories::QueueRepository::list(&*store).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn permanent_add_failure_marks_release_failed() {
        let (store, service, adapter, movie, release) = setup().await;
        adapter.fail_next_add(ReelvaultError::Permanent {
            service: "qbit".to_string(),
            message: "bad credentials".to_string(),
        });

        let result = service.grab(&release, &movie, None).await;
        assert!(matches!(result, Err(ReelvaultError::Permanent { .. })));

        let stored = crate::domain::repositories::ReleaseRepository::find_by_guid(
            &*store, "guid-1", 7,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.status, ReleaseStatus::Failed);
    }

    #[tokio::test]
    async fn no_matching_client_is_not_found() {
        let (store, service, _adapter, movie, mut release) = setup().await;
        release.protocol = Protocol::Usenet;
        let _ = store;
        let result = service.grab(&release, &movie, None).await;
        assert!(matches!(result, Err(ReelvaultError::NotFound { .. })));
    }
}
