//! Queue surface: listing and removal with optional blocklisting and
//! client-side removal

use crate::clock::SharedClock;
use crate::domain::repositories::{
    BlocklistRepository, QueueRepository, ReleaseRepository,
};
use crate::error::{ReelvaultError, Result};
use crate::models::blocklist::BlocklistEntry;
use crate::models::queue::QueueItem;
use crate::registry::ExtRegistry;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct QueueService {
    queue: Arc<dyn QueueRepository>,
    releases: Arc<dyn ReleaseRepository>,
    blocklist: Arc<dyn BlocklistRepository>,
    registry: Arc<ExtRegistry>,
    clock: SharedClock,
}

impl QueueService {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        releases: Arc<dyn ReleaseRepository>,
        blocklist: Arc<dyn BlocklistRepository>,
        registry: Arc<ExtRegistry>,
        clock: SharedClock,
    ) -> Self {
        Self {
            queue,
            releases,
            blocklist,
            registry,
            clock,
        }
    }

    pub async fn list(&self) -> Result<Vec<QueueItem>> {
        self.queue.list().await
    }

    /// Remove a queue item. With `blacklist` the release is blocked from
    /// future grabs; with `remove_from_client` the download is removed at
    /// the client (errors there are logged, not fatal).
    pub async fn remove(
        &self,
        id: Uuid,
        blacklist: bool,
        remove_from_client: bool,
    ) -> Result<()> {
        let item = self
            .queue
            .find_by_id(id)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("queue item {}", id)))?;

        if remove_from_client {
            match self.registry.download_client(item.download_client_id).await {
                Some(registered) => {
                    if let Err(e) = registered.adapter.remove(&item.download_id, true).await {
                        warn!(
                            download_id = %item.download_id,
                            "failed to remove download from client: {}", e
                        );
                    }
                }
                None => warn!(
                    client_id = item.download_client_id,
                    "no adapter for download client, skipping client-side removal"
                ),
            }
        }

        if blacklist {
            let release = match item.release_id {
                Some(release_id) => self.releases.find_by_id(release_id).await?,
                None => None,
            };
            let mut entry = BlocklistEntry::new(
                item.title.clone(),
                release
                    .as_ref()
                    .map(|r| r.guid.clone())
                    .unwrap_or_else(|| item.download_id.clone()),
                item.protocol,
                self.clock.now(),
            );
            entry.movie_id = Some(item.movie_id);
            entry.indexer_id = release.as_ref().map(|r| r.indexer_id);
            entry.reason = Some("removed from queue".to_string());
            self.blocklist.insert(&entry).await?;
            info!(title = %item.title, "release blocklisted");
        }

        self.queue.delete(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::domain::repositories::*;
    use crate::models::indexer::Protocol;
    use crate::models::release::Release;
    use crate::testing::{MemoryStore, ScriptedDownloadClient};

    #[tokio::test]
    async fn remove_with_blocklist_records_release_guid() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ExtRegistry::new());
        let adapter = Arc::new(ScriptedDownloadClient::new());
        registry.register_download_client(1, adapter.clone()).await;

        let release = Release::new(
            "guid-1".to_string(),
            4,
            "Fight.Club.1999.1080p".to_string(),
            "http://x/dl".to_string(),
            Protocol::Torrent,
        );
        ReleaseRepository::upsert(&*store, &release).await.unwrap();

        let mut item = QueueItem::new(
            Uuid::new_v4(),
            "Fight.Club.1999.1080p".to_string(),
            1,
            "dl-9".to_string(),
            Protocol::Torrent,
            100,
        );
        item.release_id = Some(release.id);
        QueueRepository::update(&*store, &item).await.unwrap();

        let service = QueueService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry,
            Arc::new(SystemClock),
        );
        service.remove(item.id, true, true).await.unwrap();

        assert!(QueueRepository::find_by_id(&*store, item.id).await.unwrap().is_none());
        assert!(BlocklistRepository::contains_guid(&*store, "guid-1").await.unwrap());
        assert_eq!(
            *adapter.removed.lock().unwrap(),
            vec![("dl-9".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn remove_missing_item_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let service = QueueService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(ExtRegistry::new()),
            Arc::new(SystemClock),
        );
        let result = service.remove(Uuid::new_v4(), false, false).await;
        assert!(matches!(result, Err(ReelvaultError::NotFound { .. })));
    }
}
