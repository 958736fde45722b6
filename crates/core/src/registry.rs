//! Registry of pluggable adapters
//!
//! Read-mostly maps from configuration-row id to the live adapter instance.
//! Config edits swap entries under the writer lock. Each entry carries a
//! bounded semaphore capping concurrent in-flight calls to that adapter.

use crate::adapters::{DownloadClientAdapter, ImportListAdapter, IndexerAdapter, NotificationAdapter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

/// Default cap on concurrent calls per adapter.
const DEFAULT_IN_FLIGHT_LIMIT: usize = 2;

#[derive(Clone)]
pub struct RegisteredIndexer {
    pub adapter: Arc<dyn IndexerAdapter>,
    pub limiter: Arc<Semaphore>,
}

#[derive(Clone)]
pub struct RegisteredDownloadClient {
    pub adapter: Arc<dyn DownloadClientAdapter>,
    pub limiter: Arc<Semaphore>,
}

#[derive(Default)]
pub struct ExtRegistry {
    indexers: RwLock<HashMap<i32, RegisteredIndexer>>,
    download_clients: RwLock<HashMap<i32, RegisteredDownloadClient>>,
    notifications: RwLock<HashMap<i32, Arc<dyn NotificationAdapter>>>,
    import_lists: RwLock<HashMap<i32, Arc<dyn ImportListAdapter>>>,
}

impl ExtRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_indexer(&self, id: i32, adapter: Arc<dyn IndexerAdapter>) {
        let mut indexers = self.indexers.write().await;
        indexers.insert(
            id,
            RegisteredIndexer {
                adapter,
                limiter: Arc::new(Semaphore::new(DEFAULT_IN_FLIGHT_LIMIT)),
            },
        );
    }

    pub async fn remove_indexer(&self, id: i32) {
        self.indexers.write().await.remove(&id);
    }

    pub async fn indexer(&self, id: i32) -> Option<RegisteredIndexer> {
        self.indexers.read().await.get(&id).cloned()
    }

    pub async fn register_download_client(&self, id: i32, adapter: Arc<dyn DownloadClientAdapter>) {
        let mut clients = self.download_clients.write().await;
        clients.insert(
            id,
            RegisteredDownloadClient {
                adapter,
                limiter: Arc::new(Semaphore::new(DEFAULT_IN_FLIGHT_LIMIT)),
            },
        );
    }

    pub async fn remove_download_client(&self, id: i32) {
        self.download_clients.write().await.remove(&id);
    }

    pub async fn download_client(&self, id: i32) -> Option<RegisteredDownloadClient> {
        self.download_clients.read().await.get(&id).cloned()
    }

    pub async fn register_notification(&self, id: i32, adapter: Arc<dyn NotificationAdapter>) {
        self.notifications.write().await.insert(id, adapter);
    }

    pub async fn remove_notification(&self, id: i32) {
        self.notifications.write().await.remove(&id);
    }

    pub async fn notifications(&self) -> Vec<Arc<dyn NotificationAdapter>> {
        self.notifications.read().await.values().cloned().collect()
    }

    pub async fn register_import_list(&self, id: i32, adapter: Arc<dyn ImportListAdapter>) {
        self.import_lists.write().await.insert(id, adapter);
    }

    pub async fn remove_import_list(&self, id: i32) {
        self.import_lists.write().await.remove(&id);
    }

    pub async fn import_list(&self, id: i32) -> Option<Arc<dyn ImportListAdapter>> {
        self.import_lists.read().await.get(&id).cloned()
    }

    pub async fn import_lists(&self) -> Vec<Arc<dyn ImportListAdapter>> {
        self.import_lists.read().await.values().cloned().collect()
    }
}
