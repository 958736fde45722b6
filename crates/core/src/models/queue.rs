//! Queue domain model: a download in flight at a download client
//!
//! Status machine:
//! `queued → downloading → (completed | failed | warning |
//! downloadClientUnavailable | delay) → importPending → importing →
//! (imported | failedPending → failed)`. Every transition is persisted.

use crate::models::indexer::Protocol;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum QueueItemStatus {
    #[default]
    Queued,
    Downloading,
    Completed,
    Failed,
    Warning,
    DownloadClientUnavailable,
    Delay,
    ImportPending,
    Importing,
    Imported,
    FailedPending,
    Ignored,
}

impl QueueItemStatus {
    /// Terminal items are removed from the queue.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueItemStatus::Imported | QueueItemStatus::Failed | QueueItemStatus::Ignored
        )
    }

    /// The download finished at the client and the item is ready for import.
    pub fn is_import_ready(&self) -> bool {
        matches!(
            self,
            QueueItemStatus::Completed | QueueItemStatus::ImportPending
        )
    }
}

impl std::fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueItemStatus::Queued => "queued",
            QueueItemStatus::Downloading => "downloading",
            QueueItemStatus::Completed => "completed",
            QueueItemStatus::Failed => "failed",
            QueueItemStatus::Warning => "warning",
            QueueItemStatus::DownloadClientUnavailable => "downloadClientUnavailable",
            QueueItemStatus::Delay => "delay",
            QueueItemStatus::ImportPending => "importPending",
            QueueItemStatus::Importing => "importing",
            QueueItemStatus::Imported => "imported",
            QueueItemStatus::FailedPending => "failedPending",
            QueueItemStatus::Ignored => "ignored",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// A titled group of typed messages surfaced on the queue item, e.g.
/// "Qualitative" or "Permissions".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub title: String,
    pub level: MessageLevel,
    pub messages: Vec<String>,
}

impl StatusMessage {
    pub fn error(title: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            title: title.into(),
            level: MessageLevel::Error,
            messages,
        }
    }

    pub fn warning(title: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            title: title.into(),
            level: MessageLevel::Warning,
            messages,
        }
    }
}

/// A download being tracked at a client. Created at grab, removed when
/// terminal. Idempotency key for the grab handoff is
/// `(download_client_id, download_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub release_id: Option<Uuid>,

    pub title: String,
    pub download_client_id: i32,
    /// Opaque id assigned by the download client.
    pub download_id: String,
    pub protocol: Protocol,

    pub size_bytes: i64,
    pub size_left: i64,

    pub status: QueueItemStatus,
    pub status_messages: Vec<StatusMessage>,
    pub output_path: Option<String>,
    pub import_attempts: i32,

    pub added_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl QueueItem {
    pub fn new(
        movie_id: Uuid,
        title: String,
        download_client_id: i32,
        download_id: String,
        protocol: Protocol,
        size_bytes: i64,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            movie_id,
            release_id: None,
            title,
            download_client_id,
            download_id,
            protocol,
            size_bytes,
            size_left: size_bytes,
            status: QueueItemStatus::default(),
            status_messages: Vec::new(),
            output_path: None,
            import_attempts: 0,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, status: QueueItemStatus) {
        self.status = status;
        self.updated_at = chrono::Utc::now();
    }

    pub fn push_message(&mut self, message: StatusMessage) {
        self.status_messages.push(message);
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(QueueItemStatus::Imported.is_terminal());
        assert!(QueueItemStatus::Failed.is_terminal());
        assert!(QueueItemStatus::Ignored.is_terminal());
        assert!(!QueueItemStatus::ImportPending.is_terminal());
        assert!(!QueueItemStatus::FailedPending.is_terminal());
    }
}
