//! Append-only history of domain events

use crate::models::quality::QualityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryEventType {
    Grabbed,
    DownloadFolderImported,
    QualityUpgraded,
    DownloadFailed,
    MovieFileDeleted,
    MovieDeleted,
    Ignored,
}

impl std::fmt::Display for HistoryEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HistoryEventType::Grabbed => "grabbed",
            HistoryEventType::DownloadFolderImported => "downloadFolderImported",
            HistoryEventType::QualityUpgraded => "qualityUpgraded",
            HistoryEventType::DownloadFailed => "downloadFailed",
            HistoryEventType::MovieFileDeleted => "movieFileDeleted",
            HistoryEventType::MovieDeleted => "movieDeleted",
            HistoryEventType::Ignored => "ignored",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub id: Uuid,
    pub event_type: HistoryEventType,
    pub date: DateTime<Utc>,
    /// Nulled (not deleted) when the movie goes away.
    pub movie_id: Option<Uuid>,
    pub quality: Option<QualityId>,
    pub source_title: String,
    pub download_id: Option<String>,
    /// Opaque event payload, typed only by `event_type`.
    pub payload: serde_json::Value,
    pub successful: bool,
    pub message: Option<String>,
}

impl History {
    pub fn new(
        event_type: HistoryEventType,
        date: DateTime<Utc>,
        source_title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            date,
            movie_id: None,
            quality: None,
            source_title: source_title.into(),
            download_id: None,
            payload: serde_json::json!({}),
            successful: true,
            message: None,
        }
    }

    pub fn for_movie(mut self, movie_id: Uuid) -> Self {
        self.movie_id = Some(movie_id);
        self
    }

    pub fn with_quality(mut self, quality: QualityId) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_download_id(mut self, download_id: impl Into<String>) -> Self {
        self.download_id = Some(download_id.into());
        self
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.successful = false;
        self.message = Some(message.into());
        self
    }
}
