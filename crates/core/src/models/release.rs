//! Release domain model
//!
//! A release is a candidate found at an indexer, retained for history.
//! `(guid, indexer_id)` is the dedup key across searches.

use crate::models::decision::Rejection;
use crate::models::indexer::Protocol;
use crate::models::language::Language;
use crate::models::quality::QualityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseStatus {
    #[default]
    Available,
    Grabbed,
    Rejected,
    Failed,
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleaseStatus::Available => write!(f, "available"),
            ReleaseStatus::Grabbed => write!(f, "grabbed"),
            ReleaseStatus::Rejected => write!(f, "rejected"),
            ReleaseStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: Uuid,
    pub guid: String,
    pub indexer_id: i32,
    pub movie_id: Option<Uuid>,

    pub title: String,
    pub download_url: String,
    pub info_url: Option<String>,

    pub size_bytes: i64,
    pub age_hours: Option<i64>,
    pub publish_date: Option<chrono::DateTime<chrono::Utc>>,
    pub seeders: Option<i32>,
    pub leechers: Option<i32>,
    pub protocol: Protocol,

    pub quality: QualityId,
    pub quality_weight: i32,
    pub languages: Vec<Language>,
    pub release_group: Option<String>,

    pub status: ReleaseStatus,
    pub rejection_reasons: Vec<Rejection>,

    pub download_client_id: Option<i32>,
    pub grabbed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Release {
    pub fn new(
        guid: String,
        indexer_id: i32,
        title: String,
        download_url: String,
        protocol: Protocol,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guid,
            indexer_id,
            movie_id: None,
            title,
            download_url,
            info_url: None,
            size_bytes: 0,
            age_hours: None,
            publish_date: None,
            seeders: None,
            leechers: None,
            protocol,
            quality: QualityId::Unknown,
            quality_weight: QualityId::Unknown.weight(),
            languages: Vec::new(),
            release_group: None,
            status: ReleaseStatus::default(),
            rejection_reasons: Vec::new(),
            download_client_id: None,
            grabbed_at: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn set_quality(&mut self, quality: QualityId) {
        self.quality = quality;
        self.quality_weight = quality.weight();
    }

    pub fn reject(&mut self, reasons: Vec<Rejection>) {
        self.status = ReleaseStatus::Rejected;
        self.rejection_reasons = reasons;
    }
}
