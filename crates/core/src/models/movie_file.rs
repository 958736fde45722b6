//! Movie file domain model

use crate::models::language::Language;
use crate::models::quality::QualityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Technical stream details produced by the media-info adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub video_codec: Option<String>,
    pub video_bit_depth: Option<i32>,
    pub video_resolution: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<f32>,
    pub audio_languages: Vec<Language>,
    pub subtitle_languages: Vec<Language>,
    pub runtime_seconds: Option<i64>,
}

/// The single file registered for a movie. Exclusive child: a movie has at
/// most one, and deleting the movie cascades to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieFile {
    pub id: Uuid,
    pub movie_id: Uuid,

    pub path: String,
    pub relative_path: String,
    pub size_bytes: i64,

    pub quality: QualityId,
    /// Proper/repack counter; 0 for the initial release.
    pub revision: i32,
    pub languages: Vec<Language>,
    pub custom_format_ids: Vec<i32>,
    pub format_score: i32,
    pub release_group: Option<String>,
    pub edition: Option<String>,
    pub media_info: Option<MediaInfo>,

    pub date_added: chrono::DateTime<chrono::Utc>,
}

impl MovieFile {
    pub fn new(movie_id: Uuid, path: String, relative_path: String, size_bytes: i64, quality: QualityId) -> Self {
        Self {
            id: Uuid::new_v4(),
            movie_id,
            path,
            relative_path,
            size_bytes,
            quality,
            revision: 0,
            languages: Vec::new(),
            custom_format_ids: Vec::new(),
            format_score: 0,
            release_group: None,
            edition: None,
            media_info: None,
            date_added: chrono::Utc::now(),
        }
    }

    pub fn quality_weight(&self) -> i32 {
        self.quality.weight()
    }
}
