//! Quality ladder and quality profiles
//!
//! Qualities are a system-wide enumeration with stable integer ids and a
//! monotone weight used for ordering. New qualities get new ids and new
//! weights; existing ones never change, so persisted rows stay comparable
//! across versions.

use crate::error::{ReelvaultError, Result};
use crate::models::language::Language;
use serde::{Deserialize, Serialize};

/// Stable quality identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityId {
    Unknown,
    Sdtv,
    Dvd,
    Webdl480p,
    Hdtv720p,
    Webdl720p,
    Bluray720p,
    Hdtv1080p,
    Webdl1080p,
    Bluray1080p,
    Remux1080p,
    Hdtv2160p,
    Webdl2160p,
    Bluray2160p,
    Remux2160p,
}

/// Definition row for a quality: display title, ordering weight and the
/// acceptable size band in megabytes per minute of runtime.
#[derive(Debug, Clone)]
pub struct QualityDefinition {
    pub id: i32,
    pub quality: QualityId,
    pub title: &'static str,
    pub weight: i32,
    pub min_size: f64,
    /// Zero means unbounded.
    pub max_size: f64,
}

const DEFINITIONS: &[QualityDefinition] = &[
    QualityDefinition { id: 0, quality: QualityId::Unknown, title: "Unknown", weight: 1, min_size: 0.0, max_size: 0.0 },
    QualityDefinition { id: 1, quality: QualityId::Sdtv, title: "SDTV", weight: 2, min_size: 0.0, max_size: 20.0 },
    QualityDefinition { id: 2, quality: QualityId::Dvd, title: "DVD", weight: 3, min_size: 0.0, max_size: 20.0 },
    QualityDefinition { id: 8, quality: QualityId::Webdl480p, title: "WEBDL-480p", weight: 4, min_size: 0.0, max_size: 20.0 },
    QualityDefinition { id: 4, quality: QualityId::Hdtv720p, title: "HDTV-720p", weight: 10, min_size: 2.0, max_size: 60.0 },
    QualityDefinition { id: 5, quality: QualityId::Webdl720p, title: "WEBDL-720p", weight: 11, min_size: 2.0, max_size: 60.0 },
    QualityDefinition { id: 6, quality: QualityId::Bluray720p, title: "Bluray-720p", weight: 12, min_size: 3.0, max_size: 90.0 },
    QualityDefinition { id: 9, quality: QualityId::Hdtv1080p, title: "HDTV-1080p", weight: 15, min_size: 3.0, max_size: 100.0 },
    QualityDefinition { id: 3, quality: QualityId::Webdl1080p, title: "WEBDL-1080p", weight: 16, min_size: 3.0, max_size: 100.0 },
    QualityDefinition { id: 7, quality: QualityId::Bluray1080p, title: "Bluray-1080p", weight: 22, min_size: 4.0, max_size: 150.0 },
    QualityDefinition { id: 30, quality: QualityId::Remux1080p, title: "Remux-1080p", weight: 23, min_size: 15.0, max_size: 0.0 },
    QualityDefinition { id: 16, quality: QualityId::Hdtv2160p, title: "HDTV-2160p", weight: 25, min_size: 6.0, max_size: 200.0 },
    QualityDefinition { id: 18, quality: QualityId::Webdl2160p, title: "WEBDL-2160p", weight: 26, min_size: 6.0, max_size: 200.0 },
    QualityDefinition { id: 19, quality: QualityId::Bluray2160p, title: "Bluray-2160p", weight: 30, min_size: 8.0, max_size: 270.0 },
    QualityDefinition { id: 31, quality: QualityId::Remux2160p, title: "Remux-2160p", weight: 31, min_size: 25.0, max_size: 0.0 },
];

impl QualityId {
    pub fn definition(&self) -> &'static QualityDefinition {
        DEFINITIONS
            .iter()
            .find(|d| d.quality == *self)
            .expect("every quality has a definition")
    }

    pub fn weight(&self) -> i32 {
        self.definition().weight
    }

    pub fn title(&self) -> &'static str {
        self.definition().title
    }

    pub fn all() -> impl Iterator<Item = QualityId> {
        DEFINITIONS.iter().map(|d| d.quality)
    }

    /// Whether `size_bytes` for a movie of `runtime_minutes` falls inside
    /// this quality's MB-per-minute band. A zero `max_size` is unbounded.
    pub fn size_in_band(&self, size_bytes: i64, runtime_minutes: i32) -> bool {
        if runtime_minutes <= 0 || size_bytes <= 0 {
            return true;
        }
        let def = self.definition();
        let mb_per_minute = size_bytes as f64 / (1024.0 * 1024.0) / runtime_minutes as f64;
        if mb_per_minute < def.min_size {
            return false;
        }
        if def.max_size > 0.0 && mb_per_minute > def.max_size {
            return false;
        }
        true
    }
}

impl Default for QualityId {
    fn default() -> Self {
        QualityId::Unknown
    }
}

impl std::fmt::Display for QualityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// A quality entry in a profile with its allowed flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileItem {
    pub quality: QualityId,
    pub allowed: bool,
}

/// A (custom format, score) pair configured on a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatScore {
    pub format_id: i32,
    pub score: i32,
}

/// Quality profile governing which releases a movie accepts and when an
/// existing file stops being upgraded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: i32,
    pub name: String,
    pub items: Vec<ProfileItem>,
    pub cutoff: QualityId,
    pub upgrade_allowed: bool,
    pub min_format_score: i32,
    pub cutoff_format_score: i32,
    pub format_scores: Vec<FormatScore>,
    /// Accepted languages; empty accepts any.
    pub languages: Vec<Language>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl QualityProfile {
    pub fn new(name: String, items: Vec<ProfileItem>, cutoff: QualityId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            name,
            items,
            cutoff,
            upgrade_allowed: true,
            min_format_score: 0,
            cutoff_format_score: 0,
            format_scores: Vec::new(),
            languages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The cutoff must reference an allowed item of the profile.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReelvaultError::validation("name", "must not be empty"));
        }
        if self.items.iter().all(|i| !i.allowed) {
            return Err(ReelvaultError::validation(
                "items",
                "at least one quality must be allowed",
            ));
        }
        let cutoff_allowed = self
            .items
            .iter()
            .any(|i| i.quality == self.cutoff && i.allowed);
        if !cutoff_allowed {
            return Err(ReelvaultError::validation(
                "cutoff",
                "cutoff must reference an allowed quality in the profile",
            ));
        }
        Ok(())
    }

    pub fn is_allowed(&self, quality: QualityId) -> bool {
        self.items
            .iter()
            .any(|i| i.quality == quality && i.allowed)
    }

    pub fn accepts_language(&self, languages: &[Language]) -> bool {
        if self.languages.is_empty() {
            return true;
        }
        languages.iter().any(|l| self.languages.contains(l))
    }

    /// Sum of configured scores for the given matched formats.
    pub fn format_score(&self, matched_format_ids: &[i32]) -> i32 {
        self.format_scores
            .iter()
            .filter(|fs| matched_format_ids.contains(&fs.format_id))
            .map(|fs| fs.score)
            .sum()
    }

    pub fn cutoff_weight(&self) -> i32 {
        self.cutoff.weight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(cutoff: QualityId) -> QualityProfile {
        QualityProfile::new(
            "HD".to_string(),
            vec![
                ProfileItem { quality: QualityId::Hdtv720p, allowed: true },
                ProfileItem { quality: QualityId::Bluray1080p, allowed: true },
                ProfileItem { quality: QualityId::Remux2160p, allowed: false },
            ],
            cutoff,
        )
    }

    #[test]
    fn weights_are_monotone_across_the_ladder() {
        let mut last = 0;
        for def in super::DEFINITIONS {
            assert!(def.weight > last, "{} out of order", def.title);
            last = def.weight;
        }
    }

    #[test]
    fn cutoff_must_be_allowed() {
        assert!(profile(QualityId::Bluray1080p).validate().is_ok());
        assert!(profile(QualityId::Remux2160p).validate().is_err());
        assert!(profile(QualityId::Webdl480p).validate().is_err());
    }

    #[test]
    fn size_band_unbounded_when_max_is_zero() {
        // Remux-1080p has max_size = 0
        assert!(QualityId::Remux1080p.size_in_band(800 * 1024 * 1024 * 1024, 120));
        assert!(!QualityId::Remux1080p.size_in_band(100 * 1024 * 1024, 120));
    }

    #[test]
    fn size_band_rejects_out_of_range() {
        // 139 minutes at ~4.4 GB is ~32 MB/min, inside Bluray-1080p's band
        assert!(QualityId::Bluray1080p.size_in_band(4_400_000_000, 139));
        // 139 minutes at 100 GB is way above 150 MB/min
        assert!(!QualityId::Bluray1080p.size_in_band(100_000_000_000, 139));
    }

    #[test]
    fn format_score_sums_matched_only() {
        let mut p = profile(QualityId::Bluray1080p);
        p.format_scores = vec![
            FormatScore { format_id: 1, score: 10 },
            FormatScore { format_id: 2, score: -5 },
            FormatScore { format_id: 3, score: 100 },
        ];
        assert_eq!(p.format_score(&[1, 2]), 5);
        assert_eq!(p.format_score(&[]), 0);
        assert_eq!(p.format_score(&[3]), 100);
    }
}
