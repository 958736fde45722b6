//! Decision types shared between the search loop, the decision engine and
//! the import pipeline
//!
//! The engine itself lives in `reelvault-decision`; the core only knows the
//! `ReleaseDecider` contract so the dependency points outward.

use crate::models::indexer::Protocol;
use crate::models::language::Language;
use crate::models::movie::Movie;
use crate::models::movie_file::MovieFile;
use crate::models::quality::{QualityId, QualityProfile};
use crate::models::custom_format::CustomFormat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Stable rejection vocabulary shared by the decision engine and the import
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    UnknownMovie,
    WrongMovie,
    Sample,
    ExistingFile,
    SameFile,
    QualityCutoffMet,
    NotAnUpgrade,
    UnwantedLanguage,
    UnwantedQuality,
    BelowMinFormatScore,
    TorrentNotSeeding,
    InvalidPath,
    FileNotFound,
    AlreadyImported,
    HardlinkedFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionType {
    Permanent,
    Temporary,
}

impl RejectionReason {
    pub fn default_type(&self) -> RejectionType {
        match self {
            RejectionReason::TorrentNotSeeding
            | RejectionReason::FileNotFound
            | RejectionReason::InvalidPath => RejectionType::Temporary,
            _ => RejectionType::Permanent,
        }
    }
}

/// One typed rejection with a human-readable detail line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub rejection_type: RejectionType,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            rejection_type: reason.default_type(),
            message: message.into(),
        }
    }
}

/// Everything the parser could extract from a release or file name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedMovieInfo {
    pub primary_title: String,
    pub alternative_titles: Vec<String>,
    pub year: Option<i32>,
    pub quality: QualityId,
    /// Proper/repack counter extracted from the name.
    pub revision: i32,
    pub languages: Vec<Language>,
    pub release_group: Option<String>,
    pub edition: Option<String>,
    pub scene: bool,
    pub tmdb_id: Option<i32>,
    pub imdb_id: Option<String>,
    /// Name carries a sample/preview/trailer indicator.
    pub sample: bool,
}

/// One candidate put in front of the decision engine.
#[derive(Debug, Clone)]
pub struct DecisionRequest<'a> {
    pub parsed: &'a ParsedMovieInfo,
    pub release_title: &'a str,
    pub size_bytes: i64,
    pub age_hours: Option<i64>,
    pub protocol: Protocol,
    pub seeders: Option<i32>,
    pub movie: &'a Movie,
    pub profile: &'a QualityProfile,
    pub formats: &'a [CustomFormat],
    pub current_file: Option<&'a MovieFile>,
}

/// Outcome of a decision: accepted (possibly an upgrade) or rejected with
/// typed reasons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Accepted {
        upgrade: bool,
        format_score: i32,
        matched_format_ids: Vec<i32>,
    },
    Rejected { reasons: Vec<Rejection> },
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted { .. })
    }

    pub fn rejections(&self) -> &[Rejection] {
        match self {
            Decision::Accepted { .. } => &[],
            Decision::Rejected { reasons } => reasons,
        }
    }
}

/// Pure decision function over a candidate. Implemented by
/// `reelvault-decision`; consumed by the wanted-search loop and the import
/// pipeline.
pub trait ReleaseDecider: Send + Sync {
    /// Parse a release or file name into its structured parts.
    fn parse_title(&self, title: &str) -> ParsedMovieInfo;

    /// Evaluate one candidate. Must be a pure function of its inputs.
    fn decide(&self, request: &DecisionRequest<'_>) -> Decision;
}

/// Sort key for choosing among approved candidates in one search pass.
/// Orders by (format score desc, quality weight desc, protocol preference
/// asc, seeders desc, size asc, age asc) with the release guid as the final
/// deterministic tiebreak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateOrder {
    pub format_score: i32,
    pub quality_weight: i32,
    pub protocol: Protocol,
    pub seeders: i32,
    pub size_bytes: i64,
    pub age_hours: i64,
    pub guid: String,
}

impl CandidateOrder {
    fn protocol_preference(&self) -> i32 {
        // Usenet completes without seeding obligations; preferred on ties.
        match self.protocol {
            Protocol::Usenet => 0,
            Protocol::Torrent => 1,
        }
    }
}

impl Ord for CandidateOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .format_score
            .cmp(&self.format_score)
            .then(other.quality_weight.cmp(&self.quality_weight))
            .then(self.protocol_preference().cmp(&other.protocol_preference()))
            .then(other.seeders.cmp(&self.seeders))
            .then(self.size_bytes.cmp(&other.size_bytes))
            .then(self.age_hours.cmp(&other.age_hours))
            .then(self.guid.cmp(&other.guid))
    }
}

impl PartialOrd for CandidateOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
