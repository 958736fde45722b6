//! The release decision engine
//!
//! Deterministic evaluation of one candidate against a movie, its quality
//! profile and its current file. Steps run in a fixed order and the first
//! failing step produces the typed rejection:
//! identity → sample → quality allowed → language → size band → format
//! score → upgrade rules.

use crate::formats::{matching_formats, FormatContext};
use crate::parser::parse_release_title;
use reelvault_core::models::{
    slugify, Decision, DecisionRequest, ParsedMovieInfo, Rejection, RejectionReason,
    ReleaseDecider,
};
use tracing::trace;

/// Releases smaller than this are treated as samples.
pub const SAMPLE_SIZE_BYTES: i64 = 150 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    fn reject(reason: RejectionReason, message: impl Into<String>) -> Decision {
        Decision::Rejected {
            reasons: vec![Rejection::new(reason, message)],
        }
    }

    /// The release must parse to the target movie: a matching external id,
    /// or a matching title with a compatible year.
    fn identity_matches(parsed: &ParsedMovieInfo, request: &DecisionRequest<'_>) -> Option<bool> {
        if let Some(tmdb_id) = parsed.tmdb_id {
            return Some(tmdb_id == request.movie.tmdb_id);
        }
        if let (Some(parsed_imdb), Some(movie_imdb)) = (&parsed.imdb_id, &request.movie.imdb_id) {
            return Some(parsed_imdb.eq_ignore_ascii_case(movie_imdb));
        }
        if parsed.primary_title.is_empty() {
            return None;
        }
        let release_slug = slugify(&parsed.primary_title);
        let title_match = release_slug == slugify(&request.movie.title)
            || Some(release_slug.as_str())
                == request
                    .movie
                    .original_title
                    .as_deref()
                    .map(slugify)
                    .as_deref();
        let year_match = match (parsed.year, request.movie.year) {
            (Some(a), Some(b)) => (a - b).abs() <= 1,
            _ => true,
        };
        Some(title_match && year_match)
    }
}

impl ReleaseDecider for DecisionEngine {
    fn parse_title(&self, title: &str) -> ParsedMovieInfo {
        parse_release_title(title)
    }

    fn decide(&self, request: &DecisionRequest<'_>) -> Decision {
        let parsed = request.parsed;
        let profile = request.profile;

        // 1. Identity
        match Self::identity_matches(parsed, request) {
            None => {
                return Self::reject(
                    RejectionReason::UnknownMovie,
                    format!("could not parse a movie out of '{}'", request.release_title),
                )
            }
            Some(false) => {
                return Self::reject(
                    RejectionReason::WrongMovie,
                    format!(
                        "release '{}' does not match {}",
                        request.release_title, request.movie.title
                    ),
                )
            }
            Some(true) => {}
        }

        // 2. Sample / size sanity
        if parsed.sample || (request.size_bytes > 0 && request.size_bytes < SAMPLE_SIZE_BYTES) {
            return Self::reject(
                RejectionReason::Sample,
                format!("sample-like release ({} bytes)", request.size_bytes),
            );
        }

        // 3. Quality allowed in the profile
        if !profile.is_allowed(parsed.quality) {
            return Self::reject(
                RejectionReason::UnwantedQuality,
                format!("{} is not allowed by profile {}", parsed.quality, profile.name),
            );
        }

        // 4. Language
        if !profile.accepts_language(&parsed.languages) {
            return Self::reject(
                RejectionReason::UnwantedLanguage,
                format!(
                    "none of [{}] is wanted by profile {}",
                    parsed
                        .languages
                        .iter()
                        .map(|l| l.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    profile.name
                ),
            );
        }

        // 5. Size band (MB per minute of runtime; max_size 0 is unbounded)
        if let Some(runtime) = request.movie.runtime_minutes {
            if !parsed.quality.size_in_band(request.size_bytes, runtime) {
                let def = parsed.quality.definition();
                return Self::reject(
                    RejectionReason::UnwantedQuality,
                    format!(
                        "size {} outside [{}, {}] MB/min for {}",
                        request.size_bytes, def.min_size, def.max_size, parsed.quality
                    ),
                );
            }
        }

        // 6. Custom-format score
        let matched = matching_formats(
            request.formats,
            &FormatContext {
                title: request.release_title,
                parsed,
                size_bytes: request.size_bytes,
            },
        );
        let score = profile.format_score(&matched);
        if score < profile.min_format_score {
            return Self::reject(
                RejectionReason::BelowMinFormatScore,
                format!(
                    "format score {} below minimum {}",
                    score, profile.min_format_score
                ),
            );
        }

        // 7. Upgrade rules against the existing file
        if let Some(current) = request.current_file {
            if !profile.upgrade_allowed {
                return Self::reject(
                    RejectionReason::ExistingFile,
                    "movie already has a file and upgrades are disabled",
                );
            }
            let cur_q = current.quality_weight();
            let new_q = parsed.quality.weight();
            let cur_s = current.format_score;
            let cutoff_q = profile.cutoff_weight();

            if cur_q >= cutoff_q && cur_s >= profile.cutoff_format_score {
                return Self::reject(
                    RejectionReason::QualityCutoffMet,
                    format!("existing {} already meets the cutoff", current.quality),
                );
            }

            let is_upgrade = new_q > cur_q || (new_q == cur_q && score > cur_s);
            let is_revision_bump = new_q == cur_q && parsed.revision > current.revision;
            if !is_upgrade && !is_revision_bump {
                return Self::reject(
                    RejectionReason::NotAnUpgrade,
                    format!(
                        "{} (score {}) is not an upgrade over {} (score {})",
                        parsed.quality, score, current.quality, cur_s
                    ),
                );
            }
        }

        trace!(release = request.release_title, score, "release approved");
        Decision::Accepted {
            upgrade: request.current_file.is_some(),
            format_score: score,
            matched_format_ids: matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelvault_core::models::{
        CustomFormat, FormatScore, FormatSpecification, Language, Movie, MovieFile, Protocol,
        ProfileItem, QualityId, QualityProfile, SpecImplementation,
    };

    fn profile() -> QualityProfile {
        QualityProfile::new(
            "HD".to_string(),
            vec![
                ProfileItem { quality: QualityId::Hdtv720p, allowed: true },
                ProfileItem { quality: QualityId::Bluray1080p, allowed: true },
            ],
            QualityId::Bluray1080p,
        )
    }

    fn movie() -> Movie {
        let mut movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        movie.year = Some(1999);
        movie.runtime_minutes = Some(139);
        movie
    }

    fn decide(
        title: &str,
        size: i64,
        profile: &QualityProfile,
        movie: &Movie,
        formats: &[CustomFormat],
        file: Option<&MovieFile>,
    ) -> Decision {
        let engine = DecisionEngine::new();
        let parsed = engine.parse_title(title);
        engine.decide(&DecisionRequest {
            parsed: &parsed,
            release_title: title,
            size_bytes: size,
            age_hours: Some(4),
            protocol: Protocol::Torrent,
            seeders: Some(20),
            movie,
            profile,
            formats,
            current_file: file,
        })
    }

    fn first_reason(decision: &Decision) -> RejectionReason {
        decision.rejections()[0].reason
    }

    #[test]
    fn approves_a_matching_release() {
        let decision = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile(),
            &movie(),
            &[],
            None,
        );
        assert!(matches!(
            decision,
            Decision::Accepted { upgrade: false, format_score: 0, .. }
        ));
    }

    #[test]
    fn wrong_movie_is_rejected() {
        let decision = decide(
            "The.Matrix.1999.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile(),
            &movie(),
            &[],
            None,
        );
        assert_eq!(first_reason(&decision), RejectionReason::WrongMovie);
    }

    #[test]
    fn samples_are_rejected() {
        let by_name = decide(
            "Fight.Club.1999.1080p.BluRay.sample-GROUP",
            8_500_000_000,
            &profile(),
            &movie(),
            &[],
            None,
        );
        assert_eq!(first_reason(&by_name), RejectionReason::Sample);

        let by_size = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            100 * 1024 * 1024,
            &profile(),
            &movie(),
            &[],
            None,
        );
        assert_eq!(first_reason(&by_size), RejectionReason::Sample);
    }

    #[test]
    fn disallowed_quality_is_rejected() {
        let decision = decide(
            "Fight.Club.1999.2160p.REMUX-GROUP",
            60_000_000_000,
            &profile(),
            &movie(),
            &[],
            None,
        );
        assert_eq!(first_reason(&decision), RejectionReason::UnwantedQuality);
    }

    #[test]
    fn unwanted_language_is_rejected() {
        let mut profile = profile();
        profile.languages = vec![Language::English];

        let french_only = decide(
            "Fight.Club.1999.FRENCH.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile,
            &movie(),
            &[],
            None,
        );
        assert_eq!(first_reason(&french_only), RejectionReason::UnwantedLanguage);

        // MULTI releases carry English and pass.
        let multi = decide(
            "Fight.Club.1999.MULTi.FRENCH.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile,
            &movie(),
            &[],
            None,
        );
        assert!(multi.is_accepted());
    }

    #[test]
    fn size_band_rejects_oversized_release() {
        // 139 min * 150 MB/min cap for Bluray-1080p ≈ 20.4 GB
        let decision = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            60_000_000_000,
            &profile(),
            &movie(),
            &[],
            None,
        );
        assert_eq!(first_reason(&decision), RejectionReason::UnwantedQuality);
    }

    #[test]
    fn size_band_unbounded_when_max_is_zero() {
        let mut profile = profile();
        profile.items.push(ProfileItem { quality: QualityId::Remux1080p, allowed: true });
        profile.cutoff = QualityId::Remux1080p;
        let decision = decide(
            "Fight.Club.1999.1080p.REMUX-GROUP",
            300_000_000_000,
            &profile,
            &movie(),
            &[],
            None,
        );
        assert!(decision.is_accepted());
    }

    #[test]
    fn format_score_below_minimum_is_rejected() {
        let mut profile = profile();
        profile.min_format_score = 10;
        let mut format = CustomFormat::new(
            "HEVC".to_string(),
            vec![FormatSpecification::new(SpecImplementation::ReleaseTitle, "x265")],
        );
        format.id = 1;
        profile.format_scores = vec![FormatScore { format_id: 1, score: 20 }];

        let rejected = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile,
            &movie(),
            std::slice::from_ref(&format),
            None,
        );
        assert_eq!(first_reason(&rejected), RejectionReason::BelowMinFormatScore);

        let accepted = decide(
            "Fight.Club.1999.1080p.BluRay.x265-GROUP",
            8_500_000_000,
            &profile,
            &movie(),
            std::slice::from_ref(&format),
            None,
        );
        assert!(matches!(accepted, Decision::Accepted { format_score: 20, .. }));
    }

    #[test]
    fn cutoff_met_blocks_further_upgrades() {
        // E2: file at Bluray-1080p, cutoff Bluray-1080p, format scores 0.
        let movie = movie();
        let file = MovieFile::new(
            movie.id,
            "/movies/fc.mkv".to_string(),
            "fc.mkv".to_string(),
            8_000_000_000,
            QualityId::Bluray1080p,
        );
        let decision = decide(
            "Fight.Club.1999.720p.HDTV.x264-GROUP",
            4_000_000_000,
            &profile(),
            &movie,
            &[],
            Some(&file),
        );
        assert_eq!(first_reason(&decision), RejectionReason::QualityCutoffMet);
    }

    #[test]
    fn upgrades_blocked_when_disallowed() {
        let mut profile = profile();
        profile.upgrade_allowed = false;
        let movie = movie();
        let file = MovieFile::new(
            movie.id,
            "/movies/fc.mkv".to_string(),
            "fc.mkv".to_string(),
            4_000_000_000,
            QualityId::Hdtv720p,
        );
        let decision = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile,
            &movie,
            &[],
            Some(&file),
        );
        assert_eq!(first_reason(&decision), RejectionReason::ExistingFile);
    }

    #[test]
    fn higher_quality_is_an_upgrade() {
        let movie = movie();
        let file = MovieFile::new(
            movie.id,
            "/movies/fc.mkv".to_string(),
            "fc.mkv".to_string(),
            4_000_000_000,
            QualityId::Hdtv720p,
        );
        let decision = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile(),
            &movie,
            &[],
            Some(&file),
        );
        assert!(matches!(decision, Decision::Accepted { upgrade: true, .. }));
    }

    #[test]
    fn same_quality_without_better_score_is_not_an_upgrade() {
        let movie = movie();
        let mut file = MovieFile::new(
            movie.id,
            "/movies/fc.mkv".to_string(),
            "fc.mkv".to_string(),
            8_000_000_000,
            QualityId::Hdtv720p,
        );
        file.format_score = 0;
        let mut profile = profile();
        profile.cutoff = QualityId::Bluray1080p;
        let decision = decide(
            "Fight.Club.1999.720p.HDTV.x264-OTHER",
            4_000_000_000,
            &profile,
            &movie,
            &[],
            Some(&file),
        );
        assert_eq!(first_reason(&decision), RejectionReason::NotAnUpgrade);
    }

    #[test]
    fn proper_revision_promotes_at_equal_quality() {
        let movie = movie();
        let file = MovieFile::new(
            movie.id,
            "/movies/fc.mkv".to_string(),
            "fc.mkv".to_string(),
            8_000_000_000,
            QualityId::Hdtv720p,
        );
        let decision = decide(
            "Fight.Club.1999.PROPER.720p.HDTV.x264-GROUP",
            4_000_000_000,
            &profile(),
            &movie,
            &[],
            Some(&file),
        );
        assert!(matches!(decision, Decision::Accepted { upgrade: true, .. }));
    }

    #[test]
    fn decisions_are_deterministic() {
        // Invariant: same inputs, same outcome.
        let profile = profile();
        let movie = movie();
        let first = decide(
            "Fight.Club.1999.1080p.BluRay.x264-GROUP",
            8_500_000_000,
            &profile,
            &movie,
            &[],
            None,
        );
        for _ in 0..10 {
            let again = decide(
                "Fight.Club.1999.1080p.BluRay.x264-GROUP",
                8_500_000_000,
                &profile,
                &movie,
                &[],
                None,
            );
            assert_eq!(first, again);
        }
    }
}
