//! Release-title parsing
//!
//! Extracts the structured parts of a scene-style release or file name:
//! title, year, quality tier, revision (proper/repack), languages, release
//! group, edition, external ids and sample indicators.

use once_cell::sync::Lazy;
use reelvault_core::models::{Language, ParsedMovieInfo, QualityId};
use regex::Regex;

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());
static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(2160p|4k|1080p|720p|480p|576p)\b").unwrap());
static PROPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(proper|repack)(\d)?\b").unwrap());
static RELEASE_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\s*([A-Za-z0-9][A-Za-z0-9_]+)(?:\.[A-Za-z0-9]{2,4})?$").unwrap());
static TMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btmdb(?:id)?[-_ ]?(\d{1,8})\b").unwrap());
static IMDB_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(tt\d{7,8})\b").unwrap());
static SAMPLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(sample|trailer|preview)\b").unwrap());
static EDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b((?:director'?s|extended|theatrical|ultimate|final)(?:[. ](?:cut|edition))?|unrated|uncut|remastered|imax)\b",
    )
    .unwrap()
});

/// Video container extensions stripped before group extraction.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "wmv", "mov", "flv", "m4v", "mpg", "mpeg", "ts", "webm",
];

pub fn parse_release_title(title: &str) -> ParsedMovieInfo {
    let stripped = strip_extension(title);
    let mut parsed = ParsedMovieInfo {
        languages: parse_languages(stripped),
        quality: parse_quality(stripped),
        revision: parse_revision(stripped),
        release_group: parse_release_group(stripped),
        edition: EDITION
            .captures(stripped)
            .map(|c| normalize_token(c.get(1).unwrap().as_str())),
        scene: stripped.contains('.') && !stripped.contains(' '),
        tmdb_id: TMDB_ID
            .captures(stripped)
            .and_then(|c| c.get(1).unwrap().as_str().parse().ok()),
        imdb_id: IMDB_ID
            .captures(stripped)
            .map(|c| c.get(1).unwrap().as_str().to_lowercase()),
        sample: SAMPLE.is_match(stripped),
        ..Default::default()
    };

    // Year: last plausible match, so titles like "2001 A Space Odyssey 1968"
    // pick the release year.
    let year_match = YEAR.find_iter(stripped).last();
    parsed.year = year_match.map(|m| m.as_str().parse().unwrap());

    // Title: everything before the year (or the first quality token).
    let title_end = year_match
        .map(|m| m.start())
        .or_else(|| RESOLUTION.find(stripped).map(|m| m.start()))
        .unwrap_or(stripped.len());
    parsed.primary_title = clean_title(&stripped[..title_end]);

    parsed
}

fn strip_extension(title: &str) -> &str {
    if let Some((stem, ext)) = title.rsplit_once('.') {
        if VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return stem;
        }
    }
    title
}

fn clean_title(raw: &str) -> String {
    let spaced = raw.replace(['.', '_'], " ");
    let mut cleaned: String = spaced
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '\'' || *c == '-')
        .collect();
    cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    // Trailing separators left over from "Title (1999)" style names
    cleaned.trim_matches(['-', ' ']).to_string()
}

fn normalize_token(token: &str) -> String {
    token.replace('.', " ")
}

fn parse_revision(title: &str) -> i32 {
    let mut revision = 0;
    for caps in PROPER.captures_iter(title) {
        let n = caps
            .get(2)
            .and_then(|d| d.as_str().parse::<i32>().ok())
            .unwrap_or(1);
        revision = revision.max(n);
    }
    revision
}

fn parse_release_group(title: &str) -> Option<String> {
    let group = RELEASE_GROUP.captures(title)?.get(1)?.as_str();
    // A bare resolution or year at the end is not a group.
    if RESOLUTION.is_match(group) || YEAR.is_match(group) {
        return None;
    }
    Some(group.to_string())
}

fn parse_languages(title: &str) -> Vec<Language> {
    let lower = title.to_lowercase();
    let mut languages = Vec::new();
    let table: &[(&str, Language)] = &[
        ("french", Language::French),
        ("vostfr", Language::French),
        ("german", Language::German),
        ("spanish", Language::Spanish),
        ("castellano", Language::Spanish),
        ("italian", Language::Italian),
        ("japanese", Language::Japanese),
        ("korean", Language::Korean),
        ("mandarin", Language::Chinese),
        ("cantonese", Language::Chinese),
        ("chinese", Language::Chinese),
        ("russian", Language::Russian),
        ("portuguese", Language::Portuguese),
        ("dutch", Language::Dutch),
        ("swedish", Language::Swedish),
        ("norwegian", Language::Norwegian),
        ("danish", Language::Danish),
        ("hindi", Language::Hindi),
    ];
    for (token, language) in table {
        if contains_token(&lower, token) && !languages.contains(language) {
            languages.push(*language);
        }
    }
    // MULTI releases carry English alongside the tagged languages.
    if contains_token(&lower, "multi") || contains_token(&lower, "english") || languages.is_empty()
    {
        languages.insert(0, Language::English);
    }
    languages
}

fn contains_token(haystack: &str, token: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|part| part == token)
}

fn parse_quality(title: &str) -> QualityId {
    let lower = title.to_lowercase();
    let resolution = RESOLUTION
        .find(&lower)
        .map(|m| match m.as_str() {
            "2160p" | "4k" => 2160,
            "1080p" => 1080,
            "720p" => 720,
            _ => 480,
        })
        .unwrap_or(0);

    let has = |token: &str| contains_token(&lower, token);
    let bluray = has("bluray") || has("blu") || has("bdrip") || has("brrip") || has("bd");
    let remux = has("remux");
    let webdl = has("webdl") || lower.contains("web-dl") || has("webrip") || has("web");
    let hdtv = has("hdtv") || has("pdtv");
    let dvd = has("dvd") || has("dvdrip") || has("ntsc") || has("pal");

    match (resolution, remux, bluray, webdl, hdtv, dvd) {
        (2160, true, ..) => QualityId::Remux2160p,
        (1080, true, ..) => QualityId::Remux1080p,
        (2160, _, true, ..) => QualityId::Bluray2160p,
        (1080, _, true, ..) => QualityId::Bluray1080p,
        (720, _, true, ..) => QualityId::Bluray720p,
        (2160, _, _, true, ..) => QualityId::Webdl2160p,
        (1080, _, _, true, ..) => QualityId::Webdl1080p,
        (720, _, _, true, ..) => QualityId::Webdl720p,
        (480, _, _, true, ..) => QualityId::Webdl480p,
        (2160, _, _, _, true, _) => QualityId::Hdtv2160p,
        (1080, _, _, _, true, _) => QualityId::Hdtv1080p,
        (720, _, _, _, true, _) => QualityId::Hdtv720p,
        (_, _, _, _, _, true) => QualityId::Dvd,
        // Bare resolutions fall back to the HDTV tier of that resolution.
        (2160, ..) => QualityId::Hdtv2160p,
        (1080, ..) => QualityId::Hdtv1080p,
        (720, ..) => QualityId::Hdtv720p,
        (480, ..) => QualityId::Sdtv,
        _ if hdtv => QualityId::Sdtv,
        _ => QualityId::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_standard_scene_name() {
        let parsed = parse_release_title("Fight.Club.1999.1080p.BluRay.x264-GROUP");
        assert_eq!(parsed.primary_title, "Fight Club");
        assert_eq!(parsed.year, Some(1999));
        assert_eq!(parsed.quality, QualityId::Bluray1080p);
        assert_eq!(parsed.release_group.as_deref(), Some("GROUP"));
        assert_eq!(parsed.languages, vec![Language::English]);
        assert_eq!(parsed.revision, 0);
        assert!(!parsed.sample);
    }

    #[test]
    fn parses_webdl_and_remux_tiers() {
        assert_eq!(
            parse_release_title("Movie.2020.2160p.WEB-DL.DDP5.1-X").quality,
            QualityId::Webdl2160p
        );
        assert_eq!(
            parse_release_title("Movie.2020.1080p.BluRay.REMUX.AVC-X").quality,
            QualityId::Remux1080p
        );
        assert_eq!(
            parse_release_title("Movie.2020.720p.HDTV.x264-X").quality,
            QualityId::Hdtv720p
        );
        assert_eq!(
            parse_release_title("Movie.2020.DVDRip.XviD-X").quality,
            QualityId::Dvd
        );
    }

    #[test]
    fn year_prefers_the_last_match() {
        let parsed = parse_release_title("2012.2009.1080p.BluRay.x264-X");
        assert_eq!(parsed.primary_title, "2012");
        assert_eq!(parsed.year, Some(2009));
    }

    #[test]
    fn proper_and_repack_bump_revision() {
        assert_eq!(parse_release_title("Movie.2020.PROPER.1080p.BluRay-X").revision, 1);
        assert_eq!(parse_release_title("Movie.2020.REPACK2.1080p.BluRay-X").revision, 2);
        assert_eq!(parse_release_title("Movie.2020.1080p.BluRay-X").revision, 0);
    }

    #[test]
    fn multi_language_includes_english() {
        let parsed = parse_release_title("Movie.2020.MULTi.FRENCH.1080p.BluRay-X");
        assert!(parsed.languages.contains(&Language::English));
        assert!(parsed.languages.contains(&Language::French));
    }

    #[test]
    fn sample_indicators_are_detected() {
        assert!(parse_release_title("Movie.2020.1080p.sample.mkv").sample);
        assert!(parse_release_title("Movie.Trailer.2020.1080p").sample);
        assert!(!parse_release_title("Movie.2020.1080p.BluRay-X").sample);
    }

    #[test]
    fn external_ids_are_extracted() {
        let parsed = parse_release_title("Movie.2020.1080p.tmdb-550.tt0137523.BluRay-X");
        assert_eq!(parsed.tmdb_id, Some(550));
        assert_eq!(parsed.imdb_id.as_deref(), Some("tt0137523"));
    }

    #[test]
    fn file_extension_does_not_become_the_group() {
        let parsed = parse_release_title("Fight Club (1999) Bluray-1080p.mkv");
        assert_eq!(parsed.quality, QualityId::Bluray1080p);
        assert_eq!(parsed.primary_title, "Fight Club");
    }

    #[test]
    fn edition_is_extracted() {
        let parsed = parse_release_title("Movie.2020.Directors.Cut.1080p.BluRay-X");
        assert!(parsed.edition.is_some());
        let parsed = parse_release_title("Movie.2020.IMAX.1080p.BluRay-X");
        assert_eq!(parsed.edition.as_deref().map(str::to_lowercase), Some("imax".into()));
    }
}
