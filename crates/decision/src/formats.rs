//! Custom-format evaluation
//!
//! A format matches a release iff every required specification matches and,
//! when any non-required specifications exist, at least one of them
//! matches. `negate` inverts the individual specification first.

use once_cell::sync::Lazy;
use reelvault_core::models::{
    CustomFormat, FormatSpecification, Language, ParsedMovieInfo, SpecImplementation,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Everything a specification can inspect.
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    pub title: &'a str,
    pub parsed: &'a ParsedMovieInfo,
    pub size_bytes: i64,
}

/// Ids of every format the release matches.
pub fn matching_formats(formats: &[CustomFormat], ctx: &FormatContext<'_>) -> Vec<i32> {
    formats
        .iter()
        .filter(|f| format_matches(f, ctx))
        .map(|f| f.id)
        .collect()
}

pub fn format_matches(format: &CustomFormat, ctx: &FormatContext<'_>) -> bool {
    let mut any_optional = false;
    let mut has_optional = false;
    for spec in &format.specifications {
        let outcome = spec_matches(spec, ctx) != spec.negate;
        if spec.required {
            if !outcome {
                return false;
            }
        } else {
            has_optional = true;
            any_optional |= outcome;
        }
    }
    !has_optional || any_optional
}

fn spec_matches(spec: &FormatSpecification, ctx: &FormatContext<'_>) -> bool {
    match spec.implementation {
        SpecImplementation::ReleaseTitle => regex_matches(&spec.value, ctx.title),
        SpecImplementation::ReleaseGroup => ctx
            .parsed
            .release_group
            .as_deref()
            .map(|g| regex_matches(&spec.value, g))
            .unwrap_or(false),
        SpecImplementation::Language => parse_language(&spec.value)
            .map(|l| ctx.parsed.languages.contains(&l))
            .unwrap_or(false),
        SpecImplementation::Source => source_matches(&spec.value, ctx.title),
        SpecImplementation::Resolution => {
            let lower = ctx.title.to_lowercase();
            lower.contains(&spec.value.to_lowercase())
        }
        SpecImplementation::Edition => ctx
            .parsed
            .edition
            .as_deref()
            .map(|e| regex_matches(&spec.value, e))
            .unwrap_or(false),
        SpecImplementation::Size => size_matches(&spec.value, ctx.size_bytes),
    }
}

/// Compiled-pattern cache; format specs are evaluated per candidate and the
/// same handful of patterns repeats constantly.
static PATTERN_CACHE: Lazy<Mutex<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn regex_matches(pattern: &str, haystack: &str) -> bool {
    let mut cache = PATTERN_CACHE.lock().unwrap();
    let compiled = cache
        .entry(pattern.to_string())
        .or_insert_with(|| match Regex::new(&format!("(?i){}", pattern)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern, "invalid custom format pattern: {}", e);
                None
            }
        });
    match compiled {
        Some(regex) => regex.is_match(haystack),
        // An invalid pattern falls back to a case-insensitive substring test.
        None => haystack.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

fn parse_language(value: &str) -> Option<Language> {
    let value = value.trim().to_lowercase();
    let language = match value.as_str() {
        "english" => Language::English,
        "french" => Language::French,
        "german" => Language::German,
        "spanish" => Language::Spanish,
        "italian" => Language::Italian,
        "japanese" => Language::Japanese,
        "korean" => Language::Korean,
        "chinese" => Language::Chinese,
        "russian" => Language::Russian,
        "portuguese" => Language::Portuguese,
        "dutch" => Language::Dutch,
        "swedish" => Language::Swedish,
        "norwegian" => Language::Norwegian,
        "danish" => Language::Danish,
        "hindi" => Language::Hindi,
        _ => return None,
    };
    Some(language)
}

fn source_matches(value: &str, title: &str) -> bool {
    let lower = title.to_lowercase();
    match value.to_lowercase().as_str() {
        "bluray" => lower.contains("bluray") || lower.contains("blu-ray") || lower.contains("bdrip"),
        "webdl" => lower.contains("web-dl") || lower.contains("webdl"),
        "webrip" => lower.contains("webrip") || lower.contains("web-rip"),
        "hdtv" => lower.contains("hdtv"),
        "dvd" => lower.contains("dvd") && !lower.contains("hddvd"),
        "remux" => lower.contains("remux"),
        other => lower.contains(other),
    }
}

/// Size conditions look like ">=5GB", "<20GB" or ">700MB".
fn size_matches(condition: &str, size_bytes: i64) -> bool {
    let condition = condition.trim();
    let (op, rest) = if let Some(rest) = condition.strip_prefix(">=") {
        (">=", rest)
    } else if let Some(rest) = condition.strip_prefix("<=") {
        ("<=", rest)
    } else if let Some(rest) = condition.strip_prefix('>') {
        (">", rest)
    } else if let Some(rest) = condition.strip_prefix('<') {
        ("<", rest)
    } else {
        return false;
    };

    let rest = rest.trim().to_uppercase();
    let (number, multiplier) = if let Some(n) = rest.strip_suffix("GB") {
        (n, 1024_i64.pow(3))
    } else if let Some(n) = rest.strip_suffix("MB") {
        (n, 1024_i64.pow(2))
    } else {
        (rest.as_str(), 1)
    };
    let Ok(value) = number.trim().parse::<f64>() else {
        return false;
    };
    let threshold = (value * multiplier as f64) as i64;
    match op {
        ">=" => size_bytes >= threshold,
        "<=" => size_bytes <= threshold,
        ">" => size_bytes > threshold,
        "<" => size_bytes < threshold,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_release_title;
    use reelvault_core::models::CustomFormat;

    fn ctx<'a>(title: &'a str, parsed: &'a ParsedMovieInfo, size: i64) -> FormatContext<'a> {
        FormatContext {
            title,
            parsed,
            size_bytes: size,
        }
    }

    fn format(specs: Vec<FormatSpecification>) -> CustomFormat {
        let mut format = CustomFormat::new("test".to_string(), specs);
        format.id = 7;
        format
    }

    #[test]
    fn single_optional_spec_matches_like_a_predicate() {
        let title = "Movie.2020.1080p.BluRay.x265-GRP";
        let parsed = parse_release_title(title);
        let hevc = format(vec![FormatSpecification::new(
            SpecImplementation::ReleaseTitle,
            r"x265|hevc",
        )]);
        assert!(format_matches(&hevc, &ctx(title, &parsed, 0)));

        let av1 = format(vec![FormatSpecification::new(
            SpecImplementation::ReleaseTitle,
            r"\bav1\b",
        )]);
        assert!(!format_matches(&av1, &ctx(title, &parsed, 0)));
    }

    #[test]
    fn required_specs_all_must_match() {
        let title = "Movie.2020.1080p.BluRay.x265.FRENCH-GRP";
        let parsed = parse_release_title(title);
        let f = format(vec![
            FormatSpecification::new(SpecImplementation::Source, "bluray").required(),
            FormatSpecification::new(SpecImplementation::Language, "french").required(),
        ]);
        assert!(format_matches(&f, &ctx(title, &parsed, 0)));

        let f = format(vec![
            FormatSpecification::new(SpecImplementation::Source, "webdl").required(),
            FormatSpecification::new(SpecImplementation::Language, "french").required(),
        ]);
        assert!(!format_matches(&f, &ctx(title, &parsed, 0)));
    }

    #[test]
    fn negated_spec_inverts() {
        let title = "Movie.2020.1080p.WEBRip-GRP";
        let parsed = parse_release_title(title);
        let not_webrip = format(vec![FormatSpecification::new(
            SpecImplementation::Source,
            "webrip",
        )
        .negated()
        .required()]);
        assert!(!format_matches(&not_webrip, &ctx(title, &parsed, 0)));
    }

    #[test]
    fn optional_specs_need_only_one_hit_alongside_required() {
        let title = "Movie.2020.1080p.BluRay.DTS-GRP";
        let parsed = parse_release_title(title);
        let f = format(vec![
            FormatSpecification::new(SpecImplementation::Source, "bluray").required(),
            FormatSpecification::new(SpecImplementation::ReleaseTitle, r"\bdts\b"),
            FormatSpecification::new(SpecImplementation::ReleaseTitle, r"\btruehd\b"),
        ]);
        assert!(format_matches(&f, &ctx(title, &parsed, 0)));
    }

    #[test]
    fn size_conditions() {
        assert!(size_matches(">=5GB", 6 * 1024_i64.pow(3)));
        assert!(!size_matches(">=5GB", 4 * 1024_i64.pow(3)));
        assert!(size_matches("<20GB", 10 * 1024_i64.pow(3)));
        assert!(size_matches(">700MB", 800 * 1024_i64.pow(2)));
        assert!(!size_matches("garbage", 1));
    }

    #[test]
    fn matching_formats_returns_ids() {
        let title = "Movie.2020.1080p.BluRay.x265-GRP";
        let parsed = parse_release_title(title);
        let mut a = format(vec![FormatSpecification::new(
            SpecImplementation::ReleaseTitle,
            "x265",
        )]);
        a.id = 1;
        let mut b = format(vec![FormatSpecification::new(
            SpecImplementation::ReleaseTitle,
            "xvid",
        )]);
        b.id = 2;
        assert_eq!(matching_formats(&[a, b], &ctx(title, &parsed, 0)), vec![1]);
    }
}
