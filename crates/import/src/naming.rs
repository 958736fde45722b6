//! Naming templates
//!
//! Token-substitution over `{Token}` templates. Unknown tokens are left
//! literal. After substitution the name passes through the colon policy,
//! illegal-character removal and whitespace collapsing; that cleanup is
//! idempotent, so re-rendering an already-clean name changes nothing.

use once_cell::sync::Lazy;
use reelvault_core::models::{MediaInfo, Movie, NamingConfig, QualityId};
use regex::Regex;
use std::path::{Path, PathBuf};

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z][A-Za-z0-9 ]*)\}").unwrap());
static ILLEGAL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"|?*/\\]"#).unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Everything the tokens can draw from.
#[derive(Debug, Clone, Default)]
pub struct NamingInput<'a> {
    pub movie: Option<&'a Movie>,
    pub quality: Option<QualityId>,
    pub revision: i32,
    pub media_info: Option<&'a MediaInfo>,
    pub edition: Option<&'a str>,
    pub custom_format_names: &'a [String],
    pub release_group: Option<&'a str>,
    pub collection: Option<&'a str>,
}

pub struct NamingPlanner {
    config: NamingConfig,
}

impl NamingPlanner {
    pub fn new(config: NamingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NamingConfig {
        &self.config
    }

    /// Destination folder for a movie under its root folder.
    pub fn plan_folder(&self, input: &NamingInput<'_>) -> PathBuf {
        let rendered = self.render(&self.config.movie_folder_format, input);
        let root = input.movie.map(|m| m.root_folder.as_str()).unwrap_or("");
        Path::new(root).join(rendered)
    }

    /// Destination file name, carrying over the source extension.
    pub fn plan_filename(&self, input: &NamingInput<'_>, source: &Path) -> String {
        let mut name = self.render(&self.config.standard_movie_format, input);
        if let Some(ext) = source.extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(&ext.to_ascii_lowercase());
        }
        name
    }

    pub fn render(&self, template: &str, input: &NamingInput<'_>) -> String {
        let substituted = TOKEN.replace_all(template, |caps: &regex::Captures<'_>| {
            match expand_token(&caps[1], input) {
                Some(value) => value,
                // Unknown tokens stay literal.
                None => caps[0].to_string(),
            }
        });
        self.sanitize(&substituted)
    }

    /// Colon policy, illegal-character policy, whitespace collapse — in
    /// that order, and idempotent.
    pub fn sanitize(&self, name: &str) -> String {
        let with_colons = name.replace(':', self.config.colon_replacement.replacement());
        let legal = if self.config.replace_illegal_characters {
            ILLEGAL.replace_all(&with_colons, "").into_owned()
        } else {
            with_colons
        };
        WHITESPACE.replace_all(legal.trim(), " ").into_owned()
    }
}

fn expand_token(token: &str, input: &NamingInput<'_>) -> Option<String> {
    let movie = input.movie;
    let value = match token {
        "Movie Title" => movie.map(|m| m.title.clone()).unwrap_or_default(),
        "Movie CleanTitle" => movie.map(|m| clean_title(&m.title)).unwrap_or_default(),
        "Movie TitleThe" => movie.map(|m| title_the(&m.title)).unwrap_or_default(),
        "Movie OriginalTitle" => movie
            .and_then(|m| m.original_title.clone().or_else(|| Some(m.title.clone())))
            .unwrap_or_default(),
        "Movie TitleFirstCharacter" => movie
            .map(|m| title_first_character(&m.title))
            .unwrap_or_default(),
        "Movie Collection" => input.collection.unwrap_or_default().to_string(),
        "Release Year" => movie
            .and_then(|m| m.year)
            .map(|y| y.to_string())
            .unwrap_or_default(),
        "Release YearFirst" => movie
            .and_then(|m| earliest_release_year(m))
            .map(|y| y.to_string())
            .unwrap_or_default(),
        "Quality Full" => {
            let title = input.quality.map(|q| q.title().to_string()).unwrap_or_default();
            if input.revision > 0 {
                format!("{} Proper", title)
            } else {
                title
            }
        }
        "Quality Title" => input.quality.map(|q| q.title().to_string()).unwrap_or_default(),
        "Quality Proper" => {
            if input.revision > 0 {
                "Proper".to_string()
            } else {
                String::new()
            }
        }
        // Revision "REAL" flags are not tracked; renders empty.
        "Quality Real" => String::new(),
        "MediaInfo Simple" => media_info_simple(input.media_info),
        "MediaInfo Full" => media_info_full(input.media_info),
        "MediaInfo VideoCodec" => input
            .media_info
            .and_then(|m| m.video_codec.clone())
            .unwrap_or_default(),
        "MediaInfo VideoBitDepth" => input
            .media_info
            .and_then(|m| m.video_bit_depth)
            .map(|b| b.to_string())
            .unwrap_or_default(),
        "MediaInfo VideoResolution" => input
            .media_info
            .and_then(|m| m.video_resolution.clone())
            .unwrap_or_default(),
        "MediaInfo AudioCodec" => input
            .media_info
            .and_then(|m| m.audio_codec.clone())
            .unwrap_or_default(),
        "MediaInfo AudioChannels" => input
            .media_info
            .and_then(|m| m.audio_channels)
            .map(|c| format!("{:.1}", c))
            .unwrap_or_default(),
        "MediaInfo AudioLanguages" => languages_token(
            input.media_info.map(|m| m.audio_languages.as_slice()),
        ),
        "MediaInfo SubtitleLanguages" => languages_token(
            input.media_info.map(|m| m.subtitle_languages.as_slice()),
        ),
        "Edition Tags" => input.edition.unwrap_or_default().to_string(),
        "Custom Formats" => input.custom_format_names.join(" "),
        "Release Group" => input.release_group.unwrap_or_default().to_string(),
        "ImdbId" => movie
            .and_then(|m| m.imdb_id.clone())
            .unwrap_or_default(),
        "Tmdb Id" => movie.map(|m| m.tmdb_id.to_string()).unwrap_or_default(),
        _ => return None,
    };
    Some(value)
}

/// Strip everything outside [A-Za-z0-9 ] and collapse whitespace.
fn clean_title(title: &str) -> String {
    let filtered: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    WHITESPACE.replace_all(filtered.trim(), " ").into_owned()
}

/// "The Movie" → "Movie, The".
fn title_the(title: &str) -> String {
    for article in ["The ", "A ", "An "] {
        if let Some(rest) = title.strip_prefix(article) {
            return format!("{}, {}", rest, article.trim_end());
        }
    }
    title.to_string()
}

fn title_first_character(title: &str) -> String {
    let sortable = title_the(title);
    match sortable.chars().find(|c| c.is_ascii_alphanumeric()) {
        Some(c) if c.is_ascii_digit() => "0-9".to_string(),
        Some(c) => c.to_ascii_uppercase().to_string(),
        None => "_".to_string(),
    }
}

fn earliest_release_year(movie: &Movie) -> Option<i32> {
    use chrono::Datelike;
    [movie.in_cinemas, movie.physical_release, movie.digital_release]
        .iter()
        .flatten()
        .map(|d| d.year())
        .min()
        .or(movie.year)
}

fn media_info_simple(media_info: Option<&MediaInfo>) -> String {
    let Some(info) = media_info else {
        return String::new();
    };
    [info.video_codec.as_deref(), info.audio_codec.as_deref()]
        .iter()
        .flatten()
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn media_info_full(media_info: Option<&MediaInfo>) -> String {
    let Some(info) = media_info else {
        return String::new();
    };
    let simple = media_info_simple(media_info);
    let audio = languages_token(Some(info.audio_languages.as_slice()));
    if audio.is_empty() {
        simple
    } else {
        format!("{} [{}]", simple, audio)
    }
}

fn languages_token(languages: Option<&[reelvault_core::models::Language]>) -> String {
    languages
        .unwrap_or_default()
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelvault_core::models::{ColonReplacement, Language};

    fn movie() -> Movie {
        let mut movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        movie.year = Some(1999);
        movie.imdb_id = Some("tt0137523".to_string());
        movie
    }

    fn planner() -> NamingPlanner {
        NamingPlanner::new(NamingConfig::default())
    }

    #[test]
    fn default_templates_render_the_expected_layout() {
        let movie = movie();
        let input = NamingInput {
            movie: Some(&movie),
            quality: Some(QualityId::Bluray1080p),
            ..Default::default()
        };
        let planner = planner();
        assert_eq!(
            planner.plan_folder(&input),
            PathBuf::from("/movies/Fight Club (1999)")
        );
        assert_eq!(
            planner.plan_filename(&input, Path::new("/tmp/fc/source.mkv")),
            "Fight Club (1999) Bluray-1080p.mkv"
        );
    }

    #[test]
    fn unknown_tokens_stay_literal() {
        let movie = movie();
        let input = NamingInput {
            movie: Some(&movie),
            ..Default::default()
        };
        let rendered = planner().render("{Movie Title} {Bogus Token}", &input);
        assert_eq!(rendered, "Fight Club {Bogus Token}");
    }

    #[test]
    fn clean_title_strips_punctuation() {
        let mut movie = movie();
        movie.title = "W.A.L.L-E: Director's Cut".to_string();
        let input = NamingInput {
            movie: Some(&movie),
            ..Default::default()
        };
        assert_eq!(planner().render("{Movie CleanTitle}", &input), "W A L L E Director s Cut");
    }

    #[test]
    fn title_the_moves_the_article() {
        let mut movie = movie();
        movie.title = "The Matrix".to_string();
        let input = NamingInput {
            movie: Some(&movie),
            ..Default::default()
        };
        assert_eq!(planner().render("{Movie TitleThe}", &input), "Matrix, The");
        assert_eq!(planner().render("{Movie TitleFirstCharacter}", &input), "M");
    }

    #[test]
    fn colon_policies_apply_before_illegal_removal() {
        let mut movie = movie();
        movie.title = "Mission: Impossible".to_string();
        let input = NamingInput {
            movie: Some(&movie),
            ..Default::default()
        };

        let dash = NamingPlanner::new(NamingConfig {
            colon_replacement: ColonReplacement::SpaceDash,
            ..NamingConfig::default()
        });
        assert_eq!(dash.render("{Movie Title}", &input), "Mission - Impossible");

        let delete = NamingPlanner::new(NamingConfig {
            colon_replacement: ColonReplacement::Delete,
            ..NamingConfig::default()
        });
        assert_eq!(delete.render("{Movie Title}", &input), "Mission Impossible");
    }

    #[test]
    fn illegal_characters_are_removed() {
        let planner = planner();
        assert_eq!(planner.sanitize("a<b>c\"d|e?f*g/h\\i"), "abcdefghi");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let planner = planner();
        let once = planner.sanitize("Mission: Impossible  <Dir/Cut>   ");
        let twice = planner.sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn quality_and_mediainfo_tokens() {
        let movie = movie();
        let info = MediaInfo {
            video_codec: Some("x264".to_string()),
            audio_codec: Some("DTS".to_string()),
            audio_channels: Some(5.1),
            audio_languages: vec![Language::English, Language::French],
            ..Default::default()
        };
        let input = NamingInput {
            movie: Some(&movie),
            quality: Some(QualityId::Bluray1080p),
            revision: 1,
            media_info: Some(&info),
            release_group: Some("GROUP"),
            ..Default::default()
        };
        let planner = planner();
        assert_eq!(planner.render("{Quality Full}", &input), "Bluray-1080p Proper");
        assert_eq!(planner.render("{Quality Proper}", &input), "Proper");
        assert_eq!(planner.render("{MediaInfo Simple}", &input), "x264 DTS");
        assert_eq!(
            planner.render("{MediaInfo Full}", &input),
            "x264 DTS [English+French]"
        );
        assert_eq!(planner.render("{MediaInfo AudioChannels}", &input), "5.1");
        assert_eq!(planner.render("{Release Group}", &input), "GROUP");
        assert_eq!(planner.render("{Tmdb Id}", &input), "550");
        assert_eq!(planner.render("{ImdbId}", &input), "tt0137523");
    }
}
