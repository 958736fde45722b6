//! Singleton configuration rows: naming, media management, root folders and
//! host settings

use crate::error::{ReelvaultError, Result};
use serde::{Deserialize, Serialize};

/// How colons in rendered names are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ColonReplacement {
    Delete,
    #[default]
    Dash,
    SpaceDash,
    SpaceDashSpace,
}

impl ColonReplacement {
    pub fn replacement(&self) -> &'static str {
        match self {
            ColonReplacement::Delete => "",
            ColonReplacement::Dash => "-",
            ColonReplacement::SpaceDash => " -",
            ColonReplacement::SpaceDashSpace => " - ",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    pub rename_movies: bool,
    pub replace_illegal_characters: bool,
    pub colon_replacement: ColonReplacement,
    /// Movie file name template.
    pub standard_movie_format: String,
    /// Movie folder name template.
    pub movie_folder_format: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            rename_movies: true,
            replace_illegal_characters: true,
            colon_replacement: ColonReplacement::default(),
            standard_movie_format: "{Movie Title} ({Release Year}) {Quality Title}".to_string(),
            movie_folder_format: "{Movie Title} ({Release Year})".to_string(),
        }
    }
}

/// Transfer mechanism preference for imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ImportMechanism {
    #[default]
    Hardlink,
    Copy,
    Move,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaManagementConfig {
    pub import_mechanism: ImportMechanism,
    /// Replaced files are moved here instead of deleted when set.
    pub recycle_bin: Option<String>,
    pub minimum_free_space_mb: i64,
    pub skip_free_space_check: bool,
    pub import_attempts: i32,
}

impl Default for MediaManagementConfig {
    fn default() -> Self {
        Self {
            import_mechanism: ImportMechanism::default(),
            recycle_bin: None,
            minimum_free_space_mb: 100,
            skip_free_space_check: false,
            import_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFolder {
    pub id: i32,
    pub path: String,
}

impl RootFolder {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(ReelvaultError::validation("path", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub bind_address: String,
    pub port: u16,
    /// Single shared API key for the programmatic surface.
    pub api_key: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7878,
            api_key: String::new(),
        }
    }
}
