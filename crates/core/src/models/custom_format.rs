//! Custom formats: named predicates over a release
//!
//! A format is a list of specifications. The format matches a release iff
//! every required specification matches and, when non-required
//! specifications exist, at least one of them matches. `negate` inverts the
//! individual specification before that aggregation. Matching formats
//! contribute their profile-configured score to the release.

use crate::error::{ReelvaultError, Result};
use serde::{Deserialize, Serialize};

/// What a specification inspects on the release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecImplementation {
    /// Regex over the whole release title.
    ReleaseTitle,
    /// Regex over the parsed release group.
    ReleaseGroup,
    /// Exact parsed language name.
    Language,
    /// Source token: bluray, webdl, webrip, hdtv, dvd, remux.
    Source,
    /// Resolution token: 480p, 720p, 1080p, 2160p.
    Resolution,
    /// Regex over the parsed edition.
    Edition,
    /// Size condition such as ">=5GB" or "<20GB".
    Size,
}

/// One rule within a custom format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatSpecification {
    pub implementation: SpecImplementation,
    pub negate: bool,
    pub required: bool,
    /// Implementation-specific expression: a regex, a token or a size
    /// condition depending on `implementation`.
    pub value: String,
}

impl FormatSpecification {
    pub fn new(implementation: SpecImplementation, value: impl Into<String>) -> Self {
        Self {
            implementation,
            negate: false,
            required: false,
            value: value.into(),
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Named predicate over a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFormat {
    pub id: i32,
    pub name: String,
    pub specifications: Vec<FormatSpecification>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CustomFormat {
    pub fn new(name: String, specifications: Vec<FormatSpecification>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: 0,
            name,
            specifications,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ReelvaultError::validation("name", "must not be empty"));
        }
        if self.specifications.is_empty() {
            return Err(ReelvaultError::validation(
                "specifications",
                "a custom format needs at least one specification",
            ));
        }
        Ok(())
    }
}
