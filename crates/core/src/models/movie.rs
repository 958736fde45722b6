//! Movie domain model

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Movie status as reported by the metadata provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MovieStatus {
    Tba,
    #[default]
    Announced,
    InCinemas,
    Released,
}

/// How far along the release cycle a movie must be before it is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum MinimumAvailability {
    Tba,
    Announced,
    InCinemas,
    #[default]
    Released,
    PreDb,
}

/// Core movie entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: Uuid,
    pub tmdb_id: i32,
    pub imdb_id: Option<String>,

    // Basic information
    pub title: String,
    pub title_slug: String,
    pub original_title: Option<String>,
    pub year: Option<i32>,
    pub runtime_minutes: Option<i32>,

    // Status and monitoring
    pub status: MovieStatus,
    pub monitored: bool,

    // Quality and availability
    pub quality_profile_id: i32,
    pub minimum_availability: MinimumAvailability,
    pub in_cinemas: Option<chrono::DateTime<chrono::Utc>>,
    pub physical_release: Option<chrono::DateTime<chrono::Utc>>,
    pub digital_release: Option<chrono::DateTime<chrono::Utc>>,

    // Library placement
    pub root_folder: String,
    /// Movie folder under the root, set once organized on disk.
    pub path: Option<String>,
    pub tags: Vec<i32>,

    // File information
    pub has_file: bool,
    pub movie_file_id: Option<Uuid>,
    pub size_on_disk: i64,

    // Derived on read, never written by callers.
    pub is_available: bool,

    // Timestamps
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Movie {
    pub fn new(tmdb_id: i32, title: String, quality_profile_id: i32, root_folder: String) -> Self {
        let now = chrono::Utc::now();
        let title_slug = slugify(&title);
        Self {
            id: Uuid::new_v4(),
            tmdb_id,
            imdb_id: None,
            title,
            title_slug,
            original_title: None,
            year: None,
            runtime_minutes: None,
            status: MovieStatus::default(),
            monitored: true,
            quality_profile_id,
            minimum_availability: MinimumAvailability::default(),
            in_cinemas: None,
            physical_release: None,
            digital_release: None,
            root_folder,
            path: None,
            tags: Vec::new(),
            has_file: false,
            movie_file_id: None,
            size_on_disk: 0,
            is_available: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute the availability projection from status, release dates and
    /// the configured minimum availability. Invoked whenever the entity is
    /// read back from the store.
    pub fn project_availability(&mut self, clock: &dyn Clock) {
        self.is_available = self.compute_availability(clock);
    }

    fn compute_availability(&self, clock: &dyn Clock) -> bool {
        let now = clock.now();
        match self.minimum_availability {
            MinimumAvailability::Tba => true,
            MinimumAvailability::Announced => self.status != MovieStatus::Tba,
            MinimumAvailability::InCinemas => {
                self.status == MovieStatus::Released
                    || self.in_cinemas.map(|d| d <= now).unwrap_or(false)
            }
            MinimumAvailability::Released | MinimumAvailability::PreDb => {
                self.status == MovieStatus::Released
                    || self.physical_release.map(|d| d <= now).unwrap_or(false)
                    || self.digital_release.map(|d| d <= now).unwrap_or(false)
            }
        }
    }

    pub fn set_file(&mut self, movie_file_id: Uuid, size_bytes: i64) {
        self.has_file = true;
        self.movie_file_id = Some(movie_file_id);
        self.size_on_disk = size_bytes;
        self.updated_at = chrono::Utc::now();
    }

    pub fn clear_file(&mut self) {
        self.has_file = false;
        self.movie_file_id = None;
        self.size_on_disk = 0;
        self.updated_at = chrono::Utc::now();
    }
}

/// Lowercase, alphanumeric-and-dash slug used as a secondary unique key.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

impl std::fmt::Display for MovieStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MovieStatus::Tba => write!(f, "tba"),
            MovieStatus::Announced => write!(f, "announced"),
            MovieStatus::InCinemas => write!(f, "in_cinemas"),
            MovieStatus::Released => write!(f, "released"),
        }
    }
}

impl std::fmt::Display for MinimumAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MinimumAvailability::Tba => write!(f, "tba"),
            MinimumAvailability::Announced => write!(f, "announced"),
            MinimumAvailability::InCinemas => write!(f, "in_cinemas"),
            MinimumAvailability::Released => write!(f, "released"),
            MinimumAvailability::PreDb => write!(f, "predb"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use chrono::{Duration, Utc};

    #[test]
    fn slugify_strips_and_collapses() {
        assert_eq!(slugify("Fight Club"), "fight-club");
        assert_eq!(slugify("Blade Runner 2049"), "blade-runner-2049");
        assert_eq!(slugify("W.A.L.L-E  "), "w-a-l-l-e");
    }

    #[test]
    fn availability_follows_minimum_availability() {
        let mut movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        movie.status = MovieStatus::InCinemas;
        movie.in_cinemas = Some(Utc::now() - Duration::days(10));

        movie.minimum_availability = MinimumAvailability::Announced;
        movie.project_availability(&SystemClock);
        assert!(movie.is_available);

        movie.minimum_availability = MinimumAvailability::InCinemas;
        movie.project_availability(&SystemClock);
        assert!(movie.is_available);

        movie.minimum_availability = MinimumAvailability::Released;
        movie.project_availability(&SystemClock);
        assert!(!movie.is_available);

        movie.digital_release = Some(Utc::now() - Duration::days(1));
        movie.project_availability(&SystemClock);
        assert!(movie.is_available);
    }

    #[test]
    fn availability_uses_injected_clock() {
        let clock = ManualClock::new(Utc::now());
        let mut movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        movie.minimum_availability = MinimumAvailability::InCinemas;
        movie.in_cinemas = Some(clock.now() + Duration::days(3));

        movie.project_availability(&clock);
        assert!(!movie.is_available);

        clock.advance(Duration::days(4));
        movie.project_availability(&clock);
        assert!(movie.is_available);
    }
}
