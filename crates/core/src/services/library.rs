//! Movie library service: the CRUD surface with validation, availability
//! projection and wanted-row upkeep

use crate::clock::SharedClock;
use crate::domain::repositories::{
    HistoryRepository, MovieFileRepository, MovieFilter, MovieRepository,
    QualityProfileRepository,
};
use crate::error::{ReelvaultError, Result};
use crate::events::{EventBus, SystemEvent};
use crate::models::history::{History, HistoryEventType};
use crate::models::movie::{slugify, MinimumAvailability, Movie, MovieStatus};
use crate::wanted::WantedService;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Creation payload for a movie.
#[derive(Debug, Clone)]
pub struct NewMovie {
    pub tmdb_id: i32,
    pub title: String,
    pub year: Option<i32>,
    pub imdb_id: Option<String>,
    pub runtime_minutes: Option<i32>,
    pub status: MovieStatus,
    pub monitored: bool,
    pub quality_profile_id: i32,
    pub minimum_availability: MinimumAvailability,
    pub root_folder: String,
    pub in_cinemas: Option<DateTime<Utc>>,
    pub physical_release: Option<DateTime<Utc>>,
    pub digital_release: Option<DateTime<Utc>>,
    pub tags: Vec<i32>,
}

pub struct MovieService {
    movies: Arc<dyn MovieRepository>,
    files: Arc<dyn MovieFileRepository>,
    profiles: Arc<dyn QualityProfileRepository>,
    history: Arc<dyn HistoryRepository>,
    wanted: Arc<WantedService>,
    events: EventBus,
    clock: SharedClock,
}

impl MovieService {
    pub fn new(
        movies: Arc<dyn MovieRepository>,
        files: Arc<dyn MovieFileRepository>,
        profiles: Arc<dyn QualityProfileRepository>,
        history: Arc<dyn HistoryRepository>,
        wanted: Arc<WantedService>,
        events: EventBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            movies,
            files,
            profiles,
            history,
            wanted,
            events,
            clock,
        }
    }

    pub async fn create(&self, new: NewMovie) -> Result<Movie> {
        if new.tmdb_id <= 0 {
            return Err(ReelvaultError::validation("tmdb_id", "must be positive"));
        }
        if new.title.trim().is_empty() {
            return Err(ReelvaultError::validation("title", "must not be empty"));
        }
        if self
            .profiles
            .find_by_id(new.quality_profile_id)
            .await?
            .is_none()
        {
            return Err(ReelvaultError::InvalidReference {
                field: "quality_profile_id".to_string(),
                message: format!("quality profile {} does not exist", new.quality_profile_id),
            });
        }

        let mut movie = Movie::new(
            new.tmdb_id,
            new.title,
            new.quality_profile_id,
            new.root_folder,
        );
        movie.year = new.year;
        movie.imdb_id = new.imdb_id;
        movie.runtime_minutes = new.runtime_minutes;
        movie.status = new.status;
        movie.monitored = new.monitored;
        movie.minimum_availability = new.minimum_availability;
        movie.in_cinemas = new.in_cinemas;
        movie.physical_release = new.physical_release;
        movie.digital_release = new.digital_release;
        movie.tags = new.tags;
        if let Some(year) = movie.year {
            movie.title_slug = slugify(&format!("{} {}", movie.title, year));
        }

        self.movies.create(&movie).await?;
        self.wanted.refresh_for_movie(movie.id).await?;
        self.events.publish(SystemEvent::MovieAdded { movie_id: movie.id });
        info!(movie = %movie.title, tmdb_id = movie.tmdb_id, "movie added");

        movie.project_availability(&*self.clock);
        Ok(movie)
    }

    pub async fn get(&self, id: Uuid) -> Result<Movie> {
        let mut movie = self
            .movies
            .find_by_id(id)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("movie {}", id)))?;
        movie.project_availability(&*self.clock);
        Ok(movie)
    }

    pub async fn list(&self, filter: &MovieFilter) -> Result<Vec<Movie>> {
        let mut movies = self.movies.list(filter).await?;
        for movie in &mut movies {
            movie.project_availability(&*self.clock);
        }
        Ok(movies)
    }

    pub async fn update(&self, mut movie: Movie) -> Result<Movie> {
        if self
            .profiles
            .find_by_id(movie.quality_profile_id)
            .await?
            .is_none()
        {
            return Err(ReelvaultError::InvalidReference {
                field: "quality_profile_id".to_string(),
                message: format!("quality profile {} does not exist", movie.quality_profile_id),
            });
        }
        movie.updated_at = self.clock.now();
        self.movies.update(&movie).await?;
        self.wanted.refresh_for_movie(movie.id).await?;
        self.events
            .publish(SystemEvent::MovieUpdated { movie_id: movie.id });
        movie.project_availability(&*self.clock);
        Ok(movie)
    }

    /// Delete a movie; the store cascades to its file row, wanted row and
    /// queue rows. Deleting the file on disk is a separate, logged step.
    pub async fn delete(&self, id: Uuid, delete_files: bool) -> Result<()> {
        let movie = self.get(id).await?;

        if delete_files {
            if let Some(file) = self.files.find_by_movie_id(id).await? {
                match tokio::fs::remove_file(&file.path).await {
                    Ok(()) => {
                        info!(path = %file.path, "deleted movie file from disk");
                        self.events.publish(SystemEvent::MovieFileDeleted {
                            movie_id: id,
                            path: file.path.clone(),
                        });
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                        return Err(ReelvaultError::PermissionDenied {
                            path: file.path.clone(),
                            message: e.to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(path = %file.path, "failed to delete movie file: {}", e);
                    }
                }
            }
        }

        self.movies.delete(id).await?;
        self.history
            .append(
                &History::new(
                    HistoryEventType::MovieDeleted,
                    self.clock.now(),
                    movie.title.clone(),
                ),
            )
            .await?;
        self.events.publish(SystemEvent::MovieDeleted {
            movie_id: id,
            deleted_files: delete_files,
        });
        info!(movie = %movie.title, delete_files, "movie deleted");
        Ok(())
    }
}
