//! Release surface: interactive search, listing and manual grabs

use crate::domain::repositories::{MovieRepository, ReleaseFilter, ReleaseRepository};
use crate::error::{ReelvaultError, Result};
use crate::models::release::Release;
use crate::scheduler::CancellationHandle;
use crate::services::grab::GrabService;
use crate::services::search::{SearchOutcome, SearchRunner};
use std::sync::Arc;
use uuid::Uuid;

pub struct ReleaseService {
    releases: Arc<dyn ReleaseRepository>,
    movies: Arc<dyn MovieRepository>,
    runner: Arc<SearchRunner>,
    grab: Arc<GrabService>,
}

impl ReleaseService {
    pub fn new(
        releases: Arc<dyn ReleaseRepository>,
        movies: Arc<dyn MovieRepository>,
        runner: Arc<SearchRunner>,
        grab: Arc<GrabService>,
    ) -> Self {
        Self {
            releases,
            movies,
            runner,
            grab,
        }
    }

    /// Interactive search: runs a full pass inline and returns everything
    /// found, decided and persisted.
    pub async fn search(&self, movie_id: Uuid) -> Result<SearchOutcome> {
        self.runner
            .search_movie(movie_id, &CancellationHandle::none(), None)
            .await
    }

    pub async fn list(&self, filter: &ReleaseFilter) -> Result<Vec<Release>> {
        self.releases.list(filter).await
    }

    /// Manually grab a stored release, optionally forcing the target movie
    /// and download client.
    pub async fn grab(
        &self,
        guid: &str,
        indexer_id: i32,
        movie_id: Option<Uuid>,
        download_client_id: Option<i32>,
    ) -> Result<Release> {
        let release = self
            .releases
            .find_by_guid(guid, indexer_id)
            .await?
            .ok_or_else(|| {
                ReelvaultError::not_found(format!("release {} at indexer {}", guid, indexer_id))
            })?;
        let target = movie_id.or(release.movie_id).ok_or_else(|| {
            ReelvaultError::validation("movie_id", "release is not linked to a movie")
        })?;
        let movie = self
            .movies
            .find_by_id(target)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("movie {}", target)))?;

        self.grab.grab(&release, &movie, download_client_id).await?;
        self.releases
            .find_by_guid(guid, indexer_id)
            .await?
            .ok_or_else(|| ReelvaultError::internal("grabbed release vanished"))
    }
}
