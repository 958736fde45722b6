//! Calendar cache
//!
//! A fingerprinted, TTL'd materialized view over movie release dates.
//! Identical requests share one cached row; concurrent misses on the same
//! fingerprint share a single computation through a per-key mutex.

use crate::clock::SharedClock;
use crate::domain::repositories::{CalendarCacheRepository, CalendarCacheRow, MovieRepository};
use crate::error::{ReelvaultError, Result};
use crate::events::{EventHandler, SystemEvent};
use crate::models::movie::{MinimumAvailability, Movie};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalendarEventType {
    CinemaRelease,
    PhysicalRelease,
    DigitalRelease,
    Availability,
}

impl CalendarEventType {
    fn sort_priority(&self) -> i32 {
        match self {
            CalendarEventType::CinemaRelease => 0,
            CalendarEventType::PhysicalRelease => 1,
            CalendarEventType::DigitalRelease => 2,
            CalendarEventType::Availability => 3,
        }
    }

    fn token(&self) -> &'static str {
        match self {
            CalendarEventType::CinemaRelease => "cinemaRelease",
            CalendarEventType::PhysicalRelease => "physicalRelease",
            CalendarEventType::DigitalRelease => "digitalRelease",
            CalendarEventType::Availability => "availability",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CalendarRequest {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub view: Option<String>,
    /// Empty means all event types.
    pub event_types: Vec<CalendarEventType>,
    pub movie_ids: Vec<Uuid>,
    pub tags: Vec<i32>,
    pub monitored: Option<bool>,
    pub include_unmonitored: bool,
}

impl CalendarRequest {
    /// Stable content hash of the canonical request: keys sorted, list
    /// fields sorted, nulls elided.
    pub fn fingerprint(&self) -> String {
        let mut canonical = std::collections::BTreeMap::new();
        if let Some(start) = self.start {
            canonical.insert("start", serde_json::json!(start.to_rfc3339()));
        }
        if let Some(end) = self.end {
            canonical.insert("end", serde_json::json!(end.to_rfc3339()));
        }
        if let Some(view) = &self.view {
            canonical.insert("view", serde_json::json!(view));
        }
        if !self.event_types.is_empty() {
            let mut types: Vec<&str> = self.event_types.iter().map(|t| t.token()).collect();
            types.sort_unstable();
            canonical.insert("event_types", serde_json::json!(types));
        }
        if !self.movie_ids.is_empty() {
            let mut ids: Vec<String> = self.movie_ids.iter().map(|id| id.to_string()).collect();
            ids.sort_unstable();
            canonical.insert("movie_ids", serde_json::json!(ids));
        }
        if !self.tags.is_empty() {
            let mut tags = self.tags.clone();
            tags.sort_unstable();
            canonical.insert("tags", serde_json::json!(tags));
        }
        if let Some(monitored) = self.monitored {
            canonical.insert("monitored", serde_json::json!(monitored));
        }
        canonical.insert(
            "include_unmonitored",
            serde_json::json!(self.include_unmonitored),
        );
        let payload = serde_json::to_string(&canonical).expect("canonical request serializes");
        format!("{:x}", md5::compute(payload))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub movie_id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    pub event_type: CalendarEventType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSummary {
    pub total_events: usize,
    pub first_event: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarResponse {
    pub events: Vec<CalendarEvent>,
    pub summary: CalendarSummary,
}

pub struct CalendarService {
    movies: Arc<dyn MovieRepository>,
    cache: Arc<dyn CalendarCacheRepository>,
    clock: SharedClock,
    ttl: chrono::Duration,
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    computations: AtomicU64,
}

impl CalendarService {
    pub fn new(
        movies: Arc<dyn MovieRepository>,
        cache: Arc<dyn CalendarCacheRepository>,
        clock: SharedClock,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            movies,
            cache,
            clock,
            ttl,
            flights: Mutex::new(HashMap::new()),
            computations: AtomicU64::new(0),
        }
    }

    /// How many materialization passes ran; observable for tests.
    pub fn computation_count(&self) -> u64 {
        self.computations.load(Ordering::SeqCst)
    }

    pub async fn get(&self, request: &CalendarRequest) -> Result<CalendarResponse> {
        let key = request.fingerprint();
        let now = self.clock.now();

        if let Some(row) = self.cache.get_fresh(&key, now).await? {
            debug!(key = %key, "calendar cache hit");
            return decode(row);
        }

        // Single-flight: one computation per fingerprint.
        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = flight.lock().await;

        // Double-check after winning the flight lock: a concurrent caller
        // may have materialized the row already.
        let now = self.clock.now();
        if let Some(row) = self.cache.get_fresh(&key, now).await? {
            return decode(row);
        }

        let response = self.materialize(request).await?;
        self.cache
            .upsert(&CalendarCacheRow {
                cache_key: key.clone(),
                payload: serde_json::to_value(&response)
                    .map_err(|e| ReelvaultError::internal(format!("calendar encode: {}", e)))?,
                expires_at: now + self.ttl,
            })
            .await?;

        let mut flights = self.flights.lock().await;
        flights.remove(&key);
        Ok(response)
    }

    pub async fn invalidate(&self) -> Result<()> {
        debug!("calendar cache invalidated");
        self.cache.clear().await
    }

    async fn materialize(&self, request: &CalendarRequest) -> Result<CalendarResponse> {
        self.computations.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let start = request.start.unwrap_or_else(|| now - chrono::Duration::days(7));
        let end = request.end.unwrap_or_else(|| now + chrono::Duration::days(30));

        let movies = self.movies.find_in_release_window(start, end).await?;
        let mut events = Vec::new();
        for movie in movies {
            if !request.movie_ids.is_empty() && !request.movie_ids.contains(&movie.id) {
                continue;
            }
            if !request.tags.is_empty() && !movie.tags.iter().any(|t| request.tags.contains(t)) {
                continue;
            }
            match request.monitored {
                Some(monitored) if movie.monitored != monitored => continue,
                None if !movie.monitored && !request.include_unmonitored => continue,
                _ => {}
            }
            events.extend(movie_events(&movie, start, end, &request.event_types));
        }

        events.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.event_type.sort_priority().cmp(&b.event_type.sort_priority()))
                .then(a.title.cmp(&b.title))
        });

        let summary = CalendarSummary {
            total_events: events.len(),
            first_event: events.first().map(|e| e.date),
            last_event: events.last().map(|e| e.date),
        };
        Ok(CalendarResponse { events, summary })
    }
}

fn decode(row: CalendarCacheRow) -> Result<CalendarResponse> {
    serde_json::from_value(row.payload)
        .map_err(|e| ReelvaultError::internal(format!("calendar decode: {}", e)))
}

fn wanted_type(filter: &[CalendarEventType], event_type: CalendarEventType) -> bool {
    filter.is_empty() || filter.contains(&event_type)
}

fn movie_events(
    movie: &Movie,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter: &[CalendarEventType],
) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut push = |date: Option<DateTime<Utc>>, event_type: CalendarEventType| {
        if let Some(date) = date {
            if date >= start && date <= end && wanted_type(filter, event_type) {
                events.push(CalendarEvent {
                    movie_id: movie.id,
                    title: movie.title.clone(),
                    date,
                    event_type,
                });
            }
        }
    };
    push(movie.in_cinemas, CalendarEventType::CinemaRelease);
    push(movie.physical_release, CalendarEventType::PhysicalRelease);
    push(movie.digital_release, CalendarEventType::DigitalRelease);
    push(availability_date(movie), CalendarEventType::Availability);
    events
}

/// The date a movie becomes available under its minimum availability.
fn availability_date(movie: &Movie) -> Option<DateTime<Utc>> {
    match movie.minimum_availability {
        MinimumAvailability::Tba | MinimumAvailability::Announced => None,
        MinimumAvailability::InCinemas => movie.in_cinemas,
        MinimumAvailability::Released | MinimumAvailability::PreDb => {
            match (movie.physical_release, movie.digital_release) {
                (Some(p), Some(d)) => Some(p.min(d)),
                (p, d) => p.or(d),
            }
        }
    }
}

/// Bus subscriber dropping the cache whenever movies change.
pub struct CalendarInvalidator {
    service: Arc<CalendarService>,
}

impl CalendarInvalidator {
    pub fn new(service: Arc<CalendarService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl EventHandler for CalendarInvalidator {
    async fn handle(&self, _event: &SystemEvent) -> Result<()> {
        self.service.invalidate().await
    }

    fn wants(&self, event: &SystemEvent) -> bool {
        event.invalidates_calendar()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::domain::repositories::QualityProfileRepository;
    use crate::models::quality::{ProfileItem, QualityId, QualityProfile};
    use crate::testing::MemoryStore;

    async fn seeded() -> (Arc<MemoryStore>, Arc<ManualClock>, Arc<CalendarService>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let mut profile = QualityProfile::new(
            "Any".to_string(),
            vec![ProfileItem { quality: QualityId::Bluray1080p, allowed: true }],
            QualityId::Bluray1080p,
        );
        profile.id = 1;
        QualityProfileRepository::create(&*store, &profile).await.unwrap();

        let mut movie = Movie::new(550, "Fight Club".to_string(), 1, "/movies".to_string());
        movie.in_cinemas = Some(clock.now() + chrono::Duration::days(3));
        movie.digital_release = Some(clock.now() + chrono::Duration::days(10));
        movie.minimum_availability = MinimumAvailability::Released;
        MovieRepository::create(&*store, &movie).await.unwrap();

        let service = Arc::new(CalendarService::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            chrono::Duration::minutes(5),
        ));
        (store, clock, service)
    }

    fn window(clock: &ManualClock) -> CalendarRequest {
        CalendarRequest {
            start: Some(clock.now()),
            end: Some(clock.now() + chrono::Duration::days(30)),
            ..Default::default()
        }
    }

    #[test]
    fn fingerprint_is_order_insensitive_and_null_eliding() {
        let a = CalendarRequest {
            tags: vec![3, 1, 2],
            event_types: vec![
                CalendarEventType::DigitalRelease,
                CalendarEventType::CinemaRelease,
            ],
            ..Default::default()
        };
        let b = CalendarRequest {
            tags: vec![1, 2, 3],
            event_types: vec![
                CalendarEventType::CinemaRelease,
                CalendarEventType::DigitalRelease,
            ],
            ..Default::default()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = CalendarRequest {
            monitored: Some(true),
            ..Default::default()
        };
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[tokio::test]
    async fn events_are_sorted_and_cached() {
        let (_store, clock, service) = seeded().await;
        let request = window(&clock);

        let first = service.get(&request).await.unwrap();
        assert_eq!(first.events.len(), 3); // cinema, digital, availability
        assert_eq!(first.events[0].event_type, CalendarEventType::CinemaRelease);
        assert_eq!(first.summary.total_events, 3);
        assert_eq!(service.computation_count(), 1);

        // Served from cache.
        let second = service.get(&request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.computation_count(), 1);
    }

    #[tokio::test]
    async fn expired_rows_are_recomputed() {
        let (_store, clock, service) = seeded().await;
        let request = window(&clock);

        service.get(&request).await.unwrap();
        clock.advance(chrono::Duration::minutes(6));
        // Same fingerprint, but the row has expired.
        let request = CalendarRequest {
            start: request.start,
            end: request.end,
            ..Default::default()
        };
        service.get(&request).await.unwrap();
        assert_eq!(service.computation_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_computation() {
        let (_store, clock, service) = seeded().await;
        let request = window(&clock);

        let mut joins = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let request = request.clone();
            joins.push(tokio::spawn(async move { service.get(&request).await }));
        }
        let mut responses = Vec::new();
        for join in joins {
            responses.push(join.await.unwrap().unwrap());
        }
        for pair in responses.windows(2) {
            assert_eq!(pair[0], pair[1]);
        }
        assert_eq!(service.computation_count(), 1);
    }

    #[tokio::test]
    async fn invalidate_clears_rows() {
        let (_store, clock, service) = seeded().await;
        let request = window(&clock);
        service.get(&request).await.unwrap();
        service.invalidate().await.unwrap();
        service.get(&request).await.unwrap();
        assert_eq!(service.computation_count(), 2);
    }

    #[tokio::test]
    async fn event_type_filter_is_honored() {
        let (_store, clock, service) = seeded().await;
        let mut request = window(&clock);
        request.event_types = vec![CalendarEventType::DigitalRelease];
        let response = service.get(&request).await.unwrap();
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].event_type, CalendarEventType::DigitalRelease);
    }
}
