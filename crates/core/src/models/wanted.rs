//! Wanted movie: the automation-side marker that a movie needs searching

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WantedStatus {
    Missing,
    CutoffUnmet,
    Upgrade,
}

impl std::fmt::Display for WantedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WantedStatus::Missing => write!(f, "missing"),
            WantedStatus::CutoffUnmet => write!(f, "cutoffUnmet"),
            WantedStatus::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// A per-indexer failure captured during a search pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub indexer_id: i32,
    pub indexer_name: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Exists iff a monitored movie has no file, is below cutoff, or can be
/// upgraded. Uniquely keyed by movie_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WantedMovie {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub status: WantedStatus,

    /// 1 (highest) to 5 (lowest).
    pub priority: i32,
    pub search_attempts: i32,
    pub max_search_attempts: i32,
    pub last_search_time: Option<DateTime<Utc>>,
    pub next_search_time: Option<DateTime<Utc>>,
    /// Guards against double-enqueueing a search task for the same movie.
    pub search_in_flight: bool,
    pub search_failures: Vec<SearchFailure>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_MAX_SEARCH_ATTEMPTS: i32 = 10;
pub const DEFAULT_PRIORITY: i32 = 3;

impl WantedMovie {
    pub fn new(movie_id: Uuid, status: WantedStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            movie_id,
            status,
            priority: DEFAULT_PRIORITY,
            search_attempts: 0,
            max_search_attempts: DEFAULT_MAX_SEARCH_ATTEMPTS,
            last_search_time: None,
            next_search_time: None,
            search_in_flight: false,
            search_failures: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the movie can be searched now. `movie_available` is the
    /// availability projection of the owning movie.
    pub fn is_eligible(&self, movie_available: bool, now: DateTime<Utc>) -> bool {
        movie_available
            && !self.search_in_flight
            && self.search_attempts < self.max_search_attempts
            && self.next_search_time.map(|t| now >= t).unwrap_or(true)
    }

    /// Record a completed search pass: bump the attempt counter and pace the
    /// next one with the backoff.
    pub fn record_search(&mut self, now: DateTime<Utc>, failures: Vec<SearchFailure>) {
        self.search_attempts += 1;
        self.last_search_time = Some(now);
        self.next_search_time = Some(now + backoff_delay(self.search_attempts, self.priority));
        self.search_in_flight = false;
        self.search_failures.extend(failures);
        self.updated_at = now;
    }

    /// Operator reset of the attempt budget.
    pub fn reset_attempts(&mut self, now: DateTime<Utc>) {
        self.search_attempts = 0;
        self.next_search_time = None;
        self.search_failures.clear();
        self.updated_at = now;
    }
}

/// Search pacing: `base · mult · prio_factor` where `base` is two hours,
/// `mult = min(attempts², 24)` and `prio_factor = max(0.5, (6 - priority)/2)`.
pub fn backoff_delay(search_attempts: i32, priority: i32) -> Duration {
    let base_secs = 2.0 * 3600_f64;
    let attempts = search_attempts.max(0) as f64;
    let mult = (attempts * attempts).min(24.0);
    let prio_factor = ((6 - priority) as f64 / 2.0).max(0.5);
    Duration::seconds((base_secs * mult * prio_factor) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_escalates_then_caps() {
        // priority 3 => prio_factor = 1.5
        let hours = |attempts| backoff_delay(attempts, 3).num_seconds() as f64 / 3600.0;
        assert_eq!(hours(1), 2.0 * 1.0 * 1.5);
        assert_eq!(hours(2), 2.0 * 4.0 * 1.5);
        assert_eq!(hours(3), 2.0 * 9.0 * 1.5);
        assert_eq!(hours(4), 2.0 * 16.0 * 1.5);
        // mult caps at 24 from attempts >= 5
        assert_eq!(hours(5), 2.0 * 24.0 * 1.5);
        assert_eq!(hours(10), 2.0 * 24.0 * 1.5);
    }

    #[test]
    fn backoff_priority_factor_floors_at_half() {
        // priority 1 => (6-1)/2 = 2.5, priority 5 => 0.5 floor
        assert_eq!(backoff_delay(1, 1).num_seconds(), (2.0 * 3600.0 * 2.5) as i64);
        assert_eq!(backoff_delay(1, 5).num_seconds(), (2.0 * 3600.0 * 0.5) as i64);
        // upper bound from the cap: 24 * base * 0.5 for the lowest priority
        assert!(backoff_delay(50, 5) <= Duration::seconds((24.0 * 2.0 * 3600.0 * 0.5) as i64));
    }

    #[test]
    fn eligibility_respects_budget_and_pacing() {
        let now = Utc::now();
        let mut wanted = WantedMovie::new(Uuid::new_v4(), WantedStatus::Missing);
        assert!(wanted.is_eligible(true, now));
        assert!(!wanted.is_eligible(false, now));

        wanted.record_search(now, Vec::new());
        assert!(!wanted.is_eligible(true, now));
        assert!(wanted.is_eligible(true, now + Duration::hours(4)));

        wanted.search_attempts = wanted.max_search_attempts;
        assert!(!wanted.is_eligible(true, now + Duration::days(30)));

        wanted.reset_attempts(now);
        assert!(wanted.is_eligible(true, now));
    }

    #[test]
    fn attempts_stay_within_budget() {
        let now = Utc::now();
        let mut wanted = WantedMovie::new(Uuid::new_v4(), WantedStatus::Missing);
        for _ in 0..wanted.max_search_attempts {
            assert!(wanted.search_attempts <= wanted.max_search_attempts);
            wanted.record_search(now, Vec::new());
        }
        assert_eq!(wanted.search_attempts, wanted.max_search_attempts);
    }
}
