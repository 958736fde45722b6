//! Progress reporting for running tasks
//!
//! Handlers publish `(percent, message)` pairs; the reporter keeps the last
//! hundred messages as a ring on the task row and coalesces persistence to
//! at most one write per 250 ms per task. The final state is always flushed
//! when the task ends.

use crate::clock::SharedClock;
use crate::domain::repositories::TaskRepository;
use crate::models::task::TaskProgress;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

const COALESCE_MS: i64 = 250;

struct ProgressState {
    progress: TaskProgress,
    last_persist: Option<DateTime<Utc>>,
    dirty: bool,
}

#[derive(Clone)]
pub struct ProgressReporter {
    task_id: Uuid,
    repo: Arc<dyn TaskRepository>,
    clock: SharedClock,
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressReporter {
    pub fn new(task_id: Uuid, repo: Arc<dyn TaskRepository>, clock: SharedClock) -> Self {
        Self {
            task_id,
            repo,
            clock,
            state: Arc::new(Mutex::new(ProgressState {
                progress: TaskProgress::default(),
                last_persist: None,
                dirty: false,
            })),
        }
    }

    /// Record an update; persists unless one was written within the
    /// coalescing window.
    pub async fn update(&self, percent: f32, message: impl Into<String>) {
        let now = self.clock.now();
        let snapshot = {
            let mut state = self.state.lock().await;
            state.progress.push(now, percent, message);
            state.dirty = true;
            let due = state
                .last_persist
                .map(|t| now - t >= Duration::milliseconds(COALESCE_MS))
                .unwrap_or(true);
            if !due {
                return;
            }
            state.last_persist = Some(now);
            state.dirty = false;
            state.progress.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Persist whatever is buffered, regardless of the coalescing window.
    pub async fn flush(&self) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.dirty {
                return;
            }
            state.last_persist = Some(self.clock.now());
            state.dirty = false;
            state.progress.clone()
        };
        self.persist(&snapshot).await;
    }

    async fn persist(&self, snapshot: &TaskProgress) {
        if let Err(e) = self.repo.update_progress(self.task_id, snapshot).await {
            warn!(task_id = %self.task_id, "failed to persist progress: {}", e);
        }
    }
}
