//! Task and scheduled-task domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    /// Queue ordering rank; lower runs first.
    pub fn rank(&self) -> i32 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Normal => 1,
            TaskPriority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    Queued,
    Started,
    Completed,
    Failed,
    Aborted,
    Cancelling,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Aborted
        )
    }

    /// Queued, started or cancelling.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Cancelling => "cancelling",
        };
        write!(f, "{}", s)
    }
}

/// One progress message with its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Progress snapshot persisted on the task row. The message ring keeps the
/// most recent `PROGRESS_RING_CAPACITY` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskProgress {
    pub percent: f32,
    pub current_message: String,
    pub messages: Vec<ProgressMessage>,
}

pub const PROGRESS_RING_CAPACITY: usize = 100;

impl TaskProgress {
    pub fn push(&mut self, at: DateTime<Utc>, percent: f32, message: impl Into<String>) {
        let text = message.into();
        self.percent = percent.clamp(0.0, 100.0);
        self.current_message = text.clone();
        self.messages.push(ProgressMessage { at, text });
        if self.messages.len() > PROGRESS_RING_CAPACITY {
            let overflow = self.messages.len() - PROGRESS_RING_CAPACITY;
            self.messages.drain(..overflow);
        }
    }
}

/// A unit of work for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub command_name: String,
    /// Opaque parameters, typed only by `command_name`.
    pub body: serde_json::Value,
    pub priority: TaskPriority,
    pub status: TaskStatus,

    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,

    pub exception: Option<String>,
    pub progress: TaskProgress,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        command_name: impl Into<String>,
        body: serde_json::Value,
        priority: TaskPriority,
        queued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            command_name: command_name.into(),
            body,
            priority,
            status: TaskStatus::Queued,
            queued_at,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            exception: None,
            progress: TaskProgress::default(),
        }
    }
}

/// A recurring source of tasks, uniquely named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub name: String,
    pub command_name: String,
    pub interval_seconds: i64,
    pub next_run: DateTime<Utc>,
    pub enabled: bool,
    pub body: serde_json::Value,
    pub last_run: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    pub fn new(
        name: impl Into<String>,
        command_name: impl Into<String>,
        interval_seconds: i64,
        next_run: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            command_name: command_name.into(),
            interval_seconds,
            next_run,
            enabled: true,
            body: serde_json::json!({}),
            last_run: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_ring_is_bounded() {
        let mut progress = TaskProgress::default();
        let now = Utc::now();
        for i in 0..250 {
            progress.push(now, i as f32 / 2.5, format!("step {}", i));
        }
        assert_eq!(progress.messages.len(), PROGRESS_RING_CAPACITY);
        assert_eq!(progress.messages.last().unwrap().text, "step 249");
        assert_eq!(progress.messages.first().unwrap().text, "step 150");
        assert_eq!(progress.current_message, "step 249");
    }

    #[test]
    fn priority_rank_orders_high_first() {
        assert!(TaskPriority::High.rank() < TaskPriority::Normal.rank());
        assert!(TaskPriority::Normal.rank() < TaskPriority::Low.rank());
    }
}
