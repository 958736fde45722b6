//! Task and scheduled-task repository

use super::{enum_from_text, enum_to_text, from_json, to_json, PostgresStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelvault_core::domain::repositories::TaskRepository;
use reelvault_core::error::Result;
use reelvault_core::models::{ScheduledTask, Task, TaskProgress, TaskStatus};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, name, command_name, body, priority, status, queued_at,
    started_at, ended_at, duration_ms, exception, progress";

fn task_from_row(row: &PgRow) -> Result<Task> {
    Ok(Task {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        command_name: row.try_get("command_name")?,
        body: row.try_get("body")?,
        priority: enum_from_text(&row.try_get::<String, _>("priority")?)?,
        status: enum_from_text(&row.try_get::<String, _>("status")?)?,
        queued_at: row.try_get("queued_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        duration_ms: row.try_get("duration_ms")?,
        exception: row.try_get("exception")?,
        progress: from_json(row.try_get("progress")?)?,
    })
}

fn scheduled_from_row(row: &PgRow) -> Result<ScheduledTask> {
    Ok(ScheduledTask {
        name: row.try_get("name")?,
        command_name: row.try_get("command_name")?,
        interval_seconds: row.try_get("interval_seconds")?,
        next_run: row.try_get("next_run")?,
        enabled: row.try_get("enabled")?,
        body: row.try_get("body")?,
        last_run: row.try_get("last_run")?,
    })
}

#[async_trait]
impl TaskRepository for PostgresStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, name, command_name, body, priority, status,
                 queued_at, started_at, ended_at, duration_ms, exception, progress)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.command_name)
        .bind(&task.body)
        .bind(enum_to_text(&task.priority))
        .bind(enum_to_text(&task.status))
        .bind(task.queued_at)
        .bind(task.started_at)
        .bind(task.ended_at)
        .bind(task.duration_ms)
        .bind(&task.exception)
        .bind(to_json(&task.progress)?)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn list_active(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE status IN ('queued', 'started', 'cancelling')
             ORDER BY queued_at",
            TASK_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks ORDER BY queued_at DESC LIMIT $1",
            TASK_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn queued(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE status = 'queued'
             ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END,
                      queued_at",
            TASK_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn try_transition(
        &self,
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $3,
                 started_at = CASE WHEN $3 = 'started' THEN $4 ELSE started_at END
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(enum_to_text(&from))
        .bind(enum_to_text(&to))
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        exception: Option<String>,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = $2, exception = $3, ended_at = $4,
                 duration_ms = CASE WHEN started_at IS NOT NULL
                     THEN (EXTRACT(EPOCH FROM ($4 - started_at)) * 1000)::bigint
                     ELSE NULL END
             WHERE id = $1",
        )
        .bind(id)
        .bind(enum_to_text(&status))
        .bind(exception)
        .bind(ended_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: &TaskProgress) -> Result<()> {
        sqlx::query("UPDATE tasks SET progress = $2 WHERE id = $1")
            .bind(id)
            .bind(to_json(progress)?)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn fail_orphaned(&self, reason: &str, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', exception = $1, ended_at = $2
             WHERE status IN ('started', 'cancelling')",
        )
        .bind(reason)
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn has_active_for_command(&self, command_name: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM tasks
                 WHERE command_name = $1 AND status IN ('queued', 'started', 'cancelling'))
             AS active",
        )
        .bind(command_name)
        .fetch_one(self.pool())
        .await?;
        Ok(row.try_get("active")?)
    }

    async fn upsert_scheduled(&self, scheduled: &ScheduledTask) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduled_tasks (name, command_name, interval_seconds, next_run,
                 enabled, body, last_run)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (name) DO UPDATE SET
                 command_name = EXCLUDED.command_name,
                 interval_seconds = EXCLUDED.interval_seconds,
                 enabled = EXCLUDED.enabled,
                 body = EXCLUDED.body",
        )
        .bind(&scheduled.name)
        .bind(&scheduled.command_name)
        .bind(scheduled.interval_seconds)
        .bind(scheduled.next_run)
        .bind(scheduled.enabled)
        .bind(&scheduled.body)
        .bind(scheduled.last_run)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledTask>> {
        let rows = sqlx::query(
            "SELECT name, command_name, interval_seconds, next_run, enabled, body, last_run
             FROM scheduled_tasks ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(scheduled_from_row).collect()
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        let rows = sqlx::query(
            "SELECT name, command_name, interval_seconds, next_run, enabled, body, last_run
             FROM scheduled_tasks WHERE enabled AND next_run <= $1",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(scheduled_from_row).collect()
    }

    async fn set_scheduled_run(
        &self,
        name: &str,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE scheduled_tasks SET last_run = $2, next_run = $3 WHERE name = $1")
            .bind(name)
            .bind(last_run)
            .bind(next_run)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn reschedule_missed(&self, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scheduled_tasks SET next_run = $1 WHERE next_run < $1")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
