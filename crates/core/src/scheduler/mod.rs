//! Task scheduler
//!
//! Executes persisted tasks with bounded parallelism, honoring priority
//! (FIFO within a priority), at most one running task per non-reentrant
//! command, cooperative cancellation with a grace period, coalesced
//! progress updates, and a one-second ticker that turns scheduled tasks
//! into queued tasks. Worker state lives in the store, so a restart can
//! reclaim tasks orphaned by a crash.

mod progress;

pub use progress::ProgressReporter;

use crate::clock::SharedClock;
use crate::domain::repositories::TaskRepository;
use crate::error::{ReelvaultError, Result};
use crate::models::task::{ScheduledTask, Task, TaskPriority, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Cooperative cancellation signal handed to handlers.
#[derive(Clone)]
pub struct CancellationHandle {
    rx: watch::Receiver<bool>,
}

impl CancellationHandle {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone; treat as cancelled so handlers unwind.
                return;
            }
        }
    }

    /// Convenience guard for handlers: error out at a cooperative check.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(ReelvaultError::Cancelled {
                operation: operation.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// A handle that never cancels, for direct service invocations.
    pub fn none() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive forever so the handle stays quiet.
        std::mem::forget(tx);
        Self { rx }
    }
}

/// Everything a handler receives for one execution.
pub struct TaskContext {
    pub task_id: Uuid,
    pub body: serde_json::Value,
    pub cancellation: CancellationHandle,
    pub progress: ProgressReporter,
}

/// A command implementation bound to a command name.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<()>;

    /// Reentrant commands may run concurrently with themselves.
    fn reentrant(&self) -> bool {
        false
    }

    /// Command-specific deadline; exceeding it is equivalent to
    /// cancellation.
    fn timeout(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

/// Request to enqueue one task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub command_name: String,
    pub body: serde_json::Value,
    pub priority: TaskPriority,
}

impl TaskSpec {
    pub fn new(command_name: impl Into<String>, body: serde_json::Value) -> Self {
        let command_name = command_name.into();
        Self {
            name: command_name.clone(),
            command_name,
            body,
            priority: TaskPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Request to register a recurring source of tasks.
#[derive(Debug, Clone)]
pub struct RecurringSpec {
    pub name: String,
    pub command_name: String,
    pub interval: Duration,
    pub enabled: bool,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            grace_period: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Lightweight enqueue-only handle, cloneable into handlers without
/// creating a reference cycle back to the scheduler.
#[derive(Clone)]
pub struct TaskQueue {
    repo: Arc<dyn TaskRepository>,
    clock: SharedClock,
    notify: Arc<Notify>,
}

impl TaskQueue {
    pub async fn enqueue(&self, spec: TaskSpec) -> Result<Uuid> {
        let task = Task::new(
            spec.name,
            spec.command_name,
            spec.body,
            spec.priority,
            self.clock.now(),
        );
        let id = task.id;
        self.repo.insert(&task).await?;
        self.notify.notify_waiters();
        debug!(task_id = %id, command = %task.command_name, "task enqueued");
        Ok(id)
    }
}

pub struct Scheduler {
    repo: Arc<dyn TaskRepository>,
    clock: SharedClock,
    config: SchedulerConfig,
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    command_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    running: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
    notify: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(repo: Arc<dyn TaskRepository>, clock: SharedClock, config: SchedulerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            repo,
            clock,
            config,
            handlers: RwLock::new(HashMap::new()),
            command_locks: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            notify: Arc::new(Notify::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn queue(&self) -> TaskQueue {
        TaskQueue {
            repo: self.repo.clone(),
            clock: self.clock.clone(),
            notify: self.notify.clone(),
        }
    }

    pub async fn register_handler(&self, command_name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.write().await.insert(command_name.into(), handler);
    }

    /// Persist a task with status queued and wake a worker.
    pub async fn enqueue(&self, spec: TaskSpec) -> Result<Uuid> {
        self.queue().enqueue(spec).await
    }

    pub async fn status(&self, task_id: Uuid) -> Result<Task> {
        self.repo
            .get(task_id)
            .await?
            .ok_or_else(|| ReelvaultError::not_found(format!("task {}", task_id)))
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Task>> {
        self.repo.list_recent(limit).await
    }

    /// Cancel a queued or started task. Queued tasks abort atomically;
    /// started tasks move to cancelling and the handler observes the signal
    /// at its next cooperative check.
    pub async fn cancel(&self, task_id: Uuid) -> Result<()> {
        let task = self.status(task_id).await?;
        let now = self.clock.now();
        match task.status {
            TaskStatus::Queued => {
                if self
                    .repo
                    .try_transition(task_id, TaskStatus::Queued, TaskStatus::Aborted, now)
                    .await?
                {
                    self.repo
                        .finish(task_id, TaskStatus::Aborted, None, now)
                        .await?;
                    return Ok(());
                }
                // Raced with a worker claiming it; fall through as started.
                Box::pin(self.cancel(task_id)).await
            }
            TaskStatus::Started => {
                self.repo
                    .try_transition(task_id, TaskStatus::Started, TaskStatus::Cancelling, now)
                    .await?;
                if let Some(tx) = self.running.lock().await.get(&task_id) {
                    let _ = tx.send(true);
                }
                Ok(())
            }
            TaskStatus::Cancelling => Ok(()),
            status => Err(ReelvaultError::Conflict {
                message: format!("task {} is {} and cannot be cancelled", task_id, status),
            }),
        }
    }

    /// Idempotent upsert keyed on name; interval, body and enabled are
    /// updated, an existing next_run is preserved.
    pub async fn register_recurring(&self, spec: RecurringSpec) -> Result<()> {
        let mut scheduled = ScheduledTask::new(
            spec.name,
            spec.command_name,
            spec.interval.as_secs() as i64,
            self.clock.now() + chrono::Duration::seconds(spec.interval.as_secs() as i64),
        );
        scheduled.enabled = spec.enabled;
        scheduled.body = spec.body;
        self.repo.upsert_scheduled(&scheduled).await
    }

    /// Reclaim orphans, reschedule missed recurring jobs, then spawn the
    /// worker pool and the recurring ticker.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        let now = self.clock.now();
        let orphaned = self.repo.fail_orphaned("orphaned", now).await?;
        if orphaned > 0 {
            warn!("reclaimed {} orphaned tasks as failed", orphaned);
        }
        self.repo.reschedule_missed(now).await?;

        let mut handles = Vec::with_capacity(self.config.workers + 1);
        for worker_id in 0..self.config.workers {
            let scheduler = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                scheduler.worker_loop(worker_id).await;
            }));
        }
        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            scheduler.ticker_loop().await;
        }));
        info!(workers = self.config.workers, "scheduler started");
        Ok(handles)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.notify.notify_waiters();
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!(worker_id, "worker started");
        let mut shutdown = self.shutdown_rx.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.claim_next().await {
                Ok(Some((task, handler, guard))) => {
                    self.execute(task, handler, guard).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(worker_id, "worker failed to claim a task: {}", e);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    /// Pick the highest-priority queued task whose command is not already
    /// running (unless reentrant). The per-command lock is taken before the
    /// queued→started transition; the transition itself is a compare-and-
    /// swap so a concurrent cancel wins cleanly.
    async fn claim_next(
        &self,
    ) -> Result<Option<(Task, Arc<dyn CommandHandler>, Option<OwnedMutexGuard<()>>)>> {
        let queued = self.repo.queued().await?;
        for task in queued {
            let handler = match self.handlers.read().await.get(&task.command_name) {
                Some(h) => h.clone(),
                None => {
                    warn!(command = %task.command_name, "no handler registered, failing task");
                    self.repo
                        .finish(
                            task.id,
                            TaskStatus::Failed,
                            Some(format!("no handler for command {}", task.command_name)),
                            self.clock.now(),
                        )
                        .await?;
                    continue;
                }
            };

            let guard = if handler.reentrant() {
                None
            } else {
                let mutex = {
                    let mut locks = self.command_locks.lock().await;
                    locks
                        .entry(task.command_name.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(())))
                        .clone()
                };
                match mutex.try_lock_owned() {
                    Ok(guard) => Some(guard),
                    // Command busy; try the next queued task.
                    Err(_) => continue,
                }
            };

            if self
                .repo
                .try_transition(task.id, TaskStatus::Queued, TaskStatus::Started, self.clock.now())
                .await?
            {
                return Ok(Some((task, handler, guard)));
            }
            // Lost the race (cancelled or claimed elsewhere); release the
            // command lock by dropping the guard and keep scanning.
        }
        Ok(None)
    }

    async fn execute(
        &self,
        task: Task,
        handler: Arc<dyn CommandHandler>,
        _guard: Option<OwnedMutexGuard<()>>,
    ) {
        let task_id = task.id;
        let command = task.command_name.clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        // Subscribed before the task lands in the running map so a racing
        // cancel() is never missed.
        let mut cancel_watch = cancel_rx.clone();
        self.running.lock().await.insert(task_id, cancel_tx.clone());

        let ctx = TaskContext {
            task_id,
            body: task.body.clone(),
            cancellation: CancellationHandle { rx: cancel_rx },
            progress: ProgressReporter::new(task_id, self.repo.clone(), self.clock.clone()),
        };

        debug!(task_id = %task_id, command = %command, "task started");
        let timeout = handler.timeout();
        let mut join = tokio::spawn(async move { handler.run(ctx).await });

        // Phase 1: run until completion, cancellation or deadline.
        let first = tokio::select! {
            res = &mut join => Some(res),
            _ = cancel_watch.changed() => None,
            _ = tokio::time::sleep(timeout) => {
                warn!(task_id = %task_id, "task exceeded its deadline, cancelling");
                let now = self.clock.now();
                let _ = self
                    .repo
                    .try_transition(task_id, TaskStatus::Started, TaskStatus::Cancelling, now)
                    .await;
                let _ = cancel_tx.send(true);
                None
            }
        };

        let cancel_requested = *cancel_tx.borrow();
        let outcome = match first {
            Some(res) => self.outcome_from(res, cancel_requested),
            None => {
                // Phase 2: cancellation in flight; wait out the grace period.
                tokio::select! {
                    res = &mut join => self.outcome_from(res, true),
                    _ = tokio::time::sleep(self.config.grace_period) => {
                        warn!(task_id = %task_id, command = %command,
                              "handler ignored cancellation past the grace period");
                        tokio::spawn(async move {
                            let late = join.await;
                            debug!(task_id = %task_id, ok = late.is_ok(),
                                   "late handler termination after forced abort");
                        });
                        (TaskStatus::Aborted, None)
                    }
                }
            }
        };

        let (status, exception) = outcome;
        let now = self.clock.now();
        if let Err(e) = self.repo.finish(task_id, status, exception, now).await {
            error!(task_id = %task_id, "failed to record task outcome: {}", e);
        }
        self.running.lock().await.remove(&task_id);
        debug!(task_id = %task_id, command = %command, status = %status, "task finished");
    }

    fn outcome_from(
        &self,
        res: std::result::Result<Result<()>, tokio::task::JoinError>,
        cancel_requested: bool,
    ) -> (TaskStatus, Option<String>) {
        match res {
            Ok(Ok(())) => {
                if cancel_requested {
                    (TaskStatus::Aborted, None)
                } else {
                    (TaskStatus::Completed, None)
                }
            }
            Ok(Err(e)) if e.is_cancelled() || cancel_requested => (TaskStatus::Aborted, None),
            Ok(Err(e)) => (TaskStatus::Failed, Some(e.to_string())),
            Err(join_err) => {
                error!("task handler panicked: {}", join_err);
                (TaskStatus::Failed, Some(format!("panic: {}", join_err)))
            }
        }
    }

    /// Every second: enqueue tasks for due recurring jobs, skipping commands
    /// that are already queued or running, and advance next_run.
    async fn ticker_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if let Err(e) = self.tick_recurring().await {
                error!("recurring ticker failed: {}", e);
            }
        }
    }

    async fn tick_recurring(&self) -> Result<()> {
        let now = self.clock.now();
        for scheduled in self.repo.due_scheduled(now).await? {
            if !self
                .repo
                .has_active_for_command(&scheduled.command_name)
                .await?
            {
                self.enqueue(
                    TaskSpec::new(scheduled.command_name.clone(), scheduled.body.clone())
                        .named(scheduled.name.clone()),
                )
                .await?;
            }
            let next = now + chrono::Duration::seconds(scheduled.interval_seconds);
            self.repo
                .set_scheduled_run(&scheduled.name, now, next)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
