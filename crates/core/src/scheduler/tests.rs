use super::*;
use crate::clock::{ManualClock, SystemClock};
use crate::models::task::TaskPriority;
use crate::testing::MemoryStore;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::time::{sleep, timeout};

struct ClosureHandler<F> {
    f: F,
    reentrant: bool,
    timeout: Duration,
}

impl<F> ClosureHandler<F> {
    fn new(f: F) -> Self {
        Self {
            f,
            reentrant: false,
            timeout: Duration::from_secs(3600),
        }
    }
}

#[async_trait::async_trait]
impl<F, Fut> CommandHandler for ClosureHandler<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn run(&self, ctx: TaskContext) -> Result<()> {
        (self.f)(ctx).await
    }

    fn reentrant(&self) -> bool {
        self.reentrant
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        workers: 2,
        grace_period: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    }
}

async fn wait_for_status(scheduler: &Scheduler, id: Uuid, status: TaskStatus) -> Task {
    timeout(Duration::from_secs(5), async {
        loop {
            let task = scheduler.status(id).await.unwrap();
            if task.status == status {
                return task;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not reach expected status")
}

#[tokio::test]
async fn runs_a_task_to_completion() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), test_config()));

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    scheduler
        .register_handler(
            "Noop",
            Arc::new(ClosureHandler::new(move |_ctx| {
                let ran = ran_clone.clone();
                async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
        )
        .await;

    let handles = scheduler.start().await.unwrap();
    let id = scheduler
        .enqueue(TaskSpec::new("Noop", serde_json::json!({})))
        .await
        .unwrap();

    let task = wait_for_status(&scheduler, id, TaskStatus::Completed).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    // started/ended timestamp ordering
    assert!(task.queued_at <= task.started_at.unwrap());
    assert!(task.started_at.unwrap() <= task.ended_at.unwrap());

    scheduler.shutdown();
    for handle in handles {
        let _ = timeout(Duration::from_secs(1), handle).await;
    }
}

#[tokio::test]
async fn failed_handler_records_exception() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), test_config()));
    scheduler
        .register_handler(
            "Fails",
            Arc::new(ClosureHandler::new(|_ctx| async {
                Err(ReelvaultError::internal("boom"))
            })),
        )
        .await;

    let _handles = scheduler.start().await.unwrap();
    let id = scheduler
        .enqueue(TaskSpec::new("Fails", serde_json::json!({})))
        .await
        .unwrap();

    let task = wait_for_status(&scheduler, id, TaskStatus::Failed).await;
    assert!(task.exception.unwrap().contains("boom"));
    scheduler.shutdown();
}

#[tokio::test]
async fn priority_beats_fifo() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config();
    config.workers = 1;
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), config));

    let order: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
    let gate = Arc::new(tokio::sync::Semaphore::new(0));

    let gate_clone = gate.clone();
    scheduler
        .register_handler(
            "Blocker",
            Arc::new(ClosureHandler::new(move |_ctx| {
                let gate = gate_clone.clone();
                async move {
                    let _permit = gate.acquire().await.unwrap();
                    Ok(())
                }
            })),
        )
        .await;
    for command in ["LowPrio", "HighPrio"] {
        let order = order.clone();
        scheduler
            .register_handler(
                command,
                Arc::new(ClosureHandler::new(move |ctx: TaskContext| {
                    let order = order.clone();
                    async move {
                        order
                            .lock()
                            .unwrap()
                            .push(ctx.body["tag"].as_str().unwrap().to_string());
                        Ok(())
                    }
                })),
            )
            .await;
    }

    let _handles = scheduler.start().await.unwrap();

    // Occupy the single worker, then queue low before high.
    let blocker = scheduler
        .enqueue(TaskSpec::new("Blocker", serde_json::json!({})))
        .await
        .unwrap();
    wait_for_status(&scheduler, blocker, TaskStatus::Started).await;

    let low = scheduler
        .enqueue(
            TaskSpec::new("LowPrio", serde_json::json!({"tag": "low"}))
                .with_priority(TaskPriority::Low),
        )
        .await
        .unwrap();
    let high = scheduler
        .enqueue(
            TaskSpec::new("HighPrio", serde_json::json!({"tag": "high"}))
                .with_priority(TaskPriority::High),
        )
        .await
        .unwrap();

    gate.add_permits(1);
    wait_for_status(&scheduler, low, TaskStatus::Completed).await;
    wait_for_status(&scheduler, high, TaskStatus::Completed).await;

    assert_eq!(*order.lock().unwrap(), vec!["high".to_string(), "low".to_string()]);
    scheduler.shutdown();
}

#[tokio::test]
async fn non_reentrant_commands_never_overlap() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), test_config()));

    let concurrent = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let concurrent_clone = concurrent.clone();
    let peak_clone = peak.clone();
    scheduler
        .register_handler(
            "Serial",
            Arc::new(ClosureHandler::new(move |_ctx| {
                let concurrent = concurrent_clone.clone();
                let peak = peak_clone.clone();
                async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(50)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
        )
        .await;

    let _handles = scheduler.start().await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            scheduler
                .enqueue(TaskSpec::new("Serial", serde_json::json!({})))
                .await
                .unwrap(),
        );
    }
    for id in ids {
        wait_for_status(&scheduler, id, TaskStatus::Completed).await;
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    scheduler.shutdown();
}

#[tokio::test]
async fn cancel_queued_task_aborts_atomically() {
    let store = Arc::new(MemoryStore::new());
    // No workers started: the task stays queued.
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), test_config()));
    let id = scheduler
        .enqueue(TaskSpec::new("Anything", serde_json::json!({})))
        .await
        .unwrap();

    scheduler.cancel(id).await.unwrap();
    let task = scheduler.status(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Aborted);

    // Cancelling a terminal task is a conflict.
    assert!(matches!(
        scheduler.cancel(id).await,
        Err(ReelvaultError::Conflict { .. })
    ));
}

#[tokio::test]
async fn cancel_started_task_is_cooperative() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), test_config()));
    scheduler
        .register_handler(
            "WaitsForCancel",
            Arc::new(ClosureHandler::new(|ctx: TaskContext| async move {
                ctx.cancellation.cancelled().await;
                ctx.cancellation.check("waits_for_cancel")
            })),
        )
        .await;

    let _handles = scheduler.start().await.unwrap();
    let id = scheduler
        .enqueue(TaskSpec::new("WaitsForCancel", serde_json::json!({})))
        .await
        .unwrap();

    wait_for_status(&scheduler, id, TaskStatus::Started).await;
    scheduler.cancel(id).await.unwrap();
    let task = wait_for_status(&scheduler, id, TaskStatus::Aborted).await;
    assert!(task.exception.is_none());
    scheduler.shutdown();
}

#[tokio::test]
async fn stubborn_handler_is_aborted_after_grace_period() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(Scheduler::new(store, Arc::new(SystemClock), test_config()));
    scheduler
        .register_handler(
            "IgnoresCancel",
            Arc::new(ClosureHandler::new(|_ctx| async {
                sleep(Duration::from_secs(60)).await;
                Ok(())
            })),
        )
        .await;

    let _handles = scheduler.start().await.unwrap();
    let id = scheduler
        .enqueue(TaskSpec::new("IgnoresCancel", serde_json::json!({})))
        .await
        .unwrap();

    wait_for_status(&scheduler, id, TaskStatus::Started).await;
    scheduler.cancel(id).await.unwrap();
    // Grace period in the test config is 200ms.
    wait_for_status(&scheduler, id, TaskStatus::Aborted).await;
    scheduler.shutdown();
}

#[tokio::test]
async fn orphaned_tasks_are_failed_on_start() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock);

    let mut task = Task::new(
        "orphan",
        "Orphaned",
        serde_json::json!({}),
        TaskPriority::Normal,
        chrono::Utc::now(),
    );
    task.status = TaskStatus::Started;
    task.started_at = Some(chrono::Utc::now());
    TaskRepository::insert(&*store, &task).await.unwrap();

    let scheduler = Arc::new(Scheduler::new(store, clock, test_config()));
    let _handles = scheduler.start().await.unwrap();

    let reclaimed = scheduler.status(task.id).await.unwrap();
    assert_eq!(reclaimed.status, TaskStatus::Failed);
    assert_eq!(reclaimed.exception.as_deref(), Some("orphaned"));
    scheduler.shutdown();
}

#[tokio::test]
async fn recurring_jobs_enqueue_without_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        clock.clone(),
        test_config(),
    ));

    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let gate_clone = gate.clone();
    let runs_clone = runs.clone();
    scheduler
        .register_handler(
            "RefreshWanted",
            Arc::new(ClosureHandler::new(move |_ctx| {
                let gate = gate_clone.clone();
                let runs = runs_clone.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let _permit = gate.acquire().await.unwrap();
                    Ok(())
                }
            })),
        )
        .await;
    scheduler
        .register_recurring(RecurringSpec {
            name: "refresh-wanted".to_string(),
            command_name: "RefreshWanted".to_string(),
            interval: Duration::from_secs(900),
            enabled: true,
            body: serde_json::json!({}),
        })
        .await
        .unwrap();

    let _handles = scheduler.start().await.unwrap();

    // Due after the interval elapses on the injected clock.
    clock.advance(chrono::Duration::seconds(901));
    timeout(Duration::from_secs(2), async {
        while runs.load(Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // While the first run is still blocked, further due ticks must not
    // enqueue a second task for the same command.
    clock.advance(chrono::Duration::seconds(901));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    gate.add_permits(10);
    scheduler.shutdown();
}
