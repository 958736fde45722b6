//! Reelvault daemon
//!
//! Wires the store, adapter registry, scheduler and pipeline services
//! together and runs until interrupted. The HTTP layer and the concrete
//! indexer/download-client/notification adapters plug in through
//! `ExtRegistry` and the service handles constructed here.

use anyhow::Context;
use clap::Parser;
use reelvault_core::calendar::{CalendarInvalidator, CalendarService};
use reelvault_core::clock::{SharedClock, SystemClock};
use reelvault_core::events::{EventBus, EventProcessor};
use reelvault_core::registry::ExtRegistry;
use reelvault_core::scheduler::{RecurringSpec, Scheduler, SchedulerConfig};
use reelvault_core::services::{
    GrabService, ImportListSync, ListSyncHandler, MovieService, NotificationFanout,
    PollDownloadsHandler, QueueService, ReleaseService, RssSyncHandler, SearchConfig,
    SearchMovieHandler, SearchRunner,
};
use reelvault_core::wanted::{WantedLoopConfig, WantedService, WantedTickHandler};
use reelvault_decision::DecisionEngine;
use reelvault_import::{
    ImportDownloadHandler, ImportPipeline, ImportPipelineDeps, UnlimitedFreeSpace,
};
use reelvault_infrastructure::{connect, DatabaseConfig, PostgresStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reelvault", about = "Movie library automation daemon")]
struct Args {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Worker pool size for the task scheduler
    #[arg(long, env = "REELVAULT_WORKERS", default_value_t = 3)]
    workers: usize,

    /// Wanted-search tick interval in seconds
    #[arg(long, env = "REELVAULT_WANTED_INTERVAL", default_value_t = 900)]
    wanted_interval_secs: u64,

    /// Download poll interval in seconds
    #[arg(long, env = "REELVAULT_POLL_INTERVAL", default_value_t = 60)]
    poll_interval_secs: u64,

    /// RSS sweep interval in seconds
    #[arg(long, env = "REELVAULT_RSS_INTERVAL", default_value_t = 1800)]
    rss_interval_secs: u64,

    /// Calendar cache TTL in seconds
    #[arg(long, env = "REELVAULT_CALENDAR_TTL", default_value_t = 300)]
    calendar_ttl_secs: i64,

    /// Emit logs as JSON
    #[arg(long, env = "REELVAULT_LOG_JSON", default_value_t = false)]
    log_json: bool,
}

/// Long-lived service handles the embedding layers (HTTP, CLI) consume.
#[allow(dead_code)]
struct App {
    movies: Arc<MovieService>,
    releases: Arc<ReleaseService>,
    queue: Arc<QueueService>,
    wanted: Arc<WantedService>,
    calendar: Arc<CalendarService>,
    scheduler: Arc<Scheduler>,
    registry: Arc<ExtRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);
    info!("reelvault starting");

    let pool = connect(&DatabaseConfig::new(&args.database_url))
        .await
        .context("database connection failed")?;
    let store = Arc::new(PostgresStore::new(pool));
    store.migrate().await.context("schema migration failed")?;

    let clock: SharedClock = Arc::new(SystemClock);
    let events = EventBus::new();
    let registry = Arc::new(ExtRegistry::new());
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        clock.clone(),
        SchedulerConfig {
            workers: args.workers,
            ..SchedulerConfig::default()
        },
    ));

    // Pipeline services
    let decider = Arc::new(DecisionEngine::new());
    let grab = Arc::new(GrabService::new(
        store.clone(),
        store.clone(),
        registry.clone(),
        store.clone(),
        events.clone(),
        clock.clone(),
    ));
    let runner = Arc::new(SearchRunner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        registry.clone(),
        decider.clone(),
        grab.clone(),
        clock.clone(),
        SearchConfig::default(),
    ));
    let wanted = Arc::new(WantedService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        scheduler.queue(),
        clock.clone(),
        WantedLoopConfig::default(),
    ));
    let pipeline = Arc::new(ImportPipeline::new(ImportPipelineDeps {
        movies: store.clone(),
        files: store.clone(),
        profiles: store.clone(),
        formats: store.clone(),
        queue: store.clone(),
        wanted: store.clone(),
        clients: store.clone(),
        config: store.clone(),
        history: store.clone(),
        store: store.clone(),
        registry: registry.clone(),
        decider: decider.clone(),
        media_info: Arc::new(NullMediaInfo),
        free_space: Arc::new(UnlimitedFreeSpace),
        events: events.clone(),
        clock: clock.clone(),
    }));
    let poll = Arc::new(PollDownloadsHandler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry.clone(),
        scheduler.queue(),
        events.clone(),
        clock.clone(),
    ));
    let poll_recovery = poll.clone();
    let list_sync = Arc::new(ImportListSync::new(
        store.clone(),
        store.clone(),
        wanted.clone(),
        registry.clone(),
        events.clone(),
    ));

    // Programmatic surface
    let calendar = Arc::new(CalendarService::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        chrono::Duration::seconds(args.calendar_ttl_secs),
    ));
    let _app = App {
        movies: Arc::new(MovieService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            wanted.clone(),
            events.clone(),
            clock.clone(),
        )),
        releases: Arc::new(ReleaseService::new(
            store.clone(),
            store.clone(),
            runner.clone(),
            grab.clone(),
        )),
        queue: Arc::new(QueueService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry.clone(),
            clock.clone(),
        )),
        wanted: wanted.clone(),
        calendar: calendar.clone(),
        scheduler: scheduler.clone(),
        registry: registry.clone(),
    };

    // Command handlers
    scheduler
        .register_handler(
            SearchMovieHandler::COMMAND,
            Arc::new(SearchMovieHandler::new(runner.clone())),
        )
        .await;
    scheduler
        .register_handler(RssSyncHandler::COMMAND, Arc::new(RssSyncHandler::new(runner)))
        .await;
    scheduler
        .register_handler(
            WantedTickHandler::COMMAND,
            Arc::new(WantedTickHandler::new(wanted)),
        )
        .await;
    scheduler
        .register_handler(PollDownloadsHandler::COMMAND, poll)
        .await;
    scheduler
        .register_handler(
            ImportDownloadHandler::COMMAND,
            Arc::new(ImportDownloadHandler::new(pipeline)),
        )
        .await;
    scheduler
        .register_handler(
            ListSyncHandler::COMMAND,
            Arc::new(ListSyncHandler::new(list_sync)),
        )
        .await;

    // Recurring jobs
    scheduler
        .register_recurring(RecurringSpec {
            name: "wanted-search".to_string(),
            command_name: WantedTickHandler::COMMAND.to_string(),
            interval: Duration::from_secs(args.wanted_interval_secs),
            enabled: true,
            body: serde_json::json!({}),
        })
        .await?;
    scheduler
        .register_recurring(RecurringSpec {
            name: "poll-downloads".to_string(),
            command_name: PollDownloadsHandler::COMMAND.to_string(),
            interval: Duration::from_secs(args.poll_interval_secs),
            enabled: true,
            body: serde_json::json!({}),
        })
        .await?;
    scheduler
        .register_recurring(RecurringSpec {
            name: "rss-sync".to_string(),
            command_name: RssSyncHandler::COMMAND.to_string(),
            interval: Duration::from_secs(args.rss_interval_secs),
            enabled: true,
            body: serde_json::json!({}),
        })
        .await?;
    scheduler
        .register_recurring(RecurringSpec {
            name: "import-list-sync".to_string(),
            command_name: ListSyncHandler::COMMAND.to_string(),
            interval: Duration::from_secs(6 * 3600),
            enabled: true,
            body: serde_json::json!({}),
        })
        .await?;

    // Event subscribers: calendar invalidation and notification fan-out.
    let processor = EventProcessor::new(&events)
        .add_handler(Arc::new(CalendarInvalidator::new(calendar)))
        .add_handler(Arc::new(NotificationFanout::new(registry)));
    tokio::spawn(processor.run());

    let handles = scheduler.start().await?;
    // Imports interrupted by a previous shutdown pick up where they left off.
    poll_recovery.resume_pending_imports().await?;
    info!("reelvault running");

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutdown requested");
    scheduler.shutdown();
    for handle in handles {
        let _ = handle.await;
    }
    info!("reelvault stopped");
    Ok(())
}

/// Media info probing is adapter territory; the daemon ships a stub until a
/// probe implementation is registered.
struct NullMediaInfo;

#[async_trait::async_trait]
impl reelvault_core::adapters::MediaInfoAdapter for NullMediaInfo {
    async fn probe(
        &self,
        _path: &std::path::Path,
    ) -> reelvault_core::Result<reelvault_core::models::MediaInfo> {
        Ok(reelvault_core::models::MediaInfo::default())
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
