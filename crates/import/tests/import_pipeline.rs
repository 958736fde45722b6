//! End-to-end acquisition tests: search → grab → poll → import against the
//! in-memory store with the real decision engine.

use reelvault_core::adapters::MediaInfoAdapter;
use reelvault_core::clock::{SharedClock, SystemClock};
use reelvault_core::domain::repositories::*;
use reelvault_core::events::EventBus;
use reelvault_core::models::*;
use reelvault_core::registry::ExtRegistry;
use reelvault_core::scheduler::{CancellationHandle, Scheduler, SchedulerConfig};
use reelvault_core::services::{GrabService, PollDownloadsHandler, SearchConfig, SearchRunner};
use reelvault_core::testing::{MemoryStore, ScriptedDownloadClient, ScriptedIndexer};
use reelvault_core::wanted::{WantedLoopConfig, WantedService};
use reelvault_decision::DecisionEngine;
use reelvault_import::{ImportOutcome, ImportPipeline, UnlimitedFreeSpace};
use reelvault_import::pipeline::ImportPipelineDeps;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct NullMediaInfo;

#[async_trait::async_trait]
impl MediaInfoAdapter for NullMediaInfo {
    async fn probe(&self, _path: &Path) -> reelvault_core::Result<MediaInfo> {
        Ok(MediaInfo {
            video_codec: Some("x264".to_string()),
            ..Default::default()
        })
    }
}

struct Rig {
    store: Arc<MemoryStore>,
    registry: Arc<ExtRegistry>,
    runner: Arc<SearchRunner>,
    poll: PollDownloadsHandler,
    pipeline: Arc<ImportPipeline>,
    wanted: Arc<WantedService>,
    indexer_adapter: Arc<ScriptedIndexer>,
    client_adapter: Arc<ScriptedDownloadClient>,
    indexer_id: i32,
    movie: Movie,
    root: TempDir,
}

async fn rig() -> Rig {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ExtRegistry::new());
    let events = EventBus::new();
    let clock: SharedClock = Arc::new(SystemClock);
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        clock.clone(),
        SchedulerConfig::default(),
    ));

    // Profile: 720p + 1080p allowed, cutoff Bluray-1080p.
    let mut profile = QualityProfile::new(
        "HD".to_string(),
        vec![
            ProfileItem { quality: QualityId::Hdtv720p, allowed: true },
            ProfileItem { quality: QualityId::Bluray1080p, allowed: true },
        ],
        QualityId::Bluray1080p,
    );
    profile.id = 1;
    QualityProfileRepository::create(&*store, &profile).await.unwrap();

    let root = TempDir::new().unwrap();
    let mut movie = Movie::new(
        550,
        "Fight Club".to_string(),
        1,
        root.path().join("movies").display().to_string(),
    );
    movie.year = Some(1999);
    movie.status = MovieStatus::Released;
    MovieRepository::create(&*store, &movie).await.unwrap();

    let mut indexer = Indexer::new(
        "scripted".to_string(),
        "scripted-indexer".to_string(),
        Protocol::Torrent,
    );
    indexer.id = IndexerRepository::create(&*store, &indexer).await.unwrap();
    let indexer_adapter = Arc::new(ScriptedIndexer::new());
    registry.register_indexer(indexer.id, indexer_adapter.clone()).await;

    let mut client = DownloadClient::new(
        "qbit".to_string(),
        "torrent-client".to_string(),
        Protocol::Torrent,
    );
    client.priority = 1;
    client.id = DownloadClientRepository::create(&*store, &client).await.unwrap();
    let client_adapter = Arc::new(ScriptedDownloadClient::new());
    registry
        .register_download_client(client.id, client_adapter.clone())
        .await;

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
        grab,
        clock.clone(),
        SearchConfig::default(),
    ));
    let poll = PollDownloadsHandler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry.clone(),
        scheduler.queue(),
        events.clone(),
        clock.clone(),
    );
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
        decider,
        media_info: Arc::new(NullMediaInfo),
        free_space: Arc::new(UnlimitedFreeSpace),
        events: events.clone(),
        clock: clock.clone(),
    }));
    let wanted = Arc::new(WantedService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        scheduler.queue(),
        clock.clone(),
        WantedLoopConfig::default(),
    ));

    Rig {
        store,
        registry,
        runner,
        poll,
        pipeline,
        wanted,
        indexer_adapter,
        client_adapter,
        indexer_id: indexer.id,
        movie,
        root,
    }
}

fn bluray_release(guid: &str) -> reelvault_core::adapters::RawRelease {
    reelvault_core::adapters::RawRelease {
        guid: guid.to_string(),
        title: "Fight.Club.1999.1080p.BluRay.x264-GROUP".to_string(),
        download_url: "http://indexer/dl/1".to_string(),
        info_url: None,
        size_bytes: 8_500_000_000,
        publish_date: Some(chrono::Utc::now() - chrono::Duration::hours(6)),
        seeders: Some(20),
        leechers: Some(3),
        protocol: Protocol::Torrent,
    }
}

async fn write_download(dir: &Path, name: &str) -> std::path::PathBuf {
    tokio::fs::create_dir_all(dir).await.unwrap();
    let path = dir.join(name);
    tokio::fs::write(&path, vec![0u8; 200 * 1024 * 1024]).await.unwrap();
    path
}

#[tokio::test]
async fn grab_to_import_happy_path() {
    let rig = rig().await;
    rig.wanted.refresh_for_movie(rig.movie.id).await.unwrap();
    rig.indexer_adapter.set_releases(vec![bluray_release("fc-1")]);

    // Search approves and grabs the release.
    let outcome = rig
        .runner
        .search_movie(rig.movie.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    assert!(outcome.grabbed.is_some());
    assert!(outcome.failures.is_empty());

    let release = ReleaseRepository::find_by_guid(&*rig.store, "fc-1", rig.indexer_id)
        .await
        .unwrap()
        .expect("release row persisted");
    assert_eq!(release.status, ReleaseStatus::Grabbed);
    assert!(release.download_client_id.is_some());

    // Wanted row is gone after the grab.
    assert!(WantedRepository::find_by_movie_id(&*rig.store, rig.movie.id)
        .await
        .unwrap()
        .is_none());

    let queue = QueueRepository::list(&*rig.store).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].status, QueueItemStatus::Queued);
    let download_id = queue[0].download_id.clone();

    // The client finishes the download.
    let download_dir = rig.root.path().join("fc");
    write_download(&download_dir, "Fight.Club.1999.1080p.BluRay.x264-GROUP.mkv").await;
    rig.client_adapter
        .complete_download(&download_id, download_dir.to_str().unwrap());
    rig.poll.poll_once().await.unwrap();

    let pending = QueueRepository::find_by_id(&*rig.store, queue[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, QueueItemStatus::ImportPending);

    // Import organizes and registers the file.
    let outcome = rig
        .pipeline
        .import(pending.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    let ImportOutcome::Imported { movie_file, upgrade } = outcome else {
        panic!("expected an import");
    };
    assert!(!upgrade);

    let expected = rig
        .root
        .path()
        .join("movies/Fight Club (1999)/Fight Club (1999) Bluray-1080p.mkv");
    assert_eq!(Path::new(&movie_file.path), expected);
    assert!(expected.exists());

    let updated = MovieRepository::find_by_id(&*rig.store, rig.movie.id)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.has_file);
    assert_eq!(updated.movie_file_id, Some(movie_file.id));
    assert_eq!(updated.size_on_disk, 200 * 1024 * 1024);

    let done = QueueRepository::find_by_id(&*rig.store, pending.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, QueueItemStatus::Imported);

    // History: grabbed then downloadFolderImported, both successful.
    let history = HistoryRepository::list_for_movie(&*rig.store, rig.movie.id)
        .await
        .unwrap();
    let kinds: Vec<_> = history.iter().map(|h| h.event_type).collect();
    assert!(kinds.contains(&HistoryEventType::Grabbed));
    assert!(kinds.contains(&HistoryEventType::DownloadFolderImported));
    assert!(history.iter().all(|h| h.successful));
}

#[tokio::test]
async fn replay_after_crash_between_transfer_and_register() {
    let rig = rig().await;

    // A queue item whose transfer finished but whose registration never
    // committed: destination exists, no movie file row.
    let download_dir = rig.root.path().join("fc");
    let source =
        write_download(&download_dir, "Fight.Club.1999.1080p.BluRay.x264-GROUP.mkv").await;
    let dest_dir = rig.root.path().join("movies/Fight Club (1999)");
    tokio::fs::create_dir_all(&dest_dir).await.unwrap();
    tokio::fs::copy(&source, dest_dir.join("Fight Club (1999) Bluray-1080p.mkv"))
        .await
        .unwrap();

    let mut item = QueueItem::new(
        rig.movie.id,
        "Fight.Club.1999.1080p.BluRay.x264-GROUP".to_string(),
        1,
        "dl-replay".to_string(),
        Protocol::Torrent,
        200 * 1024 * 1024,
    );
    item.output_path = Some(download_dir.display().to_string());
    item.transition(QueueItemStatus::ImportPending);
    QueueRepository::update(&*rig.store, &item).await.unwrap();

    let outcome = rig
        .pipeline
        .import(item.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    assert!(matches!(outcome, ImportOutcome::Imported { .. }));

    let updated = MovieRepository::find_by_id(&*rig.store, rig.movie.id)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.has_file);

    // Exactly one registered file.
    assert!(MovieFileRepository::find_by_movie_id(&*rig.store, rig.movie.id)
        .await
        .unwrap()
        .is_some());

    // A second replay is a no-op: the item is terminal.
    let again = rig
        .pipeline
        .import(item.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    assert!(matches!(again, ImportOutcome::Skipped));
}

#[tokio::test]
async fn unmatchable_download_fails_with_history() {
    let rig = rig().await;
    let download_dir = rig.root.path().join("other");
    write_download(&download_dir, "Some.Other.Movie.2010.1080p.BluRay.x264-X.mkv").await;

    let mut item = QueueItem::new(
        rig.movie.id,
        "Some.Other.Movie.2010".to_string(),
        1,
        "dl-wrong".to_string(),
        Protocol::Torrent,
        200 * 1024 * 1024,
    );
    item.output_path = Some(download_dir.display().to_string());
    item.transition(QueueItemStatus::ImportPending);
    QueueRepository::update(&*rig.store, &item).await.unwrap();

    let outcome = rig
        .pipeline
        .import(item.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    let ImportOutcome::Failed { reasons } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(reasons[0].reason, RejectionReason::WrongMovie);

    let failed = QueueRepository::find_by_id(&*rig.store, item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, QueueItemStatus::Failed);
    assert!(!failed.status_messages.is_empty());

    let history = HistoryRepository::list_for_movie(&*rig.store, rig.movie.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, HistoryEventType::DownloadFailed);
    assert!(!history[0].successful);
}

#[tokio::test]
async fn upgrade_replaces_the_previous_file() {
    let rig = rig().await;

    // Existing 720p file on disk and registered.
    let library = rig.root.path().join("movies/Fight Club (1999)");
    let old_path = write_download(&library, "Fight Club (1999) HDTV-720p.mkv").await;
    let old_file = MovieFile::new(
        rig.movie.id,
        old_path.display().to_string(),
        "Fight Club (1999) HDTV-720p.mkv".to_string(),
        200 * 1024 * 1024,
        QualityId::Hdtv720p,
    );
    MovieFileRepository::create(&*rig.store, &old_file).await.unwrap();
    let mut movie = rig.movie.clone();
    movie.set_file(old_file.id, old_file.size_bytes);
    MovieRepository::update(&*rig.store, &movie).await.unwrap();

    let download_dir = rig.root.path().join("fc-upgrade");
    write_download(&download_dir, "Fight.Club.1999.1080p.BluRay.x264-GROUP.mkv").await;
    let mut item = QueueItem::new(
        rig.movie.id,
        "Fight.Club.1999.1080p.BluRay.x264-GROUP".to_string(),
        1,
        "dl-upgrade".to_string(),
        Protocol::Torrent,
        200 * 1024 * 1024,
    );
    item.output_path = Some(download_dir.display().to_string());
    item.transition(QueueItemStatus::ImportPending);
    QueueRepository::update(&*rig.store, &item).await.unwrap();

    let outcome = rig
        .pipeline
        .import(item.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    let ImportOutcome::Imported { movie_file, upgrade } = outcome else {
        panic!("expected an import");
    };
    assert!(upgrade);
    assert_eq!(movie_file.quality, QualityId::Bluray1080p);

    // Old file is gone from disk and from the store.
    assert!(!old_path.exists());
    let registered = MovieFileRepository::find_by_movie_id(&*rig.store, rig.movie.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(registered.id, movie_file.id);

    let history = HistoryRepository::list_for_movie(&*rig.store, rig.movie.id)
        .await
        .unwrap();
    assert_eq!(history[0].event_type, HistoryEventType::QualityUpgraded);
}

#[tokio::test]
async fn zero_enabled_indexers_completes_with_nothing() {
    let rig = rig().await;
    rig.registry.remove_indexer(rig.indexer_id).await;

    let outcome = rig
        .runner
        .search_movie(rig.movie.id, &CancellationHandle::none(), None)
        .await
        .unwrap();
    assert!(outcome.releases.is_empty());
    assert!(outcome.grabbed.is_none());
    assert!(outcome.failures.is_empty());
}
