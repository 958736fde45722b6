//! Acquisition pipeline services and the programmatic surface

pub mod grab;
pub mod library;
pub mod list_sync;
pub mod notify;
pub mod poll;
pub mod queue_ops;
pub mod releases;
pub mod search;

pub use grab::GrabService;
pub use library::{MovieService, NewMovie};
pub use list_sync::{ImportListSync, ListSyncHandler};
pub use notify::NotificationFanout;
pub use poll::PollDownloadsHandler;
pub use queue_ops::QueueService;
pub use releases::ReleaseService;
pub use search::{
    RssSyncHandler, SearchConfig, SearchMovieHandler, SearchOutcome, SearchRunner,
};
