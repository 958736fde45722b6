//! Domain models

pub mod blocklist;
pub mod config;
pub mod custom_format;
pub mod decision;
pub mod history;
pub mod indexer;
pub mod language;
pub mod movie;
pub mod movie_file;
pub mod notification;
pub mod quality;
pub mod queue;
pub mod release;
pub mod task;
pub mod wanted;

pub use blocklist::BlocklistEntry;
pub use config::{
    ColonReplacement, HostConfig, ImportMechanism, MediaManagementConfig, NamingConfig, RootFolder,
};
pub use custom_format::{CustomFormat, FormatSpecification, SpecImplementation};
pub use decision::{
    CandidateOrder, Decision, DecisionRequest, ParsedMovieInfo, Rejection, RejectionReason,
    RejectionType, ReleaseDecider,
};
pub use history::{History, HistoryEventType};
pub use indexer::{DownloadClient, Indexer, Protocol};
pub use language::Language;
pub use movie::{slugify, MinimumAvailability, Movie, MovieStatus};
pub use movie_file::{MediaInfo, MovieFile};
pub use notification::{ImportListConfig, NotificationConfig};
pub use quality::{FormatScore, ProfileItem, QualityDefinition, QualityId, QualityProfile};
pub use queue::{MessageLevel, QueueItem, QueueItemStatus, StatusMessage};
pub use release::{Release, ReleaseStatus};
pub use task::{
    ProgressMessage, ScheduledTask, Task, TaskPriority, TaskProgress, TaskStatus,
    PROGRESS_RING_CAPACITY,
};
pub use wanted::{backoff_delay, SearchFailure, WantedMovie, WantedStatus};
