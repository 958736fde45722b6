//! Import pipeline
//!
//! Walks a finished download from "download completed" through candidate
//! discovery, decisioning, on-disk organization and registration of the
//! resulting movie file. Every step is retry-safe; the registration
//! transaction is the commit point.

pub mod naming;
pub mod pipeline;
pub mod scanner;
pub mod transfer;

pub use naming::{NamingInput, NamingPlanner};
pub use pipeline::{
    FreeSpace, ImportDownloadHandler, ImportOutcome, ImportPipeline, ImportPipelineDeps,
    UnlimitedFreeSpace,
};
pub use scanner::{scan_candidates, CandidateFile};
pub use transfer::{transfer_file, TransferOutcome};
