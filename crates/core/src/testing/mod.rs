//! Test doubles: an in-memory store implementing every repository trait and
//! scripted adapter implementations
//!
//! Integration tests across the workspace run against these instead of a
//! live database. The store honors the same uniqueness and cascade
//! semantics the Postgres implementations enforce.

mod adapters;
mod store;

pub use adapters::{
    ScriptedDownloadClient, ScriptedImportList, ScriptedIndexer, ScriptedNotification,
};
pub use store::MemoryStore;
