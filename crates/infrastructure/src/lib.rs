//! PostgreSQL persistence for Reelvault
//!
//! Implements every repository trait from `reelvault-core` over a sqlx
//! connection pool. Driver errors map onto the core error taxonomy:
//! unique violations become `AlreadyExists`, foreign-key violations become
//! `InvalidReference`, connection loss becomes `Transient`.

pub mod database;
pub mod repositories;

pub use database::{connect, DatabaseConfig, DatabasePool};
pub use repositories::PostgresStore;
