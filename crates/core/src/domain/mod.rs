//! Domain contracts
//!
//! Repository traits abstract the authoritative relational store; every
//! other component reads and mutates entities through them.

pub mod repositories;

pub use repositories::*;
