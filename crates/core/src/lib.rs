//! # shift-core
//!
//! Configuration for the shift migration runner: named environments,
//! project paths and the ledger table name, loaded from `DB_*` environment
//! variables or a YAML file.

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;
