//! Versioned schema migrations: definitions, files on disk, and the runner.

pub mod definitions;
pub mod manager;
pub mod rollback;
pub mod runner;

pub use definitions::*;
pub use manager::{parse_migration_content, MigrationConfig, MigrationManager};
pub use runner::Migrator;
