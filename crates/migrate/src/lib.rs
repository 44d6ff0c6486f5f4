//! Shift migration engine
//!
//! Loads versioned migration files, tracks applied versions in a ledger
//! table and applies or reverts them through a [`DataStore`]. Seeders insert
//! fixture data through the same store without touching the ledger.

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod naming;
pub mod seeder;
pub mod store;

pub use error::{RunnerError, RunnerResult};
pub use ledger::{LedgerEntry, LedgerSql};
pub use migrations::{
    ApplyMode, Direction, MigrateOptions, MigrateReport, Migration, MigrationConfig,
    MigrationManager, MigrationRef, MigrationState, MigrationStatus, Migrator, RollbackOptions,
    RollbackReport, RollbackTarget, Version,
};
pub use seeder::{create_seeder, FnSeeder, SeedFuture, SeedReport, Seeder, SeederRegistry, SqlSeeder};
pub use store::{DataStore, MemoryStore, SqlStore, StoreError, StoreResult};
