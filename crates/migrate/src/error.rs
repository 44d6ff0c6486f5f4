//! Error types for the migration runner and seeders

use shift_core::ConfigError;
use thiserror::Error;

use crate::migrations::Version;
use crate::store::StoreError;

/// Result type alias for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An `up` body failed; earlier migrations of the run stay committed
    #[error("migration {version} ({name}) failed: {cause}")]
    Migration {
        version: Version,
        name: String,
        #[source]
        cause: StoreError,
    },

    /// A `down` body failed; earlier reversions of the run stay removed
    #[error("rollback of {version} ({name}) failed: {cause}")]
    Rollback {
        version: Version,
        name: String,
        #[source]
        cause: StoreError,
    },

    #[error("seeder '{seeder}' failed: {cause}")]
    Seed {
        seeder: String,
        #[source]
        cause: StoreError,
    },

    #[error("version {0} does not match any known migration")]
    UnknownVersion(Version),

    #[error("version {0} is recorded in the ledger but no migration file defines it")]
    MissingMigration(Version),

    #[error("duplicate migration version {0}")]
    DuplicateVersion(Version),

    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    #[error("seeder '{0}' is not defined")]
    UnknownSeeder(String),

    #[error("seeder dependency error: {0}")]
    SeederDependency(String),

    #[error("{0}")]
    Scaffold(String),

    #[error("interrupted after {completed} completed step(s); the ledger reflects committed work only")]
    Interrupted { completed: usize },

    #[error("database error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Version at which a run halted, if the error names one
    pub fn version(&self) -> Option<Version> {
        match self {
            RunnerError::Migration { version, .. }
            | RunnerError::Rollback { version, .. }
            | RunnerError::UnknownVersion(version)
            | RunnerError::MissingMigration(version)
            | RunnerError::DuplicateVersion(version) => Some(*version),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_error_names_version_and_cause() {
        let err = RunnerError::Migration {
            version: Version(20230102000000),
            name: "AddEmailToUsers".into(),
            cause: StoreError::Transaction("deadlock".into()),
        };
        assert_eq!(
            err.to_string(),
            "migration 20230102000000 (AddEmailToUsers) failed: transaction error: deadlock"
        );
        assert_eq!(err.version(), Some(Version(20230102000000)));
    }

    #[test]
    fn seed_error_names_seeder() {
        let err = RunnerError::Seed {
            seeder: "UserSeeder".into(),
            cause: StoreError::Connection("refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "seeder 'UserSeeder' failed: connection error: refused"
        );
        assert_eq!(err.version(), None);
    }
}
