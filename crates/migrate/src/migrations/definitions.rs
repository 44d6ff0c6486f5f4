//! Migration Definitions - Core types shared by the manager, the runner and
//! the stores.

use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::RunnerError;

const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Migration version, a `YYYYMMDDHHMMSS` timestamp for generated files.
///
/// `Version::ZERO` sits before every migration and is never used by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    pub const ZERO: Version = Version(0);

    /// Version for the current UTC second
    pub fn now() -> Self {
        let stamp = Utc::now().format(VERSION_FORMAT).to_string();
        Version(stamp.parse().unwrap_or_default())
    }

    /// The smallest version strictly after this one.
    ///
    /// Timestamp versions advance by one second so they stay valid dates.
    pub fn next(self) -> Self {
        match NaiveDateTime::parse_from_str(&self.to_string(), VERSION_FORMAT) {
            Ok(at) => {
                let stamp = (at + Duration::seconds(1)).format(VERSION_FORMAT).to_string();
                stamp.parse().map(Version).unwrap_or(Version(self.0 + 1))
            }
            Err(_) => Version(self.0 + 1),
        }
    }

    /// Parse a `YYYYMMDD` or `YYYYMMDDHHMMSS` date into a version boundary
    pub fn from_date(date: &str) -> Result<Self, RunnerError> {
        let digits = date.trim();
        let padded = match digits.len() {
            8 => format!("{}000000", digits),
            14 => digits.to_string(),
            _ => {
                return Err(RunnerError::InvalidMigration(format!(
                    "'{}' is not a YYYYMMDD or YYYYMMDDHHMMSS date",
                    date
                )))
            }
        };

        NaiveDateTime::parse_from_str(&padded, VERSION_FORMAT).map_err(|e| {
            RunnerError::InvalidMigration(format!("'{}' is not a valid date: {}", date, e))
        })?;

        padded
            .parse()
            .map(Version)
            .map_err(|e| RunnerError::InvalidMigration(format!("'{}': {}", date, e)))
    }

    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(RunnerError::InvalidMigration(format!(
                "'{}' is not a migration version",
                s
            )));
        }
        trimmed
            .parse()
            .map(Version)
            .map_err(|e| RunnerError::InvalidMigration(format!("'{}': {}", s, e)))
    }
}

/// Represents a database migration
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub version: Version,
    /// CamelCase name, also written to the ledger
    pub name: String,
    /// SQL statements to apply the migration
    pub up_sql: String,
    /// SQL statements to revert the migration
    pub down_sql: String,
    /// Source file, when loaded from disk
    pub path: Option<PathBuf>,
}

impl Migration {
    pub fn new(
        version: Version,
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
            path: None,
        }
    }

    /// SQL body for a direction
    pub fn sql(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up_sql,
            Direction::Down => &self.down_sql,
        }
    }

    pub fn reference(&self) -> MigrationRef {
        MigrationRef {
            version: self.version,
            name: self.name.clone(),
        }
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the migration (run UP statements)
    Up,
    /// Revert the migration (run DOWN statements)
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Whether a store runs the migration body or only updates the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Execute,
    /// Ledger only (`--fake`)
    Fake,
}

/// Version and name of a migration that took part in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRef {
    pub version: Version,
    pub name: String,
}

impl fmt::Display for MigrationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.version, self.name)
    }
}

/// State of one migration as reported by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MigrationState {
    Applied {
        start_time: Option<String>,
        end_time: Option<String>,
    },
    Pending,
    /// In the ledger, but no migration file defines it
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: Version,
    pub name: String,
    #[serde(flatten)]
    pub state: MigrationState,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self.state, MigrationState::Applied { .. })
    }
}

/// Options for `migrate`
#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    /// Highest version to apply; `None` means every known migration
    pub target: Option<Version>,
    pub dry_run: bool,
    pub mode: ApplyMode,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            target: None,
            dry_run: false,
            mode: ApplyMode::Execute,
        }
    }
}

/// Where a rollback stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// Only the most recently applied version
    LastStep,
    /// Revert every entry newer than this version; `Version::ZERO` reverts all
    Version(Version),
    /// Revert every entry created at or after this timestamp
    Date(Version),
}

/// Options for `rollback`
#[derive(Debug, Clone, Copy)]
pub struct RollbackOptions {
    pub target: RollbackTarget,
    pub dry_run: bool,
    pub mode: ApplyMode,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            target: RollbackTarget::LastStep,
            dry_run: false,
            mode: ApplyMode::Execute,
        }
    }
}

/// Result of running migrations
#[derive(Debug, Default)]
pub struct MigrateReport {
    /// Migrations applied in this run, ascending
    pub applied: Vec<MigrationRef>,
    /// Number of known migrations that were already applied
    pub skipped_count: usize,
    /// The run only computed its plan
    pub dry_run: bool,
    pub execution_time_ms: u128,
}

/// Result of rolling back migrations
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Migrations reverted in this run, descending
    pub reverted: Vec<MigrationRef>,
    pub dry_run: bool,
    pub execution_time_ms: u128,
}
