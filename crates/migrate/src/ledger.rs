//! Applied-version ledger rows and the SQL that maintains them.

use chrono::Utc;
use serde::Serialize;
use shift_core::Adapter;

use crate::migrations::Version;

/// Time format written to `start_time` / `end_time`
pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn ledger_timestamp() -> String {
    Utc::now().format(LEDGER_TIME_FORMAT).to_string()
}

/// One applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub version: Version,
    pub migration_name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl LedgerEntry {
    pub fn new(version: Version, migration_name: impl Into<String>) -> Self {
        Self {
            version,
            migration_name: migration_name.into(),
            start_time: None,
            end_time: None,
        }
    }
}

/// SQL for the ledger table of one adapter
#[derive(Debug, Clone)]
pub struct LedgerSql {
    table: String,
    adapter: Adapter,
}

impl LedgerSql {
    /// `table` must already be validated as a plain identifier
    pub fn new(table: impl Into<String>, adapter: Adapter) -> Self {
        Self {
            table: table.into(),
            adapter,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version BIGINT NOT NULL PRIMARY KEY,\n    \
                migration_name VARCHAR(100),\n    \
                start_time VARCHAR(32),\n    \
                end_time VARCHAR(32)\n\
            )",
            self.table
        )
    }

    /// Counts rows in the catalog naming the ledger table (0 or 1)
    pub fn table_exists_sql(&self) -> String {
        let p = self.adapter.placeholder(1);
        match self.adapter {
            Adapter::Sqlite => format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
                p
            ),
            Adapter::Mysql => format!(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = {}",
                p
            ),
            Adapter::Pgsql => format!(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = {}",
                p
            ),
        }
    }

    /// Versions come back as text: the `Any` driver narrows SQLite integers
    pub fn select_sql(&self) -> String {
        let cast = match self.adapter {
            Adapter::Mysql => "CHAR",
            Adapter::Pgsql | Adapter::Sqlite => "TEXT",
        };
        format!(
            "SELECT CAST(version AS {cast}) AS version_text, migration_name, start_time, end_time \
             FROM {table} ORDER BY {table}.version ASC",
            cast = cast,
            table = self.table
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (version, migration_name, start_time, end_time) VALUES ({}, {}, {}, {})",
            self.table,
            self.adapter.placeholder(1),
            self.adapter.placeholder(2),
            self.adapter.placeholder(3),
            self.adapter.placeholder(4),
        )
    }

    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE version = {}",
            self.table,
            self.adapter.placeholder(1)
        )
    }
}
