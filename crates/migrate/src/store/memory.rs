//! In-memory `DataStore` with failure injection, for tests and embedding.

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{split_statements, DataStore, StoreError, StoreResult};
use crate::ledger::{ledger_timestamp, LedgerEntry};
use crate::migrations::{ApplyMode, Direction, Migration, Version};

#[derive(Debug, Default)]
struct MemoryState {
    ledger_ready: bool,
    ledger: BTreeMap<Version, LedgerEntry>,
    journal: Vec<String>,
    history: Vec<(Direction, Version)>,
    failing_statements: Vec<String>,
    failing_migrations: Vec<(Version, Direction)>,
}

/// Keeps the ledger and every committed statement in memory.
///
/// A failing unit leaves no trace: neither its statements nor its ledger
/// change are recorded, mirroring a rolled-back transaction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a ledger that already holds these versions
    pub fn with_applied<'a>(entries: impl IntoIterator<Item = (Version, &'a str)>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            state.ledger_ready = true;
            for (version, name) in entries {
                state.ledger.insert(version, LedgerEntry::new(version, name));
            }
        }
        store
    }

    /// Any statement containing `pattern` fails
    pub fn fail_on_statement(&self, pattern: impl Into<String>) {
        self.lock().failing_statements.push(pattern.into());
    }

    /// Applying `version` in `direction` fails
    pub fn fail_migration(&self, version: Version, direction: Direction) {
        self.lock().failing_migrations.push((version, direction));
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_statements.clear();
        state.failing_migrations.clear();
    }

    pub fn ledger_versions(&self) -> Vec<Version> {
        self.lock().ledger.keys().copied().collect()
    }

    /// Committed statements, in execution order
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    /// Committed migration steps, in execution order
    pub fn history(&self) -> Vec<(Direction, Version)> {
        self.lock().history.clone()
    }

    pub fn ledger_exists(&self) -> bool {
        self.lock().ledger_ready
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_statements(state: &MemoryState, statements: &[String]) -> StoreResult<()> {
        for statement in statements {
            if let Some(pattern) = state
                .failing_statements
                .iter()
                .find(|pattern| statement.contains(pattern.as_str()))
            {
                return Err(StoreError::statement(
                    statement,
                    format!("injected failure on '{}'", pattern),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn ensure_ledger(&self) -> StoreResult<()> {
        self.lock().ledger_ready = true;
        Ok(())
    }

    async fn ledger(&self) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self.lock().ledger.values().cloned().collect())
    }

    async fn apply(
        &self,
        migration: &Migration,
        direction: Direction,
        mode: ApplyMode,
    ) -> StoreResult<()> {
        let statements = match mode {
            ApplyMode::Execute => self.statements(migration.sql(direction)),
            ApplyMode::Fake => Vec::new(),
        };

        let mut state = self.lock();
        if !state.ledger_ready {
            return Err(StoreError::Ledger("ledger table does not exist".to_string()));
        }
        if state
            .failing_migrations
            .contains(&(migration.version, direction))
        {
            return Err(StoreError::statement(
                migration.sql(direction),
                "injected failure",
            ));
        }
        Self::check_statements(&state, &statements)?;

        match direction {
            Direction::Up => {
                if state.ledger.contains_key(&migration.version) {
                    return Err(StoreError::Ledger(format!(
                        "version {} is already recorded",
                        migration.version
                    )));
                }
                let stamp = ledger_timestamp();
                state.ledger.insert(
                    migration.version,
                    LedgerEntry {
                        version: migration.version,
                        migration_name: migration.name.clone(),
                        start_time: Some(stamp.clone()),
                        end_time: Some(stamp),
                    },
                );
            }
            Direction::Down => {
                if state.ledger.remove(&migration.version).is_none() {
                    return Err(StoreError::Ledger(format!(
                        "version {} is not recorded",
                        migration.version
                    )));
                }
            }
        }

        state.journal.extend(statements);
        state.history.push((direction, migration.version));
        Ok(())
    }

    async fn execute_script(&self, sql: &str) -> StoreResult<usize> {
        let statements = self.statements(sql);
        let mut state = self.lock();
        Self::check_statements(&state, &statements)?;
        let count = statements.len();
        state.journal.extend(statements);
        Ok(count)
    }

    fn statements(&self, sql: &str) -> Vec<String> {
        split_statements(sql, &GenericDialect {})
    }
}
