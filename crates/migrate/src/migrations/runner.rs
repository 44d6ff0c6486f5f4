//! Migration Runner - Executes migrations against a `DataStore`
//!
//! Computes which migrations are pending, applies them one at a time in
//! ascending version order and reports status. Rollback lives in
//! `rollback.rs`.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::definitions::{
    Direction, MigrateOptions, MigrateReport, Migration, MigrationRef, MigrationState,
    MigrationStatus, Version,
};
use crate::error::{RunnerError, RunnerResult};
use crate::ledger::LedgerEntry;
use crate::store::DataStore;

/// Applies and reverts migrations for one environment.
///
/// Built per invocation from the known migrations and a store; holds no
/// other state.
pub struct Migrator<S: DataStore> {
    store: S,
    migrations: Vec<Migration>,
    interrupt: Arc<AtomicBool>,
}

impl<S: DataStore> Migrator<S> {
    /// Create a runner; versions must be unique and non-zero
    pub fn new(store: S, mut migrations: Vec<Migration>) -> RunnerResult<Self> {
        migrations.sort_by_key(|m| m.version);

        let mut seen = HashSet::new();
        for migration in &migrations {
            if migration.version.is_zero() {
                return Err(RunnerError::InvalidMigration(format!(
                    "{} uses the reserved version 0",
                    migration.name
                )));
            }
            if !seen.insert(migration.version) {
                return Err(RunnerError::DuplicateVersion(migration.version));
            }
        }

        Ok(Self {
            store,
            migrations,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an interrupt flag; once set, the run stops before the next unit
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Known migrations, ascending
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub(crate) fn find(&self, version: Version) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    pub(crate) fn is_known(&self, version: Version) -> bool {
        self.find(version).is_some()
    }

    /// Applied versions, ascending
    pub async fn ledger(&self) -> RunnerResult<Vec<LedgerEntry>> {
        let mut entries = self.store.ledger().await?;
        entries.sort_by_key(|e| e.version);
        Ok(entries)
    }

    /// Every known migration plus ledger entries without a file, by version
    pub async fn status(&self) -> RunnerResult<Vec<MigrationStatus>> {
        let ledger = self.ledger().await?;
        Ok(self.status_from(&ledger))
    }

    pub fn status_from(&self, ledger: &[LedgerEntry]) -> Vec<MigrationStatus> {
        let applied: BTreeMap<Version, &LedgerEntry> =
            ledger.iter().map(|e| (e.version, e)).collect();

        let mut rows: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name.clone(),
                state: match applied.get(&m.version) {
                    Some(entry) => MigrationState::Applied {
                        start_time: entry.start_time.clone(),
                        end_time: entry.end_time.clone(),
                    },
                    None => MigrationState::Pending,
                },
            })
            .collect();

        rows.extend(
            ledger
                .iter()
                .filter(|e| !self.is_known(e.version))
                .map(|e| MigrationStatus {
                    version: e.version,
                    name: e.migration_name.clone(),
                    state: MigrationState::Missing,
                }),
        );

        rows.sort_by_key(|r| r.version);
        rows
    }

    /// Migrations `migrate` would apply, ascending.
    ///
    /// Pending means not in the ledger and not newer than `target`.
    pub fn plan_migrate(
        &self,
        ledger: &[LedgerEntry],
        target: Option<Version>,
    ) -> RunnerResult<Vec<&Migration>> {
        if let Some(target) = target {
            if !self.is_known(target) {
                return Err(RunnerError::UnknownVersion(target));
            }
        }

        let applied: HashSet<Version> = ledger.iter().map(|e| e.version).collect();
        for entry in ledger.iter().filter(|e| !self.is_known(e.version)) {
            tracing::warn!(
                "Ledger has version {} ({}) with no migration file",
                entry.version,
                entry.migration_name
            );
        }

        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .filter(|m| target.map_or(true, |t| m.version <= t))
            .collect())
    }

    /// Apply pending migrations in ascending order.
    ///
    /// Each migration commits on its own; the first failure stops the run
    /// and earlier migrations stay applied.
    pub async fn migrate(&self, options: MigrateOptions) -> RunnerResult<MigrateReport> {
        let start_time = Instant::now();
        let ledger = self.ledger().await?;
        let plan = self.plan_migrate(&ledger, options.target)?;
        let skipped_count = self
            .migrations
            .iter()
            .filter(|m| ledger.iter().any(|e| e.version == m.version))
            .count();

        if options.dry_run || plan.is_empty() {
            if plan.is_empty() {
                tracing::info!("Nothing to migrate");
            }
            return Ok(MigrateReport {
                applied: plan.iter().map(|m| m.reference()).collect(),
                skipped_count,
                dry_run: options.dry_run,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        self.store.ensure_ledger().await?;

        let mut applied: Vec<MigrationRef> = Vec::with_capacity(plan.len());
        for migration in plan {
            self.check_interrupt(applied.len())?;

            tracing::info!("== {} {}: migrating", migration.version, migration.name);
            let step_start = Instant::now();

            self.store
                .apply(migration, Direction::Up, options.mode)
                .await
                .map_err(|cause| RunnerError::Migration {
                    version: migration.version,
                    name: migration.name.clone(),
                    cause,
                })?;

            tracing::info!(
                "== {} {}: migrated ({} ms)",
                migration.version,
                migration.name,
                step_start.elapsed().as_millis()
            );
            applied.push(migration.reference());
        }

        Ok(MigrateReport {
            applied,
            skipped_count,
            dry_run: false,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    pub(crate) fn check_interrupt(&self, completed: usize) -> RunnerResult<()> {
        if self.interrupt.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted; stopping after {} completed step(s)", completed);
            return Err(RunnerError::Interrupted { completed });
        }
        Ok(())
    }
}
