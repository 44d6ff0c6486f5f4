//! Migration Rollback - Reverts applied migrations
//!
//! Reverts ledger entries newest first, running each DOWN body in its own
//! transaction together with the removal of its ledger row.

use std::time::Instant;

use super::definitions::{
    Direction, Migration, MigrationRef, RollbackOptions, RollbackReport, RollbackTarget, Version,
};
use super::runner::Migrator;
use crate::error::{RunnerError, RunnerResult};
use crate::ledger::LedgerEntry;
use crate::store::DataStore;

impl<S: DataStore> Migrator<S> {
    /// Migrations `rollback` would revert, descending.
    ///
    /// Every entry in the plan must have a migration file; otherwise the
    /// plan fails before anything runs.
    pub fn plan_rollback(
        &self,
        ledger: &[LedgerEntry],
        target: RollbackTarget,
    ) -> RunnerResult<Vec<&Migration>> {
        let mut selected: Vec<&LedgerEntry> = match target {
            RollbackTarget::LastStep => ledger.iter().max_by_key(|e| e.version).into_iter().collect(),
            RollbackTarget::Version(version) => {
                let recorded = ledger.iter().any(|e| e.version == version);
                if !version.is_zero() && !recorded && !self.is_known(version) {
                    return Err(RunnerError::UnknownVersion(version));
                }
                ledger.iter().filter(|e| e.version > version).collect()
            }
            RollbackTarget::Date(boundary) => {
                ledger.iter().filter(|e| e.version >= boundary).collect()
            }
        };

        selected.sort_by(|a, b| b.version.cmp(&a.version));

        selected
            .into_iter()
            .map(|entry| {
                self.find(entry.version)
                    .ok_or(RunnerError::MissingMigration(entry.version))
            })
            .collect()
    }

    /// Revert applied migrations in descending order.
    ///
    /// Each reversion commits on its own; the first failure stops the run
    /// and earlier reversions stay in effect.
    pub async fn rollback(&self, options: RollbackOptions) -> RunnerResult<RollbackReport> {
        let start_time = Instant::now();
        let ledger = self.ledger().await?;
        let plan = self.plan_rollback(&ledger, options.target)?;

        if options.dry_run || plan.is_empty() {
            if plan.is_empty() {
                tracing::info!("Nothing to roll back");
            }
            return Ok(RollbackReport {
                reverted: plan.iter().map(|m| m.reference()).collect(),
                dry_run: options.dry_run,
                execution_time_ms: start_time.elapsed().as_millis(),
            });
        }

        let mut reverted: Vec<MigrationRef> = Vec::with_capacity(plan.len());
        for migration in plan {
            self.check_interrupt(reverted.len())?;

            tracing::info!("== {} {}: reverting", migration.version, migration.name);
            let step_start = Instant::now();

            self.store()
                .apply(migration, Direction::Down, options.mode)
                .await
                .map_err(|cause| RunnerError::Rollback {
                    version: migration.version,
                    name: migration.name.clone(),
                    cause,
                })?;

            tracing::info!(
                "== {} {}: reverted ({} ms)",
                migration.version,
                migration.name,
                step_start.elapsed().as_millis()
            );
            reverted.push(migration.reference());
        }

        Ok(RollbackReport {
            reverted,
            dry_run: false,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Revert everything
    pub async fn rollback_all(&self) -> RunnerResult<RollbackReport> {
        self.rollback(RollbackOptions {
            target: RollbackTarget::Version(Version::ZERO),
            ..RollbackOptions::default()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn migrator() -> Migrator<MemoryStore> {
        let migrations = (1..=3)
            .map(|v| Migration::new(Version(v), format!("Step{}", v), "SELECT 1", "SELECT 2"))
            .collect();
        Migrator::new(MemoryStore::new(), migrations).unwrap()
    }

    fn ledger(versions: &[u64]) -> Vec<LedgerEntry> {
        versions
            .iter()
            .map(|v| LedgerEntry::new(Version(*v), &format!("Step{}", v)))
            .collect()
    }

    fn versions(plan: Vec<&Migration>) -> Vec<u64> {
        plan.iter().map(|m| m.version.0).collect()
    }

    #[test]
    fn last_step_reverts_only_the_newest() {
        let migrator = migrator();
        let plan = migrator
            .plan_rollback(&ledger(&[1, 3]), RollbackTarget::LastStep)
            .unwrap();
        assert_eq!(versions(plan), vec![3]);
    }

    #[test]
    fn version_target_keeps_the_target() {
        let migrator = migrator();
        let plan = migrator
            .plan_rollback(&ledger(&[1, 2, 3]), RollbackTarget::Version(Version(1)))
            .unwrap();
        assert_eq!(versions(plan), vec![3, 2]);

        let plan = migrator
            .plan_rollback(&ledger(&[1, 2, 3]), RollbackTarget::Version(Version::ZERO))
            .unwrap();
        assert_eq!(versions(plan), vec![3, 2, 1]);
    }

    #[test]
    fn date_target_includes_the_boundary() {
        let migrator = migrator();
        let plan = migrator
            .plan_rollback(&ledger(&[1, 2, 3]), RollbackTarget::Date(Version(2)))
            .unwrap();
        assert_eq!(versions(plan), vec![3, 2]);
    }

    #[test]
    fn unknown_target_is_rejected() {
        let migrator = migrator();
        assert!(matches!(
            migrator.plan_rollback(&ledger(&[1]), RollbackTarget::Version(Version(9))),
            Err(RunnerError::UnknownVersion(Version(9)))
        ));
    }

    #[test]
    fn missing_file_fails_the_whole_plan() {
        let migrator = migrator();
        assert!(matches!(
            migrator.plan_rollback(&ledger(&[1, 7]), RollbackTarget::Version(Version::ZERO)),
            Err(RunnerError::MissingMigration(Version(7)))
        ));
    }
}
