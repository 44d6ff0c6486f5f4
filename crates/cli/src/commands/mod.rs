pub mod create;
pub mod init;
pub mod migrate;
pub mod rollback;
pub mod seed;
pub mod status;

use shift_core::{ConfigLoader, LoadedConfig, PathsConfig};
use shift_migrate::{
    DataStore, Migration, MigrationConfig, MigrationManager, Migrator, RunnerResult, SqlStore,
    Version,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global options shared by every command
pub struct Context {
    config_path: Option<PathBuf>,
}

impl Context {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    /// Load the configuration for this invocation
    pub fn load(&self) -> RunnerResult<LoadedConfig> {
        let cwd = std::env::current_dir()?;
        let loaded = ConfigLoader::from_process_env().load(self.config_path.as_deref(), &cwd)?;
        tracing::debug!("Using {}", loaded.source);
        Ok(loaded)
    }

    /// Only the file locations; connection settings are not checked
    pub fn paths(&self) -> RunnerResult<PathsConfig> {
        let cwd = std::env::current_dir()?;
        Ok(ConfigLoader::from_process_env().load_paths(self.config_path.as_deref(), &cwd)?)
    }
}

/// Everything a migration command needs for one environment
pub struct Session {
    pub loaded: LoadedConfig,
    pub environment: String,
    pub migrator: Migrator<SqlStore>,
}

impl Session {
    /// Load configuration and migration files, then connect
    pub async fn open(ctx: &Context, environment: Option<&str>) -> RunnerResult<Self> {
        let loaded = ctx.load()?;
        let environment = loaded
            .config
            .environment_name(environment)
            .to_string();
        // fail on configuration problems before reading files or connecting
        loaded.config.environment(&environment)?;

        let manager = MigrationManager::new(MigrationConfig::from_project(&loaded.config));
        let migrations = manager.load_migrations()?;

        let store = SqlStore::from_config(&loaded.config, &environment).await?;
        let migrator = Migrator::new(store, migrations)?;

        Ok(Self {
            loaded,
            environment,
            migrator,
        })
    }

    pub fn header(&self) -> String {
        format!(
            "environment '{}' ({}), ledger table '{}'",
            self.environment, self.loaded.source, self.loaded.config.migration_table
        )
    }

    pub async fn close(self) {
        self.migrator.into_store().close().await;
    }
}

/// Parse a `-t` value
pub fn parse_version(raw: &str) -> RunnerResult<Version> {
    raw.parse()
}

/// Exit status used when a second Ctrl-C aborts the run
pub const ABORT_EXIT_CODE: i32 = 130;

/// Flag set on the first Ctrl-C; the runner stops before its next unit.
/// A second Ctrl-C exits at once, leaving the open transaction to the
/// database to roll back.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&flag);

    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, handle).await {
            eprintln!("aborted");
            std::process::exit(ABORT_EXIT_CODE);
        }
    });

    flag
}

/// Returns `true` when a second signal arrives after `flag` was set
async fn watch_interrupts<F, Fut>(mut next_signal: F, flag: Arc<AtomicBool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received; finishing the current step");
    eprintln!("interrupt received, stopping after the current step (Ctrl-C again to abort)...");
    flag.store(true, Ordering::SeqCst);

    if next_signal().await.is_err() {
        return false;
    }
    tracing::error!("Second interrupt received; aborting");
    true
}

/// Print a planned step with the statements it would run
pub fn print_planned(store: &dyn DataStore, migration: &Migration, sql: &str) {
    println!("  {} {}", migration.version, migration.name);
    let statements = store.statements(sql);
    if statements.is_empty() {
        println!("      (no statements)");
    }
    for statement in statements {
        println!("      {};", statement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn signals(results: Vec<io::Result<()>>) -> impl FnMut() -> std::future::Ready<io::Result<()>> {
        let mut results = results.into_iter();
        move || {
            std::future::ready(
                results
                    .next()
                    .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "no more signals"))),
            )
        }
    }

    #[tokio::test]
    async fn first_interrupt_sets_the_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let aborted = watch_interrupts(signals(vec![Ok(())]), Arc::clone(&flag)).await;

        assert!(flag.load(Ordering::SeqCst));
        assert!(!aborted);
    }

    #[tokio::test]
    async fn second_interrupt_aborts() {
        let flag = Arc::new(AtomicBool::new(false));
        let aborted = watch_interrupts(signals(vec![Ok(()), Ok(())]), Arc::clone(&flag)).await;

        assert!(flag.load(Ordering::SeqCst));
        assert!(aborted);
    }

    #[tokio::test]
    async fn listener_failure_leaves_the_flag_clear() {
        let flag = Arc::new(AtomicBool::new(false));
        let failed = Err(io::Error::new(io::ErrorKind::Other, "no handler"));
        let aborted = watch_interrupts(signals(vec![failed]), Arc::clone(&flag)).await;

        assert!(!flag.load(Ordering::SeqCst));
        assert!(!aborted);
    }

    #[test]
    fn versions_parse_from_arguments() {
        assert_eq!(parse_version("20230101000000").unwrap(), Version(20230101000000));
        assert!(parse_version("latest").is_err());
    }
}
