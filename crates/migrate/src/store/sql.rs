//! sqlx-backed `DataStore` for MySQL, PostgreSQL and SQLite.

use async_trait::async_trait;
use shift_core::{Adapter, ProjectConfig};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlx::pool::PoolOptions;
use sqlx::{Any, AnyPool, Executor, Row};
use std::time::Duration;

use super::{split_statements, DataStore, StoreError, StoreResult};
use crate::error::RunnerResult;
use crate::ledger::{ledger_timestamp, LedgerEntry, LedgerSql};
use crate::migrations::{ApplyMode, Direction, Migration, Version};

/// A single-connection pool against one environment's database
pub struct SqlStore {
    pool: AnyPool,
    adapter: Adapter,
    ledger: LedgerSql,
}

impl SqlStore {
    /// Resolve `environment` from the project configuration and connect
    pub async fn from_config(config: &ProjectConfig, environment: &str) -> RunnerResult<Self> {
        let env = config.environment(environment)?;
        let url = env.database_url(environment)?;

        tracing::debug!(
            "Connecting to {} for environment '{}'",
            env.masked_url(environment),
            environment
        );

        Ok(Self::connect(&url, env.adapter, &config.migration_table).await?)
    }

    /// Connect to `url`; `table` must already be validated
    pub async fn connect(url: &str, adapter: Adapter, table: &str) -> StoreResult<Self> {
        sqlx::any::install_default_drivers();

        // one connection: migrations never run in parallel
        let pool = PoolOptions::<Any>::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            adapter,
            ledger: LedgerSql::new(table, adapter),
        })
    }

    pub fn adapter(&self) -> Adapter {
        self.adapter
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> StoreResult<()> {
        self.pool
            .execute("SELECT 1")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn ledger_table_exists(&self) -> StoreResult<bool> {
        let row = sqlx::query(&self.ledger.table_exists_sql())
            .bind(self.ledger.table().to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Ledger(format!("Failed to inspect catalog: {}", e)))?;

        let count: i64 = row
            .try_get(0)
            .map_err(|e| StoreError::Ledger(format!("Failed to read catalog count: {}", e)))?;
        Ok(count > 0)
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.adapter {
            Adapter::Mysql => Box::new(MySqlDialect {}),
            Adapter::Pgsql => Box::new(PostgreSqlDialect {}),
            Adapter::Sqlite => Box::new(SQLiteDialect {}),
        }
    }
}

#[async_trait]
impl DataStore for SqlStore {
    async fn ensure_ledger(&self) -> StoreResult<()> {
        self.pool
            .execute(self.ledger.create_table_sql().as_str())
            .await
            .map_err(|e| StoreError::Ledger(format!("Failed to create ledger table: {}", e)))?;
        Ok(())
    }

    async fn ledger(&self) -> StoreResult<Vec<LedgerEntry>> {
        if !self.ledger_table_exists().await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&self.ledger.select_sql())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Ledger(format!("Failed to query ledger: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let version: String = row
                .try_get("version_text")
                .map_err(|e| StoreError::Ledger(format!("Failed to get version: {}", e)))?;
            let version = version.trim().parse::<u64>().map_err(|e| {
                StoreError::Ledger(format!("Invalid version '{}' in ledger: {}", version, e))
            })?;
            let migration_name: Option<String> = row
                .try_get("migration_name")
                .map_err(|e| StoreError::Ledger(format!("Failed to get migration_name: {}", e)))?;
            let start_time: Option<String> = row
                .try_get("start_time")
                .map_err(|e| StoreError::Ledger(format!("Failed to get start_time: {}", e)))?;
            let end_time: Option<String> = row
                .try_get("end_time")
                .map_err(|e| StoreError::Ledger(format!("Failed to get end_time: {}", e)))?;

            entries.push(LedgerEntry {
                version: Version(version),
                migration_name: migration_name.unwrap_or_default(),
                start_time,
                end_time,
            });
        }

        Ok(entries)
    }

    async fn apply(
        &self,
        migration: &Migration,
        direction: Direction,
        mode: ApplyMode,
    ) -> StoreResult<()> {
        // dropping the transaction on any early return rolls it back
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to start transaction: {}", e)))?;

        let start_time = ledger_timestamp();

        if mode == ApplyMode::Execute {
            for statement in self.statements(migration.sql(direction)) {
                tracing::debug!(version = %migration.version, "{}", statement);
                (&mut *transaction)
                    .execute(statement.as_str())
                    .await
                    .map_err(|e| StoreError::statement(&statement, e))?;
            }
        }

        match direction {
            Direction::Up => {
                sqlx::query(&self.ledger.insert_sql())
                    .bind(migration.version.as_i64())
                    .bind(migration.name.clone())
                    .bind(start_time)
                    .bind(ledger_timestamp())
                    .execute(&mut *transaction)
                    .await
                    .map_err(|e| StoreError::Ledger(format!("Failed to record migration: {}", e)))?;
            }
            Direction::Down => {
                sqlx::query(&self.ledger.delete_sql())
                    .bind(migration.version.as_i64())
                    .execute(&mut *transaction)
                    .await
                    .map_err(|e| {
                        StoreError::Ledger(format!("Failed to remove migration record: {}", e))
                    })?;
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to commit: {}", e)))?;

        Ok(())
    }

    async fn execute_script(&self, sql: &str) -> StoreResult<usize> {
        let statements = self.statements(sql);
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to start transaction: {}", e)))?;

        for statement in &statements {
            tracing::debug!("{}", statement);
            (&mut *transaction)
                .execute(statement.as_str())
                .await
                .map_err(|e| StoreError::statement(statement, e))?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| StoreError::Transaction(format!("Failed to commit: {}", e)))?;

        Ok(statements.len())
    }

    fn statements(&self, sql: &str) -> Vec<String> {
        split_statements(sql, self.dialect().as_ref())
    }
}
