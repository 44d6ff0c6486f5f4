//! Database seeding
//!
//! Seeders insert fixture data. They are not version-tracked: running one
//! again re-executes all of its inserts, and nothing here touches the
//! ledger.

pub mod files;

pub use files::{create_seeder, SqlSeeder};

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{RunnerError, RunnerResult};
use crate::store::{DataStore, StoreResult};

/// Future returned by `FnSeeder` closures
pub type SeedFuture<'a> = Pin<Box<dyn Future<Output = StoreResult<()>> + Send + 'a>>;

/// Seeder trait for implementing database seeders
#[async_trait]
pub trait Seeder: Send + Sync {
    /// Name used by `seed:run -s` and in dependency lists
    fn name(&self) -> &str;

    /// Seeders that must run first when running all seeders
    fn dependencies(&self) -> Vec<String> {
        vec![]
    }

    /// Insert the seed data
    async fn run(&self, store: &dyn DataStore) -> StoreResult<()>;
}

type SeedFn = Box<dyn for<'a> Fn(&'a dyn DataStore) -> SeedFuture<'a> + Send + Sync>;

/// Seeder backed by a closure
pub struct FnSeeder {
    name: String,
    dependencies: Vec<String>,
    run_fn: SeedFn,
}

impl FnSeeder {
    pub fn new<F>(name: impl Into<String>, run_fn: F) -> Self
    where
        F: for<'a> Fn(&'a dyn DataStore) -> SeedFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: vec![],
            run_fn: Box::new(run_fn),
        }
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Seeder for FnSeeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn run(&self, store: &dyn DataStore) -> StoreResult<()> {
        (self.run_fn)(store).await
    }
}

/// Result of a seeding run
#[derive(Debug, Default)]
pub struct SeedReport {
    /// Seeders that ran, in execution order
    pub executed: Vec<String>,
    pub execution_time_ms: u128,
}

/// Named seeders in declaration order
#[derive(Default, Clone)]
pub struct SeederRegistry {
    seeders: Vec<Arc<dyn Seeder>>,
}

impl SeederRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every `*.sql` file in `dir`, ordered by file name.
    ///
    /// A missing directory yields an empty registry.
    pub fn load_dir(dir: &std::path::Path) -> RunnerResult<Self> {
        let mut registry = Self::new();
        if !dir.exists() {
            return Ok(registry);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            registry.register(SqlSeeder::from_file(&path)?)?;
        }
        Ok(registry)
    }

    /// Add a seeder; names must be unique
    pub fn register<S: Seeder + 'static>(&mut self, seeder: S) -> RunnerResult<()> {
        if self.get(seeder.name()).is_some() {
            return Err(RunnerError::SeederDependency(format!(
                "seeder '{}' is registered twice",
                seeder.name()
            )));
        }
        self.seeders.push(Arc::new(seeder));
        Ok(())
    }

    pub fn with<S: Seeder + 'static>(mut self, seeder: S) -> RunnerResult<Self> {
        self.register(seeder)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Seeder>> {
        self.seeders.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.seeders.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.seeders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeders.is_empty()
    }

    /// Order all seeders so dependencies run first.
    ///
    /// Kahn's algorithm; among seeders that are ready, the one declared
    /// first runs first.
    pub fn resolve_order(&self) -> RunnerResult<Vec<Arc<dyn Seeder>>> {
        let index: HashMap<&str, usize> = self
            .seeders
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name(), i))
            .collect();

        let mut in_degree = vec![0usize; self.seeders.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.seeders.len()];

        for (i, seeder) in self.seeders.iter().enumerate() {
            for dep in seeder.dependencies() {
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(RunnerError::SeederDependency(format!(
                        "seeder '{}' depends on '{}', but '{}' was not found",
                        seeder.name(),
                        dep,
                        dep
                    )));
                };
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.seeders.len());

        while let Some(current) = ready.pop_first() {
            order.push(Arc::clone(&self.seeders[current]));
            for &dependent in &dependents[current] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.seeders.len() {
            let stuck: Vec<&str> = self
                .seeders
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, s)| s.name())
                .collect();
            return Err(RunnerError::SeederDependency(format!(
                "circular dependency between seeders: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }

    /// Run the named seeders in the given order, or all of them when
    /// `names` is empty.
    ///
    /// Every name is checked before anything runs; the first failing
    /// seeder stops the run.
    pub async fn run(&self, store: &dyn DataStore, names: &[String]) -> RunnerResult<SeedReport> {
        let start_time = Instant::now();

        let seeders = if names.is_empty() {
            self.resolve_order()?
        } else {
            names
                .iter()
                .map(|name| {
                    self.get(name)
                        .ok_or_else(|| RunnerError::UnknownSeeder(name.clone()))
                })
                .collect::<RunnerResult<Vec<_>>>()?
        };

        if seeders.is_empty() {
            tracing::info!("No seeders to run");
        }

        let mut executed = Vec::with_capacity(seeders.len());
        for seeder in seeders {
            tracing::info!("== {}: seeding", seeder.name());
            let step_start = Instant::now();

            seeder.run(store).await.map_err(|cause| RunnerError::Seed {
                seeder: seeder.name().to_string(),
                cause,
            })?;

            tracing::info!(
                "== {}: seeded ({} ms)",
                seeder.name(),
                step_start.elapsed().as_millis()
            );
            executed.push(seeder.name().to_string());
        }

        Ok(SeedReport {
            executed,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn noop(name: &str) -> FnSeeder {
        FnSeeder::new(name, |_store| Box::pin(async { Ok(()) }))
    }

    fn order(registry: &SeederRegistry) -> Vec<String> {
        registry
            .resolve_order()
            .unwrap()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    #[test]
    fn declaration_order_without_dependencies() {
        let registry = SeederRegistry::new()
            .with(noop("UserSeeder"))
            .unwrap()
            .with(noop("PostSeeder"))
            .unwrap();
        assert_eq!(order(&registry), vec!["UserSeeder", "PostSeeder"]);
    }

    #[test]
    fn dependencies_run_first() {
        let registry = SeederRegistry::new()
            .with(noop("CommentSeeder").depends_on(["PostSeeder"]))
            .unwrap()
            .with(noop("PostSeeder").depends_on(["UserSeeder"]))
            .unwrap()
            .with(noop("UserSeeder"))
            .unwrap()
            .with(noop("TagSeeder"))
            .unwrap();
        assert_eq!(
            order(&registry),
            vec!["UserSeeder", "PostSeeder", "CommentSeeder", "TagSeeder"]
        );
    }

    #[test]
    fn unknown_dependency_and_cycles_are_errors() {
        let registry = SeederRegistry::new()
            .with(noop("PostSeeder").depends_on(["UserSeeder"]))
            .unwrap();
        assert!(matches!(
            registry.resolve_order(),
            Err(RunnerError::SeederDependency(_))
        ));

        let registry = SeederRegistry::new()
            .with(noop("A").depends_on(["B"]))
            .unwrap()
            .with(noop("B").depends_on(["A"]))
            .unwrap();
        match registry.resolve_order() {
            Err(RunnerError::SeederDependency(msg)) => assert!(msg.contains("A, B")),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("cycle accepted"),
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = SeederRegistry::new()
            .with(noop("UserSeeder"))
            .unwrap()
            .with(noop("UserSeeder"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_seeder_runs_nothing() {
        let store = MemoryStore::new();
        let registry = SeederRegistry::new()
            .with(FnSeeder::new("UserSeeder", |store| {
                Box::pin(async move {
                    store
                        .execute_script("INSERT INTO users (id) VALUES (1)")
                        .await
                        .map(|_| ())
                })
            }))
            .unwrap();

        let err = registry
            .run(&store, &["UserSeeder".to_string(), "Nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::UnknownSeeder(name) if name == "Nope"));
        assert!(store.journal().is_empty());
    }
}
