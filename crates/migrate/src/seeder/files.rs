//! SQL seeder files: `<Name>.sql` in the seeds directory.

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::Seeder;
use crate::error::{RunnerError, RunnerResult};
use crate::naming::is_camel_case;
use crate::store::{DataStore, StoreResult};

static DEPENDS_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^--\s*depends\s*:(.*)$").expect("valid depends regex"));

/// Seeder that runs a SQL script in one transaction
#[derive(Debug, Clone)]
pub struct SqlSeeder {
    name: String,
    sql: String,
    dependencies: Vec<String>,
    path: Option<PathBuf>,
}

impl SqlSeeder {
    /// Dependencies are read from `-- depends: A, B` lines in `sql`
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            name: name.into(),
            dependencies: parse_dependencies(&sql),
            sql,
            path: None,
        }
    }

    /// The file stem is the seeder name
    pub fn from_file(path: &Path) -> RunnerResult<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                RunnerError::SeederDependency(format!(
                    "{}: unreadable seeder file name",
                    path.display()
                ))
            })?;

        let content = fs::read_to_string(path)?;
        let mut seeder = Self::new(name, content);
        seeder.path = Some(path.to_path_buf());
        Ok(seeder)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl Seeder for SqlSeeder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn run(&self, store: &dyn DataStore) -> StoreResult<()> {
        let count = store.execute_script(&self.sql).await?;
        tracing::debug!("Seeder {} executed {} statement(s)", self.name, count);
        Ok(())
    }
}

fn parse_dependencies(sql: &str) -> Vec<String> {
    sql.lines()
        .filter_map(|line| DEPENDS_HEADER.captures(line.trim()))
        .flat_map(|caps| {
            caps[1]
                .split(',')
                .map(str::trim)
                .filter(|dep| !dep.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Write an empty seeder file `<name>.sql` into `dir` and return its path
pub fn create_seeder(dir: &Path, name: &str) -> RunnerResult<PathBuf> {
    if !is_camel_case(name) {
        return Err(RunnerError::Scaffold(format!(
            "seeder name '{}' must be CamelCase, e.g. UserSeeder",
            name
        )));
    }

    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.sql", name));
    if path.exists() {
        return Err(RunnerError::Scaffold(format!(
            "seeder {} already exists",
            path.display()
        )));
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| RunnerError::Scaffold(format!("cannot create {}: {}", path.display(), e)))?;

    write!(
        file,
        "-- Seeder: {}\n\
         -- Created: {}\n\
         -- List seeders that must run first on a line like: -- depends: OtherSeeder\n\n",
        name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    tracing::info!("Created seeder {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn depends_header_is_parsed() {
        let seeder = SqlSeeder::new(
            "PostSeeder",
            "-- depends: UserSeeder, TagSeeder\n-- Depends: CategorySeeder\nINSERT INTO posts (id) VALUES (1);",
        );
        assert_eq!(
            seeder.dependencies(),
            vec!["UserSeeder", "TagSeeder", "CategorySeeder"]
        );
    }

    #[test]
    fn scaffold_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("seeds");

        let path = create_seeder(&dir, "UserSeeder").unwrap();
        assert_eq!(path.file_name().unwrap(), "UserSeeder.sql");

        let seeder = SqlSeeder::from_file(&path).unwrap();
        assert_eq!(seeder.name(), "UserSeeder");
        assert!(seeder.dependencies().is_empty());

        assert!(matches!(
            create_seeder(&dir, "UserSeeder"),
            Err(RunnerError::Scaffold(_))
        ));
        assert!(matches!(
            create_seeder(&dir, "user_seeder"),
            Err(RunnerError::Scaffold(_))
        ));
    }

    #[tokio::test]
    async fn runs_script_through_store() {
        let store = MemoryStore::new();
        let seeder = SqlSeeder::new(
            "UserSeeder",
            "INSERT INTO users (id, name) VALUES (1, 'ada');\nINSERT INTO users (id, name) VALUES (2, 'grace');",
        );

        seeder.run(&store).await.unwrap();
        assert_eq!(store.journal().len(), 2);
    }
}
