//! Migration Manager - File system operations for migrations
//!
//! Creates migration files and loads them back from the migrations
//! directory. Nothing here touches a database.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use shift_core::{PathsConfig, ProjectConfig};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::definitions::{Direction, Migration, Version};
use crate::error::{RunnerError, RunnerResult};
use crate::naming::{camel_to_snake, is_camel_case, snake_to_camel};

static FILE_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,18})_([a-z0-9_]+)$").expect("valid file stem regex"));

static SECTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^--\s*(up|down)(\s+migration)?\s*:?\s*$").expect("valid marker regex")
});

/// Configuration for the migration manager
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("db/migrations"),
        }
    }
}

impl MigrationConfig {
    pub fn from_project(config: &ProjectConfig) -> Self {
        Self::from_paths(&config.paths)
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self {
            migrations_dir: paths.migrations.clone(),
        }
    }
}

/// Migration manager for creating and loading migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Create a new, empty migration file and return its path.
    ///
    /// `name` must be CamelCase and not already used by another migration.
    pub fn create_migration(&self, name: &str) -> RunnerResult<PathBuf> {
        if !is_camel_case(name) {
            return Err(RunnerError::Scaffold(format!(
                "migration name '{}' must be CamelCase, e.g. CreateUsersTable",
                name
            )));
        }

        let existing = self.load_migrations()?;
        if existing.iter().any(|m| m.name == name) {
            return Err(RunnerError::Scaffold(format!(
                "a migration named '{}' already exists",
                name
            )));
        }

        let mut version = Version::now();
        if let Some(latest) = existing.iter().map(|m| m.version).max() {
            if latest >= version {
                version = latest.next();
            }
        }

        fs::create_dir_all(&self.config.migrations_dir)?;
        let filename = format!("{}_{}.sql", version, camel_to_snake(name));
        let path = self.config.migrations_dir.join(filename);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                RunnerError::Scaffold(format!("cannot create {}: {}", path.display(), e))
            })?;
        file.write_all(self.migration_template(name, version).as_bytes())?;

        tracing::info!("Created migration {}", path.display());
        Ok(path)
    }

    /// Load all migration files, sorted by version.
    ///
    /// A missing directory means there are no migrations yet.
    pub fn load_migrations(&self) -> RunnerResult<Vec<Migration>> {
        let dir = &self.config.migrations_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut migrations = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                migrations.push(self.parse_migration_file(&path)?);
            }
        }

        migrations.sort_by_key(|m| m.version);

        let mut seen = HashSet::new();
        for migration in &migrations {
            if migration.version.is_zero() {
                return Err(RunnerError::InvalidMigration(format!(
                    "{}: version 0 is reserved",
                    display_path(migration)
                )));
            }
            if !seen.insert(migration.version) {
                return Err(RunnerError::DuplicateVersion(migration.version));
            }
        }

        Ok(migrations)
    }

    fn parse_migration_file(&self, path: &Path) -> RunnerResult<Migration> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                RunnerError::InvalidMigration(format!("{}: unreadable file name", path.display()))
            })?;

        let caps = FILE_STEM.captures(stem).ok_or_else(|| {
            RunnerError::InvalidMigration(format!(
                "{}: file name must look like <version>_<snake_name>.sql",
                path.display()
            ))
        })?;

        let version: Version = caps[1].parse()?;
        let name = snake_to_camel(&caps[2]);

        let content = fs::read_to_string(path)?;
        let (up_sql, down_sql) = parse_migration_content(&content);

        Ok(Migration {
            version,
            name,
            up_sql,
            down_sql,
            path: Some(path.to_path_buf()),
        })
    }

    fn migration_template(&self, name: &str, version: Version) -> String {
        format!(
            "-- Migration: {}\n\
             -- Version: {}\n\
             -- Created: {}\n\n\
             -- Up migration\n\n\n\
             -- Down migration\n\n",
            name,
            version,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

fn display_path(migration: &Migration) -> String {
    migration
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| migration.name.clone())
}

/// Split file content into its up and down SQL.
///
/// Sections start at `-- Up migration` / `-- Down migration` (also `-- up`,
/// `-- down:`). Comment lines and text before the first marker are dropped.
pub fn parse_migration_content(content: &str) -> (String, String) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current = None;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(caps) = SECTION_MARKER.captures(trimmed) {
            current = if caps[1].eq_ignore_ascii_case("up") {
                Some(Direction::Up)
            } else {
                Some(Direction::Down)
            };
            continue;
        }

        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        match current {
            Some(Direction::Up) => up_sql.push(line),
            Some(Direction::Down) => down_sql.push(line),
            None => {}
        }
    }

    (
        up_sql.join("\n").trim().to_string(),
        down_sql.join("\n").trim().to_string(),
    )
}
