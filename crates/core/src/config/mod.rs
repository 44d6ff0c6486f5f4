//! Project and environment configuration
//!
//! A [`ProjectConfig`] is built once per invocation (from environment
//! variables or a YAML file, see [`sources`]) and handed to the runner.
//! Nothing here is global.

pub mod sources;

pub use sources::*;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Name of the environment used when none is selected.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Environments created when configuration comes from `DB_*` variables.
pub const STANDARD_ENVIRONMENTS: [&str; 3] = ["development", "testing", "production"];

/// Default name of the ledger table.
pub const DEFAULT_MIGRATION_TABLE: &str = "shift_log";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"));

/// Database adapter for an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adapter {
    Mysql,
    #[serde(alias = "postgres", alias = "postgresql")]
    Pgsql,
    Sqlite,
}

impl Adapter {
    /// URL scheme understood by the sqlx drivers
    pub fn scheme(&self) -> &'static str {
        match self {
            Adapter::Mysql => "mysql",
            Adapter::Pgsql => "postgres",
            Adapter::Sqlite => "sqlite",
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Adapter::Mysql => Some(3306),
            Adapter::Pgsql => Some(5432),
            Adapter::Sqlite => None,
        }
    }

    /// Bind placeholder for the `index`-th (1-based) parameter
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Adapter::Pgsql => format!("${}", index),
            Adapter::Mysql | Adapter::Sqlite => "?".to_string(),
        }
    }

    /// Whether the adapter talks to a server and therefore needs credentials
    pub fn is_networked(&self) -> bool {
        !matches!(self, Adapter::Sqlite)
    }
}

impl FromStr for Adapter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Adapter::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Adapter::Pgsql),
            "sqlite" => Ok(Adapter::Sqlite),
            _ => Err(ConfigError::invalid(
                "adapter",
                s,
                "expected one of: mysql, pgsql, sqlite",
            )),
        }
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Adapter::Mysql => "mysql",
            Adapter::Pgsql => "pgsql",
            Adapter::Sqlite => "sqlite",
        };
        write!(f, "{}", name)
    }
}

/// Ports arrive as numbers, or as strings after `${VAR}` expansion
#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(raw)) if raw.trim().is_empty() => Ok(None),
        Some(PortValue::Text(raw)) => raw.trim().parse::<u16>().map(Some).map_err(|_| {
            de::Error::custom(format!("invalid port '{}': must be between 1 and 65535", raw))
        }),
    }
}

/// Connection parameters for one named environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_adapter")]
    pub adapter: Adapter,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
}

fn default_adapter() -> Adapter {
    Adapter::Mysql
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            host: default_host(),
            port: None,
            name: None,
            user: None,
            pass: None,
        }
    }
}

impl EnvironmentConfig {
    /// Configuration for a SQLite database file
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            adapter: Adapter::Sqlite,
            name: Some(path.into()),
            ..Self::default()
        }
    }

    /// Effective port (explicit or adapter default)
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.adapter.default_port())
    }

    /// Check the parameters needed to open a connection
    pub fn validate(&self, environment: &str) -> ConfigResult<()> {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => {}
            _ => return Err(ConfigError::missing(environment, "name")),
        }

        if self.adapter.is_networked() {
            if self.host.trim().is_empty() {
                return Err(ConfigError::missing(environment, "host"));
            }
            match self.user.as_deref() {
                Some(user) if !user.trim().is_empty() => {}
                _ => return Err(ConfigError::missing(environment, "user")),
            }
            if self.port == Some(0) {
                return Err(ConfigError::invalid(
                    "port",
                    "0",
                    "must be between 1 and 65535",
                ));
            }
        }

        Ok(())
    }

    /// Build the connection URL for sqlx
    pub fn database_url(&self, environment: &str) -> ConfigResult<String> {
        self.validate(environment)?;
        let name = self.name.as_deref().unwrap_or_default();

        if self.adapter == Adapter::Sqlite {
            return Ok(format!("sqlite://{}?mode=rwc", name));
        }

        let base = format!("{}://{}", self.adapter.scheme(), self.host);
        let mut url = Url::parse(&base)
            .map_err(|e| ConfigError::invalid("host", &self.host, e.to_string()))?;

        url.set_port(self.effective_port())
            .map_err(|_| ConfigError::invalid("host", &self.host, "cannot carry a port"))?;
        if let Some(user) = &self.user {
            url.set_username(user)
                .map_err(|_| ConfigError::invalid("user", user, "cannot be used in a URL"))?;
        }
        if let Some(pass) = self.pass.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(pass))
                .map_err(|_| ConfigError::invalid("pass", "****", "cannot be used in a URL"))?;
        }
        url.set_path(&format!("/{}", name.trim_start_matches('/')));

        Ok(url.to_string())
    }

    /// Connection URL with the password replaced, for display
    pub fn masked_url(&self, environment: &str) -> String {
        let raw = match self.database_url(environment) {
            Ok(url) => url,
            Err(_) => return format!("{}://<incomplete>", self.adapter.scheme()),
        };

        match Url::parse(&raw) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => raw,
        }
    }
}

/// Directories holding migration and seeder files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_migrations_dir")]
    pub migrations: PathBuf,
    #[serde(default = "default_seeds_dir")]
    pub seeds: PathBuf,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("db/migrations")
}

fn default_seeds_dir() -> PathBuf {
    PathBuf::from("db/seeds")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            migrations: default_migrations_dir(),
            seeds: default_seeds_dir(),
        }
    }
}

/// Complete configuration for one invocation of the tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default = "default_migration_table")]
    pub migration_table: String,
    #[serde(default = "default_environment_name")]
    pub default_environment: String,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

fn default_migration_table() -> String {
    DEFAULT_MIGRATION_TABLE.to_string()
}

fn default_environment_name() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            migration_table: default_migration_table(),
            default_environment: default_environment_name(),
            environments: BTreeMap::new(),
        }
    }
}

impl ProjectConfig {
    /// Resolve the environment name to use, falling back to the default
    pub fn environment_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.default_environment)
    }

    /// Look up and validate a named environment
    pub fn environment(&self, name: &str) -> ConfigResult<&EnvironmentConfig> {
        let env = self
            .environments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))?;

        self.validate_table()?;
        env.validate(name)?;
        Ok(env)
    }

    /// The ledger table name must be a plain identifier
    pub fn validate_table(&self) -> ConfigResult<()> {
        if IDENTIFIER.is_match(&self.migration_table) {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                "migration_table",
                &self.migration_table,
                "must be a plain SQL identifier",
            ))
        }
    }

    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }
}
