//! Configuration sources: `DB_*` environment variables or a YAML file.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::{Adapter, EnvironmentConfig, PathsConfig, ProjectConfig, STANDARD_ENVIRONMENTS};
use crate::error::{ConfigError, ConfigResult};

/// File picked up from the working directory when `-c` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "shift.yml";

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env reference regex")
});

/// Contents written by `shift init`.
pub const INIT_TEMPLATE: &str = r#"paths:
  migrations: db/migrations
  seeds: db/seeds

migration_table: shift_log
default_environment: development

environments:
  development:
    adapter: ${DB_ADAPTER:-mysql}
    host: ${DB_HOST:-localhost}
    port: ${DB_PORT:-3306}
    name: ${DB_NAME:-app_development}
    user: ${DB_USER:-root}
    pass: ${DB_PASS:-}
  testing:
    adapter: ${DB_ADAPTER:-mysql}
    host: ${DB_HOST:-localhost}
    port: ${DB_PORT:-3306}
    name: ${TESTING_DB_NAME:-app_testing}
    user: ${DB_USER:-root}
    pass: ${DB_PASS:-}
  production:
    adapter: ${DB_ADAPTER:-mysql}
    host: ${DB_HOST:-localhost}
    port: ${DB_PORT:-3306}
    name: ${DB_NAME}
    user: ${DB_USER}
    pass: ${DB_PASS}
"#;

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Built from `DB_*` environment variables
    EnvVars,
    /// Loaded from a YAML file
    File(PathBuf),
}

impl ConfigSource {
    pub fn is_file(&self) -> bool {
        matches!(self, ConfigSource::File(_))
    }

    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVars => "environment variables (DB_*)".to_string(),
            ConfigSource::File(path) => format!("configuration file: {}", path.display()),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A configuration together with its origin
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ProjectConfig,
    pub source: ConfigSource,
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn config_file(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let candidate = cwd.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

/// Relative directories are resolved against the config file
fn resolve_paths(paths: &mut PathsConfig, file: &Path) {
    if let Some(base) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        if paths.migrations.is_relative() {
            paths.migrations = base.join(&paths.migrations);
        }
        if paths.seeds.is_relative() {
            paths.seeds = base.join(&paths.seeds);
        }
    }
}

/// Loads [`ProjectConfig`] values.
///
/// Variable lookups go through an injected function so that tests never
/// need to mutate the process environment.
pub struct ConfigLoader<F = fn(&str) -> Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup: F,
}

impl ConfigLoader {
    /// Loader reading the real process environment
    pub fn from_process_env() -> Self {
        Self {
            lookup: process_env,
        }
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn with_lookup(lookup: F) -> Self {
        Self { lookup }
    }

    /// Pick the configuration: explicit file, then `shift.yml` in `cwd`,
    /// then environment variables.
    pub fn load(&self, explicit: Option<&Path>, cwd: &Path) -> ConfigResult<LoadedConfig> {
        match config_file(explicit, cwd) {
            Some(path) => {
                tracing::debug!("Using configuration file {}", path.display());
                Ok(LoadedConfig {
                    config: self.from_file(&path)?,
                    source: ConfigSource::File(path),
                })
            }
            None => Ok(LoadedConfig {
                config: self.from_env_vars()?,
                source: ConfigSource::EnvVars,
            }),
        }
    }

    /// Only the `paths` section, for commands that never connect.
    /// Connection parameters are not read or validated.
    pub fn load_paths(&self, explicit: Option<&Path>, cwd: &Path) -> ConfigResult<PathsConfig> {
        let Some(path) = config_file(explicit, cwd) else {
            return Ok(PathsConfig::default());
        };

        let mut document: Value = serde_yaml::from_str(&fs::read_to_string(&path)?)?;
        self.interpolate_value(&mut document);
        let mut paths = match document.get("paths") {
            Some(section) => serde_yaml::from_value(section.clone())?,
            None => PathsConfig::default(),
        };
        resolve_paths(&mut paths, &path);
        Ok(paths)
    }

    pub fn from_file(&self, path: &Path) -> ConfigResult<ProjectConfig> {
        let raw = fs::read_to_string(path)?;
        let mut config = self.from_yaml_str(&raw)?;
        resolve_paths(&mut config.paths, path);
        Ok(config)
    }

    /// Parse YAML, then expand references inside string values, so a
    /// substituted value is never read as YAML syntax.
    pub fn from_yaml_str(&self, yaml: &str) -> ConfigResult<ProjectConfig> {
        let mut document: Value = serde_yaml::from_str(yaml)?;
        self.interpolate_value(&mut document);
        let config: ProjectConfig = serde_yaml::from_value(document)?;
        config.validate_table()?;
        Ok(config)
    }

    /// Build the standard environments from `DB_*` variables.
    ///
    /// `<ENV>_DB_NAME` (e.g. `TESTING_DB_NAME`) overrides `DB_NAME` for
    /// that environment; the same holds for every other key.
    pub fn from_env_vars(&self) -> ConfigResult<ProjectConfig> {
        let mut config = ProjectConfig::default();

        for env_name in STANDARD_ENVIRONMENTS {
            let prefix = format!("{}_", env_name.to_uppercase());
            let get = |key: &str| {
                (self.lookup)(&format!("{}{}", prefix, key)).or_else(|| (self.lookup)(key))
            };

            let adapter = match get("DB_ADAPTER") {
                Some(raw) => raw.parse::<Adapter>()?,
                None => Adapter::Mysql,
            };

            let port = match get("DB_PORT") {
                Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| {
                    ConfigError::invalid("DB_PORT", &raw, "must be between 1 and 65535")
                })?),
                None => None,
            };

            let env = EnvironmentConfig {
                adapter,
                host: get("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
                port,
                name: get("DB_NAME"),
                user: get("DB_USER"),
                pass: get("DB_PASS"),
            };

            config.environments.insert(env_name.to_string(), env);
        }

        Ok(config)
    }

    /// Mapping entries that expand to an empty string are dropped, so the
    /// field falls back to its default.
    fn interpolate_value(&self, value: &mut Value) {
        match value {
            Value::Mapping(map) => {
                let mut emptied = Vec::new();
                for (key, item) in map.iter_mut() {
                    if let Value::String(text) = &*item {
                        if ENV_REFERENCE.is_match(text) && self.interpolate(text).is_empty() {
                            emptied.push(key.clone());
                            continue;
                        }
                    }
                    self.interpolate_value(item);
                }
                for key in emptied {
                    map.remove(&key);
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.interpolate_value(item);
                }
            }
            Value::Tagged(tagged) => self.interpolate_value(&mut tagged.value),
            Value::String(text) if ENV_REFERENCE.is_match(text) => {
                *text = self.interpolate(text);
            }
            _ => {}
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` references
    pub fn interpolate(&self, text: &str) -> String {
        ENV_REFERENCE
            .replace_all(text, |caps: &Captures| {
                let key = &caps[1];
                match (self.lookup)(key) {
                    Some(value) => value,
                    None => match caps.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => {
                            tracing::warn!("Configuration references unset variable {}", key);
                            String::new()
                        }
                    },
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_vars_apply_defaults() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[("DB_NAME", "app"), ("DB_USER", "root")]));
        let config = loader.from_env_vars().unwrap();

        assert_eq!(config.environment_names(), vec!["development", "production", "testing"]);
        let dev = config.environment("development").unwrap();
        assert_eq!(dev.adapter, Adapter::Mysql);
        assert_eq!(dev.host, "localhost");
        assert_eq!(dev.effective_port(), Some(3306));
        assert_eq!(dev.pass, None);
    }

    #[test]
    fn prefixed_variables_override_per_environment() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[
            ("DB_NAME", "app"),
            ("DB_USER", "root"),
            ("TESTING_DB_NAME", "app_test"),
            ("PRODUCTION_DB_HOST", "db.prod"),
        ]));
        let config = loader.from_env_vars().unwrap();

        assert_eq!(config.environments["testing"].name.as_deref(), Some("app_test"));
        assert_eq!(config.environments["development"].name.as_deref(), Some("app"));
        assert_eq!(config.environments["production"].host, "db.prod");
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[("DB_PORT", "70000")]));
        assert!(matches!(
            loader.from_env_vars(),
            Err(ConfigError::InvalidParameter { key, .. }) if key == "DB_PORT"
        ));
    }

    #[test]
    fn missing_name_only_fails_on_selection() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[]));
        let config = loader.from_env_vars().unwrap();
        assert!(matches!(
            config.environment("development"),
            Err(ConfigError::MissingParameter { .. })
        ));
    }

    #[test]
    fn interpolation_uses_defaults() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[("DB_HOST", "10.0.0.5")]));
        assert_eq!(
            loader.interpolate("host: ${DB_HOST:-localhost}, port: ${DB_PORT:-3306}, x: ${NOPE}"),
            "host: 10.0.0.5, port: 3306, x: "
        );
    }

    #[test]
    fn yaml_file_is_parsed_and_paths_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shift.yml");
        fs::write(
            &path,
            "paths:\n  migrations: migrations\n\
             migration_table: schema_log\n\
             default_environment: testing\n\
             environments:\n  testing:\n    adapter: sqlite\n    name: ${SQLITE_PATH:-test.db}\n",
        )
        .unwrap();

        let loader = ConfigLoader::with_lookup(lookup_from(&[]));
        let loaded = loader.load(None, dir.path()).unwrap();

        assert!(loaded.source.is_file());
        let config = loaded.config;
        assert_eq!(config.migration_table, "schema_log");
        assert_eq!(config.default_environment, "testing");
        assert_eq!(config.paths.migrations, dir.path().join("migrations"));
        assert_eq!(config.paths.seeds, dir.path().join("db/seeds"));
        let testing = config.environment("testing").unwrap();
        assert_eq!(testing.adapter, Adapter::Sqlite);
        assert_eq!(testing.name.as_deref(), Some("test.db"));
    }

    #[test]
    fn init_template_parses() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[]));
        let config = loader.from_yaml_str(INIT_TEMPLATE).unwrap();
        assert_eq!(config.environments.len(), 3);
        assert!(config.environment("development").is_ok());
        // production refuses to run without explicit credentials
        assert!(config.environment("production").is_err());
    }

    #[test]
    fn substituted_values_are_not_read_as_yaml() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[
            ("DB_PASS", "pa ss #x: {y} *z"),
            ("DB_PORT", "5433"),
        ]));
        let config = loader
            .from_yaml_str(
                "environments:\n  development:\n    adapter: pgsql\n    name: app\n    \
                 port: ${DB_PORT}\n    pass: ${DB_PASS}\n",
            )
            .unwrap();

        let dev = &config.environments["development"];
        assert_eq!(dev.pass.as_deref(), Some("pa ss #x: {y} *z"));
        assert_eq!(dev.port, Some(5433));
    }

    #[test]
    fn empty_substitutions_fall_back_to_defaults() {
        let loader = ConfigLoader::with_lookup(lookup_from(&[]));
        let config = loader
            .from_yaml_str(
                "environments:\n  development:\n    name: app\n    \
                 host: ${DB_HOST}\n    pass: ${DB_PASS:-}\n",
            )
            .unwrap();

        let dev = &config.environments["development"];
        assert_eq!(dev.host, "localhost");
        assert_eq!(dev.pass, None);
    }

    #[test]
    fn paths_load_without_reading_connections() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("shift.yml"),
            "paths:\n  seeds: ${SEEDS_DIR:-data/seeds}\n\
             environments:\n  development:\n    port: ${DB_PORT}\n",
        )
        .unwrap();

        let loader = ConfigLoader::with_lookup(lookup_from(&[("DB_PORT", "not-a-port")]));
        assert!(loader.load(None, dir.path()).is_err());

        let paths = loader.load_paths(None, dir.path()).unwrap();
        assert_eq!(paths.migrations, dir.path().join("db/migrations"));
        assert_eq!(paths.seeds, dir.path().join("data/seeds"));

        let bare = tempfile::tempdir().unwrap();
        assert_eq!(loader.load_paths(None, bare.path()).unwrap(), PathsConfig::default());
    }

    #[test]
    fn without_file_falls_back_to_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_lookup(lookup_from(&[]));
        let loaded = loader.load(None, dir.path()).unwrap();
        assert_eq!(loaded.source, ConfigSource::EnvVars);
    }

    #[test]
    #[serial]
    fn process_environment_is_read() {
        std::env::set_var("DB_NAME", "from_process");
        std::env::set_var("DB_USER", "tester");
        let config = ConfigLoader::from_process_env().from_env_vars().unwrap();
        std::env::remove_var("DB_NAME");
        std::env::remove_var("DB_USER");

        assert_eq!(
            config.environments["development"].name.as_deref(),
            Some("from_process")
        );
    }
}
