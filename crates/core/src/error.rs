use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal and surface before any database work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment '{0}' is not defined")]
    UnknownEnvironment(String),

    #[error("environment '{environment}' is missing required parameter '{key}'")]
    MissingParameter { environment: String, key: String },

    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(environment: impl Into<String>, key: impl Into<String>) -> Self {
        ConfigError::MissingParameter {
            environment: environment.into(),
            key: key.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
