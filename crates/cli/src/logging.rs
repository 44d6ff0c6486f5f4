//! Log setup for the `shift` binary.
//!
//! Logs go to stderr so that command output on stdout stays clean.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const OWN_CRATES: [&str; 3] = ["shift", "shift_core", "shift_migrate"];

/// Logging configuration for the CLI
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for our own crates ("warn", "info", "debug", "trace")
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json_format: bool,
    /// Full filter directive; overrides `level`
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json_format: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Map `-v` occurrences to a level; `-vvv` also opens up dependencies
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        Self {
            level: level.to_string(),
            env_filter: (verbose >= 3).then(|| "trace".to_string()),
            ..Self::default()
        }
    }

    pub fn with_json(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> String {
        if let Some(filter) = &self.env_filter {
            return filter.clone();
        }

        let mut directive = String::from("warn");
        for krate in OWN_CRATES {
            directive.push_str(&format!(",{}={}", krate, self.level));
        }
        directive
    }
}

/// Install the global subscriber; `RUST_LOG` wins over the configuration
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(config.directive()))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()?;
    }

    Ok(())
}
