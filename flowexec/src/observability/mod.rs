//! Log subscriber setup for flowexec.
//!
//! The runtime logs through `tracing` macros with structured fields; nothing
//! is printed unless a subscriber is installed. [`init_tracing`] installs a
//! `fmt` subscriber for binaries and examples that do not bring their own.

use crate::errors::FlowError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the configured filter.
pub const LOG_ENV_VAR: &str = "FLOWEXEC_LOG";

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TracingConfig {
    /// Filter directive, e.g. `info` or `flowexec::strategy=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Creates a config with the given filter directive.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Switches JSON output on or off.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Builds the filter: `FLOWEXEC_LOG` when set, the configured level otherwise.
    pub fn env_filter(&self) -> Result<EnvFilter, FlowError> {
        let filter = match std::env::var(LOG_ENV_VAR) {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
            _ => EnvFilter::try_new(&self.level),
        };
        filter.map_err(|e| FlowError::configuration(format!("invalid log filter: {e}")))
    }
}

/// Installs the global subscriber.
///
/// Returns false if another subscriber was already installed; that one stays
/// in place.
///
/// # Errors
///
/// Returns a configuration error if the filter directive cannot be parsed.
pub fn init_tracing(config: &TracingConfig) -> Result<bool, FlowError> {
    let filter = config.env_filter()?;
    let layer = fmt::layer().with_target(true).with_thread_names(true);
    let installed = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already installed");
        return Ok(false);
    }
    Ok(true)
}
