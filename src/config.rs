//! Configuration System
//!
//! Layered configuration for the engine and its logging: built-in defaults, then an
//! optional TOML file, then `EHM__`-prefixed environment variables (for example
//! `EHM__ENGINE__INBOX_HIGH_WATER=64`). Validated before use.

use crate::error::EhmError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod merge;
mod sources;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EhmConfig {
    /// Dispatcher behaviour
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dispatcher behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whether `resume` keeps notifying outer matching handlers after the first
    #[serde(default = "default_conseq")]
    pub default_conseq: bool,

    /// Longest source-context name stamped on a raised event
    #[serde(default = "default_max_source_name")]
    pub max_source_name: usize,

    /// Inbox depth above which enqueues log a warning
    #[serde(default = "default_inbox_high_water")]
    pub inbox_high_water: usize,
}

fn default_conseq() -> bool {
    true
}

fn default_max_source_name() -> usize {
    100
}

fn default_inbox_high_water() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_conseq: default_conseq(),
            max_source_name: default_max_source_name(),
            inbox_high_water: default_inbox_high_water(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Engine(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "Engine: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_source_name == 0 {
            return Err("max_source_name must be at least 1".to_string());
        }
        if self.inbox_high_water == 0 {
            return Err("inbox_high_water must be at least 1".to_string());
        }
        Ok(())
    }
}

impl EhmConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.validate() {
            errors.push(ValidationError::Engine(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`EhmConfig`] from defaults, file and environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, reading `file` when given and present.
    pub fn load(file: Option<&Path>) -> Result<EhmConfig, EhmError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::add_file(builder, file)?;
        let builder = sources::add_environment(builder);

        let config: EhmConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EhmError::Config(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }

    /// Load configuration from a specific file plus environment overrides.
    pub fn load_from_file(path: &Path) -> Result<EhmConfig, EhmError> {
        Self::load(Some(path))
    }
}
