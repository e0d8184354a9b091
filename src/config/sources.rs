//! Config sources: an explicit TOML file and `EHM__` environment variables.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::{Environment, File, FileFormat};
use std::path::Path;
use tracing::warn;

/// Add the config file to the builder if one was given and it exists.
pub fn add_file(
    builder: ConfigBuilder<DefaultState>,
    file: Option<&Path>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(path) = file else {
        return Ok(builder);
    };
    if !path.exists() {
        warn!(config_path = %path.display(), "Configuration file not found, using defaults");
        return Ok(builder);
    }
    let name = path
        .to_str()
        .ok_or_else(|| ConfigError::Message(format!("Non UTF-8 config path: {:?}", path)))?;
    Ok(builder.add_source(File::new(name, FileFormat::Toml).required(false)))
}

/// Add `EHM__SECTION__KEY` environment overrides.
pub fn add_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("EHM")
            .separator("__")
            .try_parsing(true),
    )
}
