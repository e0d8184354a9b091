//! Merge rules: defaults first, then file, then environment.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("engine.default_conseq", true)?
        .set_default("engine.max_source_name", 100_i64)?
        .set_default("engine.inbox_high_water", 1024_i64)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
