//! Configuration file loading for Sandpit
//!
//! Handles loading and parsing configuration files using the config crate.
//! Environment variables prefixed with `SANDPIT__` are layered on top, with
//! `__` separating nested keys (e.g. `SANDPIT__PYTHON__COMMAND`).

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, SOURCE_PLACEHOLDER};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (or the embedded example when no path
    /// is given) with `SANDPIT__*` environment overrides applied
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = match path {
            Some(path) => ConfigBuilder::builder().add_source(File::from(path)),
            None => ConfigBuilder::builder()
                .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml)),
        };
        let config = builder.add_source(environment()).build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_source_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_source_bytes must be greater than zero".to_owned(),
            ));
        }

        let python = &self.python;
        if python.name.is_empty() {
            return Err(ConfigError::Invalid("python has empty name".to_owned()));
        }
        if python.extension.is_empty() {
            return Err(ConfigError::Invalid(
                "python has empty extension".to_owned(),
            ));
        }
        if python.command.is_empty() {
            return Err(ConfigError::Invalid("python has empty command".to_owned()));
        }
        if !python
            .command
            .iter()
            .any(|arg| arg.contains(SOURCE_PLACEHOLDER))
        {
            return Err(ConfigError::Invalid(format!(
                "python command must reference {SOURCE_PLACEHOLDER}"
            )));
        }

        if let Some(entry) = self
            .shell
            .allow_list
            .iter()
            .find(|entry| entry.trim().is_empty() || entry.trim() != entry.as_str())
        {
            return Err(ConfigError::Invalid(format!(
                "shell allow_list entry {entry:?} is empty or has surrounding whitespace"
            )));
        }

        Ok(())
    }
}

/// Environment source for `SANDPIT__*` overrides
///
/// Shared with crates that read their own sections from the same file.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
