//! Configuration file resolution and TOML loading
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/gsnd/config.toml`)
//! 4. Built-in defaults (no file)
//!
//! A file named on the command line or in the environment must exist. The
//! platform file is optional: when it is missing, defaults are used.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable consulted for the configuration file path
pub const CONFIG_ENV_VAR: &str = "GSND_CONFIG";

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given on the command line
    CommandLine(PathBuf),
    /// Path taken from the environment variable
    Environment(PathBuf),
    /// Platform default location (file exists)
    Platform(PathBuf),
    /// No file found; built-in defaults apply
    Defaults,
}

impl ConfigSource {
    /// Path of the file to load, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p) | ConfigSource::Environment(p) | ConfigSource::Platform(p) => {
                Some(p.as_path())
            }
            ConfigSource::Defaults => None,
        }
    }
}

/// Resolve the configuration file following the priority order above.
///
/// # Arguments
/// - `cli_arg`: path from the command line, if given
/// - `env_var_name`: environment variable to consult (usually [`CONFIG_ENV_VAR`])
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    if let Some(path) = platform_config_file() {
        if path.exists() {
            return ConfigSource::Platform(path);
        }
        debug!("No config file at {}", path.display());
    }

    ConfigSource::Defaults
}

/// Default configuration file location for the platform
pub fn platform_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gsnd").join("config.toml"))
}

/// Load a TOML configuration from the resolved source.
///
/// `ConfigSource::Defaults` yields `T::default()`.
///
/// # Errors
/// - File named explicitly (command line or environment) does not exist
/// - File cannot be read
/// - File is not valid TOML for `T`
pub fn load_toml<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = source.path() else {
        info!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str::<T>(&content).map_err(|e| {
        Error::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_path_wins() {
        let source = resolve_config_path(Some(Path::new("/tmp/gsnd-cli.toml")), "GSND_TEST_UNSET_VAR");
        assert_eq!(
            source,
            ConfigSource::CommandLine(PathBuf::from("/tmp/gsnd-cli.toml"))
        );
        assert_eq!(source.path(), Some(Path::new("/tmp/gsnd-cli.toml")));
    }

    #[test]
    fn test_defaults_have_no_path() {
        assert!(ConfigSource::Defaults.path().is_none());
    }
}
