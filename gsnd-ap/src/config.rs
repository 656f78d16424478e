//! Player configuration
//!
//! Loaded from TOML via `gsnd_common::config`; every field has a default, so
//! a missing file or a partial file is valid.
//!
//! ```toml
//! buffer_count = 3
//! buffer_len = 2048
//! effect_capacity = 8
//! effect_overflow = "drop_newest"   # or "evict_oldest"
//! loop_policy = "repeat_track"      # or "repeat_playlist"
//! event_capacity = 256
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::playback::buffer_pool::{PoolConfig, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_LEN};
use crate::playback::effects::{EffectOverflow, DEFAULT_EFFECT_CAPACITY};
use crate::playback::playlist::LoopPolicy;
use gsnd_common::config::{load_toml, resolve_config_path, CONFIG_ENV_VAR};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest slot that holds one stereo frame
const MIN_BUFFER_LEN: usize = 4;

fn default_buffer_count() -> usize {
    DEFAULT_BUFFER_COUNT
}

fn default_buffer_len() -> usize {
    DEFAULT_BUFFER_LEN
}

fn default_effect_capacity() -> usize {
    DEFAULT_EFFECT_CAPACITY
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Player configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Output slots per pipeline
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,

    /// Bytes per output slot
    #[serde(default = "default_buffer_len")]
    pub buffer_len: usize,

    /// Maximum concurrent one-shot effects
    #[serde(default = "default_effect_capacity")]
    pub effect_capacity: usize,

    #[serde(default)]
    pub effect_overflow: EffectOverflow,

    #[serde(default)]
    pub loop_policy: LoopPolicy,

    /// Event channel capacity; slow subscribers lag past this
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_count: default_buffer_count(),
            buffer_len: default_buffer_len(),
            effect_capacity: default_effect_capacity(),
            effect_overflow: EffectOverflow::default(),
            loop_policy: LoopPolicy::default(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Resolve and load the configuration file, then validate it.
    ///
    /// # Arguments
    /// - `cli_path`: `--config` value, if given
    ///
    /// # Errors
    /// - Named file missing or malformed
    /// - Values out of range (see [`PlayerConfig::validate`])
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let source = resolve_config_path(cli_path, CONFIG_ENV_VAR);
        let config: PlayerConfig = load_toml(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `Config` if a value is out of range
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count < 2 {
            return Err(Error::Config(format!(
                "buffer_count must be at least 2, got {}",
                self.buffer_count
            )));
        }
        if self.buffer_len < MIN_BUFFER_LEN {
            return Err(Error::Config(format!(
                "buffer_len must be at least {} bytes, got {}",
                MIN_BUFFER_LEN, self.buffer_len
            )));
        }
        if self.effect_capacity == 0 {
            return Err(Error::Config("effect_capacity must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            buffer_count: self.buffer_count,
            buffer_len: self.buffer_len,
        }
    }
}
