//! # gsnd Common Library
//!
//! Shared code for the gsnd audio player and its front ends:
//! - Error type shared by the configuration helpers
//! - Bootstrap configuration file resolution and TOML loading
//! - Player event types (`PlayerEvent`) broadcast by the playback engine

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{CompletionOutcome, PlayerEvent};
