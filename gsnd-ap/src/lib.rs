//! # gsnd Audio Player Library (gsnd-ap)
//!
//! Streams compressed audio from storage to a playback device.
//!
//! **Purpose:** Decode MP3 files frame by frame, feed the PCM to the audio
//! device through a small pool of fixed-size buffers, and orchestrate one
//! background music track alongside a bounded set of one-shot sound effects.
//!
//! **Architecture:** memmap2 source → symphonia frame codec → output buffer
//! pool (counting semaphore) → cpal device, one worker thread per pipeline.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod probe;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use playback::PlaybackEngine;
