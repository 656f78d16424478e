//! Test helper modules for gsnd-ap integration tests
//!
//! Provides reusable test infrastructure components:
//! - TestCodec: a trivial frame format with scripted frames, skips and failures
//! - TestDeviceFactory: output devices that complete immediately, paced, or on demand
//! - Event and condition waiters

#![allow(dead_code)]

pub mod test_codec;
pub mod test_device;
pub mod waiters;

// Re-export commonly used types
pub use test_codec::{garbage_file, TestCodecFactory, TrackBuilder};
pub use test_device::{Completion, DeviceLog, TestDeviceFactory};
pub use waiters::{collect_events, wait_for_event, wait_until};
