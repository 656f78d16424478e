//! Core audio data types
//!
//! All PCM in the player is signed 16-bit, interleaved, native sample rate.
//! No resampling or channel conversion happens anywhere in the pipeline.

use std::fmt;
use std::time::Duration;

/// Bytes per 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Stream format discovered from decoded frames.
///
/// Valid only after a frame has produced samples; may change between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    /// Samples per second per channel
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Size in bytes of one PCM frame (one sample for every channel)
    pub fn block_align(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Playback time of `bytes` bytes of PCM in this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let bytes_per_second = self.block_align() as u64 * self.sample_rate as u64;
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((bytes as u64).saturating_mul(1_000_000_000) / bytes_per_second)
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, s16le", self.sample_rate, self.channels)
    }
}

/// Append interleaved samples to `out` as little-endian bytes.
pub fn append_le_bytes(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_align() {
        assert_eq!(PcmFormat::new(44100, 2).block_align(), 4);
        assert_eq!(PcmFormat::new(22050, 1).block_align(), 2);
    }

    #[test]
    fn test_duration_of() {
        let format = PcmFormat::new(44100, 2);
        assert_eq!(format.duration_of(44100 * 4), Duration::from_secs(1));
        assert_eq!(PcmFormat::new(0, 2).duration_of(1024), Duration::ZERO);
    }

    #[test]
    fn test_append_le_bytes() {
        let mut out = vec![0xAA];
        append_le_bytes(&[1, -2, 0x1234], &mut out);
        assert_eq!(out, vec![0xAA, 0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }
}
