//! Scripted frame format for pipeline and engine tests
//!
//! Layout, repeated until end of file:
//! - `F ch:u8 rate:u32le count:u16le samples:i16le[count]`: audio frame
//! - `S len:u8 bytes[len]`: non-audio block, consumed without samples
//! - `X`: fatal codec error
//!
//! Any other byte stops the stream (zero progress).

use gsnd_ap::audio::{CodecFactory, FrameCodec, FrameInfo};
use gsnd_ap::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct TestCodec;

impl FrameCodec for TestCodec {
    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> Result<FrameInfo> {
        pcm.clear();
        match input.first() {
            Some(b'F') if input.len() >= 8 => {
                let channels = input[1] as u16;
                let rate = u32::from_le_bytes([input[2], input[3], input[4], input[5]]);
                let count = u16::from_le_bytes([input[6], input[7]]) as usize;
                let end = 8 + count * 2;
                if input.len() < end {
                    return Ok(FrameInfo::no_progress());
                }
                pcm.extend(
                    input[8..end]
                        .chunks_exact(2)
                        .map(|b| i16::from_le_bytes([b[0], b[1]])),
                );
                Ok(FrameInfo {
                    bytes_consumed: end,
                    channels,
                    sample_rate: rate,
                })
            }
            Some(b'S') if input.len() >= 2 => {
                let len = (2 + input[1] as usize).min(input.len());
                Ok(FrameInfo::skipped(len))
            }
            Some(b'X') => Err(Error::Decode("fatal marker".to_string())),
            _ => Ok(FrameInfo::no_progress()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TestCodecFactory;

impl CodecFactory for TestCodecFactory {
    fn create(&self, _path: &Path) -> Result<Box<dyn FrameCodec>> {
        Ok(Box::new(TestCodec))
    }
}

/// Builds files in the scripted format
#[derive(Debug, Default, Clone)]
pub struct TrackBuilder {
    bytes: Vec<u8>,
    samples: Vec<i16>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an audio frame
    pub fn frame(mut self, channels: u8, rate: u32, samples: &[i16]) -> Self {
        self.bytes.push(b'F');
        self.bytes.push(channels);
        self.bytes.extend_from_slice(&rate.to_le_bytes());
        self.bytes.extend_from_slice(&(samples.len() as u16).to_le_bytes());
        for s in samples {
            self.bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.samples.extend_from_slice(samples);
        self
    }

    /// Append `count` stereo 44.1 kHz frames of `samples_per_frame` samples each,
    /// numbered so byte order is checkable
    pub fn stereo_frames(mut self, count: usize, samples_per_frame: usize) -> Self {
        for _ in 0..count {
            let start = self.samples.len();
            let samples: Vec<i16> = (0..samples_per_frame).map(|i| ((start + i) % 30000) as i16).collect();
            self = self.frame(2, 44100, &samples);
        }
        self
    }

    /// Append a non-audio block
    pub fn skip(mut self, len: u8) -> Self {
        self.bytes.push(b'S');
        self.bytes.push(len);
        self.bytes.extend(std::iter::repeat(0xEE).take(len as usize));
        self
    }

    /// Append a fatal codec error marker
    pub fn fatal(mut self) -> Self {
        self.bytes.push(b'X');
        self
    }

    /// Every sample in the audio frames, as little-endian bytes
    pub fn expected_pcm(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, &self.bytes).expect("write test track");
        path
    }
}

/// File with no decodable audio
pub fn garbage_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"this is not audio").expect("write garbage");
    path
}
