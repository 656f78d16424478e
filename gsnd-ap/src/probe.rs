//! Decode-only probe
//!
//! Runs a file through the frame decoder without any output device and
//! collects frame statistics. Used by `gsnd-ap probe`.

use crate::audio::codec::CodecFactory;
use crate::audio::decoder::{FrameDecoder, FrameResult};
use crate::audio::types::PcmFormat;
use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Statistics for one probed file
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub path: PathBuf,
    /// Frames that produced samples
    pub frames: u64,
    /// Interleaved samples produced
    pub samples: u64,
    /// Compressed bytes consumed, skipped input included
    pub bytes_consumed: u64,
    /// Each distinct format run, with the index of the frame that started it
    pub formats: Vec<(u64, PcmFormat)>,
    /// Total playback time across every format run
    pub duration: Duration,
    /// Decode error that ended the stream early, if any
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn format_changes(&self) -> usize {
        self.formats.len().saturating_sub(1)
    }
}

/// Decode every frame of `path`.
///
/// # Errors
/// - `OpenFailed` if the file cannot be mapped
/// - `Decode` if no frame produced samples
pub fn probe_file(path: &Path, codecs: &dyn CodecFactory) -> Result<ProbeReport> {
    let mut decoder = FrameDecoder::open_path(path, codecs.create(path)?)?;

    let mut report = ProbeReport {
        path: path.to_path_buf(),
        frames: 0,
        samples: 0,
        bytes_consumed: 0,
        formats: Vec::new(),
        duration: Duration::ZERO,
        error: None,
    };

    loop {
        match decoder.decode_next() {
            FrameResult::Samples(frame) => {
                if report.formats.last().map(|(_, f)| *f) != Some(frame.format) {
                    report.formats.push((report.frames, frame.format));
                }
                report.frames += 1;
                report.samples += frame.samples.len() as u64;
                report.bytes_consumed += frame.bytes_consumed as u64;
                report.duration += frame.format.duration_of(frame.samples.len() * 2);
            }
            FrameResult::EndOfStream => break,
            FrameResult::DecodeError(e) => {
                if report.frames == 0 {
                    return Err(e);
                }
                report.error = Some(e.to_string());
                break;
            }
        }
    }

    debug!(
        "Probed {}: {} frames, {} trailing bytes",
        path.display(),
        report.frames,
        decoder.remaining()
    );
    Ok(report)
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File:           {}", self.path.display())?;
        writeln!(f, "Frames:         {}", self.frames)?;
        writeln!(f, "Samples:        {}", self.samples)?;
        writeln!(f, "Bytes decoded:  {}", self.bytes_consumed)?;
        match self.formats.first() {
            Some((_, format)) => {
                writeln!(f, "Sample rate:    {} Hz", format.sample_rate)?;
                writeln!(f, "Channels:       {}", format.channels)?;
            }
            None => writeln!(f, "Format:         unknown")?,
        }
        writeln!(f, "Format changes: {}", self.format_changes())?;
        for (frame, format) in self.formats.iter().skip(1) {
            writeln!(f, "  at frame {}: {}", frame, format)?;
        }
        write!(f, "Duration:       {:.3}s", self.duration.as_secs_f64())?;
        if let Some(error) = &self.error {
            write!(f, "\nStopped early:  {}", error)?;
        }
        Ok(())
    }
}
