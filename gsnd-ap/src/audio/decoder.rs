//! Frame decoder
//!
//! Walks a compressed source one frame at a time, producing interleaved i16
//! PCM plus the format the frame was encoded in.
//!
//! The cursor always sits at the start of the next undecoded frame or at end
//! of source. Format is only known after a frame has produced samples and may
//! change from one frame to the next; callers compare `PcmFrame::format`
//! between calls.

use crate::audio::codec::FrameCodec;
use crate::audio::source::CompressedSource;
use crate::audio::types::PcmFormat;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, trace};

/// Scratch capacity: one MPEG-1 Layer III frame of stereo samples
const PCM_SCRATCH_SAMPLES: usize = 1152 * 2;

/// One decoded frame, borrowed from the decoder's scratch buffer
#[derive(Debug)]
pub struct PcmFrame<'a> {
    /// Interleaved samples
    pub samples: &'a [i16],
    pub format: PcmFormat,
    /// Compressed bytes consumed to produce these samples, skipped input included
    pub bytes_consumed: usize,
}

/// Outcome of [`FrameDecoder::decode_next`]
#[derive(Debug)]
pub enum FrameResult<'a> {
    Samples(PcmFrame<'a>),
    EndOfStream,
    DecodeError(Error),
}

/// Decoder for one compressed source
pub struct FrameDecoder {
    source: CompressedSource,
    codec: Box<dyn FrameCodec>,
    offset: usize,
    pcm: Vec<i16>,
    format: Option<PcmFormat>,
    frames_decoded: u64,
    finished: bool,
}

impl FrameDecoder {
    /// Open a decode session over `source`.
    ///
    /// No format validation happens here; the first `decode_next` discovers
    /// the stream format.
    pub fn open(source: CompressedSource, codec: Box<dyn FrameCodec>) -> Self {
        debug!("Opened decoder for {} ({} bytes)", source.path().display(), source.len());
        Self {
            source,
            codec,
            offset: 0,
            pcm: Vec::with_capacity(PCM_SCRATCH_SAMPLES),
            format: None,
            frames_decoded: 0,
            finished: false,
        }
    }

    /// Map `path` and open a decode session over it.
    ///
    /// # Errors
    /// `OpenFailed` if the file is missing, unreadable or empty.
    pub fn open_path(path: &Path, codec: Box<dyn FrameCodec>) -> Result<Self> {
        Ok(Self::open(CompressedSource::open(path)?, codec))
    }

    /// Decode the next frame that produces samples.
    ///
    /// Input that is consumed without producing samples is skipped. Once
    /// `EndOfStream` or `DecodeError` has been returned, every later call
    /// returns `EndOfStream`.
    pub fn decode_next(&mut self) -> FrameResult<'_> {
        if self.finished {
            return FrameResult::EndOfStream;
        }

        let mut skipped = 0;
        loop {
            let input = &self.source[self.offset..];
            let info = match self.codec.decode_frame(input, &mut self.pcm) {
                Ok(info) => info,
                Err(e) => {
                    self.finished = true;
                    return FrameResult::DecodeError(e);
                }
            };

            if info.bytes_consumed == 0 {
                self.finished = true;
                if self.frames_decoded == 0 {
                    return FrameResult::DecodeError(Error::Decode(format!(
                        "no decodable audio in {}",
                        self.source.path().display()
                    )));
                }
                debug!(
                    "End of stream after {} frames ({} trailing bytes)",
                    self.frames_decoded,
                    input.len()
                );
                return FrameResult::EndOfStream;
            }

            // Never step past the end even if the codec over-reports
            let consumed = info.bytes_consumed.min(input.len());
            self.offset += consumed;
            skipped += consumed;

            if self.pcm.is_empty() {
                trace!("Skipped {} bytes without samples", consumed);
                continue;
            }

            if info.channels == 0 || info.sample_rate == 0 {
                self.finished = true;
                return FrameResult::DecodeError(Error::Decode(format!(
                    "frame {} reported {} channels at {} Hz",
                    self.frames_decoded, info.channels, info.sample_rate
                )));
            }

            let format = PcmFormat::new(info.sample_rate, info.channels);
            if self.format != Some(format) {
                debug!("Stream format: {}", format);
                self.format = Some(format);
            }
            self.frames_decoded += 1;

            return FrameResult::Samples(PcmFrame {
                samples: &self.pcm,
                format,
                bytes_consumed: skipped,
            });
        }
    }

    /// Frames that produced samples so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Format of the most recently decoded frame
    pub fn format(&self) -> Option<PcmFormat> {
        self.format
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.source.len() - self.offset
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }
}
