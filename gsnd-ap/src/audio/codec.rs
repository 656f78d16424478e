//! Decode-one-frame primitive
//!
//! `FrameCodec` is the opaque codec the frame decoder drives: given the bytes
//! at the cursor it decodes at most one compressed frame, reports how many
//! bytes it consumed, and leaves interleaved i16 PCM in the caller's scratch
//! buffer.
//!
//! `Mp3FrameCodec` implements it for MPEG-1/2/2.5 Layer III. Framing (ID3v2
//! skipping, sync search, header validation) is done here; the frame payload
//! is handed to symphonia's MPEG audio decoder one packet at a time.

use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_MP3};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;
use symphonia::default::codecs::MpaDecoder;
use tracing::{debug, trace};

/// Result of one `decode_frame` call.
///
/// The number of samples produced is the length of the PCM buffer passed in;
/// an empty buffer with `bytes_consumed > 0` means skipped input (tags,
/// non-audio frames, undecodable frames). `bytes_consumed == 0` means no
/// further frame can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub bytes_consumed: usize,
    pub channels: u16,
    pub sample_rate: u32,
}

impl FrameInfo {
    /// No frame found at the cursor
    pub fn no_progress() -> Self {
        Self {
            bytes_consumed: 0,
            channels: 0,
            sample_rate: 0,
        }
    }

    /// Input skipped without producing samples
    pub fn skipped(bytes_consumed: usize) -> Self {
        Self {
            bytes_consumed,
            channels: 0,
            sample_rate: 0,
        }
    }
}

/// Opaque decode-one-frame codec state, one per decode session.
pub trait FrameCodec: Send {
    /// Decode at most one frame from the start of `input`.
    ///
    /// `pcm` is cleared and receives the frame's interleaved samples.
    ///
    /// # Errors
    /// Fatal codec errors only (unsupported stream). Damaged frames are
    /// reported as consumed bytes with no samples.
    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> Result<FrameInfo>;
}

/// Creates a codec for each decode session.
pub trait CodecFactory: Send + Sync {
    fn create(&self, path: &Path) -> Result<Box<dyn FrameCodec>>;
}

/// Factory for [`Mp3FrameCodec`]
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp3CodecFactory;

impl CodecFactory for Mp3CodecFactory {
    fn create(&self, _path: &Path) -> Result<Box<dyn FrameCodec>> {
        Ok(Box::new(Mp3FrameCodec::new()?))
    }
}

const ID3V2_HEADER_LEN: usize = 10;
const FRAME_HEADER_LEN: usize = 4;

/// Trailing metadata blocks that may follow the last frame
const TRAILING_TAGS: [&[u8]; 2] = [b"TAG", b"APETAGEX"];

const BITRATES_V1_L3: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const BITRATES_V2_L3: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];
const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Parsed Layer III frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    version: MpegVersion,
    sample_rate: u32,
    channels: u16,
    has_crc: bool,
    frame_len: usize,
}

impl FrameHeader {
    fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < FRAME_HEADER_LEN || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (bytes[1] >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None,
        };

        // Layer III only
        if (bytes[1] >> 1) & 0x03 != 1 {
            return None;
        }
        let has_crc = bytes[1] & 0x01 == 0;

        let bitrate_index = (bytes[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let bitrate_kbps = match version {
            MpegVersion::Mpeg1 => BITRATES_V1_L3[bitrate_index],
            _ => BITRATES_V2_L3[bitrate_index],
        };

        let rate_index = ((bytes[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }
        let sample_rate = match version {
            MpegVersion::Mpeg1 => SAMPLE_RATES_V1[rate_index],
            MpegVersion::Mpeg2 => SAMPLE_RATES_V1[rate_index] / 2,
            MpegVersion::Mpeg25 => SAMPLE_RATES_V1[rate_index] / 4,
        };

        let padding = ((bytes[2] >> 1) & 0x01) as usize;
        let channels = if bytes[3] >> 6 == 3 { 1 } else { 2 };

        let coefficient = match version {
            MpegVersion::Mpeg1 => 144,
            _ => 72,
        };
        let frame_len = (coefficient * bitrate_kbps as usize * 1000) / sample_rate as usize + padding;

        Some(Self {
            version,
            sample_rate,
            channels,
            has_crc,
            frame_len,
        })
    }

    /// Parameters that require a fresh decoder when they change
    fn stream_key(&self) -> (MpegVersion, u32, u16) {
        (self.version, self.sample_rate, self.channels)
    }

    fn side_info_len(&self) -> usize {
        match (self.version, self.channels) {
            (MpegVersion::Mpeg1, 1) => 17,
            (MpegVersion::Mpeg1, _) => 32,
            (_, 1) => 9,
            (_, _) => 17,
        }
    }

    /// Xing/Info frames carry stream metadata, not audio
    fn is_info_frame(&self, frame: &[u8]) -> bool {
        let offset = FRAME_HEADER_LEN + if self.has_crc { 2 } else { 0 } + self.side_info_len();
        matches!(frame.get(offset..offset + 4), Some(b"Xing") | Some(b"Info"))
    }
}

/// Size of an ID3v2 tag at the start of `input`, footer included
fn id3v2_len(input: &[u8]) -> Option<usize> {
    if input.len() < ID3V2_HEADER_LEN || &input[..3] != b"ID3" {
        return None;
    }
    let size = input[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b & 0x7F) as usize);
    let footer = if input[5] & 0x10 != 0 { ID3V2_HEADER_LEN } else { 0 };
    Some(ID3V2_HEADER_LEN + size + footer)
}

enum Located {
    /// Complete frame at `offset`
    Frame { offset: usize, header: FrameHeader },
    /// Only candidates running past the end of input were found
    Truncated,
    /// No sync word anywhere in input
    NotFound,
}

fn is_trailing_tag(input: &[u8]) -> bool {
    TRAILING_TAGS.iter().any(|tag| input.starts_with(tag))
}

/// Offset of the last parseable frame header in `input`
fn last_header_offset(input: &[u8]) -> Option<usize> {
    (0..input.len().saturating_sub(FRAME_HEADER_LEN - 1))
        .rev()
        .find(|&pos| input[pos] == 0xFF && FrameHeader::parse(&input[pos..]).is_some())
}

/// Find the next frame that is followed by another header, a trailing tag,
/// or nothing decodable.
///
/// The following header may carry a different format; only its validity
/// is checked. Candidates whose frame runs past the end are passed over so a
/// false sync near the end cannot hide real frames behind it.
fn locate_frame(input: &[u8]) -> Located {
    let mut pos = 0;
    let mut truncated = false;
    let mut last_header: Option<Option<usize>> = None;

    while pos + FRAME_HEADER_LEN <= input.len() {
        if input[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let Some(header) = FrameHeader::parse(&input[pos..]) else {
            pos += 1;
            continue;
        };

        let end = pos + header.frame_len;
        if end > input.len() {
            truncated = true;
            pos += 1;
            continue;
        }

        let rest = &input[end..];
        if rest.len() < FRAME_HEADER_LEN || FrameHeader::parse(rest).is_some() || is_trailing_tag(rest) {
            return Located::Frame { offset: pos, header };
        }
        let last = *last_header.get_or_insert_with(|| last_header_offset(input));
        if last.map_or(true, |last| last < end) {
            // Nothing but non-audio bytes follow
            return Located::Frame { offset: pos, header };
        }
        pos += 1;
    }

    if truncated {
        Located::Truncated
    } else {
        Located::NotFound
    }
}

/// MPEG-1/2/2.5 Layer III codec backed by symphonia
pub struct Mp3FrameCodec {
    decoder: MpaDecoder,
    /// Version, rate and channels the decoder was last fed
    stream: Option<(MpegVersion, u32, u16)>,
    sample_buf: Option<(SampleBuffer<i16>, SignalSpec, usize)>,
    frames: u64,
}

impl Mp3FrameCodec {
    /// # Errors
    /// `Decode` if symphonia rejects the codec parameters
    pub fn new() -> Result<Self> {
        Ok(Self {
            decoder: Self::build_decoder()?,
            stream: None,
            sample_buf: None,
            frames: 0,
        })
    }

    fn build_decoder() -> Result<MpaDecoder> {
        let mut params = CodecParameters::new();
        params.for_codec(CODEC_TYPE_MP3);
        MpaDecoder::try_new(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create MPEG audio decoder: {}", e)))
    }

    /// Rebuild the decoder when the stream is reconfigured mid-file.
    fn track_stream(&mut self, header: &FrameHeader) -> Result<()> {
        let key = header.stream_key();
        if let Some(previous) = self.stream {
            if previous != key {
                debug!(
                    "Stream reconfigured at frame {}: {:?} -> {:?}",
                    self.frames, previous, key
                );
                self.decoder = Self::build_decoder()?;
                self.sample_buf = None;
            }
        }
        self.stream = Some(key);
        Ok(())
    }

    fn decode_payload(&mut self, frame: &[u8], header: &FrameHeader, pcm: &mut Vec<i16>) -> Result<()> {
        self.track_stream(header)?;
        let packet = Packet::new_from_slice(0, self.frames, 0, frame);
        self.frames += 1;

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!("Skipping undecodable frame {}: {}", self.frames, msg);
                return Ok(());
            }
            Err(SymphoniaError::IoError(e)) => {
                debug!("Skipping short frame {}: {}", self.frames, e);
                return Ok(());
            }
            Err(e) => {
                return Err(Error::Decode(format!(
                    "MPEG audio decoder failed ({} Hz, {} ch): {}",
                    header.sample_rate, header.channels, e
                )));
            }
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity();
        let reuse = matches!(&self.sample_buf, Some((_, s, cap)) if *s == spec && *cap >= capacity);
        if !reuse {
            self.sample_buf = Some((SampleBuffer::<i16>::new(capacity as u64, spec), spec, capacity));
        }

        if let Some((buf, _, _)) = self.sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            pcm.extend_from_slice(buf.samples());
        }
        Ok(())
    }
}

impl FrameCodec for Mp3FrameCodec {
    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> Result<FrameInfo> {
        pcm.clear();

        if let Some(tag_len) = id3v2_len(input) {
            let skipped = tag_len.min(input.len());
            debug!("Skipping ID3v2 tag ({} bytes)", skipped);
            return Ok(FrameInfo::skipped(skipped));
        }

        let (offset, header) = match locate_frame(input) {
            Located::Frame { offset, header } => (offset, header),
            Located::Truncated => {
                debug!("Discarding truncated final frame ({} bytes)", input.len());
                return Ok(FrameInfo::skipped(input.len()));
            }
            Located::NotFound => return Ok(FrameInfo::no_progress()),
        };

        if offset > 0 {
            trace!("Resynchronised after {} bytes", offset);
        }

        let frame = &input[offset..offset + header.frame_len];
        let consumed = offset + header.frame_len;

        if header.is_info_frame(frame) {
            debug!("Skipping Xing/Info frame");
            return Ok(FrameInfo::skipped(consumed));
        }

        self.decode_payload(frame, &header, pcm)?;

        Ok(FrameInfo {
            bytes_consumed: consumed,
            channels: header.channels,
            sample_rate: header.sample_rate,
        })
    }
}
