//! Audio decoding and output
//!
//! Leaf components of the streaming pipeline: the compressed source, the
//! frame codec and decoder, and the playback devices.

pub mod codec;
pub mod decoder;
pub mod output;
pub mod source;
pub mod types;

pub use codec::{CodecFactory, FrameCodec, FrameInfo, Mp3CodecFactory, Mp3FrameCodec};
pub use decoder::{FrameDecoder, FrameResult, PcmFrame};
pub use output::{CpalDeviceFactory, DeviceFactory, NullDeviceFactory, OutputDevice};
pub use source::CompressedSource;
pub use types::PcmFormat;
