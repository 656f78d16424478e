//! Streaming playback and orchestration

pub mod buffer_pool;
pub mod effects;
pub mod engine;
pub mod pipeline;
pub mod playlist;
pub mod semaphore;

pub use buffer_pool::{CompletionNotifier, OutputBufferPool, PoolCanceller, PoolConfig, PoolMonitor, PoolStats};
pub use effects::{EffectOverflow, EffectQueue};
pub use engine::{EffectInfo, MusicStatus, PlaybackEngine};
pub use pipeline::{PipelineHandle, PipelineOutcome, PipelineReport, PipelineState, StreamingPipeline};
pub use playlist::{LoopPolicy, PlaylistState};
pub use semaphore::SlotTicket;
