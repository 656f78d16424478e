//! Streaming pipeline
//!
//! Drives one decode+play session on a dedicated worker thread: pull frames
//! from a [`FrameDecoder`], convert them to little-endian bytes, and push whole
//! slots into an [`OutputBufferPool`] opened for the discovered format.
//!
//! **State machine:**
//! ```text
//! Unopened -> Decoding <-> Paused
//!                 |
//!                 +-> Finished | Failed | Stopped
//! ```
//!
//! The source is opened on the worker, so open failures surface as a
//! `Failed` report rather than as an error to the caller. Exactly one
//! [`PipelineReport`] is produced per pipeline, after the decoder and pool
//! have been released.

use crate::audio::codec::CodecFactory;
use crate::audio::decoder::{FrameDecoder, FrameResult};
use crate::audio::output::DeviceFactory;
use crate::audio::types::{append_le_bytes, PcmFormat};
use crate::error::{Error, Result};
use crate::playback::buffer_pool::{OutputBufferPool, PoolCanceller, PoolConfig};
use gsnd_common::CompletionOutcome;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Source not yet opened
    Unopened,
    /// Decoding and writing
    Decoding,
    /// Decoding suspended and device paused
    Paused,
    /// Reached end of stream and played every buffer
    Finished,
    /// Open, decode or device failure
    Failed,
    /// Stopped externally
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Unopened => "unopened",
            PipelineState::Decoding => "decoding",
            PipelineState::Paused => "paused",
            PipelineState::Finished => "finished",
            PipelineState::Failed => "failed",
            PipelineState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// How a pipeline ended
#[derive(Debug)]
pub enum PipelineOutcome {
    Finished,
    Failed(Error),
    Stopped,
}

impl PipelineOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            PipelineOutcome::Finished => PipelineState::Finished,
            PipelineOutcome::Failed(_) => PipelineState::Failed,
            PipelineOutcome::Stopped => PipelineState::Stopped,
        }
    }

    /// Serializable form for events
    pub fn to_completion(&self) -> CompletionOutcome {
        match self {
            PipelineOutcome::Finished => CompletionOutcome::Finished,
            PipelineOutcome::Failed(e) => CompletionOutcome::Failed {
                reason: e.to_string(),
            },
            PipelineOutcome::Stopped => CompletionOutcome::Stopped,
        }
    }
}

/// Final report of one pipeline
#[derive(Debug)]
pub struct PipelineReport {
    pub id: Uuid,
    pub path: PathBuf,
    pub outcome: PipelineOutcome,
    pub frames_decoded: u64,
    pub bytes_written: u64,
}

/// Control flags shared between a pipeline worker and its handle
#[derive(Debug)]
struct ControlState {
    paused: bool,
    stopped: bool,
    state: PipelineState,
    canceller: Option<PoolCanceller>,
}

#[derive(Debug)]
struct PipelineControl {
    state: Mutex<ControlState>,
    changed: Condvar,
}

impl PipelineControl {
    fn new() -> Self {
        Self {
            state: Mutex::new(ControlState {
                paused: false,
                stopped: false,
                state: PipelineState::Unopened,
                canceller: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        if let Some(canceller) = &state.canceller {
            canceller.cancel();
        }
        self.changed.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        state.paused = paused;
        self.changed.notify_all();
    }

    /// Attach the canceller of a newly opened pool.
    ///
    /// A stop that already happened cancels it immediately.
    fn attach(&self, canceller: PoolCanceller) {
        let mut state = self.state.lock();
        if state.stopped {
            canceller.cancel();
        }
        state.canceller = Some(canceller);
    }

    fn set_state(&self, new_state: PipelineState) {
        let mut state = self.state.lock();
        state.state = new_state;
        self.changed.notify_all();
    }

    /// Park the worker while paused, pausing the device around the wait.
    ///
    /// Returns false if the pipeline was stopped.
    fn wait_while_paused(&self, pool: Option<&mut OutputBufferPool>) -> Result<bool> {
        let mut state = self.state.lock();
        if state.stopped {
            return Ok(false);
        }
        if !state.paused {
            return Ok(true);
        }

        state.state = PipelineState::Paused;
        drop(state);
        let mut pool = pool;
        if let Some(pool) = pool.as_deref_mut() {
            pool.pause(true)?;
        }
        debug!("Pipeline paused");

        let mut state = self.state.lock();
        while state.paused && !state.stopped {
            self.changed.wait(&mut state);
        }
        let stopped = state.stopped;
        if !stopped {
            state.state = PipelineState::Decoding;
        }
        drop(state);

        if let Some(pool) = pool {
            pool.pause(false)?;
        }
        debug!("Pipeline resumed");
        Ok(!stopped)
    }
}

/// One decode+play session, ready to run
pub struct StreamingPipeline {
    id: Uuid,
    path: PathBuf,
    codecs: Arc<dyn CodecFactory>,
    devices: Arc<dyn DeviceFactory>,
    pool_config: PoolConfig,
    control: Arc<PipelineControl>,
}

/// Pool plus the bytes not yet making up a whole slot
struct Output {
    pool: Option<OutputBufferPool>,
    pending: Vec<u8>,
    bytes_written: u64,
}

impl Output {
    fn format(&self) -> Option<PcmFormat> {
        self.pool.as_ref().map(|p| p.format())
    }

    fn write_whole_slots(&mut self) -> Result<()> {
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };
        let whole = self.pending.len() / pool.buffer_len() * pool.buffer_len();
        if whole > 0 {
            pool.write(&self.pending[..whole])?;
            self.pending.drain(..whole);
            self.bytes_written += whole as u64;
        }
        Ok(())
    }

    /// Write whatever is pending, including a partial slot.
    fn flush(&mut self) -> Result<()> {
        let Some(pool) = self.pool.as_mut() else {
            return Ok(());
        };
        if !self.pending.is_empty() {
            pool.write(&self.pending)?;
            self.bytes_written += self.pending.len() as u64;
            self.pending.clear();
        }
        Ok(())
    }

    /// Wait for the device to play everything submitted.
    fn drain(&self) -> Result<()> {
        match self.pool.as_ref() {
            Some(pool) => pool.drain(),
            None => Ok(()),
        }
    }

    /// Release the pool, discarding anything still queued if `discard`.
    fn release(&mut self, discard: bool) {
        if let Some(mut pool) = self.pool.take() {
            if discard {
                if let Err(e) = pool.reset() {
                    warn!("Failed to reset output pool: {}", e);
                }
            }
            pool.close();
        }
        self.pending.clear();
    }
}

impl StreamingPipeline {
    pub fn new(
        path: impl Into<PathBuf>,
        codecs: Arc<dyn CodecFactory>,
        devices: Arc<dyn DeviceFactory>,
        pool_config: PoolConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            codecs,
            devices,
            pool_config,
            control: Arc::new(PipelineControl::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start in the paused state: nothing is decoded or written until the
    /// handle resumes it.
    pub fn start_paused(self, paused: bool) -> Self {
        self.control.set_paused(paused);
        self
    }

    /// Start the worker thread.
    ///
    /// `on_complete` runs on the worker after every resource is released.
    ///
    /// # Errors
    /// `Io` if the thread cannot be spawned
    pub fn spawn<F>(self, thread_name: String, on_complete: F) -> Result<PipelineHandle>
    where
        F: FnOnce(PipelineReport) + Send + 'static,
    {
        let id = self.id;
        let path = self.path.clone();
        let control = Arc::clone(&self.control);

        let worker = thread::Builder::new().name(thread_name).spawn(move || {
            let report = self.run();
            on_complete(report);
        })?;

        Ok(PipelineHandle {
            id,
            path,
            control,
            worker: Some(worker),
        })
    }

    /// Run the session on the current thread until it ends.
    pub fn run(self) -> PipelineReport {
        let filename = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unknown>")
            .to_string();
        let started = Instant::now();

        let mut output = Output {
            pool: None,
            pending: Vec::new(),
            bytes_written: 0,
        };
        let mut frames_decoded = 0;

        let outcome = match self.open_decoder() {
            Ok(mut decoder) => {
                self.control.set_state(PipelineState::Decoding);
                debug!("Pipeline {} decoding {}", self.id, filename);
                let outcome = self.stream(&mut decoder, &mut output);
                frames_decoded = decoder.frames_decoded();
                outcome
            }
            Err(e) => PipelineOutcome::Failed(e),
        };

        // Cancellation discards queued audio; natural ends have already drained
        output.release(matches!(outcome, PipelineOutcome::Stopped));
        self.control.set_state(outcome.state());

        match &outcome {
            PipelineOutcome::Failed(e) => warn!("Pipeline {} failed for {}: {}", self.id, filename, e),
            _ => info!(
                "Pipeline {} {} for {} ({} frames, {} bytes, elapsed={:.2}s)",
                self.id,
                outcome.state(),
                filename,
                frames_decoded,
                output.bytes_written,
                started.elapsed().as_secs_f64()
            ),
        }

        PipelineReport {
            id: self.id,
            path: self.path,
            outcome,
            frames_decoded,
            bytes_written: output.bytes_written,
        }
    }

    fn open_decoder(&self) -> Result<FrameDecoder> {
        let codec = self.codecs.create(&self.path)?;
        FrameDecoder::open_path(&self.path, codec)
    }

    fn stream(&self, decoder: &mut FrameDecoder, output: &mut Output) -> PipelineOutcome {
        match self.stream_frames(decoder, output) {
            Ok(outcome) => outcome,
            Err(Error::Cancelled) => PipelineOutcome::Stopped,
            Err(e) => PipelineOutcome::Failed(e),
        }
    }

    fn stream_frames(&self, decoder: &mut FrameDecoder, output: &mut Output) -> Result<PipelineOutcome> {
        loop {
            if !self.control.wait_while_paused(output.pool.as_mut())? {
                return Ok(PipelineOutcome::Stopped);
            }

            match decoder.decode_next() {
                FrameResult::Samples(frame) => {
                    if output.format() != Some(frame.format) {
                        self.switch_format(output, frame.format)?;
                    }
                    append_le_bytes(frame.samples, &mut output.pending);
                    output.write_whole_slots()?;
                }
                FrameResult::EndOfStream => {
                    if !self.play_out(output)? {
                        return Ok(PipelineOutcome::Stopped);
                    }
                    return Ok(PipelineOutcome::Finished);
                }
                FrameResult::DecodeError(e) => {
                    // Whatever decoded cleanly is still played
                    if !self.play_out(output)? {
                        return Ok(PipelineOutcome::Stopped);
                    }
                    return Ok(PipelineOutcome::Failed(e));
                }
            }
        }
    }

    /// Flush the tail and wait for it to play, honouring a pause that
    /// arrived while the last frames were written.
    ///
    /// Returns false if the pipeline was stopped.
    fn play_out(&self, output: &mut Output) -> Result<bool> {
        output.flush()?;
        if !self.control.wait_while_paused(output.pool.as_mut())? {
            return Ok(false);
        }
        output.drain()?;
        Ok(true)
    }

    /// Open a pool for `format`, first playing out and closing any previous one.
    fn switch_format(&self, output: &mut Output, format: PcmFormat) -> Result<()> {
        if let Some(old) = output.format() {
            info!("Pipeline {} format change: {} -> {}", self.id, old, format);
            output.flush()?;
            output.drain()?;
            output.release(false);
        }

        let pool = OutputBufferPool::open(self.devices.as_ref(), self.pool_config, format)?;
        self.control.attach(pool.canceller());
        output.pool = Some(pool);
        Ok(())
    }
}

/// Handle to a running pipeline
pub struct PipelineHandle {
    id: Uuid,
    path: PathBuf,
    control: Arc<PipelineControl>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask the worker to stop; returns immediately.
    ///
    /// A worker blocked on the device is woken with `Cancelled`; queued audio
    /// is discarded.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Flip the pause flag; returns the new value.
    pub fn toggle_pause(&self) -> bool {
        let mut state = self.control.state.lock();
        state.paused = !state.paused;
        self.control.changed.notify_all();
        state.paused
    }

    pub fn is_paused(&self) -> bool {
        self.control.state.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }

    pub fn state(&self) -> PipelineState {
        self.control.state.lock().state
    }

    /// Worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Wait for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Pipeline {} worker panicked", self.id);
            }
        }
    }
}

impl fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
