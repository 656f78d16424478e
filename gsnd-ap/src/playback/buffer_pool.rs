//! Output ring buffer
//!
//! A fixed pool of `buffer_count` slots of `buffer_len` bytes each, fed to an
//! output device in ring order. The producer blocks in `write` when every
//! slot is in flight; the device hands slots back through a
//! [`CompletionNotifier`]. Memory is bounded by `buffer_count * buffer_len`.
//!
//! `write` is the only blocking call besides `drain`. Both can be aborted
//! from another thread through a [`PoolCanceller`].

use crate::audio::output::{DeviceFactory, OutputDevice};
use crate::audio::types::PcmFormat;
use crate::error::{Error, Result};
use crate::playback::semaphore::{SlotSemaphore, SlotTicket};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub use crate::playback::semaphore::PoolStats;

/// Default slot count
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Default slot length in bytes
pub const DEFAULT_BUFFER_LEN: usize = 2048;

/// Pool geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of slots (at least 2)
    pub buffer_count: usize,
    /// Bytes per slot, rounded down to whole PCM frames at open
    pub buffer_len: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_len: DEFAULT_BUFFER_LEN,
        }
    }
}

/// Completion sink handed to the device.
///
/// Only touches the pool's semaphore and head cursor.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    slots: Arc<SlotSemaphore>,
}

impl CompletionNotifier {
    /// Report that the buffer for `ticket` has finished playing.
    pub fn complete(&self, ticket: SlotTicket) {
        self.slots.complete(ticket);
    }
}

/// Aborts a blocked `write` or `drain` with `Cancelled`. Sticky.
#[derive(Debug, Clone)]
pub struct PoolCanceller {
    slots: Arc<SlotSemaphore>,
}

impl PoolCanceller {
    pub fn cancel(&self) {
        self.slots.cancel();
    }
}

/// Read-only view of pool accounting, usable from any thread
#[derive(Debug, Clone)]
pub struct PoolMonitor {
    slots: Arc<SlotSemaphore>,
}

impl PoolMonitor {
    pub fn stats(&self) -> PoolStats {
        self.slots.stats()
    }
}

/// Output buffer pool bound to one device and one PCM format
pub struct OutputBufferPool {
    format: PcmFormat,
    buffer_len: usize,
    slots: Vec<Box<[u8]>>,
    semaphore: Arc<SlotSemaphore>,
    device: Option<Box<dyn OutputDevice>>,
}

impl OutputBufferPool {
    /// Open a device for `format` and allocate the slots.
    ///
    /// # Errors
    /// - `InvalidArgument` if `buffer_count < 2` or the format has no channels
    /// - `DeviceUnavailable` if the device cannot be configured
    pub fn open(devices: &dyn DeviceFactory, config: PoolConfig, format: PcmFormat) -> Result<Self> {
        if config.buffer_count < 2 {
            return Err(Error::InvalidArgument(format!(
                "buffer_count must be at least 2, got {}",
                config.buffer_count
            )));
        }
        let block_align = format.block_align();
        if block_align == 0 || format.sample_rate == 0 {
            return Err(Error::InvalidArgument(format!("invalid PCM format: {}", format)));
        }
        let buffer_len = (config.buffer_len / block_align * block_align).max(block_align);
        if buffer_len != config.buffer_len {
            debug!(
                "Slot length {} rounded to {} for {}-byte frames",
                config.buffer_len, buffer_len, block_align
            );
        }

        let semaphore = Arc::new(SlotSemaphore::new(config.buffer_count));
        let notifier = CompletionNotifier {
            slots: Arc::clone(&semaphore),
        };
        let device = devices.open(format, config.buffer_count, buffer_len, notifier)?;

        let slots = (0..config.buffer_count)
            .map(|_| vec![0u8; buffer_len].into_boxed_slice())
            .collect();

        debug!(
            "Opened output pool: {} x {} bytes, {}",
            config.buffer_count, buffer_len, format
        );

        Ok(Self {
            format,
            buffer_len,
            slots,
            semaphore,
            device: Some(device),
        })
    }

    /// Queue `bytes` for playback in chunks of at most `buffer_len`.
    ///
    /// Blocks while every slot is in flight.
    ///
    /// # Errors
    /// - `Cancelled` if a canceller fired before or during the write
    /// - `InvalidArgument` if the pool is closed
    /// - device submission errors
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| Error::InvalidArgument("output pool is closed".to_string()))?;

        for chunk in bytes.chunks(self.buffer_len) {
            let ticket = self.semaphore.acquire()?;
            let slot = &mut self.slots[ticket.slot];
            slot[..chunk.len()].copy_from_slice(chunk);

            if let Err(e) = device.submit(ticket, &slot[..chunk.len()]) {
                warn!("Device rejected slot {}: {}", ticket.slot, e);
                self.semaphore.rollback(ticket);
                return Err(e);
            }
            trace!("Submitted slot {} ({} bytes)", ticket.slot, chunk.len());
        }
        Ok(())
    }

    /// Suspend or resume playback without touching slot state.
    pub fn pause(&mut self, paused: bool) -> Result<()> {
        match self.device.as_mut() {
            Some(device) => device.pause(paused),
            None => Ok(()),
        }
    }

    /// Halt playback, discard in-flight buffers, and return to a fresh state.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(device) = self.device.as_mut() {
            device.reset()?;
        }
        self.semaphore.restore();
        debug!("Output pool reset");
        Ok(())
    }

    /// Block until every submitted buffer has completed.
    ///
    /// # Errors
    /// `Cancelled` if a canceller fired while buffers were in flight.
    pub fn drain(&self) -> Result<()> {
        if self.device.is_none() {
            return Ok(());
        }
        self.semaphore.wait_idle()
    }

    /// Halt the device and release it. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            self.slots = Vec::new();
            debug!("Output pool closed");
        }
    }

    pub fn canceller(&self) -> PoolCanceller {
        PoolCanceller {
            slots: Arc::clone(&self.semaphore),
        }
    }

    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            slots: Arc::clone(&self.semaphore),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.semaphore.stats()
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Slot length after rounding to whole PCM frames
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    pub fn buffer_count(&self) -> usize {
        self.semaphore.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.device.is_none()
    }
}

impl Drop for OutputBufferPool {
    fn drop(&mut self) {
        self.close();
    }
}
