//! Playback devices
//!
//! An `OutputDevice` accepts fixed-length PCM buffers in submission order and
//! raises one completion per buffer through the `CompletionNotifier` it was
//! opened with. Completions may arrive on any thread.
//!
//! Devices are opened and driven from the pipeline worker that owns them, so
//! they need not be `Send` (cpal streams are not).

use crate::audio::types::PcmFormat;
use crate::error::{Error, Result};
use crate::playback::buffer_pool::CompletionNotifier;
use crate::playback::semaphore::SlotTicket;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Device side of an output buffer pool
pub trait OutputDevice {
    /// Queue `pcm` (whole s16le frames) for playback.
    ///
    /// The device copies the bytes; `ticket` must be passed back through the
    /// notifier once they have been played.
    fn submit(&mut self, ticket: SlotTicket, pcm: &[u8]) -> Result<()>;

    /// Suspend or resume physical playback. Queued buffers are kept.
    fn pause(&mut self, paused: bool) -> Result<()>;

    /// Stop playback and discard queued buffers without completing them.
    fn reset(&mut self) -> Result<()>;

    /// Release the device. Called once; later calls are no-ops.
    fn close(&mut self);
}

/// Opens devices for a pool
pub trait DeviceFactory: Send + Sync {
    /// # Arguments
    /// - `format`: PCM format every submitted buffer uses
    /// - `buffer_count`: maximum buffers in flight
    /// - `buffer_len`: maximum bytes per buffer
    /// - `notifier`: completion sink for submitted buffers
    ///
    /// # Errors
    /// `DeviceUnavailable` if the device cannot be configured for `format`
    fn open(
        &self,
        format: PcmFormat,
        buffer_count: usize,
        buffer_len: usize,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn OutputDevice>>;
}

/// Queued buffer inside the cpal callback queue
struct Queued {
    ticket: SlotTicket,
    data: Vec<u8>,
    cursor: usize,
}

struct PlayQueue {
    queued: VecDeque<Queued>,
    spare: Vec<Vec<u8>>,
}

impl PlayQueue {
    /// Next sample from the front buffer, completing buffers as they empty
    fn next_sample(&mut self, notifier: &CompletionNotifier) -> Option<i16> {
        loop {
            let front = self.queued.front_mut()?;
            if front.cursor + 1 < front.data.len() {
                let sample = i16::from_le_bytes([front.data[front.cursor], front.data[front.cursor + 1]]);
                front.cursor += 2;
                return Some(sample);
            }
            if let Some(done) = self.queued.pop_front() {
                notifier.complete(done.ticket);
                self.spare.push(done.data);
            }
        }
    }
}

/// Audio output through the default cpal device
pub struct CpalDevice {
    stream: Option<Stream>,
    queue: Arc<Mutex<PlayQueue>>,
    paused: Arc<AtomicBool>,
    buffer_len: usize,
}

impl CpalDevice {
    /// Open the default output device for `format`.
    ///
    /// The device must support the stream's channel count and sample rate
    /// directly; no conversion is done.
    pub fn open(
        format: PcmFormat,
        buffer_count: usize,
        buffer_len: usize,
        notifier: CompletionNotifier,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("No default output device found".to_string()))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::find_config(&device, format)?;
        debug!(
            "Audio config on {}: sample_rate={}, channels={}, format={:?}",
            name, config.sample_rate.0, config.channels, sample_format
        );

        let queue = Arc::new(Mutex::new(PlayQueue {
            queued: VecDeque::with_capacity(buffer_count),
            spare: (0..buffer_count).map(|_| Vec::with_capacity(buffer_len)).collect(),
        }));
        let paused = Arc::new(AtomicBool::new(false));

        let stream = match sample_format {
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, &queue, &paused, notifier)?,
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, &queue, &paused, notifier)?,
            other => {
                return Err(Error::DeviceUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to start stream: {}", e)))?;

        info!("Opened audio device {} for {}", name, format);

        Ok(Self {
            stream: Some(stream),
            queue,
            paused,
            buffer_len,
        })
    }

    /// Find a device configuration matching `format` exactly, preferring i16.
    fn find_config(device: &Device, format: PcmFormat) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to get device configs: {}", e)))?
            .filter(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate().0 <= format.sample_rate
                    && c.max_sample_rate().0 >= format.sample_rate
            })
            .collect();

        let chosen = supported
            .iter()
            .find(|c| c.sample_format() == SampleFormat::I16)
            .or_else(|| supported.iter().find(|c| c.sample_format() == SampleFormat::F32))
            .ok_or_else(|| Error::DeviceUnavailable(format!("Device does not support {}", format)))?;

        let sample_format = chosen.sample_format();
        let config = chosen
            .clone()
            .with_sample_rate(cpal::SampleRate(format.sample_rate))
            .config();
        Ok((config, sample_format))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        queue: &Arc<Mutex<PlayQueue>>,
        paused: &Arc<AtomicBool>,
        notifier: CompletionNotifier,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<i16>,
    {
        let queue = Arc::clone(queue);
        let paused = Arc::clone(paused);

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if paused.load(Ordering::Acquire) {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    }
                    // Never wait on the producer from the audio thread
                    let Some(mut queue) = queue.try_lock() else {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    };
                    for out in data.iter_mut() {
                        *out = match queue.next_sample(&notifier) {
                            Some(sample) => T::from_sample(sample),
                            None => T::EQUILIBRIUM,
                        };
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to build stream: {}", e)))
    }
}

impl OutputDevice for CpalDevice {
    fn submit(&mut self, ticket: SlotTicket, pcm: &[u8]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::DeviceUnavailable("Device is closed".to_string()));
        }
        let mut queue = self.queue.lock();
        let mut data = queue
            .spare
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_len));
        data.clear();
        data.extend_from_slice(pcm);
        queue.queued.push_back(Queued {
            ticket,
            data,
            cursor: 0,
        });
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        self.paused.store(paused, Ordering::Release);
        if let Some(stream) = &self.stream {
            let result = if paused {
                stream.pause().map_err(|e| e.to_string())
            } else {
                stream.play().map_err(|e| e.to_string())
            };
            // Some hosts cannot pause; the callback emits silence instead
            if let Err(e) = result {
                debug!("Stream pause({}) not supported: {}", paused, e);
            }
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let mut queue = self.queue.lock();
        while let Some(entry) = queue.queued.pop_front() {
            queue.spare.push(entry.data);
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Failed to pause stream on close: {}", e);
            }
            drop(stream);
            let mut queue = self.queue.lock();
            queue.queued.clear();
            queue.spare.clear();
            debug!("Audio device closed");
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`CpalDevice`]s on the default host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDeviceFactory;

impl DeviceFactory for CpalDeviceFactory {
    fn open(
        &self,
        format: PcmFormat,
        buffer_count: usize,
        buffer_len: usize,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn OutputDevice>> {
        Ok(Box::new(CpalDevice::open(format, buffer_count, buffer_len, notifier)?))
    }
}

/// Device that discards audio, completing every buffer as it is submitted.
///
/// Playback runs as fast as decoding. Used for `--null-output` and headless
/// runs.
pub struct NullOutput {
    notifier: CompletionNotifier,
    closed: bool,
}

impl OutputDevice for NullOutput {
    fn submit(&mut self, ticket: SlotTicket, _pcm: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::DeviceUnavailable("Device is closed".to_string()));
        }
        self.notifier.complete(ticket);
        Ok(())
    }

    fn pause(&mut self, _paused: bool) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Opens [`NullOutput`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDeviceFactory;

impl DeviceFactory for NullDeviceFactory {
    fn open(
        &self,
        format: PcmFormat,
        _buffer_count: usize,
        _buffer_len: usize,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn OutputDevice>> {
        debug!("Opened null output for {}", format);
        Ok(Box::new(NullOutput {
            notifier,
            closed: false,
        }))
    }
}
