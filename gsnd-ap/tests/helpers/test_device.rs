//! Output devices for tests
//!
//! Every device opened by a [`TestDeviceFactory`] appends to one shared
//! [`DeviceLog`], so tests can check what reached "the hardware" across
//! format changes and pool reopenings.

use gsnd_ap::audio::{DeviceFactory, OutputDevice, PcmFormat};
use gsnd_ap::playback::{CompletionNotifier, SlotTicket};
use gsnd_ap::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// When submitted buffers complete
#[derive(Debug, Clone, Copy)]
pub enum Completion {
    /// Inside `submit`
    Immediate,
    /// One buffer per interval, on a device thread
    Paced(Duration),
    /// Only when the test calls `complete_next`
    Manual,
}

/// Everything the devices saw
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub opened: Vec<PcmFormat>,
    pub bytes: Vec<u8>,
    pub submissions: Vec<usize>,
    pub pauses: Vec<bool>,
    pub resets: usize,
    pub closed: usize,
}

#[derive(Debug, Default)]
struct DeviceQueue {
    pending: VecDeque<SlotTicket>,
    paused: bool,
    closed: bool,
}

struct OpenDevice {
    queue: Arc<Mutex<DeviceQueue>>,
    notifier: CompletionNotifier,
}

pub struct TestDeviceFactory {
    mode: Completion,
    log: Arc<Mutex<DeviceLog>>,
    devices: Mutex<Vec<OpenDevice>>,
    fail_open: AtomicBool,
}

impl TestDeviceFactory {
    pub fn new(mode: Completion) -> Arc<Self> {
        Arc::new(Self {
            mode,
            log: Arc::new(Mutex::new(DeviceLog::default())),
            devices: Mutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
        })
    }

    pub fn immediate() -> Arc<Self> {
        Self::new(Completion::Immediate)
    }

    pub fn manual() -> Arc<Self> {
        Self::new(Completion::Manual)
    }

    pub fn paced(interval: Duration) -> Arc<Self> {
        Self::new(Completion::Paced(interval))
    }

    /// Make every later `open` fail with `DeviceUnavailable`
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn log(&self) -> parking_lot::MutexGuard<'_, DeviceLog> {
        self.log.lock()
    }

    /// Complete the oldest pending buffer of the most recently opened device
    pub fn complete_next(&self) -> bool {
        let (ticket, notifier) = {
            let devices = self.devices.lock();
            let Some(device) = devices.last() else {
                return false;
            };
            let ticket = device.queue.lock().pending.pop_front();
            (ticket, device.notifier.clone())
        };
        match ticket {
            Some(ticket) => {
                notifier.complete(ticket);
                true
            }
            None => false,
        }
    }

    /// Pending buffers on the most recently opened device
    pub fn pending(&self) -> usize {
        self.devices
            .lock()
            .last()
            .map_or(0, |d| d.queue.lock().pending.len())
    }

    /// Replay a completion for a ticket the device no longer holds
    pub fn complete_ticket(&self, ticket: SlotTicket) {
        if let Some(device) = self.devices.lock().last() {
            device.notifier.complete(ticket);
        }
    }
}

impl DeviceFactory for TestDeviceFactory {
    fn open(
        &self,
        format: PcmFormat,
        _buffer_count: usize,
        _buffer_len: usize,
        notifier: CompletionNotifier,
    ) -> Result<Box<dyn OutputDevice>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable("test device disabled".to_string()));
        }
        self.log.lock().opened.push(format);

        let queue = Arc::new(Mutex::new(DeviceQueue::default()));
        self.devices.lock().push(OpenDevice {
            queue: Arc::clone(&queue),
            notifier: notifier.clone(),
        });

        let worker = match self.mode {
            Completion::Paced(interval) => {
                let queue = Arc::clone(&queue);
                let notifier = notifier.clone();
                Some(thread::spawn(move || loop {
                    thread::sleep(interval);
                    let ticket = {
                        let mut q = queue.lock();
                        if q.closed {
                            break;
                        }
                        if q.paused {
                            continue;
                        }
                        q.pending.pop_front()
                    };
                    if let Some(ticket) = ticket {
                        notifier.complete(ticket);
                    }
                }))
            }
            _ => None,
        };

        Ok(Box::new(TestDevice {
            mode: self.mode,
            queue,
            notifier,
            log: Arc::clone(&self.log),
            worker,
            closed: false,
        }))
    }
}

struct TestDevice {
    mode: Completion,
    queue: Arc<Mutex<DeviceQueue>>,
    notifier: CompletionNotifier,
    log: Arc<Mutex<DeviceLog>>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl OutputDevice for TestDevice {
    fn submit(&mut self, ticket: SlotTicket, pcm: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::DeviceUnavailable("closed".to_string()));
        }
        {
            let mut log = self.log.lock();
            log.bytes.extend_from_slice(pcm);
            log.submissions.push(pcm.len());
        }
        match self.mode {
            Completion::Immediate => self.notifier.complete(ticket),
            _ => self.queue.lock().pending.push_back(ticket),
        }
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        self.queue.lock().paused = paused;
        self.log.lock().pauses.push(paused);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.queue.lock().pending.clear();
        self.log.lock().resets += 1;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.lock().closed = true;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.log.lock().closed += 1;
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        self.close();
    }
}
