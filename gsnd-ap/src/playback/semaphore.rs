//! Counting semaphore for output slots
//!
//! Tracks free slots (`available`), submitted-but-unplayed slots
//! (`in_flight`) and the two ring cursors under one lock, so every observer
//! sees `available + in_flight == capacity`.
//!
//! The producer side (`acquire`, `rollback`, `restore`, `wait_idle`) belongs
//! to a single pipeline worker. `complete` is called from the device's
//! completion context and only holds the lock for a few field updates.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

/// Identifies one submitted slot.
///
/// `epoch` changes on every reset; completions carrying an older epoch are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTicket {
    pub slot: usize,
    pub epoch: u64,
}

/// Consistent snapshot of pool accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Free slots
    pub available: usize,
    /// Slots submitted and not yet completed
    pub in_flight: usize,
    /// Next slot the device reports complete
    pub head: usize,
    /// Next slot the producer fills
    pub tail: usize,
    pub buffer_count: usize,
    /// Total submissions since open
    pub submitted: u64,
    /// Total completions since open (stale completions excluded)
    pub completed: u64,
}

#[derive(Debug)]
struct SlotState {
    available: usize,
    in_flight: usize,
    head: usize,
    tail: usize,
    epoch: u64,
    cancelled: bool,
    submitted: u64,
    completed: u64,
}

/// Slot semaphore shared by a pool, its device and its monitors
#[derive(Debug)]
pub struct SlotSemaphore {
    capacity: usize,
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl SlotSemaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(SlotState {
                available: capacity,
                in_flight: 0,
                head: 0,
                tail: 0,
                epoch: 0,
                cancelled: false,
                submitted: 0,
                completed: 0,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until a slot is free, then claim the slot at `tail`.
    ///
    /// # Errors
    /// `Cancelled` if the semaphore was cancelled before or while waiting.
    pub fn acquire(&self) -> Result<SlotTicket> {
        let mut state = self.state.lock();
        while state.available == 0 && !state.cancelled {
            self.changed.wait(&mut state);
        }
        if state.cancelled {
            return Err(Error::Cancelled);
        }

        let ticket = SlotTicket {
            slot: state.tail,
            epoch: state.epoch,
        };
        state.available -= 1;
        state.in_flight += 1;
        state.tail = (state.tail + 1) % self.capacity;
        state.submitted += 1;
        Ok(ticket)
    }

    /// Undo an `acquire` whose submission failed.
    pub fn rollback(&self, ticket: SlotTicket) {
        let mut state = self.state.lock();
        if ticket.epoch != state.epoch || state.in_flight == 0 {
            return;
        }
        state.available += 1;
        state.in_flight -= 1;
        state.tail = (state.tail + self.capacity - 1) % self.capacity;
        state.submitted -= 1;
        self.changed.notify_all();
    }

    /// Record that the device finished playing `ticket`.
    ///
    /// Returns false if the ticket predates the last reset.
    pub fn complete(&self, ticket: SlotTicket) -> bool {
        let mut state = self.state.lock();
        if ticket.epoch != state.epoch {
            trace!("Ignoring stale completion for slot {}", ticket.slot);
            return false;
        }
        if state.in_flight == 0 {
            warn!("Completion for slot {} with nothing in flight", ticket.slot);
            return false;
        }
        if ticket.slot != state.head {
            warn!(
                "Out-of-order completion: slot {} while head is {}",
                ticket.slot, state.head
            );
        }

        state.head = (state.head + 1) % self.capacity;
        state.available = (state.available + 1).min(self.capacity);
        state.in_flight -= 1;
        state.completed += 1;
        self.changed.notify_all();
        true
    }

    /// Return to full capacity with both cursors at zero and start a new epoch.
    pub fn restore(&self) {
        let mut state = self.state.lock();
        state.available = self.capacity;
        state.in_flight = 0;
        state.head = 0;
        state.tail = 0;
        state.epoch += 1;
        self.changed.notify_all();
    }

    /// Block until nothing is in flight.
    ///
    /// # Errors
    /// `Cancelled` if cancelled while slots are still in flight.
    pub fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        while state.in_flight > 0 && !state.cancelled {
            self.changed.wait(&mut state);
        }
        if state.in_flight > 0 {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Wake every waiter with `Cancelled`; sticky.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.changed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            available: state.available,
            in_flight: state.in_flight,
            head: state.head,
            tail: state.tail,
            buffer_count: self.capacity,
            submitted: state.submitted,
            completed: state.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn assert_invariant(sem: &SlotSemaphore) {
        let stats = sem.stats();
        assert_eq!(stats.available + stats.in_flight, stats.buffer_count);
        assert!(stats.available <= stats.buffer_count);
    }

    #[test]
    fn test_acquire_advances_tail() {
        let sem = SlotSemaphore::new(3);
        let a = sem.acquire().unwrap();
        let b = sem.acquire().unwrap();
        assert_eq!((a.slot, b.slot), (0, 1));
        let stats = sem.stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.tail, 2);
        assert_invariant(&sem);
    }

    #[test]
    fn test_complete_advances_head_and_wraps() {
        let sem = SlotSemaphore::new(2);
        for expected_slot in [0, 1, 0, 1, 0] {
            let ticket = sem.acquire().unwrap();
            assert_eq!(ticket.slot, expected_slot);
            assert!(sem.complete(ticket));
            assert_invariant(&sem);
        }
        let stats = sem.stats();
        assert_eq!(stats.head, 1);
        assert_eq!(stats.tail, 1);
        assert_eq!(stats.completed, 5);
    }

    #[test]
    fn test_stale_completion_ignored_after_restore() {
        let sem = SlotSemaphore::new(2);
        let old = sem.acquire().unwrap();
        sem.restore();
        assert!(!sem.complete(old));
        let stats = sem.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!((stats.head, stats.tail), (0, 0));
    }

    #[test]
    fn test_rollback() {
        let sem = SlotSemaphore::new(2);
        let ticket = sem.acquire().unwrap();
        sem.rollback(ticket);
        let stats = sem.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.tail, 0);
        assert_eq!(stats.submitted, 0);
    }

    #[test]
    fn test_acquire_blocks_until_completion() {
        let sem = Arc::new(SlotSemaphore::new(2));
        let first = sem.acquire().unwrap();
        sem.acquire().unwrap();

        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.acquire())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        sem.complete(first);
        let ticket = waiter.join().unwrap().unwrap();
        assert_eq!(ticket.slot, 0);
        assert_invariant(&sem);
    }

    #[test]
    fn test_cancel_wakes_blocked_acquire_and_drain() {
        let sem = Arc::new(SlotSemaphore::new(2));
        sem.acquire().unwrap();
        sem.acquire().unwrap();

        let acquirer = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.acquire())
        };
        let drainer = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait_idle())
        };
        thread::sleep(Duration::from_millis(20));
        sem.cancel();

        assert!(matches!(acquirer.join().unwrap(), Err(Error::Cancelled)));
        assert!(matches!(drainer.join().unwrap(), Err(Error::Cancelled)));
        assert!(sem.is_cancelled());
    }

    #[test]
    fn test_wait_idle_returns_when_empty() {
        let sem = SlotSemaphore::new(3);
        sem.wait_idle().unwrap();
        sem.cancel();
        // Nothing in flight: draining a cancelled semaphore still succeeds
        sem.wait_idle().unwrap();
    }
}
