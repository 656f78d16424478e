//! Polling waiters for asynchronous outcomes

use gsnd_common::PlayerEvent;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Receive events until one matches `predicate`; lagged events are skipped
pub fn wait_for_event(
    rx: &mut Receiver<PlayerEvent>,
    timeout: Duration,
    mut predicate: impl FnMut(&PlayerEvent) -> bool,
) -> Option<PlayerEvent> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) if predicate(&event) => return Some(event),
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(2)),
            Err(TryRecvError::Closed) => return None,
        }
    }
    None
}

/// Receive every event up to and including the first that matches `last`
pub fn collect_events(
    rx: &mut Receiver<PlayerEvent>,
    timeout: Duration,
    mut last: impl FnMut(&PlayerEvent) -> bool,
) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    wait_for_event(rx, timeout, |event| {
        events.push(event.clone());
        last(event)
    });
    events
}
