//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};
use uart_console::TransportEvent;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Wait until `want` arrives, returning every event seen on the way
pub fn wait_for_event(
    events: &Receiver<TransportEvent>,
    want: &TransportEvent,
) -> Option<Vec<TransportEvent>> {
    let deadline = Instant::now() + test_timeout();
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(20)) {
            let done = &event == want;
            seen.push(event);
            if done {
                return Some(seen);
            }
        }
    }
    None
}

/// Collect received lines until `count` lines arrived or the timeout expires
pub fn collect_lines(events: &Receiver<TransportEvent>, count: usize) -> Vec<String> {
    let deadline = Instant::now() + test_timeout();
    let mut lines = Vec::new();
    while lines.len() < count && Instant::now() < deadline {
        if let Ok(TransportEvent::LineReceived(line)) = events.recv_timeout(Duration::from_millis(20)) {
            lines.push(line);
        }
    }
    lines
}

/// Poll `condition` until it holds or the timeout expires
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
