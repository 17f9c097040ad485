//! Transport Worker Thread Implementation
//!
//! This module contains the loop that runs in the `serial-transport` thread
//! while a connection is open. It communicates with the owning
//! [`SerialTransport`](super::SerialTransport) through crossbeam channels and
//! the [`Shared`] block.
//!
//! # Loop body
//!
//! Every iteration, until the running flag is cleared, the link fails or a
//! newer connection replaces this one:
//!
//! 1. **Liveness**: ask the link how many bytes are waiting. An error means
//!    the device is gone; a missing link means `stop()` closed it.
//! 2. **Writes**: when `serial_allow_write` is set, drain the queued messages
//!    that were present at the start of the drain, in FIFO order.
//! 3. **Reads**: when bytes are pending and `serial_freeze` is not set, read
//!    one line, decode it as ASCII and emit it.
//! 4. Sleep for [`POLL_INTERVAL`].
//!
//! Settings are read live, so toggling the write or freeze flag takes effect
//! on the next iteration without reconnecting.

use super::{Shared, TransportEvent, TransportState, CONNECTION_TERMINATED};
use crate::config::defaults::keys;
use crate::config::SettingsStore;
use crate::error::{ConsoleError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Sleep between two loop iterations
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Longest line read in one go
pub const MAX_LINE_LEN: usize = 8192;

/// Consecutive undecodable lines before the connection is considered broken
pub const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 32;

/// What the loop should do after one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    /// The link was closed by `stop()`
    Closed,
    /// Unrecoverable failure, with a message for the user
    Fault(String),
}

/// Decode a raw line as ASCII and trim surrounding whitespace
pub fn decode_line(raw: &[u8]) -> Result<String> {
    if let Some(position) = raw.iter().position(|b| !b.is_ascii()) {
        return Err(ConsoleError::Decode {
            position,
            byte: raw[position],
        });
    }
    let text: String = raw.iter().map(|&b| char::from(b)).collect();
    Ok(text.trim().to_string())
}

/// The worker that owns the read/write loop of one connection
pub(crate) struct TransportWorker {
    settings: SettingsStore,
    shared: Arc<Shared>,
    write_rx: Receiver<String>,
    event_tx: Sender<TransportEvent>,
    /// Dropped when the worker exits, which wakes `stop()`
    _done: Sender<()>,
    /// Connection this worker serves, see [`Shared::generation`]
    generation: u64,
    consecutive_decode_errors: u32,
}

impl TransportWorker {
    pub(crate) fn new(
        settings: SettingsStore,
        shared: Arc<Shared>,
        write_rx: Receiver<String>,
        event_tx: Sender<TransportEvent>,
        done: Sender<()>,
        generation: u64,
    ) -> Self {
        Self {
            settings,
            shared,
            write_rx,
            event_tx,
            _done: done,
            generation,
            consecutive_decode_errors: 0,
        }
    }

    /// Run the loop until stopped or faulted, then clean up
    pub(crate) fn run(mut self) {
        tracing::info!("Serial transport worker started");

        let outcome = loop {
            if !self.is_current() {
                break Step::Closed;
            }
            match self.step() {
                Step::Continue => std::thread::sleep(POLL_INTERVAL),
                other => break other,
            }
        };

        if !self.shared.is_generation(self.generation) {
            // Detached by `stop()` and replaced by a newer connection
            tracing::info!("Stale serial transport worker exiting");
            return;
        }

        match outcome {
            Step::Fault(message) => {
                self.report_error(&message);
                self.shared.set_state(TransportState::Faulted);
                self.cleanup();
                self.emit(TransportEvent::LineReceived(CONNECTION_TERMINATED.to_string()));
            }
            _ => self.cleanup(),
        }

        tracing::info!("Serial transport worker stopped");
    }

    /// Still running and not replaced by a newer connection
    fn is_current(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && self.shared.is_generation(self.generation)
    }

    /// One iteration of the loop body, without the sleep
    pub(crate) fn step(&mut self) -> Step {
        let pending = {
            let mut guard = self.shared.link.lock();
            let Some(link) = guard.as_mut().filter(|_| self.shared.is_generation(self.generation)) else {
                return Step::Closed;
            };
            match link.bytes_to_read() {
                Ok(pending) => pending,
                Err(e) => return Step::Fault(format!("Serial port disconnected unexpectedly: {}", e)),
            }
        };

        if self.settings.get_bool(keys::SERIAL_ALLOW_WRITE).unwrap_or(false) {
            if let Step::Closed = self.drain_writes() {
                return Step::Closed;
            }
        }

        if pending > 0 && !self.settings.get_bool(keys::SERIAL_FREEZE).unwrap_or(false) {
            return self.read_one_line();
        }

        Step::Continue
    }

    /// Write every message queued before this call
    fn drain_writes(&mut self) -> Step {
        let queued = self.write_rx.len();
        for _ in 0..queued {
            if !self.is_current() {
                return Step::Closed;
            }
            let Ok(message) = self.write_rx.try_recv() else {
                break;
            };
            if !message.is_ascii() {
                tracing::warn!("Dropping non-ASCII message {:?}", message);
                continue;
            }

            let mut guard = self.shared.link.lock();
            let Some(link) = guard.as_mut().filter(|_| self.shared.is_generation(self.generation)) else {
                return Step::Closed;
            };
            match link.write_all(message.as_bytes()) {
                Ok(()) => {
                    tracing::debug!("Wrote {:?}", message);
                    self.shared.stats.lock().bytes_written += message.len() as u64;
                }
                Err(e) => {
                    tracing::warn!("Failed to write {:?}: {}", message, e);
                    self.shared.stats.lock().write_errors += 1;
                }
            }
        }
        Step::Continue
    }

    fn read_one_line(&mut self) -> Step {
        let raw = {
            let mut guard = self.shared.link.lock();
            let Some(link) = guard.as_mut().filter(|_| self.shared.is_generation(self.generation)) else {
                return Step::Closed;
            };
            match link.read_line(MAX_LINE_LEN) {
                Ok(raw) => raw,
                Err(e) => return Step::Fault(format!("Serial port error: {}", e)),
            }
        };

        if !self.is_current() {
            return Step::Closed;
        }
        if raw.is_empty() {
            return Step::Continue;
        }

        match decode_line(&raw) {
            Ok(line) => {
                self.consecutive_decode_errors = 0;
                {
                    let mut stats = self.shared.stats.lock();
                    stats.lines_received += 1;
                    stats.bytes_received += raw.len() as u64;
                }
                tracing::trace!("Received {:?}", line);
                self.emit(TransportEvent::LineReceived(line));
                Step::Continue
            }
            Err(e) => {
                self.consecutive_decode_errors += 1;
                self.shared.stats.lock().decode_errors += 1;
                tracing::warn!("Dropping undecodable line ({} bytes): {}", raw.len(), e);

                if self.consecutive_decode_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                    Step::Fault(format!(
                        "Serial port error: {} consecutive undecodable lines",
                        self.consecutive_decode_errors
                    ))
                } else {
                    Step::Continue
                }
            }
        }
    }

    /// Single reporting point for fatal worker failures
    fn report_error(&self, message: &str) {
        tracing::error!("{}", message);
        self.emit(TransportEvent::Error(message.to_string()));
    }

    /// Release the link, drop queued writes and report the disconnection
    fn cleanup(&mut self) {
        {
            let mut slot = self.shared.link.lock();
            if self.shared.is_generation(self.generation) {
                drop(slot.take());
            }
        }

        let dropped = self.write_rx.try_iter().count();
        if dropped > 0 {
            tracing::debug!("Discarded {} queued message(s)", dropped);
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.set_state(TransportState::Disconnected);
        self.emit(TransportEvent::StateChanged { connected: false });
    }

    fn emit(&self, event: TransportEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No event receiver left");
        }
    }
}
