//! Serial transport
//!
//! A [`SerialTransport`] owns at most one open serial connection and the
//! background thread that serves it. Callers talk to it through three
//! non-blocking paths:
//!
//! - [`SerialTransport::send`] enqueues outbound text on an unbounded queue
//! - [`SerialTransport::events`] hands out the receiving end of the event
//!   channel ([`TransportEvent`])
//! - [`SerialTransport::stop`] asks the worker to finish and waits a bounded
//!   amount of time for it
//!
//! # State machine
//!
//! ```text
//! Disconnected --connect()--> Connecting --open ok--> Connected
//!                                 |                     |    |
//!                             open fails            stop()  I/O fault
//!                                 v                     v    v
//!                           Disconnected      Disconnecting  Faulted
//!                                                   \        /
//!                                                    cleanup
//!                                                      v
//!                                                 Disconnected
//! ```
//!
//! A fault emits `Error`, then `StateChanged { connected: false }`, then the
//! [`CONNECTION_TERMINATED`] sentinel line, in that order.

pub mod link;
#[cfg(any(test, feature = "mock-link"))]
pub mod mock_link;
pub mod payload;
pub mod ports;
pub mod serial_link;
mod worker;

pub use link::{port_from_label, ConnectionParams, LinkOpener, SerialLink, SystemOpener};
pub use payload::{PayloadKind, PayloadPrefixes};
pub use ports::{available_port_labels, refresh_port_choice};
pub use serial_link::SystemSerialLink;
pub use worker::{decode_line, MAX_CONSECUTIVE_DECODE_ERRORS, MAX_LINE_LEN, POLL_INTERVAL};

use crate::config::SettingsStore;
use crate::error::{ConsoleError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use worker::TransportWorker;

/// Line emitted after a fault to tell consumers the connection is gone
pub const CONNECTION_TERMINATED: &str = "CONNECTION_TERMINATED";

/// How long `stop()` waits for the worker before escalating
pub const STOP_TIMEOUT: Duration = Duration::from_millis(1000);

/// Extra wait after the escalation warning, before detaching the worker
pub const FORCE_STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "serial-transport";

/// Events sent from the transport to its consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A decoded, trimmed line (or [`CONNECTION_TERMINATED`])
    LineReceived(String),
    /// The connection opened or closed
    StateChanged { connected: bool },
    /// A fatal worker error, followed by a disconnection
    Error(String),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Faulted,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Disconnected => write!(f, "Disconnected"),
            TransportState::Connecting => write!(f, "Connecting"),
            TransportState::Connected => write!(f, "Connected"),
            TransportState::Disconnecting => write!(f, "Disconnecting"),
            TransportState::Faulted => write!(f, "Faulted"),
        }
    }
}

/// Counters for the current connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub lines_received: u64,
    pub bytes_received: u64,
    pub bytes_written: u64,
    pub decode_errors: u64,
    pub write_errors: u64,
}

/// State shared between the transport handle and its worker
#[derive(Default)]
pub(crate) struct Shared {
    /// The open link; `None` once closed by `stop()` or cleanup
    pub(crate) link: Mutex<Option<Box<dyn SerialLink>>>,
    pub(crate) running: AtomicBool,
    /// Bumped by every `connect()`; a detached worker from an older
    /// connection sees the change and exits without touching the new one
    pub(crate) generation: AtomicU64,
    state: Mutex<TransportState>,
    pub(crate) stats: Mutex<TransportStats>,
}

impl Shared {
    pub(crate) fn is_generation(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) fn state(&self) -> TransportState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, new_state: TransportState) {
        let mut state = self.state.lock();
        if *state != new_state {
            tracing::debug!("Transport state {} -> {}", *state, new_state);
            *state = new_state;
        }
    }
}

struct WorkerHandle {
    thread: JoinHandle<()>,
    /// Disconnected once the worker has returned
    done_rx: Receiver<()>,
}

/// Owner of one serial connection and its worker thread
pub struct SerialTransport {
    settings: SettingsStore,
    opener: Arc<dyn LinkOpener>,
    shared: Arc<Shared>,
    write_tx: Sender<String>,
    write_rx: Receiver<String>,
    event_tx: Sender<TransportEvent>,
    event_rx: Receiver<TransportEvent>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

impl SerialTransport {
    /// Create a transport that opens real serial ports
    pub fn new(settings: SettingsStore) -> Self {
        Self::with_opener(settings, SystemOpener)
    }

    /// Create a transport with a custom link opener
    pub fn with_opener(settings: SettingsStore, opener: impl LinkOpener + 'static) -> Self {
        let (write_tx, write_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        Self {
            settings,
            opener: Arc::new(opener),
            shared: Arc::new(Shared::default()),
            write_tx,
            write_rx,
            event_tx,
            event_rx,
            worker: Mutex::new(None),
        }
    }

    /// Open the configured port and start the worker thread
    ///
    /// Fails without changing state when no port is selected or a worker is
    /// still running. When the port cannot be opened the state returns to
    /// `Disconnected` and no event is emitted.
    pub fn connect(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if self.shared.running.load(Ordering::SeqCst) && !handle.thread.is_finished() {
                return Err(ConsoleError::AlreadyConnected);
            }
        }
        if let Some(previous) = worker.take() {
            self.join_worker(previous, STOP_TIMEOUT);
            self.shared.running.store(false, Ordering::SeqCst);
            drop(self.shared.link.lock().take());
        }

        let params = ConnectionParams::from_settings(&self.settings)?;
        self.shared.set_state(TransportState::Connecting);
        tracing::info!("Connecting to {} at {} bps", params.port, params.baud_rate);

        let link = match self.opener.open(&params) {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("{}", e);
                self.shared.set_state(TransportState::Disconnected);
                return Err(e);
            }
        };

        let generation = {
            let mut slot = self.shared.link.lock();
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Some(link);
            generation
        };
        *self.shared.stats.lock() = TransportStats::default();
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(TransportState::Connected);
        self.emit(TransportEvent::StateChanged { connected: true });

        let (done_tx, done_rx) = bounded(1);
        let task = TransportWorker::new(
            self.settings.clone(),
            self.shared.clone(),
            self.write_rx.clone(),
            self.event_tx.clone(),
            done_tx,
            generation,
        );

        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || task.run());

        match spawned {
            Ok(thread) => {
                *worker = Some(WorkerHandle { thread, done_rx });
                tracing::info!("Connected to {}", params.port);
                Ok(())
            }
            Err(e) => {
                drop(self.shared.link.lock().take());
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.set_state(TransportState::Disconnected);
                self.emit(TransportEvent::StateChanged { connected: false });
                Err(ConsoleError::Io(e).with_context("Failed to spawn serial worker"))
            }
        }
    }

    /// Queue `data` for writing; empty input is ignored
    pub fn send(&self, data: impl AsRef<str>) {
        let data = data.as_ref();
        if data.is_empty() {
            return;
        }
        if self.write_tx.send(data.to_string()).is_err() {
            tracing::warn!("Write queue closed, dropping {:?}", data);
        }
    }

    /// Queue `data` as one line, appending the `\n` terminator if missing
    ///
    /// Empty input is ignored like in [`send`](Self::send).
    pub fn send_line(&self, data: impl AsRef<str>) {
        let data = data.as_ref();
        if data.is_empty() || data.ends_with('\n') {
            self.send(data);
        } else {
            self.send(format!("{}\n", data));
        }
    }

    /// Queue `data` if present and non-empty
    pub fn send_opt(&self, data: Option<&str>) {
        if let Some(data) = data {
            self.send(data);
        }
    }

    /// Number of messages waiting to be written
    pub fn queued(&self) -> usize {
        self.write_rx.len()
    }

    /// A receiver for transport events
    ///
    /// Every clone competes for the same events; use a single consumer.
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.event_rx.clone()
    }

    pub fn state(&self) -> TransportState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    pub fn stats(&self) -> TransportStats {
        *self.shared.stats.lock()
    }

    /// Stop the worker and close the port
    ///
    /// Idempotent and safe to call from any thread. Returns once the worker
    /// has exited or has been detached after the bounded wait.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.worker.lock().take() else {
            return true;
        };

        self.shared.running.store(false, Ordering::SeqCst);
        if self.state() == TransportState::Connected {
            self.shared.set_state(TransportState::Disconnecting);
        }

        // The worker holds the link for a whole line read, so waiting for it
        // counts against the stop budget
        let started = Instant::now();
        match self.shared.link.try_lock_for(STOP_TIMEOUT) {
            Some(mut link) => drop(link.take()),
            None => tracing::debug!("Serial link busy, leaving the close to the worker"),
        }

        if handle.thread.thread().id() == std::thread::current().id() {
            tracing::debug!("stop() called from the worker thread, not joining");
            return true;
        }

        self.join_worker(handle, STOP_TIMEOUT.saturating_sub(started.elapsed()));
        true
    }

    /// Wait up to `budget` for a worker to exit, then escalate and detach it
    fn join_worker(&self, handle: WorkerHandle, budget: Duration) {
        let WorkerHandle { thread, done_rx } = handle;

        let finished = match done_rx.recv_timeout(budget) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => {
                tracing::warn!(
                    "Serial worker did not stop within {:?}, forcing termination",
                    STOP_TIMEOUT
                );
                matches!(
                    done_rx.recv_timeout(FORCE_STOP_TIMEOUT),
                    Err(RecvTimeoutError::Disconnected)
                )
            }
        };

        if !finished {
            tracing::warn!("Serial worker still running, detaching it");
            return;
        }
        if thread.join().is_err() {
            tracing::error!("Serial worker panicked");
        }
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop();
    }
}
