//! In-memory serial link for testing
//!
//! Provides a [`SerialLink`] that never touches hardware. The test (or the
//! `--mock` CLI mode) keeps a [`MockLinkHandle`] to feed incoming bytes,
//! inspect what was written and simulate faults while the transport worker
//! owns the link itself.
//!
//! # Example
//!
//! ```ignore
//! use uart_console::transport::mock_link::MockOpener;
//!
//! let opener = MockOpener::new();
//! let handle = opener.handle();
//! handle.push_line("CFG:HEX:0102");
//!
//! let transport = SerialTransport::with_opener(settings, opener);
//! transport.connect()?;
//! ```
//!
//! # Enabling
//!
//! The mock link is available in unit tests and when the `mock-link` feature
//! is enabled (on by default).

use super::link::{ConnectionParams, LinkOpener, SerialLink};
use crate::error::{ConsoleError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    incoming: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    invalidated: bool,
    fail_writes: bool,
    echo: bool,
    opened_with: Option<ConnectionParams>,
}

/// Control handle shared with every link opened by a [`MockOpener`]
#[derive(Debug, Clone, Default)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockLinkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `line` followed by `\n` for the device to "send"
    pub fn push_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.incoming.extend(line.as_bytes());
        state.incoming.push_back(b'\n');
    }

    /// Queue raw bytes, no terminator added
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes);
    }

    /// Bytes not yet consumed by the reader
    pub fn pending(&self) -> usize {
        self.state.lock().incoming.len()
    }

    /// Every buffer passed to `write_all`, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Written buffers as lossy text
    pub fn written_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .written
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    /// Simulate the device being unplugged
    pub fn invalidate(&self) {
        self.state.lock().invalidated = true;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Loop written lines back as incoming lines
    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Parameters of the most recent successful open
    pub fn opened_with(&self) -> Option<ConnectionParams> {
        self.state.lock().opened_with.clone()
    }
}

/// A [`SerialLink`] backed by a [`MockLinkHandle`]
#[derive(Debug, Clone)]
pub struct MockSerialLink {
    handle: MockLinkHandle,
}

impl MockSerialLink {
    pub fn new(handle: MockLinkHandle) -> Self {
        Self { handle }
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "mock device disconnected")
}

impl SerialLink for MockSerialLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let state = self.handle.state.lock();
        if state.invalidated {
            return Err(disconnected());
        }
        Ok(u32::try_from(state.incoming.len()).unwrap_or(u32::MAX))
    }

    fn read_line(&mut self, max_len: usize) -> io::Result<Vec<u8>> {
        let mut state = self.handle.state.lock();
        if state.invalidated {
            return Err(disconnected());
        }

        let mut line = Vec::new();
        while line.len() < max_len {
            let Some(byte) = state.incoming.pop_front() else {
                break;
            };
            line.push(byte);
            if byte == b'\n' {
                break;
            }
        }
        Ok(line)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.handle.state.lock();
        if state.invalidated {
            return Err(disconnected());
        }
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock write timeout"));
        }

        state.written.push(data.to_vec());
        if state.echo {
            state.incoming.extend(data);
            if data.last() != Some(&b'\n') {
                state.incoming.push_back(b'\n');
            }
        }
        Ok(())
    }
}

/// Opens [`MockSerialLink`]s that share one handle
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    handle: MockLinkHandle,
    fail: bool,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// An opener whose `open` always fails
    pub fn failing() -> Self {
        Self {
            handle: MockLinkHandle::new(),
            fail: true,
        }
    }

    pub fn handle(&self) -> MockLinkHandle {
        self.handle.clone()
    }
}

impl LinkOpener for MockOpener {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>> {
        if self.fail {
            return Err(ConsoleError::Open {
                port: params.port.clone(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "mock open failure"),
            });
        }

        {
            let mut state = self.handle.state.lock();
            state.invalidated = false;
            state.opened_with = Some(params.clone());
        }
        tracing::debug!("Opened mock link for {}", params.port);
        Ok(Box::new(MockSerialLink::new(self.handle.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params() -> ConnectionParams {
        ConnectionParams {
            port: "/dev/mock0".to_string(),
            baud_rate: 115_200,
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_reads_lines_in_order() {
        let handle = MockLinkHandle::new();
        handle.push_line("first");
        handle.push_bytes(b"second\nthird");
        let mut link = MockSerialLink::new(handle.clone());

        assert_eq!(link.bytes_to_read().unwrap(), 19);
        assert_eq!(link.read_line(64).unwrap(), b"first\n");
        assert_eq!(link.read_line(64).unwrap(), b"second\n");
        assert_eq!(link.read_line(64).unwrap(), b"third");
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_echo_and_failures() {
        let handle = MockLinkHandle::new();
        handle.set_echo(true);
        let mut link = MockSerialLink::new(handle.clone());

        link.write_all(b"ping").unwrap();
        assert_eq!(link.read_line(64).unwrap(), b"ping\n");
        assert_eq!(handle.written_lines(), vec!["ping"]);

        handle.set_fail_writes(true);
        assert!(link.write_all(b"pong").is_err());

        handle.invalidate();
        assert!(link.bytes_to_read().is_err());
    }

    #[test]
    fn test_opener_records_params() {
        let opener = MockOpener::new();
        let handle = opener.handle();
        assert!(opener.open(&params()).is_ok());
        assert_eq!(handle.opened_with(), Some(params()));

        let result = MockOpener::failing().open(&params());
        assert!(matches!(result, Err(ConsoleError::Open { .. })));
    }
}
