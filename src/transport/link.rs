//! SerialLink trait for a unified serial interface
//!
//! This module provides the seam between the transport worker and the
//! physical port. The worker only ever talks to a `Box<dyn SerialLink>`, so
//! real ports (via the `serialport` crate) and in-memory links for testing
//! are interchangeable.

use crate::config::defaults::{keys, NO_PORT_PLACEHOLDER};
use crate::config::SettingsStore;
use crate::error::{ConsoleError, Result};
use std::io;
use std::time::Duration;

/// Read timeout used when the `serial_timeout` setting is missing or invalid
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Unified interface for serial links
///
/// Implementations must be `Send` so the transport can move the link into
/// its worker thread.
pub trait SerialLink: Send {
    /// Number of bytes waiting in the input buffer
    ///
    /// Any error is treated by the transport as a lost connection.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Read up to and including the next `\n`, at most `max_len` bytes
    ///
    /// Returns whatever was read when the link's timeout expires, which may
    /// be an empty buffer.
    fn read_line(&mut self, max_len: usize) -> io::Result<Vec<u8>>;

    /// Write all bytes of `data`
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Parameters used to open a link, captured at connect time
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Device name, e.g. `/dev/ttyACM0` or `COM3`
    pub port: String,
    /// Baud rate in bps
    pub baud_rate: u32,
    /// Read timeout
    pub timeout: Duration,
}

impl ConnectionParams {
    /// Read the connection parameters from the settings store
    ///
    /// The `serial_port` choice holds labels of the form
    /// `"<device> - <description>"`; only the device part is used. Selecting
    /// the placeholder entry yields [`ConsoleError::NoPortSelected`].
    pub fn from_settings(settings: &SettingsStore) -> Result<Self> {
        let label = settings.choice_label(keys::SERIAL_PORT).unwrap_or_default();
        let port = port_from_label(&label).ok_or(ConsoleError::NoPortSelected)?;

        let baud_rate = settings
            .get_int(keys::SERIAL_BAUD_RATE)
            .and_then(|b| u32::try_from(b).ok())
            .filter(|&b| b > 0)
            .ok_or_else(|| ConsoleError::Config("serial_baud_rate must be a positive integer".to_string()))?;

        let timeout = settings
            .get_float(keys::SERIAL_TIMEOUT)
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self {
            port,
            baud_rate,
            timeout,
        })
    }
}

/// Extract the device name from a port label
///
/// Returns `None` for the placeholder and for blank labels.
pub fn port_from_label(label: &str) -> Option<String> {
    if label == NO_PORT_PLACEHOLDER {
        return None;
    }
    let device = label.split(" - ").next().unwrap_or(label).trim();
    if device.is_empty() {
        None
    } else {
        Some(device.to_string())
    }
}

/// Something that can open a [`SerialLink`]
pub trait LinkOpener: Send + Sync {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>>;
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl LinkOpener for SystemOpener {
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>> {
        let link = super::serial_link::SystemSerialLink::open(params)?;
        Ok(Box::new(link))
    }
}
