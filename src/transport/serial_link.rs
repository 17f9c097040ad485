//! `serialport` backed link for real hardware
//!
//! Wraps a `Box<dyn serialport::SerialPort>` and implements line reads on top
//! of its timeout-based `Read`.

use super::link::{ConnectionParams, SerialLink};
use crate::error::{ConsoleError, Result};
use serialport::SerialPort;
use std::io::{self, Read, Write};

/// A serial port opened through the OS
pub struct SystemSerialLink {
    port: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SystemSerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSerialLink")
            .field("name", &self.port.name())
            .finish()
    }
}

impl SystemSerialLink {
    /// Open the port described by `params`
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        tracing::debug!(
            "Opening {} at {} bps (timeout {:?})",
            params.port,
            params.baud_rate,
            params.timeout
        );
        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(params.timeout)
            .open()
            .map_err(|source| ConsoleError::Open {
                port: params.port.clone(),
                source,
            })?;

        Ok(Self { port })
    }
}

impl SerialLink for SystemSerialLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(io::Error::from)
    }

    fn read_line(&mut self, max_len: usize) -> io::Result<Vec<u8>> {
        read_line_from(&mut self.port, max_len)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }
}

/// Byte-wise line read that stops at `\n`, `max_len` or a read timeout
///
/// Bytes are pulled one at a time so nothing past the newline is consumed;
/// the rest stays in the OS buffer and keeps `bytes_to_read` accurate.
pub(crate) fn read_line_from<R: Read + ?Sized>(reader: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < max_len {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(line)
}
