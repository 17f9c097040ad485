//! Error handling for the UART console
//!
//! This module defines the crate error type and a Result alias used
//! throughout the settings store and the serial transport.

use thiserror::Error;

/// Main error type for UART console operations
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The `serial_port` setting still points at the placeholder entry
    #[error("No serial port selected")]
    NoPortSelected,

    /// A transport worker is already running for this instance
    #[error("Serial transport already connected")]
    AlreadyConnected,

    /// The serial port could not be opened
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// A received line is not valid ASCII text
    #[error("Invalid ASCII byte 0x{byte:02X} at position {position}")]
    Decode { position: usize, byte: u8 },

    /// Errors raised by a settings operation (bad key set, wrong shape)
    #[error("Settings error: {0}")]
    Settings(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings blob (de)serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ConsoleError>,
    },
}

impl ConsoleError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ConsoleError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for UART console operations
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ConsoleError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
