//! # UART Console: serial transport and observable settings
//!
//! Core of a lab tool that talks to an embedded board over a UART link. The
//! board streams text lines, some of them tagged hex frames (configuration,
//! audio samples, mel spectrograms); the host can write text back.
//!
//! ## Architecture
//!
//! - **Config**: a thread-safe [`SettingsStore`] of typed cells with batch
//!   updates, observers and JSON import/export
//! - **Transport**: a [`SerialTransport`] running the read/write loop in a
//!   background thread, reporting through a crossbeam event channel
//! - **Logging**: `tracing` subscriber driven by the `logging_*` settings
//!
//! ## Configuration
//!
//! Settings are persisted as a JSON object in the platform data directory
//! under `be.uclouvain.uart-console`.
//!
//! ## Example
//!
//! ```ignore
//! use uart_console::{config::defaults, SerialTransport, TransportEvent};
//!
//! let dir = uart_console::config::ensure_app_data_dir()?;
//! let settings = defaults::default_store(&dir)?;
//! uart_console::transport::refresh_port_choice(
//!     &settings,
//!     &uart_console::transport::available_port_labels(),
//! );
//!
//! let transport = SerialTransport::new(settings.clone());
//! transport.connect()?;
//! for event in transport.events().iter() {
//!     if let TransportEvent::LineReceived(line) = event {
//!         println!("{}", line);
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod transport;

// Re-export commonly used types
pub use config::{SettingBox, SettingsStore, UpdateOutcome};
pub use error::{ConsoleError, Result};
pub use transport::{SerialTransport, TransportEvent, TransportState, CONNECTION_TERMINATED};
