//! Configuration module for the UART console
//!
//! All runtime configuration lives in one [`SettingsStore`]: a fixed set of
//! named [`SettingBox`] cells that the front end, the logger and the serial
//! transport share through a cloned handle.
//!
//! - [`setting_box`] - the typed cells and their coercion rules
//! - [`store`] - the thread-safe store, observers, import/export
//! - [`defaults`] - the application's key set and default values
//!
//! # App Data Location
//!
//! The default settings file and log file live in the platform data directory:
//! - **Linux**: `~/.local/share/be.uclouvain.uart-console/`
//! - **macOS**: `~/Library/Application Support/be.uclouvain.uart-console/`
//! - **Windows**: `%APPDATA%\be.uclouvain.uart-console\`
//!
//! # Example
//!
//! ```ignore
//! use uart_console::config::{default_settings_path, defaults, ensure_app_data_dir};
//!
//! let dir = ensure_app_data_dir()?;
//! let store = defaults::default_store(&dir)?;
//! store.import_file(default_settings_path().unwrap());
//! ```

pub mod defaults;
pub mod setting_box;
pub mod store;

pub use setting_box::{Rejection, Scalar, SettingBox};
pub use store::{
    is_identity_key, Observer, SettingsSnapshot, SettingsStore, SettingsStoreBuilder,
    UpdateOutcome, UpdateReport, IDENTITY_PREFIX,
};

use crate::error::{ConsoleError, Result};
use std::path::PathBuf;

/// Application identifier for data directories
pub const APP_ID: &str = "be.uclouvain.uart-console";

/// Default settings filename
pub const SETTINGS_FILE: &str = "settings.json";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        ConsoleError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ConsoleError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default settings file
pub fn default_settings_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(SETTINGS_FILE))
}

// ==================== Tests ====================
