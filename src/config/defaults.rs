//! Default settings catalogue
//!
//! Defines the fixed key set of the application's [`SettingsStore`] and the
//! value each key starts with. Keys are grouped by prefix:
//!
//! - `app_*` - identity of the application (never exported)
//! - `logging_*` - console/file log output
//! - `gui_*`, `plot_*` - consumed by the plotting front end
//! - `serial_*` - transport configuration, read live by the worker
//! - `nucleo_*`, `audio_*`, `mel_*` - payload prefixes and capture options
//! - `classifier_*` - user classifier integration

use super::{SettingBox, SettingsStore};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// First entry of the `serial_port` choice, selected when no port is usable
pub const NO_PORT_PLACEHOLDER: &str = "-- No serial port --";

/// Log levels offered by the `logging_level` choice
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Setting keys read outside of the front end
pub mod keys {
    pub const APP_NAME: &str = "app_name";
    pub const APP_VERSION: &str = "app_version";

    pub const LOGGING_LEVEL: &str = "logging_level";
    pub const LOGGING_DATE_FORMAT: &str = "logging_date_format";
    pub const LOGGING_USE_FILE: &str = "logging_use_file";
    pub const LOGGING_FILE: &str = "logging_file";
    pub const LOGGING_FORMAT: &str = "logging_format";
    pub const LOGGING_FILE_MAX_SIZE: &str = "logging_file_max_size";
    pub const LOGGING_FILE_BACKUP_COUNT: &str = "logging_file_backup_count";

    pub const SERIAL_PORT: &str = "serial_port";
    pub const SERIAL_BAUD_RATE: &str = "serial_baud_rate";
    pub const SERIAL_TIMEOUT: &str = "serial_timeout";
    pub const SERIAL_ALLOW_WRITE: &str = "serial_allow_write";
    pub const SERIAL_FREEZE: &str = "serial_freeze";
    pub const SERIAL_AUTO_SELECT_INDEX: &str = "serial_auto_select_index";

    pub const NUCLEO_CONFIG_PREFIX: &str = "nucleo_config_serial_prefix";
    pub const AUDIO_PREFIX: &str = "audio_serial_prefix";
    pub const MEL_PREFIX: &str = "mel_serial_prefix";
}

/// Build the application store rooted at `app_folder`
///
/// Default file and folder settings point inside `app_folder`; nothing is
/// created on disk.
pub fn default_store(app_folder: &Path) -> Result<SettingsStore> {
    let choice = |index: usize, options: &[&str]| {
        // Literal option lists below are never empty
        SettingBox::choice(index, options.iter().copied())
            .unwrap_or_else(|| SettingBox::text(String::new()))
    };
    let at = |name: &str| -> PathBuf { app_folder.join(name) };

    SettingsStore::builder()
        // App identity
        .with("app_folder", SettingBox::folder(app_folder))
        .with(keys::APP_NAME, SettingBox::text("UART Console App for LELEC210x"))
        .with(keys::APP_VERSION, SettingBox::text(env!("CARGO_PKG_VERSION")))
        .with("app_author", SettingBox::text("Group E, 2024-2025"))
        .with("app_description", SettingBox::text("UART reader utilities."))
        // Logging
        .with(keys::LOGGING_LEVEL, choice(1, &LOG_LEVELS))
        .with(keys::LOGGING_DATE_FORMAT, SettingBox::text("%Y-%m-%d %H:%M:%S"))
        .with(keys::LOGGING_USE_FILE, SettingBox::bool(true))
        .with(keys::LOGGING_FILE, SettingBox::file(at("uart_reader.log")))
        // Kept for settings files shared with other tools; the file layer does not rotate
        .with(keys::LOGGING_FORMAT, SettingBox::text("[%(asctime)s] %(levelname)-9s: %(message)s"))
        .with(keys::LOGGING_FILE_MAX_SIZE, SettingBox::int(1024 * 1024))
        .with(keys::LOGGING_FILE_BACKUP_COUNT, SettingBox::int(3))
        // GUI
        .with("gui_update_rate", SettingBox::int(60))
        .with("gui_use_matplotlib_blit", SettingBox::bool(true))
        .with("gui_min_window_size", SettingBox::dimension(800, 600, true))
        .with("gui_default_window_size", SettingBox::dimension(640, 720, false))
        // Plotting
        .with("plot_name_prefix", SettingBox::text("plot"))
        .with("plot_name_postfix_timestamp", SettingBox::bool(true))
        .with("plot_save_types", choice(0, &["pdf", "png"]))
        .with("plot_save_all_types", SettingBox::bool(true))
        .with("plot_save_folder_base", SettingBox::folder(at("plots")))
        // Serial
        .with(keys::SERIAL_PORT, choice(0, &[NO_PORT_PLACEHOLDER]))
        .with(keys::SERIAL_BAUD_RATE, SettingBox::int(115_200))
        .with(keys::SERIAL_TIMEOUT, SettingBox::float(1.0))
        .with(keys::SERIAL_ALLOW_WRITE, SettingBox::bool(false))
        .with(keys::SERIAL_FREEZE, SettingBox::bool(false))
        .with(keys::SERIAL_AUTO_SELECT_INDEX, SettingBox::int(1))
        // Nucleo board
        .with(keys::NUCLEO_CONFIG_PREFIX, SettingBox::text("CFG:HEX:"))
        .with("nucleo_sample_rate", SettingBox::int(10_240))
        // Audio
        .with(keys::AUDIO_PREFIX, SettingBox::text("SND:HEX:"))
        .with("audio_folder", SettingBox::folder(at("audio")))
        .with("audio_file_name_prefix", SettingBox::text("audio"))
        .with("audio_file_types", choice(0, &["wav", "ogg", "mp3", "flac"]))
        .with("audio_file_freq", SettingBox::int(44_100))
        .with("audio_file_channels", SettingBox::int(1))
        .with("audio_file_dtype", SettingBox::text("int16"))
        .with("audio_file_save_numpy", SettingBox::bool(false))
        .with("audio_file_save_plots", SettingBox::bool(false))
        .with("audio_file_auto_save", SettingBox::bool(false))
        .with("audio_freeze", SettingBox::bool(false))
        // Mel spectrogram
        .with(keys::MEL_PREFIX, SettingBox::text("MEL:HEX:"))
        .with("mel_vector_size", SettingBox::int(20))
        .with("mel_vector_num", SettingBox::int(20))
        .with("mel_samples", SettingBox::int(512))
        .with("mel_history_max_mem", SettingBox::int(20))
        .with("mel_history_max_shown", SettingBox::int(10))
        .with("mel_autosave", SettingBox::bool(false))
        .with("mel_file_name_prefix", SettingBox::text("mel"))
        .with("mel_autosave_folder", SettingBox::folder(at("mel")))
        .with("mel_autosave_plots", SettingBox::bool(false))
        .with("mel_autosave_numpy", SettingBox::bool(false))
        .with("mel_autosave_clear", SettingBox::bool(false))
        .with("mel_freeze", SettingBox::bool(false))
        // User classifier
        .with("classifier_use", SettingBox::bool(false))
        .with("classifier_file_pickle", SettingBox::file(at("user_classifier.pkl")))
        .with("classifier_file_numpy", SettingBox::file(at("user_classifier.npy")))
        .with("classifier_file_auto_save", SettingBox::bool(false))
        .with("classifier_file_auto_save_mel", SettingBox::bool(true))
        .with("classifier_file_auto_save_plots", SettingBox::bool(false))
        .with("classifier_use_mel_history", SettingBox::bool(false))
        .with("classifier_history_max_shown", SettingBox::int(10))
        .build()
}
