//! Logging setup
//!
//! Builds the global `tracing` subscriber from the `logging_*` settings: an
//! `EnvFilter` (the `RUST_LOG` variable wins over the `logging_level`
//! setting), a console layer, and optionally a non-blocking file layer.

use crate::config::defaults::{keys, LOG_LEVELS};
use crate::config::SettingsStore;
use crate::error::{ConsoleError, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a level setting is available
pub const DEFAULT_FILTER: &str = "info,uart_console=debug";

/// Logging options taken from the settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// One of [`LOG_LEVELS`]
    pub level: Option<String>,
    /// Log file, when file logging is enabled
    pub file: Option<PathBuf>,
}

impl LogOptions {
    pub fn from_settings(settings: &SettingsStore) -> Self {
        let level = settings
            .choice_label(keys::LOGGING_LEVEL)
            .filter(|l| LOG_LEVELS.contains(&l.as_str()));
        let file = if settings.get_bool(keys::LOGGING_USE_FILE).unwrap_or(false) {
            settings.path(keys::LOGGING_FILE)
        } else {
            None
        };
        Self { level, file }
    }
}

/// Filter directives for a level setting
pub fn filter_directives(level: Option<&str>) -> String {
    match level {
        Some(level) => format!("info,uart_console={}", level),
        None => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for as long as the program logs.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(options.level.as_deref())));

    let (file_layer, guard) = match &options.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path.file_name().ok_or_else(|| {
                ConsoleError::Config(format!("Invalid log file path: {}", path.display()))
            })?;
            std::fs::create_dir_all(&dir)?;

            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| ConsoleError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::default_store;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_filter_directives() {
        assert_eq!(filter_directives(None), DEFAULT_FILTER);
        assert_eq!(filter_directives(Some("warn")), "info,uart_console=warn");
    }

    #[test]
    fn test_options_from_settings() {
        let store = default_store(Path::new("/tmp/uart")).unwrap();
        let options = LogOptions::from_settings(&store);
        assert_eq!(options.level.as_deref(), Some("debug"));
        assert_eq!(options.file, Some(PathBuf::from("/tmp/uart/uart_reader.log")));

        store.update([
            (keys::LOGGING_USE_FILE, json!(false)),
            (keys::LOGGING_LEVEL, json!(3)),
        ]);
        let options = LogOptions::from_settings(&store);
        assert_eq!(options.level.as_deref(), Some("warn"));
        assert_eq!(options.file, None);
    }
}
