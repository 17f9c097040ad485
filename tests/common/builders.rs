//! Test data builders for creating test objects

use serde_json::{json, Value};
use std::path::Path;
use uart_console::config::defaults::{default_store, keys, NO_PORT_PLACEHOLDER};
use uart_console::SettingsStore;

/// Builder for settings stores pre-configured for transport tests
pub struct SettingsBuilder {
    port: Option<String>,
    overrides: Vec<(&'static str, Value)>,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            port: None,
            overrides: Vec::new(),
        }
    }

    /// Select a port label after the placeholder
    pub fn port(mut self, label: &str) -> Self {
        self.port = Some(label.to_string());
        self
    }

    pub fn allow_write(mut self, allow: bool) -> Self {
        self.overrides.push((keys::SERIAL_ALLOW_WRITE, json!(allow)));
        self
    }

    pub fn freeze(mut self, freeze: bool) -> Self {
        self.overrides.push((keys::SERIAL_FREEZE, json!(freeze)));
        self
    }

    pub fn baud(mut self, baud: u32) -> Self {
        self.overrides.push((keys::SERIAL_BAUD_RATE, json!(baud)));
        self
    }

    pub fn build(self) -> SettingsStore {
        let store = default_store(Path::new("/tmp/uart-console-tests")).unwrap();
        let mut batch = self.overrides;
        if let Some(label) = self.port {
            batch.push((keys::SERIAL_PORT, json!([1, [NO_PORT_PLACEHOLDER, label]])));
        }
        let outcome = store.update(batch);
        assert!(outcome.report().unwrap().rejected.is_empty());
        store
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_builder() {
        let store = SettingsBuilder::new()
            .port("/dev/mock0 - Mock")
            .allow_write(true)
            .baud(9600)
            .build();

        assert_eq!(store.choice_label(keys::SERIAL_PORT).as_deref(), Some("/dev/mock0 - Mock"));
        assert_eq!(store.get_bool(keys::SERIAL_ALLOW_WRITE), Some(true));
        assert_eq!(store.get_int(keys::SERIAL_BAUD_RATE), Some(9600));
    }
}
