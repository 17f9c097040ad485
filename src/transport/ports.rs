//! Serial port discovery
//!
//! Lists the ports known to the OS and keeps the `serial_port` choice in the
//! settings in sync with them.

use crate::config::defaults::{keys, NO_PORT_PLACEHOLDER};
use crate::config::{SettingsStore, UpdateOutcome};
use serde_json::json;
use serialport::{SerialPortInfo, SerialPortType};

/// Labels of the available ports, `"<device> - <description>"`
///
/// Enumeration errors are logged and yield an empty list.
pub fn available_port_labels() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.iter().map(port_label).collect(),
        Err(e) => {
            tracing::warn!("Failed to list serial ports: {}", e);
            Vec::new()
        }
    }
}

/// Human readable label for one port
pub fn port_label(info: &SerialPortInfo) -> String {
    let description = match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .or_else(|| usb.manufacturer.clone())
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    };
    format!("{} - {}", info.port_name, description)
}

/// Pick the index of the `serial_port` choice after a refresh
///
/// `options` starts with the placeholder. A previously selected port that is
/// still listed stays selected; otherwise `auto_select` is used when it is a
/// valid index, falling back to the first real port.
pub fn select_port_index(
    options: &[String],
    previous: Option<(usize, &str)>,
    auto_select: Option<i64>,
) -> usize {
    if options.len() <= 1 {
        return 0;
    }

    if let Some((old_index, old_label)) = previous {
        if old_index != 0 {
            if let Some(i) = options.iter().position(|o| o == old_label) {
                return i;
            }
        }
    }

    auto_select
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < options.len())
        .unwrap_or(1)
}

/// Rebuild the `serial_port` choice from `labels`
pub fn refresh_port_choice(store: &SettingsStore, labels: &[String]) -> UpdateOutcome {
    let previous = store.get(keys::SERIAL_PORT).and_then(|setting| {
        setting
            .as_choice()
            .and_then(|(index, options)| options.get(index).map(|label| (index, label.clone())))
    });

    let mut options = Vec::with_capacity(labels.len() + 1);
    options.push(NO_PORT_PLACEHOLDER.to_string());
    options.extend(labels.iter().cloned());

    let index = select_port_index(
        &options,
        previous.as_ref().map(|(i, label)| (*i, label.as_str())),
        store.get_int(keys::SERIAL_AUTO_SELECT_INDEX),
    );
    tracing::debug!("Found {} serial port(s), selecting {}", labels.len(), options[index]);

    store.update([(
        keys::SERIAL_PORT,
        json!({ "index": index, "options": options }),
    )])
}
