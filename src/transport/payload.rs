//! Tagged payload classification
//!
//! The firmware prefixes binary frames with a short ASCII tag followed by a
//! hex dump. This module only recognises the tag; decoding the hex is left to
//! whoever consumes the frame.

use super::CONNECTION_TERMINATED;
use crate::config::defaults::keys;
use crate::config::SettingsStore;

/// Line prefixes of the tagged frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPrefixes {
    pub config: String,
    pub audio: String,
    pub mel: String,
}

impl Default for PayloadPrefixes {
    fn default() -> Self {
        Self {
            config: "CFG:HEX:".to_string(),
            audio: "SND:HEX:".to_string(),
            mel: "MEL:HEX:".to_string(),
        }
    }
}

impl PayloadPrefixes {
    /// Read the prefixes from the settings, keeping defaults for missing keys
    pub fn from_settings(settings: &SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            config: settings
                .get_text(keys::NUCLEO_CONFIG_PREFIX)
                .unwrap_or(defaults.config),
            audio: settings.get_text(keys::AUDIO_PREFIX).unwrap_or(defaults.audio),
            mel: settings.get_text(keys::MEL_PREFIX).unwrap_or(defaults.mel),
        }
    }
}

/// What a received line carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind<'a> {
    /// Board configuration frame, with the text after the prefix
    Config(&'a str),
    /// Audio samples frame
    Audio(&'a str),
    /// Mel spectrogram frame
    Mel(&'a str),
    /// The transport's disconnect sentinel
    Terminated,
    /// Anything else
    Text(&'a str),
}

impl<'a> PayloadKind<'a> {
    /// Classify `line` by its prefix
    ///
    /// Empty prefixes never match.
    pub fn classify(line: &'a str, prefixes: &PayloadPrefixes) -> Self {
        if line == CONNECTION_TERMINATED {
            return PayloadKind::Terminated;
        }

        let strip = |prefix: &str| {
            if prefix.is_empty() {
                None
            } else {
                line.strip_prefix(prefix)
            }
        };

        if let Some(rest) = strip(&prefixes.config) {
            PayloadKind::Config(rest)
        } else if let Some(rest) = strip(&prefixes.audio) {
            PayloadKind::Audio(rest)
        } else if let Some(rest) = strip(&prefixes.mel) {
            PayloadKind::Mel(rest)
        } else {
            PayloadKind::Text(line)
        }
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            PayloadKind::Config(_) => "config",
            PayloadKind::Audio(_) => "audio",
            PayloadKind::Mel(_) => "mel",
            PayloadKind::Terminated => "terminated",
            PayloadKind::Text(_) => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::default_store;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_classify_default_prefixes() {
        let prefixes = PayloadPrefixes::default();
        assert_eq!(
            PayloadKind::classify("CFG:HEX:0102", &prefixes),
            PayloadKind::Config("0102")
        );
        assert_eq!(
            PayloadKind::classify("SND:HEX:", &prefixes),
            PayloadKind::Audio("")
        );
        assert_eq!(
            PayloadKind::classify("MEL:HEX:zz", &prefixes),
            PayloadKind::Mel("zz")
        );
        assert_eq!(
            PayloadKind::classify(CONNECTION_TERMINATED, &prefixes),
            PayloadKind::Terminated
        );
        assert_eq!(
            PayloadKind::classify("mel:hex:00", &prefixes),
            PayloadKind::Text("mel:hex:00")
        );
    }

    #[test]
    fn test_prefixes_follow_settings() {
        let store = default_store(Path::new("/tmp/uart")).unwrap();
        store.update([
            (keys::MEL_PREFIX, json!("DF:HEX:")),
            (keys::AUDIO_PREFIX, json!("")),
        ]);

        let prefixes = PayloadPrefixes::from_settings(&store);
        assert_eq!(prefixes.mel, "DF:HEX:");
        assert_eq!(
            PayloadKind::classify("DF:HEX:abcd", &prefixes).label(),
            "mel"
        );
        assert_eq!(PayloadKind::classify("x", &prefixes), PayloadKind::Text("x"));
    }
}
