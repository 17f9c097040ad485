//! Thread-safe, observable settings store
//!
//! The [`SettingsStore`] holds every named [`SettingBox`] of the application.
//! Its key set is fixed when it is built; afterwards values only change
//! through [`SettingsStore::update`], which applies a whole batch atomically
//! and then notifies every registered observer once.
//!
//! # Locking
//!
//! A single re-entrant lock protects the values, the observer table and the
//! in-progress flag. The lock is held for a complete batch, including observer
//! dispatch, so other threads never see half of a batch. Observers run on the
//! updating thread: they may read the store, register observers, or call
//! `update` again, in which case the nested call is dropped and reported as
//! [`UpdateOutcome::Suppressed`]. Observers must not block on other threads
//! that themselves touch the store.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use uart_console::config::{SettingBox, SettingsStore};
//!
//! let store = SettingsStore::builder()
//!     .with("serial_baud_rate", SettingBox::int(115_200))
//!     .with("serial_freeze", SettingBox::bool(false))
//!     .build()?;
//!
//! store.register_observer("status-bar", |snapshot| {
//!     println!("freeze = {:?}", snapshot.get_bool("serial_freeze"));
//! });
//!
//! store.update([("serial_freeze", json!(true))]);
//! ```

use crate::config::setting_box::SettingBox;
use crate::error::{ConsoleError, Result, ResultExt};
use parking_lot::ReentrantMutex;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Keys with this prefix describe the application itself and are never
/// exported or imported
pub const IDENTITY_PREFIX: &str = "app_";

/// Whether `key` belongs to the identity namespace
pub fn is_identity_key(key: &str) -> bool {
    key.starts_with(IDENTITY_PREFIX)
}

/// Callback invoked after every batch update
pub type Observer = Arc<dyn Fn(&SettingsSnapshot) + Send + Sync>;

/// Result of a call to [`SettingsStore::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The batch was applied and observers were notified
    Applied(UpdateReport),
    /// Another update was in progress on this thread; nothing changed
    Suppressed,
}

impl UpdateOutcome {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, UpdateOutcome::Suppressed)
    }

    /// The report of an applied batch
    pub fn report(&self) -> Option<&UpdateReport> {
        match self {
            UpdateOutcome::Applied(report) => Some(report),
            UpdateOutcome::Suppressed => None,
        }
    }
}

/// Per-key result of an applied batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Keys whose value was replaced
    pub applied: Vec<String>,
    /// Keys whose value could not be coerced, with the reason
    pub rejected: Vec<(String, String)>,
    /// Keys not present in the store
    pub unknown: Vec<String>,
}

/// Read-only copy of the store handed to observers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    entries: Vec<(String, SettingBox)>,
}

impl SettingsSnapshot {
    pub fn get(&self, key: &str) -> Option<&SettingBox> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, setting)| setting)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(SettingBox::as_bool)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(SettingBox::as_int)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(SettingBox::as_float)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingBox::as_text)
    }

    pub fn choice_label(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingBox::choice_label)
    }

    /// Iterate over all entries in construction order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingBox)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persisted form of every non-identity entry
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .filter(|(key, _)| !is_identity_key(key))
            .map(|(key, setting)| (key.clone(), setting.to_json()))
            .collect()
    }
}

struct Inner {
    entries: Vec<(String, SettingBox)>,
    index: HashMap<String, usize>,
    observers: Vec<(String, Observer)>,
    updating: bool,
}

impl Inner {
    fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            entries: self.entries.clone(),
        }
    }

    fn get(&self, key: &str) -> Option<&SettingBox> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }
}

/// Clears the in-progress flag even if an observer panics
struct UpdatingGuard<'a>(&'a RefCell<Inner>);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().updating = false;
    }
}

/// Builder for a [`SettingsStore`] with a fixed key set
#[derive(Debug, Default)]
pub struct SettingsStoreBuilder {
    entries: Vec<(String, SettingBox)>,
}

impl SettingsStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting. Order of insertion is the store's iteration order.
    pub fn with(mut self, key: impl Into<String>, setting: SettingBox) -> Self {
        self.entries.push((key.into(), setting));
        self
    }

    /// Freeze the key set
    pub fn build(self) -> Result<SettingsStore> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (i, (key, _)) in self.entries.iter().enumerate() {
            if index.insert(key.clone(), i).is_some() {
                return Err(ConsoleError::Settings(format!(
                    "duplicate setting key '{}'",
                    key
                )));
            }
        }

        Ok(SettingsStore {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(Inner {
                entries: self.entries,
                index,
                observers: Vec::new(),
                updating: false,
            }))),
        })
    }
}

/// Shared handle to the application settings
///
/// Cloning the handle is cheap; all clones see the same values.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<ReentrantMutex<RefCell<Inner>>>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        f.debug_struct("SettingsStore")
            .field("keys", &inner.entries.len())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl SettingsStore {
    pub fn builder() -> SettingsStoreBuilder {
        SettingsStoreBuilder::new()
    }

    /// Apply a batch of raw values
    ///
    /// Each known key is coerced into its box's shape; values that do not fit
    /// are rejected individually and the rest of the batch still applies.
    /// Unknown keys are ignored. Observers are notified once per batch.
    pub fn update<I, K>(&self, batch: I) -> UpdateOutcome
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.mutate(|inner| {
            let mut report = UpdateReport::default();
            for (key, raw) in batch {
                let key = key.as_ref();
                let Some(&i) = inner.index.get(key) else {
                    tracing::trace!("Ignoring unknown setting '{}'", key);
                    report.unknown.push(key.to_string());
                    continue;
                };

                match inner.entries[i].1.coerce(&raw) {
                    Ok(setting) => {
                        inner.entries[i].1 = setting;
                        report.applied.push(key.to_string());
                    }
                    Err(reason) => {
                        tracing::warn!("Rejected value {} for setting '{}': {}", raw, key, reason);
                        report.rejected.push((key.to_string(), reason.0));
                    }
                }
            }
            report
        })
        .map(UpdateOutcome::Applied)
        .unwrap_or(UpdateOutcome::Suppressed)
    }

    /// Restore the default of one choice or path setting
    pub fn reset(&self, key: &str) -> UpdateOutcome {
        self.mutate(|inner| {
            let mut report = UpdateReport::default();
            match inner.index.get(key) {
                Some(&i) => {
                    if inner.entries[i].1.reset() {
                        report.applied.push(key.to_string());
                    }
                }
                None => report.unknown.push(key.to_string()),
            }
            report
        })
        .map(UpdateOutcome::Applied)
        .unwrap_or(UpdateOutcome::Suppressed)
    }

    /// Restore the defaults of every choice and path setting
    pub fn reset_all(&self) -> UpdateOutcome {
        self.mutate(|inner| {
            let mut report = UpdateReport::default();
            for (key, setting) in inner.entries.iter_mut() {
                if setting.reset() {
                    report.applied.push(key.clone());
                }
            }
            report
        })
        .map(UpdateOutcome::Applied)
        .unwrap_or(UpdateOutcome::Suppressed)
    }

    /// Run `apply` under the store lock, then notify observers
    ///
    /// Returns `None` when an update is already running on this thread.
    fn mutate<R>(&self, apply: impl FnOnce(&mut Inner) -> R) -> Option<R> {
        let guard = self.inner.lock();

        {
            let mut inner = guard.borrow_mut();
            if inner.updating {
                tracing::debug!("Settings update suppressed: another update is in progress");
                return None;
            }
            inner.updating = true;
        }
        let _updating = UpdatingGuard(&guard);

        let result = apply(&mut guard.borrow_mut());

        // Observers may re-register while being called, so dispatch from a copy
        let (snapshot, observers) = {
            let inner = guard.borrow();
            (inner.snapshot(), inner.observers.clone())
        };
        for (name, observer) in &observers {
            tracing::trace!("Notifying settings observer '{}'", name);
            observer(&snapshot);
        }

        Some(result)
    }

    /// Register `callback` under `name`, replacing any observer with that name
    pub fn register_observer<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&SettingsSnapshot) + Send + Sync + 'static,
    {
        let name = name.into();
        let observer: Observer = Arc::new(callback);
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        match inner.observers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = observer,
            None => inner.observers.push((name, observer)),
        }
    }

    /// Remove the observer registered under `name`
    pub fn unregister_observer(&self, name: &str) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let before = inner.observers.len();
        inner.observers.retain(|(n, _)| n != name);
        inner.observers.len() < before
    }

    pub fn observer_count(&self) -> usize {
        let guard = self.inner.lock();
        let count = guard.borrow().observers.len();
        count
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        f(&inner)
    }

    pub fn get(&self, key: &str) -> Option<SettingBox> {
        self.read(|inner| inner.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read(|inner| inner.index.contains_key(key))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.read(|inner| inner.get(key).and_then(SettingBox::as_bool))
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.read(|inner| inner.get(key).and_then(SettingBox::as_int))
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.read(|inner| inner.get(key).and_then(SettingBox::as_float))
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.read(|inner| inner.get(key).and_then(SettingBox::as_text).map(str::to_string))
    }

    pub fn choice_label(&self, key: &str) -> Option<String> {
        self.read(|inner| {
            inner
                .get(key)
                .and_then(SettingBox::choice_label)
                .map(str::to_string)
        })
    }

    pub fn path(&self, key: &str) -> Option<std::path::PathBuf> {
        self.read(|inner| inner.get(key).and_then(SettingBox::as_path).map(Path::to_path_buf))
    }

    pub fn dimension(&self, key: &str) -> Option<(i64, i64)> {
        self.read(|inner| inner.get(key).and_then(SettingBox::as_dimension))
    }

    /// All keys in construction order
    pub fn keys(&self) -> Vec<String> {
        self.read(|inner| inner.entries.iter().map(|(k, _)| k.clone()).collect())
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.read(Inner::snapshot)
    }

    /// Load a persisted settings blob and apply it as one batch
    ///
    /// Identity keys in the blob are skipped. Any failure is logged and
    /// reported as `false`.
    pub fn import_from<R: Read>(&self, reader: R) -> bool {
        match self.try_import(reader) {
            Ok(report) => {
                tracing::info!(
                    "Imported {} settings ({} rejected, {} unknown)",
                    report.applied.len(),
                    report.rejected.len(),
                    report.unknown.len()
                );
                true
            }
            Err(e) => {
                tracing::error!("Failed to import settings: {}", e);
                false
            }
        }
    }

    /// Import settings from a JSON file
    pub fn import_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match File::open(path) {
            Ok(file) => self.import_from(BufReader::new(file)),
            Err(e) => {
                tracing::error!("Failed to import settings from {:?}: {}", path, e);
                false
            }
        }
    }

    fn try_import<R: Read>(&self, reader: R) -> Result<UpdateReport> {
        let blob: Map<String, Value> =
            serde_json::from_reader(reader).context("Settings blob is not a JSON object")?;
        let batch = blob.into_iter().filter(|(key, _)| !is_identity_key(key));

        match self.update(batch) {
            UpdateOutcome::Applied(report) => Ok(report),
            UpdateOutcome::Suppressed => Err(ConsoleError::Settings(
                "import suppressed while another update is in progress".to_string(),
            )),
        }
    }

    /// Write every non-identity setting as a JSON object
    pub fn export_to<W: Write>(&self, writer: W) -> bool {
        match self.try_export(writer) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to export settings: {}", e);
                false
            }
        }
    }

    /// Export settings to a JSON file, creating parent folders as needed
    pub fn export_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let file = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| File::create(path));

        match file {
            Ok(file) => {
                let ok = self.export_to(BufWriter::new(file));
                if ok {
                    tracing::info!("Exported settings to {:?}", path);
                }
                ok
            }
            Err(e) => {
                tracing::error!("Failed to export settings to {:?}: {}", path, e);
                false
            }
        }
    }

    fn try_export<W: Write>(&self, mut writer: W) -> Result<()> {
        let blob = self.snapshot().to_json_map();
        serde_json::to_writer_pretty(&mut writer, &blob)?;
        writer.flush()?;
        Ok(())
    }
}
