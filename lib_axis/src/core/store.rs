//! # Persistence Store
//!
//! Reads and writes the durable console document:
//!
//! ```json
//! { "mode": "AUTO", "statuses": { "notes/abc": "Keep" } }
//! ```
//!
//! The document is read once at startup and overwritten wholesale after every
//! mutation. Writes go to a temporary file in the same directory which is then
//! renamed over the target, so a reader sees either the previous document or
//! the new one.
//!
//! The store keeps a cached copy of the last document it wrote. The mode
//! controller and the status overlay each replace only their own field through
//! [`StateStore::record_mode`] / [`StateStore::record_statuses`] while holding
//! their own lock, so the written document always combines the latest
//! committed value of each component.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

use super::mode::OperatingMode;

/// Default file name used when no explicit path is configured.
pub const STATE_FILE_NAME: &str = "axis.state.json";

/// Errors raised while reading or writing the state document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file could not be read, written or renamed.
    #[error("state file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but does not hold a valid document.
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory document could not be serialized.
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The durable document. Labels are kept as raw strings on disk so one
/// unrecognized entry does not invalidate the rest of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub mode: OperatingMode,
    #[serde(default)]
    pub statuses: BTreeMap<String, String>,
}

/// On-disk shape before validation. Each field is checked on its own so a
/// bad mode or a null map does not cost the operator's statuses.
#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    mode: Option<Value>,
    #[serde(default)]
    statuses: Option<BTreeMap<String, Value>>,
}

impl RawDocument {
    fn validate(self, path: &Path) -> PersistedDocument {
        let mode = match self.mode {
            Some(Value::String(raw)) => raw.parse::<OperatingMode>().unwrap_or_else(|e| {
                log::warn!("Ignoring mode in {}: {}", path.display(), e);
                OperatingMode::default()
            }),
            None | Some(Value::Null) => OperatingMode::default(),
            Some(other) => {
                log::warn!("Ignoring mode in {}: {}", path.display(), other);
                OperatingMode::default()
            }
        };

        let mut statuses = BTreeMap::new();
        for (id, label) in self.statuses.unwrap_or_default() {
            match label {
                Value::String(label) => {
                    statuses.insert(id, label);
                }
                other => log::warn!("Ignoring status for {} in {}: {}", id, path.display(), other),
            }
        }

        PersistedDocument { mode, statuses }
    }
}

/// File-backed store for the [`PersistedDocument`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    cache: Mutex<PersistedDocument>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(PersistedDocument::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document from disk.
    ///
    /// Returns `Ok(None)` on a fresh install (no file). An unknown mode falls
    /// back to AUTO and non-string labels are skipped, keeping the rest of the
    /// document. A file that is not a JSON object is an error here; [`StateStore::load_or_default`] is the startup path that
    /// folds it into the defaults.
    pub fn load(&self) -> Result<Option<PersistedDocument>, StoreError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let raw: RawDocument =
            serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        let doc = raw.validate(&self.path);

        *self.cache.lock().expect("StateStore lock poisoned") = doc.clone();
        Ok(Some(doc))
    }

    /// Startup loader: never fails. Missing and unreadable documents both
    /// yield the default (AUTO, empty overlay).
    pub fn load_or_default(&self) -> PersistedDocument {
        match self.load() {
            Ok(Some(doc)) => {
                log::info!(
                    "State restored from {}: mode {}, {} item statuses",
                    self.path.display(),
                    doc.mode,
                    doc.statuses.len()
                );
                doc
            }
            Ok(None) => {
                log::info!(
                    "No state file at {}. Starting with defaults.",
                    self.path.display()
                );
                PersistedDocument::default()
            }
            Err(e) => {
                log::warn!("{}. Starting with defaults.", e);
                PersistedDocument::default()
            }
        }
    }

    /// Serializes and writes the full document, replacing any previous one.
    pub fn save(&self, doc: &PersistedDocument) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().expect("StateStore lock poisoned");
        *cache = doc.clone();
        self.write(&cache)
    }

    /// Replaces the mode field of the cached document and writes it.
    pub fn record_mode(&self, mode: OperatingMode) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().expect("StateStore lock poisoned");
        cache.mode = mode;
        self.write(&cache)
    }

    /// Replaces the statuses field of the cached document and writes it.
    pub fn record_statuses(&self, statuses: BTreeMap<String, String>) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().expect("StateStore lock poisoned");
        cache.statuses = statuses;
        self.write(&cache)
    }

    fn write(&self, doc: &PersistedDocument) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(doc)?;
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join(STATE_FILE_NAME));
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.load_or_default(), PersistedDocument::default());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(&path, b"{ \"mode\": \"AUTO\", ").unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
        let doc = store.load_or_default();
        assert_eq!(doc.mode, OperatingMode::Automated);
        assert!(doc.statuses.is_empty());
    }

    #[test]
    fn test_save_then_load_uses_wire_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        let store = StateStore::new(&path);

        let mut statuses = BTreeMap::new();
        statuses.insert("notes/1".to_string(), "Execute".to_string());
        store
            .save(&PersistedDocument {
                mode: OperatingMode::Manual,
                statuses,
            })
            .unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({ "mode": "MANUAL", "statuses": { "notes/1": "Execute" } })
        );

        let reloaded = StateStore::new(&path).load().unwrap().unwrap();
        assert_eq!(reloaded.mode, OperatingMode::Manual);
        assert_eq!(reloaded.statuses["notes/1"], "Execute");
    }

    #[test]
    fn test_partial_records_keep_the_other_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(STATE_FILE_NAME);
        let store = StateStore::new(&path);

        let mut statuses = BTreeMap::new();
        statuses.insert("notes/a".to_string(), "Keep".to_string());
        store.record_statuses(statuses).unwrap();
        store.record_mode(OperatingMode::Manual).unwrap();

        let doc = StateStore::new(&path).load().unwrap().unwrap();
        assert_eq!(doc.mode, OperatingMode::Manual);
        assert_eq!(doc.statuses.len(), 1);
    }

    #[test]
    fn test_missing_statuses_field_defaults_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(&path, br#"{ "mode": "MANUAL" }"#).unwrap();

        let doc = StateStore::new(&path).load().unwrap().unwrap();
        assert_eq!(doc.mode, OperatingMode::Manual);
        assert!(doc.statuses.is_empty());
    }

    #[test]
    fn test_invalid_mode_keeps_statuses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(&path, br#"{ "mode": "auto", "statuses": { "notes/1": "Execute" } }"#).unwrap();

        let store = StateStore::new(&path);
        let doc = store.load().unwrap().unwrap();
        assert_eq!(doc.mode, OperatingMode::Automated);
        assert_eq!(doc.statuses["notes/1"], "Execute");

        // The next write keeps the restored statuses.
        store.record_mode(OperatingMode::Manual).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({ "mode": "MANUAL", "statuses": { "notes/1": "Execute" } })
        );
    }

    #[test]
    fn test_null_statuses_keep_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(&path, br#"{ "mode": "MANUAL", "statuses": null }"#).unwrap();

        let doc = StateStore::new(&path).load_or_default();
        assert_eq!(doc.mode, OperatingMode::Manual);
        assert!(doc.statuses.is_empty());
    }

    #[test]
    fn test_non_string_labels_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        fs::write(
            &path,
            br#"{ "mode": 7, "statuses": { "notes/1": "Keep", "notes/2": 3, "notes/3": null } }"#,
        )
        .unwrap();

        let doc = StateStore::new(&path).load().unwrap().unwrap();
        assert_eq!(doc.mode, OperatingMode::Automated);
        assert_eq!(doc.statuses.len(), 1);
        assert_eq!(doc.statuses["notes/1"], "Keep");
    }
}
