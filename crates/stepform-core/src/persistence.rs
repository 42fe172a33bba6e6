//! Workflow snapshots and the storage adapters that keep them.
//!
//! A snapshot carries an explicit format `version`; anything that fails to parse or carries another
//! version is a [`PersistenceError`]. A storage backend that is merely unavailable is not an error:
//! the adapter turns inert instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot could not be parsed: {0}")]
    Parse(String),
    #[error("snapshot version {found} is not supported (expected {expected})")]
    Version { found: u64, expected: u32 },
    #[error("snapshot belongs to workflow '{found}', expected '{expected}'")]
    WorkflowMismatch { found: String, expected: String },
    #[error("snapshot could not be encoded: {0}")]
    Encode(String),
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Serializable state of a workflow at a transition boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub version: u32,
    pub workflow_id: String,
    pub current_step_index: usize,
    pub all_data: Map<String, Value>,
    pub visited_steps: BTreeSet<String>,
    #[serde(default)]
    pub skipped_steps: BTreeSet<String>,
    pub last_saved: DateTime<Utc>,
}

impl WorkflowSnapshot {
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self).map_err(|err| PersistenceError::Encode(err.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, PersistenceError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| PersistenceError::Parse(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, PersistenceError> {
        serde_cbor::to_vec(self).map_err(|err| PersistenceError::Encode(err.to_string()))
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let value: Value =
            serde_cbor::from_slice(bytes).map_err(|err| PersistenceError::Parse(err.to_string()))?;
        Self::from_value(value)
    }

    /// Checks the version field before decoding the rest.
    fn from_value(value: Value) -> Result<Self, PersistenceError> {
        let found = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| PersistenceError::Parse("missing snapshot version".into()))?;
        if found != u64::from(SNAPSHOT_VERSION) {
            return Err(PersistenceError::Version {
                found,
                expected: SNAPSHOT_VERSION,
            });
        }
        serde_json::from_value(value).map_err(|err| PersistenceError::Parse(err.to_string()))
    }
}

/// Load/save contract for workflow snapshots.
pub trait PersistenceAdapter {
    fn save(&mut self, key: &str, snapshot: &WorkflowSnapshot) -> Result<(), PersistenceError>;
    fn load(&self, key: &str) -> Result<Option<WorkflowSnapshot>, PersistenceError>;
    fn exists(&self, key: &str) -> bool;
}

/// In-process storage keeping CBOR-encoded snapshots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under a key, bypassing encoding.
    pub fn insert_raw(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistenceAdapter for MemoryStorage {
    fn save(&mut self, key: &str, snapshot: &WorkflowSnapshot) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), snapshot.to_cbor()?);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<WorkflowSnapshot>, PersistenceError> {
        self.entries
            .get(key)
            .map(|bytes| WorkflowSnapshot::from_cbor(bytes))
            .transpose()
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// JSON files under a directory, one per key.
///
/// If the directory cannot be created the storage is unavailable: saves are dropped, loads find
/// nothing and `exists` is false.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    available: bool,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let available = match fs::create_dir_all(&dir) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "snapshot storage unavailable");
                false
            }
        };
        Self { dir, available }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.snapshot.json", sanitize_file_name(key)))
    }
}

impl PersistenceAdapter for FileStorage {
    fn save(&mut self, key: &str, snapshot: &WorkflowSnapshot) -> Result<(), PersistenceError> {
        if !self.available {
            return Ok(());
        }
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, snapshot.to_json()?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<WorkflowSnapshot>, PersistenceError> {
        if !self.available {
            return Ok(None);
        }
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => WorkflowSnapshot::from_json(&text).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                tracing::warn!(key, error = %err, "snapshot storage unreadable; treating as empty");
                Ok(None)
            }
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.available && self.path_for(key).is_file()
    }
}

fn sanitize_file_name(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "workflow".into()
    } else {
        sanitized
    }
}
