//! Persistent key-value store for state that must survive power loss.
//!
//! Every `put_*` is write-through: when it returns `Ok`, the value is durable.
//! The scheduler relies on this to order "task accounted for" writes.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Slot names used by the scheduler and the timestamp reconciler.
pub mod keys {
    pub const RESET_COUNT: &str = "reset_count";
    pub const ANALOG_T0: &str = "analog_t0";
    pub const HT_T0: &str = "ht_t0";
    pub const OTA_T0: &str = "ota_t0";
    pub const TLM_T0: &str = "tlm_t0";
    pub const TIMESTAMP: &str = "timestamp";
    pub const LOG_OFFSET: &str = "log_offset";
}

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A slot holds a value of the other type
    #[error("Slot '{key}' does not hold {expected}")]
    TypeMismatch { key: String, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

pub trait KeyValueStore {
    fn contains(&self, key: &str) -> bool;

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError>;

    fn put_int(&mut self, key: &str, value: i64) -> Result<(), StoreError>;

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Integer slot, or `0` when it has never been written.
    fn int_or_default(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self.get_int(key)?.unwrap_or(0))
    }
}

fn int_slot(map: &BTreeMap<String, Value>, key: &str) -> Result<Option<i64>, StoreError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::Int(v)) => Ok(Some(*v)),
        Some(Value::Text(_)) => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: "an integer",
        }),
    }
}

fn string_slot(map: &BTreeMap<String, Value>, key: &str) -> Result<Option<String>, StoreError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::Text(v)) => Ok(Some(v.clone())),
        Some(Value::Int(_)) => Err(StoreError::TypeMismatch {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Volatile store. Keeps a log of every write so callers can check the
/// order in which slots were persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
    writes: Vec<(String, Value)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `put_*` so far, oldest first.
    pub fn writes(&self) -> &[(String, Value)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    fn put(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value.clone());
        self.writes.push((key.to_string(), value));
    }
}

impl KeyValueStore for MemoryStore {
    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        int_slot(&self.values, key)
    }

    fn put_int(&mut self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put(key, Value::Int(value));
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        string_slot(&self.values, key)
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, Value::Text(value.to_string()));
        Ok(())
    }
}

/// JSON object on disk, rewritten in full on every put.
///
/// Writes go to a sibling `.tmp` file which is synced and then renamed over
/// the original, so the file always holds either the old or the new state.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store, and so
    /// is one that no longer parses; the next put replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("unreadable store at {}: {e}; starting empty", path.display());
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no store at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self { path, values })
    }

    fn flush(&self) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.values)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }
}

impl KeyValueStore for JsonFileStore {
    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        int_slot(&self.values, key)
    }

    fn put_int(&mut self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put(key, Value::Int(value))
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        string_slot(&self.values, key)
    }

    fn put_string(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, Value::Text(value.to_string()))
    }
}
