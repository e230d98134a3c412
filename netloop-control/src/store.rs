//! Persistence of tunable values across restarts.
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted state of a single tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub value: f64,
    /// UNIX timestamp (microseconds) of the last applied adjustment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_adjusted_unix_us: Option<u64>,
}

/// Records keyed by tunable name.
pub type Records = BTreeMap<String, Record>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    #[error("Malformed state: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable storage for tunable values.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Loads all records. A store that was never written returns an empty map.
    async fn load_all(&self) -> Result<Records, StoreError>;

    /// Replaces all records.
    async fn save_all(&self, records: &Records) -> Result<(), StoreError>;
}

/// An in-memory store. Useful for tests and for processes that don't need durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Records {
        self.records.lock().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_all(&self) -> Result<Records, StoreError> {
        Ok(self.records.lock().clone())
    }

    async fn save_all(&self, records: &Records) -> Result<(), StoreError> {
        *self.records.lock() = records.clone();
        Ok(())
    }
}

/// Stores all records as one JSON document.
///
/// Writes go to a temporary file next to the target which is then renamed over it, so readers
/// never observe a partially written document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load_all(&self) -> Result<Records, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Records::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_all(&self, records: &Records) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.tmp_path();

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}
