use std::{
    collections::HashMap,
    fs,
    future::Future,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use log::{debug, error, info, trace, warn};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{is_well_formed, AppData, CardsError, LoadOutcome, Result};

/// Key under which the whole aggregate is stored.
pub const DEFAULT_STORAGE_KEY: &str = "commcards:data";

/// Opaque asynchronous key-value storage.
///
/// This is the only surface the persistence layer needs from the platform.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads the value stored under `key`, `None` if nothing is stored.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Stores `value` under `key`, replacing any previous value as a unit.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send;

    /// Removes the value under `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Key-value storage backed by one JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Helper method to get the file path for a key
    fn path_for(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        self.root.join(format!("{}.json", file_stem))
    }
}

/// Writes `contents` to `path` through a temporary file in the same directory
/// so readers only ever see the old or the new value.
fn write_atomically(dir: &Path, path: &Path, contents: &str) -> Result<()> {
    if !dir.exists() {
        debug!("Creating storage directory: {}", dir.display());
        fs::create_dir_all(dir).map_err(|e| {
            error!("Failed to create directory {}: {}", dir.display(), e);
            CardsError::DirectoryError {
                path: dir.to_path_buf(),
            }
        })?;
    }

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        CardsError::Io(e)
    })?;

    trace!("Writing to temporary file");
    temp_file.write_all(contents.as_bytes()).map_err(|e| {
        error!("Failed to write to temporary file: {}", e);
        CardsError::Io(e)
    })?;

    temp_file.flush().map_err(|e| {
        error!("Failed to flush temporary file: {}", e);
        CardsError::Io(e)
    })?;

    debug!("Performing atomic move of temporary file to {}", path.display());
    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        CardsError::Io(e.error)
    })?;

    Ok(())
}

/// Runs blocking filesystem work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CardsError::ApplicationError {
            message: format!("Storage task failed: {}", e),
        })?
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        trace!("Reading key {} from {}", key, path.display());

        blocking(move || match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                Err(CardsError::Io(e))
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let dir = self.root.clone();
        let path = self.path_for(key);
        trace!("Writing key {} to {}", key, path.display());

        blocking(move || write_atomically(&dir, &path, &value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        debug!("Deleting key {} at {}", key, path.display());

        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to delete {}: {}", path.display(), e);
                Err(CardsError::Io(e))
            }
        })
        .await
    }
}

/// In-process key-value storage.
///
/// Reads and writes can be switched to fail, which makes it the backend of
/// choice for exercising the failure paths of the persistence pipeline.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `value` under `key`
    pub fn with_entry(key: &str, value: impl Into<String>) -> Self {
        let store = Self::default();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value.into());
        }
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current raw value under `key`
    pub fn value(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn failure(key: &str, message: &str) -> CardsError {
        CardsError::StorageFailed {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::failure(key, "read refused"));
        }
        let entries = self
            .entries
            .lock()
            .map_err(|_| Self::failure(key, "lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::failure(key, "write refused"));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Self::failure(key, "lock poisoned"))?;
        entries.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::failure(key, "delete refused"));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Self::failure(key, "lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Parses JSON text into the aggregate, distinguishing text that is not JSON
/// from JSON that does not have the aggregate's shape.
pub fn parse_app_data(text: &str) -> Result<AppData> {
    let value: Value = serde_json::from_str(text).map_err(|e| CardsError::InvalidJson {
        message: e.to_string(),
    })?;

    if !is_well_formed(&value) {
        return Err(CardsError::InvalidShape {
            message: "expected an object with `cards` and `groups` arrays".to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| CardsError::InvalidShape {
        message: e.to_string(),
    })
}

/// Loads and saves the aggregate as a single blob under one key.
pub struct DataStore<S> {
    backend: S,
    key: String,
}

impl<S: KeyValueStore> DataStore<S> {
    /// Creates an adapter storing the aggregate under `key`
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Creates an adapter using [`DEFAULT_STORAGE_KEY`]
    pub fn with_default_key(backend: S) -> Self {
        Self::new(backend, DEFAULT_STORAGE_KEY)
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Reads the persisted aggregate.
    ///
    /// Never fails: a missing blob yields the empty aggregate, and an
    /// unreadable or malformed one yields the empty aggregate together with
    /// the reason in [`LoadOutcome::error`].
    pub async fn load(&self) -> LoadOutcome {
        debug!("Loading aggregate from key {}", self.key);

        let text = match self.backend.get(&self.key).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                info!("No stored data under {}, starting empty", self.key);
                return LoadOutcome {
                    data: AppData::empty(),
                    error: None,
                };
            }
            Err(e) => {
                warn!("Failed to read stored data, starting empty: {}", e);
                return LoadOutcome {
                    data: AppData::empty(),
                    error: Some(e),
                };
            }
        };

        match parse_app_data(&text) {
            Ok(data) => {
                info!(
                    "Loaded {} cards and {} groups",
                    data.cards.len(),
                    data.groups.len()
                );
                LoadOutcome { data, error: None }
            }
            Err(e) => {
                warn!("Stored data is malformed, starting empty: {}", e);
                LoadOutcome {
                    data: AppData::empty(),
                    error: Some(e),
                }
            }
        }
    }

    /// Serializes the aggregate and writes it under the storage key
    pub async fn save(&self, data: &AppData) -> Result<()> {
        let json = serde_json::to_string(data).map_err(|e| {
            error!("Failed to serialize aggregate: {}", e);
            CardsError::Serialization(e)
        })?;

        self.backend.set(&self.key, json).await?;
        debug!(
            "Saved {} cards and {} groups under {}",
            data.cards.len(),
            data.groups.len(),
            self.key
        );
        Ok(())
    }

    /// Removes the stored blob entirely
    pub async fn clear(&self) -> Result<()> {
        info!("Clearing stored data under {}", self.key);
        self.backend.delete(&self.key).await
    }
}
