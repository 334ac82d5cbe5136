use super::{Store, StoreChange, StoreError, Transition, CHANGE_CAPACITY};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Default)]
struct CacheState {
    values: Option<Map<String, Value>>,
    modified: Option<SystemTime>,
}

/// The file and its cache. Only touched from the blocking pool.
struct Disk {
    path: PathBuf,
    state: Mutex<CacheState>,
}

/// A JSON object on disk. Reads are served from a cache that is refreshed
/// whenever the file's mtime changes; writes replace the file atomically.
/// File I/O runs on tokio's blocking pool.
pub struct FileStore {
    disk: Arc<Disk>,
    changes: broadcast::Sender<StoreChange>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            disk: Arc::new(Disk {
                path: path.into(),
                state: Mutex::new(CacheState::default()),
            }),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.disk.path
    }

    async fn with_disk<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Disk) -> Result<T, StoreError> + Send + 'static,
    {
        let disk = self.disk.clone();
        tokio::task::spawn_blocking(move || work(&disk))
            .await
            .map_err(StoreError::Background)?
    }

    fn publish(&self, key: &str, value: Value) {
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
    }
}

impl Disk {
    fn modified_time(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).ok()?.modified().ok()
    }

    fn read_from_disk(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_to_disk(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(values).map_err(StoreError::Encode)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;
        temp_file.write_all(contents.as_bytes()).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    /// Runs `mutator` against the freshest values and persists the result.
    fn mutate<T>(
        &self,
        mutator: impl FnOnce(&mut Map<String, Value>) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let disk_modified = Self::modified_time(&self.path);
        if state.values.is_none() || state.modified != disk_modified {
            state.values = Some(self.read_from_disk()?);
        }
        let mut working = state.values.clone().unwrap_or_default();
        let result = mutator(&mut working);
        self.write_to_disk(&working)?;
        state.modified = Self::modified_time(&self.path);
        state.values = Some(working);
        Ok(result)
    }

    fn get(&self, key: &str, default: Value) -> Result<Value, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let disk_modified = Self::modified_time(&self.path);
        if state.values.is_none() || state.modified != disk_modified {
            debug!(path = %self.path.display(), "reloading store");
            state.values = Some(self.read_from_disk()?);
            state.modified = disk_modified;
        }
        Ok(state
            .values
            .as_ref()
            .and_then(|values| values.get(key))
            .cloned()
            .unwrap_or(default))
    }
}

#[async_trait::async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str, default: Value) -> Result<Value, StoreError> {
        let key = key.to_string();
        self.with_disk(move |disk| disk.get(&key, default)).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let owned_key = key.to_string();
        let stored = value.clone();
        self.with_disk(move |disk| {
            disk.mutate(|values| {
                values.insert(owned_key, stored);
            })
        })
        .await?;
        self.publish(key, value);
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        default: Value,
        transition: Transition,
    ) -> Result<Value, StoreError> {
        let owned_key = key.to_string();
        let next = self
            .with_disk(move |disk| {
                disk.mutate(|values| {
                    let current = values.remove(&owned_key).unwrap_or(default);
                    let next = transition(current);
                    values.insert(owned_key, next.clone());
                    next
                })
            })
            .await?;
        self.publish(key, next.clone());
        Ok(next)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
