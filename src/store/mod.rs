//! Keyed storage that components read from and re-render on.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;

pub(crate) const CHANGE_CAPACITY: usize = 64;

/// A committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub value: Value,
}

#[derive(Debug)]
pub enum StoreError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode(serde_json::Error),
    Background(tokio::task::JoinError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, source } => {
                write!(f, "Failed to read store at {}: {}", path.display(), source)
            }
            StoreError::Parse { path, source } => {
                write!(f, "Failed to parse store at {}: {}", path.display(), source)
            }
            StoreError::Write { path, source } => {
                write!(f, "Failed to write store at {}: {}", path.display(), source)
            }
            StoreError::Encode(source) => write!(f, "Failed to encode store: {source}"),
            StoreError::Background(source) => write!(f, "Store I/O task failed: {source}"),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Read { source, .. } | StoreError::Write { source, .. } => Some(source),
            StoreError::Parse { source, .. } | StoreError::Encode(source) => Some(source),
            StoreError::Background(source) => Some(source),
        }
    }
}

pub type Transition = Box<dyn FnOnce(Value) -> Value + Send>;

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// The stored value, or `default` when the key is absent.
    async fn get(&self, key: &str, default: Value) -> Result<Value, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Applies `transition` to the current value (or `default`) atomically
    /// and returns the new value.
    async fn update(&self, key: &str, default: Value, transition: Transition)
        -> Result<Value, StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}
