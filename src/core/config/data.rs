use crate::audio::{MixerConfig, Transcoder};
use crate::core::constants::DEFAULT_MAX_TRANSCODES;
use crate::store::{FileStore, MemoryStore, Store};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn default_buffer_ms() -> u64 {
    MixerConfig::default().buffer_ms
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_TRANSCODES
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AudioConfig {
    /// How far ahead each mixer channel reads its source, in milliseconds.
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_ms: default_buffer_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranscodeConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StoreConfig {
    /// JSON file backing the store; in-memory when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Tracing filter used when `RECONCORD_LOG` is not set.
    pub log_filter: Option<String>,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            buffer_ms: self.audio.buffer_ms,
            ..MixerConfig::default()
        }
    }

    pub fn transcoder(&self) -> Transcoder {
        Transcoder::new(
            self.transcode.ffmpeg_path.clone(),
            self.transcode.max_concurrent,
        )
    }

    pub fn open_store(&self) -> Arc<dyn Store> {
        match &self.store.path {
            Some(path) => Arc::new(FileStore::new(path.clone())),
            None => Arc::new(MemoryStore::new()),
        }
    }
}
