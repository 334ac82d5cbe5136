//! Decoding arbitrary media into mixer-ready PCM through an external ffmpeg.

use crate::core::constants::{CHANNELS, DEFAULT_MAX_TRANSCODES, SAMPLE_RATE};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug)]
pub enum TranscodeError {
    /// Every transcoder slot is taken.
    Busy { limit: usize },
    Spawn {
        program: PathBuf,
        source: io::Error,
    },
    /// The child came up without the pipe we asked for.
    MissingPipe(&'static str),
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::Busy { limit } => {
                write!(f, "too many concurrent transcodes (limit {limit})")
            }
            TranscodeError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program.display(), source)
            }
            TranscodeError::MissingPipe(pipe) => write!(f, "transcoder has no {pipe}"),
        }
    }
}

impl std::error::Error for TranscodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TranscodeError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// What to decode.
pub enum MediaInput {
    Path(PathBuf),
    Url(String),
    Bytes(Arc<[u8]>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for MediaInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaInput::Path(path) => f.debug_tuple("Path").field(path).finish(),
            MediaInput::Url(url) => f.debug_tuple("Url").field(url).finish(),
            MediaInput::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            MediaInput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Raw s16le 48 kHz stereo output of one transcoder process. Holds its
/// concurrency slot until dropped; dropping also kills the process.
pub struct PcmStream {
    stdout: ChildStdout,
    _child: Child,
    _permit: OwnedSemaphorePermit,
}

impl AsyncRead for PcmStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    limit: usize,
    permits: Arc<Semaphore>,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new("ffmpeg", DEFAULT_MAX_TRANSCODES)
    }
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            program: program.into(),
            limit,
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    fn args(input: &MediaInput, filters: &[String]) -> Vec<String> {
        let source = match input {
            MediaInput::Path(path) => path.display().to_string(),
            MediaInput::Url(url) => url.clone(),
            MediaInput::Bytes(_) | MediaInput::Stream(_) => "pipe:0".to_string(),
        };
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-i"]
            .into_iter()
            .map(str::to_string)
            .collect();
        args.push(source);
        if !filters.is_empty() {
            args.push("-af".to_string());
            args.push(filters.join(","));
        }
        args.extend(
            [
                "-f".to_string(),
                "s16le".to_string(),
                "-ar".to_string(),
                SAMPLE_RATE.to_string(),
                "-ac".to_string(),
                CHANNELS.to_string(),
                "pipe:1".to_string(),
            ],
        );
        args
    }

    /// Starts decoding `input`, applying ffmpeg audio `filters` in order.
    /// Fails fast with [`TranscodeError::Busy`] when the cap is reached.
    pub fn transcode(&self, input: MediaInput, filters: &[String]) -> Result<PcmStream, TranscodeError> {
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| TranscodeError::Busy { limit: self.limit })?;

        let args = Self::args(&input, filters);
        debug!(program = %self.program.display(), ?args, "starting transcoder");
        let piped = matches!(input, MediaInput::Bytes(_) | MediaInput::Stream(_));
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if piped { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(TranscodeError::MissingPipe("stdout"))?;

        if piped {
            let mut stdin = child
                .stdin
                .take()
                .ok_or(TranscodeError::MissingPipe("stdin"))?;
            tokio::spawn(async move {
                let result = match input {
                    MediaInput::Bytes(bytes) => stdin.write_all(&bytes).await,
                    MediaInput::Stream(mut stream) => {
                        tokio::io::copy(&mut stream, &mut stdin).await.map(|_| ())
                    }
                    MediaInput::Path(_) | MediaInput::Url(_) => Ok(()),
                };
                if let Err(err) = result {
                    debug!(error = %err, "transcoder input closed early");
                }
            });
        }

        Ok(PcmStream {
            stdout,
            _child: child,
            _permit: permit,
        })
    }
}
