//! Fixed-tick mixing of independently controlled PCM tracks.
//!
//! Each track is fed by its own pump task that reads the source into a
//! bounded buffer. Every 20 ms the ticker drains one tick's worth of bytes
//! from every playing channel, mixes them and pushes the frame to the output
//! stream. A starving channel contributes silence instead of stalling.

use super::pcm;
use crate::core::constants::{BYTES_PER_SECOND, BYTES_PER_TICK, TICK_MS};
use futures_util::Stream;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Opaque identity of a track, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackHandle(u64);

impl fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_TRACK: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub enum MixerError {
    UnknownTrack(TrackHandle),
    ShutDown,
}

impl fmt::Display for MixerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixerError::UnknownTrack(handle) => write!(f, "unknown track {handle}"),
            MixerError::ShutDown => write!(f, "mixer has shut down"),
        }
    }
}

impl std::error::Error for MixerError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerConfig {
    /// How far ahead each channel reads its source.
    pub buffer_ms: u64,
    /// Frames the output may queue before the ticker waits for the consumer.
    pub output_frames: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            buffer_ms: 200,
            output_frames: 50,
        }
    }
}

impl MixerConfig {
    fn buffer_bytes(&self) -> usize {
        let ticks = (self.buffer_ms / TICK_MS).max(1) as usize;
        ticks * BYTES_PER_TICK
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub paused: bool,
    pub volume: f32,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            paused: false,
            volume: 1.0,
        }
    }
}

pub type PcmSource = Box<dyn AsyncRead + Send + Unpin>;
type EndListener = Box<dyn FnOnce(TrackHandle) + Send>;

#[derive(Default)]
struct Feed {
    buffer: VecDeque<u8>,
    received: u64,
    done: bool,
}

struct Track {
    handle: TrackHandle,
    feed: Arc<Mutex<Feed>>,
    pump: CancellationToken,
    paused: bool,
    volume: f32,
    consumed: u64,
    listeners: Vec<(ListenerId, EndListener)>,
}

enum Slot {
    Free,
    Busy(Track),
    /// End listeners are running; the slot frees once they return.
    Releasing,
}

#[derive(Default)]
struct MixerState {
    channels: Vec<Slot>,
    tracks: HashMap<TrackHandle, usize>,
}

/// Moves the track out of a busy slot, leaving the slot reserved.
fn take_busy(channels: &mut [Slot], index: usize) -> Option<Track> {
    let slot = channels.get_mut(index)?;
    if !matches!(slot, Slot::Busy(_)) {
        return None;
    }
    match std::mem::replace(slot, Slot::Releasing) {
        Slot::Busy(track) => Some(track),
        other => {
            *slot = other;
            None
        }
    }
}

pub struct Mixer {
    config: MixerConfig,
    state: Mutex<MixerState>,
    cancel: CancellationToken,
}

/// The mixed output: one frame of `BYTES_PER_TICK` bytes per tick.
pub struct MixerOutput {
    frames: mpsc::Receiver<Vec<u8>>,
}

impl Stream for MixerOutput {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_recv(cx)
    }
}

async fn pump(mut source: PcmSource, feed: Arc<Mutex<Feed>>, capacity: usize, cancel: CancellationToken) {
    let idle = Duration::from_millis(TICK_MS / 2);
    let mut chunk = vec![0u8; BYTES_PER_TICK];
    loop {
        let full = feed.lock().unwrap_or_else(|e| e.into_inner()).buffer.len() >= capacity;
        if full {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(idle) => continue,
            }
        }
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = source.read(&mut chunk) => read,
        };
        let mut state = feed.lock().unwrap_or_else(|e| e.into_inner());
        match read {
            Ok(0) => {
                state.done = true;
                return;
            }
            Ok(n) => {
                state.buffer.extend(&chunk[..n]);
                state.received += n as u64;
            }
            Err(err) => {
                warn!(error = %err, "track source failed; ending track");
                state.done = true;
                return;
            }
        }
    }
}

impl Mixer {
    /// Creates a mixer and starts its ticker on the current runtime.
    pub fn new(config: MixerConfig) -> (Arc<Self>, MixerOutput) {
        let mixer = Arc::new(Self::detached(config));
        let (tx, rx) = mpsc::channel(config.output_frames.max(1));
        let ticker = mixer.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let frame = ticker.mix_tick();
                        if tx.send(frame).await.is_err() {
                            debug!("mixer output dropped; stopping ticker");
                            break;
                        }
                    }
                }
            }
            ticker.shutdown();
        });
        (mixer, MixerOutput { frames: rx })
    }

    /// A mixer without a ticker; frames are produced by calling [`Mixer::mix_tick`].
    pub fn detached(config: MixerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MixerState::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MixerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_pump(&self, source: PcmSource) -> (Arc<Mutex<Feed>>, CancellationToken) {
        let feed = Arc::new(Mutex::new(Feed::default()));
        let token = self.cancel.child_token();
        tokio::spawn(pump(source, feed.clone(), self.config.buffer_bytes(), token.clone()));
        (feed, token)
    }

    /// Starts `source` on the first free channel, growing the channel list
    /// when every channel is taken.
    pub fn play_track(&self, source: PcmSource, options: PlayOptions) -> Result<TrackHandle, MixerError> {
        if self.cancel.is_cancelled() {
            return Err(MixerError::ShutDown);
        }
        let handle = TrackHandle(NEXT_TRACK.fetch_add(1, Ordering::Relaxed));
        let (feed, pump) = self.start_pump(source);
        let track = Track {
            handle,
            feed,
            pump,
            paused: options.paused,
            volume: options.volume,
            consumed: 0,
            listeners: Vec::new(),
        };
        let mut state = self.lock();
        let index = match state.channels.iter().position(|slot| matches!(slot, Slot::Free)) {
            Some(index) => {
                state.channels[index] = Slot::Busy(track);
                index
            }
            None => {
                state.channels.push(Slot::Busy(track));
                state.channels.len() - 1
            }
        };
        state.tracks.insert(handle, index);
        debug!(%handle, channel = index, "track started");
        Ok(handle)
    }

    fn with_track<T>(&self, handle: TrackHandle, f: impl FnOnce(&mut Track) -> T) -> Result<T, MixerError> {
        let mut state = self.lock();
        let index = *state.tracks.get(&handle).ok_or(MixerError::UnknownTrack(handle))?;
        match state.channels.get_mut(index) {
            Some(Slot::Busy(track)) if track.handle == handle => Ok(f(track)),
            _ => Err(MixerError::UnknownTrack(handle)),
        }
    }

    pub fn pause_track(&self, handle: TrackHandle) -> Result<(), MixerError> {
        self.with_track(handle, |track| track.paused = true)
    }

    pub fn resume_track(&self, handle: TrackHandle) -> Result<(), MixerError> {
        self.with_track(handle, |track| track.paused = false)
    }

    pub fn set_track_volume(&self, handle: TrackHandle, volume: f32) -> Result<(), MixerError> {
        self.with_track(handle, |track| track.volume = volume.max(0.0))
    }

    /// Swaps the source under a playing track. The old source is dropped
    /// outright; handle, volume and listeners carry over.
    pub fn replace_source(&self, handle: TrackHandle, source: PcmSource) -> Result<(), MixerError> {
        let (feed, pump) = self.start_pump(source);
        let swapped = self.with_track(handle, |track| {
            track.pump.cancel();
            track.feed = feed;
            track.pump = pump.clone();
            track.consumed = 0;
        });
        if swapped.is_err() {
            pump.cancel();
        }
        swapped
    }

    pub fn on_track_end(
        &self,
        handle: TrackHandle,
        listener: impl FnOnce(TrackHandle) + Send + 'static,
    ) -> Result<ListenerId, MixerError> {
        let id = ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed));
        self.with_track(handle, |track| track.listeners.push((id, Box::new(listener))))?;
        Ok(id)
    }

    pub fn off_track_end(&self, handle: TrackHandle, listener: ListenerId) -> Result<bool, MixerError> {
        self.with_track(handle, |track| {
            let before = track.listeners.len();
            track.listeners.retain(|(id, _)| *id != listener);
            track.listeners.len() != before
        })
    }

    /// Stops a track early. Returns false when it already ended or was stopped.
    pub fn stop_track(&self, handle: TrackHandle) -> bool {
        let released = {
            let mut state = self.lock();
            let Some(index) = state.tracks.remove(&handle) else {
                return false;
            };
            take_busy(&mut state.channels, index).map(|track| (index, track))
        };
        match released {
            Some((index, track)) => {
                debug!(%handle, channel = index, "track stopped");
                self.release(index, track);
                true
            }
            None => false,
        }
    }

    /// Fires end listeners, then frees the channel.
    fn release(&self, index: usize, track: Track) {
        track.pump.cancel();
        for (_, listener) in track.listeners {
            listener(track.handle);
        }
        let mut state = self.lock();
        if let Some(slot) = state.channels.get_mut(index) {
            *slot = Slot::Free;
        }
    }

    /// Produces one output frame and retires tracks whose source is exhausted.
    pub fn mix_tick(&self) -> Vec<u8> {
        let mut acc = vec![0i32; BYTES_PER_TICK / 2];
        let mut retired = Vec::new();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let mut finished = Vec::new();
            for (index, slot) in state.channels.iter_mut().enumerate() {
                let Slot::Busy(track) = slot else {
                    continue;
                };
                if track.paused {
                    continue;
                }
                let mut feed = track.feed.lock().unwrap_or_else(|e| e.into_inner());
                let mut take = feed.buffer.len().min(BYTES_PER_TICK);
                if !feed.done {
                    take -= take % 2;
                }
                let chunk: Vec<u8> = feed.buffer.drain(..take).collect();
                track.consumed += take as u64;
                if feed.done && feed.buffer.is_empty() && track.consumed >= feed.received {
                    finished.push(index);
                }
                drop(feed);
                pcm::accumulate(&mut acc, &chunk, track.volume);
            }
            for index in finished {
                if let Some(track) = take_busy(&mut state.channels, index) {
                    state.tracks.remove(&track.handle);
                    retired.push((index, track));
                }
            }
        }
        for (index, track) in retired {
            debug!(handle = %track.handle, channel = index, "track ended");
            self.release(index, track);
        }
        pcm::encode_clipped(&acc)
    }

    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    /// Channel a live track occupies.
    pub fn channel_of(&self, handle: TrackHandle) -> Option<usize> {
        self.lock().tracks.get(&handle).copied()
    }

    pub fn is_playing(&self, handle: TrackHandle) -> bool {
        self.with_track(handle, |track| !track.paused).unwrap_or(false)
    }

    /// Playback position of a track, measured from the bytes it has consumed.
    pub fn position(&self, handle: TrackHandle) -> Option<Duration> {
        self.with_track(handle, |track| {
            Duration::from_nanos(track.consumed * 1_000_000_000 / BYTES_PER_SECOND as u64)
        })
        .ok()
    }

    /// Stops the ticker and every pump. Live tracks are dropped without
    /// firing their end listeners.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
