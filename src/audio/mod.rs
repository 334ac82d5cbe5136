//! Real-time PCM mixing for voice playback.

mod mixer;
pub mod pcm;
mod registry;
mod transcode;

pub use mixer::{
    ListenerId, Mixer, MixerConfig, MixerError, MixerOutput, PcmSource, PlayOptions, TrackHandle,
};
pub use registry::MixerRegistry;
pub use transcode::{MediaInput, PcmStream, TranscodeError, Transcoder};

#[cfg(test)]
mod tests;
