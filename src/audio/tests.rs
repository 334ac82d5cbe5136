use super::*;
use crate::core::constants::{BYTES_PER_SECOND, BYTES_PER_TICK};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn tone(sample: i16, bytes: usize) -> PcmSource {
    Box::new(Cursor::new(sample.to_le_bytes().repeat(bytes / 2)))
}

fn samples(frame: &[u8]) -> Vec<i16> {
    frame
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Lets pump tasks fill their buffers.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(15)).await;
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce(TrackHandle) + Send + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let inner = calls.clone();
    (calls, move |_| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn stopping_mid_playback_fires_listeners_once_and_frees_the_channel() {
    let mixer = Mixer::detached(MixerConfig::default());
    let handle = mixer
        .play_track(
            tone(1000, BYTES_PER_SECOND),
            PlayOptions {
                paused: false,
                volume: 0.5,
            },
        )
        .expect("play");
    let (calls, listener) = counter();
    mixer.on_track_end(handle, listener).expect("listen");
    settle().await;

    for _ in 0..5 {
        let frame = mixer.mix_tick();
        assert_eq!(frame.len(), BYTES_PER_TICK);
        assert!(samples(&frame).iter().all(|sample| *sample == 500));
    }

    assert!(mixer.stop_track(handle));
    assert!(!mixer.stop_track(handle));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(mixer.channel_of(handle), None);

    mixer.mix_tick();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let next = mixer
        .play_track(tone(0, BYTES_PER_TICK), PlayOptions::default())
        .expect("play again");
    assert_ne!(next, handle);
    assert_eq!(mixer.channel_of(next), Some(0));
    assert_eq!(mixer.channel_count(), 1);
}

#[tokio::test]
async fn tracks_end_only_after_buffered_audio_is_played() {
    let mixer = Mixer::detached(MixerConfig::default());
    let handle = mixer
        .play_track(tone(200, BYTES_PER_TICK * 2), PlayOptions::default())
        .expect("play");
    let (calls, listener) = counter();
    mixer.on_track_end(handle, listener).expect("listen");
    settle().await;

    mixer.mix_tick();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(mixer.position(handle), Some(Duration::from_millis(20)));

    let last = mixer.mix_tick();
    assert!(samples(&last).iter().all(|sample| *sample == 200));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(mixer.channel_of(handle), None);
    assert!(mixer.pause_track(handle).is_err());
}

#[tokio::test]
async fn two_loud_channels_clip_to_the_maximum() {
    let mixer = Mixer::detached(MixerConfig::default());
    mixer
        .play_track(tone(i16::MAX, BYTES_PER_SECOND), PlayOptions::default())
        .expect("first");
    mixer
        .play_track(tone(i16::MAX, BYTES_PER_SECOND), PlayOptions::default())
        .expect("second");
    settle().await;

    let frame = mixer.mix_tick();
    assert!(samples(&frame).iter().all(|sample| *sample == i16::MAX));
    assert_eq!(mixer.channel_count(), 2);
}

#[tokio::test]
async fn silent_channels_mix_to_silence() {
    let mixer = Mixer::detached(MixerConfig::default());
    for _ in 0..2 {
        mixer
            .play_track(tone(0, BYTES_PER_SECOND), PlayOptions::default())
            .expect("play");
    }
    settle().await;
    assert!(mixer.mix_tick().iter().all(|byte| *byte == 0));
}

#[tokio::test]
async fn paused_tracks_contribute_nothing_and_keep_their_place() {
    let mixer = Mixer::detached(MixerConfig::default());
    let handle = mixer
        .play_track(
            tone(300, BYTES_PER_TICK * 4),
            PlayOptions {
                paused: true,
                volume: 1.0,
            },
        )
        .expect("play");
    settle().await;

    assert!(!mixer.is_playing(handle));
    assert!(mixer.mix_tick().iter().all(|byte| *byte == 0));
    assert_eq!(mixer.position(handle), Some(Duration::ZERO));

    mixer.resume_track(handle).expect("resume");
    let frame = mixer.mix_tick();
    assert!(samples(&frame).iter().all(|sample| *sample == 300));

    mixer.set_track_volume(handle, 2.0).expect("volume");
    let frame = mixer.mix_tick();
    assert!(samples(&frame).iter().all(|sample| *sample == 600));
}

#[tokio::test]
async fn a_starving_channel_is_padded_with_silence() {
    let mixer = Mixer::detached(MixerConfig::default());
    let (reader, mut writer) = tokio::io::duplex(BYTES_PER_TICK * 4);
    let handle = mixer
        .play_track(Box::new(reader), PlayOptions::default())
        .expect("play");

    use tokio::io::AsyncWriteExt;
    writer
        .write_all(&100i16.to_le_bytes().repeat(BYTES_PER_TICK / 4))
        .await
        .expect("write");
    settle().await;

    let frame = samples(&mixer.mix_tick());
    let half = frame.len() / 2;
    assert!(frame[..half].iter().all(|sample| *sample == 100));
    assert!(frame[half..].iter().all(|sample| *sample == 0));
    assert_eq!(mixer.channel_of(handle), Some(0));
}

#[tokio::test]
async fn channels_are_reused_before_new_ones_are_added() {
    let mixer = Mixer::detached(MixerConfig::default());
    let first = mixer
        .play_track(tone(1, BYTES_PER_SECOND), PlayOptions::default())
        .expect("first");
    let second = mixer
        .play_track(tone(1, BYTES_PER_SECOND), PlayOptions::default())
        .expect("second");
    assert_eq!(mixer.channel_of(first), Some(0));
    assert_eq!(mixer.channel_of(second), Some(1));

    assert!(mixer.stop_track(first));
    let third = mixer
        .play_track(tone(1, BYTES_PER_SECOND), PlayOptions::default())
        .expect("third");
    assert_eq!(mixer.channel_of(third), Some(0));
    assert_eq!(mixer.channel_count(), 2);
}

#[tokio::test]
async fn removed_listeners_do_not_fire() {
    let mixer = Mixer::detached(MixerConfig::default());
    let handle = mixer
        .play_track(tone(1, BYTES_PER_SECOND), PlayOptions::default())
        .expect("play");
    let (kept, keep) = counter();
    let (dropped, drop_me) = counter();
    mixer.on_track_end(handle, keep).expect("listen");
    let id = mixer.on_track_end(handle, drop_me).expect("listen");
    assert!(mixer.off_track_end(handle, id).expect("off"));

    mixer.stop_track(handle);
    assert_eq!(kept.load(Ordering::SeqCst), 1);
    assert_eq!(dropped.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn replacing_a_source_keeps_the_track() {
    let mixer = Mixer::detached(MixerConfig::default());
    let handle = mixer
        .play_track(tone(10, BYTES_PER_SECOND), PlayOptions::default())
        .expect("play");
    settle().await;
    mixer
        .replace_source(handle, tone(20, BYTES_PER_SECOND))
        .expect("replace");
    settle().await;

    let frame = mixer.mix_tick();
    assert!(samples(&frame).iter().all(|sample| *sample == 20));
    assert_eq!(mixer.channel_of(handle), Some(0));
}

#[tokio::test]
async fn shut_down_mixers_refuse_new_tracks() {
    let mixer = Mixer::detached(MixerConfig::default());
    mixer.shutdown();
    let err = mixer
        .play_track(tone(1, BYTES_PER_TICK), PlayOptions::default())
        .unwrap_err();
    assert_eq!(err, MixerError::ShutDown);
}

#[tokio::test]
async fn ticker_streams_one_frame_per_tick() {
    use futures_util::StreamExt;

    let (mixer, mut output) = Mixer::new(MixerConfig::default());
    mixer
        .play_track(tone(7, BYTES_PER_SECOND), PlayOptions::default())
        .expect("play");
    let frame = tokio::time::timeout(Duration::from_secs(1), output.next())
        .await
        .expect("frame in time")
        .expect("stream open");
    assert_eq!(frame.len(), BYTES_PER_TICK);
    mixer.shutdown();
}

#[tokio::test]
async fn registry_shares_one_mixer_per_scope() {
    let registry = MixerRegistry::new(MixerConfig::default());
    let created = Arc::new(AtomicUsize::new(0));

    let first = {
        let created = created.clone();
        registry.get_or_create("guild-1", move |_output| {
            created.fetch_add(1, Ordering::SeqCst);
        })
    };
    let again = registry.get_or_create("guild-1", |_output| panic!("created twice"));
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    registry.get_or_create("guild-2", |_output| {});
    assert_eq!(registry.len(), 2);

    assert!(registry.remove("guild-1"));
    assert!(!registry.remove("guild-1"));
    assert!(registry.get("guild-1").is_none());
    assert!(first
        .play_track(tone(1, BYTES_PER_TICK), PlayOptions::default())
        .is_err());
}

#[tokio::test]
async fn transcoder_fails_fast_when_saturated() {
    let transcoder = Transcoder::new("ffmpeg", 0);
    let err = transcoder
        .transcode(MediaInput::Url("https://example.com/a.mp3".into()), &[])
        .err()
        .expect("no slots");
    assert!(matches!(err, TranscodeError::Busy { limit: 0 }));
}

#[tokio::test]
async fn transcoder_releases_its_slot_when_spawning_fails() {
    let transcoder = Transcoder::new("/nonexistent/reconcord-ffmpeg", 1);
    let err = transcoder
        .transcode(MediaInput::Bytes(Arc::from(&b"abc"[..])), &["volume=0.5".to_string()])
        .err()
        .expect("missing binary");
    assert!(matches!(err, TranscodeError::Spawn { .. }));
    assert_eq!(transcoder.available(), 1);
}
