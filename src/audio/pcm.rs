//! Signed 16-bit little-endian PCM arithmetic.

/// Adds `frame`, scaled by `volume`, onto the accumulator. Trailing odd bytes
/// are ignored and a short frame leaves the remaining slots untouched, which
/// is the same as mixing in silence.
pub fn accumulate(acc: &mut [i32], frame: &[u8], volume: f32) {
    for (slot, sample) in acc.iter_mut().zip(frame.chunks_exact(2)) {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        let scaled = (f32::from(value) * volume).round() as i32;
        *slot = slot.saturating_add(scaled);
    }
}

/// Clamps accumulated samples into the i16 range and encodes them.
pub fn encode_clipped(acc: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(acc.len() * 2);
    for sample in acc {
        let clipped = (*sample).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        out.extend_from_slice(&clipped.to_le_bytes());
    }
    out
}

/// Mixes frames of `len` bytes with their volumes into one clipped frame.
pub fn mix(frames: &[(&[u8], f32)], len: usize) -> Vec<u8> {
    let mut acc = vec![0i32; len / 2];
    for (frame, volume) in frames {
        accumulate(&mut acc, frame, *volume);
    }
    encode_clipped(&acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(sample: i16, samples: usize) -> Vec<u8> {
        sample.to_le_bytes().repeat(samples)
    }

    #[test]
    fn silence_mixes_to_silence() {
        let silent = frame_of(0, 8);
        let out = mix(&[(&silent, 1.0), (&silent, 1.0)], 16);
        assert!(out.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn loud_channels_clip_instead_of_wrapping() {
        let loud = frame_of(i16::MAX, 8);
        let out = mix(&[(&loud, 1.0), (&loud, 1.0)], 16);
        assert_eq!(out, frame_of(i16::MAX, 8));

        let quiet = frame_of(i16::MIN, 8);
        let out = mix(&[(&quiet, 1.0), (&quiet, 1.0)], 16);
        assert_eq!(out, frame_of(i16::MIN, 8));
    }

    #[test]
    fn volume_scales_each_channel() {
        let frame = frame_of(1000, 4);
        let out = mix(&[(&frame, 0.5), (&frame, 0.25)], 8);
        assert_eq!(out, frame_of(750, 4));
    }

    #[test]
    fn short_frames_are_padded_with_silence() {
        let frame = frame_of(100, 2);
        let out = mix(&[(&frame, 1.0)], 8);
        assert_eq!(out, [frame_of(100, 2), frame_of(0, 2)].concat());
    }
}
