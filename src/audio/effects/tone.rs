//! Test tone injection.

use std::f32::consts::TAU;

use super::level_meter::average_loudness;
use crate::audio::format::SAMPLE_RATE;

const TONE_FREQUENCY_HZ: f32 = 220.0;
const QUARTER_VOLUME: f32 = 8192.0;

/// Replaces `frame` with a 220 Hz sine at quarter volume, starting at sample
/// `phase`, and returns the frame's loudness.
pub fn inject_tone(frame: &mut [i16], phase: u64) -> f32 {
    let step = TONE_FREQUENCY_HZ / SAMPLE_RATE as f32 * TAU;
    for (i, sample) in frame.iter_mut().enumerate() {
        let t = (phase + i as u64) as f32;
        *sample = (QUARTER_VOLUME * (step * t).sin()) as i16;
    }
    average_loudness(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_amplitude_and_loudness() {
        let mut frame = vec![0i16; 256];
        let loudness = inject_tone(&mut frame, 0);

        assert_eq!(frame[0], 0);
        assert!(frame.iter().all(|&s| s.abs() <= QUARTER_VOLUME as i16));
        assert!(frame.iter().any(|&s| s > 8000));
        // Mean of |sin| is 2/pi of the peak.
        assert!((loudness - QUARTER_VOLUME * 2.0 / std::f32::consts::PI).abs() < 300.0);
    }

    #[test]
    fn test_tone_is_continuous_across_frames() {
        let mut first = vec![0i16; 256];
        let mut second = vec![0i16; 256];
        inject_tone(&mut first, 0);
        inject_tone(&mut second, 256);

        let mut whole = vec![0i16; 512];
        inject_tone(&mut whole, 0);
        assert_eq!(&whole[..256], &first[..]);
        assert_eq!(&whole[256..], &second[..]);
    }
}
