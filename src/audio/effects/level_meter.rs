//! Audio level metering.

/// Mean absolute sample value of a frame, in raw sample units (0..=32768).
pub fn average_loudness(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|&s| (s as f32).abs()).sum();
    sum / samples.len() as f32
}
