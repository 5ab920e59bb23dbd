//! 16-bit sample helpers shared by buffers, effects and the wire codec.

pub const MIN_SAMPLE_VALUE: i16 = i16::MIN;
pub const MAX_SAMPLE_VALUE: i16 = i16::MAX;

/// Adds two samples, saturating at the i16 range instead of wrapping.
#[inline]
pub fn mix_sample(existing: i16, incoming: i16) -> i16 {
    (existing as i32 + incoming as i32).clamp(MIN_SAMPLE_VALUE as i32, MAX_SAMPLE_VALUE as i32) as i16
}

/// Converts a float produced by a synthesizer into a sample, saturating.
#[inline]
pub fn sample_from_f32(value: f32) -> i16 {
    value.clamp(MIN_SAMPLE_VALUE as f32, MAX_SAMPLE_VALUE as f32) as i16
}

/// Decodes little-endian PCM bytes. A trailing odd byte is ignored.
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encodes samples as little-endian PCM bytes.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
