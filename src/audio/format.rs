//! PCM formats and the fixed network framing constants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network sample rate in Hz.
pub const SAMPLE_RATE: u32 = 24000;

/// Samples per channel in one network frame.
pub const NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL: usize = 256;

/// Bytes per channel in one network frame.
pub const NETWORK_BUFFER_LENGTH_BYTES_PER_CHANNEL: usize =
    NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL * BYTES_PER_SAMPLE;

/// Samples in one interleaved stereo network frame.
pub const NETWORK_BUFFER_LENGTH_SAMPLES_STEREO: usize = NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL * 2;

/// How many frames a ring buffer holds.
pub const RING_BUFFER_LENGTH_FRAMES: usize = 10;

/// Duration of one network frame in milliseconds.
pub const AUDIO_CALLBACK_MSECS: f32 =
    NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL as f32 / SAMPLE_RATE as f32 * 1000.0;

pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<i16>();

/// Input callbacks are sized inversely to this ratio; the value depends on how
/// each platform's audio stack delivers input.
#[cfg(target_os = "windows")]
pub const CALLBACK_ACCELERATOR_RATIO: f32 = 0.4;
#[cfg(not(target_os = "windows"))]
pub const CALLBACK_ACCELERATOR_RATIO: f32 = 2.0;

/// A 16-bit signed little-endian PCM format.
///
/// Sample width and byte order are fixed, so two formats are compatible exactly
/// when rate and channel count match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Format of captured audio on the wire: network rate, mono.
    pub const fn network_input() -> Self {
        Self::new(SAMPLE_RATE, 1)
    }

    /// Format of mixed audio received from the network: network rate, stereo.
    pub const fn network_output() -> Self {
        Self::new(SAMPLE_RATE, 2)
    }

    pub fn is_compatible(&self, other: &AudioFormat) -> bool {
        self == other
    }

    /// `(srcRate / dstRate) * (srcChannels / dstChannels)`, which selects the
    /// resampling path.
    pub fn conversion_ratio(&self, destination: &AudioFormat) -> f32 {
        (self.sample_rate as f32 / destination.sample_rate as f32)
            * (self.channels as f32 / destination.channels as f32)
    }

    pub fn with_channels(self, channels: u16) -> Self {
        Self { channels, ..self }
    }

    pub fn with_sample_rate(self, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch/s16le", self.sample_rate, self.channels)
    }
}

/// Bytes the input device should deliver per callback for `format`.
pub fn input_callback_bytes(format: &AudioFormat) -> usize {
    let bytes = (NETWORK_BUFFER_LENGTH_BYTES_PER_CHANNEL
        * format.channels as usize
        * (format.sample_rate / SAMPLE_RATE) as usize) as f32
        / CALLBACK_ACCELERATOR_RATIO;
    (bytes + 0.5) as usize
}

/// How many device samples make up one network frame's worth of input.
pub fn device_to_network_input_ratio(callback_bytes: usize) -> usize {
    (callback_bytes as f32 * CALLBACK_ACCELERATOR_RATIO / NETWORK_BUFFER_LENGTH_BYTES_PER_CHANNEL as f32
        + 0.5) as usize
}

/// Frame size used to dimension the input ring buffer.
pub fn frame_samples_for_callback(callback_bytes: usize) -> usize {
    (callback_bytes as f32 * CALLBACK_ACCELERATOR_RATIO + 0.5) as usize / BYTES_PER_SAMPLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_formats() {
        let input = AudioFormat::network_input();
        let output = AudioFormat::network_output();
        assert!(!input.is_compatible(&output));
        assert!(output.is_compatible(&AudioFormat::new(24000, 2)));
        assert_eq!(input.conversion_ratio(&output), 0.5);
    }

    #[test]
    fn test_callback_sizing_native_format() {
        let bytes = input_callback_bytes(&AudioFormat::network_input());
        assert_eq!(device_to_network_input_ratio(bytes), 1);
        assert_eq!(
            frame_samples_for_callback(bytes),
            NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL
        );
    }

    #[test]
    fn test_callback_sizing_double_rate_stereo() {
        let bytes = input_callback_bytes(&AudioFormat::new(48000, 2));
        assert_eq!(device_to_network_input_ratio(bytes), 4);
        assert_eq!(frame_samples_for_callback(bytes), 1024);
    }
}
