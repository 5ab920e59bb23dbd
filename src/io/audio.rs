//! Audio device boundary.
//!
//! The pipeline never talks to an OS audio API directly. A device is described
//! by [`AudioDeviceInfo`], which can be asked about formats and opened into a
//! pull-style [`AudioInputDevice`] or push-style [`AudioOutputDevice`] moving
//! raw s16le bytes.

use tracing::{debug, info};

use crate::audio::format::{AudioFormat, SAMPLE_RATE};
use crate::error::AudioError;

/// Which stream an output device is opened for. One physical device carries
/// all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputRole {
    /// Network audio.
    Main,
    /// Local microphone echo.
    Loopback,
    /// Locally synthesized sounds.
    Procedural,
}

/// A device that can be queried and opened.
pub trait AudioDeviceInfo: Send + Sync {
    fn name(&self) -> &str;

    fn is_format_supported(&self, format: &AudioFormat) -> bool;

    fn supported_sample_rates(&self) -> Vec<u32>;

    /// Closest format the device can actually run.
    fn nearest_format(&self, format: &AudioFormat) -> AudioFormat;

    fn open_input(&self, format: AudioFormat, buffer_bytes: usize) -> Result<Box<dyn AudioInputDevice>, AudioError>;

    fn open_output(
        &self,
        format: AudioFormat,
        buffer_bytes: usize,
        role: OutputRole,
    ) -> Result<Box<dyn AudioOutputDevice>, AudioError>;
}

/// An open capture stream.
pub trait AudioInputDevice: Send {
    /// Everything captured since the last call.
    fn read_available(&mut self) -> Vec<u8>;

    fn stop(&mut self);
}

/// An open playback stream.
pub trait AudioOutputDevice: Send {
    fn write(&mut self, bytes: &[u8]);

    fn bytes_free(&self) -> usize;

    fn buffer_size(&self) -> usize;

    fn stop(&mut self);

    /// True once everything written has been played.
    fn is_drained(&self) -> bool {
        self.bytes_free() == self.buffer_size()
    }
}

/// Picks the format to open `device` with when `desired` is the ideal.
///
/// Falls back to stereo at the same rate for a mono request, then to the
/// device's nearest format at twice the network rate. `None` when neither
/// works.
pub fn adjusted_format_for_device(device: &dyn AudioDeviceInfo, desired: &AudioFormat) -> Option<AudioFormat> {
    if device.is_format_supported(desired) {
        return Some(*desired);
    }

    debug!(
        "Desired format {} is not supported by {}",
        desired,
        device.name()
    );

    if desired.channels == 1 {
        let stereo = desired.with_channels(2);
        if device.is_format_supported(&stereo) {
            info!("Using {} for {}", stereo, device.name());
            return Some(stereo);
        }
    }

    if device.supported_sample_rates().contains(&(SAMPLE_RATE * 2)) {
        let doubled = device.nearest_format(&desired.with_sample_rate(SAMPLE_RATE * 2));
        info!("Using {} for {}", doubled, device.name());
        return Some(doubled);
    }

    None
}
