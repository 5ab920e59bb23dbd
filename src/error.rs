use thiserror::Error;

use crate::audio::format::AudioFormat;

/// Failures reported by the audio subsystem.
///
/// None of these are fatal: a failed direction degrades to "no audio" while the
/// rest of the client keeps running.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device {device} supports neither {format} nor a usable fallback")]
    UnsupportedFormat { device: String, format: AudioFormat },

    #[error("device {device} could not be opened: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("unsupported format conversion {from} -> {to}")]
    UnsupportedConversion { from: AudioFormat, to: AudioFormat },

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("audio worker is not running")]
    WorkerStopped,
}
