//! Configuration and shared runtime settings.
//!
//! - [`AudioConfig`] - Startup configuration, loadable from JSON
//! - [`AudioSettings`] - Live switches shared between the UI side and the audio thread

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::info;

/// Startup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub muted: bool,
    pub noise_gate_enabled: bool,
    pub tone_injection_enabled: bool,
    pub spatial_processing_enabled: bool,
    /// Also mix the unprocessed inbound audio into the spatial stream.
    pub spatial_include_original: bool,
    /// Fixed jitter buffer size in samples; 0 lets measured jitter decide.
    pub jitter_buffer_samples: u32,
    /// Jitter buffer size used until the first measurement arrives.
    pub initial_jitter_buffer_samples: u32,
    /// Mirror the microphone to the local output.
    pub echo_local_audio: bool,
    /// Ask the server to send our own voice back.
    pub echo_server_audio: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            muted: false,
            noise_gate_enabled: true,
            tone_injection_enabled: false,
            spatial_processing_enabled: false,
            spatial_include_original: true,
            jitter_buffer_samples: 0,
            initial_jitter_buffer_samples: 0,
            echo_local_audio: false,
            echo_server_audio: false,
        }
    }
}

impl AudioConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read audio config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Failed to parse audio config {}", path.display()))?;
        info!("Loaded audio config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Runtime switches read by the pipelines on every callback.
///
/// Cloning shares the same underlying flags.
#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub muted: Arc<AtomicBool>,
    pub noise_gate_enabled: Arc<AtomicBool>,
    pub tone_injection_enabled: Arc<AtomicBool>,
    pub spatial_include_original: Arc<AtomicBool>,
    pub echo_local_audio: Arc<AtomicBool>,
    pub echo_server_audio: Arc<AtomicBool>,
    pub jitter_buffer_samples: Arc<AtomicU32>,
    /// Last input loudness as f32 bits, for meters.
    pub input_level: Arc<AtomicU32>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

impl AudioSettings {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            muted: Arc::new(AtomicBool::new(config.muted)),
            noise_gate_enabled: Arc::new(AtomicBool::new(config.noise_gate_enabled)),
            tone_injection_enabled: Arc::new(AtomicBool::new(config.tone_injection_enabled)),
            spatial_include_original: Arc::new(AtomicBool::new(config.spatial_include_original)),
            echo_local_audio: Arc::new(AtomicBool::new(config.echo_local_audio)),
            echo_server_audio: Arc::new(AtomicBool::new(config.echo_server_audio)),
            jitter_buffer_samples: Arc::new(AtomicU32::new(config.jitter_buffer_samples)),
            input_level: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn is_noise_gate_enabled(&self) -> bool {
        self.noise_gate_enabled.load(Ordering::Relaxed)
    }

    pub fn is_tone_injection_enabled(&self) -> bool {
        self.tone_injection_enabled.load(Ordering::Relaxed)
    }

    pub fn includes_original_in_spatial(&self) -> bool {
        self.spatial_include_original.load(Ordering::Relaxed)
    }

    pub fn is_echo_local_audio(&self) -> bool {
        self.echo_local_audio.load(Ordering::Relaxed)
    }

    pub fn is_echo_server_audio(&self) -> bool {
        self.echo_server_audio.load(Ordering::Relaxed)
    }

    /// Pinned jitter buffer size, or `None` for automatic sizing.
    pub fn pinned_jitter_buffer_samples(&self) -> Option<usize> {
        match self.jitter_buffer_samples.load(Ordering::Relaxed) {
            0 => None,
            samples => Some(samples as usize),
        }
    }

    pub fn set_jitter_buffer_samples(&self, samples: u32) {
        self.jitter_buffer_samples.store(samples, Ordering::Relaxed);
    }

    pub fn input_level(&self) -> f32 {
        f32::from_bits(self.input_level.load(Ordering::Relaxed))
    }

    pub fn set_input_level(&self, level: f32) {
        self.input_level.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Returns the new state.
    pub fn toggle_mute(&self) -> bool {
        toggle(&self.muted)
    }

    pub fn toggle_noise_gate(&self) -> bool {
        toggle(&self.noise_gate_enabled)
    }

    pub fn toggle_tone_injection(&self) -> bool {
        toggle(&self.tone_injection_enabled)
    }
}

fn toggle(flag: &AtomicBool) -> bool {
    !flag.fetch_xor(true, Ordering::Relaxed)
}
