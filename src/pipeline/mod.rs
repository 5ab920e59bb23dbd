//! Capture and playback orchestration.
//!
//! - [`InputPipeline`] - Device bytes in, gated network frames out
//! - [`OutputPipeline`] - Network frames in, jitter-buffered device bytes out
//! - [`SpatialAudioProcessor`] - Hook for positional processing of inbound and local audio
//! - [`PipelineStats`] - Snapshot of counters for display

pub mod input;
pub mod output;

pub use input::InputPipeline;
pub use output::{DelayedEcho, OutputPipeline, SpatialAudioProcessor};

/// Point-in-time view of both pipelines.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub total_packets_received: u64,
    pub total_input_frames: u64,
    pub last_input_loudness: f32,
    /// Seconds since the microphone last clipped.
    pub time_since_last_clip: Option<f32>,
    pub noise_gate_open: bool,
    pub noise_floor: f32,
    pub measured_jitter_ms: f32,
    pub jitter_buffer_samples: usize,
    pub ring_buffer_samples: usize,
    /// Counts down from 10 after the output starves.
    pub starve_display_frames: u32,
    pub dropped_samples: u64,
}

impl PipelineStats {
    pub fn collect(input: &InputPipeline, output: &OutputPipeline) -> Self {
        Self {
            total_packets_received: output.jitter().packets_received(),
            total_input_frames: input.frames_processed(),
            last_input_loudness: input.last_input_loudness(),
            time_since_last_clip: input.noise_gate().time_since_last_clip(),
            noise_gate_open: input.noise_gate().is_open(),
            noise_floor: input.noise_gate().measured_floor(),
            measured_jitter_ms: output.jitter().measured_jitter_ms(),
            jitter_buffer_samples: output.jitter_buffer_samples(),
            ring_buffer_samples: output.ring().samples_available(),
            starve_display_frames: output.starve_display_frames(),
            dropped_samples: output.dropped_samples(),
        }
    }

    /// Whether the microphone clipped within the last second.
    pub fn is_clipping(&self) -> bool {
        matches!(self.time_since_last_clip, Some(t) if t < 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AudioSettings;

    #[test]
    fn test_is_clipping_within_one_second() {
        let stats = |time_since_last_clip| PipelineStats {
            time_since_last_clip,
            ..PipelineStats::default()
        };
        assert!(stats(Some(0.0)).is_clipping());
        assert!(stats(Some(0.9)).is_clipping());
        assert!(!stats(Some(1.5)).is_clipping());
        assert!(!stats(None).is_clipping());
    }

    #[test]
    fn test_collect_from_idle_pipelines() {
        let settings = AudioSettings::default();
        let input = InputPipeline::new(settings.clone());
        let output = OutputPipeline::new(settings, 480, false);
        let stats = PipelineStats::collect(&input, &output);
        assert_eq!(stats.total_packets_received, 0);
        assert_eq!(stats.jitter_buffer_samples, 480);
        assert!(!stats.is_clipping());
    }
}
