//! Adaptive noise gate for captured audio.
//!
//! The gate measures the noise floor at the microphone and only opens when a
//! frame has enough samples well above that floor. It also tracks clipping and
//! removes the microphone's DC offset.

use tracing::debug;

use crate::audio::format::SAMPLE_RATE;

/// Frames of loudness history used for each floor estimate.
pub const NUMBER_OF_NOISE_SAMPLE_FRAMES: usize = 300;

/// How loud a sample must be relative to the floor to count towards opening.
const NOISE_GATE_HEIGHT: f32 = 7.0;
/// Samples over the height needed in one frame to open the gate.
const NOISE_GATE_WIDTH: usize = 5;
/// Quiet frames the gate stays open for after the last loud one.
const NOISE_GATE_CLOSE_FRAME_DELAY: u32 = 5;
/// Frames averaged together per floor candidate.
const NOISE_GATE_FRAMES_TO_AVERAGE: usize = 5;
const DC_OFFSET_AVERAGING: f32 = 0.99;
const CLIPPING_THRESHOLD: f32 = 0.90;

/// Per-frame measurements taken before gating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLevel {
    /// Mean absolute sample value after DC correction.
    pub loudness: f32,
    /// Samples louder than `floor * NOISE_GATE_HEIGHT`.
    pub samples_over_gate: usize,
}

/// Noise floor estimator with a hysteresis gate.
///
/// # Example
///
/// ```ignore
/// let mut gate = NoiseGate::new();
/// let loudness = gate.process(&mut frame, settings.is_noise_gate_enabled());
/// ```
#[derive(Debug, Clone)]
pub struct NoiseGate {
    measured_floor: f32,
    sample_frames: Box<[f32; NUMBER_OF_NOISE_SAMPLE_FRAMES]>,
    sample_counter: usize,
    open: bool,
    frames_to_close: u32,
    dc_offset: Option<f32>,
    time_since_last_clip: Option<f32>,
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseGate {
    pub fn new() -> Self {
        Self {
            measured_floor: 0.0,
            sample_frames: Box::new([0.0; NUMBER_OF_NOISE_SAMPLE_FRAMES]),
            sample_counter: 0,
            open: false,
            frames_to_close: 0,
            dc_offset: None,
            time_since_last_clip: None,
        }
    }

    pub fn measured_floor(&self) -> f32 {
        self.measured_floor
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn dc_offset(&self) -> f32 {
        self.dc_offset.unwrap_or(0.0)
    }

    /// Seconds since a sample last came within 10% of full scale, or `None` if
    /// nothing has clipped yet.
    pub fn time_since_last_clip(&self) -> Option<f32> {
        self.time_since_last_clip
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Runs the full gate on one frame and returns its loudness (0 when the
    /// gate is closed). With `enabled == false` only DC correction is applied.
    pub fn process(&mut self, frame: &mut [i16], enabled: bool) -> f32 {
        let level = self.condition(frame);
        if enabled {
            self.gate(frame, level)
        } else {
            level.loudness
        }
    }

    /// Clip detection, DC offset removal and level measurement.
    ///
    /// Samples are corrected by the offset estimated from previous frames; the
    /// estimate is then updated from this frame's raw mean.
    pub fn condition(&mut self, frame: &mut [i16]) -> FrameLevel {
        if frame.is_empty() {
            return FrameLevel {
                loudness: 0.0,
                samples_over_gate: 0,
            };
        }

        if let Some(elapsed) = self.time_since_last_clip.as_mut() {
            *elapsed += frame.len() as f32 / SAMPLE_RATE as f32;
        }

        let offset = self.dc_offset() as i16;
        let gate_height = self.measured_floor * NOISE_GATE_HEIGHT;
        let mut measured_dc_offset = 0.0f32;
        let mut loudness = 0.0f32;
        let mut samples_over_gate = 0;

        for sample in frame.iter_mut() {
            measured_dc_offset += *sample as f32;
            *sample = sample.saturating_sub(offset);

            let magnitude = (*sample as f32).abs();
            if magnitude >= i16::MAX as f32 * CLIPPING_THRESHOLD {
                self.time_since_last_clip = Some(0.0);
            }
            loudness += magnitude;
            if magnitude > gate_height {
                samples_over_gate += 1;
            }
        }

        measured_dc_offset /= frame.len() as f32;
        self.dc_offset = Some(match self.dc_offset {
            None => measured_dc_offset,
            Some(current) => DC_OFFSET_AVERAGING * current + (1.0 - DC_OFFSET_AVERAGING) * measured_dc_offset,
        });

        FrameLevel {
            loudness: loudness / frame.len() as f32,
            samples_over_gate,
        }
    }

    /// Records the frame's loudness, re-estimates the floor when the history
    /// fills, and opens or closes the gate. A closed gate zeroes the frame.
    pub fn gate(&mut self, frame: &mut [i16], level: FrameLevel) -> f32 {
        self.sample_frames[self.sample_counter] = level.loudness;
        self.sample_counter += 1;
        if self.sample_counter == NUMBER_OF_NOISE_SAMPLE_FRAMES {
            self.measured_floor = self.estimate_floor();
            self.sample_counter = 0;
            debug!("Noise gate floor re-estimated: {:.2}", self.measured_floor);
        }

        if level.samples_over_gate > NOISE_GATE_WIDTH {
            self.open = true;
            self.frames_to_close = NOISE_GATE_CLOSE_FRAME_DELAY;
        } else if self.frames_to_close == 0 {
            self.open = false;
        } else {
            self.frames_to_close -= 1;
        }

        if self.open {
            level.loudness
        } else {
            frame.fill(0);
            0.0
        }
    }

    /// Smallest average over consecutive groups of frames; resistant to
    /// transient loud frames.
    fn estimate_floor(&self) -> f32 {
        self.sample_frames
            .chunks_exact(NOISE_GATE_FRAMES_TO_AVERAGE)
            .map(|group| group.iter().sum::<f32>() / NOISE_GATE_FRAMES_TO_AVERAGE as f32)
            .fold(f32::MAX, f32::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL as FRAME;

    fn loud_frame() -> Vec<i16> {
        // Zero mean so the DC estimate stays at 0.
        (0..FRAME).map(|i| if i % 2 == 0 { 10000 } else { -10000 }).collect()
    }

    #[test]
    fn test_silence_keeps_floor_at_zero_and_gate_closed() {
        let mut gate = NoiseGate::new();
        for _ in 0..NUMBER_OF_NOISE_SAMPLE_FRAMES {
            let mut frame = vec![0i16; FRAME];
            assert_eq!(gate.process(&mut frame, true), 0.0);
            assert!(!gate.is_open());
        }
        assert_eq!(gate.measured_floor(), 0.0);
        assert_eq!(gate.sample_counter, 0);
    }

    #[test]
    fn test_loud_frame_opens_then_closes_after_delay() {
        let mut gate = NoiseGate::new();

        let mut frame = loud_frame();
        let loudness = gate.process(&mut frame, true);
        assert!(gate.is_open());
        assert_eq!(loudness, 10000.0);
        assert_eq!(frame, loud_frame());

        for _ in 0..NOISE_GATE_CLOSE_FRAME_DELAY {
            let mut frame = vec![0i16; FRAME];
            gate.process(&mut frame, true);
            assert!(gate.is_open());
        }

        let mut frame = vec![0i16; FRAME];
        gate.process(&mut frame, true);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_closed_gate_zeroes_frame() {
        let mut gate = NoiseGate::new();
        // Only five samples over the (zero) floor: not enough to open.
        let mut frame = vec![0i16; FRAME];
        for sample in frame.iter_mut().take(NOISE_GATE_WIDTH) {
            *sample = 500;
        }
        assert_eq!(gate.process(&mut frame, true), 0.0);
        assert!(frame.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_disabled_gate_passes_audio() {
        let mut gate = NoiseGate::new();
        let mut frame = vec![0i16; FRAME];
        frame[0] = 100;
        frame[1] = -100;
        let loudness = gate.process(&mut frame, false);
        assert_eq!(frame[0], 100);
        assert_eq!(frame[1], -100);
        assert!(loudness > 0.0);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_floor_is_minimum_group_average() {
        let mut gate = NoiseGate::new();
        // 295 frames of loudness 50 then 5 frames of loudness 10.
        for i in 0..NUMBER_OF_NOISE_SAMPLE_FRAMES {
            let level = if i < 295 { 50 } else { 10 };
            let mut frame: Vec<i16> = (0..FRAME).map(|j| if j % 2 == 0 { level } else { -level }).collect();
            gate.process(&mut frame, true);
        }
        assert_eq!(gate.measured_floor(), 10.0);
    }

    #[test]
    fn test_floor_ignores_single_loud_group_member() {
        let mut gate = NoiseGate::new();
        for i in 0..NUMBER_OF_NOISE_SAMPLE_FRAMES {
            let level = if i % 5 == 0 { 5000 } else { 20 };
            let mut frame: Vec<i16> = (0..FRAME).map(|j| if j % 2 == 0 { level } else { -level }).collect();
            gate.process(&mut frame, true);
        }
        // Every group holds one loud frame: (5000 + 4 * 20) / 5
        assert_eq!(gate.measured_floor(), 1016.0);
    }

    #[test]
    fn test_dc_offset_first_frame_adopts_then_smooths() {
        let mut gate = NoiseGate::new();

        let mut frame = vec![1000i16; FRAME];
        gate.condition(&mut frame);
        // First frame is corrected by the prior (zero) estimate.
        assert!(frame.iter().all(|&s| s == 1000));
        assert_eq!(gate.dc_offset(), 1000.0);

        let mut frame = vec![1000i16; FRAME];
        gate.condition(&mut frame);
        assert!(frame.iter().all(|&s| s == 0));
        assert!((gate.dc_offset() - 1000.0).abs() < 0.01);

        let mut frame = vec![0i16; FRAME];
        gate.condition(&mut frame);
        assert!((gate.dc_offset() - 990.0).abs() < 0.01);
    }

    #[test]
    fn test_clip_detection() {
        let mut gate = NoiseGate::new();
        assert_eq!(gate.time_since_last_clip(), None);

        let mut frame = vec![0i16; FRAME];
        gate.condition(&mut frame);
        assert_eq!(gate.time_since_last_clip(), None);

        let mut frame = vec![0i16; FRAME];
        frame[10] = 31000;
        gate.condition(&mut frame);
        assert_eq!(gate.time_since_last_clip(), Some(0.0));

        let mut frame = vec![0i16; FRAME];
        gate.condition(&mut frame);
        let elapsed = gate.time_since_last_clip().unwrap();
        assert!((elapsed - FRAME as f32 / SAMPLE_RATE as f32).abs() < 1e-6);
    }
}
