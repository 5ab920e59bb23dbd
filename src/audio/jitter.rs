//! Inter-arrival statistics for sizing the playback jitter buffer.

use std::time::Instant;

use tracing::debug;

/// Arrivals ignored at startup; they tend to pile up.
pub const NUM_INITIAL_PACKETS_DISCARD: u64 = 3;
/// Intervals collected before the deviation is reported.
pub const STANDARD_DEVIATION_SAMPLE_COUNT: usize = 500;
const NUM_STANDARD_DEVIATIONS: f32 = 3.0;

/// Running mean and population standard deviation (Welford).
#[derive(Debug, Clone, Default)]
pub struct RunningStdDev {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStdDev {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn samples(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Tracks how regularly inbound frames arrive.
#[derive(Debug, Default)]
pub struct JitterEstimator {
    stats: RunningStdDev,
    packets_received: u64,
    last_arrival: Option<Instant>,
    measured_jitter_ms: f32,
}

impl JitterEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    /// Last reported standard deviation of arrival intervals, in milliseconds.
    pub fn measured_jitter_ms(&self) -> f32 {
        self.measured_jitter_ms
    }

    pub fn samples(&self) -> usize {
        self.stats.samples()
    }

    /// Records one arrival. Returns the new jitter measurement whenever a full
    /// window of intervals has been collected.
    pub fn on_frame_arrival(&mut self, now: Instant) -> Option<f32> {
        self.packets_received += 1;
        let previous = self.last_arrival.replace(now);

        if self.packets_received <= NUM_INITIAL_PACKETS_DISCARD {
            return None;
        }
        let previous = previous?;
        let elapsed_ms = now.saturating_duration_since(previous).as_secs_f64() * 1000.0;
        self.record_interval(elapsed_ms)
    }

    /// Adds one interval to the current window.
    pub fn record_interval(&mut self, interval_ms: f64) -> Option<f32> {
        self.stats.add_value(interval_ms);
        if self.stats.samples() < STANDARD_DEVIATION_SAMPLE_COUNT {
            return None;
        }

        self.measured_jitter_ms = self.stats.std_dev() as f32;
        debug!(
            "Measured jitter {:.3}ms over {} intervals (mean {:.3}ms)",
            self.measured_jitter_ms,
            self.stats.samples(),
            self.stats.mean()
        );
        self.stats.reset();
        Some(self.measured_jitter_ms)
    }

    /// Forgets the previous arrival so a pause isn't counted as jitter.
    pub fn restart_clock(&mut self) {
        self.last_arrival = None;
    }
}

/// Jitter buffer size in samples covering three standard deviations, at most
/// half of `ring_capacity`.
pub fn target_jitter_buffer_samples(jitter_ms: f32, sample_rate: u32, ring_capacity: usize) -> usize {
    let samples = NUM_STANDARD_DEVIATIONS * jitter_ms / 1000.0 * sample_rate as f32;
    (samples.max(0.0) as usize).min(ring_capacity / 2)
}
