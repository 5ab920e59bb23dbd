//! Time-indexed accumulation buffer for positional audio.
//!
//! Contributions for 3D-positioned sources arrive tagged with the source sample
//! time they belong to. They may leave gaps, overlap what is already buffered,
//! or extend past it. This buffer stitches them into one continuous stream:
//! gaps are padded with silence, overlaps are summed with saturation, and
//! anything that does not fit is dropped.

use tracing::debug;

use super::ring_buffer::SampleRingBuffer;
use crate::audio::sample::mix_sample;

/// A [`SampleRingBuffer`] addressed by absolute sample time.
///
/// `[start, finish)` is the span of source ticks currently held, where one tick
/// is one interleaved frame of `channels` samples. The read cursor of the ring
/// always sits at `start`.
#[derive(Debug, Clone)]
pub struct SpatialAccumulationBuffer {
    ring: SampleRingBuffer,
    channels: usize,
    start: u64,
    finish: u64,
}

impl SpatialAccumulationBuffer {
    pub fn new(frame_samples: usize, channels: usize) -> Self {
        Self {
            ring: SampleRingBuffer::new(frame_samples),
            channels: channels.max(1),
            start: 0,
            finish: 0,
        }
    }

    /// Resizes storage and clears the time range.
    pub fn resize_for_frame_size(&mut self, frame_samples: usize, channels: usize) {
        self.ring.resize_for_frame_size(frame_samples);
        self.channels = channels.max(1);
        self.start = 0;
        self.finish = 0;
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn finish(&self) -> u64 {
        self.finish
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn samples_available(&self) -> usize {
        self.ring.samples_available()
    }

    pub fn reset(&mut self) {
        self.ring.reset();
        self.start = 0;
        self.finish = 0;
    }

    /// Merges `samples` (interleaved, `channels` per tick) at `sample_time`.
    ///
    /// Returns how many incoming samples were kept, either mixed or appended.
    pub fn accumulate(&mut self, sample_time: u64, samples: &[i16]) -> usize {
        if sample_time < self.start {
            // The head of this contribution has already been played out.
            let late = ((self.start - sample_time) as usize).saturating_mul(self.channels);
            if late >= samples.len() {
                debug!(
                    "Dropping late spatial contribution at {} (start={})",
                    sample_time, self.start
                );
                return 0;
            }
            return self.accumulate(self.start, &samples[late..]);
        }

        let remaining = self.ring.free_space();

        if sample_time >= self.finish {
            if self.start == self.finish {
                let written = self.ring.write(&samples[..samples.len().min(remaining)]);
                self.finish = self.start + (written / self.channels) as u64;
                written
            } else {
                let delay_count = ((sample_time - self.finish) as usize).saturating_mul(self.channels);
                let silent_count = self.ring.add_silent_frame(delay_count.min(remaining));

                let remaining = remaining - silent_count;
                let written = self.ring.write(&samples[..samples.len().min(remaining)]);
                self.finish += ((written + silent_count) / self.channels) as u64;
                written
            }
        } else {
            let offset = (sample_time - self.start) as usize * self.channels;
            let overlap = ((self.finish - sample_time) as usize * self.channels).min(samples.len());

            for (i, &incoming) in samples[..overlap].iter().enumerate() {
                let slot = &mut self.ring[offset + i];
                *slot = mix_sample(*slot, incoming);
            }

            let tail = &samples[overlap..];
            let written = self.ring.write(&tail[..tail.len().min(remaining)]);
            self.finish += (written / self.channels) as u64;
            overlap + written
        }
    }

    /// Reads `output.len()` samples for playback and advances `start` by the
    /// ticks consumed. Positions not covered by buffered audio read as silence.
    pub fn read(&mut self, output: &mut [i16]) -> usize {
        let read = self.ring.read(output);
        output[read..].fill(0);

        self.start += (output.len() / self.channels) as u64;
        if self.finish < self.start {
            // Consumed past everything buffered; the ring is empty now.
            self.ring.reset();
            self.finish = self.start;
        }
        read
    }
}
