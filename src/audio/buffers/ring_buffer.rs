//! Fixed-capacity circular buffer of 16-bit samples.
//!
//! Storage is allocated once; writes that do not fit are truncated rather than
//! growing the buffer or blocking the caller.

use std::ops::{Index, IndexMut};

use crate::audio::format::RING_BUFFER_LENGTH_FRAMES;

/// A bounded FIFO of samples with an explicit starvation flag.
///
/// # Invariants
///
/// - `0 <= available <= capacity`
/// - `read_pos` and `write_pos` are always `< capacity` (or both 0 when the
///   capacity is 0)
/// - reads never pass the write cursor
#[derive(Debug, Clone)]
pub struct SampleRingBuffer {
    data: Box<[i16]>,
    read_pos: usize,
    write_pos: usize,
    available: usize,
    starved: bool,
}

impl SampleRingBuffer {
    /// Creates a buffer holding [`RING_BUFFER_LENGTH_FRAMES`] frames of
    /// `frame_samples` samples each. Starts out starved.
    pub fn new(frame_samples: usize) -> Self {
        Self::with_capacity(frame_samples * RING_BUFFER_LENGTH_FRAMES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            available: 0,
            starved: true,
        }
    }

    /// Reallocates storage for a new frame size and resets the buffer.
    pub fn resize_for_frame_size(&mut self, frame_samples: usize) {
        let capacity = frame_samples * RING_BUFFER_LENGTH_FRAMES;
        if capacity != self.data.len() {
            self.data = vec![0; capacity].into_boxed_slice();
        }
        self.reset();
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn samples_available(&self) -> usize {
        self.available
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Appends as many samples as fit. Returns the number written.
    pub fn write(&mut self, samples: &[i16]) -> usize {
        let count = samples.len().min(self.free_space());
        if count == 0 {
            return 0;
        }

        let margin = self.capacity() - self.write_pos;
        if count > margin {
            self.data[self.write_pos..].copy_from_slice(&samples[..margin]);
            self.data[..count - margin].copy_from_slice(&samples[margin..count]);
        } else {
            self.data[self.write_pos..self.write_pos + count].copy_from_slice(&samples[..count]);
        }

        self.write_pos = (self.write_pos + count) % self.capacity();
        self.available += count;
        count
    }

    /// Appends `count` zero samples, truncated like [`write`](Self::write).
    pub fn add_silent_frame(&mut self, count: usize) -> usize {
        let count = count.min(self.free_space());
        for _ in 0..count {
            self.data[self.write_pos] = 0;
            self.write_pos = (self.write_pos + 1) % self.capacity();
        }
        self.available += count;
        count
    }

    /// Copies up to `output.len()` samples out and advances the read cursor.
    ///
    /// Callers are expected to check [`samples_available`](Self::samples_available)
    /// first; a short read returns the count actually copied and leaves the rest
    /// of `output` untouched.
    pub fn read(&mut self, output: &mut [i16]) -> usize {
        let count = output.len().min(self.available);
        if count == 0 {
            return 0;
        }

        let margin = self.capacity() - self.read_pos;
        if count > margin {
            output[..margin].copy_from_slice(&self.data[self.read_pos..]);
            output[margin..count].copy_from_slice(&self.data[..count - margin]);
        } else {
            output[..count].copy_from_slice(&self.data[self.read_pos..self.read_pos + count]);
        }

        self.read_pos = (self.read_pos + count) % self.capacity();
        self.available -= count;
        count
    }

    pub fn is_starved(&self) -> bool {
        self.starved
    }

    pub fn set_starved(&mut self, starved: bool) {
        self.starved = starved;
    }

    /// True while playing back, or once a starved buffer has refilled to
    /// `minimum` samples.
    pub fn is_not_starved_or_has_minimum_samples(&self, minimum: usize) -> bool {
        !self.starved || self.available >= minimum
    }

    /// Drops all buffered samples. The starvation flag is left alone.
    pub fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.available = 0;
    }

    fn physical_index(&self, offset: usize) -> usize {
        assert!(
            offset < self.capacity(),
            "offset {} out of bounds for capacity {}",
            offset,
            self.capacity()
        );
        (self.read_pos + offset) % self.capacity()
    }
}

/// Random access relative to the read cursor.
impl Index<usize> for SampleRingBuffer {
    type Output = i16;

    fn index(&self, offset: usize) -> &i16 {
        &self.data[self.physical_index(offset)]
    }
}

impl IndexMut<usize> for SampleRingBuffer {
    fn index_mut(&mut self, offset: usize) -> &mut i16 {
        let index = self.physical_index(offset);
        &mut self.data[index]
    }
}
