//! Audio buffer implementations.
//!
//! - [`SampleRingBuffer`] - Fixed-capacity FIFO of samples with a starvation flag
//! - [`SpatialAccumulationBuffer`] - Ring buffer addressed by sample time that mixes overlapping contributions

pub mod ring_buffer;
pub mod spatial_buffer;

pub use ring_buffer::SampleRingBuffer;
pub use spatial_buffer::SpatialAccumulationBuffer;
