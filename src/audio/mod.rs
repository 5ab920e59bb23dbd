//! Audio data types and signal processing.
//!
//! # Data Types
//! - [`format::AudioFormat`] - Sample rate and channel count of 16-bit PCM
//! - [`sample`] - Saturating mixing and byte conversion helpers
//!
//! # Buffers
//! - [`buffers::SampleRingBuffer`] - Fixed-capacity FIFO with a starvation flag
//! - [`buffers::SpatialAccumulationBuffer`] - Time-indexed mixing buffer
//!
//! # Processing
//! - [`resample`] - Linear resampling between device and network formats
//! - [`effects`] - Noise gate, tone injection and procedural sounds
//! - [`jitter`] - Inter-arrival statistics for jitter buffer sizing

pub mod buffers;
pub mod effects;
pub mod format;
pub mod jitter;
pub mod resample;
pub mod sample;

pub use buffers::{SampleRingBuffer, SpatialAccumulationBuffer};
pub use effects::{NoiseGate, ProceduralSounds};
pub use format::AudioFormat;
pub use jitter::JitterEstimator;
pub use resample::linear_resampling;
