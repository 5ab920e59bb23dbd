//! Client-side voice audio for a networked virtual world.
//!
//! - [`audio`] - Sample buffers, resampling, noise gate, procedural sounds and jitter statistics
//! - [`io`] - Device and network boundaries (traits, wire format, in-memory devices)
//! - [`pipeline`] - Capture and playback orchestration
//! - [`state`] - Configuration and shared runtime settings
//! - [`client`] - Device lifecycle and the dedicated audio worker thread

pub mod audio;
pub mod client;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod state;

pub use client::{AudioClient, AudioEvent, AudioWorker};
pub use error::AudioError;
pub use state::{AudioConfig, AudioSettings};
