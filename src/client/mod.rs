//! Device lifecycle and the dedicated audio thread.
//!
//! - [`AudioClient`] - Opens and switches devices, drives both pipelines
//! - [`AudioWorker`] - Runs an [`AudioClient`] on its own thread, fed by [`AudioEvent`]s

pub mod audio;
pub mod worker;

pub use audio::AudioClient;
pub use worker::{AudioEvent, AudioWorker};
