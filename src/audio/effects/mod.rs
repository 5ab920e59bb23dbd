//! In-place processing applied to captured frames.
//!
//! - [`noise_gate`] - Adaptive floor estimate, DC removal and hysteresis gate
//! - [`level_meter`] - Frame loudness
//! - [`tone`] - 220 Hz test tone
//! - [`procedural`] - Collision and drum sound generators

pub mod level_meter;
pub mod noise_gate;
pub mod procedural;
pub mod tone;

pub use level_meter::average_loudness;
pub use noise_gate::{FrameLevel, NoiseGate};
pub use procedural::ProceduralSounds;
pub use tone::inject_tone;
