//! Locally synthesized sound effects.
//!
//! Two generators can run at once: a collision tone built from three partials
//! and a percussive drum. Each decays per sample and goes quiet on its own; the
//! state stays around so a new trigger simply overwrites it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use crate::audio::format::SAMPLE_RATE;
use crate::audio::sample::{mix_sample, sample_from_f32};

const COLLISION_SOUND_CUTOFF_LEVEL: f32 = 0.01;
const COLLISION_SOUND_MAX_VOLUME: f32 = 1000.0;
const UP_MAJOR_FIFTH: f32 = 1.5 * 1.5 * 1.5 * 1.5;
const DOWN_TWO_OCTAVES: f32 = 4.0;
const DOWN_FOUR_OCTAVES: f32 = 16.0;

const DRUM_MAX_VOLUME: f32 = 32000.0;
const DRUM_MAX_DURATION: f32 = 2.0;
const DRUM_MIN_AUDIBLE_VOLUME: f32 = 0.001;
const DRUM_NOISE_MAGNITUDE: f32 = 0.02;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionSound {
    /// 0-1, 1 being the loudest possible.
    pub magnitude: f32,
    /// Angular frequency in radians per sample.
    pub frequency: f32,
    /// Amount of white noise mixed into the partials.
    pub noise: f32,
    /// Per-sample multiplier applied to `magnitude`.
    pub duration: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrumSound {
    pub volume: f32,
    /// Frequency in Hz.
    pub frequency: f32,
    /// Remaining seconds.
    pub duration: f32,
    /// Fraction of volume lost per sample.
    pub decay: f32,
    sample: u64,
}

/// Collision and drum generators plus the shared effect clock.
pub struct ProceduralSounds {
    collision: CollisionSound,
    drum: DrumSound,
    effect_sample: u64,
    rng: StdRng,
}

impl std::fmt::Debug for ProceduralSounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralSounds")
            .field("collision", &self.collision)
            .field("drum", &self.drum)
            .field("effect_sample", &self.effect_sample)
            .finish()
    }
}

impl Default for ProceduralSounds {
    fn default() -> Self {
        Self::new()
    }
}

impl ProceduralSounds {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic noise, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            collision: CollisionSound::default(),
            drum: DrumSound::default(),
            effect_sample: 0,
            rng,
        }
    }

    pub fn start_collision_sound(&mut self, magnitude: f32, frequency: f32, noise: f32, duration: f32) {
        self.collision = CollisionSound {
            magnitude,
            frequency,
            noise,
            duration,
        };
    }

    pub fn start_drum_sound(&mut self, volume: f32, frequency: f32, duration: f32, decay: f32) {
        self.drum = DrumSound {
            volume,
            frequency,
            duration,
            decay,
            sample: 0,
        };
    }

    pub fn collision(&self) -> &CollisionSound {
        &self.collision
    }

    pub fn drum(&self) -> &DrumSound {
        &self.drum
    }

    /// Running sample clock shared by the collision sound and tone injection.
    pub fn effect_sample(&self) -> u64 {
        self.effect_sample
    }

    pub fn is_active(&self) -> bool {
        self.collision.magnitude > COLLISION_SOUND_CUTOFF_LEVEL || self.drum.volume > 0.0
    }

    /// Adds the active generators to `input` (sent to the network) and to
    /// `local` (played back locally), saturating both. Advances the effect
    /// clock by one frame. Returns whether anything was added.
    pub fn add_sounds(&mut self, input: &mut [i16], local: &mut [i16]) -> bool {
        let num_samples = input.len();
        let mut added = false;

        if self.collision.magnitude > COLLISION_SOUND_CUTOFF_LEVEL {
            added = true;
            let frequency = self.collision.frequency;
            for i in 0..num_samples {
                let t = (self.effect_sample + i as u64) as f32;
                let mut value = (t * frequency).sin()
                    + (t * frequency / DOWN_TWO_OCTAVES).sin()
                    + (t * frequency / DOWN_FOUR_OCTAVES * UP_MAJOR_FIFTH).sin();
                if self.collision.noise > 0.0 {
                    value += (self.rng.r#gen::<f32>() - 0.5) * self.collision.noise;
                }
                value *= self.collision.magnitude * COLLISION_SOUND_MAX_VOLUME;

                mix_into(input, local, i, sample_from_f32(value));
                self.collision.magnitude *= self.collision.duration;
            }
        }
        self.effect_sample += num_samples as u64;

        if self.drum.volume > 0.0 {
            added = true;
            let frequency = self.drum.frequency / SAMPLE_RATE as f32 * TAU;
            for i in 0..num_samples {
                let t = (self.drum.sample + i as u64) as f32;
                let mut value = (t * frequency).sin();
                value += (self.rng.r#gen::<f32>() - 0.5) * DRUM_NOISE_MAGNITUDE;
                value *= self.drum.volume * DRUM_MAX_VOLUME;

                mix_into(input, local, i, sample_from_f32(value));
                self.drum.volume *= 1.0 - self.drum.decay;
            }
            self.drum.sample += num_samples as u64;
            self.drum.duration = (self.drum.duration - num_samples as f32 / SAMPLE_RATE as f32)
                .clamp(0.0, DRUM_MAX_DURATION);
            if self.drum.duration == 0.0 || self.drum.volume < DRUM_MIN_AUDIBLE_VOLUME {
                self.drum.volume = 0.0;
            }
        }

        added
    }
}

fn mix_into(input: &mut [i16], local: &mut [i16], index: usize, value: i16) {
    input[index] = mix_sample(input[index], value);
    if let Some(slot) = local.get_mut(index) {
        *slot = mix_sample(*slot, value);
    }
}
