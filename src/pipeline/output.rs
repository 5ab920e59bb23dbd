//! Playback side: inbound network frames to the output device.

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::audio::buffers::{SampleRingBuffer, SpatialAccumulationBuffer};
use crate::audio::format::{AudioFormat, NETWORK_BUFFER_LENGTH_SAMPLES_STEREO, SAMPLE_RATE};
use crate::audio::jitter::{JitterEstimator, target_jitter_buffer_samples};
use crate::audio::resample::{is_conversion_supported, linear_resampling, resampled_len};
use crate::audio::sample::{sample_from_f32, samples_from_le_bytes, samples_to_le_bytes};
use crate::error::AudioError;
use crate::io::audio::{AudioDeviceInfo, AudioOutputDevice, OutputRole};
use crate::io::network::InboundAudio;
use crate::state::AudioSettings;

/// Frames the starvation indicator stays lit after the output runs dry.
const STARVE_DISPLAY_FRAMES: u32 = 10;

/// Hooks for positional audio.
///
/// The output pipeline hands every inbound block to the processor along with
/// the sample time it will play at; the processor mixes whatever it derives
/// (echoes, reflections) into the accumulation buffer.
pub trait SpatialAudioProcessor: Send {
    fn process_inbound(
        &mut self,
        sample_time: u64,
        samples: &[i16],
        format: &AudioFormat,
        spatial: &mut SpatialAccumulationBuffer,
    );

    /// Clean mono microphone audio, after gating.
    fn process_local(
        &mut self,
        _sample_time: u64,
        _samples: &[i16],
        _format: &AudioFormat,
        _spatial: &mut SpatialAccumulationBuffer,
    ) {
    }

    /// Runs on the original inbound audio before it is accumulated.
    fn pre_process_original(&mut self, _sample_time: u64, _samples: &mut [i16], _format: &AudioFormat) {}
}

/// A single attenuated echo of inbound audio.
#[derive(Debug, Clone, Copy)]
pub struct DelayedEcho {
    /// Delay in ticks of the spatial buffer.
    pub delay: u64,
    pub attenuation: f32,
}

impl SpatialAudioProcessor for DelayedEcho {
    fn process_inbound(
        &mut self,
        sample_time: u64,
        samples: &[i16],
        _format: &AudioFormat,
        spatial: &mut SpatialAccumulationBuffer,
    ) {
        let echo: Vec<i16> = samples
            .iter()
            .map(|&s| sample_from_f32(s as f32 * self.attenuation))
            .collect();
        spatial.accumulate(sample_time + self.delay, &echo);
    }
}

/// Buffers inbound stereo frames and feeds the output device.
pub struct OutputPipeline {
    settings: AudioSettings,
    format: Option<AudioFormat>,
    main: Option<Box<dyn AudioOutputDevice>>,
    loopback: Option<Box<dyn AudioOutputDevice>>,
    procedural: Option<Box<dyn AudioOutputDevice>>,
    ring: SampleRingBuffer,
    spatial: SpatialAccumulationBuffer,
    spatial_enabled: bool,
    spatial_processor: Option<Box<dyn SpatialAudioProcessor>>,
    jitter: JitterEstimator,
    jitter_buffer_samples: usize,
    starve_display_frames: u32,
    dropped_samples: u64,
}

impl OutputPipeline {
    pub fn new(settings: AudioSettings, initial_jitter_buffer_samples: usize, spatial_enabled: bool) -> Self {
        let network = AudioFormat::network_output();
        Self {
            settings,
            format: None,
            main: None,
            loopback: None,
            procedural: None,
            ring: SampleRingBuffer::new(NETWORK_BUFFER_LENGTH_SAMPLES_STEREO),
            spatial: SpatialAccumulationBuffer::new(0, network.channels as usize),
            spatial_enabled,
            spatial_processor: None,
            jitter: JitterEstimator::new(),
            jitter_buffer_samples: initial_jitter_buffer_samples,
            starve_display_frames: 0,
            dropped_samples: 0,
        }
    }

    /// Opens the main, loopback and procedural streams on `device` at
    /// `format`. Only a failure of the main stream is an error.
    pub fn configure(&mut self, device: &dyn AudioDeviceInfo, format: AudioFormat) -> Result<(), AudioError> {
        self.clear();

        let buffer_bytes = self.ring.capacity() * std::mem::size_of::<i16>();
        let main = device.open_output(format, buffer_bytes, OutputRole::Main)?;
        info!(
            "Audio output on {} at {} (ring buffer capacity {} samples)",
            device.name(),
            format,
            self.ring.capacity()
        );

        self.loopback = open_secondary(device, format, buffer_bytes, OutputRole::Loopback);
        self.procedural = open_secondary(device, format, buffer_bytes, OutputRole::Procedural);
        self.main = Some(main);
        self.format = Some(format);

        let network = AudioFormat::network_output();
        if !is_conversion_supported(&network, &format) {
            warn!("Unsupported format conversion {} -> {}, inbound audio will not play", network, format);
        }
        if self.procedural.is_some() && !is_conversion_supported(&AudioFormat::network_input(), &format) {
            warn!("Unsupported format conversion to {}, procedural sounds will not play locally", format);
        }
        self.spatial.resize_for_frame_size(
            format.sample_rate as usize * network.channels as usize,
            network.channels as usize,
        );
        self.jitter.restart_clock();
        Ok(())
    }

    /// Stops and drops every open stream and discards buffered playback, so
    /// the next device starts from an empty, starved buffer.
    pub fn clear(&mut self) {
        for device in [&mut self.main, &mut self.loopback, &mut self.procedural] {
            if let Some(mut device) = device.take() {
                device.stop();
            }
        }
        self.ring.reset();
        self.ring.set_starved(true);
        self.spatial.reset();
        self.starve_display_frames = 0;
        if self.format.take().is_some() {
            debug!("Audio output stopped");
        }
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn is_active(&self) -> bool {
        self.main.is_some()
    }

    pub fn has_procedural_output(&self) -> bool {
        self.procedural.is_some()
    }

    pub fn set_spatial_processor(&mut self, processor: Option<Box<dyn SpatialAudioProcessor>>) {
        self.spatial_processor = processor;
    }

    pub fn is_spatial_processing_enabled(&self) -> bool {
        self.spatial_enabled
    }

    /// Turning spatial processing on starts a fresh timeline.
    pub fn set_spatial_processing(&mut self, enabled: bool) {
        self.spatial_enabled = enabled;
        if enabled {
            self.spatial.reset();
        }
    }

    pub fn spatial(&self) -> &SpatialAccumulationBuffer {
        &self.spatial
    }

    pub fn ring(&self) -> &SampleRingBuffer {
        &self.ring
    }

    pub fn jitter(&self) -> &JitterEstimator {
        &self.jitter
    }

    /// Jitter allowance in effect: the pinned size if set, else the measured one.
    pub fn jitter_buffer_samples(&self) -> usize {
        self.settings
            .pinned_jitter_buffer_samples()
            .unwrap_or(self.jitter_buffer_samples)
    }

    pub fn starve_display_frames(&self) -> u32 {
        self.starve_display_frames
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    pub fn reset(&mut self) {
        self.ring.reset();
    }

    /// Accounts for one inbound datagram and plays whatever is ready.
    pub fn add_received_audio(&mut self, datagram: Bytes, now: Instant) -> Result<(), AudioError> {
        let frame = InboundAudio::parse(datagram)?;

        if let Some(jitter_ms) = self.jitter.on_frame_arrival(now) {
            if self.settings.pinned_jitter_buffer_samples().is_none() {
                self.jitter_buffer_samples =
                    target_jitter_buffer_samples(jitter_ms, SAMPLE_RATE, self.ring.capacity());
                info!(
                    "Jitter {:.2}ms, jitter buffer now {} samples",
                    jitter_ms, self.jitter_buffer_samples
                );
            }
        }

        if self.is_active() {
            self.process_received_audio(&frame.samples());
        }
        Ok(())
    }

    fn process_received_audio(&mut self, samples: &[i16]) {
        let written = self.ring.write(samples);
        if written < samples.len() {
            self.dropped_samples += (samples.len() - written) as u64;
            debug!("Ring buffer full, dropped {} samples", samples.len() - written);
        }

        let (Some(format), Some(main)) = (self.format, self.main.as_ref()) else {
            return;
        };

        self.starve_display_frames = self.starve_display_frames.saturating_sub(1);
        if !self.ring.is_starved() && main.is_drained() {
            debug!("Audio output starved");
            self.ring.set_starved(true);
            self.starve_display_frames = STARVE_DISPLAY_FRAMES;
        }

        let available = self.ring.samples_available();
        if available == 0 {
            return;
        }

        let needed = NETWORK_BUFFER_LENGTH_SAMPLES_STEREO + 2 * self.jitter_buffer_samples();
        if !self.ring.is_not_starved_or_has_minimum_samples(needed) {
            return;
        }
        self.ring.set_starved(false);

        let network_format = AudioFormat::network_output();
        let mut network_samples = vec![0i16; available];
        if self.spatial_enabled {
            let mut inbound = vec![0i16; available];
            self.ring.read(&mut inbound);
            let sample_time = self.spatial.start();

            if self.settings.includes_original_in_spatial() {
                if let Some(processor) = self.spatial_processor.as_mut() {
                    processor.pre_process_original(sample_time, &mut inbound, &network_format);
                }
                self.spatial.accumulate(sample_time, &inbound);
            }
            if let Some(processor) = self.spatial_processor.as_mut() {
                processor.process_inbound(sample_time, &inbound, &network_format, &mut self.spatial);
            }

            self.spatial.read(&mut network_samples);
        } else {
            self.ring.read(&mut network_samples);
        }

        let mut device_samples = vec![0i16; resampled_len(available, &network_format, &format)];
        if linear_resampling(&network_samples, &mut device_samples, &network_format, &format).is_err() {
            return;
        }
        if let Some(main) = self.main.as_mut() {
            main.write(&samples_to_le_bytes(&device_samples));
        }
    }

    /// Offers gated microphone audio to the spatial processor.
    pub fn process_local_audio(&mut self, mono: &[i16]) {
        if !self.spatial_enabled || !self.is_active() {
            return;
        }
        if let Some(processor) = self.spatial_processor.as_mut() {
            processor.process_local(
                self.spatial.start(),
                mono,
                &AudioFormat::network_input(),
                &mut self.spatial,
            );
        }
    }

    /// Mirrors raw device input to the loopback stream.
    pub fn write_loopback(&mut self, input: &[u8], input_format: &AudioFormat) {
        let (Some(format), Some(loopback)) = (self.format, self.loopback.as_mut()) else {
            return;
        };

        if *input_format == format {
            loopback.write(input);
            return;
        }

        let samples = samples_from_le_bytes(input);
        let mut converted = vec![0i16; resampled_len(samples.len(), input_format, &format)];
        if linear_resampling(&samples, &mut converted, input_format, &format).is_ok() {
            loopback.write(&samples_to_le_bytes(&converted));
        }
    }

    /// Plays one network-rate mono frame of synthesized sound.
    pub fn write_procedural(&mut self, mono: &[i16]) {
        let (Some(format), Some(procedural)) = (self.format, self.procedural.as_mut()) else {
            return;
        };

        let network_format = AudioFormat::network_input();
        let mut converted = vec![0i16; resampled_len(mono.len(), &network_format, &format)];
        if linear_resampling(mono, &mut converted, &network_format, &format).is_ok() {
            procedural.write(&samples_to_le_bytes(&converted));
        }
    }
}

impl Drop for OutputPipeline {
    fn drop(&mut self) {
        self.clear();
    }
}

fn open_secondary(
    device: &dyn AudioDeviceInfo,
    format: AudioFormat,
    buffer_bytes: usize,
    role: OutputRole,
) -> Option<Box<dyn AudioOutputDevice>> {
    match device.open_output(format, buffer_bytes, role) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("No {:?} output on {}: {}", role, device.name(), e);
            None
        }
    }
}
