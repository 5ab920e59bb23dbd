//! Device lifecycle around the two pipelines.

use std::time::Instant;

use bytes::Bytes;
use tracing::{info, warn};

use crate::audio::format::AudioFormat;
use crate::error::AudioError;
use crate::io::audio::{AudioDeviceInfo, AudioInputDevice, adjusted_format_for_device};
use crate::io::network::{FrameTransport, PositionProvider};
use crate::pipeline::{InputPipeline, OutputPipeline, PipelineStats, SpatialAudioProcessor};
use crate::state::{AudioConfig, AudioSettings};

/// Owns the open devices and both pipelines.
///
/// Everything here runs on one thread; see [`AudioWorker`](super::AudioWorker)
/// for driving it from elsewhere.
pub struct AudioClient {
    settings: AudioSettings,
    input: InputPipeline,
    output: OutputPipeline,
    input_device: Option<Box<dyn AudioInputDevice>>,
    input_device_name: Option<String>,
    output_device_name: Option<String>,
    transport: Box<dyn FrameTransport>,
    position: Box<dyn PositionProvider>,
}

impl AudioClient {
    pub fn new(config: &AudioConfig, transport: Box<dyn FrameTransport>, position: Box<dyn PositionProvider>) -> Self {
        let settings = AudioSettings::from_config(config);
        Self::with_input_pipeline(
            config,
            InputPipeline::new(settings.clone()),
            settings,
            transport,
            position,
        )
    }

    /// Builds a client around a preconfigured input pipeline, e.g. one with
    /// seeded procedural noise.
    pub fn with_input_pipeline(
        config: &AudioConfig,
        input: InputPipeline,
        settings: AudioSettings,
        transport: Box<dyn FrameTransport>,
        position: Box<dyn PositionProvider>,
    ) -> Self {
        let output = OutputPipeline::new(
            settings.clone(),
            config.initial_jitter_buffer_samples as usize,
            config.spatial_processing_enabled,
        );
        Self {
            settings,
            input,
            output,
            input_device: None,
            input_device_name: None,
            output_device_name: None,
            transport,
            position,
        }
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn input_format(&self) -> Option<AudioFormat> {
        self.input.format()
    }

    pub fn output_format(&self) -> Option<AudioFormat> {
        self.output.format()
    }

    pub fn input_device_name(&self) -> Option<&str> {
        self.input_device_name.as_deref()
    }

    pub fn output_device_name(&self) -> Option<&str> {
        self.output_device_name.as_deref()
    }

    pub fn input_pipeline(&self) -> &InputPipeline {
        &self.input
    }

    pub fn output_pipeline(&self) -> &OutputPipeline {
        &self.output
    }

    /// Opens both directions. A failure in one is logged and leaves the other
    /// running.
    pub fn start(
        &mut self,
        input: Option<&dyn AudioDeviceInfo>,
        output: Option<&dyn AudioDeviceInfo>,
    ) -> (Result<Option<AudioFormat>, AudioError>, Result<Option<AudioFormat>, AudioError>) {
        let input_result = self.switch_input_device(input);
        if let Err(e) = &input_result {
            warn!("Unable to set up audio input: {}", e);
        }

        let output_result = self.switch_output_device(output);
        if let Err(e) = &output_result {
            warn!("Unable to set up audio output: {}", e);
        }

        (input_result, output_result)
    }

    /// Shuts down both directions.
    pub fn stop(&mut self) {
        // Switching to no device cannot fail.
        let _ = self.switch_input_device(None);
        let _ = self.switch_output_device(None);
    }

    /// Replaces the input device. `None` just closes the current one.
    pub fn switch_input_device(
        &mut self,
        device: Option<&dyn AudioDeviceInfo>,
    ) -> Result<Option<AudioFormat>, AudioError> {
        if let Some(mut old) = self.input_device.take() {
            old.stop();
        }
        self.input.clear();
        self.input_device_name = None;

        let Some(device) = device else {
            return Ok(None);
        };
        info!("Audio input device {} is available", device.name());

        let desired = AudioFormat::network_input();
        let format = adjusted_format_for_device(device, &desired).ok_or_else(|| AudioError::UnsupportedFormat {
            device: device.name().to_string(),
            format: desired,
        })?;

        let callback_bytes = self.input.configure(format);
        match device.open_input(format, callback_bytes) {
            Ok(stream) => {
                self.input_device = Some(stream);
                self.input_device_name = Some(device.name().trim().to_string());
                Ok(Some(format))
            }
            Err(e) => {
                self.input.clear();
                Err(e)
            }
        }
    }

    /// Replaces the output device. `None` just closes the current one.
    pub fn switch_output_device(
        &mut self,
        device: Option<&dyn AudioDeviceInfo>,
    ) -> Result<Option<AudioFormat>, AudioError> {
        self.output.clear();
        self.output_device_name = None;

        let Some(device) = device else {
            return Ok(None);
        };
        info!("Audio output device {} is available", device.name());

        let desired = AudioFormat::network_output();
        let format = adjusted_format_for_device(device, &desired).ok_or_else(|| AudioError::UnsupportedFormat {
            device: device.name().to_string(),
            format: desired,
        })?;

        self.output.configure(device, format)?;
        self.output_device_name = Some(device.name().trim().to_string());
        Ok(Some(format))
    }

    /// Drains the input device and sends every complete frame. Returns the
    /// number of frames sent.
    pub fn handle_audio_input(&mut self) -> usize {
        let Some(device) = self.input_device.as_mut() else {
            return 0;
        };
        let bytes = device.read_available();
        if bytes.is_empty() {
            return 0;
        }

        let output = if self.output.is_active() {
            Some(&mut self.output)
        } else {
            None
        };
        self.input
            .process(&bytes, output, self.transport.as_mut(), self.position.as_ref())
    }

    pub fn add_received_audio(&mut self, datagram: Bytes, received_at: Instant) -> Result<(), AudioError> {
        self.output.add_received_audio(datagram, received_at)
    }

    pub fn set_spatial_processor(&mut self, processor: Option<Box<dyn SpatialAudioProcessor>>) {
        self.output.set_spatial_processor(processor);
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.settings.toggle_mute()
    }

    pub fn toggle_audio_noise_reduction(&mut self) -> bool {
        self.settings.toggle_noise_gate()
    }

    pub fn toggle_tone_injection(&mut self) -> bool {
        self.settings.toggle_tone_injection()
    }

    /// Returns the new state. Turning it on restarts the spatial timeline.
    pub fn toggle_audio_spatial_processing(&mut self) -> bool {
        let enabled = !self.output.is_spatial_processing_enabled();
        self.output.set_spatial_processing(enabled);
        enabled
    }

    pub fn start_collision_sound(&mut self, magnitude: f32, frequency: f32, noise: f32, duration: f32) {
        self.input
            .procedural_mut()
            .start_collision_sound(magnitude, frequency, noise, duration);
    }

    pub fn start_drum_sound(&mut self, volume: f32, frequency: f32, duration: f32, decay: f32) {
        self.input
            .procedural_mut()
            .start_drum_sound(volume, frequency, duration, decay);
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats::collect(&self.input, &self.output)
    }

    /// Drops buffered playback audio.
    pub fn reset(&mut self) {
        self.output.reset();
    }
}

impl Drop for AudioClient {
    fn drop(&mut self) {
        self.stop();
    }
}
