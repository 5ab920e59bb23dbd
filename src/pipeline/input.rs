//! Capture side: device bytes to outbound network frames.

use tracing::{debug, info, warn};

use crate::audio::buffers::SampleRingBuffer;
use crate::audio::effects::{NoiseGate, ProceduralSounds, average_loudness, inject_tone};
use crate::audio::format::{
    AudioFormat, NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL, device_to_network_input_ratio,
    frame_samples_for_callback, input_callback_bytes,
};
use crate::audio::resample::{is_conversion_supported, linear_resampling};
use crate::audio::sample::samples_from_le_bytes;
use crate::io::network::{FrameTransport, PacketType, PositionProvider, VoicePacket};
use crate::pipeline::output::OutputPipeline;
use crate::state::AudioSettings;

/// Turns captured device audio into gated 24 kHz mono frames.
#[derive(Debug)]
pub struct InputPipeline {
    settings: AudioSettings,
    format: Option<AudioFormat>,
    callback_bytes: usize,
    ring: SampleRingBuffer,
    noise_gate: NoiseGate,
    procedural: ProceduralSounds,
    last_input_loudness: f32,
    frames_processed: u64,
}

impl InputPipeline {
    pub fn new(settings: AudioSettings) -> Self {
        Self::with_procedural(settings, ProceduralSounds::new())
    }

    pub fn with_procedural(settings: AudioSettings, procedural: ProceduralSounds) -> Self {
        Self {
            settings,
            format: None,
            callback_bytes: 0,
            ring: SampleRingBuffer::new(0),
            noise_gate: NoiseGate::new(),
            procedural,
            last_input_loudness: 0.0,
            frames_processed: 0,
        }
    }

    /// Sizes the input buffer for a device running at `format`. Returns the
    /// callback size in bytes to request from the device.
    pub fn configure(&mut self, format: AudioFormat) -> usize {
        self.callback_bytes = input_callback_bytes(&format);
        self.ring
            .resize_for_frame_size(frame_samples_for_callback(self.callback_bytes));
        self.noise_gate.reset();
        self.format = Some(format);
        let network_format = AudioFormat::network_input();
        if !is_conversion_supported(&format, &network_format) {
            warn!(
                "Unsupported format conversion {} -> {}, input will be sent as silence",
                format, network_format
            );
        }
        info!(
            "Audio input at {} ({} byte callbacks, {} samples per network frame)",
            format,
            self.callback_bytes,
            self.samples_per_frame()
        );
        self.callback_bytes
    }

    pub fn clear(&mut self) {
        if self.format.take().is_some() {
            debug!("Audio input stopped");
        }
        self.callback_bytes = 0;
        self.ring.reset();
        self.noise_gate.reset();
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn callback_bytes(&self) -> usize {
        self.callback_bytes
    }

    /// Device samples that make up one network frame.
    pub fn samples_per_frame(&self) -> usize {
        NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL * device_to_network_input_ratio(self.callback_bytes)
    }

    pub fn noise_gate(&self) -> &NoiseGate {
        &self.noise_gate
    }

    pub fn procedural(&self) -> &ProceduralSounds {
        &self.procedural
    }

    pub fn procedural_mut(&mut self) -> &mut ProceduralSounds {
        &mut self.procedural
    }

    pub fn last_input_loudness(&self) -> f32 {
        self.last_input_loudness
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Consumes one batch of captured bytes and emits every complete network
    /// frame. Returns how many frames were emitted.
    pub fn process(
        &mut self,
        input: &[u8],
        mut output: Option<&mut OutputPipeline>,
        transport: &mut dyn FrameTransport,
        position: &dyn PositionProvider,
    ) -> usize {
        let Some(format) = self.format else {
            return 0;
        };
        let muted = self.settings.is_muted();

        if self.settings.is_echo_local_audio() && !muted {
            if let Some(output) = output.as_deref_mut() {
                output.write_loopback(input, &format);
            }
        }

        self.ring.write(&samples_from_le_bytes(input));

        let required = self.samples_per_frame();
        if required == 0 {
            return 0;
        }

        let network_format = AudioFormat::network_input();
        let mut device_frame = vec![0i16; required];
        let mut emitted = 0;

        while self.ring.samples_available() >= required {
            self.ring.read(&mut device_frame);

            let mut mono = [0i16; NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL];
            let mut loudness = 0.0;

            if !muted {
                // Unsupported conversions were reported by configure; the frame goes out silent.
                let _ = linear_resampling(&device_frame, &mut mono, &format, &network_format);

                let level = self.noise_gate.condition(&mut mono);
                loudness = if self.settings.is_tone_injection_enabled() {
                    inject_tone(&mut mono, self.procedural.effect_sample())
                } else if self.settings.is_noise_gate_enabled() {
                    self.noise_gate.gate(&mut mono, level)
                } else {
                    level.loudness
                };

                if let Some(output) = output.as_deref_mut() {
                    output.process_local_audio(&mono);
                }
            }

            let mut local = [0i16; NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL];
            if self.procedural.add_sounds(&mut mono, &mut local) {
                loudness = average_loudness(&mono);
            }
            if let Some(output) = output.as_deref_mut() {
                output.write_procedural(&local);
            }

            self.last_input_loudness = loudness;
            self.settings.set_input_level(loudness);
            self.frames_processed += 1;

            if transport.is_connected() {
                let pose = position.head_pose();
                let datagram = if loudness == 0.0 {
                    VoicePacket::encode_silent(&pose, NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL as i16)
                } else {
                    let packet_type = if self.settings.is_echo_server_audio() {
                        PacketType::MicrophoneAudioWithEcho
                    } else {
                        PacketType::MicrophoneAudioNoEcho
                    };
                    VoicePacket::encode(packet_type, &pose, &mono)
                };
                transport.send(datagram);
                emitted += 1;
            }
        }

        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample::samples_to_le_bytes;
    use crate::io::audio::OutputRole;
    use crate::io::memory::MemoryDeviceInfo;
    use crate::io::network::{HeadPose, StaticPosition};
    use bytes::Bytes;

    const FRAME: usize = NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Bytes>,
        connected: bool,
    }

    impl FrameTransport for Recorder {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, datagram: Bytes) {
            self.sent.push(datagram);
        }
    }

    fn connected() -> Recorder {
        Recorder {
            sent: Vec::new(),
            connected: true,
        }
    }

    fn pipeline(settings: AudioSettings, format: AudioFormat) -> InputPipeline {
        let mut pipeline = InputPipeline::with_procedural(settings, ProceduralSounds::with_seed(7));
        pipeline.configure(format);
        pipeline
    }

    fn alternating(len: usize, level: i16) -> Vec<u8> {
        let samples: Vec<i16> = (0..len).map(|i| if i % 2 == 0 { level } else { -level }).collect();
        samples_to_le_bytes(&samples)
    }

    #[test]
    fn test_silent_input_emits_silent_frame() {
        let mut input = pipeline(AudioSettings::default(), AudioFormat::network_input());
        let mut transport = connected();

        let emitted = input.process(
            &samples_to_le_bytes(&[0; FRAME]),
            None,
            &mut transport,
            &StaticPosition::default(),
        );
        assert_eq!(emitted, 1);

        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.packet_type, PacketType::SilentAudioFrame);
        assert_eq!(packet.samples(), vec![FRAME as i16]);
        assert_eq!(input.last_input_loudness(), 0.0);
    }

    #[test]
    fn test_loud_input_opens_gate_and_sends_audio() {
        let mut input = pipeline(AudioSettings::default(), AudioFormat::network_input());
        let mut transport = connected();
        let pose = HeadPose {
            position: [1.0, 2.0, 3.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };

        input.process(&alternating(FRAME, 8000), None, &mut transport, &StaticPosition(pose));

        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.packet_type, PacketType::MicrophoneAudioNoEcho);
        assert_eq!(packet.pose, pose);
        assert_eq!(packet.samples().len(), FRAME);
        assert_eq!(input.last_input_loudness(), 8000.0);
        assert!(input.noise_gate().is_open());
    }

    #[test]
    fn test_echo_server_audio_marks_packet() {
        let settings = AudioSettings::default();
        settings
            .echo_server_audio
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let mut input = pipeline(settings, AudioFormat::network_input());
        let mut transport = connected();

        input.process(&alternating(FRAME, 8000), None, &mut transport, &StaticPosition::default());
        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.packet_type, PacketType::MicrophoneAudioWithEcho);
    }

    #[test]
    fn test_partial_input_waits_for_full_frame() {
        let mut input = pipeline(AudioSettings::default(), AudioFormat::network_input());
        let mut transport = connected();
        let position = StaticPosition::default();

        assert_eq!(input.process(&alternating(FRAME / 2, 8000), None, &mut transport, &position), 0);
        assert_eq!(input.process(&alternating(FRAME + FRAME / 2, 8000), None, &mut transport, &position), 2);
        assert_eq!(transport.sent.len(), 2);
        assert_eq!(input.frames_processed(), 2);
    }

    #[test]
    fn test_stereo_48k_input_is_downsampled() {
        let format = AudioFormat::new(48000, 2);
        let mut input = pipeline(AudioSettings::default(), format);
        assert_eq!(input.samples_per_frame(), 1024);

        let mut transport = connected();
        let emitted = input.process(
            &samples_to_le_bytes(&[4000; 1024]),
            None,
            &mut transport,
            &StaticPosition::default(),
        );
        assert_eq!(emitted, 1);

        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.samples(), vec![4000; FRAME]);
    }

    #[test]
    fn test_muted_input_is_silent() {
        let settings = AudioSettings::default();
        settings.toggle_mute();
        let mut input = pipeline(settings, AudioFormat::network_input());
        let mut transport = connected();

        input.process(&alternating(FRAME, 8000), None, &mut transport, &StaticPosition::default());
        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.packet_type, PacketType::SilentAudioFrame);
    }

    #[test]
    fn test_tone_injection_bypasses_gate() {
        let settings = AudioSettings::default();
        settings.toggle_tone_injection();
        let mut input = pipeline(settings, AudioFormat::network_input());
        let mut transport = connected();

        input.process(&samples_to_le_bytes(&[0; FRAME]), None, &mut transport, &StaticPosition::default());
        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.packet_type, PacketType::MicrophoneAudioNoEcho);
        assert!(input.last_input_loudness() > 0.0);
    }

    #[test]
    fn test_procedural_sound_reaches_network_and_output() {
        let device = MemoryDeviceInfo::new("speakers", vec![AudioFormat::network_output()]);
        let mut output = OutputPipeline::new(AudioSettings::default(), 0, false);
        output.configure(&device, AudioFormat::network_output()).unwrap();
        let tap = device.tap(OutputRole::Procedural);

        let mut input = pipeline(AudioSettings::default(), AudioFormat::network_input());
        input.procedural_mut().start_drum_sound(0.5, 440.0, 1.0, 0.0);
        let mut transport = connected();

        input.process(
            &samples_to_le_bytes(&[0; FRAME]),
            Some(&mut output),
            &mut transport,
            &StaticPosition::default(),
        );

        let packet = VoicePacket::parse(transport.sent.remove(0)).unwrap();
        assert_eq!(packet.packet_type, PacketType::MicrophoneAudioNoEcho);
        let played = samples_from_le_bytes(&tap.drain());
        assert_eq!(played.len(), FRAME * 2);
        assert!(played.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_local_echo_goes_to_loopback() {
        let device = MemoryDeviceInfo::new("speakers", vec![AudioFormat::network_output()]);
        let mut output = OutputPipeline::new(AudioSettings::default(), 0, false);
        output.configure(&device, AudioFormat::network_output()).unwrap();
        let tap = device.tap(OutputRole::Loopback);

        let settings = AudioSettings::default();
        settings
            .echo_local_audio
            .store(true, std::sync::atomic::Ordering::Relaxed);
        let mut input = pipeline(settings, AudioFormat::network_input());
        let mut transport = connected();

        input.process(&alternating(4, 100), Some(&mut output), &mut transport, &StaticPosition::default());
        assert_eq!(samples_from_le_bytes(&tap.drain()), vec![100, 100, -100, -100, 100, 100, -100, -100]);
    }

    #[test]
    fn test_disconnected_transport_sends_nothing() {
        let mut input = pipeline(AudioSettings::default(), AudioFormat::network_input());
        let mut transport = Recorder::default();

        let emitted = input.process(
            &alternating(FRAME, 8000),
            None,
            &mut transport,
            &StaticPosition::default(),
        );
        assert_eq!(emitted, 0);
        assert!(transport.sent.is_empty());
        assert_eq!(input.frames_processed(), 1);
    }

    #[test]
    fn test_reconfigure_and_clear_reset_noise_gate() {
        let mut input = pipeline(AudioSettings::default(), AudioFormat::network_input());
        let mut transport = connected();
        let constant = samples_to_le_bytes(&[5000; FRAME]);

        input.process(&constant, None, &mut transport, &StaticPosition::default());
        assert_eq!(input.noise_gate().dc_offset(), 5000.0);
        input.configure(AudioFormat::network_input());
        assert_eq!(input.noise_gate().dc_offset(), 0.0);

        input.process(&constant, None, &mut transport, &StaticPosition::default());
        assert_eq!(input.noise_gate().dc_offset(), 5000.0);
        input.clear();
        assert_eq!(input.noise_gate().dc_offset(), 0.0);
        assert!(!input.noise_gate().is_open());
    }

    #[test]
    fn test_unconfigured_pipeline_ignores_input() {
        let mut input = InputPipeline::new(AudioSettings::default());
        let mut transport = connected();
        assert_eq!(
            input.process(&alternating(FRAME, 8000), None, &mut transport, &StaticPosition::default()),
            0
        );
    }
}
