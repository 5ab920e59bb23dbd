use std::io::Cursor;
use std::time::Instant;

use crossbeam::channel::{Receiver, unbounded};
use bytes::Bytes;
use worldvoice::audio::format::{AudioFormat, NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL};
use worldvoice::audio::sample::{samples_from_le_bytes, samples_to_le_bytes};
use worldvoice::io::audio::OutputRole;
use worldvoice::io::memory::MemoryDeviceInfo;
use worldvoice::io::network::{ChannelTransport, InboundAudio, PacketType, StaticPosition, VoicePacket};
use worldvoice::{AudioClient, AudioConfig};

const FRAME: usize = NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL;

fn client(config: AudioConfig) -> (AudioClient, Receiver<Bytes>) {
    let (tx, rx) = unbounded();
    let client = AudioClient::new(
        &config,
        Box::new(ChannelTransport::new(tx)),
        Box::new(StaticPosition::default()),
    );
    (client, rx)
}

fn wav_round_trip(samples: &[i16], format: AudioFormat) -> Vec<i16> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    cursor.set_position(0);
    let mut reader = hound::WavReader::new(cursor).unwrap();
    assert_eq!(reader.spec(), spec);
    reader.samples::<i16>().map(|s| s.unwrap()).collect()
}

#[test]
fn test_voice_makes_it_from_microphone_to_speakers() {
    let config = AudioConfig {
        noise_gate_enabled: false,
        ..AudioConfig::default()
    };
    let (mut client, outbound) = client(config);
    let microphone = MemoryDeviceInfo::new("mic", vec![AudioFormat::network_input()]);
    let speakers = MemoryDeviceInfo::new("speakers", vec![AudioFormat::network_output()]);
    let (input, output) = client.start(Some(&microphone), Some(&speakers));
    assert_eq!(input.unwrap(), Some(AudioFormat::network_input()));
    assert_eq!(output.unwrap(), Some(AudioFormat::network_output()));

    let voice: Vec<i16> = (0..FRAME).map(|i| if i % 2 == 0 { 3000 } else { -3000 }).collect();
    microphone.feed().push(&samples_to_le_bytes(&voice));
    assert_eq!(client.handle_audio_input(), 1);

    let packet = VoicePacket::parse(outbound.try_recv().unwrap()).unwrap();
    assert_eq!(packet.packet_type, PacketType::MicrophoneAudioNoEcho);
    assert_eq!(packet.samples(), voice);

    // Pretend the server mixed us into both channels.
    let stereo: Vec<i16> = voice.iter().flat_map(|&s| [s, s]).collect();
    client
        .add_received_audio(InboundAudio::encode_mixed(&stereo), Instant::now())
        .unwrap();

    let played = samples_from_le_bytes(&speakers.tap(OutputRole::Main).drain());
    assert_eq!(played, stereo);
    assert_eq!(wav_round_trip(&played, AudioFormat::network_output()), stereo);

    let stats = client.stats();
    assert_eq!(stats.total_input_frames, 1);
    assert_eq!(stats.total_packets_received, 1);
    assert_eq!(stats.ring_buffer_samples, 0);
}

#[test]
fn test_silent_microphone_sends_silent_frames() {
    let (mut client, outbound) = client(AudioConfig::default());
    let microphone = MemoryDeviceInfo::new("mic", vec![AudioFormat::new(48000, 2)]);
    client.switch_input_device(Some(&microphone)).unwrap();

    // Two network frames worth of 48 kHz stereo silence.
    microphone.feed().push(&samples_to_le_bytes(&vec![0; FRAME * 4 * 2]));
    assert_eq!(client.handle_audio_input(), 2);

    for datagram in outbound.try_iter() {
        let packet = VoicePacket::parse(datagram).unwrap();
        assert_eq!(packet.packet_type, PacketType::SilentAudioFrame);
        assert_eq!(packet.samples(), vec![FRAME as i16]);
    }
}

#[test]
fn test_server_silence_plays_as_zeros() {
    let (mut client, _outbound) = client(AudioConfig::default());
    let speakers = MemoryDeviceInfo::new("speakers", vec![AudioFormat::new(48000, 2)]);
    client.switch_output_device(Some(&speakers)).unwrap();

    client
        .add_received_audio(InboundAudio::encode_silent((FRAME * 2) as i16), Instant::now())
        .unwrap();

    let played = samples_from_le_bytes(&speakers.tap(OutputRole::Main).drain());
    assert_eq!(played.len(), FRAME * 2 * 2);
    assert!(played.iter().all(|&s| s == 0));
}
