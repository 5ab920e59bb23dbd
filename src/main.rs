use anyhow::{Context, Result};
use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use worldvoice::audio::format::AudioFormat;
use worldvoice::audio::sample::samples_to_le_bytes;
use worldvoice::io::audio::OutputRole;
use worldvoice::io::memory::MemoryDeviceInfo;
use worldvoice::io::network::{ChannelTransport, InboundAudio, PacketType, StaticPosition, VoicePacket};
use worldvoice::{AudioClient, AudioConfig, AudioEvent, AudioWorker};

const DEVICE_FORMAT: AudioFormat = AudioFormat::new(48000, 2);
const CHUNK_MS: u64 = 10;
const RUN_MS: u64 = 2000;

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    info!("Starting worldvoice audio demo...");

    let config = match std::env::args().nth(1) {
        Some(path) => AudioConfig::from_json_file(path)?,
        None => AudioConfig::default(),
    };

    let microphone = Arc::new(MemoryDeviceInfo::new("Demo Microphone", vec![DEVICE_FORMAT]));
    let speakers = Arc::new(MemoryDeviceInfo::new("Demo Speakers", vec![DEVICE_FORMAT]));
    let feed = microphone.feed();
    let played = speakers.tap(OutputRole::Main);

    let (outbound_tx, outbound_rx) = unbounded();
    let client = AudioClient::new(
        &config,
        Box::new(ChannelTransport::new(outbound_tx)),
        Box::new(StaticPosition::default()),
    );
    let worker = AudioWorker::spawn(client)?;

    // Stand-in for the mixing server: every outbound frame comes straight back.
    let events = worker.sender();
    let mixer = std::thread::Builder::new()
        .name("echo-mixer".to_string())
        .spawn(move || echo_mixer(outbound_rx, events))
        .context("Failed to spawn echo mixer thread")?;

    worker.send(AudioEvent::SwitchInputDevice(Some(microphone.clone())))?;
    worker.send(AudioEvent::SwitchOutputDevice(Some(speakers.clone())))?;

    let chunk_frames = (DEVICE_FORMAT.sample_rate as u64 * CHUNK_MS / 1000) as usize;
    let mut phase = 0usize;
    let mut played_bytes = 0usize;

    for chunk in 0..RUN_MS / CHUNK_MS {
        if chunk == RUN_MS / CHUNK_MS / 2 {
            worker.send(AudioEvent::DrumSound {
                volume: 0.5,
                frequency: 220.0,
                duration: 0.3,
                decay: 0.5,
            })?;
        }

        let mut samples = Vec::with_capacity(chunk_frames * DEVICE_FORMAT.channels as usize);
        for _ in 0..chunk_frames {
            let t = phase as f32 / DEVICE_FORMAT.sample_rate as f32;
            let value = ((TAU * 440.0 * t).sin() * 6000.0) as i16;
            samples.extend(std::iter::repeat_n(value, DEVICE_FORMAT.channels as usize));
            phase += 1;
        }
        feed.push(&samples_to_le_bytes(&samples));
        worker.send(AudioEvent::InputReady)?;

        std::thread::sleep(Duration::from_millis(CHUNK_MS));
        played_bytes += played.drain().len();
    }

    let stats = worker.stats()?;
    info!(
        "Sent {} frames, received {} packets, played {} bytes",
        stats.total_input_frames, stats.total_packets_received, played_bytes
    );
    info!(
        "Jitter {:.2} ms, buffer target {} samples, noise floor {:.1}, dropped {} samples",
        stats.measured_jitter_ms, stats.jitter_buffer_samples, stats.noise_floor, stats.dropped_samples
    );

    if stats.is_clipping() {
        warn!("Microphone clipped within the last second");
    }
    if played.pending_bytes() > 0 {
        warn!("{} bytes were still queued on the speakers", played.pending_bytes());
    }

    worker.shutdown()?;
    mixer
        .join()
        .map_err(|_| anyhow::anyhow!("Echo mixer thread panicked"))?;

    info!("Demo finished");
    Ok(())
}

/// Turns each mono voice frame into a stereo mixed frame and feeds it back.
fn echo_mixer(outbound: Receiver<Bytes>, events: Sender<AudioEvent>) {
    info!("Echo mixer thread started");

    for datagram in outbound.iter() {
        let packet = match VoicePacket::parse(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Echo mixer dropped a frame: {}", e);
                continue;
            }
        };

        let mixed = match packet.packet_type {
            PacketType::SilentAudioFrame => {
                let count = packet.samples().first().copied().unwrap_or(0);
                InboundAudio::encode_silent(count.saturating_mul(2))
            }
            _ => {
                let stereo: Vec<i16> = packet.samples().iter().flat_map(|&s| [s, s]).collect();
                InboundAudio::encode_mixed(&stereo)
            }
        };

        if events.send(AudioEvent::frame(mixed)).is_err() {
            break;
        }
    }

    info!("Echo mixer thread stopped");
}
