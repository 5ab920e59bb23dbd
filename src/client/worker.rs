//! Dedicated audio thread.
//!
//! All pipeline state lives on this thread; other threads talk to it through
//! [`AudioEvent`]s on a crossbeam channel. Nothing in the audio path takes a
//! lock.

use anyhow::{Context, Result};
use bytes::Bytes;
use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, warn};

use super::audio::AudioClient;
use crate::error::AudioError;
use crate::io::audio::AudioDeviceInfo;
use crate::pipeline::PipelineStats;

pub enum AudioEvent {
    /// The input device has new data.
    InputReady,
    FrameReceived {
        datagram: Bytes,
        received_at: Instant,
    },
    SwitchInputDevice(Option<Arc<dyn AudioDeviceInfo>>),
    SwitchOutputDevice(Option<Arc<dyn AudioDeviceInfo>>),
    CollisionSound {
        magnitude: f32,
        frequency: f32,
        noise: f32,
        duration: f32,
    },
    DrumSound {
        volume: f32,
        frequency: f32,
        duration: f32,
        decay: f32,
    },
    ToggleMute,
    ToggleNoiseGate,
    ToggleToneInjection,
    ToggleSpatialProcessing,
    Reset,
    Stats(Sender<PipelineStats>),
    Shutdown,
}

impl AudioEvent {
    /// A received datagram stamped with the current time.
    pub fn frame(datagram: Bytes) -> Self {
        AudioEvent::FrameReceived {
            datagram,
            received_at: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AudioEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioEvent::InputReady => write!(f, "InputReady"),
            AudioEvent::FrameReceived { datagram, .. } => write!(f, "FrameReceived({} bytes)", datagram.len()),
            AudioEvent::SwitchInputDevice(device) => {
                write!(f, "SwitchInputDevice({:?})", device.as_ref().map(|d| d.name().to_string()))
            }
            AudioEvent::SwitchOutputDevice(device) => {
                write!(f, "SwitchOutputDevice({:?})", device.as_ref().map(|d| d.name().to_string()))
            }
            AudioEvent::CollisionSound { .. } => write!(f, "CollisionSound"),
            AudioEvent::DrumSound { .. } => write!(f, "DrumSound"),
            AudioEvent::ToggleMute => write!(f, "ToggleMute"),
            AudioEvent::ToggleNoiseGate => write!(f, "ToggleNoiseGate"),
            AudioEvent::ToggleToneInjection => write!(f, "ToggleToneInjection"),
            AudioEvent::ToggleSpatialProcessing => write!(f, "ToggleSpatialProcessing"),
            AudioEvent::Reset => write!(f, "Reset"),
            AudioEvent::Stats(_) => write!(f, "Stats"),
            AudioEvent::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Handle to the audio thread. Dropping it shuts the thread down.
pub struct AudioWorker {
    tx: Sender<AudioEvent>,
    handle: Option<JoinHandle<()>>,
}

impl AudioWorker {
    pub fn spawn(client: AudioClient) -> Result<Self> {
        let (tx, rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name("audio-worker".to_string())
            .spawn(move || Self::run(client, rx))
            .context("Failed to spawn audio worker thread")?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// A sender other threads can keep for posting events.
    pub fn sender(&self) -> Sender<AudioEvent> {
        self.tx.clone()
    }

    pub fn send(&self, event: AudioEvent) -> Result<(), AudioError> {
        self.tx.send(event).map_err(|_| AudioError::WorkerStopped)
    }

    /// Round-trips to the worker for a stats snapshot.
    pub fn stats(&self) -> Result<PipelineStats, AudioError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(AudioEvent::Stats(reply_tx))?;
        reply_rx.recv().map_err(|_| AudioError::WorkerStopped)
    }

    /// Stops the thread and waits for it to exit.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let _ = self.tx.send(AudioEvent::Shutdown);
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("Audio worker thread panicked"))
    }

    fn run(mut client: AudioClient, rx: Receiver<AudioEvent>) {
        info!("Audio worker thread started");

        for event in rx.iter() {
            match event {
                AudioEvent::InputReady => {
                    client.handle_audio_input();
                }
                AudioEvent::FrameReceived {
                    datagram,
                    received_at,
                } => {
                    if let Err(e) = client.add_received_audio(datagram, received_at) {
                        warn!("Dropping inbound audio: {}", e);
                    }
                }
                AudioEvent::SwitchInputDevice(device) => {
                    if let Err(e) = client.switch_input_device(device.as_deref()) {
                        warn!("Failed to switch input device: {}", e);
                    }
                }
                AudioEvent::SwitchOutputDevice(device) => {
                    if let Err(e) = client.switch_output_device(device.as_deref()) {
                        warn!("Failed to switch output device: {}", e);
                    }
                }
                AudioEvent::CollisionSound {
                    magnitude,
                    frequency,
                    noise,
                    duration,
                } => client.start_collision_sound(magnitude, frequency, noise, duration),
                AudioEvent::DrumSound {
                    volume,
                    frequency,
                    duration,
                    decay,
                } => client.start_drum_sound(volume, frequency, duration, decay),
                AudioEvent::ToggleMute => {
                    info!("Mute {}", on_off(client.toggle_mute()));
                }
                AudioEvent::ToggleNoiseGate => {
                    info!("Noise gate {}", on_off(client.toggle_audio_noise_reduction()));
                }
                AudioEvent::ToggleToneInjection => {
                    info!("Tone injection {}", on_off(client.toggle_tone_injection()));
                }
                AudioEvent::ToggleSpatialProcessing => {
                    info!("Spatial processing {}", on_off(client.toggle_audio_spatial_processing()));
                }
                AudioEvent::Reset => client.reset(),
                AudioEvent::Stats(reply) => {
                    let _ = reply.send(client.stats());
                }
                AudioEvent::Shutdown => break,
            }
        }

        client.stop();
        info!("Audio worker thread stopped");
    }
}

impl Drop for AudioWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!("{}", e);
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{AudioFormat, NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL};
    use crate::audio::sample::samples_to_le_bytes;
    use crate::io::memory::MemoryDeviceInfo;
    use crate::io::network::{ChannelTransport, InboundAudio, PacketType, StaticPosition, VoicePacket};
    use crate::state::AudioConfig;
    use std::time::Duration;

    fn worker() -> (AudioWorker, Receiver<Bytes>) {
        let (tx, rx) = unbounded();
        let client = AudioClient::new(
            &AudioConfig::default(),
            Box::new(ChannelTransport::new(tx)),
            Box::new(StaticPosition::default()),
        );
        (AudioWorker::spawn(client).unwrap(), rx)
    }

    #[test]
    fn test_worker_processes_input_events() {
        let (worker, rx) = worker();
        let mic = Arc::new(MemoryDeviceInfo::new("mic", vec![AudioFormat::network_input()]));
        let feed = mic.feed();

        worker
            .send(AudioEvent::SwitchInputDevice(Some(mic.clone())))
            .unwrap();
        feed.push(&samples_to_le_bytes(&[0; NETWORK_BUFFER_LENGTH_SAMPLES_PER_CHANNEL]));
        worker.send(AudioEvent::InputReady).unwrap();

        let datagram = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let packet = VoicePacket::parse(datagram).unwrap();
        assert_eq!(packet.packet_type, PacketType::SilentAudioFrame);
        assert_eq!(worker.stats().unwrap().total_input_frames, 1);
    }

    #[test]
    fn test_worker_counts_received_frames() {
        let (worker, _rx) = worker();
        worker
            .send(AudioEvent::frame(InboundAudio::encode_silent(512)))
            .unwrap();
        worker.send(AudioEvent::frame(Bytes::from_static(&[0]))).unwrap();

        assert_eq!(worker.stats().unwrap().total_packets_received, 1);
    }

    #[test]
    fn test_shutdown_stops_accepting_events() {
        let (worker, _rx) = worker();
        let sender = worker.sender();
        worker.shutdown().unwrap();
        assert!(sender.send(AudioEvent::Reset).is_err());
    }
}
