//! Network boundary: voice packet framing and the transport seam.
//!
//! # Outbound layout
//!
//! ```text
//! [type: u8][position: 3 x f32 LE][orientation: 4 x f32 LE][payload]
//! ```
//!
//! The payload is either the mono 24 kHz frame as s16le, or, for
//! [`PacketType::SilentAudioFrame`], a single i16 holding the number of silent
//! samples.
//!
//! # Inbound layout
//!
//! ```text
//! [type: u8][payload]
//! ```
//!
//! Mixed audio is interleaved stereo s16le; silent frames carry a single i16
//! sample count and expand to that many zeros.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crossbeam::channel::Sender;
use tracing::warn;

use crate::audio::sample::{samples_from_le_bytes, samples_to_le_bytes};
use crate::error::AudioError;

const POSE_BYTES: usize = 7 * std::mem::size_of::<f32>();

/// Inbound audio is always interleaved stereo.
const INBOUND_CHANNELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    MicrophoneAudioNoEcho = 1,
    MicrophoneAudioWithEcho = 2,
    SilentAudioFrame = 3,
    MixedAudio = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = AudioError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::MicrophoneAudioNoEcho),
            2 => Ok(PacketType::MicrophoneAudioWithEcho),
            3 => Ok(PacketType::SilentAudioFrame),
            4 => Ok(PacketType::MixedAudio),
            _ => Err(AudioError::MalformedPacket("unknown packet type")),
        }
    }
}

/// Listener head position and orientation (quaternion x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Supplies the head pose stamped on every outbound frame.
pub trait PositionProvider: Send {
    fn head_pose(&self) -> HeadPose;
}

/// A pose that never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPosition(pub HeadPose);

impl PositionProvider for StaticPosition {
    fn head_pose(&self) -> HeadPose {
        self.0
    }
}

/// Where outbound frames go.
pub trait FrameTransport: Send {
    /// Frames are only built while this is true.
    fn is_connected(&self) -> bool {
        true
    }

    fn send(&mut self, datagram: Bytes);
}

/// Transport delivering datagrams over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Bytes>,
}

impl ChannelTransport {
    pub fn new(tx: Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl FrameTransport for ChannelTransport {
    fn send(&mut self, datagram: Bytes) {
        if self.tx.send(datagram).is_err() {
            warn!("Dropping outbound audio frame: receiver is gone");
        }
    }
}

/// A parsed outbound voice frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePacket {
    pub packet_type: PacketType,
    pub pose: HeadPose,
    pub payload: Bytes,
}

impl VoicePacket {
    pub fn encode(packet_type: PacketType, pose: &HeadPose, samples: &[i16]) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + POSE_BYTES + samples.len() * 2);
        buf.put_u8(packet_type as u8);
        for value in pose.position.iter().chain(pose.orientation.iter()) {
            buf.put_f32_le(*value);
        }
        for sample in samples {
            buf.put_i16_le(*sample);
        }
        buf.freeze()
    }

    /// A silent frame declaring `count` zero samples.
    pub fn encode_silent(pose: &HeadPose, count: i16) -> Bytes {
        Self::encode(PacketType::SilentAudioFrame, pose, &[count])
    }

    pub fn parse(mut datagram: Bytes) -> Result<Self, AudioError> {
        if datagram.len() < 1 + POSE_BYTES {
            return Err(AudioError::MalformedPacket("voice packet shorter than its header"));
        }
        let packet_type = PacketType::try_from(datagram.get_u8())?;
        let mut pose = HeadPose::default();
        for value in pose.position.iter_mut().chain(pose.orientation.iter_mut()) {
            *value = datagram.get_f32_le();
        }
        Ok(Self {
            packet_type,
            pose,
            payload: datagram,
        })
    }

    pub fn samples(&self) -> Vec<i16> {
        samples_from_le_bytes(&self.payload)
    }
}

/// A parsed inbound (mixed) audio frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundAudio {
    pub packet_type: PacketType,
    pub payload: Bytes,
}

impl InboundAudio {
    pub fn encode_mixed(samples: &[i16]) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + samples.len() * 2);
        buf.put_u8(PacketType::MixedAudio as u8);
        buf.put_slice(&samples_to_le_bytes(samples));
        buf.freeze()
    }

    pub fn encode_silent(count: i16) -> Bytes {
        let mut buf = BytesMut::with_capacity(3);
        buf.put_u8(PacketType::SilentAudioFrame as u8);
        buf.put_i16_le(count);
        buf.freeze()
    }

    pub fn parse(mut datagram: Bytes) -> Result<Self, AudioError> {
        if datagram.is_empty() {
            return Err(AudioError::MalformedPacket("empty audio datagram"));
        }
        let packet_type = PacketType::try_from(datagram.get_u8())?;
        if packet_type == PacketType::SilentAudioFrame {
            if datagram.len() < 2 {
                return Err(AudioError::MalformedPacket("silent frame without a sample count"));
            }
            let count = datagram.clone().get_i16_le();
            if count < 0 || count % INBOUND_CHANNELS as i16 != 0 {
                return Err(AudioError::MalformedPacket("silent frame count is not whole stereo frames"));
            }
        } else if datagram.len() % (INBOUND_CHANNELS * 2) != 0 {
            return Err(AudioError::MalformedPacket("audio payload is not whole stereo frames"));
        }
        Ok(Self {
            packet_type,
            payload: datagram,
        })
    }

    /// Samples this frame contributes to playback.
    pub fn samples(&self) -> Vec<i16> {
        match self.packet_type {
            PacketType::SilentAudioFrame => {
                let count = self.payload.clone().get_i16_le().max(0) as usize;
                vec![0; count]
            }
            _ => samples_from_le_bytes(&self.payload),
        }
    }
}
