//! Device and network I/O boundaries.
//!
//! - [`audio`] - [`AudioDeviceInfo`] / [`AudioInputDevice`] / [`AudioOutputDevice`] traits and format negotiation
//! - [`memory`] - In-memory devices for tests and the demo
//! - [`network`] - Voice packet framing plus the [`FrameTransport`] and [`PositionProvider`] seams

pub mod audio;
pub mod memory;
pub mod network;

pub use audio::{
    AudioDeviceInfo, AudioInputDevice, AudioOutputDevice, OutputRole, adjusted_format_for_device,
};
pub use memory::{MemoryDeviceInfo, MemoryInputFeed, MemoryOutputTap};
pub use network::{
    ChannelTransport, FrameTransport, HeadPose, InboundAudio, PacketType, PositionProvider,
    StaticPosition, VoicePacket,
};
