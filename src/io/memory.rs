//! In-memory audio devices backed by crossbeam channels.
//!
//! Used by tests and the demo binary in place of real hardware. Captured audio
//! is pushed through a [`MemoryInputFeed`]; played audio is collected from a
//! [`MemoryOutputTap`], one per [`OutputRole`].

use crossbeam::channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

use crate::audio::format::AudioFormat;
use crate::error::AudioError;
use crate::io::audio::{AudioDeviceInfo, AudioInputDevice, AudioOutputDevice, OutputRole};

#[derive(Debug, Clone)]
struct OutputChannel {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: Arc<AtomicUsize>,
}

impl OutputChannel {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// A fake device supporting a fixed list of formats.
#[derive(Debug)]
pub struct MemoryDeviceInfo {
    name: String,
    formats: Vec<AudioFormat>,
    unplugged: AtomicBool,
    input_tx: Sender<Vec<u8>>,
    input_rx: Receiver<Vec<u8>>,
    main: OutputChannel,
    loopback: OutputChannel,
    procedural: OutputChannel,
}

impl MemoryDeviceInfo {
    pub fn new(name: impl Into<String>, formats: Vec<AudioFormat>) -> Self {
        let (input_tx, input_rx) = unbounded();
        Self {
            name: name.into(),
            formats,
            unplugged: AtomicBool::new(false),
            input_tx,
            input_rx,
            main: OutputChannel::new(),
            loopback: OutputChannel::new(),
            procedural: OutputChannel::new(),
        }
    }

    /// Handle for injecting captured bytes.
    pub fn feed(&self) -> MemoryInputFeed {
        MemoryInputFeed {
            tx: self.input_tx.clone(),
        }
    }

    /// Handle for collecting bytes written to the `role` output.
    pub fn tap(&self, role: OutputRole) -> MemoryOutputTap {
        let channel = self.channel(role);
        MemoryOutputTap {
            rx: channel.rx.clone(),
            pending: channel.pending.clone(),
        }
    }

    fn channel(&self, role: OutputRole) -> &OutputChannel {
        match role {
            OutputRole::Main => &self.main,
            OutputRole::Loopback => &self.loopback,
            OutputRole::Procedural => &self.procedural,
        }
    }

    /// Makes subsequent opens fail as if the hardware went away.
    pub fn set_unplugged(&self, unplugged: bool) {
        self.unplugged.store(unplugged, Ordering::Relaxed);
    }

    fn check_open(&self, format: &AudioFormat) -> Result<(), AudioError> {
        if self.unplugged.load(Ordering::Relaxed) {
            return Err(AudioError::DeviceUnavailable {
                device: self.name.clone(),
                reason: "device unplugged".to_string(),
            });
        }
        if self.is_format_supported(format) {
            Ok(())
        } else {
            Err(AudioError::UnsupportedFormat {
                device: self.name.clone(),
                format: *format,
            })
        }
    }
}

impl AudioDeviceInfo for MemoryDeviceInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_format_supported(&self, format: &AudioFormat) -> bool {
        self.formats.contains(format)
    }

    fn supported_sample_rates(&self) -> Vec<u32> {
        let mut rates: Vec<u32> = self.formats.iter().map(|f| f.sample_rate).collect();
        rates.sort_unstable();
        rates.dedup();
        rates
    }

    fn nearest_format(&self, format: &AudioFormat) -> AudioFormat {
        self.formats
            .iter()
            .min_by_key(|f| {
                (
                    f.sample_rate.abs_diff(format.sample_rate),
                    f.channels.abs_diff(format.channels),
                )
            })
            .copied()
            .unwrap_or(*format)
    }

    fn open_input(&self, format: AudioFormat, buffer_bytes: usize) -> Result<Box<dyn AudioInputDevice>, AudioError> {
        self.check_open(&format)?;
        debug!("Opening {} for input at {} ({} byte callbacks)", self.name, format, buffer_bytes);
        Ok(Box::new(MemoryInputDevice {
            rx: self.input_rx.clone(),
            stopped: false,
        }))
    }

    fn open_output(
        &self,
        format: AudioFormat,
        buffer_bytes: usize,
        role: OutputRole,
    ) -> Result<Box<dyn AudioOutputDevice>, AudioError> {
        self.check_open(&format)?;
        debug!("Opening {} for {:?} output at {}", self.name, role, format);
        let channel = self.channel(role);
        Ok(Box::new(MemoryOutputDevice {
            tx: channel.tx.clone(),
            pending: channel.pending.clone(),
            buffer_size: buffer_bytes,
            stopped: false,
        }))
    }
}

/// Pushes bytes to whichever input stream is open on the device.
#[derive(Debug, Clone)]
pub struct MemoryInputFeed {
    tx: Sender<Vec<u8>>,
}

impl MemoryInputFeed {
    pub fn push(&self, bytes: &[u8]) {
        let _ = self.tx.send(bytes.to_vec());
    }
}

pub struct MemoryInputDevice {
    rx: Receiver<Vec<u8>>,
    stopped: bool,
}

impl AudioInputDevice for MemoryInputDevice {
    fn read_available(&mut self) -> Vec<u8> {
        if self.stopped {
            return Vec::new();
        }
        self.rx.try_iter().flatten().collect()
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

pub struct MemoryOutputDevice {
    tx: Sender<Vec<u8>>,
    pending: Arc<AtomicUsize>,
    buffer_size: usize,
    stopped: bool,
}

impl AudioOutputDevice for MemoryOutputDevice {
    fn write(&mut self, bytes: &[u8]) {
        if self.stopped || bytes.is_empty() {
            return;
        }
        self.pending.fetch_add(bytes.len(), Ordering::Relaxed);
        let _ = self.tx.send(bytes.to_vec());
    }

    fn bytes_free(&self) -> usize {
        self.buffer_size
            .saturating_sub(self.pending.load(Ordering::Relaxed))
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Consumer side of an output stream; draining it plays the audio.
#[derive(Debug, Clone)]
pub struct MemoryOutputTap {
    rx: Receiver<Vec<u8>>,
    pending: Arc<AtomicUsize>,
}

impl MemoryOutputTap {
    /// Takes everything written so far.
    pub fn drain(&self) -> Vec<u8> {
        let bytes: Vec<u8> = self.rx.try_iter().flatten().collect();
        let _ = self
            .pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |pending| {
                Some(pending.saturating_sub(bytes.len()))
            });
        bytes
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_feed_reaches_open_device() {
        let info = MemoryDeviceInfo::new("mic", vec![AudioFormat::network_input()]);
        let mut input = info.open_input(AudioFormat::network_input(), 256).unwrap();
        let feed = info.feed();

        feed.push(&[1, 2]);
        feed.push(&[3]);
        assert_eq!(input.read_available(), vec![1, 2, 3]);
        assert!(input.read_available().is_empty());

        input.stop();
        feed.push(&[4]);
        assert!(input.read_available().is_empty());
    }

    #[test]
    fn test_output_pending_tracks_tap() {
        let info = MemoryDeviceInfo::new("speakers", vec![AudioFormat::network_output()]);
        let mut output = info
            .open_output(AudioFormat::network_output(), 100, OutputRole::Main)
            .unwrap();
        let tap = info.tap(OutputRole::Main);
        assert!(output.is_drained());

        output.write(&[0; 40]);
        assert_eq!(output.bytes_free(), 60);
        assert_eq!(tap.pending_bytes(), 40);
        assert!(!output.is_drained());
        assert!(info.tap(OutputRole::Loopback).drain().is_empty());

        assert_eq!(tap.drain().len(), 40);
        assert_eq!(tap.pending_bytes(), 0);
        assert!(output.is_drained());
    }

    #[test]
    fn test_open_rejects_unsupported_format() {
        let info = MemoryDeviceInfo::new("mic", vec![AudioFormat::network_input()]);
        let result = info.open_output(AudioFormat::network_output(), 100, OutputRole::Main);
        assert!(matches!(result, Err(AudioError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_unplugged_device_cannot_open() {
        let info = MemoryDeviceInfo::new("mic", vec![AudioFormat::network_input()]);
        info.set_unplugged(true);
        let result = info.open_input(AudioFormat::network_input(), 256);
        assert!(matches!(result, Err(AudioError::DeviceUnavailable { .. })));

        info.set_unplugged(false);
        assert!(info.open_input(AudioFormat::network_input(), 256).is_ok());
    }

    #[test]
    fn test_nearest_format() {
        let info = MemoryDeviceInfo::new(
            "speakers",
            vec![AudioFormat::new(44100, 2), AudioFormat::new(48000, 2)],
        );
        assert_eq!(info.nearest_format(&AudioFormat::new(48000, 1)), AudioFormat::new(48000, 2));
        assert_eq!(info.supported_sample_rates(), vec![44100, 48000]);
    }
}
