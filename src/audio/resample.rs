//! Linear resampling and channel conversion between two PCM formats.
//!
//! This is deliberately not a general-purpose resampler. It covers the
//! conversions the client needs: device input down to network mono, network
//! stereo up to a faster output device, and mono to stereo at the same rate.
//! The filter arithmetic (a 2-tap average at the end of the source, 3-tap
//! 25/50/25 elsewhere) is kept exactly so output stays bit-identical.

use crate::audio::format::AudioFormat;
use crate::error::AudioError;

/// Converts `source` in `source_format` into `destination` in
/// `destination_format`.
///
/// The caller sizes `destination` for the conversion ratio. Unsupported
/// conversions leave `destination` untouched and return
/// [`AudioError::UnsupportedConversion`]; callers check
/// [`is_conversion_supported`] once when a device is opened instead of on
/// every frame.
pub fn linear_resampling(
    source: &[i16],
    destination: &mut [i16],
    source_format: &AudioFormat,
    destination_format: &AudioFormat,
) -> Result<(), AudioError> {
    if source_format == destination_format {
        let count = source.len().min(destination.len());
        destination[..count].copy_from_slice(&source[..count]);
        return Ok(());
    }

    let ratio = source_format.conversion_ratio(destination_format);

    if ratio >= 2.0 {
        downsample(source, destination, source_format.channels as usize, ratio as usize);
        return Ok(());
    }

    if source_format.sample_rate == destination_format.sample_rate {
        if source_format.channels == 1 && destination_format.channels == 2 {
            for (pair, &sample) in destination.chunks_exact_mut(2).zip(source) {
                pair[0] = sample;
                pair[1] = sample;
            }
            return Ok(());
        }
        return Err(unsupported(source_format, destination_format));
    }

    let rate_factor = (destination_format.sample_rate / source_format.sample_rate) as usize;
    let sample_shift = destination_format.channels as usize * rate_factor;
    let destination_to_source = (1.0 / ratio) as usize;
    if sample_shift == 0 || destination_to_source == 0 {
        return Err(unsupported(source_format, destination_format));
    }

    upsample(
        source,
        destination,
        source_format.channels as usize,
        destination_format.channels as usize,
        sample_shift,
        destination_to_source,
    );
    Ok(())
}

/// Whether [`linear_resampling`] can convert between the two formats.
pub fn is_conversion_supported(source_format: &AudioFormat, destination_format: &AudioFormat) -> bool {
    if source_format == destination_format {
        return true;
    }
    let ratio = source_format.conversion_ratio(destination_format);
    if ratio >= 2.0 {
        return true;
    }
    if source_format.sample_rate == destination_format.sample_rate {
        return source_format.channels == 1 && destination_format.channels == 2;
    }
    let rate_factor = (destination_format.sample_rate / source_format.sample_rate) as usize;
    destination_format.channels as usize * rate_factor != 0 && (1.0 / ratio) as usize != 0
}

/// Output samples needed to hold `source_samples` converted between formats.
pub fn resampled_len(source_samples: usize, source_format: &AudioFormat, destination_format: &AudioFormat) -> usize {
    (source_samples as f32 / source_format.conversion_ratio(destination_format)) as usize
}

fn unsupported(source_format: &AudioFormat, destination_format: &AudioFormat) -> AudioError {
    AudioError::UnsupportedConversion {
        from: *source_format,
        to: *destination_format,
    }
}

/// Averages neighbouring frames of the first channel. Only mono output is
/// produced, which is all capture ever needs.
fn downsample(source: &[i16], destination: &mut [i16], channels: usize, factor: usize) {
    let len = source.len();
    let mut i = channels;
    while i < len {
        let index = (i - channels) / factor;
        let previous = source[i - channels];
        let current = source[i];

        let value = if i + channels >= len {
            previous / 2 + current / 2
        } else {
            previous / 4 + current / 2 + source[i + channels] / 4
        };

        if let Some(slot) = destination.get_mut(index) {
            *slot = value;
        }
        i += 2 * channels;
    }
}

/// Repeats source frames into the destination. Channels 0 and 1 take the
/// source's left/right (left twice for mono), anything above is silent.
fn upsample(
    source: &[i16],
    destination: &mut [i16],
    source_channels: usize,
    destination_channels: usize,
    sample_shift: usize,
    destination_to_source: usize,
) {
    let right_offset = if source_channels > 1 { 1 } else { 0 };
    let sample = |index: usize| source.get(index).copied().unwrap_or(0);

    for i in (0..destination.len()).step_by(sample_shift) {
        let source_index = i / destination_to_source;
        let end = (i + sample_shift).min(destination.len());

        for j in i..end {
            destination[j] = match j % destination_channels {
                0 => sample(source_index),
                1 => sample(source_index + right_offset),
                _ => 0,
            };
        }
    }
}
