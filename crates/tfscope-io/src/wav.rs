//! WAV file reading and writing.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::io::Read;
use std::path::Path;

/// WAV file specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,
    /// Bit depth per sample (16, 24 or 32; 32 is written as float).
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

/// Reference and measurement channels of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPair {
    /// Signal fed into the system under test.
    pub reference: Vec<f32>,
    /// Signal captured at the system's output.
    pub measurement: Vec<f32>,
}

impl ChannelPair {
    /// Pair two channels, truncating the longer one.
    pub fn new(mut reference: Vec<f32>, mut measurement: Vec<f32>) -> Self {
        let len = reference.len().min(measurement.len());
        reference.truncate(len);
        measurement.truncate(len);
        Self {
            reference,
            measurement,
        }
    }

    /// Split interleaved stereo samples (left = reference, right = measurement).
    pub fn from_interleaved(samples: &[f32]) -> Self {
        let (reference, measurement) = samples
            .chunks_exact(2)
            .map(|frame| (frame[0], frame[1]))
            .unzip();
        Self {
            reference,
            measurement,
        }
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    /// True when both channels are empty.
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    /// Length in seconds at `sample_rate`.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.len() as f64 / f64::from(sample_rate)
    }
}

/// Decode every sample of a file to f32 in [-1, 1], interleaved.
fn read_samples<R: Read>(reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(samples)
}

/// Read a WAV file and return samples as f32 along with the spec.
///
/// Multi-channel files are mixed down to mono by averaging channels.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    let channels = usize::from(spec.channels.max(1));
    let samples = read_samples(reader)?;

    tracing::debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = samples.len() / channels,
        "read wav"
    );

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec))
}

/// Read a stereo capture: left is the reference, right the measurement.
///
/// Extra channels are ignored. Mono files are rejected, since a measurement
/// of a signal against itself carries no information.
pub fn read_pair<P: AsRef<Path>>(path: P) -> Result<(ChannelPair, WavSpec)> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    if spec.channels < 2 {
        return Err(Error::ChannelMismatch {
            expected: 2,
            found: spec.channels,
        });
    }

    let channels = usize::from(spec.channels);
    let samples = read_samples(reader)?;
    let pair = if channels == 2 {
        ChannelPair::from_interleaved(&samples)
    } else {
        let (reference, measurement) = samples
            .chunks_exact(channels)
            .map(|frame| (frame[0], frame[1]))
            .unzip();
        ChannelPair {
            reference,
            measurement,
        }
    };

    tracing::debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = pair.len(),
        "read measurement pair"
    );

    Ok((pair, spec))
}

/// Read reference and measurement from two files recorded together.
///
/// Multi-channel files are mixed down to mono. The longer file is truncated.
/// Both files must share a sample rate.
pub fn read_pair_files<P: AsRef<Path>, Q: AsRef<Path>>(
    reference: P,
    measurement: Q,
) -> Result<(ChannelPair, WavSpec)> {
    let (reference, reference_spec) = read_wav(reference)?;
    let (measurement, measurement_spec) = read_wav(measurement)?;

    if reference_spec.sample_rate != measurement_spec.sample_rate {
        return Err(Error::SampleRateMismatch {
            reference: reference_spec.sample_rate,
            measurement: measurement_spec.sample_rate,
        });
    }
    if reference.len() != measurement.len() {
        tracing::warn!(
            reference = reference.len(),
            measurement = measurement.len(),
            "file lengths differ, truncating to the shorter"
        );
    }

    let spec = WavSpec {
        channels: 2,
        ..reference_spec
    };
    Ok((ChannelPair::new(reference, measurement), spec))
}

/// Write a pair as a stereo file (left = reference, right = measurement).
pub fn write_pair<P: AsRef<Path>>(path: P, pair: &ChannelPair, spec: WavSpec) -> Result<()> {
    let stereo_spec = WavSpec {
        channels: 2,
        ..spec
    };
    let mut writer = WavWriter::create(path, hound::WavSpec::from(stereo_spec))?;

    if spec.bits_per_sample == 32 {
        for (&l, &r) in pair.reference.iter().zip(&pair.measurement) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
        }
    } else {
        let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
        for (&l, &r) in pair.reference.iter().zip(&pair.measurement) {
            writer.write_sample((l * max_val).clamp(-max_val, max_val - 1.0) as i32)?;
            writer.write_sample((r * max_val).clamp(-max_val, max_val - 1.0) as i32)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
