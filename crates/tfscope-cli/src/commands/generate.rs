//! Synthetic measurement generation.
//!
//! Writes a stereo file whose left channel is white noise (the reference) and
//! whose right channel is the same noise delayed, scaled and optionally
//! contaminated with uncorrelated noise (the measurement).

use clap::Args;
use std::path::PathBuf;
use tfscope_io::{ChannelPair, WavSpec, write_pair};

#[derive(Args)]
pub struct GenerateArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Duration in seconds
    #[arg(long, default_value = "5.0")]
    duration: f32,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Delay of the measurement channel in samples
    #[arg(long, default_value = "0")]
    delay_samples: usize,

    /// Gain of the measurement channel in dB
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    gain_db: f32,

    /// Level of uncorrelated noise added to the measurement (linear, 0-1)
    #[arg(long, default_value = "0.0")]
    noise: f32,

    /// Reference amplitude (0-1)
    #[arg(long, default_value = "0.5")]
    amplitude: f32,

    /// Seed for the noise generator
    #[arg(long, default_value = "305419896")]
    seed: u32,
}

/// Xorshift32 noise source, uniform in [-1, 1].
struct Noise(u32);

impl Noise {
    fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    fn next(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

/// Build the reference/measurement pair described by `args`.
fn synthesize(args: &GenerateArgs) -> ChannelPair {
    let len = (args.duration * args.sample_rate as f32) as usize;
    let mut source = Noise::new(args.seed);
    let reference: Vec<f32> = (0..len).map(|_| source.next() * args.amplitude).collect();

    let gain = 10.0f32.powf(args.gain_db / 20.0);
    let mut contamination = Noise::new(args.seed.rotate_left(16) ^ 0x9e37_79b9);
    let measurement = (0..len)
        .map(|i| {
            let delayed = i
                .checked_sub(args.delay_samples)
                .map_or(0.0, |j| reference[j]);
            delayed * gain + contamination.next() * args.noise
        })
        .collect();

    ChannelPair::new(reference, measurement)
}

pub fn run(args: GenerateArgs) -> anyhow::Result<()> {
    if args.duration <= 0.0 || !args.duration.is_finite() {
        anyhow::bail!("--duration must be positive");
    }
    if args.sample_rate == 0 {
        anyhow::bail!("--sample-rate must be positive");
    }

    let pair = synthesize(&args);
    let spec = WavSpec {
        channels: 2,
        sample_rate: args.sample_rate,
        bits_per_sample: 32,
    };
    write_pair(&args.output, &pair, spec)?;

    println!(
        "Wrote {} samples to {} (delay {} samples, gain {:.1} dB, noise {:.2})",
        pair.len(),
        args.output.display(),
        args.delay_samples,
        args.gain_db,
        args.noise
    );
    Ok(())
}
