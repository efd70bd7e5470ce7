//! Offline transfer function measurement.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tfscope_analysis::{COHERENCE_DRAW_MIN, ResultSnapshot, TfProcessor};
use tfscope_config::MeasurementConfig;
use tfscope_io::{read_pair, read_pair_files};

#[derive(Args)]
pub struct MeasureArgs {
    /// Reference WAV file, or a stereo capture (left = reference, right = measurement)
    #[arg(value_name = "REFERENCE")]
    reference: PathBuf,

    /// Measurement WAV file (omit when REFERENCE is a stereo capture)
    #[arg(value_name = "MEASUREMENT")]
    measurement: Option<PathBuf>,

    /// Measurement profile (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// FFT size (overrides the profile)
    #[arg(long)]
    fft_size: Option<usize>,

    /// Averaging time constant in seconds (overrides the profile)
    #[arg(long)]
    averaging: Option<f64>,

    /// Smoothing bandwidth in octaves, 0 for none (overrides the profile)
    #[arg(long)]
    smoothing: Option<f64>,

    /// Keep a non-power-of-two FFT size
    #[arg(long)]
    exact_size: bool,

    /// Samples per processing block
    #[arg(long, default_value = "512")]
    block_size: usize,

    /// Write the full response to a .csv or .json file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Mean magnitude over bins in `[low, high)` Hz.
fn band_average(snapshot: &ResultSnapshot, frequencies: &[f32], low: f32, high: f32) -> Option<f32> {
    let (sum, count) = frequencies
        .iter()
        .zip(&snapshot.magnitude_db)
        .filter(|&(&f, _)| f > 0.0 && f >= low && f < high)
        .fold((0.0f32, 0usize), |(sum, count), (_, &db)| (sum + db, count + 1));
    (count > 0).then(|| sum / count as f32)
}

/// Index of the bin closest to `freq`.
fn nearest_bin(frequencies: &[f32], freq: f32) -> Option<usize> {
    frequencies
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - freq).abs().total_cmp(&(*b - freq).abs()))
        .map(|(i, _)| i)
}

/// Mean coherence and trusted-bin count over 20 Hz - 20 kHz.
fn coherence_summary(snapshot: &ResultSnapshot, frequencies: &[f32]) -> (f32, usize, usize) {
    let audible: Vec<f32> = frequencies
        .iter()
        .zip(&snapshot.coherence)
        .filter(|&(&f, _)| (20.0..=20000.0).contains(&f))
        .map(|(_, &c)| c)
        .collect();
    if audible.is_empty() {
        return (0.0, 0, 0);
    }
    let mean = audible.iter().sum::<f32>() / audible.len() as f32;
    let trusted = audible.iter().filter(|&&c| c >= COHERENCE_DRAW_MIN).count();
    (mean, trusted, audible.len())
}

fn write_csv(path: &Path, snapshot: &ResultSnapshot, frequencies: &[f32]) -> anyhow::Result<()> {
    let mut csv = String::from("frequency_hz,magnitude_db,phase_deg,coherence\n");
    for (k, freq) in frequencies.iter().enumerate() {
        csv.push_str(&format!(
            "{:.3},{:.3},{:.3},{:.4}\n",
            freq, snapshot.magnitude_db[k], snapshot.phase_degrees[k], snapshot.coherence[k]
        ));
    }
    std::fs::write(path, csv)?;
    Ok(())
}

fn apply_overrides(config: &mut MeasurementConfig, args: &MeasureArgs) {
    if let Some(fft_size) = args.fft_size {
        config.analysis.fft_size = fft_size;
    }
    if let Some(averaging) = args.averaging {
        config.analysis.averaging_time = averaging;
    }
    if let Some(smoothing) = args.smoothing {
        config.analysis.smoothing_octaves = smoothing;
    }
    if args.exact_size {
        config.analysis.exact_size = true;
    }
}

pub fn run(args: MeasureArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => MeasurementConfig::load(path)?,
        None => MeasurementConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    if args.block_size == 0 {
        anyhow::bail!("--block-size must be at least 1");
    }

    let (pair, spec) = match &args.measurement {
        Some(measurement) => {
            println!("Measuring {} -> {}", args.reference.display(), measurement.display());
            read_pair_files(&args.reference, measurement)?
        }
        None => {
            println!("Measuring stereo capture {}", args.reference.display());
            read_pair(&args.reference)?
        }
    };

    if spec.sample_rate != config.analysis.sample_rate {
        tracing::info!(
            file = spec.sample_rate,
            profile = config.analysis.sample_rate,
            "using the file's sample rate"
        );
    }

    let tf = TfProcessor::with_settings(config.analyzer(), config.to_settings());
    tf.prepare(config.analysis.fft_size, f64::from(spec.sample_rate));
    if !tf.is_ready() {
        anyhow::bail!("could not configure the engine for FFT size {}", config.analysis.fft_size);
    }

    println!(
        "  {} samples, {} Hz, {:.2}s",
        pair.len(),
        spec.sample_rate,
        pair.duration_secs(spec.sample_rate)
    );
    println!(
        "  FFT {} ({} bins, {:.1} Hz resolution), window {}, averaging {:.2}s, smoothing {:.3} oct",
        tf.fft_size(),
        tf.spectrum_size(),
        tf.sample_rate() / tf.fft_size() as f64,
        config.window().name(),
        tf.averaging_time(),
        tf.smoothing_octaves()
    );

    if pair.len() < tf.fft_size() {
        anyhow::bail!(
            "input too short: {} samples, need at least {} for one frame",
            pair.len(),
            tf.fft_size()
        );
    }

    let pb = ProgressBar::new(pair.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );
    for (reference, measurement) in pair
        .reference
        .chunks(args.block_size)
        .zip(pair.measurement.chunks(args.block_size))
    {
        tf.process_block(reference, measurement);
        pb.inc(reference.len() as u64);
    }
    pb.finish_and_clear();

    let snapshot = tf.snapshot();
    let frequencies = tf.frequency_bins();
    let delay = tf.estimated_delay();

    println!("\nDelay:");
    println!(
        "  {:.3} ms ({:.1} samples), {}",
        delay * 1000.0,
        delay * tf.sample_rate(),
        if tf.is_delay_locked() { "locked" } else { "searching" }
    );
    if let Some(method) = tf.delay_method() {
        println!("  method: {method:?}");
    }
    println!("  frames: {}", tf.frame_count());

    println!("\nAverage gain by band:");
    for (label, low, high) in [
        ("Low  (<300 Hz):  ", 0.0, 300.0),
        ("Mid  (300-3k Hz):", 300.0, 3000.0),
        ("High (3k-10k Hz):", 3000.0, 10000.0),
    ] {
        match band_average(&snapshot, &frequencies, low, high) {
            Some(db) => println!("  {label} {db:>6.1} dB"),
            None => println!("  {label}      -"),
        }
    }

    let (mean, trusted, total) = coherence_summary(&snapshot, &frequencies);
    println!("\nCoherence:");
    println!("  mean {mean:.3}, {trusted}/{total} bins >= {COHERENCE_DRAW_MIN}");

    println!("\n  {:>10}  {:>9}  {:>9}  {:>9}", "Freq (Hz)", "Mag (dB)", "Phase", "Coh");
    for target in [100.0, 1000.0, 10000.0] {
        if let Some(k) = nearest_bin(&frequencies, target) {
            println!(
                "  {:>10.1}  {:>9.2}  {:>8.1}°  {:>9.3}",
                frequencies[k],
                snapshot.magnitude_db[k],
                snapshot.phase_degrees[k],
                snapshot.coherence[k]
            );
        }
    }

    if let Some(output_path) = &args.output {
        let is_json = output_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            let json = serde_json::json!({
                "fft_size": tf.fft_size(),
                "sample_rate": tf.sample_rate(),
                "num_bins": tf.spectrum_size(),
                "delay_seconds": delay,
                "delay_locked": tf.is_delay_locked(),
                "averaging_time": tf.averaging_time(),
                "smoothing_octaves": tf.smoothing_octaves(),
                "frequencies": frequencies,
                "magnitude_db": snapshot.magnitude_db,
                "phase_deg": snapshot.phase_degrees,
                "coherence": snapshot.coherence,
            });
            std::fs::write(output_path, serde_json::to_string_pretty(&json)?)?;
        } else {
            write_csv(output_path, &snapshot, &frequencies)?;
        }
        println!("\nWrote response to {}", output_path.display());
    }

    Ok(())
}
