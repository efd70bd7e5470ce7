//! Measurement profile management.

use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use tfscope_config::MeasurementConfig;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a profile with default values
    Init {
        /// Profile path (TOML)
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a profile and print its effective values
    Show {
        /// Profile path (TOML)
        path: PathBuf,
    },
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Init { path, force } => init_profile(&path, force),
        ConfigCommand::Show { path } => show_profile(&path),
    }
}

fn init_profile(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "'{}' already exists. Use --force to overwrite.",
            path.display()
        );
    }
    MeasurementConfig::default().save(path)?;
    println!("Wrote default profile to {}", path.display());
    Ok(())
}

fn show_profile(path: &Path) -> anyhow::Result<()> {
    let config = MeasurementConfig::load(path)?;
    let a = &config.analysis;
    let d = &config.delay;

    println!("Profile: {}", path.display());
    println!();
    println!("Analysis:");
    println!(
        "  FFT size:   {}{}",
        a.fft_size,
        if a.exact_size { " (exact)" } else { "" }
    );
    println!("  Sample rate: {} Hz", a.sample_rate);
    println!("  Window:     {}", config.window().name());
    println!("  Averaging:  {:.2} s", a.averaging_time);
    println!("  Smoothing:  {:.4} oct", a.smoothing_octaves);
    println!();
    println!("Delay tracking:");
    println!(
        "  Lock after {} updates within {:.3} ms",
        d.lock_count, d.stability_threshold_ms
    );
    println!(
        "  Update every {} frames searching, {} locked",
        d.search_period, d.locked_period
    );
    println!("  Coherence gate: {:.2}", d.coherence_min);
    println!();
    println!("Fast start:");
    println!(
        "  {} frames at {:.2} s",
        config.averaging.fast_frames, config.averaging.fast_time_constant
    );
    Ok(())
}
