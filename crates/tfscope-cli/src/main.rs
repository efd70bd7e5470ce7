//! tfscope CLI - Offline transfer function measurement.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tfscope")]
#[command(author, version, about = "Dual-channel transfer function measurement", long_about = None)]
struct Cli {
    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure the transfer function between a reference and a measurement
    Measure(commands::measure::MeasureArgs),

    /// Generate a stereo test capture with a known delay and gain
    Generate(commands::generate::GenerateArgs),

    /// Create and inspect measurement profiles
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Measure(args) => commands::measure::run(args),
        Commands::Generate(args) => commands::generate::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
