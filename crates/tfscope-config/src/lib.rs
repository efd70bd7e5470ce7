//! Measurement profiles for the tfscope transfer function engine.
//!
//! A [`MeasurementConfig`] is a TOML file describing the transform size,
//! window, runtime tunables and delay tracker tuning of a measurement. It
//! converts into the engine's [`TfSettings`](tfscope_analysis::TfSettings) and
//! spectral analyzer.
//!
//! # Example
//!
//! ```rust,no_run
//! use tfscope_analysis::TfProcessor;
//! use tfscope_config::MeasurementConfig;
//!
//! let config = MeasurementConfig::load("room.toml").unwrap();
//! let tf = TfProcessor::with_settings(config.analyzer(), config.to_settings());
//! tf.prepare(config.analysis.fft_size, f64::from(config.analysis.sample_rate));
//! ```

mod error;
mod profile;

pub use error::ConfigError;
pub use profile::{
    AnalysisConfig, AveragingConfig, DelayConfig, MAX_FFT_SIZE, MIN_FFT_SIZE, MeasurementConfig,
};
