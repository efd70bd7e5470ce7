//! Measurement profile file format and operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

use tfscope_analysis::{DelaySettings, SizePolicy, TfSettings, Window, WindowedAnalyzer};

use crate::error::ConfigError;

/// Smallest transform size a profile may request.
pub const MIN_FFT_SIZE: usize = 64;

/// Largest transform size a profile may request.
pub const MAX_FFT_SIZE: usize = 1 << 20;

/// A complete measurement setup.
///
/// Every field has a default, so a profile file only needs the values it
/// changes.
///
/// # TOML Format
///
/// ```toml
/// [analysis]
/// fft_size = 16384
/// sample_rate = 48000
/// averaging_time = 1.5
/// smoothing_octaves = 0.0833
/// exact_size = false
/// window = "hann"
///
/// [delay]
/// stability_threshold_ms = 0.1
/// lock_count = 3
/// search_period = 2
/// locked_period = 20
/// coherence_min = 0.4
///
/// [averaging]
/// fast_frames = 30
/// fast_time_constant = 0.3
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Transform and runtime tunables.
    pub analysis: AnalysisConfig,
    /// Delay tracker tuning.
    pub delay: DelayConfig,
    /// Start-up averaging behaviour.
    pub averaging: AveragingConfig,
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Requested transform size.
    pub fft_size: usize,
    /// Sample rate hint; the audio source's rate wins when they differ.
    pub sample_rate: u32,
    /// Exponential averaging time constant (seconds).
    pub averaging_time: f64,
    /// Fractional-octave smoothing bandwidth (octaves, 0 disables).
    pub smoothing_octaves: f64,
    /// Keep `fft_size` as is instead of rounding to a power of two.
    pub exact_size: bool,
    /// Analysis window name.
    pub window: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let settings = TfSettings::default();
        Self {
            fft_size: 16384,
            sample_rate: 48000,
            averaging_time: settings.averaging_time,
            smoothing_octaves: settings.smoothing_octaves,
            exact_size: false,
            window: Window::default().name().to_string(),
        }
    }
}

/// `[delay]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelayConfig {
    /// Largest change between searching updates still counted as stable (ms).
    pub stability_threshold_ms: f64,
    /// Consecutive stable updates needed to lock.
    pub lock_count: u32,
    /// Frames between updates while searching.
    pub search_period: u32,
    /// Frames between updates once locked.
    pub locked_period: u32,
    /// Minimum coherence for the unwrapper and the regression fallback.
    pub coherence_min: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        let delay = DelaySettings::default();
        Self {
            stability_threshold_ms: delay.stability_threshold * 1000.0,
            lock_count: delay.lock_count,
            search_period: delay.search_period,
            locked_period: delay.locked_period,
            coherence_min: delay.coherence_min,
        }
    }
}

/// `[averaging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AveragingConfig {
    /// Frames after start or reset that use the fast time constant.
    pub fast_frames: u32,
    /// Fast time constant (seconds).
    pub fast_time_constant: f64,
}

impl Default for AveragingConfig {
    fn default() -> Self {
        let settings = TfSettings::default();
        Self {
            fast_frames: settings.fast_averaging_frames,
            fast_time_constant: settings.fast_time_constant,
        }
    }
}

fn check(ok: bool, field: &str, reason: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, reason))
    }
}

impl MeasurementConfig {
    /// Load a profile from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse a profile from a TOML string and validate it.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: MeasurementConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the profile to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the profile to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analysis;
        check(
            (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&a.fft_size),
            "analysis.fft_size",
            &format!("must be between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}"),
        )?;
        check(a.sample_rate > 0, "analysis.sample_rate", "must be positive")?;
        check(
            a.averaging_time.is_finite() && a.averaging_time > 0.0,
            "analysis.averaging_time",
            "must be a positive number of seconds",
        )?;
        check(
            a.smoothing_octaves.is_finite() && a.smoothing_octaves >= 0.0,
            "analysis.smoothing_octaves",
            "must be zero or positive",
        )?;
        check(
            Window::from_name(&a.window).is_some(),
            "analysis.window",
            "expected hann, hamming, blackman, blackman-harris or rectangular",
        )?;

        let d = &self.delay;
        check(
            d.stability_threshold_ms.is_finite() && d.stability_threshold_ms > 0.0,
            "delay.stability_threshold_ms",
            "must be positive",
        )?;
        check(d.lock_count > 0, "delay.lock_count", "must be at least 1")?;
        check(d.search_period > 0, "delay.search_period", "must be at least 1")?;
        check(d.locked_period > 0, "delay.locked_period", "must be at least 1")?;
        check(
            (0.0..=1.0).contains(&d.coherence_min),
            "delay.coherence_min",
            "must be between 0 and 1",
        )?;

        check(
            self.averaging.fast_time_constant.is_finite() && self.averaging.fast_time_constant > 0.0,
            "averaging.fast_time_constant",
            "must be a positive number of seconds",
        )?;
        Ok(())
    }

    /// Engine policy constants described by this profile.
    pub fn to_settings(&self) -> TfSettings {
        let defaults = TfSettings::default();
        TfSettings {
            averaging_time: self.analysis.averaging_time,
            smoothing_octaves: self.analysis.smoothing_octaves,
            fast_averaging_frames: self.averaging.fast_frames,
            fast_time_constant: self.averaging.fast_time_constant,
            unwrap_coherence_min: self.delay.coherence_min,
            delay: DelaySettings {
                stability_threshold: self.delay.stability_threshold_ms / 1000.0,
                lock_count: self.delay.lock_count,
                search_period: self.delay.search_period,
                locked_period: self.delay.locked_period,
                coherence_min: self.delay.coherence_min,
                ..defaults.delay
            },
        }
    }

    /// The analysis window, falling back to Hann for unknown names.
    pub fn window(&self) -> Window {
        Window::from_name(&self.analysis.window).unwrap_or_default()
    }

    /// How the analyzer should treat `fft_size`.
    pub fn size_policy(&self) -> SizePolicy {
        if self.analysis.exact_size {
            SizePolicy::Exact
        } else {
            SizePolicy::NearestPowerOfTwo
        }
    }

    /// Spectral analyzer described by this profile.
    pub fn analyzer(&self) -> WindowedAnalyzer {
        WindowedAnalyzer::new(self.window(), self.size_policy())
    }
}
