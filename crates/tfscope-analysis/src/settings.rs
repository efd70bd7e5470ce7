//! Engine configuration: the fixed policy constants and the per-`prepare`
//! transform geometry.

use crate::delay::DelaySettings;

/// Frames overlap by 75%: each hop is a quarter of the transform.
pub const OVERLAP: f64 = 0.75;

/// Policy constants of the transfer function engine.
///
/// These are fixed for the lifetime of a [`TfProcessor`](crate::TfProcessor);
/// only the averaging time and smoothing bandwidth can change at runtime, and
/// the values here are just their initial settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TfSettings {
    /// Initial exponential averaging time constant (seconds).
    pub averaging_time: f64,
    /// Initial smoothing bandwidth (octaves).
    pub smoothing_octaves: f64,
    /// Frames after `prepare`/`reset` that use the fast time constant.
    pub fast_averaging_frames: u32,
    /// Time constant used during the fast-convergence frames (seconds).
    pub fast_time_constant: f64,
    /// Coherence gate of the phase unwrapper.
    pub unwrap_coherence_min: f64,
    /// Delay estimator tuning.
    pub delay: DelaySettings,
}

impl Default for TfSettings {
    fn default() -> Self {
        Self {
            averaging_time: 1.5,
            smoothing_octaves: 1.0 / 12.0,
            fast_averaging_frames: 30,
            fast_time_constant: 0.3,
            unwrap_coherence_min: 0.4,
            delay: DelaySettings::default(),
        }
    }
}

/// Transform geometry fixed by a `prepare` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Configuration {
    /// Size passed to `prepare`.
    pub requested_fft_size: usize,
    /// Size the spectral analyzer actually uses.
    pub fft_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Samples between successive frames.
    pub hop_size: usize,
    /// Time between successive frames (seconds).
    pub frame_dt: f64,
}

impl Configuration {
    /// Derive hop and frame interval for an effective transform size.
    pub fn new(requested_fft_size: usize, fft_size: usize, sample_rate: f64) -> Self {
        let hop_size = ((fft_size as f64 * (1.0 - OVERLAP)) as usize).max(1);
        Self {
            requested_fft_size,
            fft_size,
            sample_rate,
            hop_size,
            frame_dt: hop_size as f64 / sample_rate,
        }
    }

    /// Bins in the half-spectrum.
    pub fn spectrum_size(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Centre frequency of bin `k` in Hz.
    pub fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate / self.fft_size as f64
    }

    /// Bin → Hz for every bin.
    pub fn frequency_axis(&self) -> Vec<f64> {
        (0..self.spectrum_size())
            .map(|k| self.bin_frequency(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_for_16k() {
        let config = Configuration::new(16384, 16384, 48000.0);
        assert_eq!(config.hop_size, 4096);
        assert_eq!(config.spectrum_size(), 8193);
        assert!((config.frame_dt - 4096.0 / 48000.0).abs() < 1e-15);

        let axis = config.frequency_axis();
        assert_eq!(axis[0], 0.0);
        assert_eq!(axis[8192], 24000.0);
    }

    #[test]
    fn defaults() {
        let settings = TfSettings::default();
        assert_eq!(settings.averaging_time, 1.5);
        assert_eq!(settings.fast_averaging_frames, 30);
        assert_eq!(settings.delay.lock_count, 3);
    }
}
