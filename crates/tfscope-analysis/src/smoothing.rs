//! Coherence-weighted fractional-octave smoothing in the complex domain.
//!
//! For each bin with centre frequency f0 in the audio band, the output is the
//! coherence-weighted mean of every bin inside
//!
//! ```text
//! [f0·2^(−B/2), f0·2^(+B/2)]
//! ```
//!
//! where B is the bandwidth in octaves. Averaging complex values (rather than
//! dB and degrees separately) keeps phase and magnitude consistent.
//!
//! The frequency axis is ascending, so both band edges only ever move up as f0
//! does. Running prefix sums of `w` and `w·H` make each band sum a subtraction,
//! which keeps a whole pass linear in the number of bins.

use crate::EPSILON;
use rustfft::num_complex::Complex;

/// Bandwidths below 1/96 octave are treated as "no smoothing".
pub const MIN_SMOOTHING_OCTAVES: f64 = 1.0 / 96.0;

/// Lowest centre frequency that gets smoothed (Hz).
pub const SMOOTHING_LOW_HZ: f64 = 20.0;

/// Highest centre frequency that gets smoothed (Hz).
pub const SMOOTHING_HIGH_HZ: f64 = 20000.0;

/// Minimum bins inside a band for it to be averaged.
pub const MIN_BAND_BINS: usize = 3;

/// Fractional-octave smoother with reusable prefix-sum scratch.
#[derive(Debug, Clone, Default)]
pub struct FractionalOctaveSmoother {
    weight_sums: Vec<f64>,
    value_sums: Vec<Complex<f64>>,
}

impl FractionalOctaveSmoother {
    /// Create a smoother; scratch grows on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a smoother with scratch preallocated for `spectrum_size` bins.
    pub fn with_capacity(spectrum_size: usize) -> Self {
        Self {
            weight_sums: Vec::with_capacity(spectrum_size + 1),
            value_sums: Vec::with_capacity(spectrum_size + 1),
        }
    }

    /// Smooth `input` into `out`.
    ///
    /// Bins outside 20 Hz–20 kHz, bands with fewer than three bins or with
    /// negligible total coherence, and any bandwidth below 1/96 octave pass
    /// through unchanged.
    pub fn smooth(
        &mut self,
        input: &[Complex<f64>],
        coherence: &[f64],
        frequencies: &[f64],
        octaves: f64,
        out: &mut [Complex<f64>],
    ) {
        let n = input.len().min(frequencies.len()).min(out.len());
        out[..n].copy_from_slice(&input[..n]);

        if n == 0 || !octaves.is_finite() || octaves < MIN_SMOOTHING_OCTAVES {
            return;
        }

        self.weight_sums.clear();
        self.value_sums.clear();
        self.weight_sums.push(0.0);
        self.value_sums.push(Complex::new(0.0, 0.0));
        for i in 0..n {
            let w = coherence.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            self.weight_sums.push(self.weight_sums[i] + w);
            self.value_sums.push(self.value_sums[i] + input[i] * w);
        }

        let lower_ratio = 2f64.powf(-octaves / 2.0);
        let upper_ratio = 2f64.powf(octaves / 2.0);

        // lo: first bin with f >= f1, hi: first bin with f > f2.
        let mut lo = 0;
        let mut hi = 0;

        for k in 0..n {
            let f0 = frequencies[k];
            if !(SMOOTHING_LOW_HZ..=SMOOTHING_HIGH_HZ).contains(&f0) {
                continue;
            }

            let f1 = f0 * lower_ratio;
            let f2 = f0 * upper_ratio;
            while lo < n && frequencies[lo] < f1 {
                lo += 1;
            }
            hi = hi.max(lo);
            while hi < n && frequencies[hi] <= f2 {
                hi += 1;
            }

            let count = hi - lo;
            let sum_w = self.weight_sums[hi] - self.weight_sums[lo];
            if sum_w > EPSILON && count >= MIN_BAND_BINS {
                out[k] = (self.value_sums[hi] - self.value_sums[lo]) / sum_w;
            }
        }
    }
}
