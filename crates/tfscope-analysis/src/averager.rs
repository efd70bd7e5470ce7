//! Exponentially averaged auto- and cross-spectra, H1 estimate and coherence.
//!
//! Per frame, with reference spectrum X and measurement spectrum Y:
//!
//! ```text
//! Gxx ← α·Gxx + (1−α)·|X|²
//! Gyy ← α·Gyy + (1−α)·|Y|²
//! Gxy ← α·Gxy + (1−α)·Y·conj(X)
//!
//! H   = Gxy / (Gxx + ε)                  (H1 estimator)
//! γ²  = |Gxy|² / (Gxx·Gyy + ε)           clamped to [0, 1]
//! ```
//!
//! ε is added to every divisor so a silent channel yields zeros, never NaN.
//! The coherence denominator keeps the additive ε even though the product is
//! normally many orders of magnitude larger; only true silence is affected.

use crate::EPSILON;
use rustfft::num_complex::Complex;

/// Averaging coefficient for a one-pole exponential average.
///
/// `alpha = exp(−frame_dt / time_constant)`. Non-positive time constants
/// disable averaging (alpha = 0, every frame replaces the average).
pub fn averaging_alpha(frame_dt: f64, time_constant: f64) -> f64 {
    if time_constant <= 0.0 || !time_constant.is_finite() {
        return 0.0;
    }
    (-frame_dt / time_constant).exp().clamp(0.0, 1.0 - f64::EPSILON)
}

/// Running cross-spectral state for one reference/measurement pair.
#[derive(Debug, Clone)]
pub struct CrossSpectrumAverager {
    gxx: Vec<f64>,
    gyy: Vec<f64>,
    gxy: Vec<Complex<f64>>,
    transfer: Vec<Complex<f64>>,
    coherence: Vec<f64>,
}

impl CrossSpectrumAverager {
    /// Allocate zeroed state for `spectrum_size` bins.
    pub fn new(spectrum_size: usize) -> Self {
        Self {
            gxx: vec![0.0; spectrum_size],
            gyy: vec![0.0; spectrum_size],
            gxy: vec![Complex::new(0.0, 0.0); spectrum_size],
            transfer: vec![Complex::new(0.0, 0.0); spectrum_size],
            coherence: vec![0.0; spectrum_size],
        }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.gxx.len()
    }

    /// True when sized for zero bins.
    pub fn is_empty(&self) -> bool {
        self.gxx.is_empty()
    }

    /// Fold one frame of instantaneous spectra into the averages.
    ///
    /// Bins beyond the shortest of `x`, `y` and the state are left untouched.
    pub fn update(&mut self, x: &[Complex<f64>], y: &[Complex<f64>], alpha: f64) {
        let beta = 1.0 - alpha;
        let bins = self.len().min(x.len()).min(y.len());

        for k in 0..bins {
            let xk = x[k];
            let yk = y[k];

            self.gxx[k] = alpha * self.gxx[k] + beta * xk.norm_sqr();
            self.gyy[k] = alpha * self.gyy[k] + beta * yk.norm_sqr();
            self.gxy[k] = self.gxy[k] * alpha + yk * xk.conj() * beta;

            self.transfer[k] = self.gxy[k] / (self.gxx[k] + EPSILON);

            let coh = self.gxy[k].norm_sqr() / (self.gxx[k] * self.gyy[k] + EPSILON);
            self.coherence[k] = coh.clamp(0.0, 1.0);
        }
    }

    /// Zero all running state.
    pub fn reset(&mut self) {
        self.gxx.fill(0.0);
        self.gyy.fill(0.0);
        self.gxy.fill(Complex::new(0.0, 0.0));
        self.transfer.fill(Complex::new(0.0, 0.0));
        self.coherence.fill(0.0);
    }

    /// Averaged reference auto-spectrum.
    pub fn gxx(&self) -> &[f64] {
        &self.gxx
    }

    /// Averaged measurement auto-spectrum.
    pub fn gyy(&self) -> &[f64] {
        &self.gyy
    }

    /// Averaged cross-spectrum `Y·conj(X)`.
    pub fn gxy(&self) -> &[Complex<f64>] {
        &self.gxy
    }

    /// Raw H1 transfer function.
    pub fn transfer(&self) -> &[Complex<f64>] {
        &self.transfer
    }

    /// Magnitude-squared coherence, in [0, 1].
    pub fn coherence(&self) -> &[f64] {
        &self.coherence
    }
}
