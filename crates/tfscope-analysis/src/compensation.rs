//! Removal of the linear-phase component caused by an inter-channel delay.

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Delays shorter than this (seconds) are not compensated.
pub const MIN_COMPENSATED_DELAY: f64 = 1e-6;

/// `out[k] = h[k] · exp(j·2π·f[k]·τ)`.
///
/// A measurement lagging the reference by τ carries a phase of −2π·f·τ; this
/// rotates it back. For |τ| below [`MIN_COMPENSATED_DELAY`] it is a plain copy.
pub fn compensate_delay(
    h: &[Complex<f64>],
    frequencies: &[f64],
    tau: f64,
    out: &mut [Complex<f64>],
) {
    let n = h.len().min(out.len());
    if tau.abs() <= MIN_COMPENSATED_DELAY || !tau.is_finite() {
        out[..n].copy_from_slice(&h[..n]);
        return;
    }

    for k in 0..n {
        let f = frequencies.get(k).copied().unwrap_or(0.0);
        out[k] = h[k] * Complex::from_polar(1.0, 2.0 * PI * f * tau);
    }
}
