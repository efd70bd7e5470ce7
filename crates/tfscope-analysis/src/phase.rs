//! Phase unwrapping: a batch helper and the coherence-gated unwrapper used on
//! the smoothed transfer function.
//!
//! Phase from `atan2` is wrapped to (−π, π]. Unwrapping adds multiples of 2π so
//! that adjacent bins never differ by more than π.
//!
//! Reference: Ghiglia & Pritt, "Two-Dimensional Phase Unwrapping" (1998), ch. 3.

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

const TWO_PI: f64 = 2.0 * PI;

/// Standard phase unwrapping with π tolerance.
///
/// # Arguments
/// * `phase` - Wrapped phase values in radians
///
/// # Returns
/// Unwrapped (continuous) phase values
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    let mut unwrapped = phase.to_vec();
    unwrap_phase_in_place(&mut unwrapped);
    unwrapped
}

/// In-place variant of [`unwrap_phase`]; each value is corrected against the
/// already corrected value before it.
pub fn unwrap_phase_in_place(phase: &mut [f64]) {
    for i in 1..phase.len() {
        phase[i] += wrap_correction(phase[i] - phase[i - 1]);
    }
}

/// Multiple of 2π that brings `delta` into (−π, π].
fn wrap_correction(delta: f64) -> f64 {
    if !delta.is_finite() {
        return 0.0;
    }
    let mut d = delta;
    let mut correction = 0.0;
    while d > PI {
        d -= TWO_PI;
        correction -= TWO_PI;
    }
    while d <= -PI {
        d += TWO_PI;
        correction += TWO_PI;
    }
    correction
}

/// Two-pass, coherence-gated unwrapper for a complex spectrum.
///
/// The forward pass walks up from bin 1 (DC is skipped). A bin whose coherence
/// is below the threshold does not advance the phase track; it is frozen at the
/// last accepted phase so noise cannot propagate up the spectrum. The backward
/// pass then shifts any bin that still disagrees with its upper neighbour by
/// more than π. Magnitudes are never changed.
#[derive(Debug, Clone)]
pub struct PhaseUnwrapper {
    coherence_min: f64,
    unwrapped: Vec<f64>,
}

impl PhaseUnwrapper {
    /// Create an unwrapper with the given coherence gate.
    pub fn new(coherence_min: f64) -> Self {
        Self {
            coherence_min,
            unwrapped: Vec::new(),
        }
    }

    /// Coherence gate.
    pub fn coherence_min(&self) -> f64 {
        self.coherence_min
    }

    /// Unwrapped phase track (radians) from the last call. Bin 0 is unused.
    pub fn unwrapped(&self) -> &[f64] {
        &self.unwrapped
    }

    /// Unwrap `h` in place, gated by `coherence`.
    pub fn unwrap(&mut self, h: &mut [Complex<f64>], coherence: &[f64]) {
        let n = h.len();
        self.unwrapped.clear();
        self.unwrapped.resize(n, 0.0);
        if n < 2 {
            return;
        }

        let start = 1;
        let mut prev = h[start].arg();
        self.unwrapped[start] = prev;

        for k in start + 1..n {
            let raw = h[k].arg();
            let phase = raw + wrap_correction(raw - prev);
            let accepted = coherence.get(k).copied().unwrap_or(0.0) >= self.coherence_min;

            if accepted {
                prev = phase;
            }
            self.unwrapped[k] = prev;
            h[k] = Complex::from_polar(h[k].norm(), prev);
        }

        for k in (start..n - 1).rev() {
            let d = self.unwrapped[k + 1] - self.unwrapped[k];
            if d.abs() > PI {
                self.unwrapped[k] += if d > PI { TWO_PI } else { -TWO_PI };
                h[k] = Complex::from_polar(h[k].norm(), self.unwrapped[k]);
            }
        }
    }
}
