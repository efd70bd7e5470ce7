//! Inter-channel delay estimation.
//!
//! Two estimators sit behind one [`DelayEstimator`], chosen once when it is
//! built:
//!
//! - **Phase transform (GCC-PHAT)**, used when the transform size is a power of
//!   two. The instantaneous cross-spectrum is whitened to unit magnitude, mirrored
//!   to a full Hermitian spectrum and inverse transformed; the peak of the
//!   resulting correlation is the lag.
//!
//!   ```text
//!   C[k]   = Y[k]·conj(X[k]) / |Y[k]·conj(X[k])|
//!   r[n]   = IFFT(C)[n] / N
//!   lag    = argmax |r[n]|,  lag −= N if lag > N/2
//!   delay  = lag / sample_rate
//!   ```
//!
//!   A search/lock state machine smooths the raw lags: heavy smoothing and a
//!   short update period while searching, light smoothing and a long period once
//!   three consecutive updates agree to within the stability threshold.
//!
//! - **Phase regression**, the fallback for other sizes. A least-squares line
//!   through the unwrapped phase of coherent mid-band bins of the averaged H1
//!   estimate gives `τ = −slope / 2π`. This path never locks.
//!
//! A positive delay means the measurement lags the reference.
//!
//! # Reference
//!
//! C. Knapp, G. Carter, "The Generalized Correlation Method for Estimation of
//! Time Delay", IEEE Trans. ASSP 24(4), 1976.

use crate::EPSILON;
use crate::fft::{Fft, is_power_of_two};
use crate::phase::unwrap_phase_in_place;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Estimates from the phase-transform path are clamped to ±50 ms.
pub const MAX_TRACKED_DELAY: f64 = 0.05;

/// Regression estimates are clamped to ±100 ms; anything larger at the point of
/// compensation is treated as a detection fault and discarded.
pub const MAX_DELAY: f64 = 0.1;

/// Tuning of the delay state machine and the regression fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelaySettings {
    /// Largest change between searching updates still counted as stable (seconds).
    pub stability_threshold: f64,
    /// Consecutive stable updates needed to lock.
    pub lock_count: u32,
    /// Frames between updates while searching.
    pub search_period: u32,
    /// Frames between updates once locked.
    pub locked_period: u32,
    /// Minimum coherence for a bin to enter the regression.
    pub coherence_min: f64,
    /// Lowest frequency used by the regression (Hz).
    pub regression_low_hz: f64,
    /// Highest frequency used by the regression (Hz).
    pub regression_high_hz: f64,
    /// Minimum number of qualifying bins for a regression update.
    pub min_regression_bins: usize,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            stability_threshold: 0.0001,
            lock_count: 3,
            search_period: 2,
            locked_period: 20,
            coherence_min: 0.4,
            regression_low_hz: 200.0,
            regression_high_hz: 8000.0,
            min_regression_bins: 20,
        }
    }
}

/// Search/lock state of the phase-transform estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// Converging: smoothed 50/50, updated every `search_period` frames.
    #[default]
    Searching,
    /// Converged: smoothed 90/10, updated every `locked_period` frames.
    Locked,
}

/// Mutable estimator state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DelayState {
    /// Current delay estimate in seconds.
    pub estimated_delay: f64,
    /// Regression-path smoothing memory in seconds.
    pub smoothed_delay: f64,
    /// Estimate after the previous searching update.
    pub previous_delay: f64,
    /// Search/lock state.
    pub lock: LockState,
    /// Consecutive stable searching updates.
    pub stable_count: u32,
    /// Frames since the last update.
    pub update_counter: u32,
}

/// Which estimator a [`DelayEstimator`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMethodKind {
    /// GCC-PHAT correlation.
    PhaseTransform,
    /// Least-squares phase slope.
    PhaseRegression,
}

impl DelayMethodKind {
    /// The estimator a transform of `fft_size` points gets.
    pub fn for_fft_size(fft_size: usize) -> Self {
        if is_power_of_two(fft_size) {
            Self::PhaseTransform
        } else {
            Self::PhaseRegression
        }
    }
}

/// What happened on a frame passed to [`DelayEstimator::on_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayUpdate {
    /// Not an update frame, or too few coherent bins.
    Skipped,
    /// The estimate moved.
    Updated(f64),
    /// The estimate moved and the estimator just locked.
    Locked(f64),
}

/// Phase-transform correlator with its own inverse transform.
pub struct GccPhat {
    fft: Fft<f64>,
    buffer: Vec<Complex<f64>>,
}

impl GccPhat {
    /// Plan a correlator for `size`-point frames.
    pub fn new(size: usize) -> Self {
        Self {
            fft: Fft::new(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
        }
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.fft.size()
    }

    /// Correlate two half-spectra and return `(lag_samples, peak_value)`.
    pub fn lag(&mut self, x: &[Complex<f64>], y: &[Complex<f64>]) -> (i64, f64) {
        let n = self.size();
        let last = x.len().min(y.len()).min(n / 2 + 1);
        if n == 0 || last == 0 {
            return (0, 0.0);
        }

        for (k, slot) in self.buffer.iter_mut().enumerate() {
            // Upper half mirrors the lower half: C[N−k] = conj(C[k]).
            let (bin, mirrored) = if k < last { (k, false) } else { (n - k, true) };
            *slot = if bin < last {
                let c = phase_transform(y[bin] * x[bin].conj());
                if mirrored { c.conj() } else { c }
            } else {
                Complex::new(0.0, 0.0)
            };
        }

        self.fft.inverse_complex(&mut self.buffer);
        peak_lag_circular(&self.buffer)
    }
}

/// Whiten a cross-spectrum bin to unit magnitude, or zero if negligible.
fn phase_transform(c: Complex<f64>) -> Complex<f64> {
    let mag = c.norm();
    if mag > EPSILON {
        c / mag
    } else {
        Complex::new(0.0, 0.0)
    }
}

/// Index of the largest |re| in a circular correlation, as a signed lag.
///
/// Indices above N/2 wrap to negative lags. Ties keep the earliest index.
pub fn peak_lag_circular(correlation: &[Complex<f64>]) -> (i64, f64) {
    let n = correlation.len();
    if n == 0 {
        return (0, 0.0);
    }

    let mut best_idx = 0;
    let mut best_val = correlation[0].re;
    for (i, c) in correlation.iter().enumerate().skip(1) {
        if c.re.abs() > best_val.abs() {
            best_idx = i;
            best_val = c.re;
        }
    }

    let lag = if best_idx > n / 2 {
        best_idx as i64 - n as i64
    } else {
        best_idx as i64
    };
    (lag, best_val)
}

enum DelayMethod {
    PhaseTransform(GccPhat),
    PhaseRegression {
        freqs: Vec<f64>,
        phases: Vec<f64>,
    },
}

/// Delay estimator with a tagged choice of algorithm.
pub struct DelayEstimator {
    method: DelayMethod,
    state: DelayState,
    settings: DelaySettings,
    sample_rate: f64,
}

impl DelayEstimator {
    /// Build an estimator for a configuration.
    ///
    /// Power-of-two transform sizes get the phase-transform path; any other
    /// size falls back to phase regression.
    pub fn new(fft_size: usize, sample_rate: f64, settings: DelaySettings) -> Self {
        let method = match DelayMethodKind::for_fft_size(fft_size) {
            DelayMethodKind::PhaseTransform => DelayMethod::PhaseTransform(GccPhat::new(fft_size)),
            DelayMethodKind::PhaseRegression => {
                let capacity = fft_size / 2 + 1;
                DelayMethod::PhaseRegression {
                    freqs: Vec::with_capacity(capacity),
                    phases: Vec::with_capacity(capacity),
                }
            }
        };

        Self {
            method,
            state: DelayState::default(),
            settings,
            sample_rate,
        }
    }

    /// Which estimator is active.
    pub fn method(&self) -> DelayMethodKind {
        match self.method {
            DelayMethod::PhaseTransform(_) => DelayMethodKind::PhaseTransform,
            DelayMethod::PhaseRegression { .. } => DelayMethodKind::PhaseRegression,
        }
    }

    /// Snapshot of the state machine.
    pub fn state(&self) -> DelayState {
        self.state
    }

    /// Current estimate in seconds.
    pub fn estimated_delay(&self) -> f64 {
        self.state.estimated_delay
    }

    /// True once the phase-transform path has locked.
    pub fn is_locked(&self) -> bool {
        self.state.lock == LockState::Locked
    }

    /// Back to searching with zero delay.
    pub fn reset(&mut self) {
        self.state = DelayState::default();
    }

    /// Count a processed frame and run an update when the cadence is due.
    ///
    /// `x`/`y` are the instantaneous spectra (phase-transform path);
    /// `transfer`, `coherence` and `frequencies` are the averaged H1 estimate,
    /// its coherence and the bin frequencies (regression path).
    pub fn on_frame(
        &mut self,
        x: &[Complex<f64>],
        y: &[Complex<f64>],
        transfer: &[Complex<f64>],
        coherence: &[f64],
        frequencies: &[f64],
    ) -> DelayUpdate {
        self.state.update_counter += 1;
        let period = match self.state.lock {
            LockState::Searching => self.settings.search_period,
            LockState::Locked => self.settings.locked_period,
        };
        if self.state.update_counter < period {
            return DelayUpdate::Skipped;
        }
        self.state.update_counter = 0;

        match &mut self.method {
            DelayMethod::PhaseTransform(gcc) => {
                let (lag, _) = gcc.lag(x, y);
                let delay = lag as f64 / self.sample_rate;
                self.track(delay)
            }
            DelayMethod::PhaseRegression { freqs, phases } => {
                let fit = regression_delay(
                    transfer,
                    coherence,
                    frequencies,
                    &self.settings,
                    freqs,
                    phases,
                );
                match fit {
                    Some(tau) => {
                        self.state.smoothed_delay = 0.8 * self.state.smoothed_delay + 0.2 * tau;
                        self.state.estimated_delay = self.state.smoothed_delay;
                        DelayUpdate::Updated(self.state.estimated_delay)
                    }
                    None => DelayUpdate::Skipped,
                }
            }
        }
    }

    /// Feed one raw phase-transform estimate through the search/lock smoother.
    fn track(&mut self, delay: f64) -> DelayUpdate {
        let state = &mut self.state;
        let mut just_locked = false;

        match state.lock {
            LockState::Searching => {
                state.estimated_delay = 0.5 * state.estimated_delay + 0.5 * delay;

                if (state.estimated_delay - state.previous_delay).abs()
                    < self.settings.stability_threshold
                {
                    state.stable_count += 1;
                } else {
                    state.stable_count = 0;
                }
                state.previous_delay = state.estimated_delay;

                if state.stable_count >= self.settings.lock_count {
                    state.lock = LockState::Locked;
                    just_locked = true;
                }
            }
            LockState::Locked => {
                state.estimated_delay = 0.9 * state.estimated_delay + 0.1 * delay;
            }
        }

        state.estimated_delay = state
            .estimated_delay
            .clamp(-MAX_TRACKED_DELAY, MAX_TRACKED_DELAY);

        if just_locked {
            DelayUpdate::Locked(state.estimated_delay)
        } else {
            DelayUpdate::Updated(state.estimated_delay)
        }
    }

    /// The delay to compensate this frame.
    ///
    /// An estimate beyond ±100 ms is a detection fault: both the estimate and
    /// the regression memory are zeroed and no compensation is applied.
    pub fn delay_for_compensation(&mut self) -> f64 {
        if self.state.estimated_delay.abs() > MAX_DELAY {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                delay_ms = self.state.estimated_delay * 1000.0,
                "discarding out-of-range delay estimate"
            );
            self.state.estimated_delay = 0.0;
            self.state.smoothed_delay = 0.0;
        }
        self.state.estimated_delay
    }

    #[cfg(test)]
    fn force_estimate(&mut self, delay: f64) {
        self.state.estimated_delay = delay;
        self.state.smoothed_delay = delay;
    }
}

/// Least-squares delay from the phase slope of coherent mid-band bins.
///
/// Returns `None` when fewer than `min_regression_bins` bins qualify or the
/// fit is degenerate.
fn regression_delay(
    transfer: &[Complex<f64>],
    coherence: &[f64],
    frequencies: &[f64],
    settings: &DelaySettings,
    freqs: &mut Vec<f64>,
    phases: &mut Vec<f64>,
) -> Option<f64> {
    freqs.clear();
    phases.clear();

    let bins = transfer.len().min(coherence.len()).min(frequencies.len());
    for k in 1..bins {
        let f = frequencies[k];
        if coherence[k] > settings.coherence_min
            && f >= settings.regression_low_hz
            && f <= settings.regression_high_hz
        {
            freqs.push(f);
            phases.push(transfer[k].arg());
        }
    }

    if freqs.len() < settings.min_regression_bins {
        return None;
    }

    unwrap_phase_in_place(phases);

    let n = freqs.len() as f64;
    let (mut sum_f, mut sum_p, mut sum_ff, mut sum_fp) = (0.0, 0.0, 0.0, 0.0);
    for (&f, &p) in freqs.iter().zip(phases.iter()) {
        sum_f += f;
        sum_p += p;
        sum_ff += f * f;
        sum_fp += f * p;
    }

    let denom = n * sum_ff - sum_f * sum_f;
    if denom.abs() <= EPSILON {
        return None;
    }

    let slope = (n * sum_fp - sum_f * sum_p) / denom;
    Some((-slope / (2.0 * PI)).clamp(-MAX_DELAY, MAX_DELAY))
}
