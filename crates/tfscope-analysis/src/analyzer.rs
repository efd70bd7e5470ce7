//! Single-channel spectral transform: windowing + FFT.
//!
//! The transfer function engine owns one analyzer per channel and only talks to
//! it through [`SpectralAnalyzer`], so hosts can plug in their own transform.
//! An analyzer may adjust the requested transform size; the engine always asks
//! for the effective size afterwards and sizes all per-bin state from it.

use crate::fft::{Fft, Window, nearest_power_of_two};
use rustfft::num_complex::Complex;

/// A windowed real-input transform producing a half-spectrum.
pub trait SpectralAnalyzer: Send {
    /// Configure for a requested transform size. Not real-time safe.
    fn prepare(&mut self, requested_size: usize, sample_rate: f64);

    /// Effective transform size chosen by the last [`prepare`](Self::prepare).
    fn fft_size(&self) -> usize;

    /// Number of bins in the half-spectrum (`fft_size / 2 + 1`).
    fn spectrum_size(&self) -> usize {
        self.fft_size() / 2 + 1
    }

    /// Window `frame` and write its half-spectrum into `out`.
    ///
    /// `frame` holds `fft_size()` samples; `out` holds `spectrum_size()` bins.
    /// Shorter frames are zero padded, extra output bins are left untouched.
    fn process_frame(&mut self, frame: &[f32], out: &mut [Complex<f32>]);
}

/// How [`WindowedAnalyzer`] treats the requested transform size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePolicy {
    /// Round to the nearest power of two.
    #[default]
    NearestPowerOfTwo,
    /// Use the requested size as is.
    Exact,
}

/// Default [`SpectralAnalyzer`] backed by rustfft.
pub struct WindowedAnalyzer {
    window: Window,
    policy: SizePolicy,
    fft: Option<Fft<f32>>,
    coefficients: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl WindowedAnalyzer {
    /// Create an analyzer; no transform is planned until `prepare`.
    pub fn new(window: Window, policy: SizePolicy) -> Self {
        Self {
            window,
            policy,
            fft: None,
            coefficients: Vec::new(),
            buffer: Vec::new(),
        }
    }

    /// Window function applied to every frame.
    pub fn window(&self) -> Window {
        self.window
    }

    /// Size policy used by `prepare`.
    pub fn policy(&self) -> SizePolicy {
        self.policy
    }
}

impl Default for WindowedAnalyzer {
    fn default() -> Self {
        Self::new(Window::Hann, SizePolicy::NearestPowerOfTwo)
    }
}

impl Clone for WindowedAnalyzer {
    /// Clones the configuration only; the clone must be prepared before use.
    fn clone(&self) -> Self {
        Self::new(self.window, self.policy)
    }
}

impl SpectralAnalyzer for WindowedAnalyzer {
    fn prepare(&mut self, requested_size: usize, _sample_rate: f64) {
        let size = match self.policy {
            SizePolicy::NearestPowerOfTwo => nearest_power_of_two(requested_size),
            SizePolicy::Exact => requested_size,
        }
        .max(2);

        self.fft = Some(Fft::new(size));
        self.coefficients = self.window.coefficients(size);
        self.buffer = vec![Complex::new(0.0, 0.0); size];
    }

    fn fft_size(&self) -> usize {
        self.fft.as_ref().map_or(0, Fft::size)
    }

    fn process_frame(&mut self, frame: &[f32], out: &mut [Complex<f32>]) {
        let Some(fft) = self.fft.as_mut() else {
            return;
        };

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.coefficients[i], 0.0);
        }
        fft.forward_complex(&mut self.buffer);

        let bins = (fft.size() / 2 + 1).min(out.len());
        out[..bins].copy_from_slice(&self.buffer[..bins]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn power_of_two_policy_rounds() {
        let mut analyzer = WindowedAnalyzer::default();
        analyzer.prepare(12000, 48000.0);
        assert_eq!(analyzer.fft_size(), 16384);
        assert_eq!(analyzer.spectrum_size(), 8193);
    }

    #[test]
    fn exact_policy_keeps_size() {
        let mut analyzer = WindowedAnalyzer::new(Window::Hann, SizePolicy::Exact);
        analyzer.prepare(12000, 48000.0);
        assert_eq!(analyzer.fft_size(), 12000);
        assert_eq!(analyzer.spectrum_size(), 6001);
        assert_eq!(analyzer.policy(), SizePolicy::Exact);
        assert_eq!(analyzer.clone().window(), Window::Hann);
    }

    #[test]
    fn unprepared_analyzer_is_inert() {
        let mut analyzer = WindowedAnalyzer::default();
        assert_eq!(analyzer.fft_size(), 0);
        let mut out = vec![Complex::new(1.0, 1.0); 4];
        analyzer.process_frame(&[1.0; 8], &mut out);
        assert_eq!(out[0], Complex::new(1.0, 1.0));
    }

    #[test]
    fn tone_lands_in_expected_bin() {
        let sample_rate = 48000.0;
        let size = 4096;
        let bin = 200;
        let freq = bin as f32 * sample_rate / size as f32;
        let frame: Vec<f32> = (0..size)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let mut analyzer = WindowedAnalyzer::default();
        analyzer.prepare(size, f64::from(sample_rate));
        let mut out = vec![Complex::new(0.0, 0.0); analyzer.spectrum_size()];
        analyzer.process_frame(&frame, &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.norm().partial_cmp(&b.norm()).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
    }
}
