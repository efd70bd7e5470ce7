//! FFT wrapper with windowing functions
//!
//! [`Fft`] owns a forward and inverse plan plus the scratch space both need, so
//! that calls on the audio thread never allocate. It is generic over the sample
//! type: the per-channel analyzers run in `f32`, the phase-transform correlation
//! runs in `f64`.

use rustfft::num_complex::Complex;
use rustfft::num_traits::{FromPrimitive, One, Zero};
use rustfft::{FftNum, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    /// Rectangular (no windowing)
    Rectangular,
    /// Hann window (raised cosine)
    #[default]
    Hann,
    /// Hamming window
    Hamming,
    /// Blackman window
    Blackman,
    /// Blackman-Harris window (better sidelobe suppression)
    BlackmanHarris,
}

impl Window {
    /// Coefficient at position `i` of an `n`-point periodic window.
    pub fn coefficient(&self, i: usize, n: usize) -> f32 {
        let x = 2.0 * PI * i as f32 / n as f32;
        match self {
            Window::Rectangular => 1.0,
            Window::Hann => 0.5 * (1.0 - x.cos()),
            Window::Hamming => 0.54 - 0.46 * x.cos(),
            Window::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
            Window::BlackmanHarris => {
                0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                    - 0.01168 * (3.0 * x).cos()
            }
        }
    }

    /// Get window coefficients
    pub fn coefficients(&self, size: usize) -> Vec<f32> {
        (0..size).map(|i| self.coefficient(i, size)).collect()
    }

    /// Parse a window name as used in measurement profiles and on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "rectangular" | "rect" | "none" => Some(Window::Rectangular),
            "hann" | "hanning" => Some(Window::Hann),
            "hamming" => Some(Window::Hamming),
            "blackman" => Some(Window::Blackman),
            "blackman-harris" | "blackmanharris" => Some(Window::BlackmanHarris),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Window::Rectangular => "rectangular",
            Window::Hann => "hann",
            Window::Hamming => "hamming",
            Window::Blackman => "blackman",
            Window::BlackmanHarris => "blackman-harris",
        }
    }
}

/// FFT processor with cached plans and scratch space
pub struct Fft<T: FftNum = f32> {
    fft: Arc<dyn rustfft::Fft<T>>,
    ifft: Arc<dyn rustfft::Fft<T>>,
    scratch: Vec<Complex<T>>,
    size: usize,
}

impl<T: FftNum> Fft<T> {
    /// Create a new FFT processor for the given size
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        Self {
            fft,
            ifft,
            scratch: vec![Complex::zero(); scratch_len],
            size,
        }
    }

    /// Get FFT size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Perform forward FFT on complex input (in-place)
    pub fn forward_complex(&mut self, buffer: &mut [Complex<T>]) {
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }

    /// Perform inverse FFT on complex buffer (in-place), normalized by 1/N
    pub fn inverse_complex(&mut self, buffer: &mut [Complex<T>]) {
        self.ifft.process_with_scratch(buffer, &mut self.scratch);

        let scale = T::one() / T::from_usize(self.size).unwrap_or_else(T::one);
        for c in buffer.iter_mut() {
            *c = *c * scale;
        }
    }
}

/// True if `size` is an exact power of two (the phase-transform delay path needs this).
pub fn is_power_of_two(size: usize) -> bool {
    size.is_power_of_two()
}

/// Round to the nearest power of two in the log domain, ties rounding up.
pub fn nearest_power_of_two(size: usize) -> usize {
    if size <= 1 {
        return 1;
    }
    let order = (size as f64).log2().round() as u32;
    1usize << order
}
