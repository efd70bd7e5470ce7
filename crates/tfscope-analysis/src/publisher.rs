//! Display-ready results and their cross-thread publication.
//!
//! The producer extracts magnitude, phase and coherence into a private
//! [`ResultSnapshot`] while holding the engine lock, then copies it into the
//! published snapshot under a second lock that guards nothing else. Consumers
//! only ever take that second lock, so they wait at most for one array copy.

use crate::EPSILON;
use crate::settings::Configuration;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Magnitude shown before any frame has been processed (dB).
pub const EMPTY_MAGNITUDE_DB: f32 = -60.0;

/// Bins with coherence below this are not trustworthy enough to draw.
pub const COHERENCE_DRAW_MIN: f32 = 0.6;

/// Magnitude, phase and coherence per bin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSnapshot {
    /// `20·log10(max(|H|, ε))` per bin.
    pub magnitude_db: Vec<f32>,
    /// Wrapped phase of H in degrees, (−180, 180].
    pub phase_degrees: Vec<f32>,
    /// Magnitude-squared coherence, [0, 1].
    pub coherence: Vec<f32>,
}

impl ResultSnapshot {
    /// A blank snapshot for `bins` bins.
    pub fn empty(bins: usize) -> Self {
        Self {
            magnitude_db: vec![EMPTY_MAGNITUDE_DB; bins],
            phase_degrees: vec![0.0; bins],
            coherence: vec![0.0; bins],
        }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.magnitude_db.len()
    }

    /// True when sized for zero bins.
    pub fn is_empty(&self) -> bool {
        self.magnitude_db.is_empty()
    }

    /// Blank every bin without reallocating.
    pub fn clear(&mut self) {
        self.magnitude_db.fill(EMPTY_MAGNITUDE_DB);
        self.phase_degrees.fill(0.0);
        self.coherence.fill(0.0);
    }

    /// Fill from the final transfer function and its coherence.
    ///
    /// Phase comes straight from `atan2` of the complex value; all averaging
    /// has already happened in the complex domain.
    pub fn extract(&mut self, h: &[Complex<f64>], gamma2: &[f64]) {
        let bins = self.len().min(h.len());
        for k in 0..bins {
            let mag = h[k].norm();
            self.magnitude_db[k] = (20.0 * mag.max(EPSILON).log10()) as f32;
            self.phase_degrees[k] = h[k].im.atan2(h[k].re).to_degrees() as f32;
            self.coherence[k] = gamma2.get(k).copied().unwrap_or(0.0).clamp(0.0, 1.0) as f32;
        }
    }

    /// Copy `other` into `self`, reusing existing allocations.
    pub fn copy_from(&mut self, other: &ResultSnapshot) {
        self.magnitude_db.clone_from(&other.magnitude_db);
        self.phase_degrees.clone_from(&other.phase_degrees);
        self.coherence.clone_from(&other.coherence);
    }

    /// Fraction of bins whose coherence is at least `threshold`.
    pub fn coherent_fraction(&self, threshold: f32) -> f32 {
        if self.coherence.is_empty() {
            return 0.0;
        }
        let count = self.coherence.iter().filter(|&&c| c >= threshold).count();
        count as f32 / self.coherence.len() as f32
    }
}

#[derive(Debug, Default)]
struct Published {
    snapshot: ResultSnapshot,
    frequencies: Vec<f32>,
    configuration: Option<Configuration>,
}

/// The consumer-facing side of the engine.
#[derive(Debug, Default)]
pub struct ResultPublisher {
    inner: Mutex<Published>,
    new_data: AtomicBool,
}

impl ResultPublisher {
    /// An unconfigured publisher with empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize for a new configuration and blank the results.
    pub fn configure(&self, configuration: Configuration, frequencies: &[f64]) {
        let mut inner = self.inner.lock();
        inner.snapshot = ResultSnapshot::empty(frequencies.len());
        inner.frequencies = frequencies.iter().map(|&f| f as f32).collect();
        inner.configuration = Some(configuration);
        drop(inner);
        self.new_data.store(false, Ordering::Release);
    }

    /// Swap in a freshly computed frame and raise the new-data flag.
    pub fn publish(&self, frame: &ResultSnapshot) {
        self.inner.lock().snapshot.copy_from(frame);
        self.new_data.store(true, Ordering::Release);
    }

    /// Blank the results, keeping size and configuration.
    pub fn clear(&self) {
        self.inner.lock().snapshot.clear();
        self.new_data.store(false, Ordering::Release);
    }

    /// Configuration of the last `configure`, if any.
    pub fn configuration(&self) -> Option<Configuration> {
        self.inner.lock().configuration
    }

    /// Copy of the magnitude response (dB).
    pub fn magnitude_db(&self) -> Vec<f32> {
        self.inner.lock().snapshot.magnitude_db.clone()
    }

    /// Copy of the phase response (degrees).
    pub fn phase_degrees(&self) -> Vec<f32> {
        self.inner.lock().snapshot.phase_degrees.clone()
    }

    /// Copy of the coherence.
    pub fn coherence(&self) -> Vec<f32> {
        self.inner.lock().snapshot.coherence.clone()
    }

    /// Copy of the bin frequencies (Hz).
    pub fn frequencies(&self) -> Vec<f32> {
        self.inner.lock().frequencies.clone()
    }

    /// Copy of the whole snapshot.
    pub fn snapshot(&self) -> ResultSnapshot {
        self.inner.lock().snapshot.clone()
    }

    /// Copy the snapshot into `out`, reusing its allocations.
    pub fn copy_into(&self, out: &mut ResultSnapshot) {
        out.copy_from(&self.inner.lock().snapshot);
    }

    /// Borrow the snapshot and frequency axis under the lock.
    ///
    /// Keep `f` short: the producer waits on this lock to publish.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&ResultSnapshot, &[f32]) -> R) -> R {
        let inner = self.inner.lock();
        f(&inner.snapshot, &inner.frequencies)
    }

    /// True if a frame was published since the last [`take_new_data`](Self::take_new_data).
    pub fn has_new_data(&self) -> bool {
        self.new_data.load(Ordering::Acquire)
    }

    /// Read and clear the new-data flag.
    pub fn take_new_data(&self) -> bool {
        self.new_data.swap(false, Ordering::AcqRel)
    }
}
