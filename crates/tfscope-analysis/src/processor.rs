//! The transfer function engine.
//!
//! ```text
//! reference ─┐                 ┌─ X ─┐
//!            ├─ FrameSync ─────┤     ├─ Averager ─ H, γ² ─ Delay ─ Compensate ─ Smooth ─ Unwrap ─ Publish
//! measured ──┘                 └─ Y ─┘                 ▲
//!                                    └─── X, Y ────────┘
//! ```
//!
//! All per-frame work happens inline in [`TfProcessor::process_block`] under
//! the engine lock, which is taken once per frame. Results go out through a
//! [`ResultPublisher`], whose lock is only ever held for an array copy, so
//! readers on other threads are never stalled by the heavy computation. The
//! averaging time and smoothing bandwidth are atomics read at the start of
//! each frame; a change takes effect on the next frame.

use crate::analyzer::{SpectralAnalyzer, WindowedAnalyzer};
use crate::averager::{CrossSpectrumAverager, averaging_alpha};
use crate::compensation::compensate_delay;
use crate::delay::{DelayEstimator, DelayMethodKind, DelayUpdate};
use crate::params::AtomicF64;
use crate::phase::PhaseUnwrapper;
use crate::publisher::{ResultPublisher, ResultSnapshot};
use crate::settings::{Configuration, TfSettings};
use crate::smoothing::FractionalOctaveSmoother;
use crate::sync::FrameSynchronizer;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Everything the producer mutates while processing a frame.
struct Engine<A> {
    config: Configuration,
    reference_analyzer: A,
    measurement_analyzer: A,
    sync: FrameSynchronizer,
    reference_spectrum: Vec<Complex<f32>>,
    measurement_spectrum: Vec<Complex<f32>>,
    x: Vec<Complex<f64>>,
    y: Vec<Complex<f64>>,
    averager: CrossSpectrumAverager,
    delay: DelayEstimator,
    compensated: Vec<Complex<f64>>,
    smoother: FractionalOctaveSmoother,
    smoothed: Vec<Complex<f64>>,
    unwrapper: PhaseUnwrapper,
    frequencies: Vec<f64>,
    results: ResultSnapshot,
    frame_count: u64,
}

/// Outcome of one processed frame.
struct FrameOutcome {
    delay: f64,
    locked: bool,
}

impl<A: SpectralAnalyzer> Engine<A> {
    fn new(
        config: Configuration,
        reference_analyzer: A,
        measurement_analyzer: A,
        settings: &TfSettings,
    ) -> Self {
        let bins = config.spectrum_size();
        let zero = Complex::new(0.0, 0.0);
        Self {
            reference_analyzer,
            measurement_analyzer,
            sync: FrameSynchronizer::new(config.fft_size, config.hop_size),
            reference_spectrum: vec![Complex::new(0.0, 0.0); bins],
            measurement_spectrum: vec![Complex::new(0.0, 0.0); bins],
            x: vec![zero; bins],
            y: vec![zero; bins],
            averager: CrossSpectrumAverager::new(bins),
            delay: DelayEstimator::new(config.fft_size, config.sample_rate, settings.delay),
            compensated: vec![zero; bins],
            smoother: FractionalOctaveSmoother::with_capacity(bins),
            smoothed: vec![zero; bins],
            unwrapper: PhaseUnwrapper::new(settings.unwrap_coherence_min),
            frequencies: config.frequency_axis(),
            results: ResultSnapshot::empty(bins),
            frame_count: 0,
            config,
        }
    }

    fn reset(&mut self) {
        self.sync.clear();
        self.averager.reset();
        self.delay.reset();
        self.results.clear();
        self.frame_count = 0;
    }

    /// Time constant for the next frame: the short start-up constant until
    /// `fast_averaging_frames` frames have been averaged, then `averaging_time`.
    fn time_constant(&self, settings: &TfSettings, averaging_time: f64) -> f64 {
        if self.frame_count < u64::from(settings.fast_averaging_frames) {
            settings.fast_time_constant
        } else {
            averaging_time
        }
    }

    /// Process the next buffered frame, if there is one.
    fn process_next_frame(
        &mut self,
        settings: &TfSettings,
        averaging_time: f64,
        smoothing_octaves: f64,
    ) -> Option<FrameOutcome> {
        let (reference, measurement) = self.sync.frame()?;
        self.reference_analyzer
            .process_frame(reference, &mut self.reference_spectrum);
        self.measurement_analyzer
            .process_frame(measurement, &mut self.measurement_spectrum);
        self.sync.advance();

        for (dst, src) in self.x.iter_mut().zip(&self.reference_spectrum) {
            *dst = Complex::new(f64::from(src.re), f64::from(src.im));
        }
        for (dst, src) in self.y.iter_mut().zip(&self.measurement_spectrum) {
            *dst = Complex::new(f64::from(src.re), f64::from(src.im));
        }

        let alpha = averaging_alpha(
            self.config.frame_dt,
            self.time_constant(settings, averaging_time),
        );
        self.averager.update(&self.x, &self.y, alpha);
        self.frame_count += 1;

        let update = self.delay.on_frame(
            &self.x,
            &self.y,
            self.averager.transfer(),
            self.averager.coherence(),
            &self.frequencies,
        );
        if let DelayUpdate::Locked(_delay) = update {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                delay_ms = _delay * 1000.0,
                frame = self.frame_count,
                "delay estimate locked"
            );
        }

        let tau = self.delay.delay_for_compensation();
        compensate_delay(
            self.averager.transfer(),
            &self.frequencies,
            tau,
            &mut self.compensated,
        );
        self.smoother.smooth(
            &self.compensated,
            self.averager.coherence(),
            &self.frequencies,
            smoothing_octaves,
            &mut self.smoothed,
        );
        self.unwrapper
            .unwrap(&mut self.smoothed, self.averager.coherence());
        self.results
            .extract(&self.smoothed, self.averager.coherence());

        Some(FrameOutcome {
            delay: tau,
            locked: self.delay.is_locked(),
        })
    }
}

/// Live dual-channel transfer function estimator.
///
/// Generic over the [`SpectralAnalyzer`]; the `analyzer` passed at construction
/// is a template that is cloned into one independent instance per channel at
/// every [`prepare`](Self::prepare).
///
/// # Example
///
/// ```rust
/// use tfscope_analysis::{SizePolicy, TfProcessor, Window, WindowedAnalyzer};
///
/// // Keep a non-power-of-two size; the delay falls back to phase regression.
/// let tf = TfProcessor::with_analyzer(WindowedAnalyzer::new(Window::Hann, SizePolicy::Exact));
/// tf.prepare(12000, 48000.0);
/// assert_eq!(tf.fft_size(), 12000);
/// assert_eq!(tf.spectrum_size(), 6001);
/// ```
pub struct TfProcessor<A: SpectralAnalyzer + Clone = WindowedAnalyzer> {
    template: Mutex<A>,
    engine: Mutex<Option<Engine<A>>>,
    publisher: ResultPublisher,
    settings: TfSettings,
    averaging_time: AtomicF64,
    smoothing_octaves: AtomicF64,
    estimated_delay: AtomicF64,
    delay_locked: AtomicBool,
    frame_count: AtomicU64,
    ready: AtomicBool,
}

impl TfProcessor<WindowedAnalyzer> {
    /// Engine with a Hann-windowed, power-of-two analyzer and default settings.
    pub fn new() -> Self {
        Self::with_settings(WindowedAnalyzer::default(), TfSettings::default())
    }
}

impl Default for TfProcessor<WindowedAnalyzer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: SpectralAnalyzer + Clone> TfProcessor<A> {
    /// Engine with a custom analyzer and default settings.
    pub fn with_analyzer(analyzer: A) -> Self {
        Self::with_settings(analyzer, TfSettings::default())
    }

    /// Engine with a custom analyzer and policy constants.
    pub fn with_settings(analyzer: A, settings: TfSettings) -> Self {
        Self {
            template: Mutex::new(analyzer),
            engine: Mutex::new(None),
            publisher: ResultPublisher::new(),
            averaging_time: AtomicF64::new(settings.averaging_time),
            smoothing_octaves: AtomicF64::new(settings.smoothing_octaves),
            estimated_delay: AtomicF64::new(0.0),
            delay_locked: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            settings,
        }
    }

    /// Configure for a transform size and sample rate, reallocating all state.
    ///
    /// The analyzer may adjust `fft_size`; every per-bin buffer is sized from
    /// the effective size it reports. Not real-time safe: audio processing
    /// must be stopped while this runs. A size below 2 or a non-positive sample
    /// rate is ignored and the previous configuration stays in place.
    pub fn prepare(&self, fft_size: usize, sample_rate: f64) {
        if fft_size < 2 || !(sample_rate > 0.0 && sample_rate.is_finite()) {
            #[cfg(feature = "tracing")]
            tracing::warn!(fft_size, sample_rate, "ignoring invalid prepare");
            return;
        }

        let template = self.template.lock();
        let mut reference_analyzer = template.clone();
        let mut measurement_analyzer = template.clone();
        drop(template);
        reference_analyzer.prepare(fft_size, sample_rate);
        measurement_analyzer.prepare(fft_size, sample_rate);

        let effective = reference_analyzer.fft_size();
        if effective < 2 || measurement_analyzer.fft_size() != effective {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                requested = fft_size,
                effective,
                "spectral analyzer rejected transform size"
            );
            return;
        }

        let config = Configuration::new(fft_size, effective, sample_rate);
        let engine = Engine::new(
            config,
            reference_analyzer,
            measurement_analyzer,
            &self.settings,
        );

        #[cfg(feature = "tracing")]
        tracing::info!(
            requested = fft_size,
            fft_size = effective,
            sample_rate,
            bins = config.spectrum_size(),
            hop = config.hop_size,
            frame_dt_ms = config.frame_dt * 1000.0,
            alpha = averaging_alpha(config.frame_dt, self.averaging_time.load()),
            method = ?engine.delay.method(),
            "transfer function engine prepared"
        );

        let mut guard = self.engine.lock();
        self.publisher.configure(config, &engine.frequencies);
        *guard = Some(engine);
        drop(guard);

        self.estimated_delay.store(0.0);
        self.delay_locked.store(false, Ordering::Relaxed);
        self.frame_count.store(0, Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);
    }

    /// Feed a block of synchronized reference and measurement samples.
    ///
    /// Processes every frame that becomes complete, publishing after each.
    /// Only the common prefix of the two slices is used. Does nothing before
    /// the first successful [`prepare`](Self::prepare) or on empty input.
    pub fn process_block(&self, reference: &[f32], measurement: &[f32]) {
        if !self.is_ready() || reference.is_empty() || measurement.is_empty() {
            return;
        }

        {
            let mut guard = self.engine.lock();
            let Some(engine) = guard.as_mut() else {
                return;
            };
            engine.sync.push(reference, measurement);
        }

        loop {
            let averaging_time = self.averaging_time.load();
            let smoothing_octaves = self.smoothing_octaves.load();

            let mut guard = self.engine.lock();
            let Some(engine) = guard.as_mut() else {
                return;
            };
            let Some(outcome) =
                engine.process_next_frame(&self.settings, averaging_time, smoothing_octaves)
            else {
                return;
            };

            self.publisher.publish(&engine.results);
            self.estimated_delay.store(outcome.delay);
            self.delay_locked.store(outcome.locked, Ordering::Relaxed);
            self.frame_count.store(engine.frame_count, Ordering::Relaxed);
        }
    }

    /// Zero running averages, delay state and buffered samples.
    ///
    /// Keeps the configuration and allocations; [`is_ready`](Self::is_ready)
    /// is unaffected.
    pub fn reset(&self) {
        // Held until the published state is cleared too, so no frame can be
        // published in between and then wiped.
        let mut guard = self.engine.lock();
        if let Some(engine) = guard.as_mut() {
            engine.reset();
        }
        self.publisher.clear();
        self.estimated_delay.store(0.0);
        self.delay_locked.store(false, Ordering::Relaxed);
        self.frame_count.store(0, Ordering::Relaxed);
        drop(guard);

        #[cfg(feature = "tracing")]
        tracing::debug!("transfer function engine reset");
    }

    /// True once a `prepare` has succeeded. Check before trusting results.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Magnitude response in dB, one value per bin.
    pub fn magnitude_response(&self) -> Vec<f32> {
        self.publisher.magnitude_db()
    }

    /// Wrapped phase response in degrees, one value per bin.
    pub fn phase_response(&self) -> Vec<f32> {
        self.publisher.phase_degrees()
    }

    /// Coherence in [0, 1], one value per bin.
    pub fn coherence(&self) -> Vec<f32> {
        self.publisher.coherence()
    }

    /// Centre frequency of each bin in Hz.
    pub fn frequency_bins(&self) -> Vec<f32> {
        self.publisher.frequencies()
    }

    /// All three published sequences in one lock acquisition.
    pub fn snapshot(&self) -> ResultSnapshot {
        self.publisher.snapshot()
    }

    /// Copy the published sequences into `out`, reusing its allocations.
    pub fn copy_snapshot_into(&self, out: &mut ResultSnapshot) {
        self.publisher.copy_into(out);
    }

    /// Borrow the published results and frequency axis without copying.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&ResultSnapshot, &[f32]) -> R) -> R {
        self.publisher.with_snapshot(f)
    }

    /// True if results were published since the last [`take_new_data`](Self::take_new_data).
    pub fn has_new_data(&self) -> bool {
        self.publisher.has_new_data()
    }

    /// Read and clear the new-data flag.
    pub fn take_new_data(&self) -> bool {
        self.publisher.take_new_data()
    }

    /// Current inter-channel delay estimate in seconds (positive: measurement lags).
    pub fn estimated_delay(&self) -> f64 {
        self.estimated_delay.load()
    }

    /// True while the phase-transform delay estimator is locked.
    pub fn is_delay_locked(&self) -> bool {
        self.delay_locked.load(Ordering::Relaxed)
    }

    /// Delay estimator chosen by the last `prepare`.
    pub fn delay_method(&self) -> Option<DelayMethodKind> {
        self.configuration()
            .map(|config| DelayMethodKind::for_fft_size(config.fft_size))
    }

    /// Frames processed since the last `prepare` or `reset`.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Set the exponential averaging time constant in seconds.
    ///
    /// Zero disables averaging. Negative or non-finite values are ignored.
    pub fn set_averaging_time(&self, seconds: f64) {
        if seconds.is_finite() && seconds >= 0.0 {
            self.averaging_time.store(seconds);
        }
    }

    /// Current averaging time constant in seconds.
    pub fn averaging_time(&self) -> f64 {
        self.averaging_time.load()
    }

    /// Set the smoothing bandwidth in octaves (below 1/96 disables smoothing).
    ///
    /// Negative or non-finite values are ignored.
    pub fn set_smoothing_octaves(&self, octaves: f64) {
        if octaves.is_finite() && octaves >= 0.0 {
            self.smoothing_octaves.store(octaves);
        }
    }

    /// Current smoothing bandwidth in octaves.
    pub fn smoothing_octaves(&self) -> f64 {
        self.smoothing_octaves.load()
    }

    /// Policy constants this engine was built with.
    pub fn settings(&self) -> &TfSettings {
        &self.settings
    }

    /// Geometry of the last successful `prepare`.
    pub fn configuration(&self) -> Option<Configuration> {
        self.publisher.configuration()
    }

    /// Effective transform size, 0 before `prepare`.
    pub fn fft_size(&self) -> usize {
        self.configuration().map_or(0, |c| c.fft_size)
    }

    /// Sample rate in Hz, 0 before `prepare`.
    pub fn sample_rate(&self) -> f64 {
        self.configuration().map_or(0.0, |c| c.sample_rate)
    }

    /// Bins per sequence, 0 before `prepare`.
    pub fn spectrum_size(&self) -> usize {
        self.configuration().map_or(0, |c| c.spectrum_size())
    }

    /// Samples between frames, 0 before `prepare`.
    pub fn hop_size(&self) -> usize {
        self.configuration().map_or(0, |c| c.hop_size)
    }

    /// Seconds between frames, 0 before `prepare`.
    pub fn frame_dt(&self) -> f64 {
        self.configuration().map_or(0.0, |c| c.frame_dt)
    }
}
