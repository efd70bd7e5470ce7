//! tfscope Analysis - Live dual-channel transfer function engine
//!
//! Feed a reference signal (what goes into a system) and a measurement signal
//! (what comes out) and the engine keeps a continuously updated estimate of
//! the system's frequency response:
//!
//! - [`sync`] - Paired frame buffering with 75% overlap
//! - [`analyzer`] - [`SpectralAnalyzer`] trait and the default windowed FFT
//! - [`averager`] - Exponentially averaged auto/cross spectra, H1 and coherence
//! - [`delay`] - GCC-PHAT delay tracking with a search/lock state machine and a
//!   phase-regression fallback
//! - [`compensation`] - Linear-phase delay removal
//! - [`smoothing`] - Coherence-weighted fractional-octave smoothing
//! - [`phase`] - Coherence-gated phase unwrapping
//! - [`publisher`] - Display-ready results behind a short-held lock
//! - [`processor`] - [`TfProcessor`], which ties the stages together
//!
//! ## Threading
//!
//! [`TfProcessor`] is `Send + Sync` and every method takes `&self`: put it in an
//! `Arc`, call [`TfProcessor::process_block`] from the audio thread and the
//! getters from anywhere else. The per-frame computation and the published
//! results sit behind two separate locks, so a reader waits at most for one
//! array copy.
//!
//! ## Example
//!
//! ```rust
//! use tfscope_analysis::TfProcessor;
//!
//! let tf = TfProcessor::new();
//! tf.prepare(4096, 48000.0);
//!
//! let reference = vec![0.0f32; 512];
//! let measurement = vec![0.0f32; 512];
//! tf.process_block(&reference, &measurement);
//!
//! if tf.is_ready() {
//!     let magnitude = tf.magnitude_response();
//!     assert_eq!(magnitude.len(), 2049);
//! }
//! ```

pub mod analyzer;
pub mod averager;
pub mod compensation;
pub mod delay;
pub mod fft;
pub mod params;
pub mod phase;
pub mod processor;
pub mod publisher;
pub mod settings;
pub mod smoothing;
pub mod sync;

/// Added to every divisor in the engine so silence yields zeros, never NaN.
pub const EPSILON: f64 = 1e-12;

pub use analyzer::{SizePolicy, SpectralAnalyzer, WindowedAnalyzer};
pub use averager::{CrossSpectrumAverager, averaging_alpha};
pub use compensation::compensate_delay;
pub use delay::{
    DelayEstimator, DelayMethodKind, DelaySettings, DelayState, DelayUpdate, LockState,
};
pub use fft::Window;
pub use params::AtomicF64;
pub use phase::{PhaseUnwrapper, unwrap_phase, unwrap_phase_in_place};
pub use processor::TfProcessor;
pub use publisher::{COHERENCE_DRAW_MIN, EMPTY_MAGNITUDE_DB, ResultPublisher, ResultSnapshot};
pub use settings::{Configuration, TfSettings};
pub use smoothing::FractionalOctaveSmoother;
pub use sync::FrameSynchronizer;
