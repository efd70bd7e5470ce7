//! Property-based tests for tfscope-analysis.
//!
//! Clamping and finiteness invariants that must hold for any input, checked
//! with proptest-generated spectra and sample blocks.

use proptest::prelude::*;
use rustfft::num_complex::Complex;
use tfscope_analysis::delay::MAX_TRACKED_DELAY;
use tfscope_analysis::smoothing::MIN_SMOOTHING_OCTAVES;
use tfscope_analysis::{
    CrossSpectrumAverager, DelayEstimator, DelaySettings, FractionalOctaveSmoother,
    PhaseUnwrapper, TfProcessor, compensate_delay,
};

fn complex_vec(len: usize, range: f64) -> impl Strategy<Value = Vec<Complex<f64>>> {
    prop::collection::vec((-range..range, -range..range), len)
        .prop_map(|v| v.into_iter().map(|(re, im)| Complex::new(re, im)).collect())
}

fn axis(bins: usize, spacing: f64) -> Vec<f64> {
    (0..bins).map(|k| k as f64 * spacing).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Coherence stays in [0, 1] and H1 stays finite for any pair of spectra,
    /// including exact zeros.
    #[test]
    fn averager_outputs_bounded(
        frames in prop::collection::vec((complex_vec(65, 1e3), complex_vec(65, 1e3)), 1..8),
        zero_reference in any::<bool>(),
        alpha in 0.0f64..0.999,
    ) {
        let mut averager = CrossSpectrumAverager::new(65);
        for (x, y) in &frames {
            let x = if zero_reference { vec![Complex::new(0.0, 0.0); 65] } else { x.clone() };
            averager.update(&x, y, alpha);
        }

        for k in 0..65 {
            let c = averager.coherence()[k];
            prop_assert!((0.0..=1.0).contains(&c), "coherence {} at bin {}", c, k);
            prop_assert!(averager.transfer()[k].norm().is_finite());
            prop_assert!(averager.gxx()[k] >= 0.0 && averager.gyy()[k] >= 0.0);
        }
    }

    /// Delay compensation is a pure phase rotation.
    #[test]
    fn compensation_preserves_magnitude(
        h in complex_vec(129, 10.0),
        tau in -0.1f64..0.1,
    ) {
        let freqs = axis(129, 187.5);
        let mut out = vec![Complex::new(0.0, 0.0); 129];
        compensate_delay(&h, &freqs, tau, &mut out);
        for (a, b) in h.iter().zip(&out) {
            prop_assert!((a.norm() - b.norm()).abs() <= 1e-9 * (1.0 + a.norm()));
        }
    }

    /// Below the minimum bandwidth the smoother is the identity.
    #[test]
    fn negligible_smoothing_is_identity(
        h in complex_vec(257, 5.0),
        coherence in prop::collection::vec(0.0f64..=1.0, 257),
        octaves in 0.0f64..MIN_SMOOTHING_OCTAVES,
    ) {
        let freqs = axis(257, 93.75);
        let mut out = vec![Complex::new(0.0, 0.0); 257];
        FractionalOctaveSmoother::new().smooth(&h, &coherence, &freqs, octaves, &mut out);
        prop_assert_eq!(out, h);
    }

    /// Smoothed bins are convex combinations, so they never exceed the
    /// largest input magnitude.
    #[test]
    fn smoothing_stays_within_input_bounds(
        h in complex_vec(257, 5.0),
        coherence in prop::collection::vec(0.0f64..=1.0, 257),
        octaves in MIN_SMOOTHING_OCTAVES..2.0,
    ) {
        let freqs = axis(257, 93.75);
        let mut out = vec![Complex::new(0.0, 0.0); 257];
        FractionalOctaveSmoother::new().smooth(&h, &coherence, &freqs, octaves, &mut out);
        let max_in = h.iter().map(|c| c.norm()).fold(0.0, f64::max);
        for c in &out {
            prop_assert!(c.norm() <= max_in + 1e-9);
        }
    }

    /// Unwrapping never changes magnitudes and leaves no jump above π.
    #[test]
    fn unwrap_keeps_magnitude_and_continuity(
        h in complex_vec(200, 3.0),
        coherence in prop::collection::vec(0.0f64..=1.0, 200),
    ) {
        let mut unwrapped = h.clone();
        let mut unwrapper = PhaseUnwrapper::new(0.4);
        unwrapper.unwrap(&mut unwrapped, &coherence);

        for (a, b) in h.iter().zip(&unwrapped) {
            prop_assert!((a.norm() - b.norm()).abs() <= 1e-9 * (1.0 + a.norm()));
        }
        let track = unwrapper.unwrapped();
        for k in 1..track.len() - 1 {
            prop_assert!((track[k + 1] - track[k]).abs() <= std::f64::consts::PI + 1e-9);
        }
    }

    /// The phase-transform estimate never leaves ±50 ms, whatever the spectra.
    #[test]
    fn tracked_delay_is_clamped(
        frames in prop::collection::vec((complex_vec(129, 1.0), complex_vec(129, 1.0)), 2..16),
        sample_rate in prop::sample::select(vec![1000.0, 8000.0, 48000.0]),
    ) {
        let mut estimator = DelayEstimator::new(256, sample_rate, DelaySettings::default());
        for (x, y) in &frames {
            estimator.on_frame(x, y, &[], &[], &[]);
            prop_assert!(estimator.estimated_delay().abs() <= MAX_TRACKED_DELAY);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Published results are finite and coherence is clamped for any input
    /// block, including silence on either channel.
    #[test]
    fn processor_results_bounded(
        reference in prop::collection::vec(-1.0f32..=1.0, 1024),
        measurement in prop::collection::vec(-1.0f32..=1.0, 1024),
        mute in 0usize..3,
        smoothing in 0.0f64..1.0,
    ) {
        let tf = TfProcessor::new();
        tf.prepare(256, 48000.0);
        tf.set_smoothing_octaves(smoothing);

        let silence = vec![0.0f32; 1024];
        let (r, m) = match mute {
            0 => (&reference, &measurement),
            1 => (&silence, &measurement),
            _ => (&reference, &silence),
        };
        tf.process_block(r, m);

        let snap = tf.snapshot();
        prop_assert_eq!(snap.len(), 129);
        prop_assert!(snap.magnitude_db.iter().all(|v| v.is_finite()));
        prop_assert!(snap.phase_degrees.iter().all(|v| v.is_finite()));
        prop_assert!(snap.coherence.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }
}
