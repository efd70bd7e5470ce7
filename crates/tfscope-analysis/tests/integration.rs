//! Integration tests for tfscope-analysis.
//!
//! Drive [`TfProcessor`] the way an audio callback would, in fixed-size blocks,
//! with synthetic reference/measurement pairs whose transfer function is known.

use std::sync::Arc;

use tfscope_analysis::{
    DelayMethodKind, EMPTY_MAGNITUDE_DB, ResultSnapshot, SizePolicy, TfProcessor, Window,
    WindowedAnalyzer,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 512;

/// Deterministic white noise in [-1, 1) (xorshift32).
fn white_noise(len: usize, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

/// `signal` delayed by `samples`, zero filled at the start.
fn delayed(signal: &[f32], samples: usize) -> Vec<f32> {
    let mut out = vec![0.0; signal.len()];
    out[samples..].copy_from_slice(&signal[..signal.len() - samples]);
    out
}

/// Feed both channels in audio-callback-sized blocks.
fn feed(tf: &TfProcessor, reference: &[f32], measurement: &[f32]) {
    for (r, m) in reference.chunks(BLOCK).zip(measurement.chunks(BLOCK)) {
        tf.process_block(r, m);
    }
}

/// Samples needed for `frames` frames at the processor's configuration.
fn samples_for_frames(tf: &TfProcessor, frames: usize) -> usize {
    tf.fft_size() + tf.hop_size() * (frames - 1)
}

/// Indices of bins between 100 Hz and 15 kHz.
fn audio_bins(tf: &TfProcessor) -> Vec<usize> {
    tf.frequency_bins()
        .iter()
        .enumerate()
        .filter(|&(_, &f)| (100.0..=15000.0).contains(&f))
        .map(|(i, _)| i)
        .collect()
}

// ===========================================================================
// Configuration
// ===========================================================================

#[test]
fn prepare_16k_at_48k_geometry() {
    let tf = TfProcessor::new();
    tf.prepare(16384, SAMPLE_RATE);

    assert!(tf.is_ready());
    assert_eq!(tf.spectrum_size(), 8193);
    let freqs = tf.frequency_bins();
    assert_eq!(freqs.len(), 8193);
    assert_eq!(freqs[0], 0.0);
    assert_eq!(freqs[8192], 24000.0);
    assert_eq!(tf.hop_size(), 4096);
    assert_eq!(tf.magnitude_response().len(), 8193);
    assert_eq!(tf.phase_response().len(), 8193);
    assert_eq!(tf.coherence().len(), 8193);
}

#[test]
fn analyzer_rounds_requested_size() {
    let tf = TfProcessor::new();
    tf.prepare(12000, SAMPLE_RATE);
    assert_eq!(tf.fft_size(), 16384);
    assert_eq!(tf.configuration().map(|c| c.requested_fft_size), Some(12000));
    assert_eq!(tf.delay_method(), Some(DelayMethodKind::PhaseTransform));
}

// ===========================================================================
// Numeric safety
// ===========================================================================

#[test]
fn silence_stays_finite() {
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    let zeros = vec![0.0f32; samples_for_frames(&tf, 40)];
    feed(&tf, &zeros, &zeros);

    assert_eq!(tf.frame_count(), 40);
    let snap = tf.snapshot();
    assert!(snap.magnitude_db.iter().all(|m| m.is_finite()));
    assert!(snap.phase_degrees.iter().all(|p| p.is_finite()));
    assert!(snap.coherence.iter().all(|&c| (0.0..=1.0).contains(&c)));
    assert_eq!(tf.estimated_delay(), 0.0);
}

#[test]
fn silent_measurement_stays_finite() {
    let tf = TfProcessor::new();
    tf.prepare(2048, SAMPLE_RATE);
    let reference = white_noise(samples_for_frames(&tf, 30), 5);
    let zeros = vec![0.0f32; reference.len()];
    feed(&tf, &reference, &zeros);

    let snap = tf.snapshot();
    assert!(snap.magnitude_db.iter().all(|m| m.is_finite()));
    assert!(snap.coherence.iter().all(|&c| c == 0.0));
}

// ===========================================================================
// Convergence
// ===========================================================================

#[test]
fn identical_channels_converge_to_unity() {
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    let signal = white_noise(samples_for_frames(&tf, 60), 42);
    feed(&tf, &signal, &signal);

    let snap = tf.snapshot();
    for k in audio_bins(&tf) {
        assert!(snap.magnitude_db[k].abs() < 0.1, "bin {k}: {} dB", snap.magnitude_db[k]);
        assert!(snap.phase_degrees[k].abs() < 1.0, "bin {k}: {} deg", snap.phase_degrees[k]);
        assert!(snap.coherence[k] > 0.99, "bin {k}: coherence {}", snap.coherence[k]);
    }
    assert_eq!(tf.estimated_delay(), 0.0);
}

#[test]
fn gain_shows_in_magnitude() {
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    let reference = white_noise(samples_for_frames(&tf, 60), 9);
    let measurement: Vec<f32> = reference.iter().map(|x| x * 0.5).collect();
    feed(&tf, &reference, &measurement);

    let expected = 20.0 * 0.5f32.log10();
    let snap = tf.snapshot();
    for k in audio_bins(&tf) {
        assert!((snap.magnitude_db[k] - expected).abs() < 0.1);
    }
}

#[test]
fn delay_converges_and_locks() {
    let delay_samples = 48;
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    let reference = white_noise(samples_for_frames(&tf, 60), 1234);
    let measurement = delayed(&reference, delay_samples);

    let mut locked_at = None;
    for (r, m) in reference.chunks(BLOCK).zip(measurement.chunks(BLOCK)) {
        tf.process_block(r, m);
        if locked_at.is_none() && tf.is_delay_locked() {
            locked_at = Some(tf.frame_count());
        }
    }

    let frames = locked_at.expect("delay estimator should lock");
    assert!(frames <= 30, "locked after {frames} frames");

    let expected = delay_samples as f64 / SAMPLE_RATE;
    assert!(
        (tf.estimated_delay() - expected).abs() < 1.0 / SAMPLE_RATE,
        "estimate {} s, expected {expected} s",
        tf.estimated_delay()
    );

    // With the delay removed, low bins read close to zero phase.
    let snap = tf.snapshot();
    let bins: Vec<usize> = audio_bins(&tf)
        .into_iter()
        .filter(|&k| tf.frequency_bins()[k] < 1000.0)
        .collect();
    let near_zero = bins
        .iter()
        .filter(|&&k| snap.phase_degrees[k].abs() < 10.0)
        .count();
    assert!(near_zero * 10 >= bins.len() * 9);
}

#[test]
fn non_power_of_two_uses_regression() {
    let delay_samples = 24;
    let analyzer = WindowedAnalyzer::new(Window::Hann, SizePolicy::Exact);
    let tf = TfProcessor::with_analyzer(analyzer);
    tf.prepare(12000, SAMPLE_RATE);
    assert_eq!(tf.fft_size(), 12000);
    assert_eq!(tf.delay_method(), Some(DelayMethodKind::PhaseRegression));

    let reference = white_noise(12000 + 3000 * 79, 77);
    let measurement = delayed(&reference, delay_samples);

    for (r, m) in reference.chunks(BLOCK).zip(measurement.chunks(BLOCK)) {
        tf.process_block(r, m);
        assert!(!tf.is_delay_locked(), "regression path never locks");
    }

    assert_eq!(tf.frame_count(), 80);
    let expected = delay_samples as f64 / SAMPLE_RATE;
    assert!(
        (tf.estimated_delay() - expected).abs() < 1.0 / SAMPLE_RATE,
        "estimate {} s, expected {expected} s",
        tf.estimated_delay()
    );
}

// ===========================================================================
// Coherence
// ===========================================================================

#[test]
fn uncorrelated_noise_has_low_coherence() {
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    tf.set_averaging_time(0.5);
    let frames = 200;
    let reference = white_noise(samples_for_frames(&tf, frames), 1);
    let measurement = white_noise(reference.len(), 0xDEAD_BEEF);
    feed(&tf, &reference, &measurement);

    let coherence = tf.coherence();
    let bins = audio_bins(&tf);
    let low = bins.iter().filter(|&&k| coherence[k] < 0.3).count();
    assert!(low * 10 >= bins.len() * 9, "{low} of {} bins below 0.3", bins.len());
}

#[test]
fn identical_noise_has_high_coherence() {
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    let signal = white_noise(samples_for_frames(&tf, 40), 2);
    feed(&tf, &signal, &signal);

    let coherence = tf.coherence();
    let bins = audio_bins(&tf);
    let high = bins.iter().filter(|&&k| coherence[k] > 0.95).count();
    assert_eq!(high, bins.len());
}

// ===========================================================================
// Runtime parameters
// ===========================================================================

#[test]
fn negligible_smoothing_matches_no_smoothing() {
    let reference = white_noise(4096 + 1024 * 29, 31);
    let measurement: Vec<f32> = delayed(&reference, 7)
        .iter()
        .zip(&white_noise(reference.len(), 99))
        .map(|(s, n)| s + 0.3 * n)
        .collect();

    let plain = TfProcessor::new();
    plain.prepare(4096, SAMPLE_RATE);
    plain.set_smoothing_octaves(0.0);
    feed(&plain, &reference, &measurement);

    let tiny = TfProcessor::new();
    tiny.prepare(4096, SAMPLE_RATE);
    tiny.set_smoothing_octaves(1.0 / 200.0);
    feed(&tiny, &reference, &measurement);

    assert_eq!(plain.snapshot(), tiny.snapshot());
}

#[test]
fn smoothing_changes_noisy_response() {
    let reference = white_noise(4096 + 1024 * 29, 31);
    let measurement: Vec<f32> = reference
        .iter()
        .zip(&white_noise(reference.len(), 99))
        .map(|(s, n)| s + 0.5 * n)
        .collect();

    let plain = TfProcessor::new();
    plain.prepare(4096, SAMPLE_RATE);
    plain.set_smoothing_octaves(0.0);
    feed(&plain, &reference, &measurement);

    let smoothed = TfProcessor::new();
    smoothed.prepare(4096, SAMPLE_RATE);
    smoothed.set_smoothing_octaves(1.0 / 3.0);
    feed(&smoothed, &reference, &measurement);

    let spread = |m: &[f32]| {
        let bins = 200..1500;
        let mean = m[bins.clone()].iter().sum::<f32>() / bins.len() as f32;
        m[bins.clone()].iter().map(|v| (v - mean).powi(2)).sum::<f32>() / bins.len() as f32
    };
    assert!(spread(&smoothed.magnitude_response()) < spread(&plain.magnitude_response()));
    // Coherence is published unsmoothed.
    assert_eq!(plain.coherence(), smoothed.coherence());
}

// ===========================================================================
// Reset and reads
// ===========================================================================

#[test]
fn reset_clears_state_keeps_configuration() {
    let tf = TfProcessor::new();
    tf.prepare(4096, SAMPLE_RATE);
    let reference = white_noise(samples_for_frames(&tf, 40), 8);
    feed(&tf, &reference, &delayed(&reference, 48));
    assert!(tf.estimated_delay() > 0.0);

    tf.reset();

    assert!(tf.is_ready());
    assert_eq!(tf.fft_size(), 4096);
    assert_eq!(tf.sample_rate(), SAMPLE_RATE);
    assert_eq!(tf.estimated_delay(), 0.0);
    assert!(!tf.is_delay_locked());
    assert_eq!(tf.frame_count(), 0);
    assert_eq!(tf.magnitude_response(), vec![EMPTY_MAGNITUDE_DB; 2049]);
    assert!(tf.coherence().iter().all(|&c| c == 0.0));

    // Buffered samples were dropped too: a partial frame yields nothing.
    tf.process_block(&reference[..4000], &reference[..4000]);
    assert_eq!(tf.frame_count(), 0);
}

#[test]
fn repeated_reads_are_identical() {
    let tf = TfProcessor::new();
    tf.prepare(2048, SAMPLE_RATE);
    let reference = white_noise(samples_for_frames(&tf, 20), 3);
    feed(&tf, &reference, &delayed(&reference, 5));

    assert_eq!(tf.magnitude_response(), tf.magnitude_response());
    assert_eq!(tf.phase_response(), tf.phase_response());
    assert_eq!(tf.coherence(), tf.coherence());
    assert_eq!(tf.frequency_bins(), tf.frequency_bins());

    let bits = |v: Vec<f32>| v.into_iter().map(f32::to_bits).collect::<Vec<_>>();
    assert_eq!(bits(tf.phase_response()), bits(tf.phase_response()));

    let mut copy = ResultSnapshot::default();
    tf.copy_snapshot_into(&mut copy);
    assert_eq!(copy, tf.snapshot());
    assert_eq!(tf.with_snapshot(|s, _| s.magnitude_db.clone()), copy.magnitude_db);
}

#[test]
fn consumer_thread_reads_while_producing() {
    let tf = Arc::new(TfProcessor::new());
    tf.prepare(2048, SAMPLE_RATE);
    let reference = white_noise(2048 + 512 * 99, 17);

    let reader = {
        let tf = Arc::clone(&tf);
        std::thread::spawn(move || {
            let mut reads = 0;
            loop {
                let snap = tf.snapshot();
                assert_eq!(snap.len(), 1025);
                assert!(snap.coherence.iter().all(|&c| (0.0..=1.0).contains(&c)));
                tf.set_smoothing_octaves(if reads % 2 == 0 { 1.0 / 6.0 } else { 1.0 / 24.0 });
                reads += 1;
                if tf.frame_count() >= 100 {
                    break;
                }
                std::thread::yield_now();
            }
            reads
        })
    };

    feed(&tf, &reference, &reference);
    assert_eq!(tf.frame_count(), 100);
    assert!(reader.join().unwrap() > 0);
}
