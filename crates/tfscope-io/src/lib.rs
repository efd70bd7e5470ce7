//! Audio file I/O for tfscope.
//!
//! A measurement needs two time-aligned channels: the reference fed into the
//! system under test and the measurement captured at its output. They come
//! either from one stereo file (left = reference, right = measurement) or from
//! two files recorded together.
//!
//! - [`read_pair`] / [`read_pair_files`] load a [`ChannelPair`]
//! - [`write_pair`] saves one as a stereo file
//! - [`read_wav`] loads a single file mixed down to mono
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tfscope_io::read_pair;
//!
//! let (pair, spec) = read_pair("capture.wav")?;
//! println!("{} samples at {} Hz", pair.len(), spec.sample_rate);
//! ```

mod wav;

pub use wav::{ChannelPair, WavSpec, read_pair, read_pair_files, read_wav, write_pair};

/// Failure to load or save a measurement capture.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file could not be opened, decoded or encoded.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// The file does not carry enough channels for a measurement.
    #[error("expected at least {expected} channels, found {found}")]
    ChannelMismatch {
        /// Channels required.
        expected: u16,
        /// Channels present in the file.
        found: u16,
    },

    /// Reference and measurement files were recorded at different rates.
    #[error("sample rate mismatch: reference {reference} Hz, measurement {measurement} Hz")]
    SampleRateMismatch {
        /// Reference file sample rate.
        reference: u32,
        /// Measurement file sample rate.
        measurement: u32,
    },
}

/// Result of a capture read or write.
pub type Result<T> = std::result::Result<T, Error>;
