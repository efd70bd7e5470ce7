//! Errors raised while loading, saving or validating a measurement profile.

use std::path::PathBuf;
use thiserror::Error;

/// Profile error. Every variant names the file or field it concerns.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The profile file could not be read.
    #[error("cannot read profile '{path}': {source}")]
    ReadFile {
        /// Profile path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The profile file could not be written.
    #[error("cannot write profile '{path}': {source}")]
    WriteFile {
        /// Profile path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory meant to hold a profile could not be created.
    #[error("cannot create profile directory '{path}': {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not match the profile layout.
    #[error("malformed profile: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The profile could not be encoded as TOML.
    #[error("cannot encode profile: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A field holds a value the engine cannot use.
    #[error("invalid '{field}': {reason}")]
    Invalid {
        /// Dotted path of the field, e.g. `analysis.fft_size`.
        field: String,
        /// What the value must satisfy.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Reject `field` with a human-readable constraint.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The offending field, for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
