//! # Error Types
//!
//! Configuration problems are typed so they can be rejected when a session is
//! built. Device and backend failures stay `anyhow::Error` and are turned into
//! the session's error message at the session boundary.

use thiserror::Error;

/// Reasons a [`SessionConfig`](crate::config::SessionConfig) or
/// [`EstimatorConfig`](crate::config::EstimatorConfig) is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive")]
    InvalidSampleRate,

    #[error("window size {window_size} is below the minimum of {minimum} samples")]
    WindowTooShort { window_size: usize, minimum: usize },

    #[error(
        "window size {window_size} cannot resolve {lowest_hz} Hz at {sample_rate} Hz \
         (needs at least {required} samples)"
    )]
    WindowCannotResolve {
        window_size: usize,
        required: usize,
        sample_rate: u32,
        lowest_hz: f64,
    },

    #[error("invalid frequency range {min} Hz..{max} Hz")]
    InvalidFrequencyRange { min: f64, max: f64 },

    #[error("maximum frequency {max} Hz is above the Nyquist limit of {nyquist} Hz")]
    AboveNyquist { max: f64, nyquist: f64 },

    #[error("{name} must be within {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
}

/// Reasons a note name such as `"C#3"` fails to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoteParseError {
    #[error("empty note name")]
    Empty,

    #[error("unknown pitch class '{0}'")]
    UnknownPitchClass(String),

    #[error("invalid octave in '{0}'")]
    InvalidOctave(String),
}
