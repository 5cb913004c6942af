//! # Configuration Module
//!
//! Tunables for the pitch estimator and the detection session. Both structs
//! deserialize from partial JSON: any field left out keeps its default.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest analysis window accepted by a session.
pub const MIN_WINDOW_SIZE: usize = 64;

/// Default analysis window, in samples.
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

/// Default requested capture rate, in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Thresholds and frequency bounds used by the pitch estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// RMS amplitude below which a window is treated as silence.
    pub silence_threshold: f64,
    /// Minimum normalized correlation a peak needs to count as pitched (0..=1).
    pub clarity_threshold: f64,
    /// Lowest frequency reported, in Hz.
    pub min_frequency: f64,
    /// Highest frequency reported, in Hz.
    pub max_frequency: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.01,
            clarity_threshold: 0.8,
            min_frequency: 20.0,
            max_frequency: 5000.0,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.silence_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "silence_threshold",
                range: "0..=1",
                value: self.silence_threshold,
            });
        }
        if !(self.clarity_threshold > 0.0 && self.clarity_threshold <= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "clarity_threshold",
                range: "(0, 1]",
                value: self.clarity_threshold,
            });
        }
        let (min, max) = (self.min_frequency, self.max_frequency);
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min < max) {
            return Err(ConfigError::InvalidFrequencyRange { min, max });
        }
        Ok(())
    }
}

/// Settings for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture rate requested from the input device, in Hz.
    pub sample_rate: u32,
    /// Number of samples copied from the capture buffer on every tick.
    pub window_size: usize,
    /// One-pole smoothing between consecutive windows. Autocorrelation wants
    /// raw samples, so this stays at zero unless the input is very noisy.
    pub smoothing: f64,
    /// Lowest note the window must be long enough to resolve (A0 by default,
    /// below the low B of a five-string bass).
    pub lowest_note_hz: f64,
    pub estimator: EstimatorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            window_size: DEFAULT_WINDOW_SIZE,
            smoothing: 0.0,
            lowest_note_hz: 27.5,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Validates against the configured (requested) sample rate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_for_rate(self.sample_rate)
    }

    /// Validates against the rate a device actually delivers, which may
    /// differ from the one requested.
    pub fn validate_for_rate(&self, sample_rate: u32) -> Result<(), ConfigError> {
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate);
        }
        if self.window_size < MIN_WINDOW_SIZE {
            return Err(ConfigError::WindowTooShort {
                window_size: self.window_size,
                minimum: MIN_WINDOW_SIZE,
            });
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::OutOfRange {
                name: "smoothing",
                range: "0..1",
                value: self.smoothing,
            });
        }
        self.estimator.validate()?;

        let nyquist = sample_rate as f64 / 2.0;
        if self.estimator.max_frequency >= nyquist {
            return Err(ConfigError::AboveNyquist {
                max: self.estimator.max_frequency,
                nyquist,
            });
        }

        if !(self.lowest_note_hz.is_finite() && self.lowest_note_hz > 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "lowest_note_hz",
                range: "> 0",
                value: self.lowest_note_hz,
            });
        }
        let required = required_window(sample_rate, self.lowest_note_hz);
        if self.window_size < required {
            return Err(ConfigError::WindowCannotResolve {
                window_size: self.window_size,
                required,
                sample_rate,
                lowest_hz: self.lowest_note_hz,
            });
        }
        Ok(())
    }
}

/// Window length whose half covers the period of `lowest_hz` plus the
/// neighbour needed for peak refinement.
pub fn required_window(sample_rate: u32, lowest_hz: f64) -> usize {
    let lag = (sample_rate as f64 / lowest_hz).ceil() as usize;
    2 * (lag + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
        assert_eq!(SessionConfig::default().validate_for_rate(44_100), Ok(()));
    }

    #[test]
    fn default_window_is_too_short_for_96k() {
        let err = SessionConfig::default().validate_for_rate(96_000).unwrap_err();
        assert!(matches!(err, ConfigError::WindowCannotResolve { .. }));
    }

    #[test]
    fn rejects_tiny_window() {
        let config = SessionConfig {
            window_size: 32,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::WindowTooShort {
                window_size: 32,
                minimum: MIN_WINDOW_SIZE
            })
        );
    }

    #[test]
    fn rejects_window_that_cannot_reach_lowest_note() {
        let config = SessionConfig {
            window_size: 1024,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WindowCannotResolve { required: 3496, .. })
        ));
    }

    #[test]
    fn rejects_inverted_frequency_range() {
        let mut config = SessionConfig::default();
        config.estimator.min_frequency = 6000.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFrequencyRange { .. })
        ));
    }

    #[test]
    fn rejects_max_frequency_above_nyquist() {
        let mut config = SessionConfig::default();
        config.estimator.max_frequency = 30_000.0;
        assert!(matches!(config.validate(), Err(ConfigError::AboveNyquist { .. })));
    }

    #[test]
    fn rejects_bad_thresholds() {
        let mut config = SessionConfig::default();
        config.estimator.clarity_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.smoothing = 1.0;
        assert!(config.validate().is_err());

        assert_eq!(
            SessionConfig {
                sample_rate: 0,
                ..Default::default()
            }
            .validate(),
            Err(ConfigError::InvalidSampleRate)
        );
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "window_size": 8192, "estimator": { "silence_threshold": 0.02 } }"#)
                .unwrap();
        assert_eq!(config.window_size, 8192);
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.estimator.silence_threshold, 0.02);
        assert_eq!(config.estimator.max_frequency, 5000.0);
    }
}
