// tuner-core/src/lib.rs

//! The core logic for the StringThing tuner.
//! This crate is responsible for audio capture, pitch detection and note
//! mapping, and drives them through a listening session. It is completely
//! headless and contains no UI code.

pub mod audio;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fft;
pub mod meter;
pub mod notes;
pub mod pitch;
pub mod scheduler;
pub mod session;

use serde::Serialize;
use std::fmt;

pub use config::{EstimatorConfig, SessionConfig};
pub use error::{ConfigError, NoteParseError};
pub use notes::{NotePosition, PitchClass};
pub use pitch::{PitchEstimator, SampleWindow};
pub use session::{Session, SessionSnapshot, SessionState};

/// What the tuner shows for a single analysis frame.
///
/// Readings are replaced wholesale every tick. A reading that is playing
/// always carries a positive frequency and a note; a silent one carries
/// neither, so a consumer can never show a frozen last pitch as current.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitchReading {
    /// Detected fundamental in Hz, 0 when nothing is playing.
    frequency: f64,
    /// Nearest note, `None` when nothing is playing.
    note: Option<PitchClass>,
    octave: Option<i32>,
    /// Deviation from the nearest note, within ±50.
    cents: i32,
    is_playing: bool,
}

impl PitchReading {
    /// The neutral "no pitch" reading.
    pub fn silent() -> Self {
        Self {
            frequency: 0.0,
            note: None,
            octave: None,
            cents: 0,
            is_playing: false,
        }
    }

    /// Reading for a detected fundamental. Falls back to [`silent`](Self::silent)
    /// for a frequency the note mapper cannot place.
    pub fn detected(frequency: f64) -> Self {
        match notes::frequency_to_note(frequency) {
            Some(position) => Self {
                frequency,
                note: Some(position.class),
                octave: Some(position.octave),
                cents: position.cents.round() as i32,
                is_playing: true,
            },
            None => Self::silent(),
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn note(&self) -> Option<PitchClass> {
        self.note
    }

    pub fn octave(&self) -> Option<i32> {
        self.octave
    }

    pub fn cents(&self) -> i32 {
        self.cents
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }
}

impl Default for PitchReading {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Display for PitchReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.note, self.octave) {
            (Some(note), Some(octave)) if self.is_playing => write!(
                f,
                "{note}{octave} {:+} cents ({:.2} Hz)",
                self.cents, self.frequency
            ),
            _ => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_reading_carries_no_pitch() {
        let reading = PitchReading::silent();
        assert!(!reading.is_playing());
        assert_eq!(reading.frequency(), 0.0);
        assert_eq!(reading.note(), None);
        assert_eq!(reading.octave(), None);
        assert_eq!(reading.to_string(), "-");
        assert_eq!(reading, PitchReading::default());
    }

    #[test]
    fn detected_reading_maps_note() {
        let reading = PitchReading::detected(82.41);
        assert!(reading.is_playing());
        assert_eq!(reading.note(), Some(PitchClass::E));
        assert_eq!(reading.octave(), Some(2));
        assert_eq!(reading.cents(), 0);

        let sharp = PitchReading::detected(445.0);
        assert_eq!(sharp.note(), Some(PitchClass::A));
        assert_eq!(sharp.cents(), 20);
        assert_eq!(sharp.to_string(), "A4 +20 cents (445.00 Hz)");
    }

    #[test]
    fn unmappable_frequency_is_silent() {
        assert_eq!(PitchReading::detected(0.0), PitchReading::silent());
        assert_eq!(PitchReading::detected(f64::NAN), PitchReading::silent());
    }

    #[test]
    fn serializes_sentinels_as_null() {
        let json = serde_json::to_value(PitchReading::silent()).unwrap();
        assert_eq!(json["note"], serde_json::Value::Null);
        assert_eq!(json["is_playing"], false);

        let json = serde_json::to_value(PitchReading::detected(440.0)).unwrap();
        assert_eq!(json["note"], "A");
        assert_eq!(json["octave"], 4);
    }
}
