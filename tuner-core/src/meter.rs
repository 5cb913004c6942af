//! # Cent Meter Module
//!
//! Display mapping for the tuning meter: where the needle sits, and whether
//! the note counts as flat, sharp or in tune.

use serde::Serialize;
use std::fmt;

use crate::PitchReading;

/// Maximum cent deviation range for the meter display.
/// The meter shows deviations from -50 to +50 cents.
pub const METER_RANGE: f64 = 50.0;

/// Deviations up to this many cents either way count as in tune.
pub const IN_TUNE_CENTS: f64 = 5.0;

/// Needle position as a percentage of the meter width: -50 cents is 0 %,
/// 0 is 50 %, +50 is 100 %. Values past either end stick to it.
pub fn cents_indicator(cents: f64) -> f64 {
    if cents.is_nan() {
        return 50.0;
    }
    let position = cents.clamp(-METER_RANGE, METER_RANGE);
    (position + METER_RANGE) / (2.0 * METER_RANGE) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TuningStatus {
    InTune,
    Flat,
    Sharp,
}

impl TuningStatus {
    /// `|cents| <= 5` is in tune; the ±5 boundary itself is in tune.
    pub fn classify(cents: f64) -> Self {
        if cents.abs() <= IN_TUNE_CENTS {
            TuningStatus::InTune
        } else if cents < 0.0 {
            TuningStatus::Flat
        } else {
            TuningStatus::Sharp
        }
    }

    /// Status of a live reading; `None` while nothing is playing.
    pub fn of_reading(reading: &PitchReading) -> Option<Self> {
        reading
            .is_playing()
            .then(|| Self::classify(reading.cents() as f64))
    }

    pub fn label(self) -> &'static str {
        match self {
            TuningStatus::InTune => "in-tune",
            TuningStatus::Flat => "flat",
            TuningStatus::Sharp => "sharp",
        }
    }
}

impl fmt::Display for TuningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
