//! # Tuning Catalog Module
//!
//! Reference tunings for guitar and bass: every string's note, octave and
//! target frequency, per preset. The tables are process-wide constants; a
//! name index is built once on first lookup.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::notes::{self, PitchClass};

/// Instrument families with their own preset lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Instrument {
    Guitar,
    Bass4,
    Bass5,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::Guitar, Instrument::Bass4, Instrument::Bass5];
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Instrument::Guitar => "Guitar",
            Instrument::Bass4 => "Bass 4-String",
            Instrument::Bass5 => "Bass 5-String",
        })
    }
}

/// One string of a tuning preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StringNote {
    /// Note name as printed on the preset, flats included (`"Eb"`).
    pub note: &'static str,
    pub octave: i32,
    /// Reference frequency in Hz.
    pub frequency: f64,
    /// String number, 1 being the highest-pitched string.
    pub string: u8,
}

impl StringNote {
    pub fn pitch_class(&self) -> Option<PitchClass> {
        self.note.parse().ok()
    }
}

impl fmt::Display for StringNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note, self.octave)
    }
}

/// A named tuning for one instrument, lowest string first.
#[derive(Debug, Serialize)]
pub struct TuningPreset {
    pub name: &'static str,
    pub instrument: Instrument,
    pub strings: &'static [StringNote],
}

impl TuningPreset {
    /// The string closest to `frequency` (in cents) and the signed deviation
    /// from it. `None` for a non-positive frequency.
    pub fn nearest_string(&self, frequency: f64) -> Option<(&'static StringNote, f64)> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return None;
        }
        self.strings
            .iter()
            .map(|string| (string, notes::cents_between(frequency, string.frequency)))
            .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    }
}

const fn string(note: &'static str, octave: i32, frequency: f64, string: u8) -> StringNote {
    StringNote {
        note,
        octave,
        frequency,
        string,
    }
}

pub static GUITAR_TUNINGS: [TuningPreset; 6] = [
    TuningPreset {
        name: "Standard (E A D G B E)",
        instrument: Instrument::Guitar,
        strings: &[
            string("E", 2, 82.41, 6),
            string("A", 2, 110.0, 5),
            string("D", 3, 146.83, 4),
            string("G", 3, 196.0, 3),
            string("B", 3, 246.94, 2),
            string("E", 4, 329.63, 1),
        ],
    },
    TuningPreset {
        name: "Drop D (D A D G B E)",
        instrument: Instrument::Guitar,
        strings: &[
            string("D", 2, 73.42, 6),
            string("A", 2, 110.0, 5),
            string("D", 3, 146.83, 4),
            string("G", 3, 196.0, 3),
            string("B", 3, 246.94, 2),
            string("E", 4, 329.63, 1),
        ],
    },
    TuningPreset {
        name: "Half Step Down (Eb Ab Db Gb Bb Eb)",
        instrument: Instrument::Guitar,
        strings: &[
            string("Eb", 2, 77.78, 6),
            string("Ab", 2, 103.83, 5),
            string("Db", 3, 138.59, 4),
            string("Gb", 3, 185.0, 3),
            string("Bb", 3, 233.08, 2),
            string("Eb", 4, 311.13, 1),
        ],
    },
    TuningPreset {
        name: "Whole Step Down (D G C F A D)",
        instrument: Instrument::Guitar,
        strings: &[
            string("D", 2, 73.42, 6),
            string("G", 2, 98.0, 5),
            string("C", 3, 130.81, 4),
            string("F", 3, 174.61, 3),
            string("A", 3, 220.0, 2),
            string("D", 4, 293.66, 1),
        ],
    },
    TuningPreset {
        name: "DADGAD",
        instrument: Instrument::Guitar,
        strings: &[
            string("D", 2, 73.42, 6),
            string("A", 2, 110.0, 5),
            string("D", 3, 146.83, 4),
            string("G", 3, 196.0, 3),
            string("A", 3, 220.0, 2),
            string("D", 4, 293.66, 1),
        ],
    },
    TuningPreset {
        name: "Open G (D G D G B D)",
        instrument: Instrument::Guitar,
        strings: &[
            string("D", 2, 73.42, 6),
            string("G", 2, 98.0, 5),
            string("D", 3, 146.83, 4),
            string("G", 3, 196.0, 3),
            string("B", 3, 246.94, 2),
            string("D", 4, 293.66, 1),
        ],
    },
];

pub static BASS4_TUNINGS: [TuningPreset; 3] = [
    TuningPreset {
        name: "Standard (E A D G)",
        instrument: Instrument::Bass4,
        strings: &[
            string("E", 1, 41.2, 4),
            string("A", 1, 55.0, 3),
            string("D", 2, 73.42, 2),
            string("G", 2, 98.0, 1),
        ],
    },
    TuningPreset {
        name: "Drop D (D A D G)",
        instrument: Instrument::Bass4,
        strings: &[
            string("D", 1, 36.71, 4),
            string("A", 1, 55.0, 3),
            string("D", 2, 73.42, 2),
            string("G", 2, 98.0, 1),
        ],
    },
    TuningPreset {
        name: "Half Step Down (Eb Ab Db Gb)",
        instrument: Instrument::Bass4,
        strings: &[
            string("Eb", 1, 38.89, 4),
            string("Ab", 1, 51.91, 3),
            string("Db", 2, 69.30, 2),
            string("Gb", 2, 92.50, 1),
        ],
    },
];

pub static BASS5_TUNINGS: [TuningPreset; 2] = [
    TuningPreset {
        name: "Standard (B E A D G)",
        instrument: Instrument::Bass5,
        strings: &[
            string("B", 0, 30.87, 5),
            string("E", 1, 41.2, 4),
            string("A", 1, 55.0, 3),
            string("D", 2, 73.42, 2),
            string("G", 2, 98.0, 1),
        ],
    },
    TuningPreset {
        name: "Half Step Down (Bb Eb Ab Db Gb)",
        instrument: Instrument::Bass5,
        strings: &[
            string("Bb", 0, 29.14, 5),
            string("Eb", 1, 38.89, 4),
            string("Ab", 1, 51.91, 3),
            string("Db", 2, 69.30, 2),
            string("Gb", 2, 92.50, 1),
        ],
    },
];

/// Case-insensitive preset name → preset.
static PRESET_INDEX: Lazy<BTreeMap<String, &'static TuningPreset>> = Lazy::new(|| {
    all_presets()
        .map(|preset| (preset.name.to_lowercase(), preset))
        .collect()
});

pub fn presets(instrument: Instrument) -> &'static [TuningPreset] {
    match instrument {
        Instrument::Guitar => &GUITAR_TUNINGS,
        Instrument::Bass4 => &BASS4_TUNINGS,
        Instrument::Bass5 => &BASS5_TUNINGS,
    }
}

pub fn all_presets() -> impl Iterator<Item = &'static TuningPreset> {
    Instrument::ALL
        .into_iter()
        .flat_map(|instrument| presets(instrument).iter())
}

/// Looks a preset up by its full name, ignoring case.
pub fn find_preset(name: &str) -> Option<&'static TuningPreset> {
    PRESET_INDEX.get(&name.trim().to_lowercase()).copied()
}
