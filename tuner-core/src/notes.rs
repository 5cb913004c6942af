//! # Note Mapping Module
//!
//! Converts frequencies to equal-temperament notes (A4 = 440 Hz) and back.
//!
//! ## Features
//! - Nearest note, scientific-pitch octave and signed cent deviation
//! - Note name parsing with sharps or flats (`"C#3"`, `"Eb2"`)
//! - Cent deviation against an arbitrary target frequency
//!
//! Everything here is pure and total: invalid input yields `None` or an
//! error value, never a panic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NoteParseError;

/// Reference pitch: A4.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI number of A4, used as the semitone anchor.
const A4_MIDI: i32 = 69;

/// Displayed cents never leave this range; ±50 is the boundary between two
/// neighbouring notes.
pub const MAX_CENTS: f64 = 50.0;

/// The twelve chromatic pitch classes, starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C (0..12).
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Pitch class of any semitone count above C, wrapping in both directions.
    pub fn from_index(index: i32) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = NoteParseError;

    /// Accepts a natural letter followed by any number of `#` or `b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars.next().ok_or(NoteParseError::Empty)?;
        let natural = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(NoteParseError::UnknownPitchClass(s.to_string())),
        };
        let mut offset = 0;
        for accidental in chars {
            match accidental {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => return Err(NoteParseError::UnknownPitchClass(s.to_string())),
            }
        }
        Ok(Self::from_index(natural + offset))
    }
}

/// Where a frequency sits on the equal-tempered scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NotePosition {
    pub class: PitchClass,
    /// Scientific pitch notation: octaves begin at C, A4 = 440 Hz.
    pub octave: i32,
    /// Signed deviation from the nearest note, clamped to ±50.
    pub cents: f64,
}

impl NotePosition {
    /// MIDI note number of the nearest note.
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.class.index()
    }
}

impl fmt::Display for NotePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {:+.1} cents", self.class, self.octave, self.cents)
    }
}

/// Finds the nearest equal-temperament note to `frequency`.
///
/// The semitone distance from A4 is `12·log2(f / 440)`. Rounding it picks the
/// note; the remainder times 100 is the cent deviation. A remainder of
/// exactly one half is a tie between two notes and is broken toward the even
/// semitone index, so the cents land on +50 or -50 accordingly.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
///
/// # Returns
/// * `Some(position)` - For any positive, finite frequency
/// * `None` - For zero, negative, or non-finite input
pub fn frequency_to_note(frequency: f64) -> Option<NotePosition> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }

    let semitones = 12.0 * (frequency / A4_FREQUENCY).log2();
    let nearest = nearest_semitone(semitones);
    let cents = ((semitones - nearest as f64) * 100.0).clamp(-MAX_CENTS, MAX_CENTS);

    let midi = A4_MIDI + nearest;
    Some(NotePosition {
        class: PitchClass::from_index(midi),
        octave: midi.div_euclid(12) - 1,
        cents,
    })
}

fn nearest_semitone(semitones: f64) -> i32 {
    semitones.round_ties_even() as i32
}

/// Equal-temperament frequency of a note.
pub fn note_frequency(class: PitchClass, octave: i32) -> f64 {
    let midi = (octave + 1) * 12 + class.index();
    A4_FREQUENCY * 2.0_f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Parses a note name with octave, e.g. `"A4"`, `"C#3"`, `"Eb2"`, `"B-1"`.
pub fn parse_note(name: &str) -> Result<(PitchClass, i32), NoteParseError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(NoteParseError::Empty);
    }
    let split = name
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_ascii_digit() || *c == '-')
        .map(|(i, _)| i)
        .ok_or_else(|| NoteParseError::InvalidOctave(name.to_string()))?;

    let (class, octave) = name.split_at(split);
    let class = class.parse::<PitchClass>()?;
    let octave = octave
        .parse::<i32>()
        .map_err(|_| NoteParseError::InvalidOctave(name.to_string()))?;
    Ok((class, octave))
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat. Unlike
/// [`frequency_to_note`] the result is not clamped, which suits a fixed
/// target such as a selected string.
pub fn cents_between(frequency: f64, target: f64) -> f64 {
    1200.0 * (frequency / target).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_mapping() {
        let test_cases = [
            (440.0, PitchClass::A, 4),
            (493.88, PitchClass::B, 4),
            (523.25, PitchClass::C, 5),
            (392.0, PitchClass::G, 4),
            (220.0, PitchClass::A, 3),
            (880.0, PitchClass::A, 5),
            (82.41, PitchClass::E, 2),
            (30.87, PitchClass::B, 0),
            (261.63, PitchClass::C, 4),
            (16.35, PitchClass::C, 0),
        ];

        for (freq, class, octave) in test_cases {
            let note = frequency_to_note(freq).unwrap();
            assert_eq!((note.class, note.octave), (class, octave), "{freq} Hz");
            assert!(
                note.cents.abs() < 1.0,
                "Frequency {} Hz should be close to perfect pitch, got {} cents off",
                freq,
                note.cents
            );
        }
    }

    #[test]
    fn a440_is_exact() {
        let note = frequency_to_note(440.0).unwrap();
        assert_eq!(note.class, PitchClass::A);
        assert_eq!(note.octave, 4);
        assert_eq!(note.cents, 0.0);
        assert_eq!(note.midi(), 69);
    }

    #[test]
    fn cents_sign_follows_direction() {
        let sharp = frequency_to_note(445.0).unwrap();
        assert_eq!(sharp.class, PitchClass::A);
        assert!(sharp.cents > 0.0 && sharp.cents < 25.0);

        let flat = frequency_to_note(438.0).unwrap();
        assert_eq!(flat.class, PitchClass::A);
        assert!(flat.cents < 0.0 && flat.cents > -15.0);
    }

    #[test]
    fn octave_changes_at_c() {
        let b3 = frequency_to_note(246.94).unwrap();
        let c4 = frequency_to_note(261.63).unwrap();
        assert_eq!((b3.class, b3.octave), (PitchClass::B, 3));
        assert_eq!((c4.class, c4.octave), (PitchClass::C, 4));
    }

    #[test]
    fn cents_stay_within_fifty() {
        let mut freq = 20.0;
        while freq < 5000.0 {
            let note = frequency_to_note(freq).unwrap();
            assert!(note.cents.abs() <= MAX_CENTS, "{freq} Hz -> {note}");
            freq *= 1.0137;
        }
    }

    #[test]
    fn ties_round_to_even_semitone() {
        assert_eq!(nearest_semitone(0.5), 0);
        assert_eq!(nearest_semitone(1.5), 2);
        assert_eq!(nearest_semitone(-0.5), 0);
        assert_eq!(nearest_semitone(-1.5), -2);
        assert_eq!(nearest_semitone(0.51), 1);
    }

    #[test]
    fn rejects_non_positive_frequencies() {
        assert_eq!(frequency_to_note(0.0), None);
        assert_eq!(frequency_to_note(-440.0), None);
        assert_eq!(frequency_to_note(f64::NAN), None);
        assert_eq!(frequency_to_note(f64::INFINITY), None);
    }

    #[test]
    fn very_low_frequencies_get_negative_octaves() {
        let note = frequency_to_note(10.0).unwrap();
        assert_eq!(note.octave, -1);
    }

    #[test]
    fn note_frequency_round_trips() {
        assert!((note_frequency(PitchClass::A, 4) - 440.0).abs() < 1e-9);
        assert!((note_frequency(PitchClass::E, 2) - 82.4069).abs() < 1e-3);
        assert!((note_frequency(PitchClass::B, 0) - 30.8677).abs() < 1e-3);

        for class in PitchClass::ALL {
            for octave in 0..8 {
                let note = frequency_to_note(note_frequency(class, octave)).unwrap();
                assert_eq!((note.class, note.octave), (class, octave));
                assert!(note.cents.abs() < 1e-6);
            }
        }
    }

    #[test]
    fn parses_note_names() {
        assert_eq!(parse_note("A4"), Ok((PitchClass::A, 4)));
        assert_eq!(parse_note("C#3"), Ok((PitchClass::CSharp, 3)));
        assert_eq!(parse_note("Eb2"), Ok((PitchClass::DSharp, 2)));
        assert_eq!(parse_note("Cb4"), Ok((PitchClass::B, 4)));
        assert_eq!(parse_note("B-1"), Ok((PitchClass::B, -1)));
        assert_eq!(parse_note(""), Err(NoteParseError::Empty));
        assert!(matches!(parse_note("H2"), Err(NoteParseError::UnknownPitchClass(_))));
        assert!(matches!(parse_note("A"), Err(NoteParseError::InvalidOctave(_))));
    }

    #[test]
    fn cents_between_is_unclamped() {
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((cents_between(110.0, 82.41) - 500.0).abs() < 1.0);
    }
}
