//! Roman-numeral analysis of a detected chord sequence relative to a key.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::chord::{ChordQuality, DetectedChord};
use crate::key::{KeyAnalysis, Mode};

const MAJOR_DEGREES: [&str; 12] = [
    "I", "bII", "II", "bIII", "III", "IV", "#IV", "V", "bVI", "VI", "bVII", "VII",
];
const MINOR_DEGREES: [&str; 12] = [
    "i", "bII", "II", "bIII", "III", "iv", "#iv", "v", "VI", "vi", "VII", "vii",
];

/// A Roman-numeral label paired with the chord it was derived from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RomanLabel {
    pub chord_index: usize,
    pub label: String,
}

/// Labels every chord in `chords` as a scale-degree numeral relative to
/// `key`.
pub fn analyze_romans(chords: &[DetectedChord], key: &KeyAnalysis) -> Vec<RomanLabel> {
    chords
        .iter()
        .enumerate()
        .map(|(chord_index, chord)| RomanLabel {
            chord_index,
            label: roman_for(chord, key),
        })
        .collect()
}

fn roman_for(chord: &DetectedChord, key: &KeyAnalysis) -> String {
    let Some(quality) = chord.quality else {
        return "N/C".to_owned();
    };

    let interval = (chord.root_index - key.tonic_index).rem_euclid(12) as usize;
    let degrees = match key.mode {
        Mode::Major => &MAJOR_DEGREES,
        Mode::Minor => &MINOR_DEGREES,
    };
    let degree = degrees[interval];

    let cased = case_for_quality(degree, quality);
    format!("{cased}{}", quality_suffix(quality))
}

/// Forces case by chord quality: major-family qualities uppercase, minor /
/// diminished family lowercase, sus chords keep the tonic-diatonic case
/// already baked into the degree table.
fn case_for_quality(degree: &str, quality: ChordQuality) -> String {
    match quality {
        ChordQuality::Major | ChordQuality::Dominant7 | ChordQuality::Major7 | ChordQuality::Augmented => {
            degree.to_uppercase()
        }
        ChordQuality::Minor
        | ChordQuality::Minor7
        | ChordQuality::Diminished
        | ChordQuality::Dim7
        | ChordQuality::HalfDim7 => degree.to_lowercase(),
        ChordQuality::Sus2 | ChordQuality::Sus4 | ChordQuality::Add9 => degree.to_owned(),
    }
}

fn quality_suffix(quality: ChordQuality) -> &'static str {
    match quality {
        ChordQuality::Major | ChordQuality::Minor => "",
        ChordQuality::Diminished => "\u{b0}",
        ChordQuality::Augmented => "+",
        ChordQuality::Dominant7 => "7",
        ChordQuality::Major7 => "maj7",
        ChordQuality::Minor7 => "7",
        ChordQuality::Dim7 => "\u{b0}7",
        ChordQuality::HalfDim7 => "\u{f8}7",
        ChordQuality::Sus2 => "sus2",
        ChordQuality::Sus4 => "sus4",
        ChordQuality::Add9 => "add9",
    }
}
