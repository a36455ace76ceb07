//! Krumhansl-Schmuckler key-finding over a detected chord sequence.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::chord::{ChordQuality, DetectedChord};
use crate::pitch::pitch_name;

/// Major-key reference profile (Krumhansl & Kessler), indexed C=0..B=11.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
/// Minor-key reference profile, indexed C=0..B=11.
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Mode of a detected key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    Major,
    Minor,
}

/// A ranked key candidate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyCandidate {
    pub tonic: String,
    pub tonic_index: i32,
    pub mode: Mode,
    pub confidence: f32,
}

/// Overall key estimate for a song: the best candidate plus up to three
/// lower-ranked alternates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyAnalysis {
    pub tonic: String,
    pub tonic_index: i32,
    pub mode: Mode,
    pub confidence: f32,
    pub alternate_keys: Vec<KeyCandidate>,
}

/// Builds the duration-weighted pitch-class histogram, correlates it against
/// all 24 rotated reference profiles, and reports the best match plus
/// alternates with normalized score above 0.3.
pub fn detect_key(chords: &[DetectedChord]) -> KeyAnalysis {
    let real_chords: Vec<&DetectedChord> = chords.iter().filter(|c| c.chord != "N/C").collect();
    if real_chords.is_empty() {
        return KeyAnalysis {
            tonic: pitch_name(0).to_owned(),
            tonic_index: 0,
            mode: Mode::Major,
            confidence: 0.0,
            alternate_keys: Vec::new(),
        };
    }

    let histogram = build_histogram(&real_chords);

    let mut scored: Vec<(i32, Mode, f32)> = Vec::with_capacity(24);
    for tonic in 0..12 {
        let rotated = rotate(&histogram, tonic);
        scored.push((tonic, Mode::Major, pearson_correlation(&rotated, &MAJOR_PROFILE)));
        scored.push((tonic, Mode::Minor, pearson_correlation(&rotated, &MINOR_PROFILE)));
    }
    scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());

    let (min_score, max_score) = scored.iter().fold((f32::MAX, f32::MIN), |(lo, hi), s| {
        (lo.min(s.2), hi.max(s.2))
    });
    let normalize = |score: f32| -> f32 {
        if (max_score - min_score).abs() < f32::EPSILON {
            0.0
        } else {
            ((score - min_score) / (max_score - min_score)).clamp(0.0, 1.0)
        }
    };

    let (best_tonic, best_mode, best_score) = scored[0];
    let confidence = normalize(best_score);

    let alternate_keys = scored[1..]
        .iter()
        .take(3)
        .map(|&(tonic, mode, score)| (tonic, mode, normalize(score)))
        .filter(|&(_, _, conf)| conf > 0.3)
        .map(|(tonic, mode, confidence)| KeyCandidate {
            tonic: pitch_name(tonic).to_owned(),
            tonic_index: tonic,
            mode,
            confidence,
        })
        .collect();

    KeyAnalysis {
        tonic: pitch_name(best_tonic).to_owned(),
        tonic_index: best_tonic,
        mode: best_mode,
        confidence,
        alternate_keys,
    }
}

fn build_histogram(chords: &[&DetectedChord]) -> [f32; 12] {
    let mut histogram = [0.0f32; 12];
    for chord in chords {
        let duration = (chord.end - chord.start).max(0.0);
        match chord.quality {
            Some(quality) => {
                for offset in quality_offsets(quality) {
                    let pc = (chord.root_index + offset).rem_euclid(12) as usize;
                    histogram[pc] += duration;
                }
            }
            None => {
                if chord.root_index >= 0 {
                    histogram[chord.root_index as usize] += duration;
                }
            }
        }
    }
    histogram
}

fn quality_offsets(quality: ChordQuality) -> &'static [i32] {
    match quality {
        ChordQuality::Major => &[0, 4, 7],
        ChordQuality::Minor => &[0, 3, 7],
        ChordQuality::Diminished => &[0, 3, 6],
        ChordQuality::Augmented => &[0, 4, 8],
        ChordQuality::Dominant7 => &[0, 4, 7, 10],
        ChordQuality::Major7 => &[0, 4, 7, 11],
        ChordQuality::Minor7 => &[0, 3, 7, 10],
        ChordQuality::Dim7 => &[0, 3, 6, 9],
        ChordQuality::HalfDim7 => &[0, 3, 6, 10],
        ChordQuality::Sus2 => &[0, 2, 7],
        ChordQuality::Sus4 => &[0, 5, 7],
        ChordQuality::Add9 => &[0, 2, 4, 7],
    }
}

fn rotate(histogram: &[f32; 12], by: i32) -> [f32; 12] {
    let mut rotated = [0.0f32; 12];
    for i in 0..12 {
        rotated[i] = histogram[((i as i32 + by).rem_euclid(12)) as usize];
    }
    rotated
}

fn pearson_correlation(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let mean_a = a.iter().sum::<f32>() / 12.0;
    let mean_b = b.iter().sum::<f32>() / 12.0;

    let mut numerator = 0.0;
    let mut denom_a = 0.0;
    let mut denom_b = 0.0;
    for i in 0..12 {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        numerator += da * db;
        denom_a += da * da;
        denom_b += db * db;
    }

    if denom_a == 0.0 || denom_b == 0.0 {
        0.0
    } else {
        numerator / (denom_a.sqrt() * denom_b.sqrt())
    }
}
