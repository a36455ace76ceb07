//! Chord template catalog and beat-synchronous chord recognition.
//!
//! Matching is by cosine similarity, the same metric the source library uses
//! for playlist distance (`distance::cosine_distance`), applied here between
//! a chroma vector and a unit-normalized chord template instead of between
//! two song feature vectors.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use crate::beat::BeatGrid;
use crate::chroma::ChromaFrame;
use crate::pitch::pitch_name;

/// Default confidence gate: a raw match below half of this becomes `N/C`.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Closed set of chord qualities this crate recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Dominant7,
    Major7,
    Minor7,
    Dim7,
    HalfDim7,
    Sus2,
    Sus4,
    Add9,
}

impl ChordQuality {
    /// Pitch-class offsets from the root that make up this quality.
    fn offsets(self) -> &'static [i32] {
        match self {
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

    /// Label suffix appended after the root name.
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Dim7 => "dim7",
            ChordQuality::HalfDim7 => "m7b5",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Add9 => "add9",
        }
    }

    /// 7th/add9 qualities, disabled when `detect_extended` is false.
    fn is_extended(self) -> bool {
        matches!(
            self,
            ChordQuality::Dominant7
                | ChordQuality::Major7
                | ChordQuality::Minor7
                | ChordQuality::Dim7
                | ChordQuality::HalfDim7
                | ChordQuality::Add9
        )
    }

    /// True for the "major-family" qualities that render their Roman numeral
    /// in uppercase (used by the Roman analyzer).
    pub fn is_major_family(self) -> bool {
        matches!(
            self,
            ChordQuality::Major
                | ChordQuality::Dominant7
                | ChordQuality::Major7
                | ChordQuality::Augmented
        )
    }
}

/// A unit-L2-normalized template for one root/quality combination.
#[derive(Debug, Clone)]
pub struct ChordTemplate {
    pub root: usize,
    pub quality: ChordQuality,
    pub vector: [f32; 12],
}

/// Builds the 12-root catalog for every quality, or only the triad/sus
/// qualities when `detect_extended` is false.
pub fn build_catalog(detect_extended: bool) -> Vec<ChordTemplate> {
    use strum::IntoEnumIterator;

    let mut catalog = Vec::new();
    for quality in ChordQuality::iter() {
        if quality.is_extended() && !detect_extended {
            continue;
        }
        for root in 0..12 {
            let mut vector = [0.0f32; 12];
            for offset in quality.offsets() {
                vector[(root as i32 + offset).rem_euclid(12) as usize] = 1.0;
            }
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }
            catalog.push(ChordTemplate {
                root,
                quality,
                vector,
            });
        }
    }
    catalog
}

fn cosine_similarity(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// A single chord label spanning `[start, end)`, with quality and confidence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectedChord {
    /// Display label, e.g. `"C"`, `"Am"`, `"G7"`, or `"N/C"`.
    pub chord: String,
    /// Root pitch-class name, empty for `N/C`.
    pub root: String,
    /// Quality, `None` for `N/C`.
    pub quality: Option<ChordQuality>,
    /// Root pitch-class index, meaningless for `N/C`.
    pub root_index: i32,
    pub start: f32,
    pub end: f32,
    pub confidence: f32,
    pub beat_count: u32,
}

struct RawMatch {
    timestamp: f32,
    energy: f32,
    root_index: i32,
    quality: Option<ChordQuality>,
    confidence: f32,
}

fn match_frame(frame: &ChromaFrame, catalog: &[ChordTemplate], confidence_threshold: f32) -> RawMatch {
    let gate = confidence_threshold / 2.0;
    let best = catalog
        .iter()
        .map(|t| (t, cosine_similarity(&frame.vector, &t.vector)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    match best {
        Some((template, similarity)) if similarity >= gate => RawMatch {
            timestamp: frame.timestamp,
            energy: frame.energy,
            root_index: template.root as i32,
            quality: Some(template.quality),
            confidence: similarity.clamp(0.0, 1.0),
        },
        _ => RawMatch {
            timestamp: frame.timestamp,
            energy: frame.energy,
            root_index: -1,
            quality: None,
            confidence: 0.0,
        },
    }
}

fn label_for(root_index: i32, quality: Option<ChordQuality>) -> (String, String) {
    match quality {
        None => ("N/C".to_owned(), String::new()),
        Some(q) => {
            let root = pitch_name(root_index).to_owned();
            (format!("{root}{}", q.suffix()), root)
        }
    }
}

/// Recognizes a chord label per beat, then merges and filters the sequence.
pub fn recognize_chords(
    frames: &[ChromaFrame],
    beat_grid: &BeatGrid,
    detect_extended: bool,
    confidence_threshold: f32,
) -> Vec<DetectedChord> {
    let catalog = build_catalog(detect_extended);
    let raw: Vec<RawMatch> = frames
        .iter()
        .map(|f| match_frame(f, &catalog, confidence_threshold))
        .collect();

    let intervals = beat_intervals(beat_grid);
    let per_beat: Vec<DetectedChord> = intervals
        .iter()
        .map(|&(start, end)| vote_for_interval(&raw, start, end))
        .collect();

    let merged = merge_runs(per_beat);
    let filtered = filter_outliers(merged, confidence_threshold);
    merge_runs(filtered)
}

fn beat_intervals(grid: &BeatGrid) -> Vec<(f32, f32)> {
    if grid.beats.len() < 2 {
        return Vec::new();
    }
    let mut intervals: Vec<(f32, f32)> = grid.beats.windows(2).map(|w| (w[0], w[1])).collect();
    let last = *grid.beats.last().unwrap();
    intervals.push((last, last + 60.0 / grid.tempo.max(1.0)));
    intervals
}

fn vote_for_interval(raw: &[RawMatch], start: f32, end: f32) -> DetectedChord {
    use std::collections::HashMap;

    let members: Vec<&RawMatch> = raw
        .iter()
        .filter(|m| m.timestamp >= start && m.timestamp < end)
        .collect();

    if members.is_empty() {
        let (chord, root) = label_for(-1, None);
        return DetectedChord {
            chord,
            root,
            quality: None,
            root_index: -1,
            start,
            end,
            confidence: 0.0,
            beat_count: 1,
        };
    }

    let mut scores: HashMap<(i32, Option<ChordQuality>), f32> = HashMap::new();
    let mut confidences: HashMap<(i32, Option<ChordQuality>), Vec<f32>> = HashMap::new();
    for m in &members {
        let key = (m.root_index, m.quality);
        *scores.entry(key).or_insert(0.0) += m.confidence * m.energy;
        confidences.entry(key).or_default().push(m.confidence);
    }

    let winner = scores
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(key, _)| *key)
        .unwrap();

    let confs = &confidences[&winner];
    let confidence = confs.iter().sum::<f32>() / confs.len() as f32;
    let (chord, root) = label_for(winner.0, winner.1);

    DetectedChord {
        chord,
        root,
        quality: winner.1,
        root_index: winner.0,
        start,
        end,
        confidence,
        beat_count: 1,
    }
}

fn merge_runs(chords: Vec<DetectedChord>) -> Vec<DetectedChord> {
    let mut merged: Vec<DetectedChord> = Vec::with_capacity(chords.len());
    for chord in chords {
        if let Some(last) = merged.last_mut() {
            if last.chord == chord.chord {
                let total = last.beat_count + chord.beat_count;
                last.confidence = (last.confidence * last.beat_count as f32
                    + chord.confidence * chord.beat_count as f32)
                    / total as f32;
                last.end = chord.end;
                last.beat_count = total;
                continue;
            }
        }
        merged.push(chord);
    }
    merged
}

fn filter_outliers(chords: Vec<DetectedChord>, confidence_threshold: f32) -> Vec<DetectedChord> {
    let keep: Vec<bool> = chords
        .iter()
        .enumerate()
        .map(|(i, chord)| {
            if chord.chord == "N/C" {
                return chord.beat_count >= 2;
            }
            if chord.beat_count >= 2 {
                return true;
            }
            if chord.confidence >= confidence_threshold {
                return true;
            }
            // beat_count == 1, low confidence: drop only if sandwiched
            // between two identical non-N/C neighbors.
            let prev = if i > 0 { chords.get(i - 1) } else { None };
            let next = chords.get(i + 1);
            let sandwiched = match (prev, next) {
                (Some(p), Some(n)) => p.chord == n.chord && p.chord != "N/C",
                _ => false,
            };
            !sandwiched
        })
        .collect();

    chords
        .into_iter()
        .zip(keep)
        .filter_map(|(chord, keep)| keep.then_some(chord))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_vector(root: usize, quality: ChordQuality) -> [f32; 12] {
        build_catalog(true)
            .into_iter()
            .find(|t| t.root == root && t.quality == quality)
            .unwrap()
            .vector
    }

    #[test]
    fn catalog_has_144_entries_when_extended_is_on() {
        assert_eq!(build_catalog(true).len(), 12 * 12);
    }

    #[test]
    fn catalog_drops_extended_qualities_when_disabled() {
        let catalog = build_catalog(false);
        assert_eq!(catalog.len(), 12 * 6);
        assert!(catalog.iter().all(|t| !t.quality.is_extended()));
    }

    #[test]
    fn cosine_match_is_scale_invariant() {
        let c_major = template_vector(0, ChordQuality::Major);
        let scaled: [f32; 12] = {
            let mut v = c_major;
            for x in &mut v {
                *x *= 5.0;
            }
            v
        };
        assert!((cosine_similarity(&c_major, &scaled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn recognizes_c_major_from_a_clean_triad() {
        let frame = ChromaFrame {
            timestamp: 0.0,
            vector: template_vector(0, ChordQuality::Major),
            energy: 1.0,
        };
        let grid = BeatGrid {
            tempo: 120.0,
            beats: vec![0.0, 0.5],
            downbeats: vec![0.0],
            time_signature: (4, 4),
            fallback_used: false,
        };
        let chords = recognize_chords(&[frame], &grid, true, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(chords[0].chord, "C");
    }

    #[test]
    fn empty_interval_becomes_no_chord() {
        let grid = BeatGrid {
            tempo: 120.0,
            beats: vec![0.0, 0.5, 1.0],
            downbeats: vec![0.0],
            time_signature: (4, 4),
            fallback_used: false,
        };
        let chords = recognize_chords(&[], &grid, true, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(chords.iter().all(|c| c.chord == "N/C"));
    }

    fn labeled_chord(chord: &str, confidence: f32, beat_count: u32) -> DetectedChord {
        DetectedChord {
            chord: chord.to_owned(),
            root: chord.to_owned(),
            quality: Some(ChordQuality::Major),
            root_index: 0,
            start: 0.0,
            end: 1.0,
            confidence,
            beat_count,
        }
    }

    #[test]
    fn low_confidence_chord_sandwiched_between_identical_neighbors_is_dropped() {
        let chords = vec![
            labeled_chord("C", 0.9, 2),
            labeled_chord("G", 0.1, 1),
            labeled_chord("C", 0.9, 2),
        ];
        let filtered = filter_outliers(chords, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(
            filtered.iter().map(|c| c.chord.as_str()).collect::<Vec<_>>(),
            vec!["C", "C"]
        );
    }

    #[test]
    fn low_confidence_transition_chord_between_different_neighbors_is_kept() {
        let chords = vec![
            labeled_chord("C", 0.9, 2),
            labeled_chord("G", 0.1, 1),
            labeled_chord("F", 0.9, 2),
        ];
        let filtered = filter_outliers(chords, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(
            filtered.iter().map(|c| c.chord.as_str()).collect::<Vec<_>>(),
            vec!["C", "G", "F"]
        );
    }
}
