//! Drives the full pipeline: load, beat-track, extract chroma, recognize
//! chords, detect key, analyze Roman numerals, and package the report.
//!
//! Execution is strictly single-threaded and synchronous: unlike the source
//! library's `Song::analyze_with_options`, which runs its descriptors
//! concurrently via `thread::scope`, this crate never spawns a thread for a
//! single analysis (see DESIGN.md, "Single-threaded pipeline").

use log::info;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::beat::{self, BeatGrid};
use crate::chord::{self, DetectedChord};
use crate::chroma;
use crate::error::AnalysisResult;
use crate::key::{self, KeyAnalysis};
use crate::loader::{self, AudioBuffer};
use crate::roman::{self, RomanLabel};

/// Caller-tunable knobs for one analysis run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisOptions {
    /// Minimum cosine similarity for a chord match to be kept; below half of
    /// this, a frame is labeled `N/C`.
    pub confidence_threshold: f32,
    /// Whether 7th/add9 chord qualities are considered.
    pub detect_extended: bool,
    /// Tempo assumed by the beat-tracker fallback grid, in BPM.
    pub assumed_tempo_on_fallback: f32,
    /// Chromagram smoothing window, in frames; must be odd and >= 1.
    pub smoothing_window: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            confidence_threshold: chord::DEFAULT_CONFIDENCE_THRESHOLD,
            detect_extended: true,
            assumed_tempo_on_fallback: 120.0,
            smoothing_window: 3,
        }
    }
}

/// Stage boundaries reported through the progress sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Loading,
    DetectingBeats,
    ExtractingChroma,
    RecognizingChords,
    Done,
}

/// One progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: u8,
    pub message: String,
}

/// The full result of one analysis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnalysisReport {
    pub source_id: String,
    pub duration_secs: f32,
    pub beat_grid: BeatGrid,
    pub chords: Vec<DetectedChord>,
    pub key: KeyAnalysis,
    pub roman_labels: Vec<RomanLabel>,
    pub overall_confidence: f32,
}

/// Runs the full pipeline over an already-decoded byte buffer.
///
/// `progress` receives stage-boundary and periodic sub-stage updates; pass
/// `|_| {}` if you don't need them.
pub fn analyze(
    id: &str,
    name: &str,
    bytes: Vec<u8>,
    extension: Option<&str>,
    mime: Option<&str>,
    options: &AnalysisOptions,
    mut progress: impl FnMut(ProgressEvent),
) -> AnalysisResult<AnalysisReport> {
    progress(ProgressEvent {
        stage: ProgressStage::Loading,
        percent: 0,
        message: "decoding audio".to_owned(),
    });
    let buffer: AudioBuffer = loader::decode_audio(id, name, bytes, extension, mime)?;
    info!("loaded {} ({:.1}s @ {}Hz)", buffer.name, buffer.duration(), buffer.sample_rate);

    progress(ProgressEvent {
        stage: ProgressStage::DetectingBeats,
        percent: 20,
        message: "tracking beats".to_owned(),
    });
    let grid = beat::track_beats(&buffer, options.assumed_tempo_on_fallback, |windows| {
        progress(ProgressEvent {
            stage: ProgressStage::DetectingBeats,
            percent: 20,
            message: format!("processed {windows} windows"),
        });
    })?;
    if grid.fallback_used {
        info!("beat tracker fell back to an assumed {} BPM grid", grid.tempo);
    }

    progress(ProgressEvent {
        stage: ProgressStage::ExtractingChroma,
        percent: 45,
        message: "extracting chromagram".to_owned(),
    });
    let raw_frames = chroma::extract_chroma(&buffer, Some(&grid), |frames| {
        progress(ProgressEvent {
            stage: ProgressStage::ExtractingChroma,
            percent: 45,
            message: format!("processed {frames} frames"),
        });
    });
    if raw_frames.is_empty() {
        return Err(crate::error::AnalysisError::CorruptFile(
            "chromagram extraction produced zero usable frames".to_owned(),
        ));
    }
    let frames = chroma::smooth(&raw_frames, options.smoothing_window);

    progress(ProgressEvent {
        stage: ProgressStage::RecognizingChords,
        percent: 70,
        message: "recognizing chords".to_owned(),
    });
    let chords = chord::recognize_chords(
        &frames,
        &grid,
        options.detect_extended,
        options.confidence_threshold,
    );

    let key = key::detect_key(&chords);
    let roman_labels = roman::analyze_romans(&chords, &key);

    let voiced: Vec<&DetectedChord> = chords.iter().filter(|c| c.chord != "N/C").collect();
    let overall_confidence = if voiced.is_empty() {
        0.0
    } else {
        let total_beats: f32 = voiced.iter().map(|c| c.beat_count as f32).sum();
        voiced
            .iter()
            .map(|c| c.confidence * c.beat_count as f32)
            .sum::<f32>()
            / total_beats
    };

    progress(ProgressEvent {
        stage: ProgressStage::Done,
        percent: 100,
        message: "done".to_owned(),
    });

    Ok(AnalysisReport {
        source_id: buffer.id.clone(),
        duration_secs: buffer.duration(),
        beat_grid: grid,
        chords,
        key,
        roman_labels,
        overall_confidence,
    })
}
