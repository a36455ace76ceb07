//! Beat grid extraction: tempo plus beat and downbeat timestamps.

use log::{info, warn};
use ndarray::arr1;
use ndarray_stats::{interpolate::Midpoint, Quantile1dExt};
use noisy_float::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::AnalysisResult;
use crate::loader::AudioBuffer;

/// Onset-detection window size, in samples, fed to the tempo tracker.
pub const WINDOW_SIZE: usize = 512;
/// Hop size between successive windows; half the window, as is conventional
/// for phase-deviation onset detection.
pub const HOP_SIZE: usize = WINDOW_SIZE / 2;

const MIN_TEMPO: f32 = 40.0;
const MAX_TEMPO: f32 = 208.0;

/// How often the primary path reports sub-stage progress, in windows.
const PROGRESS_WINDOW_INTERVAL: usize = 20;

/// Tempo and beat/downbeat timestamps for a song.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BeatGrid {
    /// Estimated tempo in BPM, clamped to `[40, 208]`.
    pub tempo: f32,
    /// Strictly increasing beat onset timestamps, in seconds.
    pub beats: Vec<f32>,
    /// Subset of `beats`: every 4th beat, starting at the first.
    pub downbeats: Vec<f32>,
    /// Assumed time signature; always `(4, 4)` - this crate does not detect
    /// meter.
    pub time_signature: (u8, u8),
    /// Set when the primary tracker failed or found fewer than 2 beats and
    /// the evenly-spaced fallback grid was used instead.
    pub fallback_used: bool,
}

/// Runs beat tracking over `buffer`, falling back to an evenly spaced grid
/// at `assumed_tempo` BPM if the primary path fails or under-detects.
///
/// `on_window` is called every [`PROGRESS_WINDOW_INTERVAL`] windows with the
/// count of windows processed so far.
pub fn track_beats(
    buffer: &AudioBuffer,
    assumed_tempo: f32,
    mut on_window: impl FnMut(usize),
) -> AnalysisResult<BeatGrid> {
    info!("detecting beats for {}", buffer.name);
    match track_beats_primary(buffer, &mut on_window) {
        Ok(grid) if grid.beats.len() >= 2 => Ok(grid),
        Ok(_) => {
            warn!("primary beat tracker found fewer than 2 beats, using fallback grid");
            Ok(fallback_grid(buffer.duration(), assumed_tempo))
        }
        Err(e) => {
            warn!("primary beat tracker failed ({e}), using fallback grid");
            Ok(fallback_grid(buffer.duration(), assumed_tempo))
        }
    }
}

fn track_beats_primary(
    buffer: &AudioBuffer,
    on_window: &mut impl FnMut(usize),
) -> AnalysisResult<BeatGrid> {
    let engine = Engine::get();
    let mut tracker = engine.new_tempo_tracker(WINDOW_SIZE, HOP_SIZE, buffer.sample_rate)?;

    let mut bpms = Vec::new();
    let mut beats = Vec::new();
    for (i, hop) in buffer.samples.chunks(HOP_SIZE).enumerate() {
        if hop.len() < HOP_SIZE {
            break;
        }
        if (i + 1) % PROGRESS_WINDOW_INTERVAL == 0 {
            on_window(i + 1);
        }
        if tracker.process_hop(hop)? {
            let timestamp = (i * HOP_SIZE) as f32 / buffer.sample_rate as f32;
            beats.push(timestamp);
            bpms.push(tracker.bpm());
        }
    }

    if bpms.is_empty() {
        return Ok(BeatGrid {
            tempo: 0.0,
            beats: Vec::new(),
            downbeats: Vec::new(),
            time_signature: (4, 4),
            fallback_used: false,
        });
    }

    let median: f32 = arr1(&bpms)
        .mapv(n32)
        .quantile_mut(n64(0.5), &Midpoint)
        .unwrap()
        .into();
    let tempo = median.clamp(MIN_TEMPO, MAX_TEMPO);
    if !tempo.is_finite() {
        return Ok(BeatGrid {
            tempo: 0.0,
            beats: Vec::new(),
            downbeats: Vec::new(),
            time_signature: (4, 4),
            fallback_used: false,
        });
    }

    let downbeats = beats.iter().step_by(4).copied().collect();
    Ok(BeatGrid {
        tempo,
        beats,
        downbeats,
        time_signature: (4, 4),
        fallback_used: false,
    })
}

fn fallback_grid(duration: f32, assumed_tempo: f32) -> BeatGrid {
    let interval = 60.0 / assumed_tempo;
    let mut beats = Vec::new();
    let mut t = 0.0;
    while t < duration {
        beats.push(t);
        t += interval;
    }
    let downbeats = beats.iter().step_by(4).copied().collect();
    BeatGrid {
        tempo: assumed_tempo,
        beats,
        downbeats,
        time_signature: (4, 4),
        fallback_used: true,
    }
}
