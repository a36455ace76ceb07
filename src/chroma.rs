//! Beat-synchronous chromagram (HPCP) extraction and smoothing.
//!
//! The spectrum computation borrows the Hann-window-then-FFT shape of the
//! source library's `stft`, but segments are exact, non-overlapping slices
//! (one per beat, or one per fixed sliding window) rather than a dense
//! overlapping STFT grid, so there is no reflect-padding here.

use std::f32::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};

use crate::beat::BeatGrid;
use crate::loader::AudioBuffer;

/// FFT frame size used for HPCP extraction.
pub const FRAME_SIZE: usize = 4096;
const MIN_FREQ: f32 = 40.0;
const MAX_FREQ: f32 = 5000.0;
const BAND_SPLIT_FREQ: f32 = 500.0;
const REFERENCE_FREQ: f32 = 440.0;
/// Frames below this RMS are treated as silent and produce no output frame.
pub const SILENCE_RMS: f32 = 0.001;

const SLIDING_WINDOW_SECS: f32 = 0.5;
const SLIDING_HOP_SECS: f32 = 0.25;

/// How often extraction reports sub-stage progress, in segments processed.
const PROGRESS_FRAME_INTERVAL: usize = 10;

/// One 12-bin pitch-class energy vector, timestamped.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaFrame {
    /// Start timestamp of the segment this frame summarizes, in seconds.
    pub timestamp: f32,
    /// Pitch-class energy, index 0 = C .. 11 = B, summing to 1 (or all zero
    /// for a segment with no energy in the analyzed frequency range).
    pub vector: [f32; 12],
    /// RMS energy of the source segment.
    pub energy: f32,
}

/// Extracts one chroma frame per beat interval (if `beats` has more than one
/// entry) or per fixed sliding window otherwise.
///
/// `on_segment` is called every [`PROGRESS_FRAME_INTERVAL`] segments with the
/// count of segments processed so far.
pub fn extract_chroma(
    buffer: &AudioBuffer,
    beats: Option<&BeatGrid>,
    mut on_segment: impl FnMut(usize),
) -> Vec<ChromaFrame> {
    let segments = segment_bounds(buffer.duration(), beats);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);

    segments
        .into_iter()
        .enumerate()
        .filter_map(|(i, (start, end))| {
            if (i + 1) % PROGRESS_FRAME_INTERVAL == 0 {
                on_segment(i + 1);
            }
            let segment = buffer.extract_segment(start, end);
            if segment.is_empty() {
                return None;
            }
            let energy = rms(segment);
            if energy < SILENCE_RMS {
                return None;
            }
            let vector = compute_hpcp(segment, buffer.sample_rate, fft.as_ref());
            Some(ChromaFrame {
                timestamp: start,
                vector,
                energy,
            })
        })
        .collect()
}

fn segment_bounds(duration: f32, beats: Option<&BeatGrid>) -> Vec<(f32, f32)> {
    if let Some(grid) = beats {
        if grid.beats.len() > 1 {
            let mut bounds: Vec<(f32, f32)> = grid
                .beats
                .windows(2)
                .map(|w| (w[0], w[1]))
                .collect();
            let last = *grid.beats.last().unwrap();
            let final_end = last + 60.0 / grid.tempo.max(1.0);
            bounds.push((last, final_end.min(duration).max(last)));
            return bounds;
        }
    }

    let mut bounds = Vec::new();
    let mut start = 0.0;
    while start < duration {
        bounds.push((start, (start + SLIDING_WINDOW_SECS).min(duration)));
        start += SLIDING_HOP_SECS;
    }
    bounds
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn compute_hpcp(segment: &[f32], sample_rate: u32, fft: &dyn rustfft::Fft<f32>) -> [f32; 12] {
    let mut windowed = vec![Complex::new(0.0f32, 0.0); FRAME_SIZE];
    let n = segment.len().min(FRAME_SIZE);
    for i in 0..n {
        let hann = 0.5 - 0.5 * f32::cos(2.0 * PI * i as f32 / (FRAME_SIZE as f32 - 1.0));
        windowed[i] = Complex::new(segment[i] * hann, 0.0);
    }
    fft.process(&mut windowed);

    let mut hpcp = [0.0f32; 12];
    let bin_hz = sample_rate as f32 / FRAME_SIZE as f32;
    for (bin, value) in windowed.iter().take(FRAME_SIZE / 2 + 1).enumerate() {
        let freq = bin as f32 * bin_hz;
        if freq < MIN_FREQ || freq > MAX_FREQ || freq <= 0.0 {
            continue;
        }
        let magnitude = (value.re * value.re + value.im * value.im).sqrt();
        let weight = cosine_weight(freq);
        let pitch_class = nearest_pitch_class(freq);
        hpcp[pitch_class] += magnitude * weight;
    }

    let sum: f32 = hpcp.iter().sum();
    if sum > 0.0 {
        for bin in &mut hpcp {
            *bin /= sum;
        }
    }
    hpcp
}

/// 1.0 below the band-split frequency, raised-cosine taper down to 0 at
/// `MAX_FREQ` above it.
fn cosine_weight(freq: f32) -> f32 {
    if freq <= BAND_SPLIT_FREQ {
        1.0
    } else {
        let t = ((freq - BAND_SPLIT_FREQ) / (MAX_FREQ - BAND_SPLIT_FREQ)).clamp(0.0, 1.0);
        0.5 * (1.0 + f32::cos(PI * t))
    }
}

/// Maps a frequency to a pitch-class index with C at 0, via its distance in
/// semitones from A440 (pitch class 9).
fn nearest_pitch_class(freq: f32) -> usize {
    let semitones_from_a = (12.0 * (freq / REFERENCE_FREQ).log2()).round() as i32;
    (semitones_from_a + 9).rem_euclid(12) as usize
}

/// Energy-weighted moving average over a window of `window` frames
/// (intersected with the valid range at the sequence's edges). `window`
/// should be odd; `window == 1` is the identity transform.
pub fn smooth(frames: &[ChromaFrame], window: usize) -> Vec<ChromaFrame> {
    if window <= 1 || frames.is_empty() {
        return frames.to_vec();
    }
    let radius = window / 2;
    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(frames.len() - 1);
            let neighbors = &frames[lo..=hi];

            let total_energy: f32 = neighbors.iter().map(|f| f.energy).sum();
            let mut vector = [0.0f32; 12];
            if total_energy > 0.0 {
                for n in neighbors {
                    for k in 0..12 {
                        vector[k] += n.vector[k] * n.energy;
                    }
                }
                for v in &mut vector {
                    *v /= total_energy;
                }
            }
            let energy = neighbors.iter().map(|f| f.energy).sum::<f32>() / neighbors.len() as f32;
            ChromaFrame {
                timestamp: frame.timestamp,
                vector,
                energy,
            }
        })
        .collect()
}
