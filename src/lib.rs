//! Beat-synchronous chord, key, and Roman-numeral analysis for decoded
//! songs: audio bytes in, a beat grid, chord sequence, key estimate and
//! harmonic analysis out.
//!
//! The entry point is [`orchestrator::analyze`], which drives every stage of
//! the pipeline synchronously and returns an [`orchestrator::AnalysisReport`].

pub mod beat;
pub mod chord;
pub mod chroma;
pub mod engine;
pub mod error;
pub mod key;
pub mod loader;
pub mod orchestrator;
pub mod pitch;
pub mod roman;

pub use chord::{ChordQuality, DetectedChord};
pub use chroma::ChromaFrame;
pub use beat::BeatGrid;
pub use error::{AnalysisError, AnalysisResult};
pub use key::{KeyAnalysis, KeyCandidate, Mode};
pub use loader::AudioBuffer;
pub use orchestrator::{analyze, AnalysisOptions, AnalysisReport, ProgressEvent, ProgressStage};
pub use roman::RomanLabel;
