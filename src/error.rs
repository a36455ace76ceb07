//! Error taxonomy for the analysis pipeline.

use thiserror::Error;

/// Every fallible public entry point in this crate returns this error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("file is too large to analyze ({byte_size:?} bytes, {duration_secs:?}s)")]
    /// Raised when the input byte size or the decoded duration exceeds the
    /// configured limits.
    FileTooLarge {
        /// Input size in bytes, when known.
        byte_size: Option<u64>,
        /// Decoded duration in seconds, when known.
        duration_secs: Option<f32>,
    },
    #[error("unsupported file format: extension {extension:?}, mime type {mime:?}")]
    /// Raised when neither the extension nor the MIME type is recognized.
    UnsupportedFormat {
        /// File extension as provided by the caller, if any.
        extension: Option<String>,
        /// MIME type as provided by the caller, if any.
        mime: Option<String>,
    },
    #[error("audio is too short to analyze ({duration_secs}s, minimum is {min_secs}s)")]
    /// Raised when the decoded duration is below the minimum.
    AudioTooShort {
        /// Decoded duration in seconds.
        duration_secs: f32,
        /// Configured minimum duration in seconds.
        min_secs: f32,
    },
    #[error("audio is too quiet to analyze (RMS {rms}, minimum is {min_rms})")]
    /// Raised when the full-buffer RMS is below the silence threshold.
    AudioTooQuiet {
        /// Measured RMS loudness.
        rms: f32,
        /// Configured minimum RMS.
        min_rms: f32,
    },
    #[error("error happened while decoding file - {0}")]
    /// Raised when the decoder fails, or produces zero usable samples.
    CorruptFile(String),
    #[error("native analysis engine failed to load - {0}")]
    /// Raised when the rhythm-tracking engine singleton fails to initialize.
    EngineLoadFailed(String),
}

/// Convenience alias used throughout the crate.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
