//! Decodes an in-memory audio file into a mono [`AudioBuffer`].
//!
//! A "substantial portion" of the decode path here comes from the
//! `SymphoniaDecoder` in the library this crate descends from, itself
//! upstreamed from `mecomp-analysis`, adapted to read from an in-memory byte
//! buffer instead of a filesystem path.

use std::io::Cursor;

use log::warn;
use symphonia::core::{
    audio::{AudioBufferRef, Layout, SampleBuffer, SignalSpec},
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};

use crate::error::{AnalysisError, AnalysisResult};

/// Maximum accepted input size, in megabytes.
pub const MAX_FILE_MB: u64 = 20;
/// Minimum accepted decoded duration, in seconds.
pub const MIN_DUR_SECS: f32 = 10.0;
/// Maximum accepted decoded duration, in seconds.
pub const MAX_DUR_SECS: f32 = 600.0;
/// Full-buffer RMS below this is considered silence.
pub const MIN_RMS: f32 = 0.001;

const MAX_DECODE_RETRIES: usize = 3;

const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a"];
const SUPPORTED_MIME_TYPES: &[&str] = &["audio/mpeg", "audio/wav", "audio/mp4"];

/// A decoded, validated, single-channel audio signal.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Opaque identifier for the source file, caller-provided.
    pub id: String,
    /// Display name of the source file, caller-provided.
    pub name: String,
    /// Sample rate in Hz, as decoded (no resampling is applied by the loader).
    pub sample_rate: u32,
    /// Mono PCM samples in `[-1, 1]`.
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    /// Duration in seconds, derived from sample count and sample rate.
    #[inline]
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Returns the sample slice covering `[start, end)` seconds, clamped to
    /// the buffer's bounds.
    pub fn extract_segment(&self, start: f32, end: f32) -> &[f32] {
        let len = self.samples.len();
        let start_idx = ((start.max(0.0)) * self.sample_rate as f32) as usize;
        let end_idx = ((end.max(0.0)) * self.sample_rate as f32) as usize;
        let start_idx = start_idx.min(len);
        let end_idx = end_idx.min(len).max(start_idx);
        &self.samples[start_idx..end_idx]
    }
}

/// Linearly interpolates `samples` from `from_rate` to `to_rate`. Returns the
/// input unchanged if `to_rate >= from_rate` (this crate never upsamples).
pub fn downsample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if to_rate >= from_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Validates size/format and decodes `bytes` into a mono [`AudioBuffer`].
///
/// `extension` and `mime` are the caller-reported file metadata; at least one
/// of them must match a supported audio format.
pub fn decode_audio(
    id: &str,
    name: &str,
    bytes: Vec<u8>,
    extension: Option<&str>,
    mime: Option<&str>,
) -> AnalysisResult<AudioBuffer> {
    let byte_size = bytes.len() as u64;
    if byte_size > MAX_FILE_MB * 1_000_000 {
        return Err(AnalysisError::FileTooLarge {
            byte_size: Some(byte_size),
            duration_secs: None,
        });
    }

    let ext_ok = extension
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.trim_start_matches('.').to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let mime_ok = mime
        .map(|m| SUPPORTED_MIME_TYPES.contains(&m.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !ext_ok && !mime_ok {
        return Err(AnalysisError::UnsupportedFormat {
            extension: extension.map(str::to_owned),
            mime: mime.map(str::to_owned),
        });
    }

    let source = SymphoniaSource::new(bytes).map_err(|e| AnalysisError::CorruptFile(e.to_string()))?;
    let sample_rate = source.spec.rate;
    let mono_samples = source
        .into_mono_samples()
        .map_err(|e| AnalysisError::CorruptFile(e.to_string()))?;

    if mono_samples.is_empty() {
        return Err(AnalysisError::CorruptFile(
            "decoder produced zero samples".to_owned(),
        ));
    }

    let duration = mono_samples.len() as f32 / sample_rate as f32;
    if duration > MAX_DUR_SECS {
        return Err(AnalysisError::FileTooLarge {
            byte_size: Some(byte_size),
            duration_secs: Some(duration),
        });
    }
    if duration < MIN_DUR_SECS {
        return Err(AnalysisError::AudioTooShort {
            duration_secs: duration,
            min_secs: MIN_DUR_SECS,
        });
    }

    let rms = (mono_samples.iter().map(|s| s * s).sum::<f32>() / mono_samples.len() as f32).sqrt();
    if rms < MIN_RMS {
        return Err(AnalysisError::AudioTooQuiet {
            rms,
            min_rms: MIN_RMS,
        });
    }

    Ok(AudioBuffer {
        id: id.to_owned(),
        name: name.to_owned(),
        sample_rate,
        samples: mono_samples,
    })
}

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("no supported audio tracks")]
    NoSupportedAudioTracks,
    #[error("no streams")]
    NoStreams,
}

impl From<SymphoniaError> for DecodeError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::IoError(e) => DecodeError::Io(e.to_string()),
            other => DecodeError::Decode(other.to_string()),
        }
    }
}

struct SymphoniaSource {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    current_span_offset: usize,
    format: Box<dyn FormatReader>,
    buffer: SampleBuffer<f32>,
    spec: SignalSpec,
}

impl SymphoniaSource {
    fn new(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        let cursor: Box<dyn MediaSource> = Box::new(InMemorySource(Cursor::new(bytes)));
        let mss = MediaSourceStream::new(cursor, Default::default());

        let hint = Hint::new();
        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();
        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)?;

        if probed.format.default_track().is_none() {
            return Err(DecodeError::NoStreams);
        }

        let track = probed
            .format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoSupportedAudioTracks)?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let mut decode_errors: usize = 0;
        let decoded = loop {
            let packet = match probed.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(_)) => break decoder.last_decoded(),
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(decoded) => break decoded,
                Err(SymphoniaError::DecodeError(_)) => {
                    decode_errors += 1;
                    if decode_errors > MAX_DECODE_RETRIES {
                        return Err(DecodeError::Decode(
                            "too many consecutive decode errors".to_owned(),
                        ));
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let spec = decoded.spec().to_owned();
        let buffer = Self::get_buffer(decoded, &spec);
        Ok(Self {
            decoder,
            current_span_offset: 0,
            format: probed.format,
            buffer,
            spec,
        })
    }

    fn get_buffer(decoded: AudioBufferRef, spec: &SignalSpec) -> SampleBuffer<f32> {
        let duration = decoded.capacity() as u64;
        let mut buffer = SampleBuffer::<f32>::new(duration, *spec);
        buffer.copy_interleaved_ref(decoded);
        buffer
    }

    /// Folds interleaved multichannel audio down to mono by a simple
    /// arithmetic average across channels per frame, not ffmpeg's
    /// `sqrt(2)`-weighted stereo fold - the loader's mono policy is a plain
    /// average regardless of channel count.
    fn into_mono_samples(self) -> Result<Vec<f32>, DecodeError> {
        let num_channels = self.spec.channels.count();
        match num_channels {
            1 => Ok(self.collect()),
            2 => {
                if self.spec.channels != Layout::Stereo.into_channels() {
                    warn!("non-standard stereo channel layout, folding by plain average anyway");
                }
                let mut mono = Vec::new();
                let mut iter = self.peekable();
                while let Some(left) = iter.next() {
                    let right = iter.next().unwrap_or_default();
                    mono.push((left + right) / 2.0);
                }
                Ok(mono)
            }
            _ => {
                warn!(
                    "audio source has {} channels, folding to mono by averaging",
                    num_channels
                );
                let mut mono = Vec::new();
                let mut iter = self.peekable();
                while iter.peek().is_some() {
                    let sum: f32 = iter.by_ref().take(num_channels).sum();
                    mono.push(sum / num_channels as f32);
                }
                Ok(mono)
            }
        }
    }
}

impl Iterator for SymphoniaSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_span_offset >= self.buffer.len() {
            let mut decode_errors = 0;
            let decoded = loop {
                let packet = self.format.next_packet().ok()?;
                let decoded = match self.decoder.decode(&packet) {
                    Ok(decoded) => decoded,
                    Err(_) => {
                        decode_errors += 1;
                        if decode_errors > MAX_DECODE_RETRIES {
                            return None;
                        }
                        continue;
                    }
                };
                if decoded.frames() > 0 {
                    break decoded;
                }
            };

            decoded.spec().clone_into(&mut self.spec);
            self.buffer = Self::get_buffer(decoded, &self.spec);
            self.current_span_offset = 0;
        }

        let sample = *self.buffer.samples().get(self.current_span_offset)?;
        self.current_span_offset += 1;
        Some(sample)
    }
}

/// Wraps a `Cursor<Vec<u8>>` so it satisfies symphonia's `MediaSource`,
/// since the boundary input here is a byte buffer, never a filesystem path.
struct InMemorySource(Cursor<Vec<u8>>);

impl std::io::Read for InMemorySource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        std::io::Read::read(&mut self.0, buf)
    }
}

impl std::io::Seek for InMemorySource {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        std::io::Seek::seek(&mut self.0, pos)
    }
}

impl MediaSource for InMemorySource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.0.get_ref().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wav_bytes(freq: f32, duration_secs: f32, sample_rate: u32, amplitude: f32) -> Vec<u8> {
        let n = (duration_secs * sample_rate as f32) as usize;
        let mut data = Vec::with_capacity(n * 2);
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let sample = (amplitude * (2.0 * std::f32::consts::PI * freq * t).sin() * i16::MAX as f32) as i16;
            data.extend_from_slice(&sample.to_le_bytes());
        }
        let byte_rate = sample_rate * 2;
        let mut wav = Vec::with_capacity(44 + data.len());
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&((36 + data.len()) as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes()); // block align
        wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
        wav.extend_from_slice(&data);
        wav
    }

    #[test]
    fn decodes_a_synthesized_wav() {
        let bytes = sine_wav_bytes(440.0, 12.0, 44100, 0.5);
        let buffer = decode_audio("id", "sine.wav", bytes, Some("wav"), None).unwrap();
        assert_eq!(buffer.sample_rate, 44100);
        assert!((buffer.duration() - 12.0).abs() < 0.01);
    }

    #[test]
    fn rejects_silence_as_too_quiet() {
        let bytes = sine_wav_bytes(440.0, 12.0, 44100, 0.0);
        let err = decode_audio("id", "silence.wav", bytes, Some("wav"), None).unwrap_err();
        assert!(matches!(err, AnalysisError::AudioTooQuiet { .. }));
    }

    #[test]
    fn rejects_short_audio() {
        let bytes = sine_wav_bytes(440.0, 5.0, 44100, 0.5);
        let err = decode_audio("id", "short.wav", bytes, Some("wav"), None).unwrap_err();
        assert!(matches!(err, AnalysisError::AudioTooShort { .. }));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = decode_audio("id", "x.xyz", vec![0; 10], Some("xyz"), None).unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedFormat { .. }));
    }

    #[test]
    fn rejects_oversized_input() {
        let bytes = vec![0u8; (MAX_FILE_MB * 1_000_000 + 1) as usize];
        let err = decode_audio("id", "big.wav", bytes, Some("wav"), None).unwrap_err();
        assert!(matches!(err, AnalysisError::FileTooLarge { .. }));
    }

    #[test]
    fn downsample_returns_input_unchanged_when_upsampling() {
        let samples = vec![0.0, 1.0, 0.0, -1.0];
        let out = downsample(&samples, 22050, 44100);
        assert_eq!(out, samples);
    }

    #[test]
    fn downsample_halves_length_at_half_rate() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32).sin()).collect();
        let out = downsample(&samples, 44100, 22050);
        assert!((out.len() as i64 - 500).abs() <= 1);
    }

    #[test]
    fn extract_segment_clamps_to_bounds() {
        let buffer = AudioBuffer {
            id: "id".into(),
            name: "name".into(),
            sample_rate: 10,
            samples: vec![0.0; 100],
        };
        assert_eq!(buffer.extract_segment(-5.0, 1.0).len(), 10);
        assert_eq!(buffer.extract_segment(5.0, 50.0).len(), 50);
        assert_eq!(buffer.extract_segment(15.0, 20.0).len(), 0);
    }
}
