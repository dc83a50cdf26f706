use crate::error::AudioFormatError;
use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use std::path::Path;
use tracing::info;

/// Sample rate the stream endpoint expects.
pub const SAMPLE_RATE: u32 = 16_000;
/// Channel count the stream endpoint expects.
pub const CHANNELS: u16 = 1;
/// Bits per sample the stream endpoint expects.
pub const BITS_PER_SAMPLE: u16 = 16;
/// Bytes per second of audio at the fixed format.
pub const BYTES_PER_SECOND: usize = SAMPLE_RATE as usize * (BITS_PER_SAMPLE as usize / 8);

// RIFF header (12) + minimal fmt chunk (24) + data chunk header (8)
const MIN_WAV_SIZE: usize = 44;

/// A validated 16 kHz mono 16-bit PCM WAV file.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Little-endian PCM bytes, ready to send.
    pub pcm: Vec<u8>,
}

impl AudioFile {
    /// Read and validate a WAV file.
    ///
    /// The fmt and data chunks are located by walking the RIFF chunk list, so
    /// headers carrying extra chunks (LIST, fact, ...) are accepted. Any
    /// deviation from the fixed format fails with the matching
    /// [`AudioFormatError`] and no audio is returned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioFormatError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        info!("Opening audio file: {}", name);

        let bytes = std::fs::read(path).map_err(|source| AudioFormatError::Unreadable {
            path: name.clone(),
            source,
        })?;

        Self::from_bytes(name, bytes)
    }

    /// Validate an in-memory WAV image. `path` is only used in messages.
    pub fn from_bytes(path: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AudioFormatError> {
        let path = path.into();

        if bytes.len() < MIN_WAV_SIZE {
            return Err(AudioFormatError::TooSmall {
                path,
                size: bytes.len(),
            });
        }

        let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| header_error(&path, e))?;

        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int {
            return Err(AudioFormatError::NotPcm {
                path,
                encoding: "IEEE float".to_string(),
            });
        }
        if spec.sample_rate != SAMPLE_RATE {
            return Err(AudioFormatError::SampleRate {
                path,
                actual: spec.sample_rate,
            });
        }
        if spec.channels != CHANNELS {
            return Err(AudioFormatError::Channels {
                path,
                actual: spec.channels,
            });
        }
        if spec.bits_per_sample != BITS_PER_SAMPLE {
            return Err(AudioFormatError::BitDepth {
                path,
                actual: spec.bits_per_sample,
            });
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AudioFormatError::NotWav {
                path: path.clone(),
                reason: format!("unreadable audio data: {e}"),
            })?;

        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} bytes",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            pcm.len()
        );

        Ok(Self {
            path,
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            pcm,
        })
    }
}

fn header_error(path: &str, error: hound::Error) -> AudioFormatError {
    match error {
        hound::Error::Unsupported => AudioFormatError::NotPcm {
            path: path.to_string(),
            encoding: "unsupported format tag".to_string(),
        },
        hound::Error::FormatError(reason) => AudioFormatError::NotWav {
            path: path.to_string(),
            reason: reason.to_string(),
        },
        hound::Error::IoError(e) => AudioFormatError::NotWav {
            path: path.to_string(),
            reason: format!("truncated header: {e}"),
        },
        other => AudioFormatError::NotWav {
            path: path.to_string(),
            reason: other.to_string(),
        },
    }
}
