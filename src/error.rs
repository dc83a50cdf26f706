//! Error types for stt-stream.

use thiserror::Error;

const TARGET_FORMAT: &str = "16-bit signed PCM, 16000 Hz, mono";
const CONVERT_HINT: &str = "convert with: ffmpeg -i input -ac 1 -ar 16000 -sample_fmt s16 output.wav";

/// A WAV input that violates the fixed streaming format.
///
/// Every variant names the constraint that failed so the caller knows what to fix.
#[derive(Error, Debug)]
pub enum AudioFormatError {
    #[error("Cannot read audio file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio file {path} is too small ({size} bytes) to contain a WAV header")]
    TooSmall { path: String, size: usize },

    #[error("Audio file {path} is not a RIFF/WAVE file: {reason}")]
    NotWav { path: String, reason: String },

    #[error("Audio file {path} is not PCM encoded ({encoding}); expected {}, {}", TARGET_FORMAT, CONVERT_HINT)]
    NotPcm { path: String, encoding: String },

    #[error("Audio file {path} has sample rate {actual} Hz; expected {}, {}", TARGET_FORMAT, CONVERT_HINT)]
    SampleRate { path: String, actual: u32 },

    #[error("Audio file {path} has {actual} channels; expected {}, {}", TARGET_FORMAT, CONVERT_HINT)]
    Channels { path: String, actual: u16 },

    #[error("Audio file {path} has {actual}-bit samples; expected {}, {}", TARGET_FORMAT, CONVERT_HINT)]
    BitDepth { path: String, actual: u16 },
}

#[derive(Error, Debug)]
pub enum SttError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Payment rejected: {message}")]
    Payment { message: String },

    #[error("Session {session_id} expired")]
    SessionExpired { session_id: String },

    #[error(transparent)]
    AudioFormat(#[from] AudioFormatError),

    #[error("Server error: {message}")]
    Server { message: String },

    #[error("Stream is closed; no further audio can be sent")]
    StreamClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SttError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub(crate) fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub(crate) fn payment(message: impl Into<String>) -> Self {
        Self::Payment {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SttError>;
