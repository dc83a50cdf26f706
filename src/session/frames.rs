use serde::{Deserialize, Serialize};
use tracing::debug;

/// One unit of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Recognized text (may be empty)
    #[serde(default)]
    pub text: String,

    /// Start offset in seconds from stream start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,

    /// End offset in seconds from stream start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,

    /// Confidence score (0.0 to 1.0), if available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// False for a provisional (partial) result
    #[serde(default = "default_final")]
    pub is_final: bool,
}

fn default_final() -> bool {
    true
}

/// Text frames the server sends on the stream connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Ready {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        remaining_seconds: Option<u64>,
    },
    Transcription(Transcription),
    SessionExpiring {
        #[serde(default)]
        remaining_seconds: Option<u64>,
    },
    SessionExtended {
        #[serde(default)]
        remaining_seconds: Option<u64>,
    },
    SessionExpired {
        #[serde(default)]
        session_id: Option<String>,
    },
    Error {
        #[serde(default, alias = "error")]
        message: Option<String>,
    },
    /// Any frame type this client does not know about
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Parse a text frame. Anything unparseable maps to [`InboundFrame::Unknown`].
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Ignoring unparseable frame ({}): {}", e, text);
                Self::Unknown
            }
        }
    }

    /// Frame kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Transcription(_) => "transcription",
            Self::SessionExpiring { .. } => "session_expiring",
            Self::SessionExtended { .. } => "session_extended",
            Self::SessionExpired { .. } => "session_expired",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// First frame the client sends after connecting
#[derive(Debug, Serialize)]
pub struct ConfigFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub language: &'a str,
    pub session_key: &'a str,
}

impl<'a> ConfigFrame<'a> {
    pub fn new(language: &'a str, session_key: &'a str) -> Self {
        Self {
            kind: "config",
            language,
            session_key,
        }
    }
}
