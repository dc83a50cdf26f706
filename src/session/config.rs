use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Language code sent in the config frame (e.g., "en")
    pub language: String,

    /// Buy more time automatically when the server warns that time is low
    pub auto_extend: bool,

    /// Minutes purchased per automatic extension
    /// Default: 5
    pub extend_minutes: u32,

    /// How long to wait for the server's ready frame
    /// Default: 30 seconds
    pub handshake_timeout: Duration,

    /// How long to wait for further transcriptions after a file has been sent
    pub drain_timeout: Duration,

    /// Size of each paced audio chunk (20ms = 640 bytes at 16kHz mono)
    pub chunk_duration: Duration,

    /// Silence appended after a file so the last utterance is finalized
    pub trailing_silence: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            auto_extend: true,
            extend_minutes: 5,
            handshake_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(10),
            chunk_duration: Duration::from_millis(20),
            trailing_silence: Duration::from_secs(2),
        }
    }
}
