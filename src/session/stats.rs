use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStats {
    /// When the stream became active
    pub started_at: DateTime<Utc>,

    /// Seconds since the stream became active
    pub duration_secs: f64,

    /// Number of binary audio frames sent
    pub audio_chunks_sent: usize,

    /// Total PCM bytes sent, including trailing silence
    pub audio_bytes_sent: usize,

    /// Number of transcriptions received
    pub transcriptions_received: usize,

    /// Server-reported seconds left in the session
    pub remaining_seconds: u64,
}
