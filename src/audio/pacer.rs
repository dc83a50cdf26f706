use super::file::BYTES_PER_SECOND;
use crate::error::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Destination for outbound PCM bytes.
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Forward raw PCM bytes as-is.
    async fn send_audio(&self, pcm: Vec<u8>) -> Result<()>;
}

/// Summary of one paced transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingReport {
    pub chunks_sent: usize,
    pub audio_bytes: usize,
    pub silence_bytes: usize,
    pub elapsed: Duration,
}

/// Sends PCM at live-microphone cadence.
///
/// Audio goes out in `chunk_duration` slices with a sleep of the same length
/// after each one, then a single frame of `trailing_silence` worth of zeros so
/// server-side voice activity detection finalizes the last utterance.
#[derive(Debug, Clone)]
pub struct AudioPacer {
    chunk_duration: Duration,
    trailing_silence: Duration,
}

impl Default for AudioPacer {
    fn default() -> Self {
        Self::new(Duration::from_millis(20), Duration::from_secs(2))
    }
}

impl AudioPacer {
    pub fn new(chunk_duration: Duration, trailing_silence: Duration) -> Self {
        Self {
            chunk_duration,
            trailing_silence,
        }
    }

    /// Bytes per chunk, aligned to whole 16-bit samples. 640 for 20 ms.
    pub fn chunk_bytes(&self) -> usize {
        let bytes = duration_to_bytes(self.chunk_duration);
        (bytes & !1).max(2)
    }

    /// Size of the trailing silence frame. 64000 for 2 s.
    pub fn silence_bytes(&self) -> usize {
        duration_to_bytes(self.trailing_silence) & !1
    }

    pub async fn stream<S>(&self, sink: &S, pcm: &[u8]) -> Result<PacingReport>
    where
        S: AudioSink + ?Sized,
    {
        let started = Instant::now();
        let chunk_bytes = self.chunk_bytes();
        let mut chunks_sent = 0;

        info!(
            "Streaming {} bytes in {}-byte chunks every {:?}",
            pcm.len(),
            chunk_bytes,
            self.chunk_duration
        );

        for chunk in pcm.chunks(chunk_bytes) {
            sink.send_audio(chunk.to_vec()).await?;
            chunks_sent += 1;
            tokio::time::sleep(self.chunk_duration).await;
        }

        let silence_bytes = self.silence_bytes();
        if silence_bytes > 0 {
            debug!("Sending {} bytes of trailing silence", silence_bytes);
            sink.send_audio(vec![0u8; silence_bytes]).await?;
        }

        let report = PacingReport {
            chunks_sent,
            audio_bytes: pcm.len(),
            silence_bytes,
            elapsed: started.elapsed(),
        };

        info!(
            "Audio sent: {} chunks, {} bytes in {:.2}s",
            report.chunks_sent,
            report.audio_bytes,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }
}

fn duration_to_bytes(duration: Duration) -> usize {
    (BYTES_PER_SECOND as u128 * duration.as_micros() / 1_000_000) as usize
}
