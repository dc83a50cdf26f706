use super::frames::Transcription;
use futures::stream::{self, Stream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Result of [`TranscriptionChannel::pull_timeout`]
#[derive(Debug, Clone, PartialEq)]
pub enum Pulled {
    Item(Transcription),
    /// The stream has ended; nothing more will arrive
    Closed,
    /// Nothing arrived within the wait
    TimedOut,
}

enum Delivery {
    Item(Transcription),
    End,
}

/// Unbounded single-consumer queue of transcriptions with an end marker.
///
/// The connection's dispatcher pushes; one consumer at a time pulls. Concurrent
/// pulls are serialized on the receiver lock, so no item is ever lost to a race.
/// Once the end marker has been pulled every later pull returns immediately.
pub struct TranscriptionChannel {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    end_sent: AtomicBool,
    end_seen: AtomicBool,
}

impl Default for TranscriptionChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            end_sent: AtomicBool::new(false),
            end_seen: AtomicBool::new(false),
        }
    }

    /// Queue a transcription. Ignored once the channel has been finished.
    pub fn push(&self, transcription: Transcription) {
        if self.end_sent.load(Ordering::SeqCst) {
            debug!("Dropping transcription pushed after end of stream");
            return;
        }
        // The receiver lives as long as self
        let _ = self.tx.send(Delivery::Item(transcription));
    }

    /// Queue the end marker. Only the first call has any effect.
    ///
    /// Returns true if this call ended the stream.
    pub fn finish(&self) -> bool {
        if self.end_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(Delivery::End);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.end_sent.load(Ordering::SeqCst)
    }

    /// Next transcription, waiting as long as needed. `None` means the stream ended.
    pub async fn pull(&self) -> Option<Transcription> {
        if self.end_seen.load(Ordering::SeqCst) {
            return None;
        }

        let mut rx = self.rx.lock().await;
        if self.end_seen.load(Ordering::SeqCst) {
            return None;
        }
        match rx.recv().await {
            Some(Delivery::Item(transcription)) => Some(transcription),
            Some(Delivery::End) | None => {
                self.end_seen.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    /// Like [`pull`](Self::pull) but gives up after `wait`.
    ///
    /// A timeout consumes nothing; an item arriving later goes to the next pull.
    pub async fn pull_timeout(&self, wait: Duration) -> Pulled {
        match tokio::time::timeout(wait, self.pull()).await {
            Ok(Some(transcription)) => Pulled::Item(transcription),
            Ok(None) => Pulled::Closed,
            Err(_) => Pulled::TimedOut,
        }
    }

    /// Async iteration over the remaining transcriptions, ending with the stream.
    pub fn stream(self: Arc<Self>) -> impl Stream<Item = Transcription> + Send {
        stream::unfold(self, |channel| async move {
            channel.pull().await.map(|t| (t, channel))
        })
    }
}
