use super::channel::{Pulled, TranscriptionChannel};
use super::config::StreamConfig;
use super::extend::{AutoExtendPolicy, Trigger};
use super::frames::{InboundFrame, Transcription};
use super::handshake::{handshake, WsStream};
use super::observer::{SessionEvent, SessionObserver, SessionState, SkipReason};
use super::stats::StreamStats;
use crate::api::{SessionDescriptor, SessionNegotiator};
use crate::audio::{AudioFile, AudioPacer, AudioSink, PacingReport};
use crate::error::{Result, SttError};
use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, SplitStream, Stream};
use futures::{SinkExt, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Callback invoked synchronously for every transcription
pub type TranscriptionCallback = Arc<dyn Fn(&Transcription) + Send + Sync>;

/// State shared between the session handle and its connection reader task
pub(crate) struct Shared {
    session_id: String,
    channel: Arc<TranscriptionChannel>,
    callbacks: RwLock<Vec<TranscriptionCallback>>,
    remaining_seconds: Arc<AtomicU64>,
    closed: AtomicBool,
    policy: AutoExtendPolicy,
    extension: std::sync::Mutex<Option<JoinHandle<()>>>,
    observer: Arc<dyn SessionObserver>,
    transcriptions_received: AtomicUsize,
}

impl Shared {
    pub(crate) fn new(
        descriptor: &SessionDescriptor,
        remaining_seconds: u64,
        config: &StreamConfig,
        negotiator: Arc<dyn SessionNegotiator>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let remaining_seconds = Arc::new(AtomicU64::new(remaining_seconds));
        let policy = AutoExtendPolicy::new(
            descriptor.session_id.clone(),
            config.auto_extend,
            config.extend_minutes,
            negotiator,
            Arc::clone(&remaining_seconds),
            Arc::clone(&observer),
        );

        Self {
            session_id: descriptor.session_id.clone(),
            channel: Arc::new(TranscriptionChannel::new()),
            callbacks: RwLock::new(Vec::new()),
            remaining_seconds,
            closed: AtomicBool::new(false),
            policy,
            extension: std::sync::Mutex::new(None),
            observer,
            transcriptions_received: AtomicUsize::new(0),
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.on_event(&self.session_id, &event);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the session closed and end the pull path. True for the first caller only.
    fn end_stream(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.channel.finish();
        self.emit(SessionEvent::StateChanged(SessionState::Closed));
        true
    }

    /// Handle one inbound text frame.
    pub(crate) fn dispatch(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Transcription(transcription) => self.deliver(transcription),
            InboundFrame::SessionExpiring { remaining_seconds } => {
                if let Some(secs) = remaining_seconds {
                    self.remaining_seconds.store(secs, Ordering::SeqCst);
                }
                self.emit(SessionEvent::Expiring { remaining_seconds });
                self.request_extension();
            }
            InboundFrame::SessionExtended { remaining_seconds } => {
                if let Some(secs) = remaining_seconds {
                    self.remaining_seconds.store(secs, Ordering::SeqCst);
                }
                self.emit(SessionEvent::Extended { remaining_seconds });
            }
            InboundFrame::SessionExpired { .. } => {
                self.emit(SessionEvent::Expired);
                self.end_stream();
            }
            InboundFrame::Error { message } => {
                self.emit(SessionEvent::ServerError {
                    message: message.unwrap_or_default(),
                });
            }
            InboundFrame::Ready { .. } => debug!("Ignoring repeated ready frame"),
            InboundFrame::Unknown => {}
        }
    }

    fn request_extension(&self) {
        if self.is_closed() {
            self.emit(SessionEvent::ExtensionSkipped(SkipReason::Closed));
            return;
        }
        if let Trigger::Started(handle) = self.policy.on_warning() {
            let mut extension = match self.extension.lock() {
                Ok(extension) => extension,
                Err(poisoned) => poisoned.into_inner(),
            };
            *extension = Some(handle);
        }
    }

    /// Abort a pending extension request, if any.
    fn cancel_extension(&self) {
        let handle = match self.extension.lock() {
            Ok(mut extension) => extension.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn deliver(&self, transcription: Transcription) {
        self.transcriptions_received.fetch_add(1, Ordering::SeqCst);
        self.channel.push(transcription.clone());

        let callbacks: Vec<TranscriptionCallback> = match self.callbacks.read() {
            Ok(callbacks) => callbacks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&transcription))) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.emit(SessionEvent::CallbackPanicked { message });
            }
        }
    }

    fn add_callback(&self, callback: TranscriptionCallback) {
        match self.callbacks.write() {
            Ok(mut callbacks) => callbacks.push(callback),
            Err(poisoned) => poisoned.into_inner().push(callback),
        }
    }
}

/// A live, paid speech-to-text stream.
///
/// Created by [`StreamSession::connect`], which performs the handshake. Audio is
/// sent with [`send_audio`](Self::send_audio) or paced from a file with
/// [`stream_file`](Self::stream_file). Transcriptions are delivered to every
/// registered callback and, independently, queued for [`pull`](Self::pull),
/// [`pull_timeout`](Self::pull_timeout) or [`transcriptions`](Self::transcriptions).
pub struct StreamSession {
    shared: Arc<Shared>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    close_started: AtomicBool,
    pacer: AudioPacer,
    drain_timeout: Duration,
    started_at: DateTime<Utc>,
    chunks_sent: AtomicUsize,
    bytes_sent: AtomicUsize,
}

impl StreamSession {
    /// Connect to `endpoint` and attach `descriptor`'s session.
    ///
    /// Fails if the server does not answer the config frame with `ready`
    /// within the handshake timeout. No transcription is processed before that.
    pub async fn connect(
        endpoint: &str,
        descriptor: &SessionDescriptor,
        config: StreamConfig,
        negotiator: Arc<dyn SessionNegotiator>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self> {
        observer.on_event(
            &descriptor.session_id,
            &SessionEvent::StateChanged(SessionState::Handshaking),
        );

        let (ws, remaining_seconds) =
            match handshake(endpoint, descriptor, &config.language, config.handshake_timeout).await {
                Ok(attached) => attached,
                Err(e) => {
                    observer.on_event(
                        &descriptor.session_id,
                        &SessionEvent::StateChanged(SessionState::Closed),
                    );
                    return Err(e);
                }
            };

        let shared = Arc::new(Shared::new(
            descriptor,
            remaining_seconds,
            &config,
            negotiator,
            observer,
        ));
        shared.emit(SessionEvent::Ready { remaining_seconds });
        shared.emit(SessionEvent::StateChanged(SessionState::Active));

        let (sink, stream) = ws.split();
        let reader = tokio::spawn(read_loop(Arc::clone(&shared), stream));

        Ok(Self {
            shared,
            sink: Mutex::new(sink),
            reader: std::sync::Mutex::new(Some(reader)),
            close_started: AtomicBool::new(false),
            pacer: AudioPacer::new(config.chunk_duration, config.trailing_silence),
            drain_timeout: config.drain_timeout,
            started_at: Utc::now(),
            chunks_sent: AtomicUsize::new(0),
            bytes_sent: AtomicUsize::new(0),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Seconds left as last reported by the server or an extension
    pub fn remaining_seconds(&self) -> u64 {
        self.shared.remaining_seconds.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        if self.shared.is_closed() {
            SessionState::Closed
        } else if self.shared.policy.is_in_flight() {
            SessionState::Extending
        } else {
            SessionState::Active
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Send raw PCM immediately, unpaced.
    ///
    /// Calls must be sequenced by the caller; frames go out in call order.
    pub async fn send_audio(&self, pcm: Vec<u8>) -> Result<()> {
        if self.shared.is_closed() {
            return Err(SttError::StreamClosed);
        }

        let len = pcm.len();
        self.sink.lock().await.send(Message::Binary(pcm)).await?;
        self.chunks_sent.fetch_add(1, Ordering::SeqCst);
        self.bytes_sent.fetch_add(len, Ordering::SeqCst);
        Ok(())
    }

    /// Load, pace and send a WAV file, then collect transcriptions until the
    /// stream ends or nothing arrives for the drain timeout.
    pub async fn stream_file(&self, path: impl AsRef<Path>) -> Result<Vec<Transcription>> {
        let audio = AudioFile::open(path)?;
        self.stream_audio(&audio).await
    }

    /// Pace `audio` out and drain. If the session ends while audio is still
    /// being sent (expiry, connection loss), pacing stops and whatever
    /// transcriptions already arrived are returned.
    pub async fn stream_audio(&self, audio: &AudioFile) -> Result<Vec<Transcription>> {
        if self.shared.is_closed() {
            return Err(SttError::StreamClosed);
        }

        match self.send_paced(&audio.pcm).await {
            Ok(_) => {}
            Err(e) if self.shared.is_closed() => {
                warn!(
                    "Session {} ended while sending audio ({}), collecting received transcriptions",
                    self.shared.session_id, e
                );
            }
            Err(e) => return Err(e),
        }
        Ok(self.drain().await)
    }

    /// Paced transmission only, including the trailing silence.
    pub async fn send_paced(&self, pcm: &[u8]) -> Result<PacingReport> {
        self.pacer.stream(self, pcm).await
    }

    async fn drain(&self) -> Vec<Transcription> {
        let mut collected = Vec::new();
        loop {
            match self.pull_timeout(self.drain_timeout).await {
                Pulled::Item(transcription) => collected.push(transcription),
                Pulled::Closed | Pulled::TimedOut => break,
            }
        }
        info!("Drained {} transcriptions", collected.len());
        collected
    }

    /// Next transcription; `None` once the stream has ended.
    pub async fn pull(&self) -> Option<Transcription> {
        self.shared.channel.pull().await
    }

    pub async fn pull_timeout(&self, wait: Duration) -> Pulled {
        self.shared.channel.pull_timeout(wait).await
    }

    /// Async iteration over transcriptions, ending with the stream.
    pub fn transcriptions(&self) -> impl Stream<Item = Transcription> + Send {
        Arc::clone(&self.shared.channel).stream()
    }

    /// Register a callback for every transcription from now on.
    ///
    /// Runs on the connection's reader task; a panicking callback is reported
    /// and skipped without affecting dispatch.
    pub fn on_transcription<F>(&self, callback: F)
    where
        F: Fn(&Transcription) + Send + Sync + 'static,
    {
        self.shared.add_callback(Arc::new(callback));
    }

    pub fn stats(&self) -> StreamStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        StreamStats {
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            audio_chunks_sent: self.chunks_sent.load(Ordering::SeqCst),
            audio_bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            transcriptions_received: self.shared.transcriptions_received.load(Ordering::SeqCst),
            remaining_seconds: self.remaining_seconds(),
        }
    }

    /// End the stream and close the connection. Safe to call repeatedly.
    pub async fn close(&self) {
        if self.close_started.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Closing stream for session {}", self.shared.session_id);
        self.shared.end_stream();
        self.shared.cancel_extension();

        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Ignoring error while closing stream connection: {}", e);
        }

        if let Some(reader) = self.take_reader() {
            reader.abort();
        }

        self.shared.emit(SessionEvent::Closed);
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        match self.reader.lock() {
            Ok(mut reader) => reader.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait::async_trait]
impl AudioSink for StreamSession {
    async fn send_audio(&self, pcm: Vec<u8>) -> Result<()> {
        StreamSession::send_audio(self, pcm).await
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        self.shared.end_stream();
        self.shared.cancel_extension();
    }
}

async fn read_loop(shared: Arc<Shared>, mut stream: SplitStream<WsStream>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => shared.dispatch(InboundFrame::parse(&text)),
            Some(Ok(Message::Binary(data))) => {
                debug!("Ignoring {}-byte binary frame from server", data.len())
            }
            Some(Ok(Message::Close(frame))) => {
                break format!("closed by server: {frame:?}");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Stream connection error: {}", e);
                break e.to_string();
            }
            None => break "connection ended".to_string(),
        }
    };

    if shared.end_stream() {
        shared.emit(SessionEvent::ConnectionLost { reason });
    }
}
