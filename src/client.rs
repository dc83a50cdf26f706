use crate::api::{stream_endpoint, HttpSessionApi, Pricing, SessionDescriptor, SessionNegotiator};
use crate::error::Result;
use crate::session::{SessionObserver, StreamConfig, StreamSession, Transcription, TracingObserver};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Entry point: buys sessions and opens streams against one service.
pub struct SttClient {
    api: Arc<HttpSessionApi>,
    config: StreamConfig,
    observer: Arc<dyn SessionObserver>,
}

impl SttClient {
    pub fn new(api: HttpSessionApi, config: StreamConfig) -> Self {
        Self {
            api: Arc::new(api),
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Route session diagnostics somewhere other than `tracing`.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub async fn pricing(&self) -> Result<Pricing> {
        self.api.pricing().await
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        self.api.health().await
    }

    pub async fn create_session(&self, minutes: u32) -> Result<SessionDescriptor> {
        self.api.create_session(minutes, &self.config.language).await
    }

    /// Open a stream on an already purchased session.
    pub async fn connect(&self, descriptor: &SessionDescriptor) -> Result<StreamSession> {
        let endpoint = stream_endpoint(self.api.base_url(), descriptor);
        let negotiator: Arc<dyn SessionNegotiator> = self.api.clone();
        StreamSession::connect(
            &endpoint,
            descriptor,
            self.config.clone(),
            negotiator,
            Arc::clone(&self.observer),
        )
        .await
    }

    /// Buy a session and open a stream on it.
    pub async fn open_stream(&self, minutes: u32) -> Result<StreamSession> {
        let descriptor = self.create_session(minutes).await?;
        self.connect(&descriptor).await
    }

    /// Buy a session, stream a WAV file through it and return what was recognized.
    pub async fn transcribe_file(
        &self,
        path: impl AsRef<Path>,
        minutes: u32,
    ) -> Result<Vec<Transcription>> {
        // Validate before paying for anything
        let audio = crate::audio::AudioFile::open(path)?;

        let stream = self.open_stream(minutes).await?;
        let result = stream.stream_audio(&audio).await;
        let stats = stream.stats();
        stream.close().await;

        info!(
            "Transcription finished: {} chunks sent, {} transcriptions received",
            stats.audio_chunks_sent, stats.transcriptions_received
        );
        result
    }
}
