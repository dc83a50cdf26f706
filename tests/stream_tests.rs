// Integration tests for the stream session
//
// These tests run a loopback WebSocket server that plays the service's side of
// the protocol and verify handshake, dispatch, close and pacing behavior.

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stt_stream::{
    AudioFile, Extension, Pulled, SessionDescriptor, SessionEvent, SessionNegotiator,
    SessionObserver, SessionState, StreamConfig, StreamSession, SttError, TracingObserver,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type ServerWs = WebSocketStream<TcpStream>;

/// Accept one connection and hand it to `handler`. Returns the ws:// URL.
async fn serve<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{addr}/v1/stream")
}

/// Read the client's config frame and answer with `ready`.
async fn accept_session(ws: &mut ServerWs, remaining_seconds: u64) -> serde_json::Value {
    let config = match ws.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected config frame, got {other:?}"),
    };
    let ready = format!(r#"{{"type":"ready","session_id":"sess-1","remaining_seconds":{remaining_seconds}}}"#);
    ws.send(Message::Text(ready)).await.unwrap();
    config
}

/// Wait until the client sends its first binary frame.
async fn wait_for_audio(ws: &mut ServerWs) {
    while let Some(Ok(message)) = ws.next().await {
        if message.is_binary() {
            return;
        }
    }
}

fn transcription(text: &str) -> Message {
    Message::Text(format!(r#"{{"type":"transcription","text":"{text}","is_final":true}}"#))
}

fn descriptor() -> SessionDescriptor {
    SessionDescriptor {
        session_id: "sess-1".to_string(),
        session_key: "key-abc".to_string(),
        ws_url: None,
        remaining_seconds: 120,
        minutes: 5,
        price_usd: 0.05,
    }
}

#[derive(Default)]
struct CountingNegotiator {
    calls: AtomicUsize,
    release: Notify,
}

#[async_trait::async_trait]
impl SessionNegotiator for CountingNegotiator {
    async fn create_session(&self, _minutes: u32, _language: &str) -> stt_stream::Result<SessionDescriptor> {
        Ok(descriptor())
    }

    async fn extend_session(&self, _session_id: &str, minutes: u32) -> stt_stream::Result<Extension> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(Extension {
            remaining_seconds: 330,
            minutes_added: minutes,
            price_usd: 0.05,
        })
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<SessionEvent>>);

impl SessionObserver for EventLog {
    fn on_event(&self, _session_id: &str, event: &SessionEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

async fn connect(endpoint: &str, config: StreamConfig) -> stt_stream::Result<StreamSession> {
    StreamSession::connect(
        endpoint,
        &descriptor(),
        config,
        Arc::new(CountingNegotiator::default()),
        Arc::new(TracingObserver),
    )
    .await
}

#[tokio::test]
async fn test_handshake_ready_reports_remaining_time() -> Result<()> {
    let (config_tx, config_rx) = oneshot::channel();
    let endpoint = serve(|mut ws| async move {
        let config = accept_session(&mut ws, 300).await;
        let _ = config_tx.send(config);
        while ws.next().await.is_some() {}
    })
    .await;

    let stream = connect(&endpoint, StreamConfig::default()).await?;

    assert_eq!(stream.remaining_seconds(), 300);
    assert_eq!(stream.state(), SessionState::Active);

    let config = config_rx.await?;
    assert_eq!(config["type"], "config");
    assert_eq!(config["language"], "en");
    assert_eq!(config["session_key"], "key-abc");

    stream.close().await;
    Ok(())
}

#[tokio::test]
async fn test_handshake_ready_without_remaining_uses_descriptor() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        ws.next().await;
        ws.send(Message::Text(r#"{"type":"ready"}"#.to_string())).await.unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let stream = connect(&endpoint, StreamConfig::default()).await?;
    assert_eq!(stream.remaining_seconds(), 120);
    stream.close().await;
    Ok(())
}

#[tokio::test]
async fn test_handshake_error_frame_rejects_and_closes() -> Result<()> {
    let (closed_tx, closed_rx) = oneshot::channel();
    let endpoint = serve(|mut ws| async move {
        ws.next().await;
        ws.send(Message::Text(r#"{"type":"error","message":"invalid session key"}"#.to_string()))
            .await
            .unwrap();
        // The client must tear the connection down
        let mut saw_close = false;
        while let Some(message) = ws.next().await {
            if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                saw_close = true;
                break;
            }
        }
        let _ = closed_tx.send(saw_close || ws.next().await.is_none());
    })
    .await;

    let result = connect(&endpoint, StreamConfig::default()).await;

    match result {
        Err(SttError::Server { message }) => assert_eq!(message, "invalid session key"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake should fail"),
    }
    assert!(tokio::time::timeout(Duration::from_secs(5), closed_rx).await??);
    Ok(())
}

#[tokio::test]
async fn test_handshake_times_out_without_ready() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        // Never answer the config frame
        while ws.next().await.is_some() {}
    })
    .await;

    let config = StreamConfig {
        handshake_timeout: Duration::from_millis(200),
        ..StreamConfig::default()
    };
    let result = connect(&endpoint, config).await;

    assert!(matches!(result, Err(SttError::Connection { .. })));
    Ok(())
}

#[tokio::test]
async fn test_handshake_times_out_when_upgrade_never_answers() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        // Accept TCP, never complete the WebSocket upgrade
        let (_tcp, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let config = StreamConfig {
        handshake_timeout: Duration::from_millis(200),
        ..StreamConfig::default()
    };
    let result = tokio::time::timeout(
        Duration::from_secs(3),
        connect(&format!("ws://{addr}/v1/stream"), config),
    )
    .await?;

    assert!(matches!(result, Err(SttError::Connection { .. })));
    Ok(())
}

/// Open a session against a server whose first frame is `first`.
async fn connect_with_first_frame(first: &'static str) -> (stt_stream::Result<StreamSession>, Arc<EventLog>) {
    let endpoint = serve(move |mut ws| async move {
        ws.next().await;
        ws.send(Message::Text(first.to_string())).await.unwrap();
        let _ = ws.send(transcription("after the first frame")).await;
        while ws.next().await.is_some() {}
    })
    .await;

    let log = Arc::new(EventLog::default());
    let result = StreamSession::connect(
        &endpoint,
        &descriptor(),
        StreamConfig::default(),
        Arc::new(CountingNegotiator::default()),
        log.clone(),
    )
    .await;
    (result, log)
}

#[tokio::test]
async fn test_handshake_rejects_transcription_before_ready() -> Result<()> {
    let (result, log) =
        connect_with_first_frame(r#"{"type":"transcription","text":"too early"}"#).await;

    match result {
        Err(SttError::Server { message }) => assert!(message.contains("transcription")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake should fail"),
    }

    let events = log.0.lock().unwrap().clone();
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Ready { .. })));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::StateChanged(SessionState::Closed))
    );
    Ok(())
}

#[tokio::test]
async fn test_handshake_session_expired_before_ready() -> Result<()> {
    let (result, log) =
        connect_with_first_frame(r#"{"type":"session_expired","session_id":"sess-1"}"#).await;

    match result {
        Err(SttError::SessionExpired { session_id }) => assert_eq!(session_id, "sess-1"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake should fail"),
    }
    assert!(!log
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SessionEvent::Ready { .. })));
    Ok(())
}

#[tokio::test]
async fn test_handshake_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = connect(&format!("ws://{addr}/v1/stream"), StreamConfig::default()).await;

    assert!(matches!(result, Err(SttError::Connection { .. })));
}

#[tokio::test]
async fn test_pull_and_callback_see_all_transcriptions_in_order() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 300).await;
        wait_for_audio(&mut ws).await;
        ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap(); // ignored by client
        ws.send(Message::Text(r#"{"type":"unknown_kind"}"#.to_string())).await.unwrap();
        for i in 0..5 {
            ws.send(transcription(&format!("utterance {i}"))).await.unwrap();
        }
        ws.close(None).await.unwrap();
    })
    .await;

    let stream = connect(&endpoint, StreamConfig::default()).await?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        stream.on_transcription(move |t| seen.lock().unwrap().push(t.text.clone()));
    }

    stream.send_audio(vec![0u8; 640]).await?;

    let mut pulled = Vec::new();
    while let Some(t) = stream.pull().await {
        pulled.push(t.text);
    }

    let expected: Vec<String> = (0..5).map(|i| format!("utterance {i}")).collect();
    assert_eq!(pulled, expected);
    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(stream.state(), SessionState::Closed);
    assert_eq!(stream.stats().transcriptions_received, 5);
    Ok(())
}

#[tokio::test]
async fn test_async_iteration_ends_on_connection_loss() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 300).await;
        ws.send(transcription("first")).await.unwrap();
        ws.send(transcription("second")).await.unwrap();
        // Drop without a close frame
    })
    .await;

    let stream = connect(&endpoint, StreamConfig::default()).await?;

    let texts: Vec<String> = stream.transcriptions().map(|t| t.text).collect().await;

    assert_eq!(texts, vec!["first", "second"]);
    assert!(matches!(
        stream.send_audio(vec![0u8; 2]).await,
        Err(SttError::StreamClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent_and_unblocks_pull() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 300).await;
        while ws.next().await.is_some() {}
    })
    .await;

    let stream = Arc::new(connect(&endpoint, StreamConfig::default()).await?);
    let waiter = {
        let stream = Arc::clone(&stream);
        tokio::spawn(async move { stream.pull().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    stream.close().await;
    stream.close().await;
    stream.close().await;

    let pulled = tokio::time::timeout(Duration::from_secs(5), waiter).await??;
    assert_eq!(pulled, None);
    assert_eq!(stream.pull_timeout(Duration::from_millis(10)).await, Pulled::Closed);
    assert!(matches!(
        stream.send_audio(vec![0u8; 640]).await,
        Err(SttError::StreamClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn test_session_expired_frame_ends_stream() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 5).await;
        ws.send(transcription("before expiry")).await.unwrap();
        ws.send(Message::Text(r#"{"type":"session_expired","session_id":"sess-1"}"#.to_string()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let log = Arc::new(EventLog::default());
    let stream = StreamSession::connect(
        &endpoint,
        &descriptor(),
        StreamConfig::default(),
        Arc::new(CountingNegotiator::default()),
        log.clone(),
    )
    .await?;

    assert_eq!(stream.pull().await.unwrap().text, "before expiry");
    assert_eq!(stream.pull().await, None);
    assert!(stream.is_closed());
    assert!(log.0.lock().unwrap().contains(&SessionEvent::Expired));

    stream.close().await;
    Ok(())
}

#[tokio::test]
async fn test_repeated_expiring_warnings_extend_once() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 60).await;
        let expiring = r#"{"type":"session_expiring","remaining_seconds":30}"#;
        ws.send(Message::Text(expiring.to_string())).await.unwrap();
        ws.send(Message::Text(expiring.to_string())).await.unwrap();
        ws.send(transcription("marker")).await.unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let negotiator = Arc::new(CountingNegotiator::default());
    let log = Arc::new(EventLog::default());
    let stream = StreamSession::connect(
        &endpoint,
        &descriptor(),
        StreamConfig::default(),
        negotiator.clone(),
        log.clone(),
    )
    .await?;

    // Both warnings have been dispatched once the marker arrives
    assert_eq!(stream.pull().await.unwrap().text, "marker");
    assert_eq!(stream.state(), SessionState::Extending);
    assert_eq!(stream.remaining_seconds(), 30);

    negotiator.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), async {
        while stream.state() != SessionState::Active {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    assert_eq!(negotiator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(stream.remaining_seconds(), 330);
    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ExtensionStarted { minutes: 5 }))
            .count(),
        1
    );
    assert!(events.contains(&SessionEvent::ExtensionSkipped(stt_stream::session::SkipReason::InFlight)));

    stream.close().await;
    Ok(())
}

#[tokio::test]
async fn test_stream_file_paces_audio_and_drains_transcripts() -> Result<()> {
    let (sizes_tx, sizes_rx) = oneshot::channel();
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 300).await;
        let mut sizes = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Binary(data) = message {
                let silence = data.len() == 64000 && data.iter().all(|&b| b == 0);
                sizes.push(data.len());
                if silence {
                    ws.send(transcription("the whole file")).await.unwrap();
                    break;
                }
            }
        }
        let _ = sizes_tx.send(sizes);
        while ws.next().await.is_some() {}
    })
    .await;

    // One second of 16kHz mono audio
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("speech.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..16000 {
        writer.write_sample(((i % 64) * 100) as i16)?;
    }
    writer.finalize()?;

    let config = StreamConfig {
        drain_timeout: Duration::from_millis(300),
        ..StreamConfig::default()
    };
    let stream = connect(&endpoint, config).await?;

    let started = std::time::Instant::now();
    let transcriptions = stream.stream_file(&path).await?;
    let elapsed = started.elapsed();

    assert_eq!(transcriptions.len(), 1);
    assert_eq!(transcriptions[0].text, "the whole file");
    assert!(elapsed >= Duration::from_secs(1));

    let sizes = sizes_rx.await?;
    assert_eq!(sizes.len(), 51);
    assert!(sizes[..50].iter().all(|&s| s == 640));
    assert_eq!(sizes[50], 64000);

    let stats = stream.stats();
    assert_eq!(stats.audio_chunks_sent, 51);
    assert_eq!(stats.audio_bytes_sent, 32000 + 64000);

    stream.close().await;
    Ok(())
}

#[tokio::test]
async fn test_close_cancels_pending_extension() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 60).await;
        ws.send(Message::Text(r#"{"type":"session_expiring","remaining_seconds":30}"#.to_string()))
            .await
            .unwrap();
        ws.send(transcription("marker")).await.unwrap();
        while ws.next().await.is_some() {}
    })
    .await;

    let negotiator = Arc::new(CountingNegotiator::default());
    let log = Arc::new(EventLog::default());
    let stream = StreamSession::connect(
        &endpoint,
        &descriptor(),
        StreamConfig::default(),
        negotiator.clone(),
        log.clone(),
    )
    .await?;

    assert_eq!(stream.pull().await.unwrap().text, "marker");
    stream.close().await;

    // Releasing the negotiator after close must not apply the extension
    negotiator.release.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(stream.remaining_seconds(), 30);
    assert!(!log
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SessionEvent::ExtensionSucceeded { .. })));
    Ok(())
}

#[tokio::test]
async fn test_stream_file_returns_transcripts_when_session_expires_midway() -> Result<()> {
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 5).await;
        let mut binary_frames = 0;
        while let Some(Ok(message)) = ws.next().await {
            if message.is_binary() {
                binary_frames += 1;
                if binary_frames == 5 {
                    ws.send(transcription("got this")).await.unwrap();
                    ws.send(Message::Text(
                        r#"{"type":"session_expired","session_id":"sess-1"}"#.to_string(),
                    ))
                    .await
                    .unwrap();
                }
            }
        }
    })
    .await;

    // Two seconds of audio, far more than the server lets through
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("long.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for _ in 0..32000 {
        writer.write_sample(100i16)?;
    }
    writer.finalize()?;

    let config = StreamConfig {
        drain_timeout: Duration::from_millis(300),
        ..StreamConfig::default()
    };
    let stream = connect(&endpoint, config).await?;

    let transcriptions = stream.stream_file(&path).await?;

    assert_eq!(transcriptions.len(), 1);
    assert_eq!(transcriptions[0].text, "got this");
    assert!(stream.is_closed());
    assert!(stream.stats().audio_chunks_sent < 100);

    stream.close().await;
    Ok(())
}

#[tokio::test]
async fn test_stream_file_rejects_bad_audio_before_sending() -> Result<()> {
    let (count_tx, count_rx) = oneshot::channel();
    let endpoint = serve(|mut ws| async move {
        accept_session(&mut ws, 300).await;
        let mut binary_frames = 0;
        while let Some(Ok(message)) = ws.next().await {
            if message.is_binary() {
                binary_frames += 1;
            }
        }
        let _ = count_tx.send(binary_frames);
    })
    .await;

    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for _ in 0..3200 {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;

    let stream = connect(&endpoint, StreamConfig::default()).await?;
    let result = stream.stream_file(&path).await;

    assert!(matches!(
        result,
        Err(SttError::AudioFormat(stt_stream::AudioFormatError::Channels { actual: 2, .. }))
    ));
    assert!(AudioFile::open(&path).is_err());

    stream.close().await;
    assert_eq!(tokio::time::timeout(Duration::from_secs(5), count_rx).await??, 0);
    Ok(())
}
