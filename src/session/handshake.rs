use super::frames::{ConfigFrame, InboundFrame};
use crate::api::SessionDescriptor;
use crate::error::{Result, SttError};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the stream connection and wait for the server to attach the session.
///
/// Sends the config frame, then expects `ready` as the very first data frame.
/// `wait` bounds the whole exchange, connection upgrade included. On any
/// failure the socket is closed (or dropped, on timeout) before the error is
/// returned. Returns the connection together with the remaining seconds
/// reported by the server, or the descriptor's value when the ready frame
/// omits it.
pub async fn handshake(
    endpoint: &str,
    descriptor: &SessionDescriptor,
    language: &str,
    wait: Duration,
) -> Result<(WsStream, u64)> {
    info!("Connecting to {}", endpoint);

    let outcome = tokio::time::timeout(wait, attach(endpoint, descriptor, language)).await;
    let (mut ws, frame) = match outcome {
        Ok(attached) => attached?,
        Err(_) => {
            warn!("No ready frame from {} within {:?}", endpoint, wait);
            return Err(SttError::connection(format!(
                "timed out after {wait:?} waiting for ready frame"
            )));
        }
    };

    match frame {
        InboundFrame::Ready {
            remaining_seconds, ..
        } => {
            let remaining = remaining_seconds.unwrap_or(descriptor.remaining_seconds);
            info!(
                "Session {} attached, {}s remaining",
                descriptor.session_id, remaining
            );
            Ok((ws, remaining))
        }
        other => {
            let _ = ws.close(None).await;
            Err(rejection(descriptor, other))
        }
    }
}

/// Connect, send the config frame and read the first data frame.
async fn attach(
    endpoint: &str,
    descriptor: &SessionDescriptor,
    language: &str,
) -> Result<(WsStream, InboundFrame)> {
    let (mut ws, _) = tokio_tungstenite::connect_async(endpoint)
        .await
        .map_err(|e| SttError::connection(format!("failed to connect to {endpoint}: {e}")))?;

    let config = serde_json::to_string(&ConfigFrame::new(language, &descriptor.session_key))?;
    if let Err(e) = ws.send(Message::Text(config)).await {
        let _ = ws.close(None).await;
        return Err(SttError::connection(format!("failed to send config frame: {e}")));
    }

    match first_frame(&mut ws).await {
        Ok(frame) => Ok((ws, frame)),
        Err(e) => {
            let _ = ws.close(None).await;
            Err(e)
        }
    }
}

async fn first_frame(ws: &mut WsStream) -> Result<InboundFrame> {
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => return Ok(InboundFrame::parse(&text)),
            Ok(Message::Binary(_)) => {
                return Err(SttError::server("binary frame received before ready"))
            }
            Ok(Message::Close(frame)) => {
                return Err(SttError::connection(format!(
                    "server closed the connection during handshake: {frame:?}"
                )))
            }
            Ok(other) => debug!("Skipping control frame during handshake: {:?}", other),
            Err(e) => {
                return Err(SttError::connection(format!("handshake failed: {e}")));
            }
        }
    }
    Err(SttError::connection("connection ended before ready frame"))
}

fn rejection(descriptor: &SessionDescriptor, frame: InboundFrame) -> SttError {
    match frame {
        InboundFrame::Error { message } => SttError::server(
            message.unwrap_or_else(|| "server rejected the session".to_string()),
        ),
        InboundFrame::SessionExpired { .. } => SttError::SessionExpired {
            session_id: descriptor.session_id.clone(),
        },
        other => SttError::server(format!(
            "expected ready frame, got {}",
            other.kind()
        )),
    }
}
