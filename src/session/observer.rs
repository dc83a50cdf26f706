use tracing::{debug, error, info, warn};

/// Lifecycle state of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, config sent, waiting for the ready frame
    Handshaking,
    /// Audio may flow and transcriptions may arrive
    Active,
    /// An extension request is in flight
    Extending,
    /// Terminal; no further sends are permitted
    Closed,
}

/// Why an extension was not requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    InFlight,
    /// The session already ended
    Closed,
}

/// Diagnostics emitted by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Ready { remaining_seconds: u64 },
    Expiring { remaining_seconds: Option<u64> },
    ExtensionStarted { minutes: u32 },
    ExtensionSkipped(SkipReason),
    ExtensionSucceeded { remaining_seconds: u64, minutes_added: u32 },
    ExtensionFailed { error: String },
    Extended { remaining_seconds: Option<u64> },
    Expired,
    ServerError { message: String },
    CallbackPanicked { message: String },
    ConnectionLost { reason: String },
    Closed,
}

/// Sink for session diagnostics.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, session_id: &str, event: &SessionEvent);
}

/// Default observer: one `tracing` record per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, session_id: &str, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged(state) => {
                debug!(session_id, ?state, "Session state changed")
            }
            SessionEvent::Ready { remaining_seconds } => {
                info!(session_id, remaining_seconds, "Stream ready")
            }
            SessionEvent::Expiring { remaining_seconds } => {
                warn!(session_id, ?remaining_seconds, "Session expiring soon")
            }
            SessionEvent::ExtensionStarted { minutes } => {
                info!(session_id, minutes, "Auto-extending session")
            }
            SessionEvent::ExtensionSkipped(reason) => {
                info!(session_id, ?reason, "Not extending session")
            }
            SessionEvent::ExtensionSucceeded {
                remaining_seconds,
                minutes_added,
            } => info!(
                session_id,
                remaining_seconds, minutes_added, "Session extended"
            ),
            SessionEvent::ExtensionFailed { error } => {
                error!(session_id, %error, "Auto-extend failed")
            }
            SessionEvent::Extended { remaining_seconds } => {
                info!(session_id, ?remaining_seconds, "Server confirmed extension")
            }
            SessionEvent::Expired => warn!(session_id, "Session expired"),
            SessionEvent::ServerError { message } => {
                error!(session_id, %message, "Server error frame")
            }
            SessionEvent::CallbackPanicked { message } => {
                error!(session_id, %message, "Transcription callback panicked")
            }
            SessionEvent::ConnectionLost { reason } => {
                warn!(session_id, %reason, "Stream connection lost")
            }
            SessionEvent::Closed => info!(session_id, "Stream closed"),
        }
    }
}
