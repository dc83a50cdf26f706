//! Realtime stream session
//!
//! This module provides the `StreamSession` abstraction that manages:
//! - The connection handshake (config frame out, ready frame in)
//! - Outbound audio, raw or paced from a WAV file
//! - Inbound transcription delivery (pull, async iteration, callbacks)
//! - Automatic extension when the server warns that time is running out

mod channel;
mod config;
mod extend;
mod frames;
mod handshake;
mod observer;
mod session;
mod stats;

pub use channel::{Pulled, TranscriptionChannel};
pub use config::StreamConfig;
pub use extend::{AutoExtendPolicy, Trigger};
pub use frames::{ConfigFrame, InboundFrame, Transcription};
pub use handshake::{handshake, WsStream};
pub use observer::{SessionEvent, SessionObserver, SessionState, SkipReason, TracingObserver};
pub use session::{StreamSession, TranscriptionCallback};
pub use stats::StreamStats;
