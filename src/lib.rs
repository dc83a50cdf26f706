pub mod api;
pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod session;

pub use api::{
    stream_endpoint, Extension, HttpSessionApi, NoPayment, PaymentAuthorizer, Pricing,
    SessionDescriptor, SessionNegotiator, StaticHeader,
};
pub use audio::{AudioFile, AudioPacer, AudioSink, PacingReport};
pub use client::SttClient;
pub use config::Config;
pub use error::{AudioFormatError, Result, SttError};
pub use session::{
    Pulled, SessionEvent, SessionObserver, SessionState, StreamConfig, StreamSession,
    StreamStats, Transcription, TracingObserver,
};
