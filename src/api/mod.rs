//! Session service HTTP API
//!
//! - POST /v1/session - Purchase a streaming session (paid)
//! - POST /v1/session/extend - Add minutes to a session (paid)
//! - GET /pricing - Published pricing
//! - GET /health - Service health

pub mod client;
pub mod messages;

pub use client::{
    stream_endpoint, HttpSessionApi, NoPayment, PaymentAuthorizer, SessionNegotiator,
    StaticHeader,
};
pub use messages::{Extension, Pricing, SessionDescriptor};
