use super::observer::{SessionEvent, SessionObserver, SkipReason};
use crate::api::SessionNegotiator;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Outcome of a low-time warning
#[derive(Debug)]
pub enum Trigger {
    /// An extension request is now running on the returned task
    Started(JoinHandle<()>),
    Skipped(SkipReason),
}

/// Buys more time when the server warns that the session is running out.
///
/// At most one extension is in flight; warnings arriving meanwhile are dropped.
/// Failures are reported to the observer and never end the stream.
#[derive(Clone)]
pub struct AutoExtendPolicy {
    session_id: String,
    enabled: bool,
    minutes: u32,
    negotiator: Arc<dyn SessionNegotiator>,
    in_flight: Arc<AtomicBool>,
    remaining_seconds: Arc<AtomicU64>,
    observer: Arc<dyn SessionObserver>,
}

impl AutoExtendPolicy {
    pub fn new(
        session_id: impl Into<String>,
        enabled: bool,
        minutes: u32,
        negotiator: Arc<dyn SessionNegotiator>,
        remaining_seconds: Arc<AtomicU64>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            enabled,
            minutes,
            negotiator,
            in_flight: Arc::new(AtomicBool::new(false)),
            remaining_seconds,
            observer,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// React to a `session_expiring` warning. Must be called from within a tokio runtime.
    pub fn on_warning(&self) -> Trigger {
        if !self.enabled {
            return self.skip(SkipReason::Disabled);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.skip(SkipReason::InFlight);
        }

        self.observer.on_event(
            &self.session_id,
            &SessionEvent::ExtensionStarted {
                minutes: self.minutes,
            },
        );

        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let policy = self.clone();
        Trigger::Started(tokio::spawn(async move {
            let _guard = guard;
            policy.extend().await;
        }))
    }

    async fn extend(&self) {
        let event = match self
            .negotiator
            .extend_session(&self.session_id, self.minutes)
            .await
        {
            Ok(extension) => {
                self.remaining_seconds
                    .store(extension.remaining_seconds, Ordering::SeqCst);
                SessionEvent::ExtensionSucceeded {
                    remaining_seconds: extension.remaining_seconds,
                    minutes_added: extension.minutes_added,
                }
            }
            Err(e) => SessionEvent::ExtensionFailed {
                error: e.to_string(),
            },
        };
        self.observer.on_event(&self.session_id, &event);
    }

    fn skip(&self, reason: SkipReason) -> Trigger {
        self.observer
            .on_event(&self.session_id, &SessionEvent::ExtensionSkipped(reason));
        Trigger::Skipped(reason)
    }
}

/// Clears the in-flight flag when the extension task finishes or is aborted.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
