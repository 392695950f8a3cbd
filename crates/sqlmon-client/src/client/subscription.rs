// Subscription identifiers, caller callbacks, and the per-subscription
// dispatch task that turns transport frames into callback invocations.
use serde_json::Value;
use sqlmon_transport::StreamEvent;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::client::registry::SubscriptionRegistry;
use crate::error::ClientError;

#[cfg(feature = "telemetry")]
use crate::counters::frame_counters;

/// Opaque identifier for one active subscription.
///
/// Unique for practical purposes within a session's lifetime: wall-clock
/// millis plus a random suffix. Not cryptographic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub(crate) fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("sub-{millis}-{}", &suffix[..8]))
    }

    /// Wrap a previously issued identifier.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type DataFn = Box<dyn FnMut(Value) + Send>;
pub type ErrorFn = Box<dyn FnMut(ClientError) + Send>;
pub type CompleteFn = Box<dyn FnOnce() + Send>;

/// Caller-supplied callback triple for one subscription.
///
/// `on_data` receives each parsed JSON payload; `on_error` and `on_complete`
/// are optional. Callbacks run on the session's dispatch tasks and must not
/// block; a panicking callback is caught and logged, never allowed to take
/// down dispatch.
pub struct SubscriberCallbacks {
    pub(crate) on_data: DataFn,
    pub(crate) on_error: Option<ErrorFn>,
    pub(crate) on_complete: Option<CompleteFn>,
}

impl SubscriberCallbacks {
    pub fn new(on_data: impl FnMut(Value) + Send + 'static) -> Self {
        Self {
            on_data: Box::new(on_data),
            on_error: None,
            on_complete: None,
        }
    }

    pub fn on_error(mut self, on_error: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    pub fn on_complete(mut self, on_complete: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(on_complete));
        self
    }
}

/// Consume one subscription's event stream until a terminal event, channel
/// closure, or an observed cancel flag.
///
/// Frame-level decode failures invoke `on_error` and keep the stream open;
/// terminal events unregister the subscription before returning.
pub(crate) async fn run_subscription_dispatch(
    id: SubscriptionId,
    route: String,
    mut events: mpsc::Receiver<StreamEvent>,
    cancelled: Arc<AtomicBool>,
    mut callbacks: SubscriberCallbacks,
    registry: Arc<SubscriptionRegistry>,
) {
    while let Some(event) = events.recv().await {
        if cancelled.load(Ordering::Acquire) {
            debug!(%id, %route, "dispatch stopped by cancellation");
            break;
        }
        match event {
            StreamEvent::Payload(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    #[cfg(feature = "telemetry")]
                    frame_counters()
                        .frames_in_ok
                        .fetch_add(1, Ordering::Relaxed);
                    invoke_data(&mut callbacks, value);
                }
                Err(err) => {
                    // One bad frame does not end the feed; the stream may
                    // keep producing valid frames afterwards.
                    #[cfg(feature = "telemetry")]
                    frame_counters()
                        .frames_in_err
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(%id, %route, error = %err, "malformed payload frame");
                    invoke_error(&mut callbacks, ClientError::FrameDecode(err));
                }
            },
            StreamEvent::Error(message) => {
                #[cfg(feature = "telemetry")]
                frame_counters()
                    .streams_failed
                    .fetch_add(1, Ordering::Relaxed);
                debug!(%id, %route, error = %message, "stream terminated with error");
                invoke_error(&mut callbacks, ClientError::Stream(message));
                let _ = registry.remove(&id);
                return;
            }
            StreamEvent::Complete => {
                #[cfg(feature = "telemetry")]
                frame_counters()
                    .streams_completed
                    .fetch_add(1, Ordering::Relaxed);
                debug!(%id, %route, "stream completed");
                invoke_complete(&mut callbacks);
                let _ = registry.remove(&id);
                return;
            }
        }
    }
    // Channel closed without a terminal event (connection teardown or
    // cancellation). The teardown path owns the registry entry; this remove
    // only covers a transport that closed the channel on its own.
    let _ = registry.remove(&id);
}

fn invoke_data(callbacks: &mut SubscriberCallbacks, value: Value) {
    let result = catch_unwind(AssertUnwindSafe(|| (callbacks.on_data)(value)));
    if result.is_err() {
        error!("subscriber on_data callback panicked");
    }
}

fn invoke_error(callbacks: &mut SubscriberCallbacks, err: ClientError) {
    if let Some(on_error) = callbacks.on_error.as_mut() {
        let result = catch_unwind(AssertUnwindSafe(|| on_error(err)));
        if result.is_err() {
            error!("subscriber on_error callback panicked");
        }
    }
}

fn invoke_complete(callbacks: &mut SubscriberCallbacks) {
    if let Some(on_complete) = callbacks.on_complete.take() {
        let result = catch_unwind(AssertUnwindSafe(on_complete));
        if result.is_err() {
            error!("subscriber on_complete callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = SubscriptionId::generate();
        let b = SubscriptionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sub-"));
    }

    #[test]
    fn raw_ids_round_trip() {
        let id = SubscriptionId::from_raw("sub-123-abc");
        assert_eq!(id.to_string(), "sub-123-abc");
    }
}
