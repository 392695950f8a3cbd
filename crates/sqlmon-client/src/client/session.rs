// Stream transport session: one logical connection, many metric feeds.
//
// The session owns exactly one physical connection at a time. A connect gate
// serializes connection attempts, a watchdog task observes connection loss
// and runs the bounded reconnect schedule, and an epoch counter makes timers
// from an abandoned connection generation inert. A reconnect firing after a
// deliberate disconnect would be a correctness bug, not a nuisance.
//
// Reconnection does NOT resubscribe previously active feeds. Server route
// semantics are idempotent to re-issue, so feed replay belongs to the caller;
// keeping it out of this layer keeps teardown unambiguous.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use sqlmon_transport::{StreamRequest, StreamSocket, StreamTransport};
use sqlmon_wire::{MAX_DEMAND, routing};

use crate::client::registry::{SubscriptionEntry, SubscriptionRegistry};
use crate::client::subscription::{
    SubscriberCallbacks, SubscriptionId, run_subscription_dispatch,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

#[cfg(feature = "telemetry")]
use crate::counters::frame_counters;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

const STATE_DISCONNECTED: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_CONNECTED: u8 = 2;

/// One logical streaming connection to a metrics server.
#[derive(Clone)]
pub struct StreamSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Arc<dyn StreamTransport>,
    endpoint: String,
    config: ClientConfig,
    state: AtomicU8,
    socket: AsyncMutex<Option<Arc<dyn StreamSocket>>>,
    registry: Arc<SubscriptionRegistry>,
    reconnect_attempts: AtomicU32,
    // Bumped on every explicit connect/disconnect; watchdogs and reconnect
    // timers from an older epoch see the mismatch and stand down.
    epoch: AtomicU64,
    watchdog: std::sync::Mutex<Option<JoinHandle<()>>>,
    // Serializes connection establishment so duplicate or concurrent connect
    // calls can never produce two physical connections.
    connect_gate: AsyncMutex<()>,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        endpoint: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                endpoint: endpoint.into(),
                config,
                state: AtomicU8::new(STATE_DISCONNECTED),
                socket: AsyncMutex::new(None),
                registry: Arc::new(SubscriptionRegistry::new()),
                reconnect_attempts: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                watchdog: std::sync::Mutex::new(None),
                connect_gate: AsyncMutex::new(()),
            }),
        }
    }

    /// Establish the physical connection and perform the setup handshake.
    ///
    /// A call while already `Connecting` or `Connected` is a no-op returning
    /// `Ok(())`. On failure the session stays `Disconnected` and the error is
    /// surfaced; an explicit connect failure is not retried automatically.
    /// Resets the reconnect attempt counter.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        let _gate = inner.connect_gate.lock().await;
        match inner.state() {
            ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
            ConnectionState::Disconnected => {}
        }
        inner.reconnect_attempts.store(0, Ordering::Relaxed);
        let epoch = inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        inner.abort_watchdog();
        inner.connect_once(epoch).await
    }

    /// Open a request-stream for `route` with unbounded demand.
    ///
    /// Returns the new subscription id; data delivery happens asynchronously
    /// through the callbacks. Fails with `NotConnected` outside the
    /// `Connected` state and with `Encoding` for over-long routes; neither
    /// failure registers a subscription.
    pub async fn open_stream(
        &self,
        route: &str,
        callbacks: SubscriberCallbacks,
    ) -> Result<SubscriptionId> {
        let inner = &self.inner;
        if inner.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let metadata = routing::encode_route(route)?;
        let socket = inner
            .socket
            .lock()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let stream = socket
            .open_stream(StreamRequest {
                metadata,
                data: None,
                demand: MAX_DEMAND,
                queue_capacity: inner.config.sub_queue_capacity,
            })
            .await?;

        let id = SubscriptionId::generate();
        let cancelled = Arc::new(AtomicBool::new(false));
        inner.registry.register(
            id.clone(),
            SubscriptionEntry {
                route: route.to_string(),
                cancel: stream.cancel,
                cancelled: Arc::clone(&cancelled),
            },
        );
        #[cfg(feature = "telemetry")]
        frame_counters()
            .streams_opened
            .fetch_add(1, Ordering::Relaxed);
        t_counter!("sqlmon_client_streams_opened_total").increment(1);
        tokio::spawn(run_subscription_dispatch(
            id.clone(),
            route.to_string(),
            stream.events,
            cancelled,
            callbacks,
            Arc::clone(&inner.registry),
        ));
        debug!(%id, %route, "opened metric stream");
        Ok(id)
    }

    /// Cancel one subscription. Unknown ids are ignored; safe from any state.
    ///
    /// Cancellation is best-effort: a frame already being dispatched when the
    /// cancel flag is set may still invoke `on_data` once.
    pub fn cancel(&self, id: &SubscriptionId) {
        if let Some(mut entry) = self.inner.registry.remove(id) {
            entry.cancelled.store(true, Ordering::Release);
            entry.cancel.cancel();
            debug!(%id, route = %entry.route, "subscription cancelled");
        }
    }

    /// Tear the session down: cancel every subscription, stop watchdog and
    /// reconnect timers, close the connection. Idempotent and callable from
    /// any state; nothing fires after it returns. A connect still in flight
    /// is allowed to resolve first, and its connection is then closed.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let _gate = inner.connect_gate.lock().await;
        inner.epoch.fetch_add(1, Ordering::AcqRel);
        inner.abort_watchdog();
        inner.teardown_subscriptions();
        inner.set_state(ConnectionState::Disconnected);
        let socket = inner.socket.lock().await.take();
        if let Some(socket) = socket {
            socket.close().await;
            debug!("streaming connection closed");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state() == ConnectionState::Connected
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn has_subscription(&self, id: &SubscriptionId) -> bool {
        self.inner.registry.contains(id)
    }
}

impl SessionInner {
    fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            STATE_CONNECTING => ConnectionState::Connecting,
            STATE_CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::Disconnected => STATE_DISCONNECTED,
            ConnectionState::Connecting => STATE_CONNECTING,
            ConnectionState::Connected => STATE_CONNECTED,
        };
        self.state.store(raw, Ordering::Release);
    }

    // Caller must hold the connect gate.
    async fn connect_once(self: &Arc<Self>, epoch: u64) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        match self.transport.connect(&self.endpoint, &self.config.setup).await {
            Ok(socket) => {
                *self.socket.lock().await = Some(Arc::clone(&socket));
                self.set_state(ConnectionState::Connected);
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                debug!(endpoint = %self.endpoint, "established streaming connection");
                let handle = spawn_watchdog(Arc::clone(self), socket, epoch);
                self.store_watchdog(handle);
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                error!(endpoint = %self.endpoint, error = %err, "connection attempt failed");
                Err(ClientError::Connection(err))
            }
        }
    }

    fn teardown_subscriptions(&self) {
        for (id, mut entry) in self.registry.remove_all() {
            entry.cancelled.store(true, Ordering::Release);
            entry.cancel.cancel();
            debug!(%id, route = %entry.route, "subscription cancelled by teardown");
        }
    }

    fn store_watchdog(&self, handle: JoinHandle<()>) {
        let mut slot = self
            .watchdog
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn abort_watchdog(&self) {
        let mut slot = self
            .watchdog
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

fn spawn_watchdog(
    inner: Arc<SessionInner>,
    socket: Arc<dyn StreamSocket>,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = socket.closed().await;
        if inner.epoch.load(Ordering::Acquire) != epoch {
            // A newer connect or a disconnect superseded this connection.
            return;
        }
        warn!(error = %reason, "streaming connection lost");
        inner.set_state(ConnectionState::Disconnected);
        inner.teardown_subscriptions();
        let _ = inner.socket.lock().await.take();
        run_reconnect_schedule(inner, epoch).await;
    })
}

// Bounded reconnect schedule after losing an established connection: up to
// `reconnect_max_attempts` tries spaced by the fixed `reconnect_delay`. When
// exhausted, the session stays `Disconnected` until an explicit connect.
async fn run_reconnect_schedule(inner: Arc<SessionInner>, epoch: u64) {
    let max_attempts = inner.config.reconnect_max_attempts;
    loop {
        if inner.reconnect_attempts.load(Ordering::Relaxed) >= max_attempts {
            error!(max_attempts, "reconnect attempts exhausted; staying disconnected");
            return;
        }
        tokio::time::sleep(inner.config.reconnect_delay).await;
        if inner.epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        let _gate = inner.connect_gate.lock().await;
        if inner.epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        if inner.state() == ConnectionState::Connected {
            return;
        }
        let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(attempt, max_attempts, "reconnection attempt");
        #[cfg(feature = "telemetry")]
        frame_counters()
            .reconnect_attempts
            .fetch_add(1, Ordering::Relaxed);
        t_counter!("sqlmon_client_reconnect_attempts_total").increment(1);
        match inner.connect_once(epoch).await {
            Ok(()) => return,
            Err(err) => {
                debug!(attempt, error = %err, "reconnection attempt failed");
            }
        }
    }
}
