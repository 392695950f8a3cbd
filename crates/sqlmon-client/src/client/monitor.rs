// Monitor client facade: typed subscribe calls per metric kind.
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

use sqlmon_transport::StreamTransport;
use sqlmon_wire::indicator::{
    CacheHitRateSample, ConnectionUsageSample, NetworkTrafficSample, QpsSample, SizeUnit,
};

use crate::client::routes::MetricRoute;
use crate::client::session::StreamSession;
use crate::client::subscription::{CompleteFn, ErrorFn, SubscriberCallbacks, SubscriptionId};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Typed callback triple for one metric feed.
///
/// `on_data` receives decoded samples; `on_error` and `on_complete` are
/// optional, exactly as on the raw session API.
pub struct MetricSubscriber<T> {
    on_data: Box<dyn FnMut(T) + Send>,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
}

impl<T> MetricSubscriber<T> {
    pub fn new(on_data: impl FnMut(T) + Send + 'static) -> Self {
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

/// Client for subscribing to database health metric feeds.
///
/// Wraps one [`StreamSession`] and renders typed metric requests into route
/// strings. After a connection loss the session reconnects on its own (up to
/// the configured attempts) but does NOT replay subscriptions; callers that
/// still want a feed re-issue the subscribe call, which the server treats as
/// idempotent.
#[derive(Clone)]
pub struct SqlMonitorClient {
    session: StreamSession,
}

impl SqlMonitorClient {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        endpoint: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            session: StreamSession::new(transport, endpoint, config),
        }
    }

    /// Connect, reporting success as a boolean instead of propagating the
    /// connection error; the failure detail goes to the log.
    pub async fn initialize(&self) -> bool {
        match self.session.connect().await {
            Ok(()) => {
                debug!("monitor client initialized");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to initialize monitor client");
                false
            }
        }
    }

    /// Subscribe to the query-per-second feed sampled every `interval_secs`.
    pub async fn subscribe_qps(
        &self,
        interval_secs: u32,
        subscriber: MetricSubscriber<QpsSample>,
    ) -> Result<SubscriptionId> {
        self.subscribe_typed(MetricRoute::Qps { interval_secs }, subscriber)
            .await
    }

    /// Subscribe to the network throughput feed in `unit`.
    pub async fn subscribe_network_traffic(
        &self,
        unit: SizeUnit,
        interval_secs: u32,
        subscriber: MetricSubscriber<NetworkTrafficSample>,
    ) -> Result<SubscriptionId> {
        self.subscribe_typed(
            MetricRoute::NetworkTraffic {
                unit,
                interval_secs,
            },
            subscriber,
        )
        .await
    }

    /// Subscribe to the connection pool usage feed.
    pub async fn subscribe_connection_usage(
        &self,
        interval_secs: u32,
        subscriber: MetricSubscriber<ConnectionUsageSample>,
    ) -> Result<SubscriptionId> {
        self.subscribe_typed(MetricRoute::ConnectionUsage { interval_secs }, subscriber)
            .await
    }

    /// Subscribe to the buffer cache hit rate feed.
    pub async fn subscribe_cache_hit_rate(
        &self,
        interval_secs: u32,
        subscriber: MetricSubscriber<CacheHitRateSample>,
    ) -> Result<SubscriptionId> {
        self.subscribe_typed(MetricRoute::CacheHitRate { interval_secs }, subscriber)
            .await
    }

    /// Cancel one feed. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.session.cancel(id);
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    pub fn connection_status(&self) -> bool {
        self.session.is_connected()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.session.subscription_count()
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    async fn subscribe_typed<T>(
        &self,
        route: MetricRoute,
        subscriber: MetricSubscriber<T>,
    ) -> Result<SubscriptionId>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let MetricSubscriber {
            mut on_data,
            on_error,
            on_complete,
        } = subscriber;

        // The error callback serves two producers: session-level stream and
        // parse errors, and typed decode failures found right here. Both a
        // wrong-shaped and a non-JSON frame leave the feed running.
        let shared_error: Arc<Mutex<Option<ErrorFn>>> = Arc::new(Mutex::new(on_error));
        let decode_error = Arc::clone(&shared_error);
        let mut callbacks = SubscriberCallbacks::new(move |value| {
            match serde_json::from_value::<T>(value) {
                Ok(sample) => on_data(sample),
                Err(err) => {
                    let mut slot = decode_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if let Some(on_error) = slot.as_mut() {
                        on_error(ClientError::FrameDecode(err));
                    }
                }
            }
        })
        .on_error(move |err| {
            let mut slot = shared_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(on_error) = slot.as_mut() {
                on_error(err);
            }
        });
        if let Some(on_complete) = on_complete {
            callbacks = callbacks.on_complete(on_complete);
        }
        self.session.open_stream(&route.to_string(), callbacks).await
    }
}
