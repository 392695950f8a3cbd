// In-process transport adapter.
//
// Serves the same role the reference in-process client flavor does: tests,
// demos, and embedding a fake metrics server into a single process. A
// `TransportController` scripts the server side: connect outcomes, frame
// injection, stream failure/completion, and connection loss.
use async_trait::async_trait;
use bytes::Bytes;
use sqlmon_wire::routing;
use sqlmon_wire::setup::SetupParams;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{
    InboundStream, Result, StreamCancel, StreamEvent, StreamRequest, StreamSocket,
    StreamTransport, TransportError,
};

/// In-memory transport; clones share one scripted server.
///
/// ```
/// use sqlmon_transport::InProcessTransport;
///
/// let transport = InProcessTransport::new();
/// let controller = transport.controller();
/// assert_eq!(controller.connect_attempts(), 0);
/// ```
#[derive(Clone, Default)]
pub struct InProcessTransport {
    shared: Arc<Shared>,
}

/// Scripting handle for the server side of an [`InProcessTransport`].
#[derive(Clone)]
pub struct TransportController {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    connect_attempts: AtomicUsize,
    fail_connects: AtomicUsize,
    current: Mutex<Option<Arc<SocketShared>>>,
    last_setup: Mutex<Option<SetupParams>>,
}

#[derive(Debug)]
struct SocketShared {
    streams: Mutex<Vec<Arc<OpenStream>>>,
    closed: watch::Sender<Option<TransportError>>,
}

#[derive(Debug)]
struct OpenStream {
    route: String,
    sender: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    cancelled: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controller(&self) -> TransportController {
        TransportController {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl StreamTransport for InProcessTransport {
    async fn connect(&self, endpoint: &str, setup: &SetupParams) -> Result<Arc<dyn StreamSocket>> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self
            .shared
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            })
            .is_ok();
        if scripted_failure {
            return Err(TransportError::ConnectFailed(format!(
                "scripted connect failure to {endpoint}"
            )));
        }
        *lock(&self.shared.last_setup) = Some(setup.clone());
        let socket = Arc::new(SocketShared {
            streams: Mutex::new(Vec::new()),
            closed: watch::channel(None).0,
        });
        *lock(&self.shared.current) = Some(Arc::clone(&socket));
        debug!(endpoint, "in-process connection established");
        Ok(Arc::new(InProcessSocket { shared: socket }))
    }
}

#[derive(Debug)]
struct InProcessSocket {
    shared: Arc<SocketShared>,
}

#[async_trait]
impl StreamSocket for InProcessSocket {
    async fn open_stream(&self, request: StreamRequest) -> Result<InboundStream> {
        if self.shared.closed.borrow().is_some() {
            return Err(TransportError::Closed);
        }
        let route = routing::decode_route(&request.metadata)
            .map_err(|err| TransportError::StreamRefused(err.to_string()))?;
        let (tx, rx) = mpsc::channel(request.queue_capacity.max(1));
        let (cancel, cancel_signal) = StreamCancel::new();
        let stream = Arc::new(OpenStream {
            route,
            sender: Mutex::new(Some(tx)),
            cancelled: AtomicBool::new(false),
        });
        let watcher = Arc::clone(&stream);
        tokio::spawn(async move {
            // Only an explicit cancel stops production; a dropped handle
            // leaves the stream running until the connection closes.
            if cancel_signal.await.is_ok() {
                watcher.cancelled.store(true, Ordering::Release);
                lock(&watcher.sender).take();
            }
        });
        lock(&self.shared.streams).push(stream);
        Ok(InboundStream { events: rx, cancel })
    }

    async fn closed(&self) -> TransportError {
        let mut watcher = self.shared.closed.subscribe();
        let reason = match watcher.wait_for(|state| state.is_some()).await {
            Ok(state) => state.clone().unwrap_or(TransportError::Closed),
            Err(_) => TransportError::Closed,
        };
        reason
    }

    async fn close(&self) {
        self.shared.shutdown(TransportError::Closed);
    }
}

impl SocketShared {
    fn shutdown(&self, reason: TransportError) {
        // First shutdown reason wins; repeated closes stay no-ops.
        self.closed.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(reason);
            true
        });
        for stream in lock(&self.streams).iter() {
            lock(&stream.sender).take();
        }
    }
}

impl TransportController {
    /// Total `connect` calls observed, successes and scripted failures alike.
    pub fn connect_attempts(&self) -> usize {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Make the next `count` connect calls fail. Pass `usize::MAX` to fail
    /// every connect until [`allow_connects`](Self::allow_connects).
    pub fn fail_next_connects(&self, count: usize) {
        self.shared.fail_connects.store(count, Ordering::SeqCst);
    }

    pub fn allow_connects(&self) {
        self.shared.fail_connects.store(0, Ordering::SeqCst);
    }

    /// Setup parameters presented by the most recent successful connect.
    pub fn last_setup(&self) -> Option<SetupParams> {
        lock(&self.shared.last_setup).clone()
    }

    /// Kill the live connection; open streams end without a terminal event.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(socket) = lock(&self.shared.current).clone() {
            socket.shutdown(TransportError::ConnectionLost(reason.to_string()));
        }
    }

    /// Push one JSON payload frame into the first live stream for `route`.
    /// Returns false when no such stream exists.
    pub async fn push_json(&self, route: &str, payload: &str) -> bool {
        self.push_frame(route, Bytes::copy_from_slice(payload.as_bytes()))
            .await
    }

    pub async fn push_frame(&self, route: &str, payload: Bytes) -> bool {
        match self.live_sender(route) {
            Some(tx) => tx.send(StreamEvent::Payload(payload)).await.is_ok(),
            None => false,
        }
    }

    /// Terminate one stream with an error frame.
    pub async fn fail_stream(&self, route: &str, message: &str) -> bool {
        let Some(stream) = self.live_stream(route) else {
            return false;
        };
        let Some(tx) = lock(&stream.sender).clone() else {
            return false;
        };
        let sent = tx
            .send(StreamEvent::Error(message.to_string()))
            .await
            .is_ok();
        lock(&stream.sender).take();
        sent
    }

    /// Complete one stream normally.
    pub async fn complete_stream(&self, route: &str) -> bool {
        let Some(stream) = self.live_stream(route) else {
            return false;
        };
        let Some(tx) = lock(&stream.sender).clone() else {
            return false;
        };
        let sent = tx.send(StreamEvent::Complete).await.is_ok();
        lock(&stream.sender).take();
        sent
    }

    /// Routes of streams still accepting frames.
    pub fn open_routes(&self) -> Vec<String> {
        let Some(socket) = lock(&self.shared.current).clone() else {
            return Vec::new();
        };
        let routes = lock(&socket.streams)
            .iter()
            .filter(|stream| lock(&stream.sender).is_some())
            .map(|stream| stream.route.clone())
            .collect();
        routes
    }

    /// Whether any stream for `route` has observed a cancel request.
    pub fn is_cancelled(&self, route: &str) -> bool {
        let Some(socket) = lock(&self.shared.current).clone() else {
            return false;
        };
        let cancelled = lock(&socket.streams)
            .iter()
            .any(|stream| stream.route == route && stream.cancelled.load(Ordering::Acquire));
        cancelled
    }

    fn live_stream(&self, route: &str) -> Option<Arc<OpenStream>> {
        let socket = lock(&self.shared.current).clone()?;
        let streams = lock(&socket.streams);
        streams
            .iter()
            .find(|stream| {
                stream.route == route
                    && !stream.cancelled.load(Ordering::Acquire)
                    && lock(&stream.sender).is_some()
            })
            .map(Arc::clone)
    }

    fn live_sender(&self, route: &str) -> Option<mpsc::Sender<StreamEvent>> {
        let stream = self.live_stream(route)?;
        let sender = lock(&stream.sender).clone();
        sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlmon_wire::MAX_DEMAND;

    fn request(route: &str) -> StreamRequest {
        StreamRequest {
            metadata: routing::encode_route(route).expect("encode"),
            data: None,
            demand: MAX_DEMAND,
            queue_capacity: 16,
        }
    }

    #[tokio::test]
    async fn connect_open_and_push() {
        let transport = InProcessTransport::new();
        let controller = transport.controller();
        let socket = transport
            .connect("inproc://monitor", &SetupParams::default())
            .await
            .expect("connect");
        assert_eq!(controller.connect_attempts(), 1);
        assert_eq!(
            controller.last_setup().expect("setup").data_mime_type,
            "application/json"
        );

        let mut stream = socket.open_stream(request("qps/3")).await.expect("open");
        assert!(controller.push_json("qps/3", r#"{"qps": 1}"#).await);
        match stream.events.recv().await {
            Some(StreamEvent::Payload(bytes)) => {
                assert_eq!(bytes.as_ref(), br#"{"qps": 1}"#);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scripted_connect_failures() {
        let transport = InProcessTransport::new();
        let controller = transport.controller();
        controller.fail_next_connects(2);
        for _ in 0..2 {
            let err = transport
                .connect("inproc://monitor", &SetupParams::default())
                .await
                .expect_err("scripted failure");
            assert!(matches!(err, TransportError::ConnectFailed(_)));
        }
        assert!(
            transport
                .connect("inproc://monitor", &SetupParams::default())
                .await
                .is_ok()
        );
        assert_eq!(controller.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn cancel_stops_delivery() {
        let transport = InProcessTransport::new();
        let controller = transport.controller();
        let socket = transport
            .connect("inproc://monitor", &SetupParams::default())
            .await
            .expect("connect");
        let mut stream = socket.open_stream(request("qps/3")).await.expect("open");
        stream.cancel.cancel();
        // Wait for the cancel watcher to drop the producer.
        while !controller.is_cancelled("qps/3") {
            tokio::task::yield_now().await;
        }
        assert!(!controller.push_json("qps/3", r#"{"qps": 1}"#).await);
        assert!(stream.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn drop_connection_resolves_closed_and_ends_streams() {
        let transport = InProcessTransport::new();
        let controller = transport.controller();
        let socket = transport
            .connect("inproc://monitor", &SetupParams::default())
            .await
            .expect("connect");
        let mut stream = socket.open_stream(request("qps/3")).await.expect("open");

        controller.drop_connection("link reset");
        let reason = socket.closed().await;
        assert!(matches!(reason, TransportError::ConnectionLost(_)));
        // The stream channel ends without a terminal event.
        assert!(stream.events.recv().await.is_none());
        // Further stream opens are refused.
        let err = socket.open_stream(request("qps/3")).await.expect_err("closed");
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn open_stream_rejects_bad_metadata() {
        let transport = InProcessTransport::new();
        let socket = transport
            .connect("inproc://monitor", &SetupParams::default())
            .await
            .expect("connect");
        let err = socket
            .open_stream(StreamRequest {
                metadata: Bytes::from_static(b"\x09qps"),
                data: None,
                demand: MAX_DEMAND,
                queue_capacity: 16,
            })
            .await
            .expect_err("bad metadata");
        assert!(matches!(err, TransportError::StreamRefused(_)));
    }
}
