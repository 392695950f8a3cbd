// Transport adapter boundary for the sqlmon streaming client.
//
// The client never owns a socket. It talks to an injected adapter through the
// traits below: one `connect` per physical connection, one `open_stream` per
// logical metric feed, request-stream semantics (one request, an ordered
// stream of payload frames until error, completion, or cancellation).
//
// Frames for a single stream arrive in transport order; nothing is guaranteed
// across distinct streams. Cancellation is best-effort: a frame already
// queued when cancel is requested may still be delivered once.
use async_trait::async_trait;
use bytes::Bytes;
use sqlmon_wire::setup::SetupParams;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub mod inprocess;

pub use inprocess::{InProcessTransport, TransportController};

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("connection closed")]
    Closed,
    #[error("stream refused: {0}")]
    StreamRefused(String),
}

/// One request-stream operation issued on a live connection.
#[derive(Debug)]
pub struct StreamRequest {
    /// Length-prefixed route metadata addressing one logical feed.
    pub metadata: Bytes,
    /// Optional request payload; metric feeds send none.
    pub data: Option<Bytes>,
    /// Demand signalled to the producer up front.
    pub demand: u32,
    /// Receive-buffer size for the delivery channel. The adapter's bounded
    /// channel is the flow-control seam for slow consumers.
    pub queue_capacity: usize,
}

/// One inbound frame event on a request-stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// A payload frame; for metric feeds, UTF-8 JSON text.
    Payload(Bytes),
    /// Terminal stream failure. No further events follow.
    Error(String),
    /// Normal stream completion. No further events follow.
    Complete,
}

/// Receiving side of one opened request-stream.
#[derive(Debug)]
pub struct InboundStream {
    /// Ordered event channel; closes without a terminal event when the
    /// connection drops or the stream is cancelled.
    pub events: mpsc::Receiver<StreamEvent>,
    /// Best-effort cancellation handle for this stream.
    pub cancel: StreamCancel,
}

/// Idempotent, best-effort cancellation handle for one request-stream.
///
/// ```
/// use sqlmon_transport::StreamCancel;
///
/// let (mut cancel, mut signal) = StreamCancel::new();
/// cancel.cancel();
/// cancel.cancel(); // second call is a no-op
/// assert!(signal.try_recv().is_ok());
/// ```
#[derive(Debug)]
pub struct StreamCancel {
    signal: Option<oneshot::Sender<()>>,
}

impl StreamCancel {
    /// Create a handle plus the receiver the adapter listens on.
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { signal: Some(tx) }, rx)
    }

    /// Request cancellation. Subsequent calls are no-ops.
    pub fn cancel(&mut self) {
        if let Some(signal) = self.signal.take() {
            let _ = signal.send(());
        }
    }
}

/// Factory for physical connections; the only way the client reaches a server.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Establish one physical connection and perform the setup handshake.
    async fn connect(&self, endpoint: &str, setup: &SetupParams) -> Result<Arc<dyn StreamSocket>>;
}

/// One live multiplexed connection.
#[async_trait]
pub trait StreamSocket: Send + Sync + 'static + std::fmt::Debug {
    /// Issue a request-stream operation addressed by route metadata.
    async fn open_stream(&self, request: StreamRequest) -> Result<InboundStream>;

    /// Resolves once the connection is gone, with the reason.
    async fn closed(&self) -> TransportError;

    /// Close the connection. All open streams end without a terminal event.
    async fn close(&self);
}
