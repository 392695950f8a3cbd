// Client-facing error taxonomy.
use sqlmon_transport::TransportError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Handshake or transport-level failure. Recoverable through the bounded
    /// reconnect policy; terminal once attempts are exhausted.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// Route does not fit the one-byte metadata length prefix. Fails the
    /// subscribe call synchronously; no subscription is created.
    #[error("route encoding error: {0}")]
    Encoding(#[from] sqlmon_wire::Error),

    /// Terminal failure of one subscription's feed. Never escalated past that
    /// subscription.
    #[error("stream error: {0}")]
    Stream(String),

    /// One malformed payload frame. The stream stays open.
    #[error("frame decode error: {0}")]
    FrameDecode(#[source] serde_json::Error),

    /// A stream was requested while the session is not connected.
    #[error("not connected")]
    NotConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_convert() {
        let err: ClientError = TransportError::Closed.into();
        assert!(matches!(err, ClientError::Connection(_)));
    }

    #[test]
    fn encoding_errors_convert() {
        let wire_err = sqlmon_wire::routing::encode_route(&"x".repeat(300)).expect_err("too long");
        let err: ClientError = wire_err.into();
        assert!(matches!(err, ClientError::Encoding(_)));
    }
}
