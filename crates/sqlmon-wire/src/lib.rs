// Wire-level protocol data for the sqlmon streaming client: route metadata
// framing, setup handshake parameters, and typed indicator payloads.
use std::time::Duration;

/// Maximum UTF-8 byte length of a route string. The metadata frame carries a
/// one-byte length prefix, so longer routes cannot be represented on the wire.
pub const MAX_ROUTE_BYTES: usize = 255;

/// Maximum representable request-stream demand. The client signals the full
/// demand up front and leaves flow control to the transport.
pub const MAX_DEMAND: u32 = 2_147_483_647;

/// MIME type of stream payloads: UTF-8 JSON text, parsed per frame.
pub const DATA_MIME_TYPE: &str = "application/json";

/// MIME type of the route metadata frame.
pub const METADATA_MIME_TYPE: &str = "message/x.rsocket.routing.v0";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("route is {0} bytes; the one-byte length prefix caps routes at {MAX_ROUTE_BYTES}")]
    RouteTooLong(usize),
    #[error("incomplete route metadata")]
    Incomplete,
    #[error("route metadata length mismatch: declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("route is not valid UTF-8")]
    InvalidRoute,
    #[error("unknown size unit: {0}")]
    UnknownUnit(String),
    #[error("failed to deserialize payload")]
    Deserialize(#[source] serde_json::Error),
}

pub mod routing {
    //! Route metadata framing: `[1 byte route length][UTF-8 route bytes]`.
    use super::{Error, MAX_ROUTE_BYTES, Result};
    use bytes::{BufMut, Bytes, BytesMut};

    /// Encode a route into its length-prefixed metadata frame.
    ///
    /// Fails fast on routes longer than [`MAX_ROUTE_BYTES`]; routes are never
    /// silently truncated.
    ///
    /// ```
    /// use sqlmon_wire::routing::encode_route;
    ///
    /// let metadata = encode_route("qps/3").expect("encode");
    /// assert_eq!(metadata.as_ref(), b"\x05qps/3");
    /// ```
    pub fn encode_route(route: &str) -> Result<Bytes> {
        let route_bytes = route.as_bytes();
        if route_bytes.len() > MAX_ROUTE_BYTES {
            return Err(Error::RouteTooLong(route_bytes.len()));
        }
        let mut buf = BytesMut::with_capacity(1 + route_bytes.len());
        buf.put_u8(route_bytes.len() as u8);
        buf.extend_from_slice(route_bytes);
        Ok(buf.freeze())
    }

    /// Decode a length-prefixed metadata frame back into the route string.
    ///
    /// The declared length must match the remaining bytes exactly; a metadata
    /// frame addresses exactly one route.
    pub fn decode_route(buf: &[u8]) -> Result<String> {
        let Some((&len, rest)) = buf.split_first() else {
            return Err(Error::Incomplete);
        };
        let declared = len as usize;
        if rest.len() != declared {
            return Err(Error::LengthMismatch {
                declared,
                actual: rest.len(),
            });
        }
        std::str::from_utf8(rest)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidRoute)
    }
}

pub mod setup {
    //! Setup handshake parameters exchanged when a connection is established.
    use super::{DATA_MIME_TYPE, Duration, METADATA_MIME_TYPE};

    /// Interval between client keep-alive frames.
    pub const KEEP_ALIVE: Duration = Duration::from_millis(60_000);
    /// How long the server keeps the session alive without keep-alives.
    pub const LIFETIME: Duration = Duration::from_millis(180_000);

    /// Parameters for the connection setup handshake.
    ///
    /// ```
    /// use sqlmon_wire::setup::SetupParams;
    ///
    /// let setup = SetupParams::default();
    /// assert_eq!(setup.keep_alive.as_millis(), 60_000);
    /// assert_eq!(setup.data_mime_type, "application/json");
    /// ```
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SetupParams {
        pub keep_alive: Duration,
        pub lifetime: Duration,
        pub data_mime_type: String,
        pub metadata_mime_type: String,
    }

    impl Default for SetupParams {
        fn default() -> Self {
            Self {
                keep_alive: KEEP_ALIVE,
                lifetime: LIFETIME,
                data_mime_type: DATA_MIME_TYPE.to_string(),
                metadata_mime_type: METADATA_MIME_TYPE.to_string(),
            }
        }
    }
}

pub mod indicator {
    //! Typed indicator payloads, one per metric kind.
    //!
    //! Payloads arrive as UTF-8 JSON with camelCase field names; each kind has
    //! an explicit shape so malformed frames surface as typed decode errors
    //! instead of ad-hoc lookup failures.
    use super::{Error, Result};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;

    /// Unit used when reporting network throughput.
    #[allow(clippy::upper_case_acronyms)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum SizeUnit {
        B,
        KB,
        MB,
        GB,
    }

    impl SizeUnit {
        pub fn as_str(&self) -> &'static str {
            match self {
                SizeUnit::B => "B",
                SizeUnit::KB => "KB",
                SizeUnit::MB => "MB",
                SizeUnit::GB => "GB",
            }
        }
    }

    impl fmt::Display for SizeUnit {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for SizeUnit {
        type Err = Error;

        fn from_str(input: &str) -> Result<Self> {
            match input {
                "B" => Ok(SizeUnit::B),
                "KB" => Ok(SizeUnit::KB),
                "MB" => Ok(SizeUnit::MB),
                "GB" => Ok(SizeUnit::GB),
                other => Err(Error::UnknownUnit(other.to_string())),
            }
        }
    }

    /// Query-per-second sample.
    ///
    /// Only `qps` is guaranteed; the remaining fields default when the server
    /// sends a reduced payload.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct QpsSample {
        pub qps: f64,
        #[serde(default)]
        pub current_queries: i64,
        #[serde(default)]
        pub query_diff: Option<i64>,
        #[serde(default)]
        pub time_diff_ms: Option<i64>,
        #[serde(default)]
        pub reset_detected: bool,
        #[serde(default)]
        pub error: bool,
    }

    /// Network throughput sample in the unit requested by the route.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct NetworkTrafficSample {
        pub total_bytes_sent: i64,
        pub total_bytes_receive: i64,
        pub receive_per_sec: f64,
        pub sent_per_sec: f64,
        #[serde(default)]
        pub query_diff: i64,
        pub size_unit: SizeUnit,
        #[serde(default)]
        pub reset_detected: bool,
        #[serde(default)]
        pub error: bool,
    }

    /// Connection pool usage sample.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConnectionUsageSample {
        pub max_connections: u32,
        pub current_connections: u32,
        pub connect_usage_percent: f64,
    }

    /// Buffer cache hit rate sample.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CacheHitRateSample {
        pub cache_hit_rate: f64,
        #[serde(default)]
        pub query_diff: i64,
        #[serde(default)]
        pub reset_detected: bool,
        #[serde(default)]
        pub used_previous_result: bool,
        #[serde(default)]
        pub error: bool,
    }

    /// The metric kinds the server exposes as streaming feeds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum IndicatorKind {
        Qps,
        NetworkTraffic,
        ConnectionUsage,
        CacheHitRate,
    }

    impl IndicatorKind {
        /// Route segment identifying this metric feed.
        pub fn route_prefix(&self) -> &'static str {
            match self {
                IndicatorKind::Qps => "qps",
                IndicatorKind::NetworkTraffic => "network-traffic",
                IndicatorKind::ConnectionUsage => "connection-usage",
                IndicatorKind::CacheHitRate => "cache-hit-rate",
            }
        }
    }

    /// One decoded indicator frame, tagged by metric kind.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Indicator {
        Qps(QpsSample),
        NetworkTraffic(NetworkTrafficSample),
        ConnectionUsage(ConnectionUsageSample),
        CacheHitRate(CacheHitRateSample),
    }

    /// Decode a JSON value into the sample type for one metric kind.
    pub fn decode_indicator(kind: IndicatorKind, value: serde_json::Value) -> Result<Indicator> {
        match kind {
            IndicatorKind::Qps => decode_sample(value).map(Indicator::Qps),
            IndicatorKind::NetworkTraffic => decode_sample(value).map(Indicator::NetworkTraffic),
            IndicatorKind::ConnectionUsage => decode_sample(value).map(Indicator::ConnectionUsage),
            IndicatorKind::CacheHitRate => decode_sample(value).map(Indicator::CacheHitRate),
        }
    }

    /// Decode a JSON value into a concrete sample type.
    ///
    /// ```
    /// use sqlmon_wire::indicator::{decode_sample, QpsSample};
    ///
    /// let value = serde_json::json!({"qps": 120.0, "currentQueries": 42});
    /// let sample: QpsSample = decode_sample(value).expect("decode");
    /// assert_eq!(sample.qps, 120.0);
    /// assert_eq!(sample.current_queries, 42);
    /// ```
    pub fn decode_sample<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
        serde_json::from_value(value).map_err(Error::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::indicator::{
        CacheHitRateSample, NetworkTrafficSample, QpsSample, SizeUnit, decode_sample,
    };
    use super::routing::{decode_route, encode_route};
    use super::setup::SetupParams;
    use super::*;

    #[test]
    fn route_round_trip() {
        // Encoding then decoding should preserve the route string.
        let metadata = encode_route("network-traffic/KB/3").expect("encode");
        assert_eq!(metadata[0] as usize, "network-traffic/KB/3".len());
        let decoded = decode_route(&metadata).expect("decode");
        assert_eq!(decoded, "network-traffic/KB/3");
    }

    #[test]
    fn route_round_trip_multibyte_utf8() {
        let route = "qps/\u{00e9}\u{00e9}";
        let metadata = encode_route(route).expect("encode");
        assert_eq!(metadata[0] as usize, route.len());
        assert_eq!(decode_route(&metadata).expect("decode"), route);
    }

    #[test]
    fn route_at_limit_encodes() {
        let route = "q".repeat(MAX_ROUTE_BYTES);
        let metadata = encode_route(&route).expect("encode");
        assert_eq!(metadata.len(), 1 + MAX_ROUTE_BYTES);
        assert_eq!(decode_route(&metadata).expect("decode"), route);
    }

    #[test]
    fn route_over_limit_is_rejected() {
        let route = "q".repeat(MAX_ROUTE_BYTES + 1);
        let err = encode_route(&route).expect_err("too long");
        assert!(matches!(err, Error::RouteTooLong(len) if len == MAX_ROUTE_BYTES + 1));
    }

    #[test]
    fn decode_rejects_empty_metadata() {
        let err = decode_route(&[]).expect_err("empty");
        assert!(matches!(err, Error::Incomplete));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let err = decode_route(b"\x05qps").expect_err("short");
        assert!(matches!(
            err,
            Error::LengthMismatch {
                declared: 5,
                actual: 3
            }
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = decode_route(&[2, 0xFF, 0xFE]).expect_err("invalid utf8");
        assert!(matches!(err, Error::InvalidRoute));
    }

    #[test]
    fn setup_defaults_match_protocol() {
        let setup = SetupParams::default();
        assert_eq!(setup.keep_alive.as_millis(), 60_000);
        assert_eq!(setup.lifetime.as_millis(), 180_000);
        assert_eq!(setup.data_mime_type, DATA_MIME_TYPE);
        assert_eq!(setup.metadata_mime_type, METADATA_MIME_TYPE);
    }

    #[test]
    fn size_unit_round_trip() {
        for unit in [SizeUnit::B, SizeUnit::KB, SizeUnit::MB, SizeUnit::GB] {
            let parsed: SizeUnit = unit.as_str().parse().expect("parse");
            assert_eq!(parsed, unit);
        }
        assert!("TB".parse::<SizeUnit>().is_err());
    }

    #[test]
    fn qps_sample_decodes_reduced_payload() {
        // Servers may send only the headline value; everything else defaults.
        let sample: QpsSample = decode_sample(serde_json::json!({"qps": 120})).expect("decode");
        assert_eq!(sample.qps, 120.0);
        assert_eq!(sample.current_queries, 0);
        assert_eq!(sample.query_diff, None);
        assert!(!sample.reset_detected);
        assert!(!sample.error);
    }

    #[test]
    fn network_traffic_sample_decodes_camel_case() {
        let value = serde_json::json!({
            "totalBytesSent": 1024,
            "totalBytesReceive": 2048,
            "receivePerSec": 12.5,
            "sentPerSec": 6.25,
            "queryDiff": 3000,
            "sizeUnit": "KB"
        });
        let sample: NetworkTrafficSample = decode_sample(value).expect("decode");
        assert_eq!(sample.total_bytes_sent, 1024);
        assert_eq!(sample.total_bytes_receive, 2048);
        assert_eq!(sample.size_unit, SizeUnit::KB);
        assert!(!sample.reset_detected);
    }

    #[test]
    fn cache_hit_rate_sample_rejects_wrong_shape() {
        let err = decode_sample::<CacheHitRateSample>(serde_json::json!({"cacheHitRate": "high"}))
            .expect_err("wrong type");
        assert!(matches!(err, Error::Deserialize(_)));
    }
}
