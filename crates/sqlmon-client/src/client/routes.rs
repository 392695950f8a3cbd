// Route construction for the metric feeds the server exposes.
use sqlmon_wire::indicator::SizeUnit;
use std::fmt;

/// One typed metric feed request, rendered into its route string.
///
/// ```
/// use sqlmon_client::client::routes::MetricRoute;
/// use sqlmon_wire::indicator::SizeUnit;
///
/// let route = MetricRoute::NetworkTraffic { unit: SizeUnit::KB, interval_secs: 3 };
/// assert_eq!(route.to_string(), "network-traffic/KB/3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricRoute {
    Qps { interval_secs: u32 },
    NetworkTraffic { unit: SizeUnit, interval_secs: u32 },
    ConnectionUsage { interval_secs: u32 },
    CacheHitRate { interval_secs: u32 },
}

impl fmt::Display for MetricRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricRoute::Qps { interval_secs } => write!(f, "qps/{interval_secs}"),
            MetricRoute::NetworkTraffic {
                unit,
                interval_secs,
            } => write!(f, "network-traffic/{unit}/{interval_secs}"),
            MetricRoute::ConnectionUsage { interval_secs } => {
                write!(f, "connection-usage/{interval_secs}")
            }
            MetricRoute::CacheHitRate { interval_secs } => {
                write!(f, "cache-hit-rate/{interval_secs}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_render_exactly() {
        assert_eq!(MetricRoute::Qps { interval_secs: 3 }.to_string(), "qps/3");
        assert_eq!(
            MetricRoute::NetworkTraffic {
                unit: SizeUnit::GB,
                interval_secs: 60
            }
            .to_string(),
            "network-traffic/GB/60"
        );
        assert_eq!(
            MetricRoute::ConnectionUsage { interval_secs: 5 }.to_string(),
            "connection-usage/5"
        );
        assert_eq!(
            MetricRoute::CacheHitRate { interval_secs: 3 }.to_string(),
            "cache-hit-rate/3"
        );
    }
}
