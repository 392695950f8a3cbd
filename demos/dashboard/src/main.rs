// Demo: subscribe to all four metric feeds over the in-process transport and
// print a few ticks of synthetic server data.
use anyhow::Result;
use sqlmon_client::{ClientConfig, MetricSubscriber, SqlMonitorClient};
use sqlmon_transport::InProcessTransport;
use sqlmon_wire::indicator::{
    CacheHitRateSample, ConnectionUsageSample, NetworkTrafficSample, QpsSample, SizeUnit,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let transport = InProcessTransport::new();
    let controller = transport.controller();
    let client = SqlMonitorClient::new(
        Arc::new(transport),
        "inproc://monitor",
        ClientConfig::from_env_or_yaml(None)?,
    );
    anyhow::ensure!(client.initialize().await, "failed to connect");

    let qps_id = client
        .subscribe_qps(
            3,
            MetricSubscriber::new(|sample: QpsSample| {
                info!(qps = sample.qps, queries = sample.current_queries, "qps");
            })
            .on_error(|err| warn!(error = %err, "qps feed error")),
        )
        .await?;
    client
        .subscribe_network_traffic(
            SizeUnit::KB,
            3,
            MetricSubscriber::new(|sample: NetworkTrafficSample| {
                info!(
                    sent_per_sec = sample.sent_per_sec,
                    receive_per_sec = sample.receive_per_sec,
                    unit = %sample.size_unit,
                    "network traffic"
                );
            }),
        )
        .await?;
    client
        .subscribe_connection_usage(
            3,
            MetricSubscriber::new(|sample: ConnectionUsageSample| {
                info!(
                    current = sample.current_connections,
                    max = sample.max_connections,
                    usage = sample.connect_usage_percent,
                    "connection usage"
                );
            }),
        )
        .await?;
    client
        .subscribe_cache_hit_rate(
            3,
            MetricSubscriber::new(|sample: CacheHitRateSample| {
                info!(hit_rate = sample.cache_hit_rate, "cache hit rate");
            }),
        )
        .await?;

    // Synthetic server ticks.
    for tick in 0..5u32 {
        controller
            .push_json(
                "qps/3",
                &format!(
                    r#"{{"qps": {}, "currentQueries": {}}}"#,
                    100 + tick * 7,
                    1000 + tick * 50
                ),
            )
            .await;
        controller
            .push_json(
                "network-traffic/KB/3",
                &format!(
                    r#"{{"totalBytesSent": {}, "totalBytesReceive": {}, "receivePerSec": {}, "sentPerSec": {}, "queryDiff": 3000, "sizeUnit": "KB"}}"#,
                    50_000 + tick * 900,
                    90_000 + tick * 1200,
                    12.5 + tick as f64,
                    6.25 + tick as f64,
                ),
            )
            .await;
        controller
            .push_json(
                "connection-usage/3",
                &format!(
                    r#"{{"maxConnections": 8000, "currentConnections": {}, "connectUsagePercent": {}}}"#,
                    30 + tick,
                    (30 + tick) as f64 / 8000.0
                ),
            )
            .await;
        controller
            .push_json(
                "cache-hit-rate/3",
                &format!(r#"{{"cacheHitRate": {}, "queryDiff": 3000}}"#, 0.95 + tick as f64 * 0.001),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    client.unsubscribe(&qps_id);
    info!(active = client.active_subscriptions(), "qps feed unsubscribed");
    client.disconnect().await;
    info!("disconnected");
    Ok(())
}
