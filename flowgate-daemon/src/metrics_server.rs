//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose Prometheus scrape endpoints.
//!
//! # Usage
//!
//! ```ignore
//! let config = MetricsConfig::default();
//! install_metrics_recorder(&config)?;
//! // After this, all metrics::counter!(), metrics::gauge!(), metrics::histogram!() calls are recorded
//! ```

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use flowgate_core::config::MetricsConfig;
use flowgate_core::metrics::{
    DECODE_DURATION_SECONDS, DURATION_BUCKETS, PACKET_SIZE_BUCKETS, PROCESS_DURATION_SECONDS,
    TRAFFIC_PACKET_SIZE_BYTES,
};

/// Install the global metrics recorder and start the HTTP listener.
///
/// This function should be called once per process.
/// After calling this, all `metrics::counter!()`, `metrics::gauge!()`, `metrics::histogram!()`
/// macros will record to the Prometheus format.
///
/// # Arguments
///
/// * `config` - Metrics configuration (listen_addr, port)
///
/// # Errors
///
/// - Socket binding fails
/// - Global recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    tracing::info!(
        listen_addr = %addr,
        "installing Prometheus metrics recorder"
    );

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(DECODE_DURATION_SECONDS.to_owned()),
            &DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("failed to set histogram buckets: {}", e))?
        .set_buckets_for_metric(
            Matcher::Full(PROCESS_DURATION_SECONDS.to_owned()),
            &DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("failed to set histogram buckets: {}", e))?
        .set_buckets_for_metric(
            Matcher::Full(TRAFFIC_PACKET_SIZE_BYTES.to_owned()),
            &PACKET_SIZE_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("failed to set histogram buckets: {}", e))?
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    // Register metric descriptions
    flowgate_core::metrics::describe_all();

    tracing::info!(
        listen_addr = %addr,
        "Prometheus metrics endpoint active"
    );

    Ok(())
}
