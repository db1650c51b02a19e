//! Prometheus metrics endpoint.
//!
//! The `metrics-exporter-prometheus` HTTP listener serves every reactd counter
//! and gauge on `listen_addr:port/metrics`. Per-rule and per-source series are
//! created at zero when the recorder is installed, so a rule that has never
//! matched still appears in a scrape.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use reactd_core::config::{MetricsConfig, ReactdConfig};
use reactd_core::metrics as m;

/// Parse the configured listen address.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global recorder, start the HTTP listener and register the
/// series for every configured source and rule.
///
/// Call once per process, after `config` has been validated. Returns the
/// address the endpoint listens on.
///
/// # Errors
///
/// - unparsable listen address
/// - socket binding fails
/// - a global recorder is already installed
pub fn install_metrics_recorder(config: &ReactdConfig) -> Result<SocketAddr> {
    let addr = listen_addr(&config.metrics)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder on {}: {}", addr, e))?;

    m::describe_all();
    let series = register_series(config);

    tracing::info!(
        listen_addr = %addr,
        endpoint = %config.metrics.endpoint,
        series,
        "Prometheus metrics endpoint active"
    );
    Ok(addr)
}

/// Create the labelled series for each source and rule with a zero value.
///
/// Rule labels use the same display names as the engine. Returns the number
/// of series created.
pub fn register_series(config: &ReactdConfig) -> usize {
    let mut series = 0;
    for (source, rules) in config.sources() {
        metrics::counter!(m::SOURCE_LINES_READ_TOTAL, m::LABEL_SOURCE => source.to_owned())
            .absolute(0);
        series += 1;

        for (idx, rule) in rules.iter().enumerate() {
            let name = rule.display_name(source, idx);
            for metric in [
                m::ENGINE_MATCHES_TOTAL,
                m::ENGINE_TRIGGERS_TOTAL,
                m::ENGINE_RULE_ERRORS_TOTAL,
            ] {
                metrics::counter!(metric, m::LABEL_RULE => name.clone()).absolute(0);
                series += 1;
            }
        }
    }
    series
}
