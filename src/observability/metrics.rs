//! Metrics collection and exposition.
//!
//! # Metrics
//! - `upstream_sync_events_total` (counter): runtime events by action
//! - `upstream_sync_mutations_total` (counter): registry upserts/removes
//! - `upstream_sync_members` (gauge): current members per service
//! - `upstream_sync_proxy_reloads_total` (counter): reload runs by result
//! - `upstream_sync_config_reloads_total` (counter): config reloads by result
//! - `upstream_sync_rescans_total` (counter): completed rescans
//! - `upstream_sync_rescan_failures_total` (counter): failed rescan units

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

pub fn record_event(action: &'static str) {
    ::metrics::counter!("upstream_sync_events_total", "action" => action).increment(1);
}

pub fn record_mutation(op: &'static str) {
    ::metrics::counter!("upstream_sync_mutations_total", "op" => op).increment(1);
}

pub fn record_members(service: &str, count: usize) {
    ::metrics::gauge!("upstream_sync_members", "service" => service.to_string()).set(count as f64);
}

pub fn record_proxy_reload(success: bool) {
    ::metrics::counter!("upstream_sync_proxy_reloads_total", "result" => result_label(success))
        .increment(1);
}

pub fn record_config_reload(success: bool) {
    ::metrics::counter!("upstream_sync_config_reloads_total", "result" => result_label(success))
        .increment(1);
}

pub fn record_rescan(failures: usize) {
    ::metrics::counter!("upstream_sync_rescans_total").increment(1);
    ::metrics::counter!("upstream_sync_rescan_failures_total").increment(failures as u64);
}
