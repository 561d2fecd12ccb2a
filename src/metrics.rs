// src/metrics.rs
//
// Prometheus wiring: install the global recorder once at boot and expose the
// exposition endpoint as a router the admin surface merges in.

use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the recorder and publish the static configuration gauge. Call
/// once from the binary entrypoint, before the first pipeline cycle.
pub fn install(poll_interval_secs: u64) -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus: install recorder");
    gauge!("poll_interval_secs").set(poll_interval_secs as f64);
    handle
}

/// `/metrics` router rendering the Prometheus exposition format.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}
