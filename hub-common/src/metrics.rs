//! Metric name constants and the shared metrics/liveness HTTP endpoint.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::health::HealthRegistry;

pub const DIAGNOSTICS_EMITTED: &str = "hub_diagnostics_emitted_total";
pub const MESSAGES_RECEIVED: &str = "hub_messages_received_total";
pub const MESSAGES_ACKED: &str = "hub_messages_acked_total";
pub const MESSAGES_DEAD_LETTERED: &str = "hub_messages_dead_lettered_total";
pub const DELIVERIES_ATTEMPTED: &str = "hub_deliveries_attempted_total";
pub const DELIVERIES_FAILED: &str = "hub_deliveries_failed_total";
pub const MESSAGE_PROCESSING_TIME: &str = "hub_message_processing_duration_seconds";

pub async fn index() -> &'static str {
    "event routing hub"
}

/// Build the service router: an index, the liveness probe backed by the
/// health registry, and the Prometheus render endpoint.
pub fn setup_service_router(health: HealthRegistry) -> Router {
    let recorder_handle = setup_metrics_recorder();

    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || std::future::ready(health.get_status())),
        )
        .route(
            "/metrics",
            get(move || std::future::ready(recorder_handle.render())),
        )
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

/// Bind a `TcpListener` on the provided address and serve the router on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}
