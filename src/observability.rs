use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: op (book_slot | assign_shift |
/// update_shift), outcome (admitted | conflict).
pub const ADMISSIONS_TOTAL: &str = "rota_admissions_total";

/// Counter: free-slot queries served.
pub const SLOT_QUERIES_TOTAL: &str = "rota_slot_queries_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: resources with live scheduling state.
pub const RESOURCES_ACTIVE: &str = "rota_resources_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rota_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rota_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if `port` is
/// None. Called once by the embedding process, not by the engine.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
