use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: operations handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "tablebook_requests_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "tablebook_request_duration_seconds";

/// Counter: booking attempts. Labels: outcome (created, no_table, invalid, error).
pub const BOOKINGS_TOTAL: &str = "tablebook_bookings_total";

/// Counter: notification deliveries. Labels: outcome (sent, failed).
pub const NOTIFICATIONS_TOTAL: &str = "tablebook_notifications_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "tablebook_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "tablebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "tablebook_connections_rejected_total";

/// Counter: failed logins.
pub const AUTH_FAILURES_TOTAL: &str = "tablebook_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
