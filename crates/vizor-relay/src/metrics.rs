//! Prometheus metrics recorder and `/metrics` endpoint plumbing.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

// Metric name constants to avoid typos across modules.

/// Sessions opened total (counter).
pub const RELAY_SESSIONS_TOTAL: &str = "relay_sessions_total";
/// Sessions currently relaying (gauge).
pub const RELAY_SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Frames forwarded total (counter, labels: direction).
pub const RELAY_FRAMES_FORWARDED_TOTAL: &str = "relay_frames_forwarded_total";
/// Frame payload bytes forwarded total (counter, labels: direction).
pub const RELAY_FRAME_BYTES_TOTAL: &str = "relay_frame_bytes_total";
/// Backend connection failures total (counter).
pub const RELAY_BACKEND_CONNECT_FAILURES_TOTAL: &str = "relay_backend_connect_failures_total";
/// Upgrade requests rejected before a session existed (counter).
pub const RELAY_HANDSHAKE_REJECTIONS_TOTAL: &str = "relay_handshake_rejections_total";
/// Liveness timeouts total (counter, labels: leg).
pub const RELAY_LIVENESS_TIMEOUTS_TOTAL: &str = "relay_liveness_timeouts_total";
/// Session duration in seconds (histogram).
pub const RELAY_SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            RELAY_SESSIONS_TOTAL,
            RELAY_SESSIONS_ACTIVE,
            RELAY_FRAMES_FORWARDED_TOTAL,
            RELAY_FRAME_BYTES_TOTAL,
            RELAY_BACKEND_CONNECT_FAILURES_TOTAL,
            RELAY_HANDSHAKE_REJECTIONS_TOTAL,
            RELAY_LIVENESS_TIMEOUTS_TOTAL,
            RELAY_SESSION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
