//! `RelayServer` — the public-facing axum HTTP + WebSocket server.
//!
//! Mounts one upgrade route per registered [`RouteBinding`], plus
//! `/health` and `/metrics`. Anything else 404s without touching the
//! relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::{Extension, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::RelayConfig;
use crate::health::{self, HealthResponse};
use crate::resolver::AddressResolver;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::upgrade;

/// Shared state accessible from axum handlers and sessions.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration (routes, ping policy, timeouts).
    pub config: Arc<RelayConfig>,
    /// Source of the backend's current address.
    pub resolver: Arc<dyn AddressResolver>,
    /// Shutdown coordinator; sessions derive child tokens from it.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Sessions currently relaying.
    pub active_sessions: Arc<AtomicUsize>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders the `/metrics` endpoint.
    pub metrics_handle: PrometheusHandle,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    resolver: Arc<dyn AddressResolver>,
    shutdown: Arc<ShutdownCoordinator>,
    active_sessions: Arc<AtomicUsize>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server over a configured route table and resolver.
    #[must_use]
    pub fn new(
        config: RelayConfig,
        resolver: Arc<dyn AddressResolver>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            active_sessions: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    fn app_state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            resolver: self.resolver.clone(),
            shutdown: self.shutdown.clone(),
            active_sessions: self.active_sessions.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        }
    }

    /// Build the axum router with all registered routes.
    pub fn router(&self) -> Router {
        let state = self.app_state();

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler));

        // One sub-router per registered route so each upgrade handler sees
        // its own binding.
        for binding in &self.config.routes {
            let sub = Router::new()
                .route(&binding.public_path, get(upgrade::relay_upgrade))
                .layer(Extension(Arc::new(binding.clone())));
            router = router.merge(sub);
        }

        router
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve. Returns the bound address (port 0 auto-assigns) and
    /// the serve task handle; the server stops when the shutdown
    /// coordinator is cancelled.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, routes = self.config.routes.len(), "relay server listening");
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "relay server error");
            }
        });

        Ok((addr, handle))
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get the shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Sessions currently relaying.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let active = state.active_sessions.load(Ordering::Relaxed);
    Json(health::health_check(
        state.start_time,
        active,
        state.config.routes.len(),
    ))
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use crate::resolver::{BackendAddress, FixedResolver};

    fn make_server(config: RelayConfig) -> RelayServer {
        let resolver = Arc::new(FixedResolver(BackendAddress::new("127.0.0.1", 9001)));
        let handle = PrometheusBuilder::new().build_recorder().handle();
        RelayServer::new(config, resolver, handle)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server(RelayConfig::default().register_route("/dash/ws", "/dash/ws"));
        let app = server.router();

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["active_sessions"], 0);
        assert_eq!(parsed["routes"], 1);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let server = make_server(RelayConfig::default());
        let app = server.router();

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unregistered_path_returns_404() {
        let server = make_server(RelayConfig::default().register_route("/dash/ws", "/dash/ws"));
        let app = server.router();

        let req = Request::builder()
            .uri("/other/ws")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn registered_path_requires_upgrade() {
        let server = make_server(RelayConfig::default().register_route("/dash/ws", "/dash/ws"));
        let app = server.router();

        // Plain GET without upgrade headers: rejected, but not a 404 — the
        // route exists.
        let req = Request::builder()
            .uri("/dash/ws")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn listen_binds_auto_assigned_port() {
        let server = make_server(RelayConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        handle.await.unwrap();
    }

    #[test]
    fn active_sessions_starts_at_zero() {
        let server = make_server(RelayConfig::default());
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn config_accessor_exposes_routes() {
        let server = make_server(
            RelayConfig::default()
                .register_route("/a/ws", "/a/ws")
                .register_route("/b/ws", "/b/ws"),
        );
        assert_eq!(server.config().routes.len(), 2);
    }
}
