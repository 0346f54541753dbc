//! Runtime relay configuration.
//!
//! [`RelayConfig`] is the parsed, `Duration`-typed form of the settings
//! tree. Routes are registered here at startup and never mutated at
//! runtime.

use std::time::Duration;

use tracing::warn;
use vizor_settings::VizorSettings;

/// One registered relay route: the public upgrade path and the backend
/// path it proxies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteBinding {
    /// Path browsers open their WebSocket against (e.g. `/dash/ws`).
    pub public_path: String,
    /// Path appended to the resolved backend address (e.g. `/dash/ws`).
    pub backend_path: String,
}

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Interval between liveness pings.
    pub ping_interval: Duration,
    /// How long a leg may go without answering pings.
    pub ping_timeout: Duration,
    /// Deadline for establishing the backend connection.
    pub connect_timeout: Duration,
    /// Whether the backend leg also gets liveness pings.
    pub backend_ping_enabled: bool,
    /// Origins accepted on upgrade; empty accepts all.
    pub allowed_origins: Vec<String>,
    /// Registered routes.
    pub routes: Vec<RouteBinding>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ping_interval: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            backend_ping_enabled: true,
            allowed_origins: Vec::new(),
            routes: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Register a route at startup. Invalid or duplicate public paths are
    /// skipped with a warning rather than poisoning the router.
    #[must_use]
    pub fn register_route(
        mut self,
        public_path: impl Into<String>,
        backend_path: impl Into<String>,
    ) -> Self {
        let public_path = public_path.into();
        let backend_path = backend_path.into();
        if !public_path.starts_with('/') || !backend_path.starts_with('/') {
            warn!(public_path, backend_path, "skipping route: paths must start with '/'");
            return self;
        }
        if self.routes.iter().any(|r| r.public_path == public_path) {
            warn!(public_path, "skipping route: public path already registered");
            return self;
        }
        self.routes.push(RouteBinding {
            public_path,
            backend_path,
        });
        self
    }

    /// Build the runtime config from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &VizorSettings) -> Self {
        let mut config = Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            ping_interval: Duration::from_millis(settings.relay.ping_interval_ms),
            ping_timeout: Duration::from_millis(settings.relay.ping_timeout_ms),
            connect_timeout: Duration::from_millis(settings.relay.connect_timeout_ms),
            backend_ping_enabled: settings.relay.backend_ping_enabled,
            allowed_origins: settings.relay.allowed_origins.clone(),
            routes: Vec::new(),
        };
        for route in &settings.relay.routes {
            config = config.register_route(route.public_path.clone(), route.backend_path.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_production_ping_policy() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.ping_interval, Duration::from_secs(30));
        assert_eq!(cfg.ping_timeout, Duration::from_secs(90));
        assert!(cfg.backend_ping_enabled);
        assert!(cfg.routes.is_empty());
    }

    #[test]
    fn register_route_appends() {
        let cfg = RelayConfig::default()
            .register_route("/a/ws", "/a/ws")
            .register_route("/b/ws", "/backend-b/ws");
        assert_eq!(cfg.routes.len(), 2);
        assert_eq!(cfg.routes[1].backend_path, "/backend-b/ws");
    }

    #[test]
    fn register_route_rejects_relative_paths() {
        let cfg = RelayConfig::default().register_route("no-slash", "/ok");
        assert!(cfg.routes.is_empty());
        let cfg = RelayConfig::default().register_route("/ok", "no-slash");
        assert!(cfg.routes.is_empty());
    }

    #[test]
    fn register_route_skips_duplicates() {
        let cfg = RelayConfig::default()
            .register_route("/a/ws", "/a/ws")
            .register_route("/a/ws", "/other");
        assert_eq!(cfg.routes.len(), 1);
        assert_eq!(cfg.routes[0].backend_path, "/a/ws");
    }

    #[test]
    fn from_settings_maps_durations() {
        let mut settings = VizorSettings::default();
        settings.relay.ping_interval_ms = 1500;
        settings.relay.ping_timeout_ms = 4500;
        settings.relay.connect_timeout_ms = 800;
        let cfg = RelayConfig::from_settings(&settings);
        assert_eq!(cfg.ping_interval, Duration::from_millis(1500));
        assert_eq!(cfg.ping_timeout, Duration::from_millis(4500));
        assert_eq!(cfg.connect_timeout, Duration::from_millis(800));
        // Default settings carry the single dashboard route
        assert_eq!(cfg.routes.len(), 1);
        assert_eq!(cfg.routes[0].public_path, "/dash/ws");
    }
}
