//! Settings tree for the gateway.
//!
//! Grouped by concern: the public listener (`server`), relay behavior per
//! session (`relay`), and the backend address publication channel
//! (`backend`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level settings for the vizor gateway.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VizorSettings {
    /// Public listener settings.
    pub server: ServerSettings,
    /// Per-session relay behavior.
    pub relay: RelaySettings,
    /// Backend address publication channel.
    pub backend: BackendSettings,
}

/// Public listener network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` for auto-assign).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// One registered relay route: the public upgrade path and the backend path
/// it proxies to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSettings {
    /// Path browsers open their WebSocket against.
    pub public_path: String,
    /// Path on the backend this route maps to.
    pub backend_path: String,
}

/// Per-session relay behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Interval between liveness pings, in milliseconds.
    pub ping_interval_ms: u64,
    /// How long a leg may go without answering pings before the session is
    /// closed, in milliseconds.
    pub ping_timeout_ms: u64,
    /// Deadline for establishing the backend connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whether the backend leg also gets liveness pings. When disabled, a
    /// silently hung backend is only detected via read/write failures.
    pub backend_ping_enabled: bool,
    /// Origins accepted on upgrade. Empty means every origin is accepted
    /// (the security boundary is assumed enforced upstream).
    pub allowed_origins: Vec<String>,
    /// Registered relay routes.
    pub routes: Vec<RouteSettings>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 30_000,
            ping_timeout_ms: 90_000,
            connect_timeout_ms: 10_000,
            backend_ping_enabled: true,
            allowed_origins: Vec::new(),
            routes: vec![RouteSettings {
                public_path: "/dash/ws".to_string(),
                backend_path: "/dash/ws".to_string(),
            }],
        }
    }
}

/// Where the gateway learns the backend's current address.
///
/// The backend binds a dynamically assigned port at startup and publishes it
/// through exactly one of these channels; the gateway re-reads the channel
/// at each session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Host the backend listens on.
    pub host: String,
    /// Environment variable carrying the backend port.
    pub port_env_var: String,
    /// File the backend writes its port to at startup. Takes precedence
    /// over the environment variable when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_file: Option<PathBuf>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_env_var: "VIZOR_BACKEND_PORT".to_string(),
            port_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_is_dash_ws() {
        let relay = RelaySettings::default();
        assert_eq!(relay.routes.len(), 1);
        assert_eq!(relay.routes[0].public_path, "/dash/ws");
        assert_eq!(relay.routes[0].backend_path, "/dash/ws");
    }

    #[test]
    fn serde_round_trip() {
        let settings = VizorSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: VizorSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, settings.server.port);
        assert_eq!(back.relay.ping_interval_ms, settings.relay.ping_interval_ms);
        assert_eq!(back.relay.routes, settings.relay.routes);
    }

    #[test]
    fn field_names_are_camel_case() {
        let json = serde_json::to_value(VizorSettings::default()).unwrap();
        assert!(json["relay"]["pingIntervalMs"].is_number());
        assert!(json["relay"]["backendPingEnabled"].is_boolean());
        assert!(json["backend"]["portEnvVar"].is_string());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: VizorSettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.relay.ping_timeout_ms, 90_000);
    }

    #[test]
    fn port_file_omitted_when_none() {
        let json = serde_json::to_value(BackendSettings::default()).unwrap();
        assert!(json.get("portFile").is_none());
    }
}
