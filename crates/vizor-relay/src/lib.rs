//! # vizor-relay
//!
//! WebSocket reverse relay between browser clients and the privately
//! addressed visualization backend.
//!
//! Browsers can only reach the gateway's public port; the visualization
//! backend listens on a dynamically assigned private port. Every browser
//! WebSocket is therefore tunneled: the relay accepts the inbound upgrade
//! on a registered path, negotiates the backend's sub-protocol, dials the
//! backend at its currently published address, and then moves frames
//! verbatim in both directions until either side closes.
//!
//! - Route registration: pure startup configuration, one public path per
//!   logical backend path
//! - One session per inbound upgrade; sessions own their two connections
//!   exclusively and never share state with each other
//! - Two frame pumps per session, one per direction, each an independent
//!   task; liveness pings per leg
//! - `/health` and `/metrics` endpoints; graceful shutdown via
//!   `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{RelayConfig, RouteBinding};
pub use resolver::{AddressResolver, BackendAddress};
pub use server::RelayServer;
