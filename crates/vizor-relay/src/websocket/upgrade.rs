//! WebSocket upgrade handling for registered relay routes.
//!
//! Each registered route mounts this handler with its own [`RouteBinding`]
//! extension. Unregistered paths never reach it — they fall through to the
//! router's 404 and no session is created.

use std::sync::Arc;

use axum::Extension;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{info, warn};
use vizor_core::{SessionId, parse_protocol_header, select_subprotocol};

use crate::config::RouteBinding;
use crate::metrics::RELAY_HANDSHAKE_REJECTIONS_TOTAL;
use crate::server::AppState;
use crate::websocket::session;

/// Upgrade handler for one registered relay route.
///
/// Origin policy: an empty allow-list accepts every origin — the security
/// boundary is assumed enforced upstream of this gateway. A non-empty list
/// is matched exactly.
///
/// Sub-protocol policy: see [`select_subprotocol`]. A refused negotiation
/// rejects the upgrade outright; no session is created and the server is
/// unaffected.
pub async fn relay_upgrade(
    ws: WebSocketUpgrade,
    Extension(route): Extension<Arc<RouteBinding>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    if !state.config.allowed_origins.is_empty() {
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        if !origin.is_some_and(|o| state.config.allowed_origins.iter().any(|a| a == o)) {
            warn!(?origin, path = %route.public_path, "rejecting upgrade: origin not allowed");
            counter!(RELAY_HANDSHAKE_REJECTIONS_TOTAL).increment(1);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let offered = headers
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(parse_protocol_header)
        .unwrap_or_default();

    let Some(chosen) = select_subprotocol(&offered) else {
        warn!(
            offered = offered.len(),
            path = %route.public_path,
            "rejecting upgrade: sub-protocol negotiation failed"
        );
        counter!(RELAY_HANDSHAKE_REJECTIONS_TOTAL).increment(1);
        return (StatusCode::BAD_REQUEST, "sub-protocol negotiation failed").into_response();
    };
    let chosen = chosen.to_owned();

    let session_id = SessionId::new();
    info!(session_id = %session_id, path = %route.public_path, "upgrade accepted");

    ws.protocols([chosen.clone()])
        .on_upgrade(move |socket| {
            session::run_session(socket, session_id, route, state, offered, chosen)
        })
        .into_response()
}
