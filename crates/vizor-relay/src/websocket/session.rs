//! Relay session lifecycle — one inbound upgrade paired with one backend
//! connection, from hand-off through teardown.
//!
//! The session exclusively owns both connections. The backend socket only
//! exists between a successful dial and teardown, which is what keeps the
//! lifecycle honest: there is no backend connection outside the relaying
//! scope. Every failure here is fatal to this session only — nothing
//! propagates to the server or to other sessions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use futures::StreamExt;
use futures::future::{join_all, select_all};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::{Instrument, debug, error, info, instrument, warn};
use vizor_core::{RelayError, SessionId, SessionState};

use crate::config::RouteBinding;
use crate::metrics::{
    RELAY_BACKEND_CONNECT_FAILURES_TOTAL, RELAY_LIVENESS_TIMEOUTS_TOTAL, RELAY_SESSIONS_ACTIVE,
    RELAY_SESSIONS_TOTAL, RELAY_SESSION_DURATION_SECONDS,
};
use crate::server::AppState;
use crate::websocket::liveness::LegHealth;
use crate::websocket::pump::{
    self, BackendSocket, PingPolicy, PumpEnd, WriterCmd,
};

/// Frames in flight towards the client sink; a bounded channel so a slow
/// browser stalls the backend reader instead of buffering without limit.
const FRAME_CHANNEL_CAPACITY: usize = 32;

/// How long teardown waits for the remaining tasks after the first exits.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent to the client when the backend leg cannot be set up.
const CLOSE_CODE_INTERNAL: u16 = 1011;

type TaskOutcome = Result<Result<PumpEnd, RelayError>, JoinError>;
type NamedTask = Pin<Box<dyn Future<Output = (&'static str, TaskOutcome)> + Send>>;

/// Run one relay session to completion.
///
/// 1. Resolves the backend address and dials `ws://<addr><backendPath>`,
///    offering the client's full sub-protocol list
/// 2. Verifies the backend accepted the token selected on the client leg
/// 3. Runs the two frame pumps and the client writer until any of them ends
/// 4. Cancels and joins the rest, closing both legs
///
/// A backend dial failure closes the client leg without retry; the browser
/// observes an ordinary close event.
#[instrument(skip_all, fields(session_id = %session_id, route = %route.public_path))]
pub async fn run_session(
    mut socket: WebSocket,
    session_id: SessionId,
    route: Arc<RouteBinding>,
    state: AppState,
    offered: Vec<String>,
    chosen: String,
) {
    let mut lifecycle = SessionState::AwaitingClient;
    advance(&mut lifecycle, SessionState::ConnectingBackend);

    counter!(RELAY_SESSIONS_TOTAL).increment(1);
    gauge!(RELAY_SESSIONS_ACTIVE).increment(1.0);
    let _ = state.active_sessions.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    info!(protocol = %chosen, "client leg established");

    let backend_socket =
        match dial_backend(&state, &route, &offered, &chosen).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = %e, "backend leg failed, closing client");
                counter!(RELAY_BACKEND_CONNECT_FAILURES_TOTAL).increment(1);
                let _ = socket
                    .send(ClientMessage::Close(Some(ClientCloseFrame {
                        code: CLOSE_CODE_INTERNAL,
                        reason: "backend unavailable".into(),
                    })))
                    .await;
                advance(&mut lifecycle, SessionState::Closed);
                finish_session(&state, started);
                return;
            }
        };

    advance(&mut lifecycle, SessionState::Relaying);
    info!("relay established");

    let (client_tx, client_rx) = socket.split();
    let (backend_tx, backend_rx) = backend_socket.split();
    let client_health = Arc::new(LegHealth::new());
    let backend_health = Arc::new(LegHealth::new());
    let (writer_tx, writer_rx) = mpsc::channel::<WriterCmd>(FRAME_CHANNEL_CAPACITY);
    let cancel = state.shutdown.session_token();

    let ping = PingPolicy {
        interval: state.config.ping_interval,
        timeout: state.config.ping_timeout,
    };
    let backend_ping = state.config.backend_ping_enabled.then_some(ping);

    let a = tokio::spawn(
        pump::pump_client_to_backend(
            client_rx,
            backend_tx,
            client_health.clone(),
            backend_health.clone(),
            backend_ping,
            cancel.clone(),
        )
        .in_current_span(),
    );
    let b = tokio::spawn(
        pump::pump_backend_to_client(
            backend_rx,
            writer_tx,
            backend_health,
            cancel.clone(),
        )
        .in_current_span(),
    );
    let w = tokio::spawn(
        pump::run_client_writer(client_tx, writer_rx, client_health, ping, cancel.clone())
            .in_current_span(),
    );

    let aborts = [a.abort_handle(), b.abort_handle(), w.abort_handle()];
    let tasks: Vec<NamedTask> = vec![
        named("client-to-backend", a),
        named("backend-to-client", b),
        named("client-writer", w),
    ];

    // The first task to finish decides teardown; the rest unwind on cancel.
    let ((name, outcome), _, remaining) = select_all(tasks).await;
    log_task_end(name, outcome);
    advance(&mut lifecycle, SessionState::Closing);
    cancel.cancel();

    match tokio::time::timeout(TEARDOWN_TIMEOUT, join_all(remaining)).await {
        Ok(rest) => {
            for (name, outcome) in rest {
                log_task_end(name, outcome);
            }
        }
        Err(_) => {
            warn!("session teardown timed out, aborting remaining tasks");
            for handle in &aborts {
                handle.abort();
            }
        }
    }

    advance(&mut lifecycle, SessionState::Closed);
    finish_session(&state, started);
    info!("session closed");
}

/// Resolve the backend address and complete the backend-leg handshake.
async fn dial_backend(
    state: &AppState,
    route: &RouteBinding,
    offered: &[String],
    chosen: &str,
) -> Result<BackendSocket, RelayError> {
    let addr = state.resolver.resolve()?;
    let uri = format!("ws://{addr}{}", route.backend_path);
    debug!(%uri, "dialing backend");
    connect_backend(&uri, offered, chosen, state.config.connect_timeout).await
}

/// Open the backend connection, offering the client's original
/// sub-protocol list, and verify the negotiation result.
async fn connect_backend(
    uri: &str,
    offered: &[String],
    chosen: &str,
    connect_timeout: Duration,
) -> Result<BackendSocket, RelayError> {
    let mut request = uri.into_client_request().map_err(|e| RelayError::BackendUri {
        uri: uri.to_owned(),
        message: e.to_string(),
    })?;
    let header =
        HeaderValue::from_str(&offered.join(", ")).map_err(|e| RelayError::BackendUri {
            uri: uri.to_owned(),
            message: e.to_string(),
        })?;
    let _ = request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, header);

    let (socket, response) = tokio::time::timeout(connect_timeout, connect_async(request))
        .await
        .map_err(|_| RelayError::BackendHandshake {
            uri: uri.to_owned(),
            message: format!("no handshake within {connect_timeout:?}"),
        })?
        .map_err(|e| RelayError::BackendHandshake {
            uri: uri.to_owned(),
            message: e.to_string(),
        })?;

    let negotiated = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if negotiated.as_deref() != Some(chosen) {
        return Err(RelayError::ProtocolMismatch {
            expected: chosen.to_owned(),
            negotiated,
        });
    }
    Ok(socket)
}

/// Log a session state transition, or a lifecycle violation (which would be
/// a bug, not an operational error).
fn advance(lifecycle: &mut SessionState, to: SessionState) {
    let from = *lifecycle;
    match from.transition_to(to) {
        Ok(next) => {
            debug!(?from, ?next, "session state");
            *lifecycle = next;
        }
        Err(e) => warn!(error = %e, "session lifecycle violation"),
    }
}

fn finish_session(state: &AppState, started: Instant) {
    gauge!(RELAY_SESSIONS_ACTIVE).decrement(1.0);
    let _ = state.active_sessions.fetch_sub(1, Ordering::Relaxed);
    histogram!(RELAY_SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

fn named(name: &'static str, handle: JoinHandle<Result<PumpEnd, RelayError>>) -> NamedTask {
    Box::pin(async move { (name, handle.await) })
}

fn log_task_end(name: &'static str, outcome: TaskOutcome) {
    match outcome {
        Ok(Ok(PumpEnd::SourceClosed)) => debug!(task = name, "leg closed"),
        Ok(Ok(PumpEnd::Cancelled)) => debug!(task = name, "pump cancelled"),
        Ok(Err(e)) => {
            if let RelayError::LivenessTimeout { leg, .. } = &e {
                counter!(RELAY_LIVENESS_TIMEOUTS_TOTAL, "leg" => leg.to_string()).increment(1);
            }
            warn!(task = name, error = %e, "relay leg failed");
        }
        Err(e) => warn!(task = name, error = %e, "relay task aborted"),
    }
}

#[cfg(test)]
mod tests {
    // Session runs need live WebSocket connections on both legs and are
    // covered by tests/integration.rs. The helpers below are unit-testable.

    use super::*;

    #[test]
    fn advance_moves_through_legal_states() {
        let mut lifecycle = SessionState::AwaitingClient;
        advance(&mut lifecycle, SessionState::ConnectingBackend);
        assert_eq!(lifecycle, SessionState::ConnectingBackend);
        advance(&mut lifecycle, SessionState::Relaying);
        assert_eq!(lifecycle, SessionState::Relaying);
    }

    #[test]
    fn advance_refuses_illegal_step_and_keeps_state() {
        let mut lifecycle = SessionState::AwaitingClient;
        advance(&mut lifecycle, SessionState::Relaying);
        assert_eq!(lifecycle, SessionState::AwaitingClient);
    }

    #[tokio::test]
    async fn connect_backend_rejects_unreachable_address() {
        // Port 9 on localhost: nothing listening.
        let offered = vec!["p1".to_string(), "p2".to_string()];
        let err = connect_backend(
            "ws://127.0.0.1:9/ws",
            &offered,
            "p1",
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RelayError::BackendHandshake { .. }), "{err}");
    }

    #[tokio::test]
    async fn connect_backend_rejects_malformed_uri() {
        let offered = vec!["p1".to_string(), "p2".to_string()];
        let err = connect_backend("not a uri", &offered, "p1", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BackendUri { .. }), "{err}");
    }
}
