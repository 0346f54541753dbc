//! Directional frame pumps and the frame mapping between the two legs.
//!
//! The client leg speaks axum's WebSocket message type, the backend leg
//! tungstenite's. [`RelayFrame`] is the common currency: data frames are
//! forwarded verbatim with their text/binary tag intact, control frames are
//! handled per leg and never forwarded.
//!
//! Writer discipline: each sink has exactly one writing task. The backend
//! sink is owned by the client→backend pump; the client sink is owned by a
//! dedicated writer task fed over a small bounded channel (the bounded send
//! is the relay's implicit backpressure — a slow consumer eventually stalls
//! reads on the opposite leg).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use vizor_core::{Leg, RelayError};

use crate::metrics::{RELAY_FRAMES_FORWARDED_TOTAL, RELAY_FRAME_BYTES_TOTAL};
use crate::websocket::liveness::{LegHealth, max_missed_pongs};

/// The backend-leg socket type.
pub type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A relayed message unit, tagged text or binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Opaque binary frame.
    Binary(Bytes),
}

impl RelayFrame {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert into the client-leg message type.
    #[must_use]
    pub fn into_client(self) -> ClientMessage {
        match self {
            Self::Text(t) => ClientMessage::Text(t.into()),
            Self::Binary(b) => ClientMessage::Binary(b),
        }
    }

    /// Convert into the backend-leg message type.
    #[must_use]
    pub fn into_backend(self) -> BackendMessage {
        match self {
            Self::Text(t) => BackendMessage::Text(t.into()),
            Self::Binary(b) => BackendMessage::Binary(b),
        }
    }
}

/// Close code and reason carried across legs when a peer closes cleanly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason text (possibly empty).
    pub reason: String,
}

/// What a pump observed on its source connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpEvent {
    /// A data frame to forward.
    Frame(RelayFrame),
    /// Peer pong — liveness proof.
    Pong,
    /// Peer ping — the transport answers it; liveness proof as well.
    Ping,
    /// Peer sent a close frame.
    Closed(Option<CloseReason>),
}

/// Command for the client-sink writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriterCmd {
    /// Forward a data frame to the client.
    Frame(RelayFrame),
    /// Close the client leg, mirroring the backend's close frame.
    Close(Option<CloseReason>),
}

/// Why a pump loop stopped without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source delivered a close frame or EOF; the destination was
    /// closed in turn.
    SourceClosed,
    /// Cancelled by the session (the other direction ended first).
    Cancelled,
}

/// Liveness ping schedule for one leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPolicy {
    /// Interval between pings.
    pub interval: Duration,
    /// Silence budget before the leg is declared dead.
    pub timeout: Duration,
}

impl PingPolicy {
    fn timeout_ms(self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Classify a client-leg message.
#[must_use]
pub fn classify_client(msg: ClientMessage) -> PumpEvent {
    match msg {
        ClientMessage::Text(t) => PumpEvent::Frame(RelayFrame::Text(t.as_str().to_owned())),
        ClientMessage::Binary(b) => PumpEvent::Frame(RelayFrame::Binary(b)),
        ClientMessage::Ping(_) => PumpEvent::Ping,
        ClientMessage::Pong(_) => PumpEvent::Pong,
        ClientMessage::Close(frame) => PumpEvent::Closed(frame.map(|f| CloseReason {
            code: f.code,
            reason: f.reason.as_str().to_owned(),
        })),
    }
}

/// Classify a backend-leg message. Raw frames (only surfaced in exotic
/// read modes) are ignored.
#[must_use]
pub fn classify_backend(msg: BackendMessage) -> Option<PumpEvent> {
    match msg {
        BackendMessage::Text(t) => {
            Some(PumpEvent::Frame(RelayFrame::Text(t.as_str().to_owned())))
        }
        BackendMessage::Binary(b) => Some(PumpEvent::Frame(RelayFrame::Binary(b))),
        BackendMessage::Ping(_) => Some(PumpEvent::Ping),
        BackendMessage::Pong(_) => Some(PumpEvent::Pong),
        BackendMessage::Close(frame) => Some(PumpEvent::Closed(frame.map(|f| CloseReason {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned(),
        }))),
        BackendMessage::Frame(_) => None,
    }
}

/// Build the close message for the client leg.
#[must_use]
pub fn close_to_client(reason: Option<CloseReason>) -> ClientMessage {
    ClientMessage::Close(reason.map(|r| ClientCloseFrame {
        code: r.code,
        reason: r.reason.into(),
    }))
}

/// Build the close message for the backend leg.
#[must_use]
pub fn close_to_backend(reason: Option<CloseReason>) -> BackendMessage {
    BackendMessage::Close(reason.map(|r| BackendCloseFrame {
        code: r.code.into(),
        reason: r.reason.into(),
    }))
}

fn record_forward(direction: &'static str, frame: &RelayFrame) {
    counter!(RELAY_FRAMES_FORWARDED_TOTAL, "direction" => direction).increment(1);
    counter!(RELAY_FRAME_BYTES_TOTAL, "direction" => direction)
        .increment(frame.len() as u64);
}

/// Read frames from the client leg and write them to the backend sink.
///
/// Owns the backend sink (single-writer). When backend pings are enabled
/// this loop also runs the backend leg's liveness schedule, since it is
/// the only task allowed to write there. Client pongs observed here feed
/// the client leg's health, which the client writer task checks.
pub async fn pump_client_to_backend(
    mut client_rx: SplitStream<WebSocket>,
    mut backend_tx: SplitSink<BackendSocket, BackendMessage>,
    client_health: Arc<LegHealth>,
    backend_health: Arc<LegHealth>,
    ping: Option<PingPolicy>,
    cancel: CancellationToken,
) -> Result<PumpEnd, RelayError> {
    let ping_enabled = ping.is_some();
    let policy = ping.unwrap_or(PingPolicy {
        interval: Duration::from_secs(3600),
        timeout: Duration::from_secs(3600),
    });
    let mut ping_timer = time::interval(policy.interval);
    // Skip the immediate first tick
    let _ = ping_timer.tick().await;
    let budget = max_missed_pongs(policy.interval, policy.timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            item = client_rx.next() => {
                match item {
                    Some(Ok(msg)) => match classify_client(msg) {
                        PumpEvent::Frame(frame) => {
                            record_forward("client_to_backend", &frame);
                            backend_tx
                                .send(frame.into_backend())
                                .await
                                .map_err(|e| RelayError::transport(Leg::Backend, e))?;
                        }
                        PumpEvent::Pong | PumpEvent::Ping => client_health.mark_alive(),
                        PumpEvent::Closed(reason) => {
                            let _ = backend_tx.send(close_to_backend(reason)).await;
                            return Ok(PumpEnd::SourceClosed);
                        }
                    },
                    Some(Err(e)) => return Err(RelayError::transport(Leg::Client, e)),
                    None => {
                        let _ = backend_tx.send(close_to_backend(None)).await;
                        return Ok(PumpEnd::SourceClosed);
                    }
                }
            }
            _ = ping_timer.tick(), if ping_enabled => {
                if backend_health.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= budget {
                        return Err(RelayError::LivenessTimeout {
                            leg: Leg::Backend,
                            timeout_ms: policy.timeout_ms(),
                        });
                    }
                }
                backend_tx
                    .send(BackendMessage::Ping(Bytes::new()))
                    .await
                    .map_err(|e| RelayError::transport(Leg::Backend, e))?;
            }
            () = cancel.cancelled() => {
                let _ = backend_tx.send(close_to_backend(None)).await;
                return Ok(PumpEnd::Cancelled);
            }
        }
    }
}

/// Read frames from the backend leg and hand them to the client writer.
pub async fn pump_backend_to_client(
    mut backend_rx: SplitStream<BackendSocket>,
    writer: mpsc::Sender<WriterCmd>,
    backend_health: Arc<LegHealth>,
    cancel: CancellationToken,
) -> Result<PumpEnd, RelayError> {
    loop {
        tokio::select! {
            item = backend_rx.next() => {
                match item {
                    Some(Ok(msg)) => match classify_backend(msg) {
                        Some(PumpEvent::Frame(frame)) => {
                            record_forward("backend_to_client", &frame);
                            if writer.send(WriterCmd::Frame(frame)).await.is_err() {
                                // Writer exited; teardown is already under way.
                                return Ok(PumpEnd::Cancelled);
                            }
                        }
                        Some(PumpEvent::Pong | PumpEvent::Ping) => backend_health.mark_alive(),
                        Some(PumpEvent::Closed(reason)) => {
                            let _ = writer.send(WriterCmd::Close(reason)).await;
                            return Ok(PumpEnd::SourceClosed);
                        }
                        None => {}
                    },
                    Some(Err(e)) => return Err(RelayError::transport(Leg::Backend, e)),
                    None => {
                        let _ = writer.send(WriterCmd::Close(None)).await;
                        return Ok(PumpEnd::SourceClosed);
                    }
                }
            }
            () = cancel.cancelled() => return Ok(PumpEnd::Cancelled),
        }
    }
}

/// Own the client sink: forward frames from the backend pump and run the
/// client leg's liveness schedule.
pub async fn run_client_writer(
    mut client_tx: SplitSink<WebSocket, ClientMessage>,
    mut commands: mpsc::Receiver<WriterCmd>,
    client_health: Arc<LegHealth>,
    ping: PingPolicy,
    cancel: CancellationToken,
) -> Result<PumpEnd, RelayError> {
    let mut ping_timer = time::interval(ping.interval);
    // Skip the immediate first tick
    let _ = ping_timer.tick().await;
    let budget = max_missed_pongs(ping.interval, ping.timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(WriterCmd::Frame(frame)) => {
                        client_tx
                            .send(frame.into_client())
                            .await
                            .map_err(|e| RelayError::transport(Leg::Client, e))?;
                    }
                    Some(WriterCmd::Close(reason)) => {
                        let _ = client_tx.send(close_to_client(reason)).await;
                        return Ok(PumpEnd::SourceClosed);
                    }
                    None => return Ok(PumpEnd::Cancelled),
                }
            }
            _ = ping_timer.tick() => {
                if client_health.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= budget {
                        return Err(RelayError::LivenessTimeout {
                            leg: Leg::Client,
                            timeout_ms: ping.timeout_ms(),
                        });
                    }
                }
                client_tx
                    .send(ClientMessage::Ping(Bytes::new()))
                    .await
                    .map_err(|e| RelayError::transport(Leg::Client, e))?;
            }
            () = cancel.cancelled() => {
                let _ = client_tx.send(ClientMessage::Close(None)).await;
                return Ok(PumpEnd::Cancelled);
            }
        }
    }
}
