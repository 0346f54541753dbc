//! Error taxonomy for the relay.
//!
//! Every variant is scoped to a single session: a `RelayError` tears down
//! the session it occurred in and nothing else. Errors carry stringified
//! causes so this crate stays free of transport dependencies; the relay
//! crate converts axum/tungstenite errors at the boundary.

use std::fmt;

use thiserror::Error;

/// Which leg of a session an error occurred on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Leg {
    /// The browser-facing connection.
    Client,
    /// The connection to the visualization backend.
    Backend,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Backend => f.write_str("backend"),
        }
    }
}

/// Session-scoped relay failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The backend has not published an address yet, or the publication
    /// source could not be read.
    #[error("backend address unavailable: {message}")]
    AddressUnavailable {
        /// What went wrong at the lookup.
        message: String,
    },

    /// The resolved address and backend path did not form a usable endpoint.
    #[error("invalid backend endpoint {uri}: {message}")]
    BackendUri {
        /// The endpoint we tried to build.
        uri: String,
        /// Parse or header-construction failure.
        message: String,
    },

    /// The backend refused or failed the WebSocket handshake (connection
    /// refused, timeout, or HTTP rejection).
    #[error("backend handshake failed for {uri}: {message}")]
    BackendHandshake {
        /// The endpoint we dialed.
        uri: String,
        /// Underlying handshake failure.
        message: String,
    },

    /// The client's sub-protocol offer could not be negotiated.
    #[error("unable to select a sub-protocol from {count} offered")]
    ProtocolRejected {
        /// How many tokens the client offered.
        count: usize,
    },

    /// The backend accepted the handshake but negotiated a different
    /// sub-protocol than the one selected on the client leg.
    #[error("backend negotiated sub-protocol {negotiated:?}, expected {expected:?}")]
    ProtocolMismatch {
        /// Token selected on the client leg.
        expected: String,
        /// Token the backend answered with, if any.
        negotiated: Option<String>,
    },

    /// Read or write failure on an established leg.
    #[error("{leg} transport error: {message}")]
    Transport {
        /// Which leg failed.
        leg: Leg,
        /// Underlying transport failure.
        message: String,
    },

    /// A leg stopped answering liveness pings.
    #[error("{leg} liveness timeout after {timeout_ms}ms")]
    LivenessTimeout {
        /// Which leg went silent.
        leg: Leg,
        /// Configured pong deadline.
        timeout_ms: u64,
    },
}

impl RelayError {
    /// Address lookup failure from any displayable cause.
    pub fn address_unavailable(cause: impl fmt::Display) -> Self {
        Self::AddressUnavailable {
            message: cause.to_string(),
        }
    }

    /// Transport failure on `leg` from any displayable cause.
    pub fn transport(leg: Leg, cause: impl fmt::Display) -> Self {
        Self::Transport {
            leg,
            message: cause.to_string(),
        }
    }

    /// Whether this error occurred before the session reached relaying.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::AddressUnavailable { .. }
                | Self::BackendUri { .. }
                | Self::BackendHandshake { .. }
                | Self::ProtocolRejected { .. }
                | Self::ProtocolMismatch { .. }
        )
    }
}
