//! # vizor-core
//!
//! Foundation types for the vizor gateway: session identifiers, the
//! proxied-session lifecycle, sub-protocol negotiation policy, and the
//! relay error taxonomy.
//!
//! This crate is transport-free by design — nothing here depends on a
//! specific HTTP or WebSocket implementation, so the lifecycle rules and
//! the negotiation policy can be tested in isolation.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod negotiate;
pub mod state;

pub use errors::{Leg, RelayError};
pub use ids::SessionId;
pub use negotiate::{parse_protocol_header, select_subprotocol};
pub use state::{SessionState, StateError};
