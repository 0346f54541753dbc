//! Proxied-session lifecycle states.
//!
//! A session is single-use: it moves forward through the states below and
//! never revisits one. `Closed` is terminal. The only branch is at
//! `ConnectingBackend`, which jumps straight to `Closed` when the backend
//! connection cannot be established (no retry; the failure is terminal for
//! the session).

use thiserror::Error;

/// Lifecycle state of a relay session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Client-side upgrade in progress.
    AwaitingClient,
    /// Client leg established; dialing the backend.
    ConnectingBackend,
    /// Both legs established; frame pumps running.
    Relaying,
    /// One leg ended; waiting for both pumps to exit.
    Closing,
    /// Both legs closed and all tasks exited. Terminal.
    Closed,
}

/// An attempted transition that the lifecycle does not allow.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("illegal session transition {from:?} -> {to:?}")]
pub struct StateError {
    /// State the session was in.
    pub from: SessionState,
    /// State the transition asked for.
    pub to: SessionState,
}

impl SessionState {
    /// Whether moving from `self` to `to` is a legal lifecycle step.
    #[must_use]
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::{AwaitingClient, Closed, Closing, ConnectingBackend, Relaying};
        matches!(
            (self, to),
            (AwaitingClient, ConnectingBackend)
                | (ConnectingBackend, Relaying | Closed)
                | (Relaying, Closing)
                | (Closing, Closed)
        )
    }

    /// Perform a transition, or fail with a [`StateError`].
    pub fn transition_to(self, to: SessionState) -> Result<SessionState, StateError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(StateError { from: self, to })
        }
    }

    /// Whether the session can never change state again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::{AwaitingClient, Closed, Closing, ConnectingBackend, Relaying};
    use super::*;

    const ALL: [SessionState; 5] = [AwaitingClient, ConnectingBackend, Relaying, Closing, Closed];

    #[test]
    fn success_path() {
        let mut state = AwaitingClient;
        for next in [ConnectingBackend, Relaying, Closing, Closed] {
            state = state.transition_to(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn backend_failure_short_circuits_to_closed() {
        let state = AwaitingClient.transition_to(ConnectingBackend).unwrap();
        let state = state.transition_to(Closed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn closed_is_terminal() {
        for to in ALL {
            assert!(!Closed.can_transition_to(to), "Closed -> {to:?} must be illegal");
        }
    }

    #[test]
    fn no_state_is_revisited() {
        // Self-transitions are never legal.
        for s in ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn relaying_cannot_skip_closing() {
        assert!(!Relaying.can_transition_to(Closed));
    }

    #[test]
    fn awaiting_client_cannot_jump_to_relaying() {
        assert!(!AwaitingClient.can_transition_to(Relaying));
        assert!(!AwaitingClient.can_transition_to(Closed));
    }

    #[test]
    fn illegal_transition_reports_both_states() {
        let err = Closing.transition_to(Relaying).unwrap_err();
        assert_eq!(err.from, Closing);
        assert_eq!(err.to, Relaying);
        assert!(err.to_string().contains("Closing"));
        assert!(err.to_string().contains("Relaying"));
    }

    #[test]
    fn transition_matrix_is_exactly_five_edges() {
        let mut legal = 0;
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    legal += 1;
                }
            }
        }
        assert_eq!(legal, 5);
    }
}
