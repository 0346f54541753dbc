//! Sub-protocol negotiation policy.
//!
//! The browser offers an ordered list of sub-protocol tokens during the
//! upgrade; the gateway picks one and uses it on both legs, while dialing
//! the backend with the browser's full original offer so the backend sees
//! exactly what the browser sent.

/// Parse a `Sec-WebSocket-Protocol` header value into its ordered tokens.
///
/// Tokens are comma-separated; surrounding whitespace is stripped and empty
/// entries are dropped. Order is preserved — it is the client's preference
/// order.
#[must_use]
pub fn parse_protocol_header(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Select the sub-protocol used for both legs of a proxied connection.
///
/// The visualization client library always offers its protocol pair (e.g.
/// `["bokeh", "bokeh-websocket"]`), and its server half is only known to
/// handshake cleanly when that pair arrives intact. Selection is therefore
/// deliberately strict: exactly two offered tokens selects the first,
/// anything else refuses the negotiation. Inherited from the production
/// behavior this gateway replaces; kept literal for compatibility. A
/// general-purpose relay would intersect the offer with what the backend
/// requires instead.
#[must_use]
pub fn select_subprotocol(offered: &[String]) -> Option<&str> {
    if offered.len() != 2 {
        return None;
    }
    Some(offered[0].as_str())
}
