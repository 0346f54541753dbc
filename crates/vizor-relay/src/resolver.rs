//! Backend address resolution.
//!
//! The visualization backend binds a dynamically assigned port at startup
//! and publishes it exactly once through some channel (in-process publish,
//! environment variable, or a port file). Sessions look the address up when
//! they dial the backend; a lookup may race with backend startup, in which
//! case it fails and the session is torn down — the next session re-reads
//! the channel and can succeed.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use vizor_core::RelayError;

/// Network location of the visualization backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendAddress {
    /// Host the backend listens on.
    pub host: String,
    /// Dynamically assigned backend port.
    pub port: u16,
}

impl BackendAddress {
    /// Convenience constructor.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Source of the backend's current address.
///
/// Lookups happen once per session and must not take caller-side locks;
/// "not published yet" is surfaced as [`RelayError::AddressUnavailable`],
/// never a panic. No staleness guarantee beyond "the latest value at
/// lookup time".
pub trait AddressResolver: Send + Sync {
    /// Latest known backend address.
    fn resolve(&self) -> Result<BackendAddress, RelayError>;
}

/// One-shot in-process publication.
///
/// The process that launches the backend publishes the address once; any
/// number of sessions then read it lock-free. Clones share the underlying
/// slot, so the launcher keeps one handle and the server another.
#[derive(Clone, Debug, Default)]
pub struct PublishedAddress {
    slot: Arc<OnceLock<BackendAddress>>,
}

impl PublishedAddress {
    /// Create an empty, not-yet-published slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the backend address.
    ///
    /// Returns `false` if an address was already published; the first
    /// publication wins.
    pub fn publish(&self, addr: BackendAddress) -> bool {
        self.slot.set(addr).is_ok()
    }
}

impl AddressResolver for PublishedAddress {
    fn resolve(&self) -> Result<BackendAddress, RelayError> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| RelayError::address_unavailable("backend has not published an address"))
    }
}

/// Reads the backend port from an environment variable at every lookup.
#[derive(Clone, Debug)]
pub struct EnvResolver {
    host: String,
    var: String,
}

impl EnvResolver {
    /// Resolver reading `var` for the port, pairing it with `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            var: var.into(),
        }
    }
}

impl AddressResolver for EnvResolver {
    fn resolve(&self) -> Result<BackendAddress, RelayError> {
        let raw = std::env::var(&self.var)
            .map_err(|_| RelayError::address_unavailable(format!("{} is not set", self.var)))?;
        let port = parse_port(&raw)
            .map_err(|e| RelayError::address_unavailable(format!("{}: {e}", self.var)))?;
        Ok(BackendAddress::new(self.host.clone(), port))
    }
}

/// Reads the backend port from a file at every lookup.
///
/// The backend writes the file during its startup sequence; until then the
/// file is missing and resolution fails.
#[derive(Clone, Debug)]
pub struct PortFileResolver {
    host: String,
    path: PathBuf,
}

impl PortFileResolver {
    /// Resolver reading the port from `path`, pairing it with `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

impl AddressResolver for PortFileResolver {
    fn resolve(&self) -> Result<BackendAddress, RelayError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            RelayError::address_unavailable(format!("{}: {e}", self.path.display()))
        })?;
        let port = parse_port(&raw).map_err(|e| {
            RelayError::address_unavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(BackendAddress::new(self.host.clone(), port))
    }
}

/// Static address, for tests and fixed deployments.
#[derive(Clone, Debug)]
pub struct FixedResolver(pub BackendAddress);

impl AddressResolver for FixedResolver {
    fn resolve(&self) -> Result<BackendAddress, RelayError> {
        Ok(self.0.clone())
    }
}

/// Parse a published port value (trailing whitespace tolerated, zero
/// rejected — the backend never publishes before binding a real port).
fn parse_port(raw: &str) -> Result<u16, String> {
    let port = raw
        .trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid port {raw:?}: {e}"))?;
    if port == 0 {
        return Err("invalid port 0".into());
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn backend_address_display() {
        let addr = BackendAddress::new("127.0.0.1", 9001);
        assert_eq!(addr.to_string(), "127.0.0.1:9001");
    }

    #[test]
    fn published_address_starts_empty() {
        let published = PublishedAddress::new();
        let err = published.resolve().unwrap_err();
        assert!(matches!(err, RelayError::AddressUnavailable { .. }));
    }

    #[test]
    fn publish_then_resolve() {
        let published = PublishedAddress::new();
        assert!(published.publish(BackendAddress::new("127.0.0.1", 9001)));
        let addr = published.resolve().unwrap();
        assert_eq!(addr.port, 9001);
    }

    #[test]
    fn first_publication_wins() {
        let published = PublishedAddress::new();
        assert!(published.publish(BackendAddress::new("127.0.0.1", 9001)));
        assert!(!published.publish(BackendAddress::new("127.0.0.1", 9002)));
        assert_eq!(published.resolve().unwrap().port, 9001);
    }

    #[test]
    fn clones_share_the_slot() {
        let writer = PublishedAddress::new();
        let reader = writer.clone();
        assert!(writer.publish(BackendAddress::new("10.0.0.1", 4242)));
        assert_eq!(reader.resolve().unwrap().port, 4242);
    }

    #[test]
    fn env_resolver_unset_var_fails() {
        let resolver = EnvResolver::new("127.0.0.1", "VIZOR_TEST_UNSET_PORT_VAR");
        let err = resolver.resolve().unwrap_err();
        assert!(err.to_string().contains("VIZOR_TEST_UNSET_PORT_VAR"));
    }

    #[test]
    fn port_file_resolver_reads_port() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "9005").unwrap();
        let resolver = PortFileResolver::new("127.0.0.1", file.path());
        let addr = resolver.resolve().unwrap();
        assert_eq!(addr.port, 9005);
        assert_eq!(addr.host, "127.0.0.1");
    }

    #[test]
    fn port_file_resolver_missing_file_fails() {
        let resolver = PortFileResolver::new("127.0.0.1", "/nonexistent/vizor-port");
        assert!(matches!(
            resolver.resolve().unwrap_err(),
            RelayError::AddressUnavailable { .. }
        ));
    }

    #[test]
    fn port_file_resolver_sees_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("port");
        let resolver = PortFileResolver::new("127.0.0.1", &path);
        assert!(resolver.resolve().is_err());
        std::fs::write(&path, "9100").unwrap();
        assert_eq!(resolver.resolve().unwrap().port, 9100);
    }

    #[test]
    fn garbage_port_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not-a-port").unwrap();
        let resolver = PortFileResolver::new("127.0.0.1", file.path());
        assert!(resolver.resolve().is_err());
    }

    #[test]
    fn zero_port_rejected() {
        assert!(parse_port("0").is_err());
        assert_eq!(parse_port(" 9001\n").unwrap(), 9001);
    }

    #[test]
    fn fixed_resolver_always_succeeds() {
        let resolver = FixedResolver(BackendAddress::new("127.0.0.1", 7777));
        assert_eq!(resolver.resolve().unwrap().port, 7777);
    }
}
