//! Networking toward paired devices
//!
//! - [`probe`]: picks which of a peer's addresses currently answers
//! - [`transport`]: clip and file exchange with a reachable peer

pub mod probe;
pub mod transport;

pub use probe::{HostProber, HttpProbeClient, ProbeClient, DEFAULT_PROBE_TIMEOUT, PROBE_PATH};
pub use transport::{HttpPeerTransport, PeerTransport};

/// Base URL for `host:port`, bracketing IPv6 literals.
pub(crate) fn base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}
