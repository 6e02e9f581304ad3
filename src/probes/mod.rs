//! Probes executed against a client during a poll cycle
//!
//! Every probe returns a [`ProbeResult`](crate::ProbeResult) instead of an
//! error: unreachable hosts, refused connections and timeouts are normal
//! observations for a health monitor, not faults of the monitor itself.

pub mod api;
pub mod ping;
pub mod ssh;

pub use api::api_probe;
pub use ping::ping_probe;
pub use ssh::ssh_probe;

/// Format an address and port for connecting, bracketing bare IPv6 literals.
pub(crate) fn host_port(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}
