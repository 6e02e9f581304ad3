//! SSH port probe
//!
//! A plain TCP connect against the configured SSH port. The probe does not
//! speak the SSH protocol, an accepted connection is enough to call the
//! service present.

use std::time::Instant;

use tokio::net::TcpStream;

use crate::config::ProbeConfig;
use crate::{ProbeKind, ProbeResult};

use super::host_port;

/// Check whether the client accepts connections on its SSH port.
pub async fn ssh_probe(address: &str, config: &ProbeConfig) -> ProbeResult {
    let target = host_port(address, config.ssh_port);
    let start = Instant::now();

    match tokio::time::timeout(config.ssh_timeout(), TcpStream::connect(&target)).await {
        Ok(Ok(_stream)) => ProbeResult::success(ProbeKind::SshPort, start.elapsed()),
        Ok(Err(error)) => ProbeResult::failure(
            ProbeKind::SshPort,
            Some(start.elapsed()),
            connect_detail(&error),
        ),
        Err(_) => ProbeResult::failure(ProbeKind::SshPort, None, "timeout"),
    }
}

fn connect_detail(error: &std::io::Error) -> String {
    match error.kind() {
        std::io::ErrorKind::ConnectionRefused => "connection refused".to_string(),
        std::io::ErrorKind::HostUnreachable => "host unreachable".to_string(),
        std::io::ErrorKind::NetworkUnreachable => "network unreachable".to_string(),
        _ => error.to_string(),
    }
}
