//! Ping probe with native ICMP and a TCP connect fallback
//!
//! Uses blocking sockets in spawn_blocking for sub-millisecond timing
//! precision. When ICMP sockets cannot be created (no CAP_NET_RAW and no
//! ping_group_range entry) reachability is judged by a TCP connect instead:
//! a completed or refused connection both prove the host is routable and
//! answering, only a timeout counts as unreachable.

use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::{ProbeKind, ProbeResult};

/// ICMP capability state
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    /// Native ICMP sockets are available
    Native,
    /// Only the TCP connect fallback is available
    TcpOnly,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

/// Echo sequence counter so concurrent pings can tell replies apart
static ECHO_SEQUENCE: AtomicU16 = AtomicU16::new(0);

fn next_echo_id() -> (u16, u16) {
    let identifier = (std::process::id() & 0xffff) as u16;
    let sequence = ECHO_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (identifier, sequence)
}

/// Detect ICMP capability by attempting to create a socket.
fn detect_icmp_capability() -> IcmpCapability {
    // RAW first (requires CAP_NET_RAW or root), then DGRAM (unprivileged)
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        info!("ping probe: using native ICMP (RAW socket)");
        return IcmpCapability::Native;
    }

    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        info!("ping probe: using native ICMP (DGRAM socket)");
        return IcmpCapability::Native;
    }

    info!("ping probe: native ICMP unavailable, using TCP connect fallback");
    IcmpCapability::TcpOnly
}

/// Check whether a client is reachable at all.
pub async fn ping_probe(address: &str, config: &ProbeConfig) -> ProbeResult {
    let timeout = config.ping_timeout();

    let ip = match resolve_address(address, timeout).await {
        Ok(ip) => ip,
        Err(detail) => return ProbeResult::failure(ProbeKind::Ping, None, detail),
    };

    let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);

    if capability == IcmpCapability::Native {
        // Blocking ICMP in a dedicated thread for precise timing
        let result = tokio::task::spawn_blocking(move || run_blocking_ping(ip, timeout)).await;

        match result {
            Ok(Ok(latency)) => return ProbeResult::success(ProbeKind::Ping, latency),
            Ok(Err(EchoError::Timeout)) => {
                return ProbeResult::failure(ProbeKind::Ping, None, "timeout");
            }
            Ok(Err(EchoError::Denied(detail))) => {
                warn!("native ping denied for {address}, falling back to TCP: {detail}");
            }
            Ok(Err(EchoError::Socket(detail))) => {
                return ProbeResult::failure(ProbeKind::Ping, None, detail);
            }
            Err(join_error) => {
                return ProbeResult::failure(
                    ProbeKind::Ping,
                    None,
                    format!("ping task failed: {join_error}"),
                );
            }
        }
    }

    tcp_fallback(ip, config.tcp_fallback_port, timeout).await
}

/// Resolve hostname to IP address, bounded by the probe timeout.
///
/// The system resolver has no deadline of its own; a hung nameserver must
/// not stall the probe past its budget.
async fn resolve_address(address: &str, timeout: Duration) -> Result<IpAddr, String> {
    // Try direct parse first
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    // DNS resolution
    let lookup = tokio::net::lookup_host(format!("{address}:0"));
    let addrs: Vec<_> = match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(e)) => return Err(format!("DNS resolution failed: {e}")),
        Err(_) => return Err("DNS resolution timed out".to_string()),
    };

    addrs
        .into_iter()
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| format!("no addresses found for {address}"))
}

/// Internal error for the native echo path.
#[derive(Debug)]
enum EchoError {
    /// No reply within the timeout
    Timeout,
    /// Socket creation or use was denied (triggers the TCP fallback)
    Denied(String),
    /// Any other socket error
    Socket(String),
}

fn classify_socket_error(what: &str, error: std::io::Error) -> EchoError {
    if error.kind() == std::io::ErrorKind::PermissionDenied {
        EchoError::Denied(format!("{what}: {error}"))
    } else {
        EchoError::Socket(format!("{what}: {error}"))
    }
}

/// Receive budget left before the deadline.
///
/// A foreign packet restarts the blocking recv, so each iteration only
/// gets what remains of the original timeout, not a fresh one.
fn remaining_timeout(timeout: Duration, elapsed: Duration) -> Result<Duration, EchoError> {
    timeout
        .checked_sub(elapsed)
        .filter(|remaining| !remaining.is_zero())
        .ok_or(EchoError::Timeout)
}

/// Run blocking ICMP ping with precise timing.
/// This runs in a dedicated thread via spawn_blocking.
fn run_blocking_ping(ip: IpAddr, timeout: Duration) -> Result<Duration, EchoError> {
    match ip {
        IpAddr::V4(v4) => run_blocking_ping_v4(v4, timeout),
        IpAddr::V6(v6) => run_blocking_ping_v6(v6, timeout),
    }
}

/// ICMP Echo Request for IPv4
fn run_blocking_ping_v4(ip: Ipv4Addr, timeout: Duration) -> Result<Duration, EchoError> {
    // RAW first (privileged), then DGRAM (unprivileged)
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .or_else(|_| Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)))
        .map_err(|e| classify_socket_error("failed to create ICMP socket", e))?;

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| EchoError::Socket(format!("failed to set timeout: {e}")))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| EchoError::Socket(format!("failed to set timeout: {e}")))?;

    let dest = SocketAddr::new(IpAddr::V4(ip), 0);
    socket
        .connect(&dest.into())
        .map_err(|e| classify_socket_error("failed to connect", e))?;

    let (identifier, sequence) = next_echo_id();
    let packet = build_icmp_echo_request(identifier, sequence);

    // Start timing just before send
    let start = Instant::now();

    socket
        .send(&packet)
        .map_err(|e| classify_socket_error("failed to send", e))?;

    // Receive until our reply arrives or the timeout hits
    loop {
        let remaining = remaining_timeout(timeout, start.elapsed())?;
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| EchoError::Socket(format!("failed to set timeout: {e}")))?;

        let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
        let len = socket.recv(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut
            {
                EchoError::Timeout
            } else {
                EchoError::Socket(format!("failed to receive: {e}"))
            }
        })?;
        // SAFETY: recv initialized `len` bytes
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        // Stop timing immediately after receive
        let elapsed = start.elapsed();

        if elapsed >= timeout {
            return Err(EchoError::Timeout);
        }

        // RAW sockets deliver the IP header before the ICMP message,
        // DGRAM sockets deliver the ICMP message directly
        if len >= 8 {
            let icmp_offset = if buf[0] >> 4 == 4 { 20 } else { 0 };
            if len > icmp_offset + 7 {
                let reply_type = buf[icmp_offset];
                let reply_id = u16::from_be_bytes([buf[icmp_offset + 4], buf[icmp_offset + 5]]);
                let reply_seq = u16::from_be_bytes([buf[icmp_offset + 6], buf[icmp_offset + 7]]);

                // ICMP type 0 = Echo Reply
                if reply_type == 0 && reply_id == identifier && reply_seq == sequence {
                    return Ok(elapsed);
                }
            }
        }
        // Someone else's packet, keep waiting
    }
}

/// ICMP Echo Request for IPv6
fn run_blocking_ping_v6(ip: Ipv6Addr, timeout: Duration) -> Result<Duration, EchoError> {
    let socket = Socket::new(Domain::IPV6, Type::RAW, Some(Protocol::ICMPV6))
        .or_else(|_| Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::ICMPV6)))
        .map_err(|e| classify_socket_error("failed to create ICMPv6 socket", e))?;

    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| EchoError::Socket(format!("failed to set timeout: {e}")))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| EchoError::Socket(format!("failed to set timeout: {e}")))?;

    let dest = SocketAddr::new(IpAddr::V6(ip), 0);
    socket
        .connect(&dest.into())
        .map_err(|e| classify_socket_error("failed to connect", e))?;

    let (identifier, sequence) = next_echo_id();
    let packet = build_icmpv6_echo_request(identifier, sequence);

    let start = Instant::now();

    socket
        .send(&packet)
        .map_err(|e| classify_socket_error("failed to send", e))?;

    loop {
        let remaining = remaining_timeout(timeout, start.elapsed())?;
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| EchoError::Socket(format!("failed to set timeout: {e}")))?;

        let mut buf = [MaybeUninit::<u8>::uninit(); 1500];
        let len = socket.recv(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut
            {
                EchoError::Timeout
            } else {
                EchoError::Socket(format!("failed to receive: {e}"))
            }
        })?;
        // SAFETY: recv initialized `len` bytes
        let buf: &[u8] = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, len) };

        let elapsed = start.elapsed();

        if elapsed >= timeout {
            return Err(EchoError::Timeout);
        }

        // ICMPv6 type 129 = Echo Reply, delivered without an IP header
        if len >= 8 {
            let reply_type = buf[0];
            let reply_id = u16::from_be_bytes([buf[4], buf[5]]);
            let reply_seq = u16::from_be_bytes([buf[6], buf[7]]);

            if reply_type == 129 && reply_id == identifier && reply_seq == sequence {
                return Ok(elapsed);
            }
        }
    }
}

/// TCP connect reachability check, used when ICMP is unavailable.
async fn tcp_fallback(ip: IpAddr, port: u16, timeout: Duration) -> ProbeResult {
    let start = Instant::now();

    match tokio::time::timeout(timeout, TcpStream::connect(SocketAddr::new(ip, port))).await {
        Ok(Ok(_stream)) => ProbeResult::success(ProbeKind::Ping, start.elapsed()),
        // A refused connection still proves the host answers
        Ok(Err(error)) if error.kind() == std::io::ErrorKind::ConnectionRefused => {
            ProbeResult::success(ProbeKind::Ping, start.elapsed())
        }
        Ok(Err(error)) => ProbeResult::failure(
            ProbeKind::Ping,
            Some(start.elapsed()),
            format!("tcp fallback: {error}"),
        ),
        Err(_) => ProbeResult::failure(ProbeKind::Ping, None, "timeout"),
    }
}

/// Build an ICMP Echo Request packet (type 8, code 0).
fn build_icmp_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64]; // 8 byte header + 56 byte payload

    packet[0] = 8; // Type: Echo Request
    packet[1] = 0; // Code: 0
    // Checksum at [2..4], computed below
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    // Payload carries the send time
    let timestamp = chrono::Utc::now().timestamp_micros();
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// Build an ICMPv6 Echo Request packet (type 128, code 0).
///
/// The checksum is left zero, the kernel fills it in for ICMPv6 sockets.
fn build_icmpv6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64];

    packet[0] = 128; // Type: Echo Request
    packet[1] = 0; // Code: 0
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let timestamp = chrono::Utc::now().timestamp_micros();
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    packet
}

/// Compute the ICMP checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i + 1 < data.len() {
        sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        i += 2;
    }

    // Odd trailing byte
    if i < data.len() {
        sum += (data[i] as u32) << 8;
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}
