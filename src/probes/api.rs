//! Agent API probe
//!
//! Clients run a small local agent that answers HTTP requests. The probe
//! issues a GET against one of its endpoints and treats any well-formed
//! answer as proof the agent is alive. Agents sometimes report internal
//! failures inside a 200 response, so the body is inspected as well.

use std::time::Instant;

use crate::config::ProbeConfig;
use crate::{ProbeKind, ProbeResult};

use super::host_port;

/// Check whether the client's local agent API answers.
pub async fn api_probe(client: &reqwest::Client, address: &str, config: &ProbeConfig) -> ProbeResult {
    let url = format!(
        "http://{}{}",
        host_port(address, config.api_port),
        config.api_path
    );

    let start = Instant::now();

    let response = match client.get(&url).timeout(config.api_timeout()).send().await {
        Ok(response) => response,
        Err(error) if error.is_timeout() => {
            return ProbeResult::failure(ProbeKind::Api, None, "timeout");
        }
        Err(error) => {
            return ProbeResult::failure(
                ProbeKind::Api,
                Some(start.elapsed()),
                request_detail(&error),
            );
        }
    };

    let status = response.status();
    if !status.is_success() {
        return ProbeResult::failure(
            ProbeKind::Api,
            Some(start.elapsed()),
            format!("HTTP {}", status.as_u16()),
        );
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(error) if error.is_timeout() => {
            return ProbeResult::failure(ProbeKind::Api, None, "timeout");
        }
        Err(error) => {
            return ProbeResult::failure(
                ProbeKind::Api,
                Some(start.elapsed()),
                request_detail(&error),
            );
        }
    };

    let latency = start.elapsed();

    // Agents report internal failures inside a 200 response
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(error) = value.get("error") {
            let detail = error
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| error.to_string());
            return ProbeResult::failure(
                ProbeKind::Api,
                Some(latency),
                format!("agent error: {detail}"),
            );
        }

        if let Some(reported) = value.get("status").and_then(|s| s.as_str()) {
            if reported == "error" || reported == "down" {
                return ProbeResult::failure(
                    ProbeKind::Api,
                    Some(latency),
                    format!("agent status: {reported}"),
                );
            }
        }
    }

    ProbeResult::success(ProbeKind::Api, latency)
}

/// Map transport errors to a short probe detail.
fn request_detail(error: &reqwest::Error) -> String {
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::ConnectionRefused => "connection refused".to_string(),
                std::io::ErrorKind::HostUnreachable => "host unreachable".to_string(),
                std::io::ErrorKind::NetworkUnreachable => "network unreachable".to_string(),
                _ => io.to_string(),
            };
        }
        source = inner.source();
    }

    if error.is_connect() {
        "connect error".to_string()
    } else {
        error.to_string()
    }
}
