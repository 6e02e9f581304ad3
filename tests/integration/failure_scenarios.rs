//! Slow and misbehaving clients must not disturb the rest of the fleet

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{MockServer, ResponseTemplate};

use watchpost::notify::AlertKind;
use watchpost::{HealthState, ProbeKind};

use crate::helpers::{TestStack, fake_ssh_daemon, mount_agent, probes_for};

#[tokio::test]
async fn test_slow_client_is_skipped_not_queued() {
    let agent = MockServer::start().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200).set_body_json(json!({ "profiles": [] })),
    )
    .await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    // Probing the blackhole takes the full timeout, several ticks long
    let mut probes = probes_for(&agent, ssh_port);
    probes.ping_timeout_ms = 1000;
    probes.ssh_timeout_ms = 1000;
    probes.api_timeout_ms = 1000;

    let stack = TestStack::start(
        probes,
        Duration::from_millis(150),
        Duration::from_secs(3600),
    )
    .await;

    let fast = stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();
    let slow = stack
        .registry
        .register("203.0.113.1", "ops@example.org")
        .await
        .unwrap();

    // Several ticks pass while the slow client's first poll is in flight
    tokio::time::sleep(Duration::from_millis(700)).await;

    let stats = stack.scheduler.stats().await.unwrap();
    assert!(stats.cycles_completed >= 3, "stats: {stats:?}");
    assert!(stats.polls_skipped >= 1, "stats: {stats:?}");

    // The fast client kept being polled and settled on healthy
    let status = stack.registry.get_status(fast.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Healthy);

    // Once its poll finally finishes the slow client lands on down
    tokio::time::sleep(Duration::from_millis(800)).await;
    let status = stack.registry.get_status(slow.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Down);

    let sent = stack.notifier.wait_for_sent(1).await;
    assert_eq!(sent, vec![(slow.id, AlertKind::Unhealthy)]);

    stack.stop().await;
}

#[tokio::test]
async fn test_agent_reported_error_degrades_client() {
    let agent = MockServer::start().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200).set_body_json(json!({ "error": "database locked" })),
    )
    .await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    let stack = TestStack::start(
        probes_for(&agent, ssh_port),
        Duration::from_secs(600),
        Duration::from_secs(3600),
    )
    .await;
    let client = stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();

    stack.scheduler.poll_now().await.unwrap();

    let status = stack.registry.get_status(client.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Degraded);
    let api = status
        .probes
        .iter()
        .find(|probe| probe.kind == ProbeKind::Api)
        .unwrap();
    assert_eq!(api.detail.as_deref(), Some("agent error: database locked"));

    stack.stop().await;
}

#[tokio::test]
async fn test_deregistered_client_result_is_discarded() {
    let agent = MockServer::start().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200)
            .set_body_json(json!({ "profiles": [] }))
            .set_delay(Duration::from_millis(300)),
    )
    .await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    let mut probes = probes_for(&agent, ssh_port);
    probes.api_timeout_ms = 2000;

    let stack = TestStack::start(
        probes,
        Duration::from_millis(100),
        Duration::from_secs(3600),
    )
    .await;
    let client = stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();

    // Deregister while the first poll is still waiting on the slow agent
    tokio::time::sleep(Duration::from_millis(100)).await;
    stack.registry.deregister(client.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(stack.registry.count().await, 0);
    assert!(stack.registry.get_status(client.id).await.is_none());
    assert!(stack.notifier.sent().is_empty());

    stack.stop().await;
}
