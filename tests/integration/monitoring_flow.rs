//! End-to-end flow: probes, health derivation, snapshots and alerts

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{MockServer, ResponseTemplate};

use watchpost::config::ProbeConfig;
use watchpost::notify::AlertKind;
use watchpost::store::ClientStore;
use watchpost::{HealthState, ProbeKind};

use crate::helpers::{TestStack, closed_port, fake_ssh_daemon, mount_agent, probes_for};

// Long enough that only explicit poll_now calls drive cycles
const MANUAL: Duration = Duration::from_secs(600);
const COOLDOWN: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_healthy_client_end_to_end() {
    let agent = MockServer::start().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200).set_body_json(json!({ "profiles": [] })),
    )
    .await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    let stack = TestStack::start(probes_for(&agent, ssh_port), MANUAL, COOLDOWN).await;
    let client = stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();

    let started = stack.scheduler.poll_now().await.unwrap();
    assert_eq!(started, 1);

    let status = stack.registry.get_status(client.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Healthy);
    assert_eq!(status.probes.len(), 3);
    assert!(status.probes.iter().all(|probe| probe.ok));

    // Unknown -> healthy is not an alertable transition
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(stack.notifier.sent().is_empty());

    let store = stack.store.clone();
    stack.stop().await;

    // Shutdown flushed the snapshot
    let snapshot = store.load_status_snapshot(client.id).await.unwrap();
    assert_eq!(snapshot.unwrap().overall, HealthState::Healthy);
}

#[tokio::test]
async fn test_degraded_agent_alerts_once_and_recovery_notifies() {
    let agent = MockServer::start().await;
    mount_agent(&agent, ResponseTemplate::new(500)).await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    let stack = TestStack::start(probes_for(&agent, ssh_port), MANUAL, COOLDOWN).await;
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
    assert_eq!(api.detail.as_deref(), Some("HTTP 500"));

    let sent = stack.notifier.wait_for_sent(1).await;
    assert_eq!(sent, vec![(client.id, AlertKind::Unhealthy)]);

    let alert = stack.dispatcher.get_state(client.id).await.unwrap();
    assert!(alert.active);

    // A confirming cycle is no transition: within the cooldown it stays
    // silent and `since` does not move
    let since = status.since;
    stack.scheduler.poll_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = stack.registry.get_status(client.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Degraded);
    assert_eq!(status.since, since);
    assert_eq!(stack.notifier.sent().len(), 1);

    // Agent comes back: recovery is delivered despite the active cooldown
    agent.reset().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200).set_body_json(json!({ "profiles": [] })),
    )
    .await;

    stack.scheduler.poll_now().await.unwrap();

    let sent = stack.notifier.wait_for_sent(2).await;
    assert_eq!(
        sent,
        vec![
            (client.id, AlertKind::Unhealthy),
            (client.id, AlertKind::Recovered),
        ]
    );

    let status = stack.registry.get_status(client.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Healthy);

    let alert = stack.dispatcher.get_state(client.id).await.unwrap();
    assert!(!alert.active);

    stack.stop().await;
}

#[tokio::test]
async fn test_closed_ssh_port_alone_degrades() {
    let agent = MockServer::start().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200).set_body_json(json!({ "profiles": [] })),
    )
    .await;
    let ssh_port = closed_port().await;

    let stack = TestStack::start(probes_for(&agent, ssh_port), MANUAL, COOLDOWN).await;
    let client = stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();

    stack.scheduler.poll_now().await.unwrap();

    let status = stack.registry.get_status(client.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Degraded);
    let ssh = status
        .probes
        .iter()
        .find(|probe| probe.kind == ProbeKind::SshPort)
        .unwrap();
    assert_eq!(ssh.detail.as_deref(), Some("connection refused"));

    let sent = stack.notifier.wait_for_sent(1).await;
    assert_eq!(sent, vec![(client.id, AlertKind::Unhealthy)]);

    stack.stop().await;
}

#[tokio::test]
async fn test_unreachable_client_goes_down() {
    // TEST-NET-3, nothing answers there
    let probes = ProbeConfig {
        ping_timeout_ms: 100,
        ssh_timeout_ms: 100,
        api_timeout_ms: 200,
        ..ProbeConfig::default()
    };

    let stack = TestStack::start(probes, MANUAL, COOLDOWN).await;
    let client = stack
        .registry
        .register("203.0.113.1", "ops@example.org")
        .await
        .unwrap();

    stack.scheduler.poll_now().await.unwrap();

    let status = stack.registry.get_status(client.id).await.unwrap();
    assert_eq!(status.overall, HealthState::Down);
    let ping = status
        .probes
        .iter()
        .find(|probe| probe.kind == ProbeKind::Ping)
        .unwrap();
    assert!(!ping.ok);

    let sent = stack.notifier.wait_for_sent(1).await;
    assert_eq!(sent, vec![(client.id, AlertKind::Unhealthy)]);

    stack.stop().await;
}
