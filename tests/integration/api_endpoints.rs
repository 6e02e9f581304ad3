//! HTTP surface of the dashboard API

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use wiremock::{MockServer, ResponseTemplate};

use watchpost::api::{ApiState, spawn_api_server};
use watchpost::config::{ApiConfig, ProbeConfig};
use watchpost::store::ClientStore;

use crate::helpers::{TestStack, fake_ssh_daemon, mount_agent, probes_for};

async fn start_api(stack: &TestStack) -> (SocketAddr, oneshot::Sender<()>) {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: false,
    };
    let state = ApiState {
        registry: Arc::clone(&stack.registry),
        store: stack.store.clone() as Arc<dyn ClientStore>,
        scheduler: stack.scheduler.clone(),
        dispatcher: stack.dispatcher.clone(),
    };
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let addr = spawn_api_server(&config, state, shutdown_rx).await.unwrap();
    (addr, shutdown_tx)
}

async fn manual_stack() -> TestStack {
    TestStack::start(
        ProbeConfig::default(),
        Duration::from_secs(600),
        Duration::from_secs(3600),
    )
    .await
}

#[tokio::test]
async fn test_register_list_and_status() {
    let stack = manual_stack().await;
    let (addr, _shutdown_tx) = start_api(&stack).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{addr}/api/v1/clients"))
        .json(&json!({ "address": "10.0.0.1", "alert_email": "ops@example.org" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let created: Value = response.json().await.unwrap();
    assert_eq!(created["id"], 1);
    assert_eq!(created["address"], "10.0.0.1");
    assert_eq!(created["alert_email"], "ops@example.org");
    assert_eq!(created["status"]["overall"], "unknown");

    let response = http
        .get(format!("http://{addr}/api/v1/clients"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let list: Value = response.json().await.unwrap();
    assert_eq!(list["count"], 1);
    assert_eq!(list["clients"][0]["id"], 1);

    let response = http
        .get(format!("http://{addr}/api/v1/clients/1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let status: Value = response.json().await.unwrap();
    assert_eq!(status["overall"], "unknown");
    assert_eq!(status["probes"], json!([]));

    let response = http
        .get(format!("http://{addr}/api/v1/clients/99/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    stack.stop().await;
}

#[tokio::test]
async fn test_register_rejects_bad_input_and_duplicates() {
    let stack = manual_stack().await;
    let (addr, _shutdown_tx) = start_api(&stack).await;
    let http = reqwest::Client::new();
    let url = format!("http://{addr}/api/v1/clients");

    let response = http
        .post(&url)
        .json(&json!({ "address": "bad host", "alert_email": "ops@example.org" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid client address"));

    let response = http
        .post(&url)
        .json(&json!({ "address": "10.0.0.1", "alert_email": "not-an-email" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = http
        .post(&url)
        .json(&json!({ "address": "10.0.0.1", "alert_email": "ops@example.org" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = http
        .post(&url)
        .json(&json!({ "address": "10.0.0.1", "alert_email": "ops@example.org" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    stack.stop().await;
}

#[tokio::test]
async fn test_update_and_deregister() {
    let stack = manual_stack().await;
    let (addr, _shutdown_tx) = start_api(&stack).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{addr}/api/v1/clients"))
        .json(&json!({ "address": "10.0.0.1", "alert_email": "ops@example.org" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = http
        .patch(format!("http://{addr}/api/v1/clients/1"))
        .json(&json!({ "alert_email": "oncall@example.org" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["alert_email"], "oncall@example.org");

    let response = http
        .patch(format!("http://{addr}/api/v1/clients/1"))
        .json(&json!({ "alert_email": "nonsense" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = http
        .delete(format!("http://{addr}/api/v1/clients/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = http
        .delete(format!("http://{addr}/api/v1/clients/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = http
        .get(format!("http://{addr}/api/v1/clients/1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    stack.stop().await;
}

#[tokio::test]
async fn test_deregister_drops_alert_bookkeeping() {
    // Broken agent, so the first poll opens an alert episode
    let agent = MockServer::start().await;
    mount_agent(&agent, ResponseTemplate::new(500)).await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    let stack = TestStack::start(
        probes_for(&agent, ssh_port),
        Duration::from_secs(600),
        Duration::from_secs(3600),
    )
    .await;
    let (addr, _shutdown_tx) = start_api(&stack).await;
    let http = reqwest::Client::new();

    let client = stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();
    stack.scheduler.poll_now().await.unwrap();
    stack.notifier.wait_for_sent(1).await;

    let alert = stack.dispatcher.get_state(client.id).await.unwrap();
    assert!(alert.active);

    let response = http
        .delete(format!("http://{addr}/api/v1/clients/{}", client.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // The dispatcher drops the episode along with the client
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while stack.dispatcher.get_state(client.id).await.is_some() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "alert state outlived its client"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    stack.stop().await;
}

#[tokio::test]
async fn test_list_reflects_poll_results() {
    let agent = MockServer::start().await;
    mount_agent(
        &agent,
        ResponseTemplate::new(200).set_body_json(json!({ "profiles": [] })),
    )
    .await;
    let (_sshd, ssh_port) = fake_ssh_daemon().await;

    let stack = TestStack::start(
        probes_for(&agent, ssh_port),
        Duration::from_secs(600),
        Duration::from_secs(3600),
    )
    .await;
    let (addr, _shutdown_tx) = start_api(&stack).await;
    let http = reqwest::Client::new();

    stack
        .registry
        .register("127.0.0.1", "ops@example.org")
        .await
        .unwrap();
    stack.scheduler.poll_now().await.unwrap();

    let list: Value = http
        .get(format!("http://{addr}/api/v1/clients"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["clients"][0]["status"]["overall"], "healthy");
    assert_eq!(
        list["clients"][0]["status"]["probes"].as_array().unwrap().len(),
        3
    );

    stack.stop().await;
}

#[tokio::test]
async fn test_health_endpoint_degrades_without_scheduler() {
    let stack = manual_stack().await;
    let (addr, _shutdown_tx) = start_api(&stack).await;
    let http = reqwest::Client::new();

    let response = http
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"]["healthy"], true);
    assert_eq!(body["scheduler"]["healthy"], true);

    // Take the scheduler down, the endpoint must flip to 503
    stack.scheduler.shutdown().await.unwrap();

    let response = http
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["scheduler"]["healthy"], false);

    stack.stop().await;
}
