//! Restart behavior: clients survive, statuses start over as unknown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use watchpost::actors::snapshots::{SnapshotWriter, StatusUpdate};
use watchpost::registry::ClientRegistry;
use watchpost::store::{ClientStore, SqliteStore};
use watchpost::{
    ClientId, HealthState, HealthStatus, ProbeKind, ProbeReport, ProbeResult,
};

fn degraded_status() -> HealthStatus {
    let report = ProbeReport {
        ping: ProbeResult::success(ProbeKind::Ping, Duration::from_millis(1)),
        ssh_port: ProbeResult::failure(ProbeKind::SshPort, None, "connection refused"),
        api: ProbeResult::success(ProbeKind::Api, Duration::from_millis(2)),
    };
    HealthStatus {
        overall: report.overall(),
        probes: report.iter().cloned().collect(),
        since: Utc::now(),
    }
}

#[tokio::test]
async fn test_restart_seeds_registry_and_resumes_ids() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("clients.db");

    // First run: register two clients and write a snapshot through the
    // writer task, like the poll path does
    {
        let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let registry = ClientRegistry::new();

        let first = registry
            .register("10.0.0.1", "ops@example.org")
            .await
            .unwrap();
        let second = registry
            .register("client.example.org", "oncall@example.org")
            .await
            .unwrap();
        store.insert_client(&first).await.unwrap();
        store.insert_client(&second).await.unwrap();

        let (update_tx, handle) = SnapshotWriter::spawn(store.clone() as Arc<dyn ClientStore>);
        update_tx
            .send(StatusUpdate {
                client_id: second.id,
                status: degraded_status(),
            })
            .await
            .unwrap();
        drop(update_tx);
        handle.await.unwrap();

        store.close().await.unwrap();
    }

    // Second run: seed from the store
    let store = SqliteStore::new(&db_path).await.unwrap();
    let clients = store.load_clients().await.unwrap();
    assert_eq!(clients.len(), 2);
    assert_eq!(clients[0].id, ClientId(1));
    assert_eq!(clients[0].address, "10.0.0.1");
    assert_eq!(clients[1].id, ClientId(2));
    assert_eq!(clients[1].alert_email, "oncall@example.org");

    let registry = ClientRegistry::new();
    registry.seed(clients).await;

    // Live statuses restart as unknown no matter what was snapshotted
    let status = registry.get_status(ClientId(2)).await.unwrap();
    assert_eq!(status.overall, HealthState::Unknown);
    assert!(status.probes.is_empty());

    // The snapshot itself is still there for the dashboard
    let snapshot = store.load_status_snapshot(ClientId(2)).await.unwrap();
    assert_eq!(snapshot.unwrap().overall, HealthState::Degraded);

    // The id counter resumes above the highest stored id
    let next = registry
        .register("10.0.0.3", "ops@example.org")
        .await
        .unwrap();
    assert_eq!(next.id, ClientId(3));

    store.close().await.unwrap();
}

#[tokio::test]
async fn test_alert_email_update_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("clients.db");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        let client = watchpost::Client {
            id: ClientId(1),
            address: "10.0.0.1".to_string(),
            alert_email: "ops@example.org".to_string(),
            created_at: Utc::now(),
        };
        store.insert_client(&client).await.unwrap();
        store
            .update_alert_email(client.id, "oncall@example.org")
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteStore::new(&db_path).await.unwrap();
    let clients = store.load_clients().await.unwrap();
    assert_eq!(clients[0].alert_email, "oncall@example.org");
    store.close().await.unwrap();
}
