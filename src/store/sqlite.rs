//! SQLite store implementation
//!
//! Stores client records and the latest status snapshot per client in a
//! local SQLite file. WAL mode keeps dashboard reads cheap while the
//! snapshot writer commits, and a busy timeout rides out lock contention
//! instead of failing writes.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{ClientStore, StoreHealth};
use super::error::{StoreError, StoreResult};
use crate::{Client, ClientId, HealthState, HealthStatus};

/// SQLite-backed client store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn parse_state(raw: &str) -> HealthState {
        match raw {
            "healthy" => HealthState::Healthy,
            "degraded" => HealthState::Degraded,
            "down" => HealthState::Down,
            _ => HealthState::Unknown,
        }
    }
}

#[async_trait]
impl ClientStore for SqliteStore {
    async fn load_clients(&self) -> StoreResult<Vec<Client>> {
        let rows = sqlx::query(
            "SELECT id, address, alert_email, created_at FROM clients ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let clients = rows
            .into_iter()
            .map(|row| Client {
                id: ClientId(row.get::<i64, _>("id") as u64),
                address: row.get("address"),
                alert_email: row.get("alert_email"),
                created_at: Self::millis_to_timestamp(row.get("created_at")),
            })
            .collect();

        Ok(clients)
    }

    #[instrument(skip(self, client), fields(id = %client.id))]
    async fn insert_client(&self, client: &Client) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO clients (id, address, alert_email, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(client.id.0 as i64)
        .bind(&client.address)
        .bind(&client.alert_email)
        .bind(Self::timestamp_to_millis(&client.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_client(&self, id: ClientId) -> StoreResult<()> {
        // Client and snapshot go in one transaction
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM status_snapshots WHERE client_id = ?")
            .bind(id.0 as i64)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.0 as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_alert_email(&self, id: ClientId, alert_email: &str) -> StoreResult<()> {
        sqlx::query("UPDATE clients SET alert_email = ? WHERE id = ?")
            .bind(alert_email)
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_status_snapshot(&self, id: ClientId, status: &HealthStatus) -> StoreResult<()> {
        let probes = serde_json::to_string(&status.probes)?;

        sqlx::query(
            r#"
            INSERT INTO status_snapshots (client_id, overall, since, probes, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (client_id) DO UPDATE SET
                overall = excluded.overall,
                since = excluded.since,
                probes = excluded.probes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.0 as i64)
        .bind(status.overall.as_str())
        .bind(Self::timestamp_to_millis(&status.since))
        .bind(probes)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_status_snapshot(&self, id: ClientId) -> StoreResult<Option<HealthStatus>> {
        let row = sqlx::query(
            "SELECT overall, since, probes FROM status_snapshots WHERE client_id = ?",
        )
        .bind(id.0 as i64)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let overall: String = row.get("overall");
        let probes: String = row.get("probes");

        Ok(Some(HealthStatus {
            overall: Self::parse_state(&overall),
            probes: serde_json::from_str(&probes)?,
            since: Self::millis_to_timestamp(row.get("since")),
        }))
    }

    async fn health_check(&self) -> StoreResult<StoreHealth> {
        let result = sqlx::query("SELECT COUNT(*) as count FROM clients")
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => {
                let count: i64 = row.get("count");
                Ok(StoreHealth {
                    healthy: true,
                    message: "sqlite store operational".to_string(),
                    metadata: HashMap::from([
                        ("backend".to_string(), "sqlite".to_string()),
                        ("path".to_string(), self.db_path.clone()),
                        ("clients".to_string(), count.to_string()),
                    ]),
                })
            }
            Err(error) => Ok(StoreHealth {
                healthy: false,
                message: format!("sqlite query failed: {error}"),
                metadata: HashMap::from([("backend".to_string(), "sqlite".to_string())]),
            }),
        }
    }

    async fn close(&self) -> StoreResult<()> {
        debug!("closing sqlite connection pool");
        self.pool.close().await;
        Ok(())
    }
}
