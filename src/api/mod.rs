//! Dashboard REST API
//!
//! Thin HTTP surface over the registry and the store. Every read is served
//! from the registry's live state; writes go to the registry first and are
//! mirrored into the store best-effort.
//!
//! ## Endpoints
//!
//! - `GET /health` - Process health (store + scheduler checks)
//! - `GET /api/v1/clients` - List clients with current status
//! - `POST /api/v1/clients` - Register a client
//! - `DELETE /api/v1/clients/:id` - Deregister a client
//! - `PATCH /api/v1/clients/:id` - Update the alert recipient
//! - `GET /api/v1/clients/:id/status` - Current status of one client

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get},
};
use tokio::sync::oneshot;
use tracing::info;

use crate::config::ApiConfig;

/// Spawn the API server
///
/// Starts an Axum HTTP server in a background task and returns its local
/// address. The server drains and stops once `shutdown` fires.
pub async fn spawn_api_server(
    config: &ApiConfig,
    state: ApiState,
    shutdown: oneshot::Receiver<()>,
) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/clients",
            get(routes::clients::list_clients).post(routes::clients::register_client),
        )
        .route(
            "/api/v1/clients/:id",
            delete(routes::clients::deregister_client).patch(routes::clients::update_client),
        )
        .route(
            "/api/v1/clients/:id/status",
            get(routes::clients::get_client_status),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown.await;
        });
        if let Err(e) = serve.await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
