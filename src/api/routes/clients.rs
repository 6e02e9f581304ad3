//! Client management endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::warn;

use crate::ClientId;
use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{ClientResponse, RegisterRequest, StatusResponse, UpdateClientRequest},
};

/// GET /api/v1/clients
///
/// List every registered client joined with its current status
pub async fn list_clients(State(state): State<ApiState>) -> Json<Value> {
    let clients: Vec<ClientResponse> = state
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(ClientResponse::from)
        .collect();

    Json(json!({
        "clients": clients,
        "count": clients.len(),
    }))
}

/// POST /api/v1/clients
///
/// Register a new client. Validation happens in the registry; the store
/// write is mirrored best-effort so a broken database never blocks
/// monitoring a new client.
pub async fn register_client(
    State(state): State<ApiState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ClientResponse>)> {
    let client = state
        .registry
        .register(&request.address, &request.alert_email)
        .await?;

    if let Err(error) = state.store.insert_client(&client).await {
        warn!(id = %client.id, "failed to persist new client: {error}");
    }

    let status = state
        .registry
        .get_status(client.id)
        .await
        .unwrap_or_else(|| crate::HealthStatus::unknown(client.created_at));

    Ok((StatusCode::CREATED, Json((client, status).into())))
}

/// DELETE /api/v1/clients/:id
///
/// Deregister a client. An in-flight poll for it finishes but its result
/// is discarded, and the dispatcher drops its alert state.
pub async fn deregister_client(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let id = ClientId(id);
    state.registry.deregister(id).await?;
    state.dispatcher.forget(id).await;

    if let Err(error) = state.store.delete_client(id).await {
        warn!(%id, "failed to delete stored client: {error}");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/v1/clients/:id
///
/// Change the alert recipient of a client
pub async fn update_client(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateClientRequest>,
) -> ApiResult<Json<ClientResponse>> {
    let id = ClientId(id);
    let client = state
        .registry
        .update_alert_email(id, &request.alert_email)
        .await?;

    if let Err(error) = state.store.update_alert_email(id, &request.alert_email).await {
        warn!(%id, "failed to persist alert email change: {error}");
    }

    let status = state
        .registry
        .get_status(id)
        .await
        .unwrap_or_else(|| crate::HealthStatus::unknown(client.created_at));

    Ok(Json((client, status).into()))
}

/// GET /api/v1/clients/:id/status
///
/// Current status of one client
pub async fn get_client_status(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state
        .registry
        .get_status(ClientId(id))
        .await
        .ok_or_else(|| crate::api::ApiError::NotFound(format!("no client with id {id}")))?;

    Ok(Json(status.into()))
}
