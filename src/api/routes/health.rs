//! Process health endpoint

use axum::{Json, extract::State, http::StatusCode};

use crate::api::state::ApiState;
use crate::api::types::{HealthCheck, HealthResponse};

/// GET /health
///
/// Reports whether the store answers and the scheduler is alive. Returns
/// 503 as soon as either check fails so load balancers and uptime monitors
/// see the degradation.
pub async fn health_check(
    State(state): State<ApiState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store = match state.store.health_check().await {
        Ok(health) => HealthCheck {
            healthy: health.healthy,
            message: health.message,
        },
        Err(error) => HealthCheck {
            healthy: false,
            message: error.to_string(),
        },
    };

    let scheduler = match state.scheduler.stats().await {
        Ok(stats) => HealthCheck {
            healthy: true,
            message: format!(
                "{} cycles completed, {} polls in flight, {} skipped",
                stats.cycles_completed, stats.polls_in_flight, stats.polls_skipped
            ),
        },
        Err(error) => HealthCheck {
            healthy: false,
            message: error.to_string(),
        },
    };

    let healthy = store.healthy && scheduler.healthy;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        store,
        scheduler,
    };

    (status, Json(response))
}
