// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use dojo_server_api::{HealthResponse, HealthStatus};

use crate::api::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server and database are healthy", body = HealthResponse),
        (status = 503, description = "Database is unreachable", body = HealthResponse)
    ),
    tag = "health"
)]
/// GET /health - liveness plus a database ping.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let version = env!("CARGO_PKG_VERSION").to_string();

	match state.repo.ping().await {
		Ok(()) => (
			StatusCode::OK,
			Json(HealthResponse {
				status: HealthStatus::Healthy,
				database: HealthStatus::Healthy,
				version,
				error: None,
			}),
		),
		Err(e) => {
			tracing::warn!(error = %e, "Health check database ping failed");
			(
				StatusCode::SERVICE_UNAVAILABLE,
				Json(HealthResponse {
					status: HealthStatus::Unhealthy,
					database: HealthStatus::Unhealthy,
					version,
					error: Some(e.to_string()),
				}),
			)
		}
	}
}
