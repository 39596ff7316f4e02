// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dojo creation and membership HTTP handlers.
//!
//! Refusals of `leave` and `join` (unknown dojo, official dojo) are reported
//! in the body with `success: false` and status 200. A body that is not the
//! expected JSON gets status 400 in the same `{success, error}` shape.

use axum::{
	extract::{rejection::JsonRejection, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use dojo_server_provision::{LeaveOutcome, ProvisionError};

pub use dojo_server_api::dojo::*;

use crate::{api::AppState, auth_middleware::RequireAuth};

#[utoipa::path(
    post,
    path = "/api/v1/dojo/create",
    request_body = CreateDojoRequest,
    responses(
        (status = 200, description = "Dojo created", body = CreateDojoResponse),
        (status = 400, description = "Repository rejected, unreachable or not a dojo", body = CreateDojoResponse),
        (status = 401, description = "Not authenticated", body = DojoErrorResponse),
        (status = 500, description = "Internal error", body = CreateDojoResponse)
    ),
    tag = "dojo"
)]
#[tracing::instrument(skip(user, state, payload), fields(user_id = user.user_id))]
pub async fn create_dojo(
	RequireAuth(user): RequireAuth,
	State(state): State<AppState>,
	payload: Result<Json<CreateDojoRequest>, JsonRejection>,
) -> impl IntoResponse {
	let Json(payload) = match payload {
		Ok(payload) => payload,
		Err(rejection) => {
			tracing::info!(error = %rejection, "Malformed create request");
			return (
				StatusCode::BAD_REQUEST,
				Json(CreateDojoResponse::failed(rejection.body_text())),
			)
				.into_response();
		}
	};

	match state.publisher.publish(&payload.dojo_repo, user.user_id).await {
		Ok(dojo) => (
			StatusCode::OK,
			Json(CreateDojoResponse::created(dojo.dojo_id)),
		)
			.into_response(),
		Err(e) if e.is_client_error() => {
			tracing::info!(error = %e, "Dojo creation rejected");
			(StatusCode::BAD_REQUEST, Json(CreateDojoResponse::failed(e.to_string()))).into_response()
		}
		Err(e) => {
			tracing::error!(error = %e, "Dojo creation failed");
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(CreateDojoResponse::failed("Internal server error")),
			)
				.into_response()
		}
	}
}

#[utoipa::path(
    post,
    path = "/api/v1/dojo/leave",
    request_body = LeaveDojoRequest,
    responses(
        (status = 200, description = "Left the dojo, or refusal with success false", body = LeaveDojoResponse),
        (status = 400, description = "Malformed request body", body = LeaveDojoResponse),
        (status = 401, description = "Not authenticated", body = DojoErrorResponse),
        (status = 500, description = "Internal error", body = LeaveDojoResponse)
    ),
    tag = "dojo"
)]
#[tracing::instrument(skip(user, state, payload), fields(user_id = user.user_id, dojo_id = tracing::field::Empty))]
pub async fn leave_dojo(
	RequireAuth(user): RequireAuth,
	State(state): State<AppState>,
	payload: Result<Json<LeaveDojoRequest>, JsonRejection>,
) -> impl IntoResponse {
	let Json(payload) = match payload {
		Ok(payload) => payload,
		Err(rejection) => {
			return (
				StatusCode::BAD_REQUEST,
				Json(LeaveDojoResponse::failed(rejection.body_text())),
			)
				.into_response();
		}
	};
	tracing::Span::current().record("dojo_id", payload.dojo_id.as_str());

	match state.membership.leave(&payload.dojo_id, user.user_id).await {
		Ok(LeaveOutcome::DojoDeleted {
			directory_removed: false,
		}) => {
			tracing::warn!("Dojo deleted but its directory needs manual cleanup");
			(StatusCode::OK, Json(LeaveDojoResponse::left())).into_response()
		}
		Ok(_) => (StatusCode::OK, Json(LeaveDojoResponse::left())).into_response(),
		Err(e @ (ProvisionError::NotFound | ProvisionError::Forbidden(_))) => {
			(StatusCode::OK, Json(LeaveDojoResponse::failed(e.to_string()))).into_response()
		}
		Err(e) => {
			tracing::error!(error = %e, "Failed to leave dojo");
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(LeaveDojoResponse::failed("Internal server error")),
			)
				.into_response()
		}
	}
}

#[utoipa::path(
    post,
    path = "/api/v1/dojo/join",
    request_body = JoinDojoRequest,
    responses(
        (status = 200, description = "Joined the dojo, or refusal with success false", body = JoinDojoResponse),
        (status = 400, description = "Malformed request body", body = JoinDojoResponse),
        (status = 401, description = "Not authenticated", body = DojoErrorResponse),
        (status = 500, description = "Internal error", body = JoinDojoResponse)
    ),
    tag = "dojo"
)]
#[tracing::instrument(skip(user, state, payload), fields(user_id = user.user_id, dojo_id = tracing::field::Empty))]
pub async fn join_dojo(
	RequireAuth(user): RequireAuth,
	State(state): State<AppState>,
	payload: Result<Json<JoinDojoRequest>, JsonRejection>,
) -> impl IntoResponse {
	let Json(payload) = match payload {
		Ok(payload) => payload,
		Err(rejection) => {
			return (
				StatusCode::BAD_REQUEST,
				Json(JoinDojoResponse::failed(rejection.body_text())),
			)
				.into_response();
		}
	};
	tracing::Span::current().record("dojo_id", payload.dojo_id.as_str());

	match state.membership.join(&payload.dojo_id, user.user_id).await {
		Ok(membership) => (
			StatusCode::OK,
			Json(JoinDojoResponse::joined(membership.role.as_str())),
		)
			.into_response(),
		Err(e @ ProvisionError::NotFound) => {
			(StatusCode::OK, Json(JoinDojoResponse::failed(e.to_string()))).into_response()
		}
		Err(e) => {
			tracing::error!(error = %e, "Failed to join dojo");
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(JoinDojoResponse::failed("Internal server error")),
			)
				.into_response()
		}
	}
}
