// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Authentication middleware for Axum.
//!
//! The server sits behind the platform that owns user sessions. That
//! platform asserts the caller's identity in the `X-Dojo-User-Id` header;
//! [`auth_layer`] turns it into an [`AuthContext`] request extension and
//! handlers demand it with the [`RequireAuth`] extractor:
//!
//! ```ignore
//! async fn protected_handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
//!     format!("Hello, user {}!", user.user_id)
//! }
//! ```

use axum::{
	body::Body,
	extract::FromRequestParts,
	http::{request::Parts, HeaderMap, Request, StatusCode},
	middleware::Next,
	response::{IntoResponse, Response},
	Json,
};
use dojo_server_api::DojoErrorResponse;
use tracing::instrument;

pub const USER_ID_HEADER: &str = "x-dojo-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
	pub user_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AuthContext {
	pub current_user: Option<CurrentUser>,
}

impl AuthContext {
	pub fn authenticated(user: CurrentUser) -> Self {
		Self {
			current_user: Some(user),
		}
	}

	pub fn unauthenticated() -> Self {
		Self::default()
	}
}

/// Stores an [`AuthContext`] for downstream handlers. Requests without a
/// valid identity header continue unauthenticated.
#[instrument(
	name = "auth_layer",
	skip(request, next),
	fields(user_id = tracing::field::Empty)
)]
pub async fn auth_layer(mut request: Request<Body>, next: Next) -> Response {
	let ctx = match user_from_headers(request.headers()) {
		Some(user) => {
			tracing::Span::current().record("user_id", user.user_id);
			AuthContext::authenticated(user)
		}
		None => AuthContext::unauthenticated(),
	};

	request.extensions_mut().insert(ctx);
	next.run(request).await
}

fn user_from_headers(headers: &HeaderMap) -> Option<CurrentUser> {
	let value = headers.get(USER_ID_HEADER)?.to_str().ok()?;
	match value.trim().parse::<i64>() {
		Ok(user_id) if user_id > 0 => Some(CurrentUser { user_id }),
		_ => {
			tracing::debug!("Ignoring malformed user id header");
			None
		}
	}
}

/// Extractor that rejects unauthenticated requests with 401.
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
	S: Send + Sync,
{
	type Rejection = Response;

	#[instrument(name = "RequireAuth::from_request_parts", skip_all)]
	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let auth_ctx = parts
			.extensions
			.get::<AuthContext>()
			.cloned()
			.unwrap_or_else(AuthContext::unauthenticated);

		match auth_ctx.current_user {
			Some(user) => Ok(RequireAuth(user)),
			None => {
				tracing::debug!("Authentication required: no user");
				Err(
					(
						StatusCode::UNAUTHORIZED,
						Json(DojoErrorResponse::new("Authentication required")),
					)
						.into_response(),
				)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	fn headers(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert(USER_ID_HEADER, HeaderValue::from_str(value).unwrap());
		headers
	}

	#[test]
	fn test_user_from_headers() {
		assert_eq!(
			user_from_headers(&headers("42")),
			Some(CurrentUser { user_id: 42 })
		);
		assert_eq!(user_from_headers(&headers("0")), None);
		assert_eq!(user_from_headers(&headers("-3")), None);
		assert_eq!(user_from_headers(&headers("admin")), None);
		assert_eq!(user_from_headers(&HeaderMap::new()), None);
	}
}
