// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDojoRequest {
	/// `https://<host>/<owner>/<repo>` or `git@<host>:<owner>/<repo>`.
	#[serde(default)]
	pub dojo_repo: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateDojoResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dojo_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl CreateDojoResponse {
	pub fn created(dojo_id: impl Into<String>) -> Self {
		Self {
			success: true,
			dojo_id: Some(dojo_id.into()),
			error: None,
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			success: false,
			dojo_id: None,
			error: Some(error.into()),
		}
	}
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeaveDojoRequest {
	#[serde(default)]
	pub dojo_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LeaveDojoResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl LeaveDojoResponse {
	pub fn left() -> Self {
		Self {
			success: true,
			error: None,
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			success: false,
			error: Some(error.into()),
		}
	}
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinDojoRequest {
	#[serde(default)]
	pub dojo_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JoinDojoResponse {
	pub success: bool,
	/// `admin` or `member`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl JoinDojoResponse {
	pub fn joined(role: impl Into<String>) -> Self {
		Self {
			success: true,
			role: Some(role.into()),
			error: None,
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			success: false,
			role: None,
			error: Some(error.into()),
		}
	}
}

/// Body of authentication and unexpected server failures.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DojoErrorResponse {
	pub success: bool,
	pub error: String,
}

impl DojoErrorResponse {
	pub fn new(error: impl Into<String>) -> Self {
		Self {
			success: false,
			error: error.into(),
		}
	}
}
