// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod dojo;
pub mod health;

pub use dojo::{
	CreateDojoRequest, CreateDojoResponse, DojoErrorResponse, JoinDojoRequest, JoinDojoResponse,
	LeaveDojoRequest, LeaveDojoResponse,
};
pub use health::{HealthResponse, HealthStatus};
