// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dojo provisioning server.
//!
//! Exposes dojo creation, joining and leaving over HTTP, backed by a SQLite
//! registry and a directory tree of published dojo repositories.

pub mod api;
pub mod api_docs;
pub mod auth_middleware;
pub mod routes;

pub use api::{create_app_state, create_router, AppState};
pub use api_docs::ApiDoc;
