// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Application state and router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	middleware::from_fn,
	routing::{get, post},
	Json, Router,
};
use dojo_server_config::ServerConfig;
use dojo_server_db::DojoRepository;
use dojo_server_provision::{
	DojoPublisher, GitCloneRunner, LocatorPolicy, MembershipLifecycle, ProvisionError,
	StagingCloner, YamlDescriptorLoader,
};
use sqlx::SqlitePool;
use utoipa::OpenApi;

use crate::{api_docs::ApiDoc, auth_middleware::auth_layer, routes};

#[derive(Clone)]
pub struct AppState {
	pub repo: DojoRepository,
	pub publisher: Arc<DojoPublisher>,
	pub membership: MembershipLifecycle,
}

impl AppState {
	pub fn new(repo: DojoRepository, publisher: DojoPublisher) -> Self {
		Self {
			membership: MembershipLifecycle::new(repo.clone()),
			publisher: Arc::new(publisher),
			repo,
		}
	}
}

/// Wire the production collaborators: the system git binary, `dojo.yml`
/// descriptors and same-filesystem renames.
pub fn create_app_state(pool: SqlitePool, config: &ServerConfig) -> Result<AppState, ProvisionError> {
	let repo = DojoRepository::new(pool);
	let policy = LocatorPolicy::new(&config.provision.allowed_host)?;
	let cloner = StagingCloner::new(
		Arc::new(GitCloneRunner::new(&config.provision.git_binary)),
		config.paths.staging_dir(),
		Duration::from_secs(config.provision.clone_timeout_secs),
	);
	let publisher = DojoPublisher::new(
		policy,
		cloner,
		Arc::new(YamlDescriptorLoader),
		repo.clone(),
		config.paths.dojos_dir(),
	)
	.with_publish_attempts(config.provision.publish_attempts);

	Ok(AppState::new(repo, publisher))
}

pub fn create_router(state: AppState) -> Router {
	let dojo_routes = Router::new()
		.route("/api/v1/dojo/create", post(routes::dojo::create_dojo))
		.route("/api/v1/dojo/leave", post(routes::dojo::leave_dojo))
		.route("/api/v1/dojo/join", post(routes::dojo::join_dojo))
		.layer(from_fn(auth_layer));

	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
		.merge(dojo_routes)
		.with_state(state)
}
