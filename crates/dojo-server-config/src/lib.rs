// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the dojo server.
//!
//! Configuration is layered from built-in defaults, an optional TOML file and
//! `DOJO_SERVER_*` environment variables, then validated.
//!
//! # Usage
//!
//! ```ignore
//! use dojo_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub paths: PathsConfig,
	pub logging: LoggingConfig,
	pub provision: ProvisionConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`DOJO_SERVER_*`)
/// 2. Config file (`/etc/dojo/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		paths: layer.paths.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		provision: layer.provision.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		data_dir = %config.paths.data_dir.display(),
		allowed_host = %config.provision.allowed_host,
		clone_timeout_secs = config.provision.clone_timeout_secs,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.http.port == 0 {
		return Err(ConfigError::Validation("http port must be non-zero".to_string()));
	}

	let provision = &config.provision;
	if provision.publish_attempts == 0 {
		return Err(ConfigError::Validation(
			"provision.publish_attempts must be at least 1".to_string(),
		));
	}
	if provision.clone_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"provision.clone_timeout_secs must be non-zero".to_string(),
		));
	}
	if provision.allowed_host.is_empty()
		|| provision
			.allowed_host
			.chars()
			.any(|c| c == '/' || c == ':' || c == '@' || c.is_whitespace())
	{
		return Err(ConfigError::Validation(format!(
			"provision.allowed_host '{}' must be a bare host name",
			provision.allowed_host
		)));
	}

	Ok(())
}
