// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dojo provisioning configuration section.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionConfig {
	/// The single host repositories may be cloned from.
	pub allowed_host: String,
	pub clone_timeout_secs: u64,
	/// Attempts at the final staging -> dojo directory rename.
	pub publish_attempts: u32,
	pub staging_max_age_secs: u64,
	pub staging_sweep_interval_secs: u64,
	pub git_binary: String,
}

impl Default for ProvisionConfig {
	fn default() -> Self {
		Self {
			allowed_host: "github.com".to_string(),
			clone_timeout_secs: 120,
			publish_attempts: 3,
			staging_max_age_secs: 3600,
			staging_sweep_interval_secs: 600,
			git_binary: "git".to_string(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProvisionConfigLayer {
	#[serde(default)]
	pub allowed_host: Option<String>,
	#[serde(default)]
	pub clone_timeout_secs: Option<u64>,
	#[serde(default)]
	pub publish_attempts: Option<u32>,
	#[serde(default)]
	pub staging_max_age_secs: Option<u64>,
	#[serde(default)]
	pub staging_sweep_interval_secs: Option<u64>,
	#[serde(default)]
	pub git_binary: Option<String>,
}

impl ProvisionConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.allowed_host.is_some() {
			self.allowed_host = other.allowed_host;
		}
		if other.clone_timeout_secs.is_some() {
			self.clone_timeout_secs = other.clone_timeout_secs;
		}
		if other.publish_attempts.is_some() {
			self.publish_attempts = other.publish_attempts;
		}
		if other.staging_max_age_secs.is_some() {
			self.staging_max_age_secs = other.staging_max_age_secs;
		}
		if other.staging_sweep_interval_secs.is_some() {
			self.staging_sweep_interval_secs = other.staging_sweep_interval_secs;
		}
		if other.git_binary.is_some() {
			self.git_binary = other.git_binary;
		}
	}

	pub fn finalize(self) -> ProvisionConfig {
		let defaults = ProvisionConfig::default();
		ProvisionConfig {
			allowed_host: self.allowed_host.unwrap_or(defaults.allowed_host),
			clone_timeout_secs: self.clone_timeout_secs.unwrap_or(defaults.clone_timeout_secs),
			publish_attempts: self.publish_attempts.unwrap_or(defaults.publish_attempts),
			staging_max_age_secs: self
				.staging_max_age_secs
				.unwrap_or(defaults.staging_max_age_secs),
			staging_sweep_interval_secs: self
				.staging_sweep_interval_secs
				.unwrap_or(defaults.staging_sweep_interval_secs),
			git_binary: self.git_binary.unwrap_or(defaults.git_binary),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_layer_finalize_defaults() {
		let config = ProvisionConfigLayer::default().finalize();
		assert_eq!(config, ProvisionConfig::default());
		assert_eq!(config.allowed_host, "github.com");
		assert_eq!(config.clone_timeout_secs, 120);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = ProvisionConfigLayer {
			allowed_host: Some("github.com".to_string()),
			publish_attempts: Some(3),
			..Default::default()
		};
		base.merge(ProvisionConfigLayer {
			allowed_host: Some("gitlab.example.org".to_string()),
			..Default::default()
		});

		let config = base.finalize();
		assert_eq!(config.allowed_host, "gitlab.example.org");
		assert_eq!(config.publish_attempts, 3);
	}
}
