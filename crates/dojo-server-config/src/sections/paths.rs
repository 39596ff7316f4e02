// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Filesystem layout.
//!
//! Published dojos and staging clones share `data_dir` so that publishing is
//! a same-filesystem rename.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_DATA_DIR: &str = "/var/lib/dojo";

#[derive(Debug, Clone)]
pub struct PathsConfig {
	pub data_dir: PathBuf,
}

impl PathsConfig {
	pub fn dojos_dir(&self) -> PathBuf {
		self.data_dir.join("dojos")
	}

	pub fn staging_dir(&self) -> PathBuf {
		self.data_dir.join("staging")
	}
}

impl Default for PathsConfig {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from(DEFAULT_DATA_DIR),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfigLayer {
	#[serde(default)]
	pub data_dir: Option<String>,
}

impl PathsConfigLayer {
	pub fn merge(&mut self, other: PathsConfigLayer) {
		if other.data_dir.is_some() {
			self.data_dir = other.data_dir;
		}
	}

	pub fn finalize(self) -> PathsConfig {
		PathsConfig {
			data_dir: self
				.data_dir
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
		}
	}
}
