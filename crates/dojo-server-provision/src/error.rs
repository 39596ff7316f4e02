// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
	/// The repository locator was rejected; nothing was touched.
	#[error("{0}")]
	Validation(String),

	/// The external clone failed or timed out; staging is already removed.
	#[error("{0}")]
	Clone(String),

	/// The staged tree is not a loadable dojo; staging is already removed.
	#[error("{0}")]
	Load(String),

	/// Storing or publishing the dojo failed; prior steps were compensated.
	#[error("{0}")]
	Persist(String),

	#[error("{0}")]
	Forbidden(String),

	#[error("Dojo not found")]
	NotFound,

	#[error("database error: {0}")]
	Database(#[from] dojo_server_db::DbError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

impl ProvisionError {
	/// Whether the failure is attributable to the request rather than the
	/// server.
	pub fn is_client_error(&self) -> bool {
		matches!(
			self,
			ProvisionError::Validation(_)
				| ProvisionError::Clone(_)
				| ProvisionError::Load(_)
				| ProvisionError::Persist(_)
				| ProvisionError::Forbidden(_)
				| ProvisionError::NotFound
		)
	}
}
