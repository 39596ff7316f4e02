// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Joining and leaving dojos.
//!
//! Every operation starts by locking the dojo row, so concurrent leaves on
//! one dojo serialize and the admin count they read is stable. A departing
//! sole admin tears the dojo down; its directory is removed only after the
//! deleting transaction has committed.

use std::path::PathBuf;

use dojo_server_db::DojoRepository;
use tracing::{info, instrument, warn};

use crate::error::{ProvisionError, Result};
use crate::types::{DojoMembership, DojoRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
	/// The caller's membership was removed; the dojo persists.
	Left,
	/// The caller was the sole admin and the dojo was deleted.
	DojoDeleted { directory_removed: bool },
}

#[derive(Clone)]
pub struct MembershipLifecycle {
	repo: DojoRepository,
}

impl MembershipLifecycle {
	pub fn new(repo: DojoRepository) -> Self {
		Self { repo }
	}

	/// Add `user_id` as a member. Joining twice returns the existing
	/// membership unchanged.
	#[instrument(skip(self))]
	pub async fn join(&self, dojo_id: &str, user_id: i64) -> Result<DojoMembership> {
		let mut tx = self.repo.begin().await?;
		if !tx.lock_dojo(dojo_id).await? {
			return Err(ProvisionError::NotFound);
		}

		if let Some(existing) = tx.get_membership(dojo_id, user_id).await? {
			tx.rollback().await?;
			return Ok(DojoMembership::from_record(existing)?);
		}

		let membership = DojoMembership::new(dojo_id, user_id, DojoRole::Member);
		tx.insert_membership(&membership.to_record()).await?;
		tx.commit().await?;

		info!("User joined dojo");
		Ok(membership)
	}

	#[instrument(skip(self))]
	pub async fn leave(&self, dojo_id: &str, user_id: i64) -> Result<LeaveOutcome> {
		let mut tx = self.repo.begin().await?;
		if !tx.lock_dojo(dojo_id).await? {
			return Err(ProvisionError::NotFound);
		}
		let dojo = tx.get_dojo(dojo_id).await?.ok_or(ProvisionError::NotFound)?;
		let membership = tx.get_membership(dojo_id, user_id).await?;

		// Dropping `tx` on these paths rolls back the lock touch.
		if dojo.official {
			return Err(ProvisionError::Forbidden(
				"Cannot leave official dojo".to_string(),
			));
		}
		let membership = match membership {
			Some(record) => DojoMembership::from_record(record)?,
			None => return Err(ProvisionError::NotFound),
		};

		if membership.role == DojoRole::Admin && tx.count_admins(dojo_id).await? == 1 {
			tx.delete_dojo(dojo_id).await?;
			tx.commit().await?;
			info!("Sole admin left, dojo deleted");

			let directory_removed = remove_directory(PathBuf::from(dojo.directory)).await;
			return Ok(LeaveOutcome::DojoDeleted { directory_removed });
		}

		tx.delete_membership(dojo_id, user_id).await?;
		tx.commit().await?;
		info!(role = membership.role.as_str(), "User left dojo");
		Ok(LeaveOutcome::Left)
	}
}

async fn remove_directory(directory: PathBuf) -> bool {
	match tokio::fs::remove_dir_all(&directory).await {
		Ok(()) => true,
		Err(e) => {
			warn!(directory = ?directory, error = %e, "Failed to remove directory of deleted dojo; clean up out of band");
			false
		}
	}
}
