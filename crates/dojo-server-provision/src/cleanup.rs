// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Sweeping staging directories left behind by a crashed process.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, instrument, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDecision {
	Removed,
	Kept,
	Error,
}

#[derive(Debug)]
pub struct SweepResult {
	pub path: PathBuf,
	pub decision: SweepDecision,
	pub reason: String,
}

/// Remove every entry of `staging_root` older than `max_age`.
///
/// A missing root is treated as empty.
#[instrument(skip(staging_root), fields(staging_root = %staging_root.display(), max_age_secs = max_age.as_secs()))]
pub async fn sweep_stale_staging(staging_root: &Path, max_age: Duration) -> Result<Vec<SweepResult>> {
	let mut entries = match tokio::fs::read_dir(staging_root).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};

	let now = SystemTime::now();
	let mut results = Vec::new();
	while let Some(entry) = entries.next_entry().await? {
		results.push(sweep_entry(&entry.path(), now, max_age).await);
	}

	let removed = results
		.iter()
		.filter(|r| r.decision == SweepDecision::Removed)
		.count();
	let failed = results
		.iter()
		.filter(|r| r.decision == SweepDecision::Error)
		.count();
	if removed > 0 || failed > 0 {
		info!(removed, failed, scanned = results.len(), "Staging sweep finished");
	} else {
		debug!(scanned = results.len(), "Staging sweep found nothing to remove");
	}

	Ok(results)
}

async fn sweep_entry(path: &Path, now: SystemTime, max_age: Duration) -> SweepResult {
	let modified = match tokio::fs::symlink_metadata(path).await.and_then(|m| m.modified()) {
		Ok(modified) => modified,
		Err(e) => {
			warn!(path = %path.display(), error = %e, "Failed to stat staging entry, keeping it");
			return SweepResult {
				path: path.to_path_buf(),
				decision: SweepDecision::Error,
				reason: format!("Failed to stat: {}", e),
			};
		}
	};

	// A clock step backwards makes the entry look new; keep it.
	let age = now.duration_since(modified).unwrap_or_default();
	if age < max_age {
		return SweepResult {
			path: path.to_path_buf(),
			decision: SweepDecision::Kept,
			reason: format!("Age {}s is below threshold", age.as_secs()),
		};
	}

	let removal = if path.is_dir() && !path.is_symlink() {
		tokio::fs::remove_dir_all(path).await
	} else {
		tokio::fs::remove_file(path).await
	};

	match removal {
		Ok(()) => {
			info!(path = %path.display(), age_secs = age.as_secs(), "Removed stale staging entry");
			SweepResult {
				path: path.to_path_buf(),
				decision: SweepDecision::Removed,
				reason: format!("Stale for {}s", age.as_secs()),
			}
		}
		Err(e) => {
			warn!(path = %path.display(), error = %e, "Failed to remove stale staging entry");
			SweepResult {
				path: path.to_path_buf(),
				decision: SweepDecision::Error,
				reason: format!("Failed to remove: {}", e),
			}
		}
	}
}
