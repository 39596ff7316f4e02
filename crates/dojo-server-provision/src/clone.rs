// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cloning external repositories into ephemeral staging directories.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProvisionError, Result};
use crate::locator::RepositoryLocator;

const MAX_STDERR_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutput {
	pub exit_code: Option<i32>,
	pub stderr: String,
	pub timed_out: bool,
}

impl CloneOutput {
	pub fn success(&self) -> bool {
		!self.timed_out && self.exit_code == Some(0)
	}
}

/// Runs the external clone of a validated locator into `dest`.
///
/// `dest` already exists and is empty. Implementations must stop the clone
/// once `timeout` elapses and report `timed_out`.
#[async_trait]
pub trait CloneRunner: Send + Sync {
	async fn run_clone(
		&self,
		locator: &RepositoryLocator,
		dest: &Path,
		timeout: Duration,
	) -> std::io::Result<CloneOutput>;
}

/// Clone runner backed by the system git binary.
pub struct GitCloneRunner {
	git_binary: PathBuf,
}

impl GitCloneRunner {
	pub fn new(git_binary: impl Into<PathBuf>) -> Self {
		Self {
			git_binary: git_binary.into(),
		}
	}

	fn command(&self, locator: &RepositoryLocator, dest: &Path) -> Command {
		let mut cmd = Command::new(&self.git_binary);
		cmd.args([
			"-c",
			"http.followRedirects=false",
			"-c",
			"protocol.allow=never",
			"-c",
			"protocol.https.allow=always",
			"-c",
			"protocol.ssh.allow=always",
			"clone",
			"--depth=1",
			"--quiet",
			"--",
		])
		.arg(locator.as_str())
		.arg(dest)
		.env("GIT_TERMINAL_PROMPT", "0")
		.env("GIT_ASKPASS", "true")
		.env(
			"GIT_SSH_COMMAND",
			"ssh -o BatchMode=yes -o StrictHostKeyChecking=accept-new",
		)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
		cmd
	}
}

impl Default for GitCloneRunner {
	fn default() -> Self {
		Self::new("git")
	}
}

#[async_trait]
impl CloneRunner for GitCloneRunner {
	#[instrument(skip(self, dest), fields(locator = %locator))]
	async fn run_clone(
		&self,
		locator: &RepositoryLocator,
		dest: &Path,
		timeout: Duration,
	) -> std::io::Result<CloneOutput> {
		let child = self.command(locator, dest).spawn()?;

		match tokio::time::timeout(timeout, child.wait_with_output()).await {
			Ok(Ok(output)) => {
				let stderr = truncate_stderr(&output.stderr);
				debug!(exit_code = ?output.status.code(), stderr_len = output.stderr.len(), "git clone exited");
				Ok(CloneOutput {
					exit_code: output.status.code(),
					stderr,
					timed_out: false,
				})
			}
			Ok(Err(e)) => Err(e),
			// The child is dropped with the timed-out future and killed.
			Err(_) => Ok(CloneOutput {
				exit_code: None,
				stderr: String::new(),
				timed_out: true,
			}),
		}
	}
}

fn truncate_stderr(stderr: &[u8]) -> String {
	let bytes = &stderr[..stderr.len().min(MAX_STDERR_BYTES)];
	String::from_utf8_lossy(bytes).trim().to_string()
}

/// An exclusively-owned staging directory holding a fresh clone.
///
/// Dropping the area removes the directory on the current thread; async
/// callers use [`StagingArea::discard`]. [`StagingArea::publish_to`]
/// consumes it by moving the directory into place.
#[derive(Debug)]
pub struct StagingArea {
	dir: TempDir,
}

impl StagingArea {
	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	/// Remove the staged tree on the blocking pool.
	pub async fn discard(self) {
		let path = self.dir.path().to_path_buf();
		let dir = self.dir;
		match tokio::task::spawn_blocking(move || dir.close()).await {
			Ok(Ok(())) => debug!(path = ?path, "Discarded staging directory"),
			Ok(Err(e)) => warn!(path = ?path, error = %e, "Failed to remove staging directory"),
			Err(e) => warn!(path = ?path, error = %e, "Staging removal task failed"),
		}
	}

	/// Move the staged tree to `target`.
	///
	/// On failure the staging area is handed back so the caller can retry or
	/// drop it.
	pub fn publish_to(
		self,
		target: &Path,
		mover: &dyn DirectoryMover,
	) -> std::result::Result<(), (Self, std::io::Error)> {
		match mover.move_dir(self.dir.path(), target) {
			Ok(()) => {
				// The directory now lives at `target`; nothing left to clean up.
				let _ = self.dir.keep();
				Ok(())
			}
			Err(e) => Err((self, e)),
		}
	}
}

/// Moves a staged directory to its published location.
pub trait DirectoryMover: Send + Sync {
	fn move_dir(&self, from: &Path, to: &Path) -> std::io::Result<()>;
}

/// Same-filesystem atomic rename. Refuses to replace an existing target.
pub struct RenameMover;

impl DirectoryMover for RenameMover {
	fn move_dir(&self, from: &Path, to: &Path) -> std::io::Result<()> {
		if to.exists() {
			return Err(std::io::Error::new(
				std::io::ErrorKind::AlreadyExists,
				format!("{} already exists", to.display()),
			));
		}
		if let Some(parent) = to.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::rename(from, to)
	}
}

/// Clones validated locators into fresh staging directories.
pub struct StagingCloner {
	runner: Arc<dyn CloneRunner>,
	staging_root: PathBuf,
	timeout: Duration,
}

impl StagingCloner {
	pub fn new(runner: Arc<dyn CloneRunner>, staging_root: impl Into<PathBuf>, timeout: Duration) -> Self {
		Self {
			runner,
			staging_root: staging_root.into(),
			timeout,
		}
	}

	pub fn staging_root(&self) -> &Path {
		&self.staging_root
	}

	#[instrument(skip(self), fields(locator = %locator, timeout_secs = self.timeout.as_secs()))]
	pub async fn clone(&self, locator: &RepositoryLocator) -> Result<StagingArea> {
		let staging_root = self.staging_root.clone();
		let dir = tokio::task::spawn_blocking(move || {
			std::fs::create_dir_all(&staging_root)?;
			tempfile::Builder::new()
				.prefix("clone-")
				.tempdir_in(&staging_root)
		})
		.await
		.map_err(|e| ProvisionError::Clone(format!("failed to create staging directory: {e}")))?
		.map_err(|e| ProvisionError::Clone(format!("failed to create staging directory: {e}")))?;
		let staging = StagingArea { dir };

		info!(path = ?staging.path(), "Cloning repository into staging");

		let output = match self
			.runner
			.run_clone(locator, staging.path(), self.timeout)
			.await
		{
			Ok(output) => output,
			Err(e) => {
				warn!(error = %e, "Failed to start clone");
				staging.discard().await;
				return Err(ProvisionError::Clone(format!("failed to run clone: {e}")));
			}
		};

		if output.timed_out {
			warn!("Clone timed out, discarding staging directory");
			staging.discard().await;
			return Err(ProvisionError::Clone(format!(
				"Clone of {} timed out after {}s",
				locator,
				self.timeout.as_secs()
			)));
		}

		if !output.success() {
			warn!(exit_code = ?output.exit_code, stderr = %output.stderr, "Clone failed, discarding staging directory");
			staging.discard().await;
			let message = if output.stderr.is_empty() {
				format!("Clone of {} failed with exit code {:?}", locator, output.exit_code)
			} else {
				output.stderr
			};
			return Err(ProvisionError::Clone(message));
		}

		debug!(path = ?staging.path(), "Clone completed successfully");
		Ok(staging)
	}
}
