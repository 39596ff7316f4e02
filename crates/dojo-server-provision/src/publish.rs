// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Publishing a repository as a new dojo.
//!
//! Publication is a two-phase commit: the dojo row and its admin membership
//! are committed first, then the staged clone is renamed into its permanent
//! directory. A rename that keeps failing is compensated by deleting the
//! committed row, so a row never outlives a missing directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dojo_server_db::{DbError, DojoRepository};
use tracing::{error, info, instrument, warn, Instrument};

use crate::clone::{DirectoryMover, RenameMover, StagingArea, StagingCloner};
use crate::descriptor::{slugify, DescriptorLoader, DojoDescriptor};
use crate::error::{ProvisionError, Result};
use crate::locator::{LocatorPolicy, RepositoryLocator};
use crate::types::{Dojo, DojoMembership, DojoRole};

const RETRY_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;

pub struct DojoPublisher {
	policy: LocatorPolicy,
	cloner: StagingCloner,
	loader: Arc<dyn DescriptorLoader>,
	repo: DojoRepository,
	dojos_root: PathBuf,
	mover: Arc<dyn DirectoryMover>,
	publish_attempts: u32,
}

impl DojoPublisher {
	pub fn new(
		policy: LocatorPolicy,
		cloner: StagingCloner,
		loader: Arc<dyn DescriptorLoader>,
		repo: DojoRepository,
		dojos_root: impl Into<PathBuf>,
	) -> Self {
		Self {
			policy,
			cloner,
			loader,
			repo,
			dojos_root: dojos_root.into(),
			mover: Arc::new(RenameMover),
			publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
		}
	}

	pub fn with_mover(mut self, mover: Arc<dyn DirectoryMover>) -> Self {
		self.mover = mover;
		self
	}

	pub fn with_publish_attempts(mut self, attempts: u32) -> Self {
		self.publish_attempts = attempts.max(1);
		self
	}

	pub fn policy(&self) -> &LocatorPolicy {
		&self.policy
	}

	/// Validate, clone, load, persist and publish a dojo owned by `user_id`.
	///
	/// Once the clone is loaded, the commit and the directory rename run on a
	/// spawned task. Dropping the returned future after that point does not
	/// abort them.
	#[instrument(skip(self))]
	pub async fn publish(&self, raw_locator: &str, user_id: i64) -> Result<Dojo> {
		let locator = self.policy.validate(raw_locator)?;
		let staging = self.cloner.clone(&locator).await?;

		let loaded = self
			.loader
			.load(staging.path())
			.and_then(|descriptor| self.build_dojo(&locator, descriptor));
		let dojo = match loaded {
			Ok(dojo) => dojo,
			Err(e) => {
				staging.discard().await;
				return Err(e);
			}
		};

		let publication = Publication {
			repo: self.repo.clone(),
			mover: self.mover.clone(),
			attempts: self.publish_attempts,
		};
		let dojo = tokio::spawn(publication.run(staging, dojo, user_id).in_current_span())
			.await
			.map_err(|e| {
				error!(error = %e, "Publication task failed");
				ProvisionError::Persist(format!("Publication task failed: {e}"))
			})??;

		info!(dojo_id = %dojo.dojo_id, directory = ?dojo.directory, "Dojo published");
		Ok(dojo)
	}

	fn build_dojo(&self, locator: &RepositoryLocator, descriptor: DojoDescriptor) -> Result<Dojo> {
		let dojo_id = match descriptor.id {
			Some(id) => id,
			None => slugify(locator.repo_name()).ok_or_else(|| {
				ProvisionError::Load(format!(
					"Cannot derive a dojo id from repository name '{}'; set id in dojo.yml",
					locator.repo_name()
				))
			})?,
		};

		Ok(Dojo {
			directory: self.dojos_root.join(&dojo_id),
			dojo_id,
			repository: locator.as_str().to_string(),
			name: descriptor.name,
			description: descriptor.description,
			official: false,
			modules: descriptor.modules,
			created_at: Utc::now(),
		})
	}
}

/// The commit-then-rename half of a publication, owned by its own task.
struct Publication {
	repo: DojoRepository,
	mover: Arc<dyn DirectoryMover>,
	attempts: u32,
}

impl Publication {
	async fn run(self, staging: StagingArea, dojo: Dojo, user_id: i64) -> Result<Dojo> {
		if let Err(e) = self.persist(&dojo, user_id).await {
			staging.discard().await;
			return Err(e);
		}
		self.publish_directory(staging, &dojo).await?;
		Ok(dojo)
	}

	#[instrument(skip(self, dojo), fields(dojo_id = %dojo.dojo_id))]
	async fn persist(&self, dojo: &Dojo, user_id: i64) -> Result<()> {
		let record = dojo.to_record().map_err(persist_error)?;
		let admin = DojoMembership::new(&dojo.dojo_id, user_id, DojoRole::Admin);

		let mut tx = self.repo.begin().await.map_err(persist_error)?;
		tx.insert_dojo(&record).await.map_err(persist_error)?;
		tx.insert_membership(&admin.to_record())
			.await
			.map_err(persist_error)?;
		tx.commit().await.map_err(persist_error)
	}

	/// Rename the staged tree into place, retrying transient failures. An
	/// existing target is permanent and fails on the first attempt.
	#[instrument(skip(self, staging, dojo), fields(dojo_id = %dojo.dojo_id))]
	async fn publish_directory(&self, staging: StagingArea, dojo: &Dojo) -> Result<()> {
		let mut staging = staging;
		let mut last_error = None;

		for attempt in 1..=self.attempts {
			let mover = self.mover.clone();
			let target = dojo.directory.clone();
			let moved =
				tokio::task::spawn_blocking(move || staging.publish_to(&target, mover.as_ref())).await;

			match moved {
				Ok(Ok(())) => return self.confirm_published(dojo).await,
				Ok(Err((returned, e))) => {
					warn!(attempt, max_attempts = self.attempts, error = %e, "Failed to publish dojo directory");
					staging = returned;
					let permanent = e.kind() == std::io::ErrorKind::AlreadyExists;
					last_error = Some(e);
					if permanent {
						break;
					}
				}
				Err(e) => {
					// The staging area went down with the panicked mover.
					error!(error = %e, "Directory publication task failed");
					self.compensate(dojo).await;
					return Err(ProvisionError::Persist(format!(
						"Failed to publish dojo directory: {e}"
					)));
				}
			}
			if attempt < self.attempts {
				tokio::time::sleep(RETRY_DELAY * attempt).await;
			}
		}

		staging.discard().await;
		self.compensate(dojo).await;

		Err(ProvisionError::Persist(match last_error {
			Some(e) => format!("Failed to publish dojo directory: {e}"),
			None => "Failed to publish dojo directory".to_string(),
		}))
	}

	/// A teardown may have removed the row between commit and rename; the
	/// directory must not outlive it.
	async fn confirm_published(&self, dojo: &Dojo) -> Result<()> {
		match self.repo.get_dojo(&dojo.dojo_id).await {
			Ok(Some(record)) if record.repository == dojo.repository => Ok(()),
			Ok(_) => {
				warn!(directory = ?dojo.directory, "Dojo row vanished during publication, removing directory");
				if let Err(e) = tokio::fs::remove_dir_all(&dojo.directory).await {
					error!(directory = ?dojo.directory, error = %e, "Failed to remove orphaned dojo directory; manual cleanup required");
				}
				Err(ProvisionError::Persist(
					"Dojo was removed while it was being published".to_string(),
				))
			}
			Err(e) => {
				warn!(error = %e, "Could not confirm dojo row after publication");
				Ok(())
			}
		}
	}

	async fn compensate(&self, dojo: &Dojo) {
		match self.repo.delete_dojo(&dojo.dojo_id).await {
			Ok(()) => {
				warn!("Deleted committed dojo row after directory publication failed");
			}
			Err(e) => {
				error!(error = %e, "Failed to delete dojo row after directory publication failed; manual cleanup required");
			}
		}
	}
}

fn persist_error(err: DbError) -> ProvisionError {
	match err {
		DbError::Conflict(msg) => ProvisionError::Persist(msg),
		other => ProvisionError::Persist(format!("Failed to store dojo: {other}")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clone::tests::{staging_entries, FakeCloneRunner};
	use crate::descriptor::YamlDescriptorLoader;
	use std::path::Path;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tempfile::TempDir;
	use tokio::sync::Notify;

	const DOJO_YML: &str = "name: Intro\nmodules:\n  - id: warmup\n    name: Warm-up\n    challenges:\n      - id: level-1\n        name: Level 1\n";

	/// Fails the first `failures` moves, then renames.
	struct FlakyMover {
		failures: usize,
		calls: AtomicUsize,
		failed: Notify,
	}

	impl FlakyMover {
		fn new(failures: usize) -> Self {
			Self {
				failures,
				calls: AtomicUsize::new(0),
				failed: Notify::new(),
			}
		}
	}

	impl DirectoryMover for FlakyMover {
		fn move_dir(&self, from: &Path, to: &Path) -> std::io::Result<()> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);
			if call < self.failures {
				self.failed.notify_one();
				return Err(std::io::Error::new(
					std::io::ErrorKind::Other,
					"Invalid cross-device link",
				));
			}
			RenameMover.move_dir(from, to)
		}
	}

	struct Fixture {
		root: TempDir,
		repo: DojoRepository,
		runner: Arc<FakeCloneRunner>,
		publisher: DojoPublisher,
	}

	impl Fixture {
		async fn new(runner: FakeCloneRunner) -> Self {
			let root = tempfile::tempdir().unwrap();
			let pool = dojo_server_db::testing::create_dojo_test_pool().await;
			Self::build(root, DojoRepository::new(pool), runner)
		}

		/// Backed by a WAL database file, so concurrent writers get their own
		/// connections.
		async fn file_backed(runner: FakeCloneRunner) -> Self {
			let root = tempfile::tempdir().unwrap();
			let db_url = format!("sqlite:{}", root.path().join("dojo.db").display());
			let pool = dojo_server_db::create_pool(&db_url).await.unwrap();
			dojo_server_db::run_migrations(&pool).await.unwrap();
			Self::build(root, DojoRepository::new(pool), runner)
		}

		fn build(root: TempDir, repo: DojoRepository, runner: FakeCloneRunner) -> Self {
			let runner = Arc::new(runner);
			let cloner = StagingCloner::new(
				runner.clone(),
				root.path().join("staging"),
				Duration::from_secs(5),
			);
			let publisher = DojoPublisher::new(
				LocatorPolicy::new("github.com").unwrap(),
				cloner,
				Arc::new(YamlDescriptorLoader),
				repo.clone(),
				root.path().join("dojos"),
			);

			Self {
				root,
				repo,
				runner,
				publisher,
			}
		}

		fn with_mover(mut self, mover: Arc<dyn DirectoryMover>) -> Self {
			self.publisher = self.publisher.with_mover(mover);
			self
		}

		fn staging_root(&self) -> PathBuf {
			self.root.path().join("staging")
		}

		fn dojo_dir(&self, dojo_id: &str) -> PathBuf {
			self.root.path().join("dojos").join(dojo_id)
		}

		fn dojos_root(&self) -> PathBuf {
			self.root.path().join("dojos")
		}

		async fn assert_nothing_published(&self, repository: &str) {
			assert!(self
				.repo
				.get_dojo_by_repository(repository)
				.await
				.unwrap()
				.is_none());
			assert_eq!(self.repo.count_dojos().await.unwrap(), 0);
			assert_eq!(staging_entries(&self.staging_root()), 0);
			assert_eq!(staging_entries(&self.dojos_root()), 0);
		}
	}

	#[tokio::test]
	async fn test_publish_success() {
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)])).await;

		let dojo = fx
			.publisher
			.publish("https://github.com/acct/Intro-Dojo", 42)
			.await
			.unwrap();

		assert_eq!(dojo.dojo_id, "intro-dojo");
		assert_eq!(dojo.directory, fx.dojo_dir("intro-dojo"));
		assert!(dojo.directory.join("dojo.yml").exists());
		assert_eq!(staging_entries(&fx.staging_root()), 0);

		let record = fx
			.repo
			.get_dojo_by_repository("https://github.com/acct/Intro-Dojo")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(record.dojo_id, "intro-dojo");
		assert_eq!(fx.repo.count_dojos().await.unwrap(), 1);

		let members = fx.repo.list_memberships("intro-dojo").await.unwrap();
		assert_eq!(members.len(), 1);
		assert_eq!(members[0].user_id, 42);
		assert_eq!(members[0].role, "admin");
	}

	#[tokio::test]
	async fn test_descriptor_id_overrides_repository_name() {
		let fx = Fixture::new(FakeCloneRunner::with_files(&[(
			"dojo.yml",
			&format!("id: custom\n{DOJO_YML}"),
		)]))
		.await;

		let dojo = fx
			.publisher
			.publish("git@github.com:acct/repo.git", 1)
			.await
			.unwrap();
		assert_eq!(dojo.dojo_id, "custom");
		assert!(fx.dojo_dir("custom").exists());
	}

	#[tokio::test]
	async fn test_invalid_locator_never_clones() {
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)])).await;

		let err = fx
			.publisher
			.publish("git@evil.com:a/b; rm -rf /", 1)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Validation(_)));
		assert_eq!(fx.runner.call_count(), 0);
		fx.assert_nothing_published("git@evil.com:a/b; rm -rf /").await;
	}

	#[tokio::test]
	async fn test_clone_failure_leaves_nothing() {
		let fx = Fixture::new(FakeCloneRunner::failing(128, "fatal: repository not found")).await;

		let err = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Clone(_)));
		fx.assert_nothing_published("https://github.com/acct/repo").await;
	}

	#[tokio::test]
	async fn test_empty_repository_is_load_failure() {
		let fx = Fixture::new(FakeCloneRunner::with_files(&[])).await;

		let err = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Load(_)));
		assert_eq!(fx.runner.call_count(), 1);
		fx.assert_nothing_published("https://github.com/acct/repo").await;
	}

	#[tokio::test]
	async fn test_malformed_descriptor_is_load_failure() {
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", "name: X\n")])).await;

		let err = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Load(_)));
		fx.assert_nothing_published("https://github.com/acct/repo").await;
	}

	#[tokio::test]
	async fn test_duplicate_repository_is_persist_failure() {
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)])).await;
		let first = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap();

		let err = fx
			.publisher
			.publish("https://github.com/acct/repo", 2)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Persist(_)));
		assert_eq!(fx.repo.count_dojos().await.unwrap(), 1);
		assert_eq!(staging_entries(&fx.staging_root()), 0);
		assert!(first.directory.exists());

		let members = fx.repo.list_memberships(&first.dojo_id).await.unwrap();
		assert_eq!(members.len(), 1);
		assert_eq!(members[0].user_id, 1);
	}

	#[tokio::test]
	async fn test_publish_retries_rename() {
		let mover = Arc::new(FlakyMover::new(2));
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)]))
			.await
			.with_mover(mover.clone());

		let dojo = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap();

		assert_eq!(mover.calls.load(Ordering::SeqCst), 3);
		assert!(dojo.directory.join("dojo.yml").exists());
		assert_eq!(fx.repo.count_dojos().await.unwrap(), 1);
		assert_eq!(staging_entries(&fx.staging_root()), 0);
	}

	#[tokio::test]
	async fn test_publish_compensates_when_rename_keeps_failing() {
		let mover = Arc::new(FlakyMover::new(usize::MAX));
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)]))
			.await
			.with_mover(mover.clone());

		let err = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Persist(ref m) if m.contains("cross-device")));
		assert_eq!(mover.calls.load(Ordering::SeqCst), 3);
		assert!(fx.repo.list_memberships("repo").await.unwrap().is_empty());
		fx.assert_nothing_published("https://github.com/acct/repo").await;
	}

	#[tokio::test]
	async fn test_existing_directory_blocks_publication() {
		let mover = Arc::new(FlakyMover::new(0));
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)]))
			.await
			.with_mover(mover.clone());
		let stray = fx.dojo_dir("repo");
		std::fs::create_dir_all(&stray).unwrap();
		std::fs::write(stray.join("keep"), "x").unwrap();

		let err = fx
			.publisher
			.publish("https://github.com/acct/repo", 1)
			.await
			.unwrap_err();

		assert!(matches!(err, ProvisionError::Persist(_)));
		assert_eq!(mover.calls.load(Ordering::SeqCst), 1);
		assert_eq!(fx.repo.count_dojos().await.unwrap(), 0);
		assert_eq!(staging_entries(&fx.staging_root()), 0);
		assert!(stray.join("keep").exists());
	}

	#[tokio::test]
	async fn test_publish_completes_after_caller_is_dropped() {
		let mover = Arc::new(FlakyMover::new(1));
		let fx = Fixture::new(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)]))
			.await
			.with_mover(mover.clone());

		// Drop the request while the first rename is backing off.
		tokio::select! {
			_ = fx.publisher.publish("https://github.com/acct/repo", 1) => {
				panic!("publish finished before the first rename failed");
			}
			_ = mover.failed.notified() => {}
		}

		let dir = fx.dojo_dir("repo");
		for _ in 0..100 {
			if dir.exists() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(20)).await;
		}

		assert!(dir.join("dojo.yml").exists());
		assert_eq!(mover.calls.load(Ordering::SeqCst), 2);
		assert_eq!(fx.repo.count_dojos().await.unwrap(), 1);
		assert_eq!(fx.repo.list_memberships("repo").await.unwrap().len(), 1);
		assert_eq!(staging_entries(&fx.staging_root()), 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_concurrent_publishes_of_one_repository() {
		let fx = Fixture::file_backed(FakeCloneRunner::with_files(&[("dojo.yml", DOJO_YML)])).await;

		let (first, second) = tokio::join!(
			fx.publisher.publish("https://github.com/acct/repo", 1),
			fx.publisher.publish("https://github.com/acct/repo", 2),
		);
		let results = [first, second];

		assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
		assert!(results
			.iter()
			.any(|r| matches!(r, Err(ProvisionError::Persist(_)))));
		assert_eq!(fx.runner.call_count(), 2);
		assert_eq!(fx.repo.count_dojos().await.unwrap(), 1);
		assert_eq!(fx.repo.list_memberships("repo").await.unwrap().len(), 1);
		assert_eq!(staging_entries(&fx.dojos_root()), 1);
		assert!(fx.dojo_dir("repo").join("dojo.yml").exists());
		assert_eq!(staging_entries(&fx.staging_root()), 0);
	}

	#[tokio::test]
	async fn test_cancelled_publish_removes_staging() {
		struct HangingRunner;

		#[async_trait::async_trait]
		impl crate::clone::CloneRunner for HangingRunner {
			async fn run_clone(
				&self,
				_locator: &RepositoryLocator,
				dest: &Path,
				_timeout: Duration,
			) -> std::io::Result<crate::clone::CloneOutput> {
				std::fs::write(dest.join("partial"), "x")?;
				std::future::pending().await
			}
		}

		let root = tempfile::tempdir().unwrap();
		let repo = DojoRepository::new(dojo_server_db::testing::create_dojo_test_pool().await);
		let publisher = DojoPublisher::new(
			LocatorPolicy::new("github.com").unwrap(),
			StagingCloner::new(
				Arc::new(HangingRunner),
				root.path().join("staging"),
				Duration::from_secs(60),
			),
			Arc::new(YamlDescriptorLoader),
			repo.clone(),
			root.path().join("dojos"),
		);

		let result = tokio::time::timeout(
			Duration::from_millis(50),
			publisher.publish("https://github.com/acct/repo", 1),
		)
		.await;

		assert!(result.is_err());
		assert_eq!(staging_entries(&root.path().join("staging")), 0);
		assert_eq!(repo.count_dojos().await.unwrap(), 0);
	}
}
