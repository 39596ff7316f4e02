// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dojo provisioning: validating and cloning external repositories,
//! publishing them as dojos, and the membership lifecycle that tears them
//! down again.

pub mod cleanup;
pub mod clone;
pub mod descriptor;
pub mod error;
pub mod locator;
pub mod membership;
pub mod publish;
pub mod types;

pub use cleanup::{sweep_stale_staging, SweepDecision, SweepResult};
pub use clone::{
	CloneOutput, CloneRunner, DirectoryMover, GitCloneRunner, RenameMover, StagingArea,
	StagingCloner,
};
pub use descriptor::{DescriptorLoader, DojoDescriptor, YamlDescriptorLoader};
pub use error::{ProvisionError, Result};
pub use locator::{LocatorPolicy, RepositoryLocator, Transport};
pub use membership::{LeaveOutcome, MembershipLifecycle};
pub use publish::DojoPublisher;
pub use types::{Dojo, DojoChallenge, DojoMembership, DojoModule, DojoRole};
