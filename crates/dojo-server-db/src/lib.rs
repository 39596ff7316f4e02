// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database layer for the dojo server.

pub mod dojo;
pub mod error;
pub mod pool;
pub mod testing;

pub use dojo::{DojoRecord, DojoRepository, DojoTransaction, MembershipRecord};
pub use error::{DbError, Result};
pub use pool::{create_pool, run_migrations};
