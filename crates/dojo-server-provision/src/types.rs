// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dojo_server_db::{DbError, DojoRecord, MembershipRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DojoRole {
	Admin,
	Member,
}

impl DojoRole {
	pub fn as_str(&self) -> &'static str {
		match self {
			DojoRole::Admin => "admin",
			DojoRole::Member => "member",
		}
	}
}

impl std::str::FromStr for DojoRole {
	type Err = ();
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"admin" => Ok(DojoRole::Admin),
			"member" => Ok(DojoRole::Member),
			_ => Err(()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DojoChallenge {
	pub id: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DojoModule {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub challenges: Vec<DojoChallenge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dojo {
	pub dojo_id: String,
	pub repository: String,
	pub directory: PathBuf,
	pub name: String,
	pub description: Option<String>,
	pub official: bool,
	pub modules: Vec<DojoModule>,
	pub created_at: DateTime<Utc>,
}

impl Dojo {
	pub fn to_record(&self) -> Result<DojoRecord, DbError> {
		Ok(DojoRecord {
			dojo_id: self.dojo_id.clone(),
			repository: self.repository.clone(),
			directory: self.directory.to_string_lossy().into_owned(),
			name: self.name.clone(),
			description: self.description.clone(),
			official: self.official,
			modules: serde_json::to_string(&self.modules)?,
			created_at: self.created_at,
			updated_at: self.created_at,
		})
	}

	pub fn from_record(record: DojoRecord) -> Result<Self, DbError> {
		Ok(Dojo {
			modules: serde_json::from_str(&record.modules)?,
			dojo_id: record.dojo_id,
			repository: record.repository,
			directory: PathBuf::from(record.directory),
			name: record.name,
			description: record.description,
			official: record.official,
			created_at: record.created_at,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DojoMembership {
	pub dojo_id: String,
	pub user_id: i64,
	pub role: DojoRole,
	pub joined_at: DateTime<Utc>,
}

impl DojoMembership {
	pub fn new(dojo_id: impl Into<String>, user_id: i64, role: DojoRole) -> Self {
		Self {
			dojo_id: dojo_id.into(),
			user_id,
			role,
			joined_at: Utc::now(),
		}
	}

	pub fn to_record(&self) -> MembershipRecord {
		MembershipRecord {
			dojo_id: self.dojo_id.clone(),
			user_id: self.user_id,
			role: self.role.as_str().to_string(),
			joined_at: self.joined_at,
		}
	}

	pub fn from_record(record: MembershipRecord) -> Result<Self, DbError> {
		Ok(Self {
			role: record
				.role
				.parse::<DojoRole>()
				.map_err(|_| DbError::Internal(format!("invalid role: {}", record.role)))?,
			dojo_id: record.dojo_id,
			user_id: record.user_id,
			joined_at: record.joined_at,
		})
	}
}
