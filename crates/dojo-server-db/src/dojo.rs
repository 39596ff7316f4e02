// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dojo and membership persistence.
//!
//! Multi-statement operations go through [`DojoTransaction`], an explicit
//! transaction handle. Dropping a handle without calling
//! [`DojoTransaction::commit`] rolls the transaction back.

use chrono::{DateTime, Utc};
use sqlx::{
	sqlite::{Sqlite, SqlitePool},
	Row, Transaction,
};

use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DojoRecord {
	pub dojo_id: String,
	pub repository: String,
	pub directory: String,
	pub name: String,
	pub description: Option<String>,
	pub official: bool,
	/// Ordered modules and challenges, serialized as JSON.
	pub modules: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRecord {
	pub dojo_id: String,
	pub user_id: i64,
	pub role: String,
	pub joined_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DojoRepository {
	pool: SqlitePool,
}

impl DojoRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	/// Begin an explicit transaction.
	#[tracing::instrument(skip(self))]
	pub async fn begin(&self) -> Result<DojoTransaction, DbError> {
		let tx = self.pool.begin().await?;
		Ok(DojoTransaction { tx })
	}

	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn get_dojo(&self, dojo_id: &str) -> Result<Option<DojoRecord>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT dojo_id, repository, directory, name, description, official, modules, created_at, updated_at
			FROM dojos
			WHERE dojo_id = ?
			"#,
		)
		.bind(dojo_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_dojo(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(repository = %repository))]
	pub async fn get_dojo_by_repository(
		&self,
		repository: &str,
	) -> Result<Option<DojoRecord>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT dojo_id, repository, directory, name, description, official, modules, created_at, updated_at
			FROM dojos
			WHERE repository = ?
			"#,
		)
		.bind(repository)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_dojo(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn list_memberships(&self, dojo_id: &str) -> Result<Vec<MembershipRecord>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT dojo_id, user_id, role, joined_at
			FROM dojo_members
			WHERE dojo_id = ?
			ORDER BY joined_at ASC, user_id ASC
			"#,
		)
		.bind(dojo_id)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_membership).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_dojos(&self) -> Result<i64, DbError> {
		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dojos")
			.fetch_one(&self.pool)
			.await?;
		Ok(count)
	}

	/// Mark a dojo as official (protected) or not.
	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id, official = official))]
	pub async fn set_official(&self, dojo_id: &str, official: bool) -> Result<(), DbError> {
		let result = sqlx::query("UPDATE dojos SET official = ?, updated_at = ? WHERE dojo_id = ?")
			.bind(official)
			.bind(Utc::now().to_rfc3339())
			.bind(dojo_id)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("dojo {dojo_id}")));
		}

		Ok(())
	}

	/// Delete a dojo and its memberships in a single transaction.
	///
	/// Returns `DbError::NotFound` if no row matched.
	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn delete_dojo(&self, dojo_id: &str) -> Result<(), DbError> {
		let mut tx = self.begin().await?;
		tx.delete_dojo(dojo_id).await?;
		tx.commit().await
	}

	#[tracing::instrument(skip(self))]
	pub async fn ping(&self) -> Result<(), DbError> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;
		Ok(())
	}
}

/// An open transaction over the dojo tables.
pub struct DojoTransaction {
	tx: Transaction<'static, Sqlite>,
}

impl DojoTransaction {
	#[tracing::instrument(skip(self, dojo), fields(dojo_id = %dojo.dojo_id, repository = %dojo.repository))]
	pub async fn insert_dojo(&mut self, dojo: &DojoRecord) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO dojos (dojo_id, repository, directory, name, description, official, modules, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&dojo.dojo_id)
		.bind(&dojo.repository)
		.bind(&dojo.directory)
		.bind(&dojo.name)
		.bind(&dojo.description)
		.bind(dojo.official)
		.bind(&dojo.modules)
		.bind(dojo.created_at.to_rfc3339())
		.bind(dojo.updated_at.to_rfc3339())
		.execute(&mut *self.tx)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				DbError::Conflict("Dojo already exists".to_string())
			}
			_ => DbError::Sqlx(e),
		})?;

		Ok(())
	}

	#[tracing::instrument(skip(self, membership), fields(dojo_id = %membership.dojo_id, user_id = membership.user_id, role = %membership.role))]
	pub async fn insert_membership(&mut self, membership: &MembershipRecord) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO dojo_members (dojo_id, user_id, role, joined_at)
			VALUES (?, ?, ?, ?)
			"#,
		)
		.bind(&membership.dojo_id)
		.bind(membership.user_id)
		.bind(&membership.role)
		.bind(membership.joined_at.to_rfc3339())
		.execute(&mut *self.tx)
		.await
		.map_err(|e| match e {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				DbError::Conflict("Membership already exists".to_string())
			}
			_ => DbError::Sqlx(e),
		})?;

		Ok(())
	}

	/// Touch the dojo row so this transaction holds the write lock before it
	/// reads membership state. Returns `false` if the dojo does not exist.
	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn lock_dojo(&mut self, dojo_id: &str) -> Result<bool, DbError> {
		let result = sqlx::query("UPDATE dojos SET updated_at = ? WHERE dojo_id = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(dojo_id)
			.execute(&mut *self.tx)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn get_dojo(&mut self, dojo_id: &str) -> Result<Option<DojoRecord>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT dojo_id, repository, directory, name, description, official, modules, created_at, updated_at
			FROM dojos
			WHERE dojo_id = ?
			"#,
		)
		.bind(dojo_id)
		.fetch_optional(&mut *self.tx)
		.await?;

		row.map(|r| row_to_dojo(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id, user_id = user_id))]
	pub async fn get_membership(
		&mut self,
		dojo_id: &str,
		user_id: i64,
	) -> Result<Option<MembershipRecord>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT dojo_id, user_id, role, joined_at
			FROM dojo_members
			WHERE dojo_id = ? AND user_id = ?
			"#,
		)
		.bind(dojo_id)
		.bind(user_id)
		.fetch_optional(&mut *self.tx)
		.await?;

		row.map(|r| row_to_membership(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn count_admins(&mut self, dojo_id: &str) -> Result<i64, DbError> {
		let count: i64 =
			sqlx::query_scalar("SELECT COUNT(*) FROM dojo_members WHERE dojo_id = ? AND role = 'admin'")
				.bind(dojo_id)
				.fetch_one(&mut *self.tx)
				.await?;
		Ok(count)
	}

	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id, user_id = user_id))]
	pub async fn delete_membership(&mut self, dojo_id: &str, user_id: i64) -> Result<(), DbError> {
		let result = sqlx::query("DELETE FROM dojo_members WHERE dojo_id = ? AND user_id = ?")
			.bind(dojo_id)
			.bind(user_id)
			.execute(&mut *self.tx)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!(
				"membership {dojo_id}/{user_id}"
			)));
		}

		Ok(())
	}

	/// Delete the dojo row together with every membership referencing it.
	#[tracing::instrument(skip(self), fields(dojo_id = %dojo_id))]
	pub async fn delete_dojo(&mut self, dojo_id: &str) -> Result<(), DbError> {
		sqlx::query("DELETE FROM dojo_members WHERE dojo_id = ?")
			.bind(dojo_id)
			.execute(&mut *self.tx)
			.await?;

		let result = sqlx::query("DELETE FROM dojos WHERE dojo_id = ?")
			.bind(dojo_id)
			.execute(&mut *self.tx)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("dojo {dojo_id}")));
		}

		Ok(())
	}

	pub async fn commit(self) -> Result<(), DbError> {
		self.tx.commit().await?;
		Ok(())
	}

	pub async fn rollback(self) -> Result<(), DbError> {
		self.tx.rollback().await?;
		Ok(())
	}
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|d| d.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(e.to_string()))
}

fn row_to_dojo(row: &sqlx::sqlite::SqliteRow) -> Result<DojoRecord, DbError> {
	let created_at_str: String = row.get("created_at");
	let updated_at_str: String = row.get("updated_at");

	Ok(DojoRecord {
		dojo_id: row.get("dojo_id"),
		repository: row.get("repository"),
		directory: row.get("directory"),
		name: row.get("name"),
		description: row.get("description"),
		official: row.get::<i64, _>("official") != 0,
		modules: row.get("modules"),
		created_at: parse_timestamp(&created_at_str)?,
		updated_at: parse_timestamp(&updated_at_str)?,
	})
}

fn row_to_membership(row: &sqlx::sqlite::SqliteRow) -> Result<MembershipRecord, DbError> {
	let joined_at_str: String = row.get("joined_at");

	Ok(MembershipRecord {
		dojo_id: row.get("dojo_id"),
		user_id: row.get("user_id"),
		role: row.get("role"),
		joined_at: parse_timestamp(&joined_at_str)?,
	})
}
