// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secure value repository.
//!
//! Row mutations and their audit events commit together or not at all. Each
//! statement is expected to touch exactly one row; anything else aborts the
//! transaction with [`DbError::RowCount`].

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row, Sqlite, Transaction};

use crate::error::{DbError, Result};

/// Stored secure value row.
///
/// `annotations`, `labels` and `apis` are JSON text, `NULL` when empty.
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureValueRow {
	pub uid: String,
	pub namespace: String,
	pub name: String,
	pub title: String,
	pub salt: String,
	pub value: String,
	pub keeper: String,
	pub addr: String,
	pub created: i64,
	pub created_by: String,
	pub updated: i64,
	pub updated_by: String,
	pub annotations: Option<String>,
	pub labels: Option<String>,
	pub apis: Option<String>,
}

/// Stored audit event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureValueEventRow {
	pub uid: String,
	pub namespace: String,
	pub name: String,
	pub action: String,
	pub who: String,
	pub when: i64,
	pub what: String,
}

#[async_trait]
pub trait SecureValueRowStore: Send + Sync {
	async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecureValueRow>>;
	async fn list(&self, namespace: &str) -> Result<Vec<SecureValueRow>>;
	async fn create(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()>;
	async fn update(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()>;
	async fn delete(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()>;
	async fn history(&self, namespace: &str, name: &str) -> Result<Vec<SecureValueEventRow>>;
}

/// Repository for secure value database operations.
#[derive(Clone)]
pub struct SecureValueRepository {
	pool: SqlitePool,
}

const SELECT_COLUMNS: &str = "uid, namespace, name, title, salt, value, keeper, addr, created, \
	created_by, updated, updated_by, annotations, labels, apis";

impl SecureValueRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	/// Get a row by namespace and name.
	#[tracing::instrument(skip(self))]
	pub async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecureValueRow>> {
		let query = format!("SELECT {SELECT_COLUMNS} FROM secure_value WHERE namespace = ? AND name = ?");
		let row = sqlx::query(&query)
			.bind(namespace)
			.bind(name)
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(parse_secure_value_row).transpose()
	}

	/// List every row in a namespace, ordered by name.
	#[tracing::instrument(skip(self))]
	pub async fn list(&self, namespace: &str) -> Result<Vec<SecureValueRow>> {
		let query =
			format!("SELECT {SELECT_COLUMNS} FROM secure_value WHERE namespace = ? ORDER BY name ASC");
		let rows = sqlx::query(&query)
			.bind(namespace)
			.fetch_all(&self.pool)
			.await?;

		rows.iter().map(parse_secure_value_row).collect()
	}

	/// Insert a row and its `create` event.
	///
	/// Returns `Err(DbError::Conflict)` if `(namespace, name)` is taken.
	#[tracing::instrument(skip(self, row, event), fields(uid = %row.uid, namespace = %row.namespace, name = %row.name))]
	pub async fn create(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let result = sqlx::query(
			r#"
			INSERT INTO secure_value (uid, namespace, name, title, salt, value, keeper, addr, created, created_by, updated, updated_by, annotations, labels, apis)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&row.uid)
		.bind(&row.namespace)
		.bind(&row.name)
		.bind(&row.title)
		.bind(&row.salt)
		.bind(&row.value)
		.bind(&row.keeper)
		.bind(&row.addr)
		.bind(row.created)
		.bind(&row.created_by)
		.bind(row.updated)
		.bind(&row.updated_by)
		.bind(&row.annotations)
		.bind(&row.labels)
		.bind(&row.apis)
		.execute(&mut *tx)
		.await;

		let affected = match result {
			Ok(done) => done.rows_affected(),
			Err(e) if is_unique_constraint_error(&e) => {
				return Err(DbError::Conflict(format!(
					"secure value already exists: {}/{}",
					row.namespace, row.name
				)));
			}
			Err(e) => return Err(DbError::Sqlx(e)),
		};
		expect_one_row(affected)?;

		insert_event(&mut tx, event).await?;
		tx.commit().await?;

		tracing::debug!(uid = %row.uid, "secure value created");
		Ok(())
	}

	/// Replace a row in place and record its `update` event.
	#[tracing::instrument(skip(self, row, event), fields(uid = %row.uid, namespace = %row.namespace, name = %row.name))]
	pub async fn update(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let result = sqlx::query(
			r#"
			UPDATE secure_value
			SET title = ?, salt = ?, value = ?, keeper = ?, addr = ?, created = ?, created_by = ?,
			    updated = ?, updated_by = ?, annotations = ?, labels = ?, apis = ?
			WHERE uid = ? AND namespace = ? AND name = ?
			"#,
		)
		.bind(&row.title)
		.bind(&row.salt)
		.bind(&row.value)
		.bind(&row.keeper)
		.bind(&row.addr)
		.bind(row.created)
		.bind(&row.created_by)
		.bind(row.updated)
		.bind(&row.updated_by)
		.bind(&row.annotations)
		.bind(&row.labels)
		.bind(&row.apis)
		.bind(&row.uid)
		.bind(&row.namespace)
		.bind(&row.name)
		.execute(&mut *tx)
		.await?;
		expect_one_row(result.rows_affected())?;

		insert_event(&mut tx, event).await?;
		tx.commit().await?;

		tracing::debug!(uid = %row.uid, "secure value updated");
		Ok(())
	}

	/// Remove a row and record its `delete` event.
	///
	/// Only removes the row if its uid still matches, so a row recreated
	/// under the same name in the meantime is left alone.
	#[tracing::instrument(skip(self, row, event), fields(uid = %row.uid, namespace = %row.namespace, name = %row.name))]
	pub async fn delete(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let result =
			sqlx::query("DELETE FROM secure_value WHERE uid = ? AND namespace = ? AND name = ?")
				.bind(&row.uid)
				.bind(&row.namespace)
				.bind(&row.name)
				.execute(&mut *tx)
				.await?;
		expect_one_row(result.rows_affected())?;

		insert_event(&mut tx, event).await?;
		tx.commit().await?;

		tracing::debug!(uid = %row.uid, "secure value deleted");
		Ok(())
	}

	/// Audit events for a namespace and name, oldest first.
	///
	/// Events outlive the row, so this works after deletion.
	#[tracing::instrument(skip(self))]
	pub async fn history(&self, namespace: &str, name: &str) -> Result<Vec<SecureValueEventRow>> {
		let rows = sqlx::query(
			r#"
			SELECT uid, namespace, name, action, who, "when", what
			FROM secure_value_history
			WHERE namespace = ? AND name = ?
			ORDER BY "when" ASC, rowid ASC
			"#,
		)
		.bind(namespace)
		.bind(name)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.iter().map(parse_event_row).collect())
	}
}

#[async_trait]
impl SecureValueRowStore for SecureValueRepository {
	async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecureValueRow>> {
		SecureValueRepository::get(self, namespace, name).await
	}

	async fn list(&self, namespace: &str) -> Result<Vec<SecureValueRow>> {
		SecureValueRepository::list(self, namespace).await
	}

	async fn create(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()> {
		SecureValueRepository::create(self, row, event).await
	}

	async fn update(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()> {
		SecureValueRepository::update(self, row, event).await
	}

	async fn delete(&self, row: &SecureValueRow, event: &SecureValueEventRow) -> Result<()> {
		SecureValueRepository::delete(self, row, event).await
	}

	async fn history(&self, namespace: &str, name: &str) -> Result<Vec<SecureValueEventRow>> {
		SecureValueRepository::history(self, namespace, name).await
	}
}

async fn insert_event(tx: &mut Transaction<'_, Sqlite>, event: &SecureValueEventRow) -> Result<()> {
	let result = sqlx::query(
		r#"
		INSERT INTO secure_value_history (uid, namespace, name, action, who, "when", what)
		VALUES (?, ?, ?, ?, ?, ?, ?)
		"#,
	)
	.bind(&event.uid)
	.bind(&event.namespace)
	.bind(&event.name)
	.bind(&event.action)
	.bind(&event.who)
	.bind(event.when)
	.bind(&event.what)
	.execute(&mut **tx)
	.await?;

	expect_one_row(result.rows_affected())
}

fn expect_one_row(actual: u64) -> Result<()> {
	if actual != 1 {
		return Err(DbError::RowCount {
			expected: 1,
			actual,
		});
	}
	Ok(())
}

fn parse_secure_value_row(row: &sqlx::sqlite::SqliteRow) -> Result<SecureValueRow> {
	Ok(SecureValueRow {
		uid: row.try_get("uid")?,
		namespace: row.try_get("namespace")?,
		name: row.try_get("name")?,
		title: row.try_get("title")?,
		salt: row.try_get("salt")?,
		value: row.try_get("value")?,
		keeper: row.try_get("keeper")?,
		addr: row.try_get("addr")?,
		created: row.try_get("created")?,
		created_by: row.try_get("created_by")?,
		updated: row.try_get("updated")?,
		updated_by: row.try_get("updated_by")?,
		annotations: row.try_get("annotations")?,
		labels: row.try_get("labels")?,
		apis: row.try_get("apis")?,
	})
}

fn parse_event_row(row: &sqlx::sqlite::SqliteRow) -> SecureValueEventRow {
	SecureValueEventRow {
		uid: row.get("uid"),
		namespace: row.get("namespace"),
		name: row.get("name"),
		action: row.get("action"),
		who: row.get("who"),
		when: row.get("when"),
		what: row.get("what"),
	}
}

pub fn is_unique_constraint_error(e: &sqlx::Error) -> bool {
	if let sqlx::Error::Database(ref db_err) = e {
		return db_err.message().contains("UNIQUE constraint failed");
	}
	false
}
