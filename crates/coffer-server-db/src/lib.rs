// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the secure value store.
//!
//! Two tables: `secure_value` holds one row per `(namespace, name)` and
//! `secure_value_history` is the append-only audit log. Every mutation in
//! [`SecureValueRepository`] writes the row change and its audit event in a
//! single transaction.

pub mod error;
pub mod pool;
pub mod secure_value;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DbError, Result};
pub use pool::create_pool;
pub use secure_value::{
	SecureValueEventRow, SecureValueRepository, SecureValueRow, SecureValueRowStore,
};

use sqlx::sqlite::SqlitePool;

const MIGRATIONS: &[(&str, &str)] = &[
	(
		"001_secure_value",
		include_str!("../migrations/001_secure_value.sql"),
	),
	(
		"002_secure_value_history",
		include_str!("../migrations/002_secure_value_history.sql"),
	),
];

/// Apply the schema.
///
/// Migrations are idempotent - safe to run multiple times.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for (name, sql) in MIGRATIONS {
		let sql = strip_comments(sql);
		for stmt in sql.split(';').filter(|s| !s.trim().is_empty()) {
			if let Err(e) = sqlx::query(stmt).execute(pool).await {
				if !e.to_string().contains("already exists") {
					tracing::error!(migration = name, error = %e, "migration failed");
					return Err(e.into());
				}
			}
		}
		tracing::debug!(migration = name, "migration applied");
	}
	Ok(())
}

/// Drop `--` comment lines so a `;` inside a comment cannot split a statement.
fn strip_comments(sql: &str) -> String {
	sql
		.lines()
		.filter(|line| !line.trim_start().starts_with("--"))
		.collect::<Vec<_>>()
		.join("\n")
}
