// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pools for tests in this and downstream crates.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;
use crate::run_migrations;

/// A single-connection in-memory pool. Every connection to `:memory:` is a
/// separate database, so the pool must never open a second one.
pub async fn create_test_pool() -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(":memory:")?.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.min_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect_with(options)
		.await?;

	Ok(pool)
}

/// In-memory pool with the secure value schema applied.
pub async fn create_secure_value_test_pool() -> Result<SqlitePool> {
	let pool = create_test_pool().await?;
	run_migrations(&pool).await?;
	Ok(pool)
}

/// Make every insert into the audit log fail.
pub async fn install_history_abort_trigger(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TRIGGER IF NOT EXISTS abort_secure_value_history
		BEFORE INSERT ON secure_value_history
		BEGIN
			SELECT RAISE(ABORT, 'history unavailable');
		END
		"#,
	)
	.execute(pool)
	.await?;
	Ok(())
}

/// Undo [`install_history_abort_trigger`].
pub async fn remove_history_abort_trigger(pool: &SqlitePool) -> Result<()> {
	sqlx::query("DROP TRIGGER IF EXISTS abort_secure_value_history")
		.execute(pool)
		.await?;
	Ok(())
}
