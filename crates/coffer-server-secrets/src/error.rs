// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the secure value store.
//!
//! No variant ever carries a plaintext value.

use coffer_server_auth::{AuthError, Interrupted};
use coffer_server_db::DbError;
use thiserror::Error;

/// Result type alias for secure value operations.
pub type SecretsResult<T> = Result<T, SecretsError>;

#[derive(Debug, Error)]
pub enum SecretsError {
	#[error("missing authenticated identity")]
	Unauthenticated,

	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	#[error("secure value not found: {namespace}/{name}")]
	NotFound { namespace: String, name: String },

	#[error("permission denied: {0}")]
	PermissionDenied(String),

	#[error("raw secret found in {field}")]
	PlaintextLeak { field: &'static str },

	#[error("write failed: {0}")]
	WriteFailed(String),

	#[error("secure value already exists: {namespace}/{name}")]
	AlreadyExists { namespace: String, name: String },

	#[error("read failed: {0}")]
	ReadFailed(String),

	#[error("keeper error: {0}")]
	Keeper(String),

	#[error("operation cancelled")]
	Cancelled,

	#[error("deadline exceeded")]
	DeadlineExceeded,

	#[error("internal error: {0}")]
	Internal(String),
}

impl SecretsError {
	pub fn not_found(namespace: &str, name: &str) -> Self {
		SecretsError::NotFound {
			namespace: namespace.to_string(),
			name: name.to_string(),
		}
	}

	/// Map a storage error raised while writing `namespace/name`.
	pub fn from_write(err: DbError, namespace: &str, name: &str) -> Self {
		match err {
			DbError::Conflict(_) => SecretsError::AlreadyExists {
				namespace: namespace.to_string(),
				name: name.to_string(),
			},
			other => SecretsError::WriteFailed(other.to_string()),
		}
	}

	/// Map a storage error raised while reading.
	pub fn from_read(err: DbError) -> Self {
		SecretsError::ReadFailed(err.to_string())
	}

	/// Returns true if this error should be logged at error level.
	pub fn is_internal(&self) -> bool {
		matches!(
			self,
			SecretsError::WriteFailed(_)
				| SecretsError::ReadFailed(_)
				| SecretsError::Keeper(_)
				| SecretsError::Internal(_)
		)
	}

	/// Returns the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			// 401 Unauthorized
			SecretsError::Unauthenticated => 401,

			// 400 Bad Request
			SecretsError::InvalidArgument(_) | SecretsError::PlaintextLeak { .. } => 400,

			// 403 Forbidden
			SecretsError::PermissionDenied(_) => 403,

			// 404 Not Found
			SecretsError::NotFound { .. } => 404,

			// 409 Conflict
			SecretsError::AlreadyExists { .. } => 409,

			// 499 Client Closed Request
			SecretsError::Cancelled => 499,

			// 504 Gateway Timeout
			SecretsError::DeadlineExceeded => 504,

			// 500 Internal Server Error
			SecretsError::WriteFailed(_)
			| SecretsError::ReadFailed(_)
			| SecretsError::Keeper(_)
			| SecretsError::Internal(_) => 500,
		}
	}
}

impl From<AuthError> for SecretsError {
	fn from(err: AuthError) -> Self {
		match err {
			AuthError::Unauthenticated | AuthError::EmptyUid => SecretsError::Unauthenticated,
		}
	}
}

impl From<Interrupted> for SecretsError {
	fn from(err: Interrupted) -> Self {
		match err {
			Interrupted::Cancelled => SecretsError::Cancelled,
			Interrupted::DeadlineExceeded => SecretsError::DeadlineExceeded,
		}
	}
}
