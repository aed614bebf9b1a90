// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
	#[error("missing authenticated identity in request context")]
	Unauthenticated,

	#[error("identity uid must not be empty")]
	EmptyUid,
}
