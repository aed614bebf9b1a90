// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-call request context.
//!
//! Every store operation receives a [`RequestContext`]: the caller's
//! [`Identity`] (absent for unauthenticated calls), a cancellation token owned
//! by the caller, and an optional deadline. [`RequestContext::run`] races an
//! operation against both; the losing future is dropped, which rolls back any
//! transaction it held open.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, AuthResult};
use crate::identity::Identity;

/// Why an operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
	Cancelled,
	DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
	identity: Option<Identity>,
	cancellation: CancellationToken,
	deadline: Option<Instant>,
}

impl RequestContext {
	/// Context for an authenticated caller, with no deadline.
	pub fn new(identity: Identity) -> Self {
		Self {
			identity: Some(identity),
			cancellation: CancellationToken::new(),
			deadline: None,
		}
	}

	/// Context with no identity. Every store operation rejects it.
	pub fn anonymous() -> Self {
		Self::default()
	}

	/// Builder: share a caller-owned cancellation token.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = token;
		self
	}

	/// Builder: fail the call once `timeout` has elapsed from now.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.deadline = Some(Instant::now() + timeout);
		self
	}

	/// Builder: fail the call at an absolute deadline.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);
		self
	}

	pub fn identity(&self) -> Option<&Identity> {
		self.identity.as_ref()
	}

	/// Returns the identity or [`AuthError::Unauthenticated`].
	pub fn require_identity(&self) -> AuthResult<&Identity> {
		self.identity.as_ref().ok_or(AuthError::Unauthenticated)
	}

	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancellation
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Drive `fut` to completion unless the context is cancelled or its
	/// deadline passes first.
	pub async fn run<F, T>(&self, fut: F) -> Result<T, Interrupted>
	where
		F: Future<Output = T>,
	{
		if self.cancellation.is_cancelled() {
			return Err(Interrupted::Cancelled);
		}
		// A past deadline does not fire on the first poll of `sleep_until`.
		if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
			return Err(Interrupted::DeadlineExceeded);
		}

		match self.deadline {
			Some(deadline) => {
				tokio::select! {
					biased;
					_ = self.cancellation.cancelled() => Err(Interrupted::Cancelled),
					_ = tokio::time::sleep_until(deadline) => Err(Interrupted::DeadlineExceeded),
					out = fut => Ok(out),
				}
			}
			None => {
				tokio::select! {
					biased;
					_ = self.cancellation.cancelled() => Err(Interrupted::Cancelled),
					out = fut => Ok(out),
				}
			}
		}
	}
}
