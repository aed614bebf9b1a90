// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authenticated caller identity.
//!
//! An [`Identity`] is produced by the authentication layer and handed to the
//! store inside a [`crate::RequestContext`]. It carries a stable unique
//! identifier (recorded as `created_by`/`updated_by` and in audit events) plus
//! the attributes the bundled [`crate::PolicyAuthorizer`] evaluates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, AuthResult};

/// Role held by an identity within one namespace. Ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceRole {
	Viewer,
	Editor,
	Admin,
}

impl NamespaceRole {
	pub fn as_str(&self) -> &'static str {
		match self {
			NamespaceRole::Viewer => "viewer",
			NamespaceRole::Editor => "editor",
			NamespaceRole::Admin => "admin",
		}
	}
}

impl fmt::Display for NamespaceRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for NamespaceRole {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"viewer" => Ok(NamespaceRole::Viewer),
			"editor" => Ok(NamespaceRole::Editor),
			"admin" => Ok(NamespaceRole::Admin),
			other => Err(format!("unknown namespace role: {other}")),
		}
	}
}

/// A role grant scoped to a single namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceGrant {
	pub namespace: String,
	pub role: NamespaceRole,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	uid: String,
	/// API identifier when the caller is a downstream system; matched against
	/// a secure value's `apis` list on reveal.
	service: Option<String>,
	grants: Vec<NamespaceGrant>,
	system_admin: bool,
}

impl Identity {
	/// Creates an identity with no grants.
	pub fn new(uid: impl Into<String>) -> AuthResult<Self> {
		let uid = uid.into();
		if uid.trim().is_empty() {
			return Err(AuthError::EmptyUid);
		}
		Ok(Self {
			uid,
			service: None,
			grants: Vec::new(),
			system_admin: false,
		})
	}

	pub fn uid(&self) -> &str {
		&self.uid
	}

	pub fn service(&self) -> Option<&str> {
		self.service.as_deref()
	}

	pub fn grants(&self) -> &[NamespaceGrant] {
		&self.grants
	}

	pub fn is_system_admin(&self) -> bool {
		self.system_admin
	}

	/// Builder: mark the caller as a downstream API.
	pub fn with_service(mut self, service: impl Into<String>) -> Self {
		self.service = Some(service.into());
		self
	}

	/// Builder: grant a role in a namespace. A later grant for the same
	/// namespace replaces the earlier one.
	pub fn with_grant(mut self, namespace: impl Into<String>, role: NamespaceRole) -> Self {
		let namespace = namespace.into();
		self.grants.retain(|g| g.namespace != namespace);
		self.grants.push(NamespaceGrant { namespace, role });
		self
	}

	/// Builder: set the system administrator flag.
	pub fn with_system_admin(mut self, admin: bool) -> Self {
		self.system_admin = admin;
		self
	}

	/// Returns the role held in the given namespace, if any.
	pub fn namespace_role(&self, namespace: &str) -> Option<NamespaceRole> {
		self
			.grants
			.iter()
			.find(|g| g.namespace == namespace)
			.map(|g| g.role)
	}

	/// Returns true if the caller holds at least `role` in `namespace`.
	pub fn has_role_at_least(&self, namespace: &str, role: NamespaceRole) -> bool {
		self
			.namespace_role(namespace)
			.map(|held| held >= role)
			.unwrap_or(false)
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.uid)
	}
}
