// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Namespace-role policy for secure values.
//!
//! [`is_allowed`] is a pure function of the caller, the capability and the
//! resource. The rules:
//!
//! 1. A system administrator may do anything.
//! 2. `CanView` requires any role in the resource's namespace.
//! 3. `OnCreate`, `OnUpdate` and `OnDelete` require `Editor` or above.
//! 4. `CanDecrypt` requires `Admin`, or any role plus the caller's service
//!    being listed in the resource's `apis`.

use async_trait::async_trait;
use tracing::instrument;

use crate::authorizer::{Authorizer, Capability, ResourceAttrs};
use crate::identity::{Identity, NamespaceRole};

#[instrument(
	level = "debug",
	skip(identity, resource),
	fields(
		uid = %identity.uid(),
		capability = capability.as_str(),
		namespace = %resource.namespace,
		name = %resource.name,
	)
)]
pub fn is_allowed(identity: &Identity, capability: Capability, resource: &ResourceAttrs) -> bool {
	if identity.is_system_admin() {
		return true;
	}

	let Some(role) = identity.namespace_role(&resource.namespace) else {
		return false;
	};

	match capability {
		Capability::CanView => true,
		Capability::OnCreate | Capability::OnUpdate | Capability::OnDelete => {
			role >= NamespaceRole::Editor
		}
		Capability::CanDecrypt => {
			if role == NamespaceRole::Admin {
				return true;
			}
			identity
				.service()
				.map(|service| resource.apis.iter().any(|api| api == service))
				.unwrap_or(false)
		}
	}
}

/// [`Authorizer`] backed by [`is_allowed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyAuthorizer;

impl PolicyAuthorizer {
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl Authorizer for PolicyAuthorizer {
	async fn on_create(&self, identity: &Identity, resource: &ResourceAttrs) -> bool {
		is_allowed(identity, Capability::OnCreate, resource)
	}

	async fn on_update(&self, identity: &Identity, old: &ResourceAttrs, new: &ResourceAttrs) -> bool {
		is_allowed(identity, Capability::OnUpdate, old) && is_allowed(identity, Capability::OnUpdate, new)
	}

	async fn on_delete(&self, identity: &Identity, resource: &ResourceAttrs) -> bool {
		is_allowed(identity, Capability::OnDelete, resource)
	}

	async fn can_view(&self, identity: &Identity, resource: &ResourceAttrs) -> bool {
		is_allowed(identity, Capability::CanView, resource)
	}

	async fn can_decrypt(&self, identity: &Identity, resource: &ResourceAttrs) -> bool {
		is_allowed(identity, Capability::CanDecrypt, resource)
	}
}
