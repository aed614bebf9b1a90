// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authorization gate consulted by the secure value store.
//!
//! The store asks the gate one question per capability. Create, update and
//! delete are asked before any write; view and decrypt are asked for every row
//! that is about to be returned.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Capability requested of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	OnCreate,
	OnUpdate,
	OnDelete,
	CanView,
	CanDecrypt,
}

impl Capability {
	pub fn as_str(&self) -> &'static str {
		match self {
			Capability::OnCreate => "on_create",
			Capability::OnUpdate => "on_update",
			Capability::OnDelete => "on_delete",
			Capability::CanView => "can_view",
			Capability::CanDecrypt => "can_decrypt",
		}
	}
}

/// Attributes of the secure value a decision is made about.
///
/// Never carries the plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAttrs {
	pub namespace: String,
	pub name: String,
	pub labels: BTreeMap<String, String>,
	pub apis: Vec<String>,
}

impl ResourceAttrs {
	pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			name: name.into(),
			..Default::default()
		}
	}

	pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
		self.labels = labels;
		self
	}

	pub fn with_apis(mut self, apis: Vec<String>) -> Self {
		self.apis = apis;
		self
	}
}

/// Pluggable authorization gate.
///
/// Implementations must be safe for concurrent use; the store shares one
/// instance across all calls.
#[async_trait]
pub trait Authorizer: Send + Sync {
	async fn on_create(&self, identity: &Identity, resource: &ResourceAttrs) -> bool;

	/// Called with both the stored state and the requested state.
	async fn on_update(&self, identity: &Identity, old: &ResourceAttrs, new: &ResourceAttrs) -> bool;

	async fn on_delete(&self, identity: &Identity, resource: &ResourceAttrs) -> bool;

	async fn can_view(&self, identity: &Identity, resource: &ResourceAttrs) -> bool;

	async fn can_decrypt(&self, identity: &Identity, resource: &ResourceAttrs) -> bool;
}

/// Gate that permits everything. Used by the CLI and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
	async fn on_create(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}

	async fn on_update(&self, _identity: &Identity, _old: &ResourceAttrs, _new: &ResourceAttrs) -> bool {
		true
	}

	async fn on_delete(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}

	async fn can_view(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}

	async fn can_decrypt(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}
}
