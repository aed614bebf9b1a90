// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! External (API-facing) representation of secure values.
//!
//! `spec.value` is only ever populated on the way in (create/update) and by
//! the reveal path. It is a [`SecretString`], so it serializes as
//! `[REDACTED]` even when populated, and is omitted entirely when empty.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use coffer_common_secret::SecretString;
use serde::{Deserialize, Serialize};

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
	pub namespace: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub uid: String,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub labels: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub annotations: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub creation_timestamp: Option<DateTime<Utc>>,
	/// Milliseconds of the last write. Zero until persisted.
	#[serde(default)]
	pub resource_version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureValueSpec {
	#[serde(default)]
	pub title: String,
	#[serde(default, skip_serializing_if = "SecretString::is_empty")]
	pub value: SecretString,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub apis: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecureValue {
	pub metadata: ObjectMeta,
	pub spec: SecureValueSpec,
}

impl SecureValue {
	pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			metadata: ObjectMeta {
				namespace: namespace.into(),
				name: name.into(),
				..Default::default()
			},
			spec: SecureValueSpec::default(),
		}
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.spec.title = title.into();
		self
	}

	pub fn with_value(mut self, value: impl Into<SecretString>) -> Self {
		self.spec.value = value.into();
		self
	}

	pub fn with_apis<I, S>(mut self, apis: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.spec.apis = apis.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata.labels.insert(key.into(), value.into());
		self
	}

	pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata.annotations.insert(key.into(), value.into());
		self
	}

	pub fn namespace(&self) -> &str {
		&self.metadata.namespace
	}

	pub fn name(&self) -> &str {
		&self.metadata.name
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecureValueList {
	pub items: Vec<SecureValue>,
}

/// Audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
	Create,
	Update,
	Delete,
}

impl AuditAction {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuditAction::Create => "CREATE",
			AuditAction::Update => "UPDATE",
			AuditAction::Delete => "DELETE",
		}
	}
}

impl fmt::Display for AuditAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AuditAction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"CREATE" => Ok(AuditAction::Create),
			"UPDATE" => Ok(AuditAction::Update),
			"DELETE" => Ok(AuditAction::Delete),
			other => Err(format!("unknown audit action: {other}")),
		}
	}
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureValueActivity {
	/// Milliseconds since the Unix epoch.
	pub timestamp: i64,
	pub namespace: String,
	pub name: String,
	pub action: String,
	pub identity: String,
	/// Comma-joined list of changed fields; empty for create and delete.
	pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureValueActivityList {
	pub items: Vec<SecureValueActivity>,
	#[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
	pub continue_token: Option<String>,
}
