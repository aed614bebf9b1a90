// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Conversion between [`SecureValue`] and [`SecureValueRow`].
//!
//! The row is the only at-rest form of a secure value. `labels`, `apis` and
//! the caller-owned subset of `annotations` are stored as compact JSON, or
//! `NULL` when empty. Before any row is built the plaintext is searched for
//! in those fields and the write is rejected if it occurs there.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use coffer_server_auth::ResourceAttrs;
use coffer_server_db::SecureValueRow;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SecretsError, SecretsResult};
use crate::types::{ObjectMeta, SecureValue, SecureValueSpec};

pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";
pub const CREATED_BY_ANNOTATION: &str = "coffer.dev/createdBy";
pub const UPDATED_BY_ANNOTATION: &str = "coffer.dev/updatedBy";
pub const UPDATED_TIMESTAMP_ANNOTATION: &str = "coffer.dev/updatedTimestamp";

/// Annotations managed by the store. Never persisted from caller input.
pub const RESERVED_ANNOTATIONS: &[&str] = &[
	LAST_APPLIED_CONFIG_ANNOTATION,
	CREATED_BY_ANNOTATION,
	UPDATED_BY_ANNOTATION,
	UPDATED_TIMESTAMP_ANNOTATION,
];

/// Audit fields stamped onto a row by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStamp {
	pub uid: String,
	pub created: i64,
	pub created_by: String,
	pub updated: i64,
	pub updated_by: String,
}

impl RowStamp {
	/// Stamp carried over from an existing row.
	pub fn from_row(row: &SecureValueRow) -> Self {
		Self {
			uid: row.uid.clone(),
			created: row.created,
			created_by: row.created_by.clone(),
			updated: row.updated,
			updated_by: row.updated_by.clone(),
		}
	}
}

/// Encrypted payload as produced by a keeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
	pub salt: String,
	pub ciphertext: String,
	pub keeper: String,
	pub addr: String,
}

impl SealedPayload {
	pub fn from_row(row: &SecureValueRow) -> Self {
		Self {
			salt: row.salt.clone(),
			ciphertext: row.value.clone(),
			keeper: row.keeper.clone(),
			addr: row.addr.clone(),
		}
	}
}

/// Caller annotations with the reserved keys removed.
pub fn clean_annotations(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
	annotations
		.iter()
		.filter(|(key, _)| !RESERVED_ANNOTATIONS.contains(&key.as_str()))
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect()
}

/// Fail if the plaintext of `value` appears in its labels, apis or caller
/// annotations, either in their encoded form or in any raw key or value.
pub fn ensure_no_plaintext_leak(value: &SecureValue) -> SecretsResult<()> {
	let secret = &value.spec.value;
	if secret.is_empty() {
		return Ok(());
	}

	let annotations = clean_annotations(&value.metadata.annotations);
	if encode_map(&annotations)?.is_some_and(|json| secret.occurs_in(&json))
		|| map_contains(&annotations, |s| secret.occurs_in(s))
	{
		return Err(SecretsError::PlaintextLeak {
			field: "annotations",
		});
	}

	let labels = &value.metadata.labels;
	if encode_map(labels)?.is_some_and(|json| secret.occurs_in(&json))
		|| map_contains(labels, |s| secret.occurs_in(s))
	{
		return Err(SecretsError::PlaintextLeak { field: "labels" });
	}

	let apis = &value.spec.apis;
	if encode_list(apis)?.is_some_and(|json| secret.occurs_in(&json))
		|| apis.iter().any(|api| secret.occurs_in(api))
	{
		return Err(SecretsError::PlaintextLeak { field: "apis" });
	}

	Ok(())
}

/// Build the persisted row for `value`.
pub fn to_row(
	value: &SecureValue,
	stamp: &RowStamp,
	sealed: &SealedPayload,
) -> SecretsResult<SecureValueRow> {
	ensure_no_plaintext_leak(value)?;

	Ok(SecureValueRow {
		uid: stamp.uid.clone(),
		namespace: value.metadata.namespace.clone(),
		name: value.metadata.name.clone(),
		title: value.spec.title.clone(),
		salt: sealed.salt.clone(),
		value: sealed.ciphertext.clone(),
		keeper: sealed.keeper.clone(),
		addr: sealed.addr.clone(),
		created: stamp.created,
		created_by: stamp.created_by.clone(),
		updated: stamp.updated,
		updated_by: stamp.updated_by.clone(),
		annotations: encode_map(&clean_annotations(&value.metadata.annotations))?,
		labels: encode_map(&value.metadata.labels)?,
		apis: encode_list(&value.spec.apis)?,
	})
}

/// External form of a row. `spec.value` is always left empty.
pub fn to_external(row: &SecureValueRow) -> SecretsResult<SecureValue> {
	let mut annotations: BTreeMap<String, String> = decode(row.annotations.as_deref(), "annotations")?;
	annotations.insert(CREATED_BY_ANNOTATION.to_string(), row.created_by.clone());
	annotations.insert(UPDATED_BY_ANNOTATION.to_string(), row.updated_by.clone());
	if let Some(updated) = DateTime::<Utc>::from_timestamp_millis(row.updated) {
		annotations.insert(
			UPDATED_TIMESTAMP_ANNOTATION.to_string(),
			updated.to_rfc3339_opts(SecondsFormat::Millis, true),
		);
	}

	Ok(SecureValue {
		metadata: ObjectMeta {
			namespace: row.namespace.clone(),
			name: row.name.clone(),
			uid: row.uid.clone(),
			labels: decode(row.labels.as_deref(), "labels")?,
			annotations,
			creation_timestamp: DateTime::<Utc>::from_timestamp_millis(row.created),
			resource_version: row.updated,
		},
		spec: SecureValueSpec {
			title: row.title.clone(),
			value: Default::default(),
			apis: decode(row.apis.as_deref(), "apis")?,
		},
	})
}

/// Attributes the authorization gate sees for `value`.
pub fn resource_attrs(value: &SecureValue) -> ResourceAttrs {
	ResourceAttrs::new(value.namespace(), value.name())
		.with_labels(value.metadata.labels.clone())
		.with_apis(value.spec.apis.clone())
}

fn map_contains(map: &BTreeMap<String, String>, hit: impl Fn(&str) -> bool) -> bool {
	map.iter().any(|(key, value)| hit(key) || hit(value))
}

fn encode_map(map: &BTreeMap<String, String>) -> SecretsResult<Option<String>> {
	if map.is_empty() {
		return Ok(None);
	}
	encode(map).map(Some)
}

fn encode_list(list: &[String]) -> SecretsResult<Option<String>> {
	if list.is_empty() {
		return Ok(None);
	}
	encode(list).map(Some)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> SecretsResult<String> {
	serde_json::to_string(value).map_err(|e| SecretsError::Internal(format!("encode failed: {e}")))
}

fn decode<T: DeserializeOwned + Default>(raw: Option<&str>, field: &str) -> SecretsResult<T> {
	match raw {
		None | Some("") => Ok(T::default()),
		Some(json) => serde_json::from_str(json)
			.map_err(|e| SecretsError::Internal(format!("stored {field} are corrupt: {e}"))),
	}
}
