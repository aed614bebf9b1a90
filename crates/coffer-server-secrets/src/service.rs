// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The secure value store.
//!
//! [`SecureValueService`] orchestrates the row store, the keepers and the
//! authorization gate. Every operation requires an identity on the
//! [`RequestContext`] and runs under its cancellation token and deadline.
//!
//! [`SecureValueStore::decrypt`] is the only operation that returns a
//! populated `spec.value`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use coffer_common_secret::SecretString;
use coffer_server_auth::{Authorizer, Capability, Identity, RequestContext, ResourceAttrs};
use coffer_server_db::{DbError, SecureValueEventRow, SecureValueRow, SecureValueRowStore};
use tracing::instrument;
use uuid::Uuid;

use crate::codec::{
	clean_annotations, ensure_no_plaintext_leak, resource_attrs, to_external, to_row, RowStamp,
	SealedPayload,
};
use crate::error::{SecretsError, SecretsResult};
use crate::keeper::{generate_salt, Keepers, SaltyValue};
use crate::selector::LabelSelector;
use crate::types::{
	AuditAction, SecureValue, SecureValueActivity, SecureValueActivityList, SecureValueList,
};

/// Operations on secure values.
#[async_trait]
pub trait SecureValueStore: Send + Sync {
	/// Encrypt and persist a new secure value. `spec.value` is required.
	async fn create(&self, ctx: &RequestContext, value: SecureValue) -> SecretsResult<SecureValue>;

	async fn read(&self, ctx: &RequestContext, namespace: &str, name: &str)
		-> SecretsResult<SecureValue>;

	/// Replace the metadata of an existing value. An empty `spec.value`
	/// leaves the stored secret unchanged.
	async fn update(&self, ctx: &RequestContext, value: SecureValue) -> SecretsResult<SecureValue>;

	/// Returns `false` if the row disappeared between lookup and delete.
	async fn delete(&self, ctx: &RequestContext, namespace: &str, name: &str) -> SecretsResult<bool>;

	/// Values in `namespace` visible to the caller and matching `selector`.
	async fn list(
		&self,
		ctx: &RequestContext,
		namespace: &str,
		selector: &str,
	) -> SecretsResult<SecureValueList>;

	/// Reveal the plaintext.
	async fn decrypt(
		&self,
		ctx: &RequestContext,
		namespace: &str,
		name: &str,
	) -> SecretsResult<SecureValue>;

	/// Audit events, oldest first. The full set is always returned.
	async fn history(
		&self,
		ctx: &RequestContext,
		namespace: &str,
		name: &str,
		continue_token: Option<&str>,
	) -> SecretsResult<SecureValueActivityList>;
}

pub struct SecureValueService {
	rows: Arc<dyn SecureValueRowStore>,
	keepers: Keepers,
	authorizer: Arc<dyn Authorizer>,
}

impl SecureValueService {
	pub fn new(
		rows: Arc<dyn SecureValueRowStore>,
		keepers: Keepers,
		authorizer: Arc<dyn Authorizer>,
	) -> Self {
		Self {
			rows,
			keepers,
			authorizer,
		}
	}

	pub fn keepers(&self) -> &Keepers {
		&self.keepers
	}

	async fn fetch(&self, namespace: &str, name: &str) -> SecretsResult<SecureValueRow> {
		self.rows
			.get(namespace, name)
			.await
			.map_err(SecretsError::from_read)?
			.ok_or_else(|| SecretsError::not_found(namespace, name))
	}

	async fn seal(&self, plaintext: &SecretString, addr: &str) -> SecretsResult<SealedPayload> {
		let keeper = self.keepers.active();
		let salt = generate_salt();
		let ciphertext = keeper
			.encrypt(&SaltyValue {
				value: plaintext.clone(),
				salt: salt.clone(),
				keeper: keeper.name().to_string(),
				addr: addr.to_string(),
			})
			.await?;

		Ok(SealedPayload {
			salt,
			ciphertext,
			keeper: keeper.name().to_string(),
			addr: addr.to_string(),
		})
	}

	async fn reveal(&self, row: &SecureValueRow) -> SecretsResult<SecretString> {
		self.keepers
			.get(&row.keeper)?
			.decrypt(&SaltyValue {
				value: SecretString::from(row.value.as_str()),
				salt: row.salt.clone(),
				keeper: row.keeper.clone(),
				addr: row.addr.clone(),
			})
			.await
	}

	async fn create_inner(&self, identity: &Identity, mut value: SecureValue) -> SecretsResult<SecureValue> {
		if !self
			.authorizer
			.on_create(identity, &resource_attrs(&value))
			.await
		{
			return Err(denied(identity, Capability::OnCreate, value.namespace(), value.name()));
		}

		value.metadata.annotations = clean_annotations(&value.metadata.annotations);
		ensure_no_plaintext_leak(&value)?;

		let sealed = self.seal(&value.spec.value, "").await?;
		let now = now_ms();
		let stamp = RowStamp {
			uid: Uuid::new_v4().to_string(),
			created: now - now.rem_euclid(1000),
			created_by: identity.uid().to_string(),
			updated: now,
			updated_by: identity.uid().to_string(),
		};
		let row = to_row(&value, &stamp, &sealed)?;
		let event = event_row(&row, AuditAction::Create, identity, row.updated, String::new());

		self.rows
			.create(&row, &event)
			.await
			.map_err(|e| SecretsError::from_write(e, &row.namespace, &row.name))?;

		tracing::info!(
			namespace = %row.namespace,
			name = %row.name,
			uid = %row.uid,
			actor = identity.uid(),
			"secure value created"
		);
		to_external(&row)
	}

	async fn read_inner(&self, identity: &Identity, namespace: &str, name: &str) -> SecretsResult<SecureValue> {
		let row = self.fetch(namespace, name).await?;
		let value = to_external(&row)?;
		if !self
			.authorizer
			.can_view(identity, &resource_attrs(&value))
			.await
		{
			return Err(denied(identity, Capability::CanView, namespace, name));
		}
		Ok(value)
	}

	async fn update_inner(&self, identity: &Identity, mut value: SecureValue) -> SecretsResult<SecureValue> {
		let existing = self.fetch(value.namespace(), value.name()).await?;
		value.metadata.annotations = clean_annotations(&value.metadata.annotations);

		let mut value_changed = false;
		if !value.spec.value.is_empty() {
			ensure_no_plaintext_leak(&value)?;
			let current = self.reveal(&existing).await?;
			value_changed = current != value.spec.value;
		}

		let mut sealed = SealedPayload::from_row(&existing);
		if value_changed {
			sealed.keeper = self.keepers.active().name().to_string();
		}
		let mut candidate = to_row(&value, &RowStamp::from_row(&existing), &sealed)?;
		let changes = change_set(&existing, &candidate, value_changed);

		let old = to_external(&existing)?;
		if !self
			.authorizer
			.on_update(identity, &resource_attrs(&old), &resource_attrs(&value))
			.await
		{
			return Err(denied(identity, Capability::OnUpdate, value.namespace(), value.name()));
		}

		if changes.is_empty() {
			tracing::debug!(uid = %existing.uid, "update carried no changes");
			return Ok(old);
		}

		if value_changed {
			let resealed = self.seal(&value.spec.value, &existing.addr).await?;
			candidate.salt = resealed.salt;
			candidate.value = resealed.ciphertext;
		}
		candidate.updated = next_version(existing.updated);
		candidate.updated_by = identity.uid().to_string();

		let details = changes.join(", ");
		let event = event_row(
			&candidate,
			AuditAction::Update,
			identity,
			candidate.updated,
			details.clone(),
		);
		self.rows
			.update(&candidate, &event)
			.await
			.map_err(|e| SecretsError::from_write(e, &candidate.namespace, &candidate.name))?;

		tracing::info!(
			namespace = %candidate.namespace,
			name = %candidate.name,
			uid = %candidate.uid,
			actor = identity.uid(),
			changes = %details,
			"secure value updated"
		);
		to_external(&candidate)
	}

	async fn delete_inner(&self, identity: &Identity, namespace: &str, name: &str) -> SecretsResult<bool> {
		let row = self.fetch(namespace, name).await?;
		let value = to_external(&row)?;
		if !self
			.authorizer
			.on_delete(identity, &resource_attrs(&value))
			.await
		{
			return Err(denied(identity, Capability::OnDelete, namespace, name));
		}

		let event = event_row(
			&row,
			AuditAction::Delete,
			identity,
			next_version(row.updated),
			String::new(),
		);
		match self.rows.delete(&row, &event).await {
			Ok(()) => {
				tracing::info!(
					namespace = %row.namespace,
					name = %row.name,
					uid = %row.uid,
					actor = identity.uid(),
					"secure value deleted"
				);
				Ok(true)
			}
			Err(DbError::RowCount { actual: 0, .. }) => {
				tracing::debug!(uid = %row.uid, "secure value already gone");
				Ok(false)
			}
			Err(e) => Err(SecretsError::from_write(e, namespace, name)),
		}
	}

	async fn list_inner(
		&self,
		identity: &Identity,
		namespace: &str,
		selector: &LabelSelector,
	) -> SecretsResult<SecureValueList> {
		let rows = self
			.rows
			.list(namespace)
			.await
			.map_err(SecretsError::from_read)?;

		let mut items = Vec::with_capacity(rows.len());
		for row in &rows {
			let value = to_external(row)?;
			if !self
				.authorizer
				.can_view(identity, &resource_attrs(&value))
				.await
			{
				continue;
			}
			if selector.matches(&value.metadata.labels) {
				items.push(value);
			}
		}

		tracing::debug!(total = rows.len(), visible = items.len(), "listed secure values");
		Ok(SecureValueList { items })
	}

	async fn decrypt_inner(&self, identity: &Identity, namespace: &str, name: &str) -> SecretsResult<SecureValue> {
		let row = self.fetch(namespace, name).await?;
		let mut value = to_external(&row)?;
		let attrs = resource_attrs(&value);

		if !self.authorizer.can_view(identity, &attrs).await {
			return Err(denied(identity, Capability::CanView, namespace, name));
		}
		if !self.authorizer.can_decrypt(identity, &attrs).await {
			return Err(denied(identity, Capability::CanDecrypt, namespace, name));
		}

		value.spec.value = self.reveal(&row).await?;

		tracing::info!(
			namespace = %row.namespace,
			name = %row.name,
			uid = %row.uid,
			actor = identity.uid(),
			"secure value decrypted"
		);
		Ok(value)
	}

	async fn history_inner(
		&self,
		identity: &Identity,
		namespace: &str,
		name: &str,
	) -> SecretsResult<SecureValueActivityList> {
		let row = self
			.rows
			.get(namespace, name)
			.await
			.map_err(SecretsError::from_read)?;

		let attrs = match &row {
			Some(row) => resource_attrs(&to_external(row)?),
			None => ResourceAttrs::new(namespace, name),
		};

		let events = match row {
			Some(_) => {
				self.check_view(identity, &attrs).await?;
				self.load_history(namespace, name).await?
			}
			None => {
				let events = self.load_history(namespace, name).await?;
				if events.is_empty() {
					return Err(SecretsError::not_found(namespace, name));
				}
				self.check_view(identity, &attrs).await?;
				events
			}
		};

		let items = events
			.into_iter()
			.map(|e| SecureValueActivity {
				timestamp: e.when,
				namespace: e.namespace,
				name: e.name,
				action: e.action,
				identity: e.who,
				details: e.what,
			})
			.collect();

		Ok(SecureValueActivityList {
			items,
			continue_token: None,
		})
	}

	async fn check_view(&self, identity: &Identity, attrs: &ResourceAttrs) -> SecretsResult<()> {
		if self.authorizer.can_view(identity, attrs).await {
			Ok(())
		} else {
			Err(denied(identity, Capability::CanView, &attrs.namespace, &attrs.name))
		}
	}

	async fn load_history(&self, namespace: &str, name: &str) -> SecretsResult<Vec<SecureValueEventRow>> {
		self.rows
			.history(namespace, name)
			.await
			.map_err(SecretsError::from_read)
	}
}

#[async_trait]
impl SecureValueStore for SecureValueService {
	#[instrument(skip(self, ctx, value), fields(namespace = %value.metadata.namespace, name = %value.metadata.name))]
	async fn create(&self, ctx: &RequestContext, value: SecureValue) -> SecretsResult<SecureValue> {
		let identity = ctx.require_identity()?;
		require_key(value.namespace(), value.name())?;
		if value.spec.value.is_empty() {
			return Err(SecretsError::InvalidArgument("value is required".to_string()));
		}
		ctx.run(self.create_inner(identity, value)).await?
	}

	#[instrument(skip(self, ctx))]
	async fn read(&self, ctx: &RequestContext, namespace: &str, name: &str) -> SecretsResult<SecureValue> {
		let identity = ctx.require_identity()?;
		require_key(namespace, name)?;
		ctx.run(self.read_inner(identity, namespace, name)).await?
	}

	#[instrument(skip(self, ctx, value), fields(namespace = %value.metadata.namespace, name = %value.metadata.name))]
	async fn update(&self, ctx: &RequestContext, value: SecureValue) -> SecretsResult<SecureValue> {
		let identity = ctx.require_identity()?;
		require_key(value.namespace(), value.name())?;
		ctx.run(self.update_inner(identity, value)).await?
	}

	#[instrument(skip(self, ctx))]
	async fn delete(&self, ctx: &RequestContext, namespace: &str, name: &str) -> SecretsResult<bool> {
		let identity = ctx.require_identity()?;
		require_key(namespace, name)?;
		ctx.run(self.delete_inner(identity, namespace, name)).await?
	}

	#[instrument(skip(self, ctx))]
	async fn list(
		&self,
		ctx: &RequestContext,
		namespace: &str,
		selector: &str,
	) -> SecretsResult<SecureValueList> {
		let identity = ctx.require_identity()?;
		if namespace.is_empty() {
			return Err(SecretsError::InvalidArgument("namespace is required".to_string()));
		}
		let selector = LabelSelector::parse(selector)?;
		ctx.run(self.list_inner(identity, namespace, &selector)).await?
	}

	#[instrument(skip(self, ctx))]
	async fn decrypt(&self, ctx: &RequestContext, namespace: &str, name: &str) -> SecretsResult<SecureValue> {
		let identity = ctx.require_identity()?;
		require_key(namespace, name)?;
		ctx.run(self.decrypt_inner(identity, namespace, name)).await?
	}

	#[instrument(skip(self, ctx))]
	async fn history(
		&self,
		ctx: &RequestContext,
		namespace: &str,
		name: &str,
		continue_token: Option<&str>,
	) -> SecretsResult<SecureValueActivityList> {
		let identity = ctx.require_identity()?;
		require_key(namespace, name)?;
		if continue_token.is_some() {
			tracing::debug!("continue token ignored; returning full history");
		}
		ctx.run(self.history_inner(identity, namespace, name)).await?
	}
}

fn require_key(namespace: &str, name: &str) -> SecretsResult<()> {
	if namespace.is_empty() {
		return Err(SecretsError::InvalidArgument("namespace is required".to_string()));
	}
	if name.is_empty() {
		return Err(SecretsError::InvalidArgument("name is required".to_string()));
	}
	Ok(())
}

fn denied(identity: &Identity, capability: Capability, namespace: &str, name: &str) -> SecretsError {
	tracing::warn!(
		actor = identity.uid(),
		capability = capability.as_str(),
		namespace = %namespace,
		name = %name,
		"authorization denied"
	);
	SecretsError::PermissionDenied(format!("{} on {namespace}/{name}", capability.as_str()))
}

/// Fields that differ between two rows, in audit order.
fn change_set(old: &SecureValueRow, new: &SecureValueRow, value_changed: bool) -> Vec<&'static str> {
	let mut changes = Vec::new();
	if old.annotations != new.annotations {
		changes.push("annotations");
	}
	if old.labels != new.labels {
		changes.push("labels");
	}
	if old.apis != new.apis {
		changes.push("apis");
	}
	if old.title != new.title {
		changes.push("title");
	}
	if old.keeper != new.keeper {
		changes.push("keeper");
	}
	if old.addr != new.addr {
		changes.push("addr");
	}
	if value_changed {
		changes.push("value");
	}
	changes
}

fn event_row(
	row: &SecureValueRow,
	action: AuditAction,
	identity: &Identity,
	when: i64,
	what: String,
) -> SecureValueEventRow {
	SecureValueEventRow {
		uid: row.uid.clone(),
		namespace: row.namespace.clone(),
		name: row.name.clone(),
		action: action.as_str().to_string(),
		who: identity.uid().to_string(),
		when,
		what,
	}
}

fn now_ms() -> i64 {
	Utc::now().timestamp_millis()
}

/// Resource version for the next write: wall-clock milliseconds, but
/// strictly greater than `previous`.
fn next_version(previous: i64) -> i64 {
	now_ms().max(previous.saturating_add(1))
}
