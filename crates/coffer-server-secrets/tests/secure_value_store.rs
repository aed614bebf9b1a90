// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end tests of the secure value store over in-memory SQLite.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coffer_server_auth::{
	AllowAllAuthorizer, Authorizer, Identity, NamespaceRole, PolicyAuthorizer, RequestContext,
	ResourceAttrs,
};
use coffer_server_db::testing::{
	create_secure_value_test_pool, install_history_abort_trigger, remove_history_abort_trigger,
};
use coffer_server_db::SecureValueRepository;
use coffer_server_secrets::codec::{CREATED_BY_ANNOTATION, UPDATED_BY_ANNOTATION};
use coffer_server_secrets::encryption::generate_key;
use coffer_server_secrets::{
	AesGcmKeeper, Keepers, PlaceholderKeeper, SecretsError, SecureValue, SecureValueService,
	SecureValueStore,
};
use tokio_util::sync::CancellationToken;

struct Harness {
	store: SecureValueService,
	repo: Arc<SecureValueRepository>,
}

async fn harness_with(authorizer: Arc<dyn Authorizer>, keepers: Keepers) -> Harness {
	let pool = create_secure_value_test_pool().await.unwrap();
	let repo = Arc::new(SecureValueRepository::new(pool));
	let store = SecureValueService::new(repo.clone(), keepers, authorizer);
	Harness { store, repo }
}

async fn harness() -> Harness {
	harness_with(Arc::new(AllowAllAuthorizer), Keepers::default()).await
}

fn ctx(uid: &str) -> RequestContext {
	RequestContext::new(Identity::new(uid).unwrap())
}

fn alice() -> RequestContext {
	ctx("user:alice")
}

fn db_pass() -> SecureValue {
	SecureValue::new("a", "db-pass")
		.with_title("Database password")
		.with_value("s3cr3t")
		.with_apis(["svc1"])
}

#[tokio::test]
async fn create_blanks_value_and_records_create_event() {
	let h = harness().await;

	let created = h.store.create(&alice(), db_pass()).await.unwrap();
	assert!(created.spec.value.is_empty());
	assert!(!created.metadata.uid.is_empty());
	assert!(created.metadata.resource_version > 0);
	assert_eq!(created.spec.apis, vec!["svc1"]);
	assert_eq!(
		created
			.metadata
			.creation_timestamp
			.map(|t| t.timestamp_subsec_millis()),
		Some(0)
	);

	let row = h.repo.get("a", "db-pass").await.unwrap().unwrap();
	assert!(!row.value.contains("s3cr3t"));
	assert_eq!(row.salt.len(), 10);
	assert_eq!(row.keeper, "");

	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items.len(), 1);
	assert_eq!(history.items[0].action, "CREATE");
	assert_eq!(history.items[0].identity, "user:alice");
	assert_eq!(history.items[0].details, "");
	assert_eq!(history.continue_token, None);
}

#[tokio::test]
async fn update_with_same_value_and_new_label_changes_only_labels() {
	let h = harness().await;
	let created = h.store.create(&alice(), db_pass()).await.unwrap();
	let salt_before = h.repo.get("a", "db-pass").await.unwrap().unwrap().salt;

	let updated = h
		.store
		.update(&ctx("user:bob"), db_pass().with_label("env", "prod"))
		.await
		.unwrap();
	assert!(updated.spec.value.is_empty());
	assert_eq!(updated.metadata.labels.get("env").map(String::as_str), Some("prod"));
	assert!(updated.metadata.resource_version > created.metadata.resource_version);
	assert_eq!(updated.metadata.annotations[UPDATED_BY_ANNOTATION], "user:bob");
	assert_eq!(updated.metadata.annotations[CREATED_BY_ANNOTATION], "user:alice");
	assert_eq!(updated.metadata.uid, created.metadata.uid);

	let row = h.repo.get("a", "db-pass").await.unwrap().unwrap();
	assert_eq!(row.salt, salt_before);

	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	let actions: Vec<_> = history.items.iter().map(|i| i.action.as_str()).collect();
	assert_eq!(actions, vec!["CREATE", "UPDATE"]);
	assert_eq!(history.items[1].details, "labels");
	assert_eq!(history.items[1].identity, "user:bob");
}

#[tokio::test]
async fn update_with_new_value_rotates_salt() {
	let h = harness().await;
	h.store.create(&alice(), db_pass()).await.unwrap();
	let before = h.repo.get("a", "db-pass").await.unwrap().unwrap();

	h.store
		.update(&alice(), db_pass().with_value("n3w-s3cr3t"))
		.await
		.unwrap();

	let after = h.repo.get("a", "db-pass").await.unwrap().unwrap();
	assert_ne!(after.salt, before.salt);
	assert_ne!(after.value, before.value);

	let revealed = h.store.decrypt(&alice(), "a", "db-pass").await.unwrap();
	assert_eq!(revealed.spec.value.expose(), "n3w-s3cr3t");

	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items[1].details, "value");
}

#[tokio::test]
async fn update_without_value_keeps_secret() {
	let h = harness().await;
	h.store.create(&alice(), db_pass()).await.unwrap();

	let mut retitled = db_pass().with_title("Primary DB");
	retitled.spec.value = Default::default();
	h.store.update(&alice(), retitled).await.unwrap();

	let revealed = h.store.decrypt(&alice(), "a", "db-pass").await.unwrap();
	assert_eq!(revealed.spec.value.expose(), "s3cr3t");
	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items[1].details, "title");
}

#[tokio::test]
async fn identical_update_is_a_no_op() {
	let h = harness().await;
	let created = h.store.create(&alice(), db_pass()).await.unwrap();
	let before = h.repo.get("a", "db-pass").await.unwrap().unwrap();

	// Resubmit what was read back, including system annotations, plus the
	// same plaintext.
	let resubmitted = h
		.store
		.read(&alice(), "a", "db-pass")
		.await
		.unwrap()
		.with_value("s3cr3t");
	let result = h.store.update(&alice(), resubmitted).await.unwrap();

	assert_eq!(result.metadata.resource_version, created.metadata.resource_version);
	let after = h.repo.get("a", "db-pass").await.unwrap().unwrap();
	assert_eq!(after, before);
	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items.len(), 1);
}

#[tokio::test]
async fn update_of_missing_value_is_not_found() {
	let h = harness().await;
	let err = h.store.update(&alice(), db_pass()).await.unwrap_err();
	assert!(matches!(err, SecretsError::NotFound { .. }));
}

#[tokio::test]
async fn decrypt_by_permitted_identity_reveals_plaintext() {
	let h = harness_with(Arc::new(PolicyAuthorizer::new()), Keepers::default()).await;
	let admin = RequestContext::new(Identity::new("user:admin").unwrap().with_system_admin(true));
	h.store.create(&admin, db_pass()).await.unwrap();

	let service = RequestContext::new(
		Identity::new("svc:one")
			.unwrap()
			.with_service("svc1")
			.with_grant("a", NamespaceRole::Viewer),
	);
	let revealed = h.store.decrypt(&service, "a", "db-pass").await.unwrap();
	assert_eq!(revealed.spec.value.expose(), "s3cr3t");
	assert_eq!(revealed.metadata.name, "db-pass");
}

#[tokio::test]
async fn decrypt_by_identity_denied_view_is_permission_denied() {
	let h = harness_with(Arc::new(PolicyAuthorizer::new()), Keepers::default()).await;
	let admin = RequestContext::new(Identity::new("user:admin").unwrap().with_system_admin(true));
	h.store.create(&admin, db_pass()).await.unwrap();

	// Correct service, but no role in namespace "a".
	let outsider = RequestContext::new(
		Identity::new("svc:one")
			.unwrap()
			.with_service("svc1")
			.with_grant("b", NamespaceRole::Admin),
	);
	let err = h.store.read(&outsider, "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::PermissionDenied(_)));
	let err = h.store.decrypt(&outsider, "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::PermissionDenied(_)));
	assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn decrypt_requires_more_than_view() {
	let h = harness_with(Arc::new(PolicyAuthorizer::new()), Keepers::default()).await;
	let admin = RequestContext::new(Identity::new("user:admin").unwrap().with_system_admin(true));
	h.store.create(&admin, db_pass()).await.unwrap();

	let viewer = RequestContext::new(
		Identity::new("user:viewer")
			.unwrap()
			.with_grant("a", NamespaceRole::Viewer),
	);
	assert!(h.store.read(&viewer, "a", "db-pass").await.is_ok());
	let err = h.store.decrypt(&viewer, "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::PermissionDenied(_)));
}

#[tokio::test]
async fn decrypt_is_never_allowed_where_view_is_denied() {
	let h = harness_with(Arc::new(PolicyAuthorizer::new()), Keepers::default()).await;
	let admin = RequestContext::new(Identity::new("user:admin").unwrap().with_system_admin(true));
	h.store.create(&admin, db_pass()).await.unwrap();

	let roles = [
		None,
		Some(NamespaceRole::Viewer),
		Some(NamespaceRole::Editor),
		Some(NamespaceRole::Admin),
	];
	let namespaces = ["a", "b"];
	let services = [None, Some("svc1"), Some("svc2")];

	for role in roles {
		for namespace in namespaces {
			for service in services {
				let mut identity = Identity::new("user:probe").unwrap();
				if let Some(role) = role {
					identity = identity.with_grant(namespace, role);
				}
				if let Some(service) = service {
					identity = identity.with_service(service);
				}
				let ctx = RequestContext::new(identity);

				let viewed = h.store.read(&ctx, "a", "db-pass").await.is_ok();
				let decrypted = h.store.decrypt(&ctx, "a", "db-pass").await.is_ok();
				assert!(
					viewed || !decrypted,
					"decrypt allowed without view for {role:?}/{namespace}/{service:?}"
				);
			}
		}
	}
}

#[tokio::test]
async fn delete_keeps_history_and_hides_row() {
	let h = harness().await;
	h.store.create(&alice(), db_pass()).await.unwrap();

	assert!(h.store.delete(&alice(), "a", "db-pass").await.unwrap());

	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	let actions: Vec<_> = history.items.iter().map(|i| i.action.as_str()).collect();
	assert_eq!(actions, vec!["CREATE", "DELETE"]);
	assert!(history.items[1].timestamp >= history.items[0].timestamp);

	let err = h.store.read(&alice(), "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::NotFound { .. }));
	let err = h.store.delete(&alice(), "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::NotFound { .. }));
}

#[tokio::test]
async fn history_after_delete_still_checks_view() {
	let h = harness_with(Arc::new(PolicyAuthorizer::new()), Keepers::default()).await;
	let admin = RequestContext::new(Identity::new("user:admin").unwrap().with_system_admin(true));
	h.store.create(&admin, db_pass()).await.unwrap();
	h.store.delete(&admin, "a", "db-pass").await.unwrap();

	let outsider = RequestContext::new(
		Identity::new("user:outsider")
			.unwrap()
			.with_grant("b", NamespaceRole::Admin),
	);
	let err = h
		.store
		.history(&outsider, "a", "db-pass", None)
		.await
		.unwrap_err();
	assert!(matches!(err, SecretsError::PermissionDenied(_)));

	let history = h.store.history(&admin, "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items.len(), 2);
}

#[tokio::test]
async fn history_of_unknown_value_is_not_found() {
	let h = harness().await;
	let err = h
		.store
		.history(&alice(), "a", "never", Some("token"))
		.await
		.unwrap_err();
	assert!(matches!(err, SecretsError::NotFound { .. }));
}

#[tokio::test]
async fn plaintext_in_annotation_is_rejected_without_writing() {
	let h = harness().await;
	let leaky = SecureValue::new("a", "leaky")
		.with_value("xyz")
		.with_annotation("note", "xyz");

	let err = h.store.create(&alice(), leaky).await.unwrap_err();
	assert!(matches!(err, SecretsError::PlaintextLeak { field: "annotations" }));
	assert_eq!(err.to_string(), "raw secret found in annotations");

	assert!(h.repo.get("a", "leaky").await.unwrap().is_none());
	assert!(h.repo.history("a", "leaky").await.unwrap().is_empty());
}

#[tokio::test]
async fn plaintext_leak_on_update_is_rejected() {
	let h = harness().await;
	h.store.create(&alice(), db_pass()).await.unwrap();
	let before = h.repo.get("a", "db-pass").await.unwrap().unwrap();

	let err = h
		.store
		.update(&alice(), db_pass().with_label("copy", "s3cr3t"))
		.await
		.unwrap_err();
	assert!(matches!(err, SecretsError::PlaintextLeak { field: "labels" }));
	assert_eq!(h.repo.get("a", "db-pass").await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn read_and_list_never_expose_value() {
	let h = harness().await;
	for (name, secret) in [("one", "alpha-secret"), ("two", "beta-secret"), ("three", "gamma-secret")] {
		h.store
			.create(
				&alice(),
				SecureValue::new("a", name)
					.with_value(secret)
					.with_label("tier", "db"),
			)
			.await
			.unwrap();
	}

	for name in ["one", "two", "three"] {
		let value = h.store.read(&alice(), "a", name).await.unwrap();
		assert!(value.spec.value.is_empty());
	}

	let list = h.store.list(&alice(), "a", "").await.unwrap();
	assert_eq!(list.items.len(), 3);
	assert!(list.items.iter().all(|v| v.spec.value.is_empty()));

	let json = serde_json::to_string(&list).unwrap();
	for secret in ["alpha-secret", "beta-secret", "gamma-secret"] {
		assert!(!json.contains(secret));
	}
}

#[tokio::test]
async fn list_applies_selector_and_namespace() {
	let h = harness().await;
	h.store
		.create(&alice(), SecureValue::new("a", "prod-db").with_value("p1").with_label("env", "prod"))
		.await
		.unwrap();
	h.store
		.create(&alice(), SecureValue::new("a", "dev-db").with_value("p2").with_label("env", "dev"))
		.await
		.unwrap();
	h.store
		.create(&alice(), SecureValue::new("b", "other").with_value("p3").with_label("env", "prod"))
		.await
		.unwrap();

	let prod = h.store.list(&alice(), "a", "env=prod").await.unwrap();
	let names: Vec<_> = prod.items.iter().map(|v| v.metadata.name.as_str()).collect();
	assert_eq!(names, vec!["prod-db"]);

	let not_prod = h.store.list(&alice(), "a", "env notin (prod)").await.unwrap();
	assert_eq!(not_prod.items.len(), 1);
	assert_eq!(not_prod.items[0].metadata.name, "dev-db");

	let all = h.store.list(&alice(), "a", "").await.unwrap();
	let names: Vec<_> = all.items.iter().map(|v| v.metadata.name.as_str()).collect();
	assert_eq!(names, vec!["dev-db", "prod-db"]);
}

#[tokio::test]
async fn malformed_selector_is_rejected() {
	let h = harness().await;
	let err = h.store.list(&alice(), "a", "env in prod").await.unwrap_err();
	assert!(matches!(err, SecretsError::InvalidArgument(_)));
	assert_eq!(err.status_code(), 400);
}

/// Hides anything labelled `hidden=true` from view.
struct HideLabelled;

#[async_trait]
impl Authorizer for HideLabelled {
	async fn on_create(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}

	async fn on_update(&self, _identity: &Identity, _old: &ResourceAttrs, _new: &ResourceAttrs) -> bool {
		true
	}

	async fn on_delete(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}

	async fn can_view(&self, _identity: &Identity, resource: &ResourceAttrs) -> bool {
		resource.labels.get("hidden").map(String::as_str) != Some("true")
	}

	async fn can_decrypt(&self, _identity: &Identity, _resource: &ResourceAttrs) -> bool {
		true
	}
}

#[tokio::test]
async fn list_silently_omits_rows_denied_view() {
	let h = harness_with(Arc::new(HideLabelled), Keepers::default()).await;
	h.store
		.create(&alice(), SecureValue::new("a", "visible").with_value("v1"))
		.await
		.unwrap();
	h.store
		.create(
			&alice(),
			SecureValue::new("a", "hidden")
				.with_value("v2")
				.with_label("hidden", "true"),
		)
		.await
		.unwrap();

	let list = h.store.list(&alice(), "a", "").await.unwrap();
	let names: Vec<_> = list.items.iter().map(|v| v.metadata.name.as_str()).collect();
	assert_eq!(names, vec!["visible"]);

	// can_decrypt allows everything here, but view still gates reveal.
	let err = h.store.decrypt(&alice(), "a", "hidden").await.unwrap_err();
	assert!(matches!(err, SecretsError::PermissionDenied(_)));
}

#[tokio::test]
async fn failed_audit_insert_rolls_back_every_mutation() {
	let h = harness().await;
	let pool = h.repo.pool().clone();

	install_history_abort_trigger(&pool).await.unwrap();
	let err = h.store.create(&alice(), db_pass()).await.unwrap_err();
	assert!(matches!(err, SecretsError::WriteFailed(_)));
	assert!(h.repo.get("a", "db-pass").await.unwrap().is_none());

	remove_history_abort_trigger(&pool).await.unwrap();
	h.store.create(&alice(), db_pass()).await.unwrap();
	let before = h.repo.get("a", "db-pass").await.unwrap().unwrap();

	install_history_abort_trigger(&pool).await.unwrap();
	let err = h
		.store
		.update(&alice(), db_pass().with_title("changed").with_value("other"))
		.await
		.unwrap_err();
	assert!(matches!(err, SecretsError::WriteFailed(_)));
	assert_eq!(h.repo.get("a", "db-pass").await.unwrap().unwrap(), before);

	let err = h.store.delete(&alice(), "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::WriteFailed(_)));
	assert!(h.repo.get("a", "db-pass").await.unwrap().is_some());

	remove_history_abort_trigger(&pool).await.unwrap();
	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items.len(), 1);
}

#[tokio::test]
async fn duplicate_create_is_already_exists() {
	let h = harness().await;
	h.store.create(&alice(), db_pass()).await.unwrap();
	let err = h.store.create(&alice(), db_pass()).await.unwrap_err();
	assert!(matches!(err, SecretsError::AlreadyExists { .. }));
	assert_eq!(err.status_code(), 409);

	let history = h.store.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items.len(), 1);
}

#[tokio::test]
async fn missing_identity_is_unauthenticated() {
	let h = harness().await;
	let anon = RequestContext::anonymous();

	let err = h.store.create(&anon, db_pass()).await.unwrap_err();
	assert!(matches!(err, SecretsError::Unauthenticated));
	assert!(matches!(
		h.store.read(&anon, "a", "db-pass").await,
		Err(SecretsError::Unauthenticated)
	));
	assert!(matches!(
		h.store.list(&anon, "a", "").await,
		Err(SecretsError::Unauthenticated)
	));
	assert!(matches!(
		h.store.history(&anon, "a", "db-pass", None).await,
		Err(SecretsError::Unauthenticated)
	));
}

#[tokio::test]
async fn create_requires_namespace_name_and_value() {
	let h = harness().await;

	for value in [
		SecureValue::new("", "n").with_value("v"),
		SecureValue::new("a", "").with_value("v"),
		SecureValue::new("a", "n"),
	] {
		let err = h.store.create(&alice(), value).await.unwrap_err();
		assert!(matches!(err, SecretsError::InvalidArgument(_)));
	}
	assert!(h.store.list(&alice(), "a", "").await.unwrap().items.is_empty());
}

#[tokio::test]
async fn reserved_annotations_are_system_managed() {
	let h = harness().await;
	let created = h
		.store
		.create(
			&alice(),
			db_pass()
				.with_annotation(CREATED_BY_ANNOTATION, "user:mallory")
				.with_annotation("note", "rotate quarterly"),
		)
		.await
		.unwrap();

	assert_eq!(created.metadata.annotations[CREATED_BY_ANNOTATION], "user:alice");
	assert_eq!(created.metadata.annotations["note"], "rotate quarterly");
	let row = h.repo.get("a", "db-pass").await.unwrap().unwrap();
	assert!(!row.annotations.unwrap_or_default().contains("mallory"));
}

#[tokio::test]
async fn cancelled_context_does_not_write() {
	let h = harness().await;
	let token = CancellationToken::new();
	token.cancel();
	let cancelled = alice().with_cancellation(token);

	let err = h.store.create(&cancelled, db_pass()).await.unwrap_err();
	assert!(matches!(err, SecretsError::Cancelled));
	assert!(h.repo.get("a", "db-pass").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_deadline_is_reported() {
	let h = harness().await;
	h.store.create(&alice(), db_pass()).await.unwrap();

	let expired = alice().with_timeout(Duration::ZERO);
	let err = h.store.decrypt(&expired, "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::DeadlineExceeded));
	assert_eq!(err.status_code(), 504);
}

#[tokio::test]
async fn rows_route_to_the_keeper_that_wrote_them() {
	let pool = create_secure_value_test_pool().await.unwrap();
	let repo = Arc::new(SecureValueRepository::new(pool));

	let legacy = SecureValueService::new(
		repo.clone(),
		Keepers::new(Arc::new(PlaceholderKeeper)),
		Arc::new(AllowAllAuthorizer),
	);
	legacy.create(&alice(), db_pass()).await.unwrap();

	let current = SecureValueService::new(
		repo.clone(),
		Keepers::new(Arc::new(AesGcmKeeper::new(generate_key())))
			.with_keeper(Arc::new(PlaceholderKeeper)),
		Arc::new(AllowAllAuthorizer),
	);

	let revealed = current.decrypt(&alice(), "a", "db-pass").await.unwrap();
	assert_eq!(revealed.spec.value.expose(), "s3cr3t");

	current
		.update(&alice(), db_pass().with_value("rotated"))
		.await
		.unwrap();
	let row = repo.get("a", "db-pass").await.unwrap().unwrap();
	assert_eq!(row.keeper, "aes-gcm");

	let revealed = current.decrypt(&alice(), "a", "db-pass").await.unwrap();
	assert_eq!(revealed.spec.value.expose(), "rotated");

	let history = current.history(&alice(), "a", "db-pass", None).await.unwrap();
	assert_eq!(history.items[1].details, "keeper, value");

	// The old service has no aes-gcm keeper registered.
	let err = legacy.decrypt(&alice(), "a", "db-pass").await.unwrap_err();
	assert!(matches!(err, SecretsError::Keeper(_)));
}
