// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secure value store.
//!
//! Secret strings are persisted encrypted next to their metadata, every
//! mutation is audited in the same transaction, and the plaintext leaves the
//! store only through [`SecureValueStore::decrypt`].
//!
//! # Modules
//!
//! - [`types`]: external representation
//! - [`codec`]: row conversion and the plaintext leak scan
//! - [`keeper`]: encryption backends
//! - [`selector`]: label selectors for `list`
//! - [`service`]: the store itself

pub mod codec;
pub mod encryption;
pub mod error;
pub mod keeper;
pub mod selector;
pub mod service;
pub mod types;

pub use error::{SecretsError, SecretsResult};
pub use keeper::{AesGcmKeeper, Keeper, Keepers, PlaceholderKeeper, SaltyValue};
pub use selector::LabelSelector;
pub use service::{SecureValueService, SecureValueStore};
pub use types::{
	AuditAction, ObjectMeta, SecureValue, SecureValueActivity, SecureValueActivityList,
	SecureValueList, SecureValueSpec,
};
