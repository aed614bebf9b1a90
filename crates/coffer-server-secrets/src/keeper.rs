// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keeper contract and implementations.
//!
//! A keeper turns a salted plaintext into an opaque ciphertext string and
//! back. Contract: `decrypt(encrypt(v)) == v` for any salt. The row's
//! `keeper` column records which keeper produced the ciphertext so that
//! [`Keepers`] can route decryption to it later.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use coffer_common_secret::SecretString;
use rand::distributions::Alphanumeric;
use rand::Rng;
use zeroize::Zeroizing;

use crate::encryption::{self, EncryptedData, KEY_SIZE};
use crate::error::{SecretsError, SecretsResult};

/// Length of the random salt generated for every encryption.
pub const SALT_LEN: usize = 10;

/// Name of the placeholder keeper. Rows written by it carry an empty `keeper`.
pub const PLACEHOLDER_KEEPER: &str = "";

/// Name of the AES-256-GCM keeper.
pub const AES_GCM_KEEPER: &str = "aes-gcm";

/// A value bundled with its salt and routing hints.
///
/// `value` is the plaintext when encrypting and the ciphertext when
/// decrypting.
#[derive(Debug, Clone, Default)]
pub struct SaltyValue {
	pub value: SecretString,
	pub salt: String,
	pub keeper: String,
	pub addr: String,
}

/// Pluggable encryption backend.
#[async_trait]
pub trait Keeper: Send + Sync {
	/// Identifier stored in the row's `keeper` column.
	fn name(&self) -> &str;

	async fn encrypt(&self, salty: &SaltyValue) -> SecretsResult<String>;

	async fn decrypt(&self, salty: &SaltyValue) -> SecretsResult<SecretString>;
}

/// Generate a fresh random salt.
pub fn generate_salt() -> String {
	rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(SALT_LEN)
		.map(char::from)
		.collect()
}

/// Reversible salt-prefix encoding. Provides no confidentiality; for
/// development and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderKeeper;

#[async_trait]
impl Keeper for PlaceholderKeeper {
	fn name(&self) -> &str {
		PLACEHOLDER_KEEPER
	}

	async fn encrypt(&self, salty: &SaltyValue) -> SecretsResult<String> {
		let salted = Zeroizing::new(format!("{}{}", salty.salt, salty.value.expose()));
		Ok(BASE64.encode(salted.as_bytes()))
	}

	async fn decrypt(&self, salty: &SaltyValue) -> SecretsResult<SecretString> {
		let decoded = Zeroizing::new(
			BASE64
				.decode(salty.value.expose().as_bytes())
				.map_err(|e| SecretsError::Keeper(format!("invalid placeholder encoding: {e}")))?,
		);
		let salted = std::str::from_utf8(&decoded)
			.map_err(|_| SecretsError::Keeper("placeholder payload is not UTF-8".to_string()))?;
		let plaintext = salted
			.strip_prefix(salty.salt.as_str())
			.ok_or_else(|| SecretsError::Keeper("salt mismatch".to_string()))?;
		Ok(SecretString::from(plaintext))
	}
}

/// AES-256-GCM under a single master key. The ciphertext column holds
/// `base64(nonce || ciphertext)` and the salt is bound as associated data.
pub struct AesGcmKeeper {
	key: Zeroizing<[u8; KEY_SIZE]>,
}

impl AesGcmKeeper {
	pub fn new(key: Zeroizing<[u8; KEY_SIZE]>) -> Self {
		Self { key }
	}

	/// Create from a base64-encoded 32-byte key.
	pub fn from_base64(key_base64: &SecretString) -> SecretsResult<Self> {
		let key_bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
			BASE64
				.decode(key_base64.expose().trim().as_bytes())
				.map_err(|e| SecretsError::Keeper(format!("invalid master key base64: {e}")))?,
		);

		if key_bytes.len() != KEY_SIZE {
			return Err(SecretsError::Keeper(format!(
				"master key must be {} bytes, got {}",
				KEY_SIZE,
				key_bytes.len()
			)));
		}

		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(&key_bytes);
		Ok(Self::new(key))
	}
}

impl fmt::Debug for AesGcmKeeper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AesGcmKeeper").finish_non_exhaustive()
	}
}

#[async_trait]
impl Keeper for AesGcmKeeper {
	fn name(&self) -> &str {
		AES_GCM_KEEPER
	}

	async fn encrypt(&self, salty: &SaltyValue) -> SecretsResult<String> {
		let sealed = encryption::seal(
			&self.key,
			salty.value.expose().as_bytes(),
			salty.salt.as_bytes(),
		)?;
		Ok(BASE64.encode(sealed.to_bytes()))
	}

	async fn decrypt(&self, salty: &SaltyValue) -> SecretsResult<SecretString> {
		let bytes = BASE64
			.decode(salty.value.expose().as_bytes())
			.map_err(|e| SecretsError::Keeper(format!("invalid ciphertext encoding: {e}")))?;
		let sealed = EncryptedData::from_bytes(&bytes)?;
		let plaintext = encryption::open(&self.key, &sealed, salty.salt.as_bytes())?;
		let text = String::from_utf8(plaintext.to_vec())
			.map_err(|_| SecretsError::Keeper("decrypted value is not UTF-8".to_string()))?;
		Ok(SecretString::new(text))
	}
}

/// The keepers available to the store: one active keeper used for every
/// encryption, plus any others needed to decrypt older rows.
#[derive(Clone)]
pub struct Keepers {
	active: Arc<dyn Keeper>,
	by_name: HashMap<String, Arc<dyn Keeper>>,
}

impl Keepers {
	pub fn new(active: Arc<dyn Keeper>) -> Self {
		let mut by_name = HashMap::new();
		by_name.insert(active.name().to_string(), active.clone());
		Self { active, by_name }
	}

	/// Builder: register a keeper for decryption only.
	pub fn with_keeper(mut self, keeper: Arc<dyn Keeper>) -> Self {
		self.by_name
			.entry(keeper.name().to_string())
			.or_insert(keeper);
		self
	}

	pub fn active(&self) -> &Arc<dyn Keeper> {
		&self.active
	}

	/// Keeper that wrote a row, by the row's `keeper` column.
	pub fn get(&self, name: &str) -> SecretsResult<&Arc<dyn Keeper>> {
		self.by_name
			.get(name)
			.ok_or_else(|| SecretsError::Keeper(format!("no keeper registered as '{name}'")))
	}
}

impl Default for Keepers {
	fn default() -> Self {
		Self::new(Arc::new(PlaceholderKeeper))
	}
}

impl fmt::Debug for Keepers {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
		names.sort_unstable();
		f.debug_struct("Keepers")
			.field("active", &self.active.name())
			.field("registered", &names)
			.finish()
	}
}
