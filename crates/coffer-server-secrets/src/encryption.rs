// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM primitives used by [`crate::keeper::AesGcmKeeper`].

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng, Payload},
	Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Encrypted data with nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
	pub ciphertext: Vec<u8>,
	pub nonce: [u8; NONCE_SIZE],
}

impl EncryptedData {
	/// `nonce || ciphertext`.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
		out.extend_from_slice(&self.nonce);
		out.extend_from_slice(&self.ciphertext);
		out
	}

	pub fn from_bytes(bytes: &[u8]) -> SecretsResult<Self> {
		if bytes.len() < NONCE_SIZE {
			return Err(SecretsError::Keeper(format!(
				"ciphertext too short: {} bytes",
				bytes.len()
			)));
		}
		let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
		let mut nonce_bytes = [0u8; NONCE_SIZE];
		nonce_bytes.copy_from_slice(nonce);
		Ok(Self {
			ciphertext: ciphertext.to_vec(),
			nonce: nonce_bytes,
		})
	}
}

/// Generate a random encryption key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Generate a random 96-bit nonce. A (key, nonce) pair must never repeat.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Encrypt `plaintext`, binding `aad` as associated data.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> SecretsResult<EncryptedData> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	let nonce_bytes = generate_nonce();
	let nonce = Nonce::from_slice(&nonce_bytes);

	let ciphertext = cipher
		.encrypt(nonce, Payload { msg: plaintext, aad })
		.map_err(|e| SecretsError::Keeper(format!("encryption failed: {e}")))?;

	Ok(EncryptedData {
		ciphertext,
		nonce: nonce_bytes,
	})
}

/// Decrypt data produced by [`seal`] with the same key and `aad`.
pub fn open(
	key: &[u8; KEY_SIZE],
	encrypted: &EncryptedData,
	aad: &[u8],
) -> SecretsResult<Zeroizing<Vec<u8>>> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let nonce = Nonce::from_slice(&encrypted.nonce);

	let plaintext = cipher
		.decrypt(
			nonce,
			Payload {
				msg: encrypted.ciphertext.as_slice(),
				aad,
			},
		)
		.map_err(|e| SecretsError::Keeper(format!("decryption failed: {e}")))?;

	Ok(Zeroizing::new(plaintext))
}
