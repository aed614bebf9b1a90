// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keeper configuration.
//!
//! The keeper kind may come from any source. The master key is only ever read
//! from `COFFER_SERVER_KEEPER_MASTER_KEY` or its `_FILE` variant and is passed
//! to [`KeeperConfigLayer::finalize`] separately.

use std::fmt;
use std::str::FromStr;

use coffer_common_secret::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeeperKind {
	/// Reversible encoding with no cryptography. Development only.
	#[default]
	Placeholder,
	/// AES-256-GCM under a configured master key.
	AesGcm,
}

impl KeeperKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			KeeperKind::Placeholder => "placeholder",
			KeeperKind::AesGcm => "aes-gcm",
		}
	}
}

impl fmt::Display for KeeperKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for KeeperKind {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"placeholder" => Ok(KeeperKind::Placeholder),
			"aes-gcm" | "aes_gcm" | "aesgcm" => Ok(KeeperKind::AesGcm),
			other => Err(ConfigError::InvalidValue {
				key: "keeper.kind".to_string(),
				message: format!("unknown keeper kind '{other}' (expected placeholder or aes-gcm)"),
			}),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct KeeperConfig {
	pub kind: KeeperKind,
	/// Base64-encoded 32-byte key. Required for [`KeeperKind::AesGcm`].
	pub master_key: Option<SecretString>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeeperConfigLayer {
	#[serde(default)]
	pub kind: Option<String>,
}

impl KeeperConfigLayer {
	pub fn merge(&mut self, other: KeeperConfigLayer) {
		if other.kind.is_some() {
			self.kind = other.kind;
		}
	}

	pub fn finalize(self, master_key: Option<SecretString>) -> Result<KeeperConfig, ConfigError> {
		let kind = match self.kind {
			Some(kind) => kind.parse()?,
			None => KeeperKind::default(),
		};

		if kind == KeeperKind::AesGcm && master_key.as_ref().map_or(true, |k| k.is_empty()) {
			return Err(ConfigError::Validation(
				"keeper.kind = aes-gcm requires COFFER_SERVER_KEEPER_MASTER_KEY or \
				 COFFER_SERVER_KEEPER_MASTER_KEY_FILE"
					.to_string(),
			));
		}

		Ok(KeeperConfig { kind, master_key })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_placeholder() {
		let config = KeeperConfigLayer::default().finalize(None).unwrap();
		assert_eq!(config.kind, KeeperKind::Placeholder);
		assert!(config.master_key.is_none());
	}

	#[test]
	fn test_aes_gcm_requires_master_key() {
		let layer = KeeperConfigLayer {
			kind: Some("aes-gcm".to_string()),
		};
		let err = layer.clone().finalize(None).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));

		let err = layer.clone().finalize(Some(SecretString::empty())).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));

		let config = layer.finalize(Some(SecretString::from("a2V5"))).unwrap();
		assert_eq!(config.kind, KeeperKind::AesGcm);
	}

	#[test]
	fn test_unknown_kind_is_invalid_value() {
		let layer = KeeperConfigLayer {
			kind: Some("vault".to_string()),
		};
		let err = layer.finalize(None).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "keeper.kind"));
	}

	#[test]
	fn test_kind_parse_is_case_insensitive() {
		assert_eq!("AES-GCM".parse::<KeeperKind>().unwrap(), KeeperKind::AesGcm);
		assert_eq!("Placeholder".parse::<KeeperKind>().unwrap(), KeeperKind::Placeholder);
	}

	#[test]
	fn test_master_key_debug_is_redacted() {
		let config = KeeperConfigLayer {
			kind: Some("aes-gcm".to_string()),
		}
		.finalize(Some(SecretString::from("super-secret-key")))
		.unwrap();
		assert!(!format!("{config:?}").contains("super-secret-key"));
	}
}
