// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the coffer secure value store.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`COFFER_SERVER_*`)
//! 2. Config file (`/etc/coffer/server.toml`)
//! 3. Built-in defaults
//!
//! ```ignore
//! use coffer_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("database at {}", config.database.url);
//! ```

pub mod env;
pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use env::{load_secret_env, SecretEnvError};
pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use coffer_common_secret::SecretString;
use tracing::{debug, info};

/// Environment variable holding the keeper master key.
pub const MASTER_KEY_ENV: &str = "COFFER_SERVER_KEEPER_MASTER_KEY";

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub keeper: KeeperConfig,
	pub logging: LoggingConfig,
	pub store: StoreConfig,
}

/// Load configuration from defaults, the system config file and the
/// environment.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![Box::new(EnvSource)])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	let master_key =
		load_secret_env(MASTER_KEY_ENV).map_err(|e| ConfigError::Secret(e.to_string()))?;
	finalize(merged, master_key)
}

/// Finalize a merged layer into resolved config.
pub fn finalize(
	layer: ServerConfigLayer,
	master_key: Option<SecretString>,
) -> Result<ServerConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let keeper = layer.keeper.unwrap_or_default().finalize(master_key)?;
	let logging = layer.logging.unwrap_or_default().finalize();
	let store = layer.store.unwrap_or_default().finalize();

	info!(
		database = %database.url,
		max_connections = database.max_connections,
		keeper = %keeper.kind,
		operation_timeout_secs = store.operation_timeout_secs,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		database,
		keeper,
		logging,
		store,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_finalize_defaults() {
		let config = finalize(ServerConfigLayer::default(), None).unwrap();
		assert_eq!(config.database.url, "sqlite:./coffer.db");
		assert_eq!(config.keeper.kind, KeeperKind::Placeholder);
		assert_eq!(config.logging.level, "info");
		assert_eq!(config.store.operation_timeout_secs, 30);
	}

	#[test]
	fn test_finalize_rejects_aes_gcm_without_key() {
		let layer = ServerConfigLayer {
			keeper: Some(KeeperConfigLayer {
				kind: Some("aes-gcm".to_string()),
			}),
			..Default::default()
		};
		assert!(matches!(
			finalize(layer, None),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_file_overrides_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(&path, "[store]\noperation_timeout_secs = 7\n").unwrap();

		let mut merged = ServerConfigLayer::default();
		merged.merge(DefaultsSource.load().unwrap());
		merged.merge(TomlSource::new(&path).load().unwrap());
		let config = finalize(merged, None).unwrap();
		assert_eq!(config.store.operation_timeout_secs, 7);
	}

	proptest! {
		#[test]
		fn later_layer_wins(a in 1u32..100, b in 1u32..100) {
			let mut merged = ServerConfigLayer {
				database: Some(DatabaseConfigLayer { url: None, max_connections: Some(a) }),
				..Default::default()
			};
			merged.merge(ServerConfigLayer {
				database: Some(DatabaseConfigLayer { url: None, max_connections: Some(b) }),
				..Default::default()
			});
			let config = finalize(merged, None).unwrap();
			prop_assert_eq!(config.database.max_connections, b);
		}
	}
}
