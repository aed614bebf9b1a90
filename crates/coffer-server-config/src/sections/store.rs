// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Store behaviour configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct StoreConfig {
	/// Deadline attached to every request context. Zero disables it.
	pub operation_timeout_secs: u64,
}

impl StoreConfig {
	pub fn operation_timeout(&self) -> Option<Duration> {
		(self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
	}
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfigLayer {
	#[serde(default)]
	pub operation_timeout_secs: Option<u64>,
}

impl StoreConfigLayer {
	pub fn merge(&mut self, other: StoreConfigLayer) {
		if other.operation_timeout_secs.is_some() {
			self.operation_timeout_secs = other.operation_timeout_secs;
		}
	}

	pub fn finalize(self) -> StoreConfig {
		StoreConfig {
			operation_timeout_secs: self
				.operation_timeout_secs
				.unwrap_or(DEFAULT_OPERATION_TIMEOUT_SECS),
		}
	}
}
