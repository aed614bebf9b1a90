// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for the coffer server.

pub mod database;
pub mod keeper;
pub mod logging;
pub mod store;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use keeper::{KeeperConfig, KeeperConfigLayer, KeeperKind};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use store::{StoreConfig, StoreConfigLayer};
