// Stowage - Azure Blob storage access
// Copyright (C) 2025 Stowage Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Configuration for the Stowage storage service
//!
//! This crate owns everything the storage service knows about its settings:
//!
//! - [`StorageConfiguration`]: the service-level account, container and credentials
//! - [`StorageOverride`]: a per-call partial configuration whose fields can be
//!   left alone, cleared, or set
//! - [`merge`]: the three-level precedence rule plus validation, producing a
//!   [`ResolvedConfiguration`]
//! - [`ConfigLoader`] and the [`ConfigSource`] implementations: TOML, YAML and
//!   JSON files, `AZURE_STORAGE_*` environment variables, async factories
//!
//! # Example
//!
//! ```no_run
//! use stowage_config::{merge, ConfigLoader, StorageOverride};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load_with_overrides("storage.toml").await?;
//!     let resolved = merge(&config, &StorageOverride::new(), false)?;
//!
//!     println!("Using account {}", resolved.account_name());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod merging;
pub mod schema;
pub mod source;

pub use error::{ConfigError, ConfigResult};
pub use loader::{AccessKeyKind, ConfigFormat, ConfigLoader};
pub use merging::{merge, ResolvedConfiguration};
pub use schema::{ConfigField, Patch, StorageConfiguration, StorageOverride, ALL_FIELDS};
pub use source::{ConfigSource, EnvSource, FactorySource, FileSource};
