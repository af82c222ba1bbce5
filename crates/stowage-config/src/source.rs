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

//! Suppliers of the service-level configuration
//!
//! The storage service asks its source once, at construction.

use crate::error::ConfigResult;
use crate::loader::ConfigLoader;
use crate::schema::StorageConfiguration;
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;

/// Supplies a [`StorageConfiguration`]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Produce the configuration
    async fn load(&self) -> ConfigResult<StorageConfiguration>;
}

#[async_trait]
impl ConfigSource for StorageConfiguration {
    async fn load(&self) -> ConfigResult<StorageConfiguration> {
        Ok(self.clone())
    }
}

/// Reads `AZURE_STORAGE_*` environment variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

#[async_trait]
impl ConfigSource for EnvSource {
    async fn load(&self) -> ConfigResult<StorageConfiguration> {
        ConfigLoader::new().from_env()
    }
}

/// Reads a TOML, YAML or JSON file, optionally overlaid with the environment
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    env_overrides: bool,
}

impl FileSource {
    /// Read `path` and apply environment overrides on top
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource {
            path: path.into(),
            env_overrides: true,
        }
    }

    /// Read `path` only, ignoring the environment
    pub fn without_env(path: impl Into<PathBuf>) -> Self {
        FileSource {
            path: path.into(),
            env_overrides: false,
        }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn load(&self) -> ConfigResult<StorageConfiguration> {
        let loader = ConfigLoader::new();
        if self.env_overrides {
            loader.load_with_overrides(&self.path).await
        } else {
            loader.load_file(&self.path).await
        }
    }
}

/// Wraps an async factory closure
///
/// ```
/// use stowage_config::{ConfigSource, FactorySource, StorageConfiguration};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = FactorySource::new(|| async {
///     Ok(StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc"))
/// });
/// let config = source.load().await?;
/// assert_eq!(config.account_name, "acct");
/// # Ok(())
/// # }
/// ```
pub struct FactorySource<F> {
    factory: F,
}

impl<F> FactorySource<F> {
    /// Wrap a closure returning a future of the configuration
    pub fn new(factory: F) -> Self {
        FactorySource { factory }
    }
}

#[async_trait]
impl<F, Fut> ConfigSource for FactorySource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ConfigResult<StorageConfiguration>> + Send,
{
    async fn load(&self) -> ConfigResult<StorageConfiguration> {
        (self.factory)().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[tokio::test]
    async fn test_static_source() {
        let config = StorageConfiguration::new("acct", "c1");
        assert_eq!(config.load().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_factory_source_propagates_errors() {
        let source = FactorySource::new(|| async { Err(ConfigError::missing("account_name")) });
        assert!(source.load().await.is_err());
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileSource::without_env("/definitely/not/here.toml");
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
