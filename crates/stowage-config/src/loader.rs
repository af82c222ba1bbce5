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

use crate::error::{ConfigError, ConfigResult};
use crate::schema::StorageConfiguration;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Storage account name
pub const ENV_ACCOUNT: &str = "AZURE_STORAGE_ACCOUNT";
/// Target container
pub const ENV_CONTAINER: &str = "AZURE_STORAGE_CONTAINER";
/// SAS key
pub const ENV_SAS_KEY: &str = "AZURE_STORAGE_SAS_KEY";
/// Shared account key
pub const ENV_ACCOUNT_KEY: &str = "AZURE_STORAGE_KEY";
/// Connection string
pub const ENV_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
/// Either a SAS key or a connection string, told apart by its prefix
pub const ENV_ACCESS_KEY: &str = "AZURE_STORAGE_ACCESS_KEY";

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML document
    Toml,
    /// YAML document
    Yaml,
    /// JSON document
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// What an `AZURE_STORAGE_ACCESS_KEY` value turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKeyKind {
    /// A shared access signature (`sv=...` or `?sv=...`)
    SasToken,
    /// A connection string (`BlobEndpoint=...` or `DefaultEndpointsProtocol=...`)
    ConnectionString,
}

impl AccessKeyKind {
    /// Classify an access key by its prefix
    pub fn detect(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with("BlobEndpoint") || value.starts_with("DefaultEndpointsProtocol") {
            Some(AccessKeyKind::ConnectionString)
        } else if value.starts_with("?sv=") || value.starts_with("sv=") {
            Some(AccessKeyKind::SasToken)
        } else {
            None
        }
    }
}

/// Loads [`StorageConfiguration`] from files and the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<StorageConfiguration> {
        let path = path.as_ref();
        debug!("Loading storage configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(
        &self,
        content: &str,
        format: ConfigFormat,
    ) -> ConfigResult<StorageConfiguration> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Load a file, then apply environment variable overrides
    pub async fn load_with_overrides<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> ConfigResult<StorageConfiguration> {
        let mut config = self.load_file(path).await?;
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Build configuration from the environment alone
    pub fn from_env(&self) -> ConfigResult<StorageConfiguration> {
        let mut config = StorageConfiguration::default();
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Apply `AZURE_STORAGE_*` environment variables on top of `config`
    pub fn apply_env_overrides(&self, config: &mut StorageConfiguration) -> ConfigResult<()> {
        self.apply_overrides_from(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`
    ///
    /// Variables that are unset or empty leave the field untouched.
    /// `AZURE_STORAGE_ACCESS_KEY` is applied first so that the dedicated
    /// `AZURE_STORAGE_SAS_KEY` and `AZURE_STORAGE_CONNECTION_STRING`
    /// variables win over it.
    pub fn apply_overrides_from<F>(
        &self,
        config: &mut StorageConfiguration,
        lookup: F,
    ) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(value) = lookup(ENV_ACCOUNT) {
            config.account_name = value;
        }
        if let Some(value) = lookup(ENV_CONTAINER) {
            config.container_name = value;
        }

        if let Some(value) = lookup(ENV_ACCESS_KEY) {
            match AccessKeyKind::detect(&value) {
                Some(AccessKeyKind::ConnectionString) => config.connection_string = Some(value),
                Some(AccessKeyKind::SasToken) => config.sas_key = Some(value),
                None => {
                    return Err(ConfigError::env_var_parsing_error(
                        ENV_ACCESS_KEY,
                        "expected a SAS token (sv=...) or a connection string \
                         (BlobEndpoint=... or DefaultEndpointsProtocol=...)",
                    ))
                }
            }
        }

        if let Some(value) = lookup(ENV_SAS_KEY) {
            config.sas_key = Some(value);
        }
        if let Some(value) = lookup(ENV_ACCOUNT_KEY) {
            config.account_key = Some(value);
        }
        if let Some(value) = lookup(ENV_CONNECTION_STRING) {
            config.connection_string = Some(value);
        }

        Ok(())
    }
}
