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

//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, merging or validating storage configuration
///
/// Every variant names the field, variable or value concerned so that an
/// operator can fix the deployment without reading the source.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error while reading a configuration file
    #[error("IO error reading configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed TOML document
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Malformed YAML document
    #[error("Failed to parse YAML configuration: {0}")]
    YamlParseError(#[from] serde_yaml::Error),

    /// Malformed JSON document
    #[error("Failed to parse JSON configuration: {0}")]
    JsonParseError(#[from] serde_json::error::Error),

    /// File extension is not one of the supported formats
    #[error("Unsupported configuration format: {0}. Supported formats: toml, yaml, json")]
    UnsupportedFormat(String),

    /// Configuration file does not exist
    #[error("Configuration file not found at path: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Path has no usable extension
    #[error("Invalid configuration path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// An environment variable holds a value that cannot be interpreted
    #[error("Environment variable {variable_name} has an unusable value. {reason}")]
    EnvVarParsingError {
        /// Name of the offending variable
        variable_name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A mandatory field is absent, empty, or was explicitly cleared
    #[error("\"{0}\" was not provided.")]
    MissingRequired(String),

    /// None of the credential fields is usable and no ambient credential exists
    #[error(
        "Neither \"sas_key\" nor \"account_key\" nor \"connection_string\" was provided, \
         and no ambient credential is available."
    )]
    MissingCredential,

    /// A field holds a value that cannot be used
    #[error("Invalid configuration value for \"{field}\": {reason} (got {value:?})")]
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// Offending value, redacted by the caller when secret
        value: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create a MissingRequired error for the given field name
    pub fn missing(field: impl Into<String>) -> Self {
        ConfigError::MissingRequired(field.into())
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an EnvVarParsingError
    pub fn env_var_parsing_error(
        variable_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::EnvVarParsingError {
            variable_name: variable_name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
