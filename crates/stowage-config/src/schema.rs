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

//! Storage configuration schema and per-call overrides

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Names of the configuration fields, as they appear in files and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    /// Storage account name
    AccountName,
    /// Target container name
    ContainerName,
    /// Shared access signature token
    SasKey,
    /// Shared account key
    AccountKey,
    /// Full connection string
    ConnectionString,
}

impl ConfigField {
    /// Field name as written in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigField::AccountName => "account_name",
            ConfigField::ContainerName => "container_name",
            ConfigField::SasKey => "sas_key",
            ConfigField::AccountKey => "account_key",
            ConfigField::ConnectionString => "connection_string",
        }
    }

    /// Whether the field carries secret material that must not be logged
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            ConfigField::SasKey | ConfigField::AccountKey | ConfigField::ConnectionString
        )
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service-level storage configuration
///
/// Supplied once when the storage service is constructed. Empty strings are
/// treated exactly like absent values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfiguration {
    /// Storage account name (the `{account}` in `{account}.blob.core.windows.net`)
    pub account_name: String,

    /// Container that uploads are written into
    pub container_name: String,

    /// Shared access signature, with or without a leading `?`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_key: Option<String>,

    /// Base64 shared account key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,

    /// Full connection string (`DefaultEndpointsProtocol=...;AccountName=...;...`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

impl StorageConfiguration {
    /// Create a configuration for the given account and container with no credential
    pub fn new(account_name: impl Into<String>, container_name: impl Into<String>) -> Self {
        StorageConfiguration {
            account_name: account_name.into(),
            container_name: container_name.into(),
            ..Default::default()
        }
    }

    /// Set the SAS key
    pub fn with_sas_key(mut self, sas_key: impl Into<String>) -> Self {
        self.sas_key = Some(sas_key.into());
        self
    }

    /// Set the shared account key
    pub fn with_account_key(mut self, account_key: impl Into<String>) -> Self {
        self.account_key = Some(account_key.into());
        self
    }

    /// Set the connection string
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Value of a field, `None` when absent or empty
    pub fn get(&self, field: ConfigField) -> Option<&str> {
        let value = match field {
            ConfigField::AccountName => Some(self.account_name.as_str()),
            ConfigField::ContainerName => Some(self.container_name.as_str()),
            ConfigField::SasKey => self.sas_key.as_deref(),
            ConfigField::AccountKey => self.account_key.as_deref(),
            ConfigField::ConnectionString => self.connection_string.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Replace a field, `None` clears it
    pub fn set(&mut self, field: ConfigField, value: Option<String>) {
        match field {
            ConfigField::AccountName => self.account_name = value.unwrap_or_default(),
            ConfigField::ContainerName => self.container_name = value.unwrap_or_default(),
            ConfigField::SasKey => self.sas_key = value,
            ConfigField::AccountKey => self.account_key = value,
            ConfigField::ConnectionString => self.connection_string = value,
        }
    }
}

impl fmt::Debug for StorageConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfiguration")
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .field("sas_key", &redact(self.sas_key.as_deref()))
            .field("account_key", &redact(self.account_key.as_deref()))
            .field("connection_string", &redact(self.connection_string.as_deref()))
            .finish()
    }
}

pub(crate) fn redact(value: Option<&str>) -> Option<&'static str> {
    value.map(|_| "<redacted>")
}

/// A single field of a per-call override
///
/// Distinguishes "the caller did not mention this field" from "the caller
/// wants this field cleared". When deserialized, a missing key is
/// [`Patch::Inherit`] and an explicit `null` is [`Patch::Clear`].
#[derive(Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Keep the service-level value
    Inherit,
    /// Unset the field for this call
    Clear,
    /// Use this value for this call
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Inherit
    }
}

impl<T> Patch<T> {
    /// Whether the override leaves the field alone
    pub fn is_inherit(&self) -> bool {
        matches!(self, Patch::Inherit)
    }
}

impl Patch<String> {
    /// Resolve this field against the value below it
    ///
    /// An empty `Set` value clears the field; it never falls back.
    pub fn apply(&self, base: Option<&str>) -> Option<String> {
        match self {
            Patch::Inherit => base.filter(|v| !v.is_empty()).map(str::to_owned),
            Patch::Clear => None,
            Patch::Set(value) if value.is_empty() => None,
            Patch::Set(value) => Some(value.clone()),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Patch::from)
    }
}

impl<T> fmt::Debug for Patch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // values may be secrets
        match self {
            Patch::Inherit => f.write_str("Inherit"),
            Patch::Clear => f.write_str("Clear"),
            Patch::Set(_) => f.write_str("Set(..)"),
        }
    }
}

/// Partial configuration supplied for a single call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageOverride {
    /// Override for `account_name`
    pub account_name: Patch<String>,
    /// Override for `container_name`
    pub container_name: Patch<String>,
    /// Override for `sas_key`
    pub sas_key: Patch<String>,
    /// Override for `account_key`
    pub account_key: Patch<String>,
    /// Override for `connection_string`
    pub connection_string: Patch<String>,
}

impl StorageOverride {
    /// An override that changes nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one field with a value
    pub fn with(mut self, field: ConfigField, value: impl Into<String>) -> Self {
        *self.field_mut(field) = Patch::Set(value.into());
        self
    }

    /// Explicitly clear one field for this call
    pub fn clear(mut self, field: ConfigField) -> Self {
        *self.field_mut(field) = Patch::Clear;
        self
    }

    /// Override `account_name`
    pub fn with_account_name(self, value: impl Into<String>) -> Self {
        self.with(ConfigField::AccountName, value)
    }

    /// Override `container_name`
    pub fn with_container_name(self, value: impl Into<String>) -> Self {
        self.with(ConfigField::ContainerName, value)
    }

    /// Override `sas_key`
    pub fn with_sas_key(self, value: impl Into<String>) -> Self {
        self.with(ConfigField::SasKey, value)
    }

    /// Override `account_key`
    pub fn with_account_key(self, value: impl Into<String>) -> Self {
        self.with(ConfigField::AccountKey, value)
    }

    /// Override `connection_string`
    pub fn with_connection_string(self, value: impl Into<String>) -> Self {
        self.with(ConfigField::ConnectionString, value)
    }

    /// The override for one field
    pub fn field(&self, field: ConfigField) -> &Patch<String> {
        match field {
            ConfigField::AccountName => &self.account_name,
            ConfigField::ContainerName => &self.container_name,
            ConfigField::SasKey => &self.sas_key,
            ConfigField::AccountKey => &self.account_key,
            ConfigField::ConnectionString => &self.connection_string,
        }
    }

    fn field_mut(&mut self, field: ConfigField) -> &mut Patch<String> {
        match field {
            ConfigField::AccountName => &mut self.account_name,
            ConfigField::ContainerName => &mut self.container_name,
            ConfigField::SasKey => &mut self.sas_key,
            ConfigField::AccountKey => &mut self.account_key,
            ConfigField::ConnectionString => &mut self.connection_string,
        }
    }

    /// Whether this override leaves every field alone
    pub fn is_empty(&self) -> bool {
        ALL_FIELDS.iter().all(|f| self.field(*f).is_inherit())
    }
}

/// Every configuration field, in declaration order
pub const ALL_FIELDS: [ConfigField; 5] = [
    ConfigField::AccountName,
    ConfigField::ContainerName,
    ConfigField::SasKey,
    ConfigField::AccountKey,
    ConfigField::ConnectionString,
];
