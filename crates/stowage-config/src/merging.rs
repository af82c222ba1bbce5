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

//! Merging service configuration with per-call overrides
//!
//! Precedence, highest first:
//!
//! 1. the per-call override, when it sets or clears the field
//! 2. the service-level configuration
//! 3. the process default, which is unset for every field
//!
//! A field cleared by the override stays cleared; it does not fall back to
//! the service value. The merged result is validated before it is returned.

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{redact, ConfigField, StorageConfiguration, StorageOverride, ALL_FIELDS};
use std::fmt;

/// A merged and validated configuration for one call
///
/// `account_name` is always present and at least one credential is set
/// unless the resolution relies on an ambient credential.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedConfiguration {
    account_name: String,
    container_name: Option<String>,
    sas_key: Option<String>,
    account_key: Option<String>,
    connection_string: Option<String>,
}

impl ResolvedConfiguration {
    /// Storage account name
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Container name, if configured
    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    /// SAS key, exactly as configured
    pub fn sas_key(&self) -> Option<&str> {
        self.sas_key.as_deref()
    }

    /// Shared account key
    pub fn account_key(&self) -> Option<&str> {
        self.account_key.as_deref()
    }

    /// Connection string
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    /// Whether any explicit credential field is set
    pub fn has_explicit_credential(&self) -> bool {
        self.sas_key.is_some() || self.account_key.is_some() || self.connection_string.is_some()
    }

    /// Field-by-field comparison with a service-level configuration
    ///
    /// Empty strings in `config` compare equal to unset fields.
    pub fn matches(&self, config: &StorageConfiguration) -> bool {
        ALL_FIELDS.iter().all(|field| self.get(*field) == config.get(*field))
    }

    /// Value of one field
    pub fn get(&self, field: ConfigField) -> Option<&str> {
        match field {
            ConfigField::AccountName => Some(self.account_name.as_str()),
            ConfigField::ContainerName => self.container_name.as_deref(),
            ConfigField::SasKey => self.sas_key.as_deref(),
            ConfigField::AccountKey => self.account_key.as_deref(),
            ConfigField::ConnectionString => self.connection_string.as_deref(),
        }
    }

    /// Convert back into a plain configuration
    pub fn to_configuration(&self) -> StorageConfiguration {
        StorageConfiguration {
            account_name: self.account_name.clone(),
            container_name: self.container_name.clone().unwrap_or_default(),
            sas_key: self.sas_key.clone(),
            account_key: self.account_key.clone(),
            connection_string: self.connection_string.clone(),
        }
    }
}

impl fmt::Debug for ResolvedConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfiguration")
            .field("account_name", &self.account_name)
            .field("container_name", &self.container_name)
            .field("sas_key", &redact(self.sas_key.as_deref()))
            .field("account_key", &redact(self.account_key.as_deref()))
            .field("connection_string", &redact(self.connection_string.as_deref()))
            .finish()
    }
}

/// Merge a per-call override on top of the service configuration and validate it
///
/// `ambient_available` tells whether the hosting environment offers a
/// default credential; without one, at least one of `sas_key`, `account_key`
/// or `connection_string` must survive the merge.
///
/// # Errors
///
/// - [`ConfigError::MissingRequired`] naming `account_name` when it is
///   absent, empty, or cleared by the override
/// - [`ConfigError::MissingCredential`] when no credential remains
///
/// # Examples
///
/// ```
/// use stowage_config::{merge, ConfigField, StorageConfiguration, StorageOverride};
///
/// let service = StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc");
/// let resolved = merge(&service, &StorageOverride::new().with_container_name("c2"), false).unwrap();
/// assert_eq!(resolved.container_name(), Some("c2"));
///
/// let cleared = StorageOverride::new().clear(ConfigField::AccountName);
/// let err = merge(&service, &cleared, false).unwrap_err();
/// assert_eq!(err.to_string(), "\"account_name\" was not provided.");
/// ```
pub fn merge(
    service: &StorageConfiguration,
    overrides: &StorageOverride,
    ambient_available: bool,
) -> ConfigResult<ResolvedConfiguration> {
    let resolve = |field: ConfigField| overrides.field(field).apply(service.get(field));

    let account_name = resolve(ConfigField::AccountName)
        .ok_or_else(|| ConfigError::missing(ConfigField::AccountName.as_str()))?;

    let resolved = ResolvedConfiguration {
        account_name,
        container_name: resolve(ConfigField::ContainerName),
        sas_key: resolve(ConfigField::SasKey),
        account_key: resolve(ConfigField::AccountKey),
        connection_string: resolve(ConfigField::ConnectionString),
    };

    if !resolved.has_explicit_credential() && !ambient_available {
        return Err(ConfigError::MissingCredential);
    }

    Ok(resolved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> StorageConfiguration {
        StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc")
    }

    #[test]
    fn test_empty_override_keeps_service_values() {
        let resolved = merge(&service(), &StorageOverride::new(), false).unwrap();
        assert_eq!(resolved.account_name(), "acct");
        assert_eq!(resolved.container_name(), Some("c1"));
        assert_eq!(resolved.sas_key(), Some("sv=abc"));
        assert!(resolved.matches(&service()));
    }

    #[test]
    fn test_override_takes_precedence() {
        let overrides = StorageOverride::new().with_account_key("key==");
        let resolved = merge(&service(), &overrides, false).unwrap();
        assert_eq!(resolved.account_key(), Some("key=="));
        assert_eq!(resolved.sas_key(), Some("sv=abc"));
        assert!(!resolved.matches(&service()));
    }

    #[test]
    fn test_cleared_account_name_fails() {
        let overrides = StorageOverride::new().clear(ConfigField::AccountName);
        let err = merge(&service(), &overrides, false).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(ref f) if f == "account_name"));
    }

    #[test]
    fn test_empty_account_name_override_fails() {
        let overrides = StorageOverride::new().with_account_name("");
        assert!(merge(&service(), &overrides, false).is_err());
    }

    #[test]
    fn test_missing_account_name_in_service_fails() {
        let config = StorageConfiguration::new("", "c1").with_sas_key("sv=abc");
        let err = merge(&config, &StorageOverride::new(), true).unwrap_err();
        assert_eq!(err.to_string(), "\"account_name\" was not provided.");
    }

    #[test]
    fn test_cleared_only_credential_fails_without_ambient() {
        let overrides = StorageOverride::new().clear(ConfigField::SasKey);
        let err = merge(&service(), &overrides, false).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential));
    }

    #[test]
    fn test_cleared_only_credential_allowed_with_ambient() {
        let overrides = StorageOverride::new().clear(ConfigField::SasKey);
        let resolved = merge(&service(), &overrides, true).unwrap();
        assert!(!resolved.has_explicit_credential());
    }

    #[test]
    fn test_override_can_supply_missing_fields() {
        let config = StorageConfiguration::default();
        let overrides = StorageOverride::new()
            .with_account_name("acct")
            .with_connection_string("AccountName=acct;AccountKey=a2V5");
        let resolved = merge(&config, &overrides, false).unwrap();
        assert_eq!(resolved.account_name(), "acct");
        assert!(resolved.container_name().is_none());
    }

    #[test]
    fn test_round_trip_to_configuration() {
        let resolved = merge(&service(), &StorageOverride::new(), false).unwrap();
        assert_eq!(resolved.to_configuration(), service());
    }
}
