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

//! Credential strategy selection
//!
//! Exactly one strategy is chosen per resolved configuration, by priority:
//!
//! 1. a `connection_string` that parses as one
//! 2. a `sas_key`
//! 3. an `account_key`
//! 4. the ambient credential of the hosting environment

use crate::connection_string::ConnectionString;
use crate::locator::{normalize_sas, resolve_service_url, ServiceUrlProvider};
use std::fmt;
use stowage_config::{ConfigError, ConfigField, ConfigResult, ResolvedConfiguration};
use tracing::warn;

/// Which kind of credential a client was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Connection string
    ConnectionString,
    /// Shared access signature
    SasToken,
    /// Shared account key
    SharedKey,
    /// Default credential chain of the environment
    Ambient,
}

impl StrategyKind {
    /// Configuration field an operator should check when this credential is refused
    pub fn credential_field(&self) -> ConfigField {
        match self {
            StrategyKind::ConnectionString => ConfigField::ConnectionString,
            StrategyKind::SasToken => ConfigField::SasKey,
            StrategyKind::SharedKey => ConfigField::AccountKey,
            StrategyKind::Ambient => ConfigField::AccountName,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::ConnectionString => "connection-string",
            StrategyKind::SasToken => "sas-token",
            StrategyKind::SharedKey => "shared-key",
            StrategyKind::Ambient => "ambient",
        };
        f.write_str(name)
    }
}

/// How to authenticate against the blob service
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    /// Everything comes from a connection string
    ConnectionString {
        /// Account named by the connection string, else the configured one
        account_name: String,
        /// Parsed connection string
        connection: ConnectionString,
    },
    /// Anonymous client against a SAS-signed service URL
    SasToken {
        /// Account name
        account_name: String,
        /// Service URL with the token appended
        service_url: String,
        /// Token without its leading `?`
        token: String,
    },
    /// Shared-key client against the account host
    SharedKey {
        /// Account name
        account_name: String,
        /// Base64 account key
        account_key: String,
    },
    /// Default credential chain of the hosting environment
    Ambient {
        /// Account name
        account_name: String,
    },
}

impl CredentialStrategy {
    /// The strategy kind
    pub fn kind(&self) -> StrategyKind {
        match self {
            CredentialStrategy::ConnectionString { .. } => StrategyKind::ConnectionString,
            CredentialStrategy::SasToken { .. } => StrategyKind::SasToken,
            CredentialStrategy::SharedKey { .. } => StrategyKind::SharedKey,
            CredentialStrategy::Ambient { .. } => StrategyKind::Ambient,
        }
    }

    /// Storage account the client talks to
    pub fn account_name(&self) -> &str {
        match self {
            CredentialStrategy::ConnectionString { account_name, .. }
            | CredentialStrategy::SasToken { account_name, .. }
            | CredentialStrategy::SharedKey { account_name, .. }
            | CredentialStrategy::Ambient { account_name } => account_name,
        }
    }
}

impl fmt::Debug for CredentialStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStrategy::ConnectionString {
                account_name,
                connection,
            } => f
                .debug_struct("ConnectionString")
                .field("account_name", account_name)
                .field("connection", connection)
                .finish(),
            CredentialStrategy::SasToken { account_name, .. } => f
                .debug_struct("SasToken")
                .field("account_name", account_name)
                .field("token", &"<redacted>")
                .finish(),
            CredentialStrategy::SharedKey { account_name, .. } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .field("account_key", &"<redacted>")
                .finish(),
            CredentialStrategy::Ambient { account_name } => f
                .debug_struct("Ambient")
                .field("account_name", account_name)
                .finish(),
        }
    }
}

/// Choose the credential strategy for a resolved configuration
///
/// `provider`, when given, builds the service URL used by the SAS strategy.
///
/// # Errors
///
/// - [`ConfigError::InvalidValue`] naming `connection_string` when one is
///   set, does not parse, and neither `sas_key` nor `account_key` can be
///   used instead
/// - [`ConfigError::InvalidValue`] naming `service_url_provider` when the
///   provider returns something that is not a URL
///
/// # Examples
///
/// ```
/// use stowage_config::{merge, StorageConfiguration, StorageOverride};
/// use stowage_storage::credential::{select_strategy, StrategyKind};
///
/// let config = StorageConfiguration::new("acct", "c1")
///     .with_sas_key("?sv=abc")
///     .with_account_key("a2V5");
/// let resolved = merge(&config, &StorageOverride::new(), false).unwrap();
/// let strategy = select_strategy(&resolved, None).unwrap();
/// assert_eq!(strategy.kind(), StrategyKind::SasToken);
/// ```
pub fn select_strategy(
    config: &ResolvedConfiguration,
    provider: Option<&ServiceUrlProvider>,
) -> ConfigResult<CredentialStrategy> {
    let account_name = config.account_name();
    let sas = config
        .sas_key()
        .map(normalize_sas)
        .filter(|token| !token.is_empty());
    let account_key = config.account_key();

    if let Some(value) = config.connection_string() {
        match ConnectionString::parse(value) {
            Ok(connection) => {
                return Ok(CredentialStrategy::ConnectionString {
                    account_name: connection
                        .account_name()
                        .unwrap_or(account_name)
                        .to_string(),
                    connection,
                })
            }
            Err(err) if sas.is_none() && account_key.is_none() => return Err(err),
            Err(err) => {
                warn!(
                    account = account_name,
                    "Ignoring unusable connection_string, falling back to other credentials: {}",
                    err
                );
            }
        }
    }

    if let Some(token) = sas {
        let service_url =
            resolve_service_url(account_name, Some(token), config.container_name(), provider)?;
        return Ok(CredentialStrategy::SasToken {
            account_name: account_name.to_string(),
            service_url,
            token: token.to_string(),
        });
    }

    if let Some(key) = account_key {
        return Ok(CredentialStrategy::SharedKey {
            account_name: account_name.to_string(),
            account_key: key.to_string(),
        });
    }

    if config.sas_key().is_some() {
        // A bare "?" survives merging but carries no token.
        return Err(ConfigError::invalid_value(
            ConfigField::SasKey.as_str(),
            "<redacted>",
            "the SAS token is empty",
        ));
    }

    Ok(CredentialStrategy::Ambient {
        account_name: account_name.to_string(),
    })
}
