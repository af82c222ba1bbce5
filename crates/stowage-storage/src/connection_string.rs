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

//! Azure storage connection strings
//!
//! A connection string is a `;`-separated list of `Key=Value` pairs, e.g.
//!
//! ```text
//! DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=...;EndpointSuffix=core.windows.net
//! BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=...
//! UseDevelopmentStorage=true
//! ```

use std::collections::HashMap;
use std::fmt;
use stowage_config::{ConfigError, ConfigResult};

const FIELD: &str = "connection_string";

const AZURITE_ACCOUNT_NAME: &str = "devstoreaccount1";
const AZURITE_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const AZURITE_BLOB_URI: &str = "http://127.0.0.1:10000";

/// Credential carried by a connection string
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionCredential {
    /// `SharedAccessSignature=...`
    SasToken(String),
    /// `AccountName=...;AccountKey=...`
    SharedKey {
        /// Account name
        account_name: String,
        /// Base64 account key
        account_key: String,
    },
    /// Endpoint only, no credential
    Anonymous,
}

impl fmt::Debug for ConnectionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionCredential::SasToken(_) => f.write_str("SasToken(<redacted>)"),
            ConnectionCredential::SharedKey { account_name, .. } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .field("account_key", &"<redacted>")
                .finish(),
            ConnectionCredential::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// A parsed connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    account_name: Option<String>,
    account_key: Option<String>,
    shared_access_signature: Option<String>,
    blob_endpoint: Option<String>,
}

impl ConnectionString {
    /// Parse a connection string
    ///
    /// Fails when a field has no `=`, when `DefaultEndpointsProtocol` is
    /// neither `http` nor `https`, or when the result carries no usable
    /// combination of `AccountName`+`AccountKey`, `SharedAccessSignature`
    /// or `BlobEndpoint`.
    pub fn parse(value: &str) -> ConfigResult<Self> {
        let pairs = parse_into_key_values(value)?;

        let parsed = if pairs.get("UseDevelopmentStorage").map(String::as_str) == Some("true") {
            let account_name = pairs
                .get("AccountName")
                .cloned()
                .unwrap_or_else(|| AZURITE_ACCOUNT_NAME.to_string());
            let proxy = pairs
                .get("DevelopmentStorageProxyUri")
                .map(String::as_str)
                .unwrap_or(AZURITE_BLOB_URI);
            ConnectionString {
                blob_endpoint: Some(format!("{}/{}", proxy.trim_end_matches('/'), account_name)),
                account_key: Some(
                    pairs
                        .get("AccountKey")
                        .cloned()
                        .unwrap_or_else(|| AZURITE_ACCOUNT_KEY.to_string()),
                ),
                account_name: Some(account_name),
                shared_access_signature: None,
            }
        } else {
            ConnectionString {
                blob_endpoint: collect_endpoint(&pairs)?,
                account_name: pairs.get("AccountName").cloned(),
                account_key: pairs.get("AccountKey").cloned(),
                shared_access_signature: pairs.get("SharedAccessSignature").cloned(),
            }
        };

        if !parsed.is_usable() {
            return Err(invalid(
                "expected AccountName and AccountKey, SharedAccessSignature, or BlobEndpoint",
            ));
        }
        Ok(parsed)
    }

    /// Whether `value` parses as a usable connection string
    pub fn is_connection_string(value: &str) -> bool {
        Self::parse(value).is_ok()
    }

    fn is_usable(&self) -> bool {
        (self.account_name.is_some() && self.account_key.is_some())
            || self.shared_access_signature.is_some()
            || self.blob_endpoint.is_some()
    }

    /// `AccountName`, if present
    pub fn account_name(&self) -> Option<&str> {
        self.account_name.as_deref()
    }

    /// Blob service endpoint, explicit or derived from `AccountName` and `EndpointSuffix`
    pub fn blob_endpoint(&self) -> Option<&str> {
        self.blob_endpoint.as_deref()
    }

    /// The credential to authenticate with
    ///
    /// A shared access signature wins over an account key.
    pub fn credential(&self) -> ConnectionCredential {
        if let Some(token) = &self.shared_access_signature {
            return ConnectionCredential::SasToken(token.clone());
        }
        match (&self.account_name, &self.account_key) {
            (Some(account_name), Some(account_key)) => ConnectionCredential::SharedKey {
                account_name: account_name.clone(),
                account_key: account_key.clone(),
            },
            _ => ConnectionCredential::Anonymous,
        }
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("blob_endpoint", &self.blob_endpoint)
            .field("credential", &self.credential())
            .finish()
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::invalid_value(FIELD, "<redacted>", reason)
}

fn parse_into_key_values(value: &str) -> ConfigResult<HashMap<String, String>> {
    value
        .trim()
        .replace('\n', "")
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| invalid("expected Key=Value pairs separated by ';'"))?;
            if key.is_empty() {
                return Err(invalid("empty key"));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn collect_endpoint(pairs: &HashMap<String, String>) -> ConfigResult<Option<String>> {
    if let Some(endpoint) = pairs.get("BlobEndpoint").filter(|e| !e.is_empty()) {
        return Ok(Some(endpoint.clone()));
    }

    let (Some(account_name), Some(suffix)) = (pairs.get("AccountName"), pairs.get("EndpointSuffix"))
    else {
        return Ok(None);
    };

    let protocol = pairs
        .get("DefaultEndpointsProtocol")
        .map(String::as_str)
        .unwrap_or("https");
    if protocol != "http" && protocol != "https" {
        return Err(invalid(format!(
            "invalid DefaultEndpointsProtocol \"{}\"",
            protocol
        )));
    }

    Ok(Some(format!("{}://{}.blob.{}", protocol, account_name, suffix)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_key() {
        let conn = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(conn.account_name(), Some("acct"));
        assert_eq!(conn.blob_endpoint(), Some("https://acct.blob.core.windows.net"));
        assert_eq!(
            conn.credential(),
            ConnectionCredential::SharedKey {
                account_name: "acct".to_string(),
                account_key: "a2V5".to_string()
            }
        );
    }

    #[test]
    fn test_parse_sas_with_endpoint() {
        let conn = ConnectionString::parse(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=2021&sig=x%3D",
        )
        .unwrap();
        assert_eq!(conn.blob_endpoint(), Some("https://acct.blob.core.windows.net/"));
        assert_eq!(
            conn.credential(),
            ConnectionCredential::SasToken("sv=2021&sig=x%3D".to_string())
        );
    }

    #[test]
    fn test_parse_development_storage() {
        let conn = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(conn.account_name(), Some(AZURITE_ACCOUNT_NAME));
        assert_eq!(
            conn.blob_endpoint(),
            Some("http://127.0.0.1:10000/devstoreaccount1")
        );
        assert!(matches!(conn.credential(), ConnectionCredential::SharedKey { .. }));
    }

    #[test]
    fn test_key_value_with_padding_in_value() {
        let conn = ConnectionString::parse("AccountName=acct;AccountKey=abc==;").unwrap();
        assert!(matches!(
            conn.credential(),
            ConnectionCredential::SharedKey { ref account_key, .. } if account_key == "abc=="
        ));
    }

    #[test]
    fn test_rejects_non_connection_strings() {
        assert!(!ConnectionString::is_connection_string("sv=2021&sig=abc"));
        assert!(!ConnectionString::is_connection_string("hunter2"));
        assert!(!ConnectionString::is_connection_string("AccountName=acct"));
        assert!(!ConnectionString::is_connection_string(""));
    }

    #[test]
    fn test_rejects_bad_protocol() {
        let err = ConnectionString::parse(
            "DefaultEndpointsProtocol=ftp;AccountName=acct;EndpointSuffix=core.windows.net",
        )
        .unwrap_err();
        assert!(err.to_string().contains("connection_string"));
    }

    #[test]
    fn test_debug_is_redacted() {
        let conn = ConnectionString::parse("AccountName=acct;AccountKey=topsecret").unwrap();
        assert!(!format!("{:?}", conn).contains("topsecret"));
    }
}
