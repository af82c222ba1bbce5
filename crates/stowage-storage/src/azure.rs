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

//! Azure SDK implementation of [`BlobClient`]
//!
//! Built with the `azure` feature. One client is created per credential
//! strategy:
//!
//! - connection string: the credential and endpoint it carries
//! - SAS token: the token, against the public endpoint or the host of a
//!   custom service URL
//! - shared key: the account key, against the public endpoint
//! - ambient: `azure_identity`'s default credential chain
//!
//! # Testing with Azurite
//!
//! ```bash
//! azurite --silent --location /tmp/azurite
//! export AZURE_STORAGE_CONNECTION_STRING="UseDevelopmentStorage=true"
//! cargo test -p stowage-storage --features azure -- --ignored
//! ```

use crate::connection_string::ConnectionCredential;
use crate::credential::CredentialStrategy;
use crate::error::{StorageError, StorageResult};
use crate::locator::HOST_SUFFIX;
use crate::resolver::ClientFactory;
use crate::{BlobClient, BlobStream};
use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_core::StatusCode;
use azure_storage::prelude::*;
use azure_storage::CloudLocation;
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use url::Url;

/// Default Azurite blob port
const EMULATOR_PORT: u16 = 10000;

/// Environment variables whose presence signals an ambient credential
pub const AMBIENT_ENV_VARS: [&str; 4] = [
    "AZURE_CLIENT_ID",
    "AZURE_FEDERATED_TOKEN_FILE",
    "IDENTITY_ENDPOINT",
    "MSI_ENDPOINT",
];

/// Texts that mark a failed name resolution of the account host
const LOOKUP_FAILURES: [&str; 4] = [
    "dns error",
    "failed to lookup address",
    "Name or service not known",
    "No such host is known",
];

/// Map Azure errors onto storage error kinds
///
/// HTTP failures are classified on status and service error code.
/// Transport failures are classified on their source chain, where reqwest
/// reports an unresolvable host.
fn classify(err: azure_core::Error, context: &str) -> StorageError {
    let http = match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => Some((*status, error_code.clone())),
        _ => None,
    };
    let detail = format!("{}: {}", context, err);

    if let Some((status, code)) = http {
        return match status {
            StatusCode::Conflict
                if matches!(
                    code.as_deref(),
                    None | Some("ContainerAlreadyExists" | "BlobAlreadyExists")
                ) =>
            {
                StorageError::already_exists(context)
            }
            StatusCode::NotFound => StorageError::not_found(context),
            StatusCode::Forbidden | StatusCode::Unauthorized => {
                StorageError::permission_denied(detail)
            }
            _ => other(err, detail),
        };
    }

    if matches!(err.kind(), ErrorKind::Io) {
        if source_chain_contains(&err, &LOOKUP_FAILURES) {
            StorageError::account_not_found(detail)
        } else {
            StorageError::transport(detail)
        }
    } else {
        other(err, detail)
    }
}

fn other(err: azure_core::Error, detail: String) -> StorageError {
    StorageError::Other(anyhow::Error::new(err).context(detail))
}

fn source_chain_contains(err: &azure_core::Error, needles: &[&str]) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string();
        if needles.iter().any(|needle| text.contains(needle)) {
            return true;
        }
        current = e.source();
    }
    false
}

fn block_id(index: usize) -> String {
    azure_core::base64::encode(format!("{:08}", index).into_bytes())
}

/// Cloud location for an endpoint URL
///
/// Loopback and IP hosts are treated as the emulator, the account's public
/// host as the public cloud, anything else as a custom endpoint.
fn location_for(account_name: &str, endpoint: &str) -> StorageResult<CloudLocation> {
    let url = Url::parse(endpoint)
        .map_err(|e| StorageError::backend(format!("invalid blob endpoint {}: {}", endpoint, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| StorageError::backend(format!("blob endpoint {} has no host", endpoint)))?;

    if host == "localhost" || host.parse::<IpAddr>().is_ok() {
        tracing::debug!("Using emulator blob endpoint: {}:{:?}", host, url.port());
        return Ok(CloudLocation::Emulator {
            address: host.to_string(),
            port: url.port().unwrap_or(EMULATOR_PORT),
        });
    }

    if host == format!("{}.{}", account_name, HOST_SUFFIX) {
        return Ok(CloudLocation::Public {
            account: account_name.to_string(),
        });
    }

    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    Ok(CloudLocation::Custom {
        account: account_name.to_string(),
        uri: base.as_str().trim_end_matches('/').to_string(),
    })
}

/// Azure Blob Storage client for one account
#[derive(Clone)]
pub struct AzureBlobClient {
    account_name: String,
    service: Arc<BlobServiceClient>,
}

impl fmt::Debug for AzureBlobClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobClient")
            .field("account_name", &self.account_name)
            .finish()
    }
}

impl AzureBlobClient {
    /// Build a client for a credential strategy
    pub fn from_strategy(strategy: &CredentialStrategy) -> StorageResult<Self> {
        let account_name = strategy.account_name().to_string();

        let (credentials, location) = match strategy {
            CredentialStrategy::ConnectionString { connection, .. } => {
                let credentials = match connection.credential() {
                    ConnectionCredential::SasToken(token) => StorageCredentials::sas_token(token)
                        .map_err(|e| classify(e, "connection string SAS"))?,
                    ConnectionCredential::SharedKey {
                        account_name,
                        account_key,
                    } => StorageCredentials::access_key(account_name, account_key),
                    ConnectionCredential::Anonymous => StorageCredentials::anonymous(),
                };
                let location = match connection.blob_endpoint() {
                    Some(endpoint) => location_for(&account_name, endpoint)?,
                    None => CloudLocation::Public {
                        account: account_name.clone(),
                    },
                };
                (credentials, location)
            }
            CredentialStrategy::SasToken {
                service_url, token, ..
            } => (
                StorageCredentials::sas_token(token.as_str()).map_err(|e| classify(e, "SAS token"))?,
                location_for(&account_name, service_url)?,
            ),
            CredentialStrategy::SharedKey { account_key, .. } => (
                StorageCredentials::access_key(account_name.clone(), account_key.clone()),
                CloudLocation::Public {
                    account: account_name.clone(),
                },
            ),
            CredentialStrategy::Ambient { .. } => {
                let credential = azure_identity::create_credential()
                    .map_err(|e| classify(e, "ambient credential"))?;
                (
                    StorageCredentials::token_credential(credential),
                    CloudLocation::Public {
                        account: account_name.clone(),
                    },
                )
            }
        };

        let service = ClientBuilder::with_location(location, credentials).blob_service_client();

        tracing::info!(
            "Created Azure blob client for account {} ({})",
            account_name,
            strategy.kind()
        );

        Ok(AzureBlobClient {
            account_name,
            service: Arc::new(service),
        })
    }

    fn blob_client(&self, container: &str, blob: &str) -> azure_storage_blobs::prelude::BlobClient {
        self.service.container_client(container).blob_client(blob)
    }
}

#[async_trait]
impl BlobClient for AzureBlobClient {
    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        let mut stream = self.service.list_containers().into_stream();
        let mut names = Vec::new();
        while let Some(page) = stream
            .try_next()
            .await
            .map_err(|e| classify(e, "list containers"))?
        {
            names.extend(page.containers.into_iter().map(|container| container.name));
        }
        tracing::debug!("Listed {} containers in {}", names.len(), self.account_name);
        Ok(names)
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        self.service
            .container_client(container)
            .exists()
            .await
            .map_err(|e| classify(e, container))
    }

    async fn create_container(&self, container: &str) -> StorageResult<()> {
        self.service
            .container_client(container)
            .create()
            .await
            .map_err(|e| classify(e, container))?;
        Ok(())
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        tracing::debug!(
            "Uploading {} bytes directly to {} in container {}",
            data.len(),
            blob,
            container
        );
        self.blob_client(container, blob)
            .put_block_blob(data)
            .content_type(content_type.to_string())
            .await
            .map_err(|e| classify(e, blob))?;
        Ok(())
    }

    async fn put_block(
        &self,
        container: &str,
        blob: &str,
        index: usize,
        data: Bytes,
    ) -> StorageResult<()> {
        let id = block_id(index);
        tracing::trace!(
            "Staging block {} ({} bytes) with block ID {}",
            index,
            data.len(),
            id
        );
        self.blob_client(container, blob)
            .put_block(id, data)
            .await
            .map_err(|e| classify(e, &format!("staging block {} of {}", index, blob)))?;
        Ok(())
    }

    async fn commit_blocks(
        &self,
        container: &str,
        blob: &str,
        block_count: usize,
        content_type: &str,
    ) -> StorageResult<()> {
        let block_list = BlockList {
            blocks: (0..block_count)
                .map(|index| BlobBlockType::new_uncommitted(block_id(index)))
                .collect(),
        };
        self.blob_client(container, blob)
            .put_block_list(block_list)
            .content_type(content_type.to_string())
            .await
            .map_err(|e| classify(e, &format!("committing {} blocks of {}", block_count, blob)))?;
        tracing::debug!("Committed {} blocks to {}", block_count, blob);
        Ok(())
    }

    async fn get_blob(&self, container: &str, blob: &str) -> StorageResult<BlobStream> {
        let context = format!("{}/{}", container, blob);
        let stream = self
            .blob_client(container, blob)
            .get()
            .into_stream()
            .and_then(|response| async move { response.data.collect().await })
            .map_err(move |e| classify(e, &context));
        Ok(stream.boxed())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()> {
        self.blob_client(container, blob)
            .delete()
            .await
            .map_err(|e| classify(e, &format!("{}/{}", container, blob)))?;
        Ok(())
    }
}

/// Builds [`AzureBlobClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureClientFactory;

impl AzureClientFactory {
    /// Create a factory
    pub fn new() -> Self {
        AzureClientFactory
    }
}

impl ClientFactory for AzureClientFactory {
    fn build(&self, strategy: &CredentialStrategy) -> StorageResult<Arc<dyn BlobClient>> {
        Ok(Arc::new(AzureBlobClient::from_strategy(strategy)?))
    }

    fn ambient_credential_available(&self) -> bool {
        AMBIENT_ENV_VARS
            .iter()
            .any(|name| std::env::var_os(name).is_some_and(|v| !v.is_empty()))
    }
}
