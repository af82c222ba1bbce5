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

//! Object operations
//!
//! [`StorageService`] uploads, downloads and deletes objects. Each call
//! merges its [`OperationOptions::overrides`] with the service-level
//! configuration, resolves a client, and runs every primitive call under one
//! [`OperationGuard`] built from the options.

use crate::error::{Error, Result, StorageResult};
use crate::guard::OperationGuard;
use crate::locator::{decode, encode, resolve_service_url, ServiceUrlProvider};
use crate::provision::ensure_container;
use crate::resolver::{ClientFactory, ClientResolver, ResolvedClient};
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stowage_config::{ConfigError, ConfigField, ConfigSource, StorageConfiguration, StorageOverride};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

/// Block size for streamed uploads (4 MiB)
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Content type used when the request declares none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content of an upload
pub enum UploadContent {
    /// Whole content in memory
    Buffer(Bytes),
    /// Content read from a stream until end of file
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for UploadContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadContent::Buffer(data) => f.debug_tuple("Buffer").field(&data.len()).finish(),
            UploadContent::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An object to upload
#[derive(Debug)]
pub struct UploadRequest {
    /// Object name; may contain `/`
    pub name: String,
    /// Content
    pub content: Option<UploadContent>,
    /// Declared content length in bytes
    pub size: u64,
    /// Declared content type
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Upload an in-memory buffer
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        UploadRequest {
            name: name.into(),
            size: data.len() as u64,
            content: Some(UploadContent::Buffer(data)),
            content_type: None,
        }
    }

    /// Upload from a reader of `size` bytes
    pub fn from_reader<R>(name: impl Into<String>, reader: R, size: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        UploadRequest {
            name: name.into(),
            content: Some(UploadContent::Stream(Box::new(reader))),
            size,
            content_type: None,
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The declared content type, or `application/octet-stream`
    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Check that name, content and size are all present
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRequest { field: "name" });
        }
        if self.content.is_none() {
            return Err(Error::InvalidRequest { field: "content" });
        }
        if self.size == 0 {
            return Err(Error::InvalidRequest { field: "size" });
        }
        Ok(())
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    /// Configuration overrides for this call
    pub overrides: StorageOverride,
    /// Cancels the whole operation when triggered
    pub cancellation: Option<CancellationToken>,
    /// Deadline for the whole operation
    pub timeout: Option<Duration>,
}

impl OperationOptions {
    /// Options with no overrides, no cancellation and no timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `overrides` for this call
    pub fn with_overrides(mut self, overrides: StorageOverride) -> Self {
        self.overrides = overrides;
        self
    }

    /// Observe `token`
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Bound the whole operation by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// A guard whose deadline starts now
    pub fn guard(&self) -> OperationGuard {
        OperationGuard::new(self.cancellation.clone(), self.timeout)
    }
}

/// Uploads, downloads and deletes objects in Azure Blob storage
#[derive(Debug)]
pub struct StorageService {
    resolver: ClientResolver,
}

impl StorageService {
    /// Create a service for `config`, building clients with `factory`
    pub fn new(config: StorageConfiguration, factory: Arc<dyn ClientFactory>) -> Self {
        StorageService {
            resolver: ClientResolver::new(config, factory),
        }
    }

    /// Create a service from a configuration source, which is read once
    pub async fn from_source(
        source: &dyn ConfigSource,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<Self> {
        let config = source.load().await?;
        Ok(Self::new(config, factory))
    }

    /// Create a service talking to Azure
    #[cfg(feature = "azure")]
    pub fn azure(config: StorageConfiguration) -> Self {
        Self::new(config, Arc::new(crate::azure::AzureClientFactory::new()))
    }

    /// Build SAS service URLs with `provider` instead of the public endpoint
    pub fn with_service_url_provider(mut self, provider: ServiceUrlProvider) -> Self {
        self.resolver = self.resolver.with_service_url_provider(provider);
        self
    }

    /// The service-level configuration
    pub fn configuration(&self) -> &StorageConfiguration {
        self.resolver.service_config()
    }

    /// Upload an object and return its URL
    ///
    /// The request is validated before any network call. The target
    /// container is created when missing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] when name, content or size is missing
    /// - [`Error::Configuration`] when the merged configuration is unusable
    ///   or names no container
    /// - [`Error::StorageAccess`] when the container cannot be checked or created
    /// - [`Error::Upload`] when writing the object fails
    #[instrument(skip_all, fields(name = %request.name, size = request.size))]
    pub async fn upload(&self, request: UploadRequest, options: &OperationOptions) -> Result<String> {
        request.validate()?;

        let config = self.resolver.merge(&options.overrides)?;
        let container = config
            .container_name()
            .ok_or_else(|| ConfigError::missing(ConfigField::ContainerName.as_str()))?
            .to_string();

        let guard = options.guard();
        let client = self.resolver.resolve(&config).await?;
        ensure_container(&client, &container, &guard).await?;

        let content_type = request.content_type().to_string();
        let UploadRequest { name, content, .. } = request;
        let content = content.ok_or(Error::InvalidRequest { field: "content" })?;

        write_blob(&client, &container, &name, content, &content_type, &guard)
            .await
            .map_err(|source| Error::Upload {
                name: name.clone(),
                source,
            })?;

        let url = encode(client.account_name(), &container, &name);
        info!(container = %container, url = %url, "Uploaded blob");
        Ok(url)
    }

    /// Download the object at `url` into memory
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedLocator`] when `url` is not an object URL
    /// - [`Error::Configuration`] when the merged configuration is unusable
    /// - [`Error::Download`] when the object cannot be read
    #[instrument(skip(self, options))]
    pub async fn download(&self, url: &str, options: &OperationOptions) -> Result<Bytes> {
        let locator = decode(url)?;
        let client = self.client_for_account(&locator.account_name, options).await?;
        let guard = options.guard();

        let data = read_blob(&client, &locator.container_name, &locator.blob_name, &guard)
            .await
            .map_err(|source| Error::Download {
                name: locator.blob_name.clone(),
                source,
            })?;

        debug!(bytes = data.len(), "Downloaded blob");
        Ok(data)
    }

    /// Delete the object at `url`
    ///
    /// Deleting an object that does not exist succeeds, so repeated deletes
    /// return the same `Ok(true)`.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedLocator`] when `url` is not an object URL
    /// - [`Error::Configuration`] when the merged configuration is unusable
    /// - [`Error::Delete`] when the store refuses the deletion
    #[instrument(skip(self, options))]
    pub async fn delete(&self, url: &str, options: &OperationOptions) -> Result<bool> {
        let locator = decode(url)?;
        let client = self.client_for_account(&locator.account_name, options).await?;
        let guard = options.guard();

        match guard
            .run(
                "delete blob",
                client
                    .client()
                    .delete_blob(&locator.container_name, &locator.blob_name),
            )
            .await
        {
            Ok(()) => info!("Deleted blob"),
            Err(err) if err.is_not_found() => debug!("Blob already absent"),
            Err(source) => {
                return Err(Error::Delete {
                    name: locator.blob_name,
                    source,
                })
            }
        }
        Ok(true)
    }

    /// Service URL of the merged configuration, with its SAS appended when present
    pub fn get_service_url(&self, options: &OperationOptions) -> Result<String> {
        let config = self.resolver.merge(&options.overrides)?;
        let url = resolve_service_url(
            config.account_name(),
            config.sas_key(),
            config.container_name(),
            self.resolver.service_url_provider(),
        )?;
        Ok(url)
    }

    async fn client_for_account(
        &self,
        account_name: &str,
        options: &OperationOptions,
    ) -> Result<Arc<ResolvedClient>> {
        let overrides = options.overrides.clone().with_account_name(account_name);
        let config = self.resolver.merge(&overrides)?;
        self.resolver.resolve(&config).await
    }
}

async fn write_blob(
    client: &ResolvedClient,
    container: &str,
    name: &str,
    content: UploadContent,
    content_type: &str,
    guard: &OperationGuard,
) -> StorageResult<()> {
    let blob = client.client();
    let mut reader = match content {
        UploadContent::Buffer(data) => {
            return guard
                .run("put blob", blob.put_blob(container, name, data, content_type))
                .await
        }
        UploadContent::Stream(reader) => reader,
    };

    let mut pending = guard.run("read chunk", read_chunk(&mut reader)).await?;
    let mut next = if pending.len() == CHUNK_SIZE {
        guard.run("read chunk", read_chunk(&mut reader)).await?
    } else {
        Bytes::new()
    };

    if next.is_empty() {
        return guard
            .run("put blob", blob.put_blob(container, name, pending, content_type))
            .await;
    }

    let mut block_count = 0;
    loop {
        trace!(block = block_count, bytes = pending.len(), "Staging block");
        guard
            .run("put block", blob.put_block(container, name, block_count, pending))
            .await?;
        block_count += 1;
        if next.is_empty() {
            break;
        }
        pending = next;
        next = if pending.len() == CHUNK_SIZE {
            guard.run("read chunk", read_chunk(&mut reader)).await?
        } else {
            Bytes::new()
        };
    }

    debug!(blocks = block_count, "Committing block list");
    guard
        .run(
            "commit blocks",
            blob.commit_blocks(container, name, block_count, content_type),
        )
        .await
}

/// Read up to [`CHUNK_SIZE`] bytes; shorter only at end of stream
async fn read_chunk<R>(reader: &mut R) -> StorageResult<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut filled = 0;
    while filled < CHUNK_SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

async fn read_blob(
    client: &ResolvedClient,
    container: &str,
    name: &str,
    guard: &OperationGuard,
) -> StorageResult<Bytes> {
    let mut stream = guard
        .run("get blob", client.client().get_blob(container, name))
        .await?;

    let mut data = BytesMut::new();
    while let Some(chunk) = guard.run("read chunk", stream.try_next()).await? {
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}
