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

//! Azure Blob storage access for Stowage
//!
//! This crate turns a storage configuration into uploads, downloads and
//! deletes of named objects, each addressed by a public URL.
//!
//! # Architecture
//!
//! - [`credential`]: picks one credential strategy (connection string, SAS,
//!   shared key or ambient) for a merged configuration
//! - [`resolver`]: builds blob clients through a [`ClientFactory`] and caches
//!   the one for the service-level configuration
//! - [`locator`]: encodes and decodes object URLs
//! - [`provision`]: makes sure the target container exists
//! - [`service`]: the [`StorageService`] callers use
//!
//! The [`BlobClient`] trait is the seam between this logic and the store. The
//! `azure` feature provides the Azure SDK implementation; [`mock`] provides an
//! in-memory one for tests.
//!
//! # Examples
//!
//! ```no_run
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use stowage_config::StorageConfiguration;
//! use stowage_storage::mock::MemoryClientFactory;
//! use stowage_storage::{OperationOptions, StorageService, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc");
//!     let service = StorageService::new(config, Arc::new(MemoryClientFactory::new()));
//!     let options = OperationOptions::default();
//!
//!     let url = service
//!         .upload(UploadRequest::from_bytes("test.txt", Bytes::from_static(b"test")), &options)
//!         .await?;
//!     assert_eq!(url, "https://acct.blob.core.windows.net/c1/test.txt");
//!
//!     let data = service.download(&url, &options).await?;
//!     assert_eq!(&data[..], b"test");
//!
//!     service.delete(&url, &options).await?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "azure")]
pub mod azure;
pub mod connection_string;
pub mod credential;
pub mod error;
pub mod guard;
pub mod locator;
pub mod mock;
pub mod provision;
pub mod resolver;
pub mod service;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt::Debug;

#[cfg(feature = "azure")]
pub use azure::{AzureBlobClient, AzureClientFactory};
pub use credential::{select_strategy, CredentialStrategy, StrategyKind};
pub use error::{AccessCause, Error, Result, StorageError, StorageResult};
pub use guard::OperationGuard;
pub use locator::{build_service_url, decode, encode, ObjectLocator, ServiceUrlProvider};
pub use provision::{container_exists, ensure_container, Provisioned};
pub use resolver::{ClientFactory, ClientResolver, ResolvedClient};
pub use service::{OperationOptions, StorageService, UploadContent, UploadRequest, CHUNK_SIZE};

/// Stream of object content chunks
pub type BlobStream = BoxStream<'static, StorageResult<Bytes>>;

/// Primitive operations against a blob store account
///
/// Implementations classify failures into [`StorageError`] variants:
/// `PermissionDenied` for refused credentials, `AccountNotFound` when the
/// account host does not resolve, `AlreadyExists` when creating an existing
/// container, `NotFound` for missing containers or objects.
#[async_trait]
pub trait BlobClient: Send + Sync + Debug {
    /// Names of all containers visible to the credential
    async fn list_containers(&self) -> StorageResult<Vec<String>>;

    /// Whether one container exists
    async fn container_exists(&self, container: &str) -> StorageResult<bool>;

    /// Create a container
    ///
    /// Fails with [`StorageError::AlreadyExists`] when it already exists.
    async fn create_container(&self, container: &str) -> StorageResult<()>;

    /// Write an object in a single request
    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Stage block number `index` of an object
    async fn put_block(
        &self,
        container: &str,
        blob: &str,
        index: usize,
        data: Bytes,
    ) -> StorageResult<()>;

    /// Commit staged blocks `0..block_count` as the object content
    async fn commit_blocks(
        &self,
        container: &str,
        blob: &str,
        block_count: usize,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Open an object for reading
    async fn get_blob(&self, container: &str, blob: &str) -> StorageResult<BlobStream>;

    /// Delete an object
    ///
    /// Fails with [`StorageError::NotFound`] when the object does not exist.
    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _check_object_safe(_: &dyn BlobClient) {}
        fn _check_factory_object_safe(_: &dyn ClientFactory) {}
    }
}
