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

//! In-memory blob store for testing
//!
//! [`MemoryBlobStore`] implements [`BlobClient`](crate::BlobClient) over
//! `Arc<RwLock<..>>` state. Every primitive call is appended to an operation
//! log before anything else happens, and faults can be injected per call
//! kind to exercise the degraded and failing paths.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use stowage_storage::mock::{Fault, FaultPoint, MemoryBlobStore};
//! use stowage_storage::BlobClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MemoryBlobStore::new();
//!     store.create("c1").await;
//!     store.put_blob("c1", "a.txt", Bytes::from_static(b"hi"), "text/plain").await?;
//!
//!     store.inject(FaultPoint::ListContainers, Fault::PermissionDenied).await;
//!     assert!(store.list_containers().await.is_err());
//!     assert!(store.container_exists("c1").await?);
//!     Ok(())
//! }
//! ```

use crate::credential::{CredentialStrategy, StrategyKind};
use crate::error::{StorageError, StorageResult};
use crate::resolver::ClientFactory;
use crate::{BlobClient, BlobStream};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

const READ_CHUNK: usize = 64 * 1024;

/// Kind of primitive call a fault is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `list_containers`
    ListContainers,
    /// `container_exists`
    ProbeContainer,
    /// `create_container`
    CreateContainer,
    /// `put_blob`
    PutBlob,
    /// `put_block`
    PutBlock,
    /// `commit_blocks`
    CommitBlocks,
    /// `get_blob`
    GetBlob,
    /// `delete_blob`
    DeleteBlob,
}

/// Failure returned at a fault point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Credential refused
    PermissionDenied,
    /// Account host does not resolve
    AccountNotFound,
    /// Resource already exists
    AlreadyExists,
    /// Resource missing
    NotFound,
    /// Connection failure
    Transport,
}

impl Fault {
    fn to_error(self, what: &str) -> StorageError {
        match self {
            Fault::PermissionDenied => StorageError::permission_denied(what),
            Fault::AccountNotFound => StorageError::account_not_found(what),
            Fault::AlreadyExists => StorageError::already_exists(what),
            Fault::NotFound => StorageError::not_found(what),
            Fault::Transport => StorageError::transport(what),
        }
    }
}

/// A recorded primitive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Container enumeration
    ListContainers,
    /// Direct existence check
    ProbeContainer(String),
    /// Container creation
    CreateContainer(String),
    /// Single-request write
    PutBlob {
        /// Container
        container: String,
        /// Object name
        blob: String,
        /// Content length
        size: usize,
    },
    /// Block staging
    PutBlock {
        /// Container
        container: String,
        /// Object name
        blob: String,
        /// Block number
        index: usize,
    },
    /// Block list commit
    CommitBlocks {
        /// Container
        container: String,
        /// Object name
        blob: String,
        /// Number of blocks
        block_count: usize,
    },
    /// Read
    GetBlob {
        /// Container
        container: String,
        /// Object name
        blob: String,
    },
    /// Delete
    DeleteBlob {
        /// Container
        container: String,
        /// Object name
        blob: String,
    },
}

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Content
    pub data: Bytes,
    /// Content type recorded at write time
    pub content_type: String,
}

#[derive(Default)]
struct State {
    containers: BTreeMap<String, BTreeMap<String, StoredBlob>>,
    staged: HashMap<(String, String), BTreeMap<usize, Bytes>>,
    operations: Vec<Operation>,
    faults: HashMap<FaultPoint, Fault>,
    latency: Option<Duration>,
}

/// In-memory blob store with fault injection and an operation log
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    state: Arc<RwLock<State>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container without recording an operation
    pub async fn create(&self, container: &str) {
        self.state
            .write()
            .await
            .containers
            .entry(container.to_string())
            .or_default();
    }

    /// Store an object without recording an operation
    pub async fn insert(&self, container: &str, blob: &str, data: impl Into<Bytes>) {
        self.state
            .write()
            .await
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                blob.to_string(),
                StoredBlob {
                    data: data.into(),
                    content_type: "application/octet-stream".to_string(),
                },
            );
    }

    /// Look up an object
    pub async fn blob(&self, container: &str, blob: &str) -> Option<StoredBlob> {
        self.state
            .read()
            .await
            .containers
            .get(container)
            .and_then(|blobs| blobs.get(blob))
            .cloned()
    }

    /// Names of all containers, sorted
    pub async fn containers(&self) -> Vec<String> {
        self.state.read().await.containers.keys().cloned().collect()
    }

    /// All primitive calls made so far, oldest first
    pub async fn operations(&self) -> Vec<Operation> {
        self.state.read().await.operations.clone()
    }

    /// Forget recorded operations
    pub async fn clear_operations(&self) {
        self.state.write().await.operations.clear();
    }

    /// Fail every call at `point` with `fault` until cleared
    pub async fn inject(&self, point: FaultPoint, fault: Fault) {
        self.state.write().await.faults.insert(point, fault);
    }

    /// Remove all injected faults
    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Delay every primitive call by `latency`
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = Some(latency);
    }

    /// Record `op`, apply latency, then return the injected fault for `point`, if any
    async fn enter(&self, op: Operation, point: FaultPoint, what: &str) -> StorageResult<()> {
        let (latency, fault) = {
            let mut state = self.state.write().await;
            state.operations.push(op);
            (state.latency, state.faults.get(&point).copied())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match fault {
            Some(fault) => Err(fault.to_error(what)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlobStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl BlobClient for MemoryBlobStore {
    async fn list_containers(&self) -> StorageResult<Vec<String>> {
        self.enter(Operation::ListContainers, FaultPoint::ListContainers, "list containers")
            .await?;
        Ok(self.containers().await)
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        self.enter(
            Operation::ProbeContainer(container.to_string()),
            FaultPoint::ProbeContainer,
            container,
        )
        .await?;
        Ok(self.state.read().await.containers.contains_key(container))
    }

    async fn create_container(&self, container: &str) -> StorageResult<()> {
        if let Err(err) = self
            .enter(
                Operation::CreateContainer(container.to_string()),
                FaultPoint::CreateContainer,
                container,
            )
            .await
        {
            // An injected AlreadyExists means another creator won the race.
            if err.is_already_exists() {
                self.create(container).await;
            }
            return Err(err);
        }
        let mut state = self.state.write().await;
        if state.containers.contains_key(container) {
            return Err(StorageError::already_exists(container));
        }
        state.containers.insert(container.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.enter(
            Operation::PutBlob {
                container: container.to_string(),
                blob: blob.to_string(),
                size: data.len(),
            },
            FaultPoint::PutBlob,
            blob,
        )
        .await?;
        let mut state = self.state.write().await;
        let blobs = state
            .containers
            .get_mut(container)
            .ok_or_else(|| StorageError::not_found(container))?;
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn put_block(
        &self,
        container: &str,
        blob: &str,
        index: usize,
        data: Bytes,
    ) -> StorageResult<()> {
        self.enter(
            Operation::PutBlock {
                container: container.to_string(),
                blob: blob.to_string(),
                index,
            },
            FaultPoint::PutBlock,
            blob,
        )
        .await?;
        let mut state = self.state.write().await;
        if !state.containers.contains_key(container) {
            return Err(StorageError::not_found(container));
        }
        state
            .staged
            .entry((container.to_string(), blob.to_string()))
            .or_default()
            .insert(index, data);
        Ok(())
    }

    async fn commit_blocks(
        &self,
        container: &str,
        blob: &str,
        block_count: usize,
        content_type: &str,
    ) -> StorageResult<()> {
        self.enter(
            Operation::CommitBlocks {
                container: container.to_string(),
                blob: blob.to_string(),
                block_count,
            },
            FaultPoint::CommitBlocks,
            blob,
        )
        .await?;
        let mut state = self.state.write().await;
        let staged = state
            .staged
            .remove(&(container.to_string(), blob.to_string()))
            .unwrap_or_default();

        let mut data = BytesMut::new();
        for index in 0..block_count {
            let block = staged
                .get(&index)
                .ok_or_else(|| StorageError::backend(format!("block {} of {} not staged", index, blob)))?;
            data.extend_from_slice(block);
        }

        let blobs = state
            .containers
            .get_mut(container)
            .ok_or_else(|| StorageError::not_found(container))?;
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                data: data.freeze(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_blob(&self, container: &str, blob: &str) -> StorageResult<BlobStream> {
        self.enter(
            Operation::GetBlob {
                container: container.to_string(),
                blob: blob.to_string(),
            },
            FaultPoint::GetBlob,
            blob,
        )
        .await?;
        let stored = self
            .blob(container, blob)
            .await
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", container, blob)))?;

        let data = stored.data;
        let chunks: Vec<StorageResult<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK).min(data.len()))))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()> {
        self.enter(
            Operation::DeleteBlob {
                container: container.to_string(),
                blob: blob.to_string(),
            },
            FaultPoint::DeleteBlob,
            blob,
        )
        .await?;
        let mut state = self.state.write().await;
        state
            .containers
            .get_mut(container)
            .and_then(|blobs| blobs.remove(blob))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", container, blob)))
    }
}

/// Hands out clients backed by one shared [`MemoryBlobStore`]
///
/// Records the strategy kind of every client it builds.
#[derive(Debug, Clone, Default)]
pub struct MemoryClientFactory {
    store: MemoryBlobStore,
    ambient: bool,
    fail_builds: bool,
    built: Arc<Mutex<Vec<StrategyKind>>>,
}

impl MemoryClientFactory {
    /// A factory over a fresh store, with no ambient credential
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory over an existing store
    pub fn with_store(store: MemoryBlobStore) -> Self {
        MemoryClientFactory {
            store,
            ..Self::default()
        }
    }

    /// Pretend an ambient credential is (or is not) available
    pub fn with_ambient(mut self, ambient: bool) -> Self {
        self.ambient = ambient;
        self
    }

    /// Make every client construction fail
    pub fn failing_builds(mut self) -> Self {
        self.fail_builds = true;
        self
    }

    /// The shared store
    pub fn store(&self) -> MemoryBlobStore {
        self.store.clone()
    }

    /// Strategy kinds of all clients built so far
    pub fn built(&self) -> Vec<StrategyKind> {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ClientFactory for MemoryClientFactory {
    fn build(&self, strategy: &CredentialStrategy) -> StorageResult<Arc<dyn BlobClient>> {
        if self.fail_builds {
            return Err(StorageError::backend(format!(
                "cannot build {} client",
                strategy.kind()
            )));
        }
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(strategy.kind());
        Ok(Arc::new(self.store.clone()))
    }

    fn ambient_credential_available(&self) -> bool {
        self.ambient
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryBlobStore::new();
        store.create("c1").await;
        store
            .put_blob("c1", "a.txt", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();

        let chunks: Vec<Bytes> = store.get_blob("c1", "a.txt").await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello");
        assert_eq!(store.blob("c1", "a.txt").await.unwrap().content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_put_into_missing_container_fails() {
        let store = MemoryBlobStore::new();
        let err = store
            .put_blob("nope", "a.txt", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_blocks_commit_in_order() {
        let store = MemoryBlobStore::new();
        store.create("c1").await;
        store.put_block("c1", "big", 1, Bytes::from_static(b"world")).await.unwrap();
        store.put_block("c1", "big", 0, Bytes::from_static(b"hello ")).await.unwrap();
        store.commit_blocks("c1", "big", 2, "text/plain").await.unwrap();

        assert_eq!(&store.blob("c1", "big").await.unwrap().data[..], b"hello world");
    }

    #[tokio::test]
    async fn test_commit_with_missing_block_fails() {
        let store = MemoryBlobStore::new();
        store.create("c1").await;
        store.put_block("c1", "big", 0, Bytes::from_static(b"a")).await.unwrap();
        assert!(store.commit_blocks("c1", "big", 2, "text/plain").await.is_err());
    }

    #[tokio::test]
    async fn test_create_existing_container() {
        let store = MemoryBlobStore::new();
        store.create_container("c1").await.unwrap();
        assert!(store.create_container("c1").await.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryBlobStore::new();
        store.create("c1").await;
        assert!(store.delete_blob("c1", "ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_faults_and_operation_log() {
        let store = MemoryBlobStore::new();
        store.inject(FaultPoint::ListContainers, Fault::Transport).await;
        assert!(matches!(
            store.list_containers().await,
            Err(StorageError::Transport(_))
        ));
        assert_eq!(store.operations().await, vec![Operation::ListContainers]);

        store.clear_faults().await;
        store.clear_operations().await;
        assert!(store.list_containers().await.unwrap().is_empty());
    }

    #[test]
    fn test_factory_records_strategies() {
        let factory = MemoryClientFactory::new();
        factory
            .build(&CredentialStrategy::Ambient {
                account_name: "acct".to_string(),
            })
            .unwrap();
        assert_eq!(factory.built(), vec![StrategyKind::Ambient]);
    }
}
