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

//! Cancellation and deadline for one logical operation
//!
//! A guard is created when an operation starts and every primitive call the
//! operation makes runs through it, so the deadline covers the whole
//! operation rather than each call.

use crate::error::{StorageError, StorageResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs primitive calls under a shared cancellation token and deadline
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl OperationGuard {
    /// A guard that never interrupts
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A guard observing `token` and expiring `timeout` from now
    pub fn new(token: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        OperationGuard {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Whether the operation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run `fut`, failing with `Cancelled` or `Timeout` when interrupted
    ///
    /// `what` names the primitive call in the error.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        if self.is_cancelled() {
            return Err(StorageError::cancelled(what));
        }

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .unwrap_or_else(|_| Err(StorageError::timeout(what))),
                None => fut.await,
            }
        };

        match &self.token {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(StorageError::cancelled(what)),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }
}
