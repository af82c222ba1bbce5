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

//! Storage error types and utilities
//!
//! Two layers:
//!
//! - [`StorageError`]: a classified failure of one primitive call against
//!   the blob store (list, probe, create, put, get, delete)
//! - [`Error`]: what the storage service reports to its callers, naming the
//!   configuration field, container or object concerned

use std::fmt;
use std::io;
use stowage_config::ConfigError;
use thiserror::Error;

/// Result type alias for primitive storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for storage service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a primitive storage operation
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object or container not found in storage
    #[error("object not found: {0}")]
    NotFound(String),

    /// Permission denied for the requested operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The resource being created already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The storage account host does not resolve
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The request never reached the store (connection refused, reset, TLS failure)
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage backend rejected the request for another reason
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Operation exceeded the caller's deadline
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Operation was cancelled by the caller
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Transparent error delegation for wrapped error types
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Create a NotFound error with the given key
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        StorageError::NotFound(key.into())
    }

    /// Create a PermissionDenied error with context
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        StorageError::PermissionDenied(msg.into())
    }

    /// Create an AlreadyExists error with context
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        StorageError::AlreadyExists(msg.into())
    }

    /// Create an AccountNotFound error with context
    pub fn account_not_found<S: Into<String>>(msg: S) -> Self {
        StorageError::AccountNotFound(msg.into())
    }

    /// Create a Transport error with context
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        StorageError::Transport(msg.into())
    }

    /// Create a Backend error with context
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        StorageError::Backend(msg.into())
    }

    /// Create a Timeout error with context
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        StorageError::Timeout(msg.into())
    }

    /// Create a Cancelled error with context
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        StorageError::Cancelled(msg.into())
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Check if this is a PermissionDenied error
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StorageError::PermissionDenied(_))
    }

    /// Check if this is an AlreadyExists error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }

    /// Check if the caller interrupted the operation (cancellation or deadline)
    pub fn is_interrupted(&self) -> bool {
        matches!(self, StorageError::Cancelled(_) | StorageError::Timeout(_))
    }
}

/// Why the store could not be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCause {
    /// The account host does not exist
    AccountNotFound,
    /// The credential was refused
    AccessDenied,
    /// The store could not be reached
    Transport,
    /// The caller cancelled the operation or its deadline passed
    Interrupted,
    /// Anything else the store reported
    Other,
}

impl AccessCause {
    /// Classify a primitive failure
    pub fn of(err: &StorageError) -> Self {
        match err {
            StorageError::AccountNotFound(_) => AccessCause::AccountNotFound,
            StorageError::PermissionDenied(_) => AccessCause::AccessDenied,
            StorageError::Transport(_) | StorageError::Io(_) => AccessCause::Transport,
            StorageError::Cancelled(_) | StorageError::Timeout(_) => AccessCause::Interrupted,
            _ => AccessCause::Other,
        }
    }
}

impl fmt::Display for AccessCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessCause::AccountNotFound => "account not found",
            AccessCause::AccessDenied => "access denied",
            AccessCause::Transport => "transport failure",
            AccessCause::Interrupted => "interrupted",
            AccessCause::Other => "storage error",
        };
        f.write_str(name)
    }
}

/// Errors reported by the storage service
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration; never retried
    #[error("Error encountered: {0}")]
    Configuration(#[from] ConfigError),

    /// The upload request is incomplete
    #[error("{field} must be provided")]
    InvalidRequest {
        /// The missing request field (`name`, `content` or `size`)
        field: &'static str,
    },

    /// A URL does not decode into an account, container and blob
    #[error("Malformed storage locator {url:?}: {reason}")]
    MalformedLocator {
        /// The rejected URL
        url: String,
        /// What is wrong with it
        reason: String,
    },

    /// The store refused or could not serve the request
    #[error("{message}")]
    StorageAccess {
        /// Classification of the failure
        cause: AccessCause,
        /// Operator-facing message naming the field to check
        message: String,
        /// Underlying failure
        #[source]
        source: StorageError,
    },

    /// Writing the object failed
    #[error("Failed to upload blob \"{name}\": {source}")]
    Upload {
        /// Object name
        name: String,
        /// Underlying failure
        #[source]
        source: StorageError,
    },

    /// Reading the object failed
    #[error("Failed to download blob \"{name}\": {source}")]
    Download {
        /// Object name
        name: String,
        /// Underlying failure
        #[source]
        source: StorageError,
    },

    /// Deleting the object failed
    #[error("Failed to delete blob \"{name}\": {source}")]
    Delete {
        /// Object name
        name: String,
        /// Underlying failure
        #[source]
        source: StorageError,
    },
}

impl Error {
    /// Create a MalformedLocator error
    pub fn malformed_locator(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedLocator {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Classification of a StorageAccess error
    pub fn access_cause(&self) -> Option<AccessCause> {
        match self {
            Error::StorageAccess { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// The underlying primitive failure, if any
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Error::StorageAccess { source, .. }
            | Error::Upload { source, .. }
            | Error::Download { source, .. }
            | Error::Delete { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if the caller cancelled the operation or its deadline passed
    pub fn is_interrupted(&self) -> bool {
        self.storage_error().is_some_and(StorageError::is_interrupted)
    }
}
