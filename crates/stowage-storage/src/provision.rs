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

//! Container provisioning
//!
//! Existence is checked by listing every container the credential can see.
//! Credentials scoped to a single container (typically a container SAS) are
//! refused the listing; for those the container is probed directly.

use crate::error::{AccessCause, Error, Result, StorageError};
use crate::guard::OperationGuard;
use crate::resolver::ResolvedClient;
use stowage_config::ConfigField;
use tracing::{debug, info, warn};

/// Outcome of [`ensure_container`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The container was already there
    Existing,
    /// The container was created by this call
    Created,
}

/// Build the error reported when the store refuses or fails a request
pub(crate) fn access_error(client: &ResolvedClient, container: &str, source: StorageError) -> Error {
    let cause = AccessCause::of(&source);
    let account = client.account_name();
    let message = match cause {
        AccessCause::AccountNotFound => format!(
            "Account not found: \"{}\". Please check your \"{}\" value.",
            account,
            ConfigField::AccountName
        ),
        AccessCause::AccessDenied => format!(
            "Access denied for container \"{}\" in account \"{}\". Please check your \"{}\" value.",
            container,
            account,
            client.credential_field()
        ),
        AccessCause::Transport => format!(
            "Could not reach account \"{}\": {}",
            account, source
        ),
        AccessCause::Interrupted => format!(
            "Access to container \"{}\" was interrupted: {}",
            container, source
        ),
        AccessCause::Other => format!(
            "Failed to access container \"{}\" in account \"{}\": {}",
            container, account, source
        ),
    };
    Error::StorageAccess {
        cause,
        message,
        source,
    }
}

/// Whether `container` exists
///
/// Lists all containers and looks for the target. When listing is denied,
/// logs a warning and probes the container directly instead.
pub async fn container_exists(
    client: &ResolvedClient,
    container: &str,
    guard: &OperationGuard,
) -> Result<bool> {
    match guard
        .run("list containers", client.client().list_containers())
        .await
    {
        Ok(names) => Ok(names.iter().any(|name| name == container)),
        Err(err) if err.is_permission_denied() => {
            warn!(
                account = client.account_name(),
                container,
                "Listing containers is not permitted; probing the container directly"
            );
            guard
                .run("probe container", client.client().container_exists(container))
                .await
                .map_err(|source| access_error(client, container, source))
        }
        Err(source) => Err(access_error(client, container, source)),
    }
}

/// Make sure `container` exists, creating it if needed
///
/// A creation that fails because another caller created the container in
/// the meantime counts as success.
pub async fn ensure_container(
    client: &ResolvedClient,
    container: &str,
    guard: &OperationGuard,
) -> Result<Provisioned> {
    if container_exists(client, container, guard).await? {
        debug!(account = client.account_name(), container, "Container exists");
        return Ok(Provisioned::Existing);
    }

    match guard
        .run("create container", client.client().create_container(container))
        .await
    {
        Ok(()) => {
            info!(account = client.account_name(), container, "Created container");
            Ok(Provisioned::Created)
        }
        Err(err) if err.is_already_exists() => {
            debug!(
                account = client.account_name(),
                container, "Container was created concurrently"
            );
            Ok(Provisioned::Existing)
        }
        Err(source) => Err(access_error(client, container, source)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{Fault, FaultPoint, MemoryClientFactory, Operation};
    use crate::resolver::{ClientFactory, ClientResolver};
    use std::sync::Arc;
    use stowage_config::{StorageConfiguration, StorageOverride};

    async fn client_for(factory: &Arc<MemoryClientFactory>) -> Arc<ResolvedClient> {
        let dyn_factory: Arc<dyn ClientFactory> = Arc::<MemoryClientFactory>::clone(factory);
        let resolver = ClientResolver::new(
            StorageConfiguration::new("acct", "c1").with_sas_key("sv=abc"),
            dyn_factory,
        );
        let config = resolver.merge(&StorageOverride::new()).unwrap();
        resolver.resolve(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_creates_missing_container() {
        let factory = Arc::new(MemoryClientFactory::new());
        let client = client_for(&factory).await;
        let guard = OperationGuard::unbounded();

        let outcome = ensure_container(&client, "c1", &guard).await.unwrap();
        assert_eq!(outcome, Provisioned::Created);

        let again = ensure_container(&client, "c1", &guard).await.unwrap();
        assert_eq!(again, Provisioned::Existing);
    }

    #[tokio::test]
    async fn test_listing_denied_falls_back_to_probe() {
        let factory = Arc::new(MemoryClientFactory::new());
        let store = factory.store();
        store.create("c1").await;
        store.inject(FaultPoint::ListContainers, Fault::PermissionDenied).await;
        let client = client_for(&factory).await;

        let outcome = ensure_container(&client, "c1", &OperationGuard::unbounded())
            .await
            .unwrap();
        assert_eq!(outcome, Provisioned::Existing);
        assert!(store
            .operations()
            .await
            .contains(&Operation::ProbeContainer("c1".to_string())));
    }

    #[tokio::test]
    async fn test_concurrent_create_is_success() {
        let factory = Arc::new(MemoryClientFactory::new());
        factory
            .store()
            .inject(FaultPoint::CreateContainer, Fault::AlreadyExists)
            .await;
        let client = client_for(&factory).await;

        let outcome = ensure_container(&client, "c1", &OperationGuard::unbounded())
            .await
            .unwrap();
        assert_eq!(outcome, Provisioned::Existing);
    }

    #[tokio::test]
    async fn test_unknown_account_is_reported() {
        let factory = Arc::new(MemoryClientFactory::new());
        factory
            .store()
            .inject(FaultPoint::ListContainers, Fault::AccountNotFound)
            .await;
        let client = client_for(&factory).await;

        let err = ensure_container(&client, "c1", &OperationGuard::unbounded())
            .await
            .unwrap_err();
        assert_eq!(err.access_cause(), Some(AccessCause::AccountNotFound));
        assert_eq!(
            err.to_string(),
            "Account not found: \"acct\". Please check your \"account_name\" value."
        );
    }

    #[tokio::test]
    async fn test_denied_probe_names_sas_key() {
        let factory = Arc::new(MemoryClientFactory::new());
        let store = factory.store();
        store.inject(FaultPoint::ListContainers, Fault::PermissionDenied).await;
        store.inject(FaultPoint::ProbeContainer, Fault::PermissionDenied).await;
        let client = client_for(&factory).await;

        let err = container_exists(&client, "c1", &OperationGuard::unbounded())
            .await
            .unwrap_err();
        assert_eq!(err.access_cause(), Some(AccessCause::AccessDenied));
        assert!(err.to_string().contains("Please check your \"sas_key\" value."));
    }
}
