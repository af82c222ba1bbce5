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

//! Client resolution and caching
//!
//! The client for the service-level configuration is built once and shared.
//! A call whose merged configuration differs in any field gets a transient
//! client that is dropped when the call completes.

use crate::credential::{select_strategy, CredentialStrategy, StrategyKind};
use crate::error::{AccessCause, Error, Result, StorageResult};
use crate::locator::ServiceUrlProvider;
use crate::BlobClient;
use std::fmt::{self, Debug};
use std::sync::Arc;
use stowage_config::{
    merge, ConfigField, ConfigResult, ResolvedConfiguration, StorageConfiguration, StorageOverride,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Builds blob clients for credential strategies
pub trait ClientFactory: Send + Sync + Debug {
    /// Build a client for `strategy`
    fn build(&self, strategy: &CredentialStrategy) -> StorageResult<Arc<dyn BlobClient>>;

    /// Whether the environment offers a default credential
    fn ambient_credential_available(&self) -> bool;
}

/// A blob client together with what it was built from
#[derive(Debug)]
pub struct ResolvedClient {
    account_name: String,
    kind: StrategyKind,
    client: Arc<dyn BlobClient>,
}

impl ResolvedClient {
    /// Storage account the client talks to
    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Credential strategy used
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Field an operator should check when the credential is refused
    pub fn credential_field(&self) -> ConfigField {
        self.kind.credential_field()
    }

    /// The blob client
    pub fn client(&self) -> &dyn BlobClient {
        self.client.as_ref()
    }
}

/// Resolves merged configurations into blob clients
pub struct ClientResolver {
    factory: Arc<dyn ClientFactory>,
    service_config: StorageConfiguration,
    url_provider: Option<ServiceUrlProvider>,
    cached: RwLock<Option<Arc<ResolvedClient>>>,
}

impl ClientResolver {
    /// Create a resolver for a service-level configuration
    pub fn new(service_config: StorageConfiguration, factory: Arc<dyn ClientFactory>) -> Self {
        ClientResolver {
            factory,
            service_config,
            url_provider: None,
            cached: RwLock::new(None),
        }
    }

    /// Use a custom service URL provider for SAS clients
    pub fn with_service_url_provider(mut self, provider: ServiceUrlProvider) -> Self {
        self.url_provider = Some(provider);
        self
    }

    /// The custom service URL provider, if any
    pub fn service_url_provider(&self) -> Option<&ServiceUrlProvider> {
        self.url_provider.as_ref()
    }

    /// The service-level configuration
    pub fn service_config(&self) -> &StorageConfiguration {
        &self.service_config
    }

    /// Merge per-call overrides on top of the service-level configuration
    pub fn merge(&self, overrides: &StorageOverride) -> ConfigResult<ResolvedConfiguration> {
        merge(
            &self.service_config,
            overrides,
            self.factory.ambient_credential_available(),
        )
    }

    /// The client for `config`
    ///
    /// Returns the cached client when `config` equals the service-level
    /// configuration field by field, and a fresh uncached client otherwise.
    pub async fn resolve(&self, config: &ResolvedConfiguration) -> Result<Arc<ResolvedClient>> {
        if !config.matches(&self.service_config) {
            debug!(
                account = config.account_name(),
                "Per-call configuration differs from service configuration; building transient client"
            );
            return self.build(config);
        }

        if let Some(client) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut cached = self.cached.write().await;
        if let Some(client) = cached.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client = self.build(config)?;
        *cached = Some(Arc::clone(&client));
        Ok(client)
    }

    fn build(&self, config: &ResolvedConfiguration) -> Result<Arc<ResolvedClient>> {
        let strategy = select_strategy(config, self.url_provider.as_ref())?;
        let kind = strategy.kind();
        let account_name = strategy.account_name().to_string();

        let client = self.factory.build(&strategy).map_err(|source| Error::StorageAccess {
            cause: AccessCause::of(&source),
            message: format!(
                "Failed to create {} client for account \"{}\". Please check your \"{}\" value.",
                kind,
                account_name,
                kind.credential_field()
            ),
            source,
        })?;

        info!(account = %account_name, strategy = %kind, "Blob client created");

        Ok(Arc::new(ResolvedClient {
            account_name,
            kind,
            client,
        }))
    }
}

impl Debug for ClientResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientResolver")
            .field("factory", &self.factory)
            .field("service_config", &self.service_config)
            .field("url_provider", &self.url_provider.as_ref().map(|_| "<custom>"))
            .finish()
    }
}
