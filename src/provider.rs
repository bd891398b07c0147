//! The provider: a registry of resource kinds and the entry point for every
//! lifecycle operation.
//!
//! Callers address resources by type name; the provider looks up the matching
//! [`ResourceHandler`], runs the operation, and logs its outcome. The provider
//! owns the API clients and the cancellation token shared by all readiness
//! waits, so [`Provider::stop`] aborts any wait in progress.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{Credentials, HttpClient};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::readiness::{HttpProbe, ReadinessWaiter};
use crate::reconciler::{Reconciler, Resource, ResourceHandler};
use crate::resources::{CloudStack, Folder, OnCallIntegration};
use crate::schema::ProviderSchema;
use crate::state::ResourceState;
use crate::types::{ImportedResource, PlanResult};

/// Registered resource kinds plus the shared cancellation token.
pub struct Provider {
    handlers: BTreeMap<&'static str, Arc<dyn ResourceHandler>>,
    cancel: CancellationToken,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("resources", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Create a provider with no resource kinds.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a provider from configuration.
    ///
    /// Only the resource kinds whose credentials are configured are
    /// registered: Cloud stacks need `cloud_api_key`, OnCall integrations need
    /// `oncall_access_token`, and folders need `url` and `auth`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.check()?;
        let mut provider = Self::new();

        let waiter = match config.readiness() {
            Some(timing) => {
                let probe = HttpProbe::new()
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;
                Some(ReadinessWaiter::new(Arc::new(probe), timing))
            },
            None => None,
        };

        if let Some(key) = &config.cloud_api_key {
            let client = HttpClient::new(config.cloud_api_url(), Credentials::Bearer(key.clone()))?;
            let mut stacks = provider.reconciler(CloudStack::new(Arc::new(client)));
            if let Some(waiter) = &waiter {
                stacks = stacks.with_readiness(waiter.clone());
            }
            provider = provider.with_handler(stacks);
        }

        if let Some(token) = &config.oncall_access_token {
            let client = HttpClient::new(config.oncall_url(), Credentials::Token(token.clone()))?;
            let integrations = provider.reconciler(OnCallIntegration::new(Arc::new(client)));
            provider = provider.with_handler(integrations);
        }

        if let (Some(url), Some(auth)) = (&config.url, &config.auth) {
            let client = HttpClient::new(url, Credentials::from_grafana_auth(auth))?;
            let folders = provider.reconciler(Folder::new(Arc::new(client), url.clone()));
            provider = provider.with_handler(folders);
        }

        if provider.handlers.is_empty() {
            warn!("No credentials configured, no resource types are available");
        }
        info!(resources = ?provider.resource_types(), "Provider configured");
        Ok(provider)
    }

    /// Wrap `resource` in a reconciler tied to this provider's cancellation.
    pub fn reconciler<R: Resource>(&self, resource: R) -> Reconciler<R> {
        Reconciler::new(resource).with_cancellation(self.cancel.clone())
    }

    /// Register a resource kind, replacing any kind with the same name.
    pub fn with_handler(mut self, handler: impl ResourceHandler + 'static) -> Self {
        let name = handler.type_name();
        debug!(resource_type = name, "Registering resource type");
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    /// Token cancelled by [`stop`](Self::stop).
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Names of the registered resource kinds, sorted.
    pub fn resource_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Provider configuration schema plus the schema of every registered kind.
    pub fn schema(&self) -> ProviderSchema {
        self.handlers.iter().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, (name, handler)| schema.with_resource(*name, handler.schema()),
        )
    }

    fn handler(&self, resource_type: &str) -> Result<&Arc<dyn ResourceHandler>, ProviderError> {
        self.handlers
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    /// Validate `desired` and diff it against `prior`.
    #[instrument(skip(self, prior, desired), name = "provider.plan")]
    pub fn plan(
        &self,
        resource_type: &str,
        prior: Option<&ResourceState>,
        desired: &ResourceState,
    ) -> Result<PlanResult, ProviderError> {
        debug!(is_create = prior.is_none(), "Plan called");
        match self.handler(resource_type)?.plan(prior, desired) {
            Ok(plan) => {
                info!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "Plan completed"
                );
                Ok(plan)
            },
            Err(e) => {
                error!(error = %e, "Plan failed");
                Err(e)
            },
        }
    }

    /// Create a resource.
    #[instrument(skip(self, desired), name = "provider.create")]
    pub async fn create(
        &self,
        resource_type: &str,
        desired: &ResourceState,
    ) -> Result<ResourceState, ProviderError> {
        info!("Create called");
        match self.handler(resource_type)?.create(desired).await {
            Ok(state) => {
                info!(id = state.id(), "Create completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(error = %e, "Create failed");
                Err(e)
            },
        }
    }

    /// Refresh a resource from the remote.
    #[instrument(skip(self, current), name = "provider.read", fields(id = current.id()))]
    pub async fn read(
        &self,
        resource_type: &str,
        current: &ResourceState,
    ) -> Result<ResourceState, ProviderError> {
        debug!("Read called");
        match self.handler(resource_type)?.read(current).await {
            Ok(state) => {
                debug!(exists = state.exists(), "Read completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(error = %e, "Read failed");
                Err(e)
            },
        }
    }

    /// Update a resource in place.
    #[instrument(skip(self, prior, desired), name = "provider.update", fields(id = prior.id()))]
    pub async fn update(
        &self,
        resource_type: &str,
        prior: &ResourceState,
        desired: &ResourceState,
    ) -> Result<ResourceState, ProviderError> {
        info!("Update called");
        match self.handler(resource_type)?.update(prior, desired).await {
            Ok(state) => {
                info!("Update completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(error = %e, "Update failed");
                Err(e)
            },
        }
    }

    /// Delete a resource.
    #[instrument(skip(self, current), name = "provider.delete", fields(id = current.id()))]
    pub async fn delete(
        &self,
        resource_type: &str,
        current: &ResourceState,
    ) -> Result<ResourceState, ProviderError> {
        info!("Delete called");
        match self.handler(resource_type)?.delete(current).await {
            Ok(state) => {
                info!("Delete completed successfully");
                Ok(state)
            },
            Err(e) => {
                error!(error = %e, "Delete failed");
                Err(e)
            },
        }
    }

    /// Adopt an existing remote object.
    #[instrument(skip(self), name = "provider.import_resource")]
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<ImportedResource, ProviderError> {
        info!("ImportResource called");
        match self.handler(resource_type)?.import(id).await {
            Ok(imported) => {
                info!("ImportResource completed successfully");
                Ok(imported)
            },
            Err(e) => {
                error!(error = %e, "ImportResource failed");
                Err(e)
            },
        }
    }

    /// Cancel readiness waits in progress and refuse to start new ones.
    pub fn stop(&self) {
        info!("Stop called");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryCloud;
    use serde_json::json;

    fn provider(cloud: &Arc<InMemoryCloud>) -> Provider {
        let provider = Provider::new();
        let stacks = provider.reconciler(CloudStack::new(cloud.clone()));
        let folders = provider.reconciler(Folder::new(cloud.clone(), "https://grafana.example.com"));
        provider.with_handler(stacks).with_handler(folders)
    }

    #[test]
    fn test_from_config_registers_configured_kinds() {
        let config = ProviderConfig {
            cloud_api_key: Some("glc_key".to_string()),
            ..Default::default()
        };
        let provider = Provider::from_config(&config).unwrap();
        assert_eq!(provider.resource_types(), vec!["grafana_cloud_stack"]);

        let config = ProviderConfig {
            url: Some("https://grafana.example.com".to_string()),
            auth: Some("admin:admin".to_string()),
            oncall_access_token: Some("token".to_string()),
            ..Default::default()
        };
        let provider = Provider::from_config(&config).unwrap();
        assert_eq!(
            provider.resource_types(),
            vec!["grafana_folder", "grafana_oncall_integration"]
        );

        assert!(Provider::from_config(&ProviderConfig::default())
            .unwrap()
            .resource_types()
            .is_empty());
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = ProviderConfig {
            url: Some("not a url".to_string()),
            auth: Some("token".to_string()),
            ..Default::default()
        };
        let err = Provider::from_config(&config).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_schema_lists_registered_kinds() {
        let cloud = Arc::new(InMemoryCloud::new());
        let schema = provider(&cloud).schema();

        assert!(schema.resources.contains_key("grafana_cloud_stack"));
        assert!(schema.resources.contains_key("grafana_folder"));
        assert!(schema.provider.block.attributes.contains_key("cloud_api_key"));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let cloud = Arc::new(InMemoryCloud::new());
        let err = provider(&cloud)
            .create("grafana_dashboard", &ResourceState::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(ref t) if t == "grafana_dashboard"));
    }

    #[tokio::test]
    async fn test_dispatches_by_type() {
        let cloud = Arc::new(InMemoryCloud::new());
        let provider = provider(&cloud);
        let desired = ResourceState::from_value(json!({"title": "Ops"})).unwrap();

        let created = provider.create("grafana_folder", &desired).await.unwrap();
        let read = provider.read("grafana_folder", &created).await.unwrap();
        assert_eq!(read, created);

        let deleted = provider.delete("grafana_folder", &read).await.unwrap();
        assert!(!deleted.exists());
        assert_eq!(cloud.writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_readiness_waits() {
        let cloud = Arc::new(InMemoryCloud::new());
        let provider = Provider::new();
        let stacks = provider
            .reconciler(CloudStack::new(cloud.clone()))
            .with_readiness(ReadinessWaiter::new(
                Arc::new(crate::testing::ScriptedProbe::never_healthy()),
                Default::default(),
            ));
        let provider = provider.with_handler(stacks);
        provider.stop();

        let desired = ResourceState::from_value(json!({"name": "prod", "slug": "prod"})).unwrap();
        let err = provider.create("grafana_cloud_stack", &desired).await.unwrap_err();
        assert!(err.partial_state().is_some_and(|s| s.exists()));
    }
}
