//! The generic resource reconciler.
//!
//! A resource kind implements [`Resource`]: its schema, its typed model, the
//! field mapping to and from the remote API, and which attributes may change
//! in place. [`Reconciler`] turns that into the full lifecycle:
//!
//! - **create**: validate, decode, call the API, read back, wait for readiness
//! - **read**: refresh from the remote, dropping the id once the object is gone
//! - **update**: reject changes outside the allowlist, write, read back, wait
//! - **delete**: delete remotely, treating "already gone" as success
//! - **import**: adopt an existing object by id
//! - **plan**: validate and diff without touching the remote
//!
//! Operations take state by reference and return a new state; on error the
//! caller's state is untouched.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ApiError;
use crate::error::ProviderError;
use crate::plan::plan;
use crate::readiness::ReadinessWaiter;
use crate::schema::{Diagnostic, Schema};
use crate::state::ResourceState;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::{summarize, validate};

/// One kind of remote object managed by the provider.
///
/// `Model` is the typed form of the local state and must round-trip through
/// the schema's attribute layout. Every API call reports a classified
/// [`ApiError`]; the reconciler decides what each class means.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Identifier assigned by the remote on creation.
    type Id: FromStr + Display + Send + Sync;
    /// Typed local state.
    type Model: Serialize + DeserializeOwned + Send + Sync;
    /// The remote representation returned by a fetch.
    type Remote: Send;

    /// Name of the resource type, e.g. `grafana_folder`.
    fn type_name(&self) -> &'static str;

    /// Attribute layout, defaults and constraints.
    fn schema(&self) -> Schema;

    /// Attributes the remote API can change without recreating the object.
    fn mutable_attributes(&self) -> &'static [&'static str];

    /// Attributes that only affect local behaviour and are never sent.
    fn local_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Human-facing key used in conflict messages, usually the name.
    fn natural_key(&self, model: &Self::Model) -> String;

    /// Create the object and return its identifier.
    async fn create(&self, model: &Self::Model) -> Result<Self::Id, ApiError>;

    /// Fetch the object.
    async fn get(&self, id: &Self::Id) -> Result<Self::Remote, ApiError>;

    /// Whether a fetched object is logically gone even though it was returned.
    fn is_deleted(&self, _remote: &Self::Remote) -> bool {
        false
    }

    /// Map the remote representation onto the local model.
    fn flatten(&self, remote: Self::Remote) -> Self::Model;

    /// Write the mutable attributes of `model`.
    async fn update(&self, id: &Self::Id, model: &Self::Model) -> Result<(), ApiError>;

    /// Delete the object. `model` is the last known state when it decodes.
    async fn delete(&self, id: &Self::Id, model: Option<&Self::Model>) -> Result<(), ApiError>;

    /// URL to probe after create and update, if the kind has one.
    fn readiness_url(&self, _model: &Self::Model) -> Option<String> {
        None
    }
}

/// Type-erased lifecycle operations, so a provider can hold many kinds.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Name of the resource type.
    fn type_name(&self) -> &'static str;

    /// Schema of the resource type.
    fn schema(&self) -> Schema;

    /// Validate `desired` and compute the changes from `prior`.
    fn plan(
        &self,
        prior: Option<&ResourceState>,
        desired: &ResourceState,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the resource described by `desired`.
    async fn create(&self, desired: &ResourceState) -> Result<ResourceState, ProviderError>;

    /// Refresh `current` from the remote.
    async fn read(&self, current: &ResourceState) -> Result<ResourceState, ProviderError>;

    /// Move the resource from `prior` to `desired`.
    async fn update(
        &self,
        prior: &ResourceState,
        desired: &ResourceState,
    ) -> Result<ResourceState, ProviderError>;

    /// Delete the resource tracked by `current`.
    async fn delete(&self, current: &ResourceState) -> Result<ResourceState, ProviderError>;

    /// Adopt an existing remote object.
    async fn import(&self, id: &str) -> Result<ImportedResource, ProviderError>;
}

/// Drives a [`Resource`] through its lifecycle.
pub struct Reconciler<R: Resource> {
    resource: R,
    readiness: Option<ReadinessWaiter>,
    cancel: CancellationToken,
}

impl<R: Resource> Reconciler<R> {
    /// Create a reconciler that never waits for readiness.
    pub fn new(resource: R) -> Self {
        Self {
            resource,
            readiness: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Wait for readiness after create and update.
    pub fn with_readiness(mut self, waiter: ReadinessWaiter) -> Self {
        self.readiness = Some(waiter);
        self
    }

    /// Abort readiness waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The wrapped resource kind.
    pub fn resource(&self) -> &R {
        &self.resource
    }
}

impl<R> Reconciler<R>
where
    R: Resource,
    <R::Id as FromStr>::Err: Display,
{
    fn parse_id(&self, raw: &str) -> Result<R::Id, ProviderError> {
        raw.parse().map_err(|e| {
            ProviderError::Validation(format!(
                "invalid {} id '{}': {}",
                self.resource.type_name(),
                raw,
                e
            ))
        })
    }

    fn validate(&self, schema: &Schema, desired: &ResourceState) -> Result<(), ProviderError> {
        let diagnostics = validate(schema, &desired.to_value());
        for warning in diagnostics.iter().filter(|d| !d.is_error()) {
            warn!(
                resource_type = self.resource.type_name(),
                warning = %warning,
                "Validation warning"
            );
        }
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ProviderError::Validation(format!(
                "{}: {}",
                self.resource.type_name(),
                summarize(&diagnostics)
            )));
        }
        Ok(())
    }

    /// Fetch the remote object and lay it over `base`.
    ///
    /// Returns `None` when the object no longer exists.
    async fn refresh(
        &self,
        id: &R::Id,
        base: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let remote = match self.resource.get(id).await {
            Ok(remote) => remote,
            Err(ApiError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(ProviderError::api(self.resource.type_name(), id, e)),
        };
        if self.resource.is_deleted(&remote) {
            return Ok(None);
        }

        let model = self.resource.flatten(remote);
        let schema = self.resource.schema();
        let local = self.resource.local_attributes();
        let known: Vec<&str> = schema
            .block
            .attributes
            .keys()
            .chain(schema.block.blocks.keys())
            .map(String::as_str)
            .filter(|name| !local.contains(name))
            .collect();

        let mut state = base.clone();
        state.set_id(id.to_string());
        state.merge(&model, &known)?;
        for name in local {
            match base.get(name) {
                Some(value) => state.set(*name, value.clone()),
                None => {
                    state.remove(name);
                },
            }
        }
        Ok(Some(state))
    }

    async fn await_ready(
        &self,
        id: &R::Id,
        state: ResourceState,
    ) -> Result<ResourceState, ProviderError> {
        let Some(waiter) = &self.readiness else {
            return Ok(state);
        };
        let model: R::Model = state.decode()?;
        let Some(url) = self.resource.readiness_url(&model) else {
            return Ok(state);
        };

        debug!(resource_type = self.resource.type_name(), %id, %url, "Waiting for readiness");
        match waiter.wait(&url, &self.cancel).await {
            Ok(_) => Ok(state),
            Err(source) => Err(ProviderError::Readiness {
                resource_type: self.resource.type_name().to_string(),
                id: id.to_string(),
                state: Box::new(state),
                source,
            }),
        }
    }
}

#[async_trait]
impl<R> ResourceHandler for Reconciler<R>
where
    R: Resource,
    <R::Id as FromStr>::Err: Display,
{
    fn type_name(&self) -> &'static str {
        self.resource.type_name()
    }

    fn schema(&self) -> Schema {
        self.resource.schema()
    }

    fn plan(
        &self,
        prior: Option<&ResourceState>,
        desired: &ResourceState,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource.schema();
        self.validate(&schema, desired)?;
        Ok(plan(&schema, prior, desired))
    }

    async fn create(&self, desired: &ResourceState) -> Result<ResourceState, ProviderError> {
        let type_name = self.resource.type_name();
        let planned = self.plan(None, desired)?.planned_state;
        let model: R::Model = planned.decode()?;

        let id = match self.resource.create(&model).await {
            Ok(id) => id,
            Err(ApiError::Conflict(detail)) => {
                debug!(resource_type = type_name, %detail, "Create rejected as duplicate");
                return Err(ProviderError::AlreadyExists(format!(
                    "{} '{}'",
                    type_name,
                    self.resource.natural_key(&model)
                )));
            },
            Err(e) => return Err(ProviderError::api(type_name, "<new>", e)),
        };
        info!(resource_type = type_name, %id, "Created resource");

        let state = self
            .refresh(&id, &planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} {}", type_name, id)))?;
        self.await_ready(&id, state).await
    }

    async fn read(&self, current: &ResourceState) -> Result<ResourceState, ProviderError> {
        let Some(raw) = current.id() else {
            return Ok(current.clone());
        };
        let id = self.parse_id(raw)?;

        match self.refresh(&id, current).await? {
            Some(state) => Ok(state),
            None => {
                warn!(
                    resource_type = self.resource.type_name(),
                    %id,
                    "Resource no longer exists, removing it from state"
                );
                let mut gone = current.clone();
                gone.clear_id();
                Ok(gone)
            },
        }
    }

    async fn update(
        &self,
        prior: &ResourceState,
        desired: &ResourceState,
    ) -> Result<ResourceState, ProviderError> {
        let type_name = self.resource.type_name();
        let raw = prior
            .id()
            .ok_or_else(|| ProviderError::NotFound(format!("{} has no id", type_name)))?;
        let id = self.parse_id(raw)?;

        let result = self.plan(Some(prior), desired)?;
        let mutable = self.resource.mutable_attributes();
        let local = self.resource.local_attributes();

        let rejected: BTreeSet<&str> = result
            .changed_paths()
            .filter(|path| !mutable.contains(path) && !local.contains(path))
            .collect();
        if !rejected.is_empty() {
            return Err(ProviderError::Validation(format!(
                "{} {}: cannot update {} in place",
                type_name,
                id,
                rejected.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let writes = result.changed_paths().any(|path| mutable.contains(&path));
        let planned = result.planned_state;
        if writes {
            let model: R::Model = planned.decode()?;
            match self.resource.update(&id, &model).await {
                Ok(()) => info!(resource_type = type_name, %id, "Updated resource"),
                Err(ApiError::NotFound(_)) => {
                    return Err(ProviderError::NotFound(format!("{} {}", type_name, id)))
                },
                Err(e) => return Err(ProviderError::api(type_name, &id, e)),
            }
        } else {
            debug!(resource_type = type_name, %id, "No remote changes, skipping update");
        }

        let state = self
            .refresh(&id, &planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} {}", type_name, id)))?;
        if writes {
            self.await_ready(&id, state).await
        } else {
            Ok(state)
        }
    }

    async fn delete(&self, current: &ResourceState) -> Result<ResourceState, ProviderError> {
        let type_name = self.resource.type_name();
        let Some(raw) = current.id() else {
            return Ok(current.clone());
        };
        let id = self.parse_id(raw)?;
        let model: Option<R::Model> = current.decode().ok();

        match self.resource.delete(&id, model.as_ref()).await {
            Ok(()) => info!(resource_type = type_name, %id, "Deleted resource"),
            Err(ApiError::NotFound(_)) => {
                debug!(resource_type = type_name, %id, "Resource already deleted")
            },
            Err(e) => return Err(ProviderError::api(type_name, &id, e)),
        }

        let mut deleted = current.clone();
        deleted.clear_id();
        Ok(deleted)
    }

    async fn import(&self, raw: &str) -> Result<ImportedResource, ProviderError> {
        let type_name = self.resource.type_name();
        let id = self.parse_id(raw)?;

        let mut base = ResourceState::with_id(id.to_string());
        self.resource
            .schema()
            .block
            .apply_defaults(base.attributes_mut());

        let state = self
            .refresh(&id, &base)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} {}", type_name, id)))?;
        info!(resource_type = type_name, %id, "Imported resource");
        Ok(ImportedResource::new(type_name, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::{ReadinessConfig, ReadinessError};
    use crate::resources::{CloudStack, OnCallIntegration};
    use crate::testing::{InMemoryCloud, ScriptedProbe};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn state(value: serde_json::Value) -> ResourceState {
        ResourceState::from_value(value).unwrap()
    }

    fn stacks(cloud: &Arc<InMemoryCloud>) -> Reconciler<CloudStack> {
        Reconciler::new(CloudStack::new(cloud.clone()))
    }

    fn stacks_waiting(cloud: &Arc<InMemoryCloud>, probe: ScriptedProbe) -> Reconciler<CloudStack> {
        stacks(cloud).with_readiness(ReadinessWaiter::new(
            Arc::new(probe),
            ReadinessConfig::default(),
        ))
    }

    fn desired_stack() -> ResourceState {
        state(json!({"name": "prod", "slug": "prod", "region_slug": "us"}))
    }

    #[tokio::test]
    async fn test_create_then_read_round_trip() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);

        let created = stacks.create(&desired_stack()).await.unwrap();
        assert!(created.exists());
        assert_eq!(created.get_str("status"), Some("active"));
        assert_eq!(created.get("wait_for_readiness"), Some(&json!(true)));

        let read = stacks.read(&created).await.unwrap();
        assert_eq!(read, created);
    }

    #[tokio::test]
    async fn test_create_conflict_names_the_resource() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        stacks.create(&desired_stack()).await.unwrap();

        let err = stacks.create(&desired_stack()).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("'prod'"));
    }

    #[tokio::test]
    async fn test_invalid_desired_state_makes_no_calls() {
        let cloud = Arc::new(InMemoryCloud::new());
        let err = stacks(&cloud)
            .create(&state(json!({"name": "prod", "slug": "Prod!"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        assert_eq!(cloud.writes(), 0);
    }

    #[tokio::test]
    async fn test_update_without_changes_writes_nothing() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        let writes = cloud.writes();

        let updated = stacks.update(&created, &desired_stack()).await.unwrap();
        assert_eq!(cloud.writes(), writes);
        assert_eq!(updated, created);
    }

    #[tokio::test]
    async fn test_update_mutable_attribute() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();

        let desired = state(json!({
            "name": "Production",
            "slug": "prod",
            "region_slug": "us",
            "description": "main stack"
        }));
        let updated = stacks.update(&created, &desired).await.unwrap();

        assert_eq!(updated.id(), created.id());
        assert_eq!(updated.get_str("name"), Some("Production"));
        assert_eq!(updated.get_str("description"), Some("main stack"));
    }

    #[tokio::test]
    async fn test_update_rejects_immutable_change_before_calling_remote() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        let writes = cloud.writes();

        let desired = state(json!({"name": "prod", "slug": "prod", "region_slug": "eu"}));
        let err = stacks.update(&created, &desired).await.unwrap_err();

        match err {
            ProviderError::Validation(msg) => assert!(msg.contains("region_slug")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(cloud.writes(), writes);
    }

    #[tokio::test]
    async fn test_local_only_change_skips_remote_write() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        let writes = cloud.writes();

        let mut desired = desired_stack();
        desired.set("wait_for_readiness", json!(false));
        let updated = stacks.update(&created, &desired).await.unwrap();

        assert_eq!(cloud.writes(), writes);
        assert_eq!(updated.get("wait_for_readiness"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_update_of_vanished_resource_is_not_found() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        cloud.remove_stack(created.id().unwrap().parse().unwrap());

        let mut desired = desired_stack();
        desired.set("name", json!("renamed"));
        let err = stacks.update(&created, &desired).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_clears_id_when_gone() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        cloud.remove_stack(created.id().unwrap().parse().unwrap());

        let read = stacks.read(&created).await.unwrap();
        assert!(!read.exists());
        assert!(created.exists());
    }

    #[tokio::test]
    async fn test_read_treats_deleted_status_as_gone() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        cloud.mark_stack_deleted(created.id().unwrap().parse().unwrap());

        assert!(!stacks.read(&created).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_read_surfaces_transport_errors() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();
        cloud.fail_next(ApiError::Transport("status: 502, body: bad gateway".to_string()));

        let err = stacks.read(&created).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Api {
                source: ApiError::Transport(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_twice_succeeds() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();

        let deleted = stacks.delete(&created).await.unwrap();
        assert!(!deleted.exists());
        // Same prior state again: the remote answers 404.
        let again = stacks.delete(&created).await.unwrap();
        assert!(!again.exists());
        // And with no id at all.
        assert!(!stacks.delete(&deleted).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_import_existing_and_missing() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let created = stacks.create(&desired_stack()).await.unwrap();

        let imported = stacks.import(created.id().unwrap()).await.unwrap();
        assert_eq!(imported.resource_type, "grafana_cloud_stack");
        assert_eq!(imported.state, created);

        let err = stacks.import("999").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        let err = stacks.import("not-a-number").await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_readiness() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks_waiting(&cloud, ScriptedProbe::healthy_after(Duration::from_secs(2)));

        let start = tokio::time::Instant::now();
        let created = stacks.create(&desired_stack()).await.unwrap();
        assert!(created.exists());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_keeps_created_state() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks_waiting(&cloud, ScriptedProbe::never_healthy());

        let err = stacks.create(&desired_stack()).await.unwrap_err();
        let state = err.partial_state().expect("state is retained");
        assert!(state.exists());
        assert!(matches!(
            err,
            ProviderError::Readiness {
                source: ReadinessError::TimedOut { .. },
                ..
            }
        ));
        assert_eq!(cloud.stack_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_opt_out() {
        let cloud = Arc::new(InMemoryCloud::new());
        let probe = ScriptedProbe::never_healthy();
        let stacks = stacks_waiting(&cloud, probe);

        let mut desired = desired_stack();
        desired.set("wait_for_readiness", json!(false));
        let created = stacks.create(&desired).await.unwrap();
        assert!(created.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_readiness() {
        let cloud = Arc::new(InMemoryCloud::new());
        let cancel = CancellationToken::new();
        let stacks = stacks_waiting(&cloud, ScriptedProbe::never_healthy())
            .with_cancellation(cancel.clone());
        cancel.cancel();

        let err = stacks.create(&desired_stack()).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Readiness {
                source: ReadinessError::Cancelled { .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_waits_for_readiness() {
        let cloud = Arc::new(InMemoryCloud::new());
        let created = stacks(&cloud).create(&desired_stack()).await.unwrap();
        let stacks = stacks_waiting(&cloud, ScriptedProbe::healthy_after(Duration::from_secs(3)));

        let mut desired = desired_stack();
        desired.set("name", json!("production"));
        let start = tokio::time::Instant::now();
        let updated = stacks.update(&created, &desired).await.unwrap();
        assert_eq!(updated.get_str("name"), Some("production"));
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_readiness_timeout_keeps_updated_state() {
        let cloud = Arc::new(InMemoryCloud::new());
        let created = stacks(&cloud).create(&desired_stack()).await.unwrap();
        let stacks = stacks_waiting(&cloud, ScriptedProbe::never_healthy());

        let mut desired = desired_stack();
        desired.set("name", json!("production"));
        let err = stacks.update(&created, &desired).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Readiness {
                source: ReadinessError::TimedOut { .. },
                ..
            }
        ));
        let state = err.partial_state().expect("state is retained");
        assert_eq!(state.id(), created.id());
        assert_eq!(state.get_str("name"), Some("production"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_update_skips_readiness() {
        let cloud = Arc::new(InMemoryCloud::new());
        let created = stacks(&cloud).create(&desired_stack()).await.unwrap();
        let probe = Arc::new(ScriptedProbe::never_healthy());
        let stacks = stacks(&cloud).with_readiness(ReadinessWaiter::new(
            probe.clone(),
            ReadinessConfig::default(),
        ));

        let writes = cloud.writes();
        let updated = stacks.update(&created, &desired_stack()).await.unwrap();
        assert_eq!(updated.id(), created.id());
        assert_eq!(cloud.writes(), writes);
        assert_eq!(probe.probes(), 0);
    }

    #[tokio::test]
    async fn test_empty_description_is_not_rewritten() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = stacks(&cloud);
        let mut desired = desired_stack();
        desired.set("description", json!(""));
        let created = stacks.create(&desired).await.unwrap();
        assert_eq!(cloud.writes(), 1);

        let updated = stacks.update(&created, &desired).await.unwrap();
        stacks.update(&updated, &desired).await.unwrap();
        assert_eq!(cloud.writes(), 1);
    }

    #[tokio::test]
    async fn test_integration_blocks_round_trip() {
        let cloud = Arc::new(InMemoryCloud::new());
        let integrations = Reconciler::new(OnCallIntegration::new(cloud.clone()));

        let desired = state(json!({
            "name": "alerts",
            "type": "grafana",
            "templates": [{"grouping_key": "{{ payload.id }}"}]
        }));
        let created = integrations.create(&desired).await.unwrap();

        assert_eq!(
            created.get("templates"),
            Some(&json!([{"grouping_key": "{{ payload.id }}"}]))
        );
        let plan = integrations.plan(Some(&created), &desired).unwrap();
        assert!(!plan.has_changes(), "unexpected drift: {:?}", plan.changes);
    }
}
