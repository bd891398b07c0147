//! Test support: in-memory Grafana APIs, a scripted health probe, and a
//! JSON-level harness around [`Provider`].
//!
//! Nothing here talks to the network, so lifecycle tests run fast and, with
//! tokio's paused clock, readiness waits take no real time.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use grafana_provider::resources::Folder;
//! use grafana_provider::testing::{InMemoryCloud, ProviderTester};
//! use grafana_provider::Provider;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let cloud = Arc::new(InMemoryCloud::new());
//! let provider = Provider::new();
//! let folders = provider.reconciler(Folder::new(cloud, "https://grafana.example.com"));
//! let tester = ProviderTester::new(provider.with_handler(folders));
//!
//! let state = tester
//!     .lifecycle_create("grafana_folder", json!({"title": "Ops"}))
//!     .await
//!     .unwrap();
//! assert_eq!(state["title"], "Ops");
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::client::models::{
    CreateFolderInput, CreateIntegrationOptions, CreateStackInput, DefaultRoute, Folder,
    Integration, Stack, UpdateFolderInput, UpdateIntegrationOptions, UpdateStackInput,
};
use crate::client::{ApiError, FolderApi, IntegrationApi, StackApi};
use crate::error::ProviderError;
use crate::provider::Provider;
use crate::readiness::{HealthProbe, ProbeError, ProbeOutcome};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::state::ResourceState;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

// =========================================================================
// In-memory APIs
// =========================================================================

#[derive(Default)]
struct CloudState {
    next_id: i64,
    writes: usize,
    fail_next: Option<ApiError>,
    stacks: BTreeMap<i64, Stack>,
    integrations: BTreeMap<String, Integration>,
    folders: BTreeMap<i64, Folder>,
}

impl CloudState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn injected_failure(&mut self) -> Result<(), ApiError> {
        match self.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn folder_by_uid(&mut self, uid: &str) -> Result<&mut Folder, ApiError> {
        self.folders
            .values_mut()
            .find(|f| f.uid == uid)
            .ok_or_else(|| ApiError::NotFound(format!("folder {} not found", uid)))
    }
}

/// Grafana Cloud, OnCall and folder APIs backed by in-process maps.
///
/// Behaves like the real services where the provider depends on it:
/// duplicate stack slugs and folder uids conflict, missing objects are
/// `NotFound`, and server-side fields (URLs, org, default route) are filled
/// in on creation.
#[derive(Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    /// An empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful create, update and delete calls so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Number of stacks that are not marked deleted.
    pub fn stack_count(&self) -> usize {
        self.lock()
            .stacks
            .values()
            .filter(|s| s.status != "deleted")
            .count()
    }

    /// Store a stack as is, bypassing the create rules.
    pub fn insert_stack(&self, stack: Stack) {
        self.lock().stacks.insert(stack.id, stack);
    }

    /// Remove a stack behind the provider's back.
    pub fn remove_stack(&self, id: i64) {
        self.lock().stacks.remove(&id);
    }

    /// Keep a stack but report it with status `deleted`.
    pub fn mark_stack_deleted(&self, id: i64) {
        if let Some(stack) = self.lock().stacks.get_mut(&id) {
            stack.status = "deleted".to_string();
        }
    }

    /// Make the next API call fail with `error`.
    pub fn fail_next(&self, error: ApiError) {
        self.lock().fail_next = Some(error);
    }

    /// Server-side id of an integration's default route, or an empty string.
    pub fn integration_route_id(&self, id: &str) -> String {
        self.lock()
            .integrations
            .get(id)
            .and_then(|i| i.default_route.as_ref())
            .map(|r| r.id.clone())
            .unwrap_or_default()
    }
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl StackApi for InMemoryCloud {
    async fn create_stack(&self, input: &CreateStackInput) -> Result<Stack, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        if cloud
            .stacks
            .values()
            .any(|s| s.slug == input.slug && s.status != "deleted")
        {
            return Err(ApiError::Conflict(format!("stack slug {} is taken", input.slug)));
        }

        let id = cloud.next_id();
        let region = input.region.clone().unwrap_or_else(|| "us".to_string());
        let stack = Stack {
            id,
            org_id: 1,
            org_slug: "testorg".to_string(),
            org_name: "Test Org".to_string(),
            name: input.name.clone(),
            url: input
                .url
                .clone()
                .unwrap_or_else(|| format!("https://{}.grafana.net", input.slug)),
            status: "active".to_string(),
            slug: input.slug.clone(),
            description: input.description.clone().unwrap_or_default(),
            prometheus_id: id + 1000,
            prometheus_url: format!("https://prometheus-{}.grafana.net", region),
            prometheus_name: format!("{}-prom", input.slug),
            prometheus_status: "active".to_string(),
            region_slug: region,
            ..Default::default()
        };
        cloud.stacks.insert(id, stack.clone());
        cloud.writes += 1;
        Ok(stack)
    }

    async fn stack(&self, id: i64) -> Result<Stack, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        cloud
            .stacks
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("stack {} not found", id)))
    }

    async fn update_stack(&self, id: i64, input: &UpdateStackInput) -> Result<(), ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        let stack = cloud
            .stacks
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("stack {} not found", id)))?;
        stack.name = input.name.clone();
        stack.slug = input.slug.clone();
        stack.description = input.description.clone();
        cloud.writes += 1;
        Ok(())
    }

    async fn delete_stack(&self, slug: &str) -> Result<(), ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        let id = cloud
            .stacks
            .values()
            .find(|s| s.slug == slug)
            .map(|s| s.id)
            .ok_or_else(|| ApiError::NotFound(format!("stack {} not found", slug)))?;
        cloud.stacks.remove(&id);
        cloud.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl IntegrationApi for InMemoryCloud {
    async fn create_integration(
        &self,
        options: &CreateIntegrationOptions,
    ) -> Result<Integration, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        let n = cloud.next_id();
        let id = format!("C{:04}", n);

        let mut route = options.default_route.clone().unwrap_or_default();
        route.id = format!("R{}", n);
        let integration = Integration {
            id: id.clone(),
            team_id: options.team_id.clone(),
            name: options.name.clone(),
            link: format!("https://oncall.example.com/integrations/v1/{}/{}/", options.kind, id),
            kind: options.kind.clone(),
            default_route: Some(route),
            templates: options.templates.clone(),
        };
        cloud.integrations.insert(id, integration.clone());
        cloud.writes += 1;
        Ok(integration)
    }

    async fn integration(&self, id: &str) -> Result<Integration, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        cloud
            .integrations
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("integration {} not found", id)))
    }

    async fn update_integration(
        &self,
        id: &str,
        options: &UpdateIntegrationOptions,
    ) -> Result<Integration, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        let integration = cloud
            .integrations
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("integration {} not found", id)))?;

        integration.name = options.name.clone();
        integration.templates = options.templates.clone();
        if let Some(route) = &options.default_route {
            let current = integration.default_route.get_or_insert_with(DefaultRoute::default);
            if !route.id.is_empty() && route.id != current.id {
                return Err(ApiError::NotFound(format!("route {} not found", route.id)));
            }
            current.escalation_chain_id = route.escalation_chain_id.clone();
            current.slack_route = route.slack_route.clone();
        }
        let updated = integration.clone();
        cloud.writes += 1;
        Ok(updated)
    }

    async fn delete_integration(&self, id: &str) -> Result<(), ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        cloud
            .integrations
            .remove(id)
            .ok_or_else(|| ApiError::NotFound(format!("integration {} not found", id)))?;
        cloud.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl FolderApi for InMemoryCloud {
    async fn create_folder(&self, input: &CreateFolderInput) -> Result<Folder, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        if let Some(uid) = &input.uid {
            if cloud.folders.values().any(|f| &f.uid == uid) {
                return Err(ApiError::Conflict(format!("folder uid {} already exists", uid)));
            }
        }

        let id = cloud.next_id();
        let uid = input.uid.clone().unwrap_or_else(|| format!("fold{:06}", id));
        let folder = Folder {
            id,
            url: format!("/dashboards/f/{}/{}", uid, slugify(&input.title)),
            uid,
            title: input.title.clone(),
            version: 1,
        };
        cloud.folders.insert(id, folder.clone());
        cloud.writes += 1;
        Ok(folder)
    }

    async fn folder(&self, id: i64) -> Result<Folder, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        cloud
            .folders
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("folder {} not found", id)))
    }

    async fn update_folder(&self, uid: &str, input: &UpdateFolderInput) -> Result<Folder, ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        let folder = cloud.folder_by_uid(uid)?;
        folder.title = input.title.clone();
        folder.url = format!("/dashboards/f/{}/{}", folder.uid, slugify(&folder.title));
        folder.version += 1;
        let updated = folder.clone();
        cloud.writes += 1;
        Ok(updated)
    }

    async fn delete_folder(&self, uid: &str) -> Result<(), ApiError> {
        let mut cloud = self.lock();
        cloud.injected_failure()?;
        let id = cloud.folder_by_uid(uid)?.id;
        cloud.folders.remove(&id);
        cloud.writes += 1;
        Ok(())
    }
}

// =========================================================================
// Scripted health probe
// =========================================================================

#[derive(Debug, Clone, Copy)]
enum Script {
    Healthy,
    HealthyAfter(Duration),
    NeverHealthy,
}

/// A [`HealthProbe`] whose answers follow a fixed script.
///
/// Time is measured with tokio's clock from the first probe, so tests using
/// `start_paused` see deterministic timings.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Script,
    first_probe: Mutex<Option<Instant>>,
    probes: AtomicUsize,
}

impl ScriptedProbe {
    fn new(script: Script) -> Self {
        Self {
            script,
            first_probe: Mutex::new(None),
            probes: AtomicUsize::new(0),
        }
    }

    /// Ready on every probe.
    pub fn healthy() -> Self {
        Self::new(Script::Healthy)
    }

    /// Ready once `after` has passed since the first probe.
    pub fn healthy_after(after: Duration) -> Self {
        Self::new(Script::HealthyAfter(after))
    }

    /// Always answers 503.
    pub fn never_healthy() -> Self {
        Self::new(Script::NeverHealthy)
    }

    /// Number of probes made so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _url: &Url) -> Result<ProbeOutcome, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let started = *self
            .first_probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(Instant::now);

        let ready = match self.script {
            Script::Healthy => true,
            Script::HealthyAfter(after) => started.elapsed() >= after,
            Script::NeverHealthy => false,
        };
        if ready {
            Ok(ProbeOutcome::Ready)
        } else {
            Ok(ProbeOutcome::NotReady("status 503 Service Unavailable".to_string()))
        }
    }
}

// =========================================================================
// Provider harness
// =========================================================================

/// Drives a [`Provider`] with plain JSON values.
pub struct ProviderTester {
    provider: Provider,
}

impl ProviderTester {
    /// Wrap a provider.
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Registered resource type names.
    pub fn resource_types(&self) -> Vec<&'static str> {
        self.provider.resource_types()
    }

    /// Check a provider configuration against its schema.
    pub fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        check_diagnostics(validate(&self.schema().provider, &config))
    }

    /// Check a resource configuration against its type's schema.
    pub fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let schema = self.schema();
        let resource = schema
            .resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        check_diagnostics(validate(resource, &config))
    }

    /// Plan creating a resource.
    pub fn plan_create(&self, resource_type: &str, desired: Value) -> Result<PlanResult, ProviderError> {
        let desired = ResourceState::from_value(desired)?;
        self.provider.plan(resource_type, None, &desired)
    }

    /// Plan moving a resource from `prior` to `desired`.
    pub fn plan_update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<PlanResult, ProviderError> {
        let prior = ResourceState::from_value(prior)?;
        let desired = ResourceState::from_value(desired)?;
        self.provider.plan(resource_type, Some(&prior), &desired)
    }

    /// Create a resource.
    pub async fn create(&self, resource_type: &str, desired: Value) -> Result<Value, ProviderError> {
        let desired = ResourceState::from_value(desired)?;
        let state = self.provider.create(resource_type, &desired).await?;
        Ok(state.to_value())
    }

    /// Refresh a resource.
    pub async fn read(&self, resource_type: &str, current: Value) -> Result<Value, ProviderError> {
        let current = ResourceState::from_value(current)?;
        let state = self.provider.read(resource_type, &current).await?;
        Ok(state.to_value())
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<Value, ProviderError> {
        let prior = ResourceState::from_value(prior)?;
        let desired = ResourceState::from_value(desired)?;
        let state = self.provider.update(resource_type, &prior, &desired).await?;
        Ok(state.to_value())
    }

    /// Delete a resource, returning the state left behind.
    pub async fn delete(&self, resource_type: &str, current: Value) -> Result<Value, ProviderError> {
        let current = ResourceState::from_value(current)?;
        let state = self.provider.delete(resource_type, &current).await?;
        Ok(state.to_value())
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<ImportedResource, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Stop the provider.
    pub fn stop(&self) {
        self.provider.stop()
    }

    /// Plan, create, then read back.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        desired: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, desired)?;
        let created = self
            .create(resource_type, plan.planned_state.to_value())
            .await?;
        self.read(resource_type, created).await
    }

    /// Plan, update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior: Value,
        desired: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_update(resource_type, prior.clone(), desired)?;
        let updated = self
            .update(resource_type, prior, plan.planned_state.to_value())
            .await?;
        self.read(resource_type, updated).await
    }

    /// Create, update, then delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial: Value,
        updated: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated)
            .await?;
        self.delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Failure of a harness call that reports diagnostics.
#[derive(Debug, Error)]
pub enum TestError {
    /// Error diagnostics were produced.
    #[error("{} error diagnostic(s): {}", .0.len(), crate::validation::summarize(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion helpers
// =========================================================================

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changed_paths().collect()
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "expected no changes, got {:?}",
        changed_paths(plan)
    );
}

/// Assert that a plan has changes.
///
/// # Panics
///
/// Panics if the plan is empty.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(plan.has_changes(), "expected changes, got none");
}

/// Assert that a plan replaces the resource.
///
/// # Panics
///
/// Panics if the plan updates in place.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "expected replacement, plan updates {:?} in place",
        changed_paths(plan)
    );
}

/// Assert that a plan updates the resource in place.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "expected in-place update, plan replaces on {:?}",
        changed_paths(plan)
    );
}

/// Assert that a plan changes `path`.
///
/// # Panics
///
/// Panics if `path` is not among the changed paths.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let paths = changed_paths(plan);
    assert!(
        paths.contains(&path),
        "expected a change to '{}', changed: {:?}",
        path,
        paths
    );
}

/// Assert that diagnostics hold no errors.
///
/// # Panics
///
/// Panics on any error diagnostic.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(ToString::to_string)
        .collect();
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Assert that some error diagnostic mentions `needle` in its summary or detail.
///
/// # Panics
///
/// Panics if none does.
pub fn assert_error_contains(diagnostics: &[Diagnostic], needle: &str) {
    let found = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .any(|d| d.to_string().contains(needle));
    assert!(
        found,
        "expected an error mentioning '{}', got {:?}",
        needle,
        diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}
