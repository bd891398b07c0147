//! `grafana_cloud_stack`: a Grafana Cloud stack.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::non_empty;
use crate::client::models::{CreateStackInput, Stack, UpdateStackInput};
use crate::client::{ApiError, StackApi};
use crate::reconciler::Resource;
use crate::schema::{Attribute, Schema, Validator};

const TYPE_NAME: &str = "grafana_cloud_stack";

/// Stacks reported with this status are gone even though the API returns them.
const DELETED_STATUS: &str = "deleted";

const SLUG_PATTERN: &str = "^[a-z][a-z0-9]+$";

/// Local state of a stack.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackModel {
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for_readiness: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_remote_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_remote_write_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alertmanager_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_status: Option<String>,
}

impl StackModel {
    fn expand_create(&self) -> CreateStackInput {
        CreateStackInput {
            name: self.name.clone(),
            slug: self.slug.clone(),
            url: self.url.clone(),
            region: self.region_slug.clone(),
            description: self.description.clone(),
        }
    }

    fn expand_update(&self) -> UpdateStackInput {
        UpdateStackInput {
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone().unwrap_or_default(),
        }
    }
}

fn prometheus_endpoint(base: &str, suffix: &str) -> Option<String> {
    if base.is_empty() {
        return None;
    }
    Some(format!("{}/{}", base.trim_end_matches('/'), suffix))
}

/// Manages Grafana Cloud stacks through a [`StackApi`].
#[derive(Clone)]
pub struct CloudStack {
    api: Arc<dyn StackApi>,
}

impl CloudStack {
    /// Create the resource kind over `api`.
    pub fn new(api: Arc<dyn StackApi>) -> Self {
        Self { api }
    }

    /// Schema of `grafana_cloud_stack`.
    pub fn resource_schema() -> Schema {
        let mut schema = Schema::v0()
            .with_description("A Grafana Cloud stack.")
            .with_attribute(
                "name",
                Attribute::required_string().with_description(
                    "Name of stack. Conventionally matches the url of the instance (e.g. <stack_slug>.grafana.net).",
                ),
            )
            .with_attribute(
                "description",
                Attribute::optional_string()
                    .with_description("Description of stack.")
                    .with_empty_as_unset(),
            )
            .with_attribute(
                "slug",
                Attribute::required_string()
                    .with_description(
                        "Subdomain that the Grafana instance will be available at (https://<stack_slug>.grafana.net).",
                    )
                    .with_validator(Validator::pattern(
                        SLUG_PATTERN,
                        "must be a lowercase alphanumeric string and must start with a letter.",
                    )),
            )
            .with_attribute(
                "region_slug",
                Attribute::optional_computed_string()
                    .with_description(
                        "Region slug to assign to this stack. Changing region destroys the stack and creates a new one.",
                    )
                    .with_force_new()
                    .with_validator(Validator::one_of(["au", "eu", "us"])),
            )
            .with_attribute(
                "url",
                Attribute::optional_computed_string()
                    .with_description("Custom URL for the Grafana instance.")
                    .with_empty_as_unset(),
            )
            .with_attribute(
                "wait_for_readiness",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description(
                        "Whether to wait for the stack URL to answer a HEAD request after creating or updating it.",
                    ),
            )
            .with_attribute(
                "status",
                Attribute::computed_string().with_description("Status of the stack."),
            )
            .with_attribute("org_id", Attribute::computed_int64())
            .with_attribute("org_slug", Attribute::computed_string())
            .with_attribute("org_name", Attribute::computed_string());

        for prefix in ["prometheus", "alertmanager", "logs"] {
            schema = schema
                .with_attribute(format!("{}_user_id", prefix), Attribute::computed_int64())
                .with_attribute(format!("{}_name", prefix), Attribute::computed_string())
                .with_attribute(format!("{}_url", prefix), Attribute::computed_string())
                .with_attribute(format!("{}_status", prefix), Attribute::computed_string());
        }

        schema
            .with_attribute(
                "prometheus_remote_endpoint",
                Attribute::computed_string()
                    .with_description("Use this URL to query hosted metrics data."),
            )
            .with_attribute(
                "prometheus_remote_write_endpoint",
                Attribute::computed_string()
                    .with_description("Use this URL to send prometheus metrics to Grafana Cloud."),
            )
    }
}

#[async_trait]
impl Resource for CloudStack {
    type Id = i64;
    type Model = StackModel;
    type Remote = Stack;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Self::resource_schema()
    }

    fn mutable_attributes(&self) -> &'static [&'static str] {
        &["name", "description", "slug"]
    }

    fn local_attributes(&self) -> &'static [&'static str] {
        &["wait_for_readiness"]
    }

    fn natural_key(&self, model: &StackModel) -> String {
        model.name.clone()
    }

    async fn create(&self, model: &StackModel) -> Result<i64, ApiError> {
        let stack = self.api.create_stack(&model.expand_create()).await?;
        Ok(stack.id)
    }

    async fn get(&self, id: &i64) -> Result<Stack, ApiError> {
        self.api.stack(*id).await
    }

    fn is_deleted(&self, remote: &Stack) -> bool {
        remote.status == DELETED_STATUS
    }

    fn flatten(&self, stack: Stack) -> StackModel {
        StackModel {
            prometheus_remote_endpoint: prometheus_endpoint(&stack.prometheus_url, "api/prom"),
            prometheus_remote_write_endpoint: prometheus_endpoint(
                &stack.prometheus_url,
                "api/prom/push",
            ),
            name: stack.name,
            slug: stack.slug,
            description: non_empty(stack.description),
            region_slug: non_empty(stack.region_slug),
            url: non_empty(stack.url),
            wait_for_readiness: None,
            status: Some(stack.status),
            org_id: Some(stack.org_id),
            org_slug: Some(stack.org_slug),
            org_name: Some(stack.org_name),
            prometheus_user_id: Some(stack.prometheus_id),
            prometheus_url: Some(stack.prometheus_url),
            prometheus_name: Some(stack.prometheus_name),
            prometheus_status: Some(stack.prometheus_status),
            alertmanager_user_id: Some(stack.alertmanager_id),
            alertmanager_name: Some(stack.alertmanager_name),
            alertmanager_url: Some(stack.alertmanager_url),
            alertmanager_status: Some(stack.alertmanager_status),
            logs_user_id: Some(stack.logs_id),
            logs_name: Some(stack.logs_name),
            logs_url: Some(stack.logs_url),
            logs_status: Some(stack.logs_status),
        }
    }

    async fn update(&self, id: &i64, model: &StackModel) -> Result<(), ApiError> {
        self.api.update_stack(*id, &model.expand_update()).await
    }

    async fn delete(&self, id: &i64, model: Option<&StackModel>) -> Result<(), ApiError> {
        let slug = match model {
            Some(model) => model.slug.clone(),
            None => self.api.stack(*id).await?.slug,
        };
        self.api.delete_stack(&slug).await
    }

    fn readiness_url(&self, model: &StackModel) -> Option<String> {
        if model.wait_for_readiness.unwrap_or(true) {
            model.url.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{Reconciler, ResourceHandler};
    use crate::state::ResourceState;
    use crate::testing::InMemoryCloud;
    use crate::validation::validate;

    fn remote() -> Stack {
        Stack {
            id: 42,
            name: "prod".to_string(),
            slug: "prod".to_string(),
            url: "https://prod.grafana.net".to_string(),
            status: "active".to_string(),
            region_slug: "us".to_string(),
            prometheus_url: "https://prometheus-us-central1.grafana.net/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_flatten_derives_prometheus_endpoints() {
        let cloud = Arc::new(InMemoryCloud::new());
        let model = CloudStack::new(cloud).flatten(remote());

        assert_eq!(
            model.prometheus_remote_endpoint.as_deref(),
            Some("https://prometheus-us-central1.grafana.net/api/prom")
        );
        assert_eq!(
            model.prometheus_remote_write_endpoint.as_deref(),
            Some("https://prometheus-us-central1.grafana.net/api/prom/push")
        );
        assert_eq!(model.description, None);
        assert_eq!(model.region_slug.as_deref(), Some("us"));
    }

    #[test]
    fn test_expand_update_sends_only_allowed_fields() {
        let model = StackModel {
            name: "prod".to_string(),
            slug: "prod".to_string(),
            description: Some("main".to_string()),
            region_slug: Some("eu".to_string()),
            url: Some("https://grafana.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(model.expand_update()).unwrap(),
            json!({"name": "prod", "slug": "prod", "description": "main"})
        );
    }

    #[test]
    fn test_schema_constraints() {
        let schema = CloudStack::resource_schema();

        let valid = json!({"name": "a", "slug": "prod", "region_slug": "eu"});
        assert!(validate(&schema, &valid).is_empty());
        let bad_region = json!({"name": "a", "slug": "prod", "region_slug": "mars"});
        assert_eq!(validate(&schema, &bad_region).len(), 1);
        assert_eq!(validate(&schema, &json!({"name": "a", "slug": "Prod"})).len(), 1);
        assert!(schema.block.is_force_new("region_slug"));
    }

    #[test]
    fn test_readiness_url_respects_opt_out() {
        let stacks = CloudStack::new(Arc::new(InMemoryCloud::new()));
        let mut model = stacks.flatten(remote());

        assert_eq!(
            stacks.readiness_url(&model).as_deref(),
            Some("https://prod.grafana.net")
        );
        model.wait_for_readiness = Some(false);
        assert_eq!(stacks.readiness_url(&model), None);
    }

    #[tokio::test]
    async fn test_delete_uses_slug() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = Reconciler::new(CloudStack::new(cloud.clone()));
        let desired = ResourceState::from_value(json!({"name": "Prod", "slug": "prodstack"})).unwrap();
        let created = stacks.create(&desired).await.unwrap();
        assert_eq!(cloud.stack_count(), 1);

        // Only the id is known: the slug is looked up first.
        let bare = ResourceState::with_id(created.id().unwrap());
        stacks.delete(&bare).await.unwrap();
        assert_eq!(cloud.stack_count(), 0);
    }

    #[tokio::test]
    async fn test_created_state_has_computed_fields() {
        let cloud = Arc::new(InMemoryCloud::new());
        let stacks = Reconciler::new(CloudStack::new(cloud));
        let desired = ResourceState::from_value(json!({"name": "Prod", "slug": "prod"})).unwrap();
        let created = stacks.create(&desired).await.unwrap();

        assert_eq!(created.get_str("url"), Some("https://prod.grafana.net"));
        assert_eq!(created.get_str("region_slug"), Some("us"));
        assert!(created.get("org_id").is_some());
        assert!(created
            .get_str("prometheus_remote_write_endpoint")
            .is_some_and(|url| url.ends_with("/api/prom/push")));

        // A second plan against the same configuration shows no drift.
        let plan = stacks.plan(Some(&created), &desired).unwrap();
        assert!(!plan.has_changes(), "unexpected drift: {:?}", plan.changes);
    }
}
