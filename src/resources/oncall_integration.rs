//! `grafana_oncall_integration`: an alert source in Grafana OnCall.
//!
//! `default_route` and `templates` are single nested blocks. A block is only
//! sent when at least one of its fields is set, and reading back produces no
//! block when the remote leaves every optional field unset.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::non_empty;
use crate::client::models::{
    CreateIntegrationOptions, DefaultRoute, Integration, SlackRoute, SlackTemplate, Templates,
    UpdateIntegrationOptions,
};
use crate::client::{ApiError, IntegrationApi};
use crate::reconciler::Resource;
use crate::schema::{Attribute, Block, NestedBlock, Schema, Validator};
use crate::state::single_block;

const TYPE_NAME: &str = "grafana_oncall_integration";

/// Integration types accepted by OnCall.
pub const INTEGRATION_TYPES: &[&str] = &[
    "grafana",
    "webhook",
    "alertmanager",
    "kapacitor",
    "fabric",
    "newrelic",
    "datadog",
    "pagerduty",
    "pingdom",
    "elastalert",
    "amazon_sns",
    "curler",
    "sentry",
    "formatted_webhook",
    "heartbeat",
    "demo",
    "manual",
    "stackdriver",
    "uptimerobot",
    "sentry_platform",
    "zabbix",
    "prtg",
    "slack_channel",
    "inbound_email",
];

/// Local state of an integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationModel {
    /// Display name.
    pub name: String,
    /// Integration type, one of [`INTEGRATION_TYPES`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Owning team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Link to the integration, set by OnCall.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Route taken when no other route matches.
    #[serde(
        default,
        with = "single_block",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_route: Option<DefaultRouteBlock>,
    /// Alert rendering templates.
    #[serde(
        default,
        with = "single_block",
        skip_serializing_if = "Option::is_none"
    )]
    pub templates: Option<TemplatesBlock>,
}

/// The `default_route` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRouteBlock {
    /// Route id, set by OnCall.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Escalation chain alerts are sent to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_chain_id: Option<String>,
    /// Slack channel alerts are posted to.
    #[serde(
        default,
        with = "single_block",
        skip_serializing_if = "Option::is_none"
    )]
    pub slack: Option<RouteSlackBlock>,
}

/// The `default_route.slack` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSlackBlock {
    /// Slack channel id.
    pub channel_id: String,
}

/// The `templates` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatesBlock {
    /// Template deciding whether an alert resolves its group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_signal: Option<String>,
    /// Template producing the key alerts are grouped by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_key: Option<String>,
    /// Slack rendering.
    #[serde(
        default,
        with = "single_block",
        skip_serializing_if = "Option::is_none"
    )]
    pub slack: Option<SlackTemplateBlock>,
}

/// The `templates.slack` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackTemplateBlock {
    /// Message title template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Message body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Image URL template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn expand_templates(block: Option<&TemplatesBlock>) -> Option<Templates> {
    let block = block?;
    let templates = Templates {
        grouping_key: block.grouping_key.clone(),
        resolve_signal: block.resolve_signal.clone(),
        slack: expand_slack_template(block.slack.as_ref()),
    };
    if templates.grouping_key.is_none()
        && templates.resolve_signal.is_none()
        && templates.slack.is_none()
    {
        return None;
    }
    Some(templates)
}

fn expand_slack_template(block: Option<&SlackTemplateBlock>) -> Option<SlackTemplate> {
    let block = block?;
    if block.title.is_none() && block.message.is_none() && block.image_url.is_none() {
        return None;
    }
    Some(SlackTemplate {
        title: block.title.clone(),
        message: block.message.clone(),
        image_url: block.image_url.clone(),
    })
}

fn expand_default_route(block: Option<&DefaultRouteBlock>) -> Option<DefaultRoute> {
    let block = block?;
    let slack_route = block.slack.as_ref().map(|slack| SlackRoute {
        channel_id: Some(slack.channel_id.clone()),
    });
    if block.escalation_chain_id.is_none() && slack_route.is_none() {
        return None;
    }
    Some(DefaultRoute {
        id: block.id.clone().unwrap_or_default(),
        escalation_chain_id: block.escalation_chain_id.clone(),
        slack_route,
    })
}

fn flatten_templates(templates: Option<Templates>) -> Option<TemplatesBlock> {
    let templates = templates?;
    let slack = templates.slack.and_then(|slack| {
        let block = SlackTemplateBlock {
            title: slack.title,
            message: slack.message,
            image_url: slack.image_url,
        };
        (block != SlackTemplateBlock::default()).then_some(block)
    });
    let block = TemplatesBlock {
        resolve_signal: templates.resolve_signal,
        grouping_key: templates.grouping_key,
        slack,
    };
    (block != TemplatesBlock::default()).then_some(block)
}

fn flatten_default_route(route: Option<DefaultRoute>) -> Option<DefaultRouteBlock> {
    let route = route?;
    let slack = route
        .slack_route
        .and_then(|slack| slack.channel_id)
        .map(|channel_id| RouteSlackBlock { channel_id });
    if route.escalation_chain_id.is_none() && slack.is_none() {
        return None;
    }
    Some(DefaultRouteBlock {
        id: non_empty(route.id),
        escalation_chain_id: route.escalation_chain_id,
        slack,
    })
}

/// Manages OnCall integrations through an [`IntegrationApi`].
#[derive(Clone)]
pub struct OnCallIntegration {
    api: Arc<dyn IntegrationApi>,
}

impl OnCallIntegration {
    /// Create the resource kind over `api`.
    pub fn new(api: Arc<dyn IntegrationApi>) -> Self {
        Self { api }
    }

    /// Schema of `grafana_oncall_integration`.
    pub fn resource_schema() -> Schema {
        let route = Block::new()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("escalation_chain_id", Attribute::optional_string())
            .with_block(
                "slack",
                NestedBlock::single(
                    Block::new().with_attribute("channel_id", Attribute::required_string()),
                ),
            );

        let templates = Block::new()
            .with_attribute("resolve_signal", Attribute::optional_string())
            .with_attribute("grouping_key", Attribute::optional_string())
            .with_block(
                "slack",
                NestedBlock::single(
                    Block::new()
                        .with_attribute("title", Attribute::optional_string())
                        .with_attribute("message", Attribute::optional_string())
                        .with_attribute("image_url", Attribute::optional_string()),
                ),
            );

        Schema::v0()
            .with_description("An OnCall integration.")
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("The name of the integration.")
                    .with_validator(Validator::NotEmpty),
            )
            .with_attribute(
                "team_id",
                Attribute::optional_string().with_description("The ID of the OnCall team."),
            )
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_description("The type of integration.")
                    .with_force_new()
                    .with_validator(Validator::one_of(INTEGRATION_TYPES.iter().copied())),
            )
            .with_attribute(
                "link",
                Attribute::computed_string().with_description("The link for using in an integrated tool."),
            )
            .with_block("default_route", NestedBlock::single(route))
            .with_block("templates", NestedBlock::single(templates))
    }
}

#[async_trait]
impl Resource for OnCallIntegration {
    type Id = String;
    type Model = IntegrationModel;
    type Remote = Integration;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Self::resource_schema()
    }

    fn mutable_attributes(&self) -> &'static [&'static str] {
        &["name", "templates", "default_route"]
    }

    fn natural_key(&self, model: &IntegrationModel) -> String {
        model.name.clone()
    }

    async fn create(&self, model: &IntegrationModel) -> Result<String, ApiError> {
        let options = CreateIntegrationOptions {
            team_id: model.team_id.clone(),
            name: model.name.clone(),
            kind: model.kind.clone(),
            default_route: expand_default_route(model.default_route.as_ref()),
            templates: expand_templates(model.templates.as_ref()),
        };
        Ok(self.api.create_integration(&options).await?.id)
    }

    async fn get(&self, id: &String) -> Result<Integration, ApiError> {
        self.api.integration(id).await
    }

    fn flatten(&self, integration: Integration) -> IntegrationModel {
        IntegrationModel {
            name: integration.name,
            kind: integration.kind,
            team_id: integration.team_id,
            link: non_empty(integration.link),
            default_route: flatten_default_route(integration.default_route),
            templates: flatten_templates(integration.templates),
        }
    }

    async fn update(&self, id: &String, model: &IntegrationModel) -> Result<(), ApiError> {
        let mut default_route = expand_default_route(model.default_route.as_ref());
        if let Some(route) = default_route.as_mut().filter(|r| r.id.is_empty()) {
            // The route id is only kept in state while the route is configured.
            if let Some(current) = self.api.integration(id).await?.default_route {
                route.id = current.id;
            }
        }

        let options = UpdateIntegrationOptions {
            name: model.name.clone(),
            default_route,
            templates: expand_templates(model.templates.as_ref()),
        };
        self.api.update_integration(id, &options).await.map(|_| ())
    }

    async fn delete(&self, id: &String, _model: Option<&IntegrationModel>) -> Result<(), ApiError> {
        self.api.delete_integration(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::reconciler::{Reconciler, ResourceHandler};
    use crate::state::ResourceState;
    use crate::testing::InMemoryCloud;
    use crate::validation::validate;
    use serde_json::json;

    fn state(value: serde_json::Value) -> ResourceState {
        ResourceState::from_value(value).unwrap()
    }

    #[test]
    fn test_expand_skips_empty_blocks() {
        assert_eq!(expand_templates(Some(&TemplatesBlock::default())), None);
        assert_eq!(expand_default_route(Some(&DefaultRouteBlock::default())), None);
        assert_eq!(expand_templates(None), None);

        let block = TemplatesBlock {
            grouping_key: Some(String::new()),
            ..Default::default()
        };
        // An explicit empty string is still a value.
        assert_eq!(
            expand_templates(Some(&block)).and_then(|t| t.grouping_key),
            Some(String::new())
        );
    }

    #[test]
    fn test_flatten_expand_round_trip() {
        let remote = Templates {
            grouping_key: Some("{{ payload.id }}".to_string()),
            resolve_signal: None,
            slack: Some(SlackTemplate {
                title: Some("{{ payload.title }}".to_string()),
                message: None,
                image_url: None,
            }),
        };
        let flattened = flatten_templates(Some(remote.clone()));
        assert_eq!(expand_templates(flattened.as_ref()), Some(remote));

        let route = DefaultRoute {
            id: "R1".to_string(),
            escalation_chain_id: Some("E1".to_string()),
            slack_route: Some(SlackRoute {
                channel_id: Some("C1".to_string()),
            }),
        };
        let flattened = flatten_default_route(Some(route.clone()));
        assert_eq!(expand_default_route(flattened.as_ref()), Some(route));
    }

    #[test]
    fn test_flatten_unset_remote_blocks() {
        let route = DefaultRoute {
            id: "R1".to_string(),
            escalation_chain_id: None,
            slack_route: Some(SlackRoute { channel_id: None }),
        };
        assert_eq!(flatten_default_route(Some(route)), None);
        assert_eq!(
            flatten_templates(Some(Templates {
                slack: Some(SlackTemplate::default()),
                ..Default::default()
            })),
            None
        );
    }

    #[test]
    fn test_schema_rejects_unknown_type_and_empty_name() {
        let schema = OnCallIntegration::resource_schema();
        assert!(validate(&schema, &json!({"name": "a", "type": "webhook"})).is_empty());
        assert_eq!(validate(&schema, &json!({"name": "a", "type": "email"})).len(), 1);
        assert_eq!(validate(&schema, &json!({"name": "", "type": "grafana"})).len(), 1);
        assert_eq!(
            validate(&schema, &json!({"name": "a", "type": "grafana", "templates": [{}, {}]}))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_keeps_route_id() {
        let cloud = Arc::new(InMemoryCloud::new());
        let integrations = Reconciler::new(OnCallIntegration::new(cloud.clone()));
        let created = integrations
            .create(&state(json!({"name": "alerts", "type": "grafana"})))
            .await
            .unwrap();
        assert!(created.get("default_route").is_none());

        let desired = state(json!({
            "name": "alerts",
            "type": "grafana",
            "default_route": [{"escalation_chain_id": "E1", "slack": [{"channel_id": "C1"}]}]
        }));
        let updated = integrations.update(&created, &desired).await.unwrap();

        let route = &updated.get("default_route").unwrap()[0];
        assert_eq!(route["escalation_chain_id"], json!("E1"));
        assert_eq!(route["slack"], json!([{"channel_id": "C1"}]));
        let stored = cloud.integration_route_id(created.id().unwrap());
        assert_eq!(route["id"], json!(stored));
    }

    #[tokio::test]
    async fn test_empty_team_id_is_kept() {
        let cloud = Arc::new(InMemoryCloud::new());
        let integrations = Reconciler::new(OnCallIntegration::new(cloud.clone()));
        let desired = state(json!({"name": "alerts", "type": "grafana", "team_id": ""}));
        let created = integrations.create(&desired).await.unwrap();
        assert_eq!(created.get_str("team_id"), Some(""));

        let plan = integrations.plan(Some(&created), &desired).unwrap();
        assert!(!plan.has_changes(), "unexpected drift: {:?}", plan.changes);

        let writes = cloud.writes();
        integrations.update(&created, &desired).await.unwrap();
        assert_eq!(cloud.writes(), writes);
    }

    #[tokio::test]
    async fn test_type_change_is_rejected() {
        let cloud = Arc::new(InMemoryCloud::new());
        let integrations = Reconciler::new(OnCallIntegration::new(cloud.clone()));
        let created = integrations
            .create(&state(json!({"name": "alerts", "type": "grafana"})))
            .await
            .unwrap();

        let desired = state(json!({"name": "alerts", "type": "webhook", "team_id": "T1"}));
        let plan = integrations.plan(Some(&created), &desired).unwrap();
        assert!(plan.requires_replace);

        let err = integrations.update(&created, &desired).await.unwrap_err();
        match err {
            ProviderError::Validation(msg) => {
                assert!(msg.contains("team_id, type"), "message: {msg}");
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
