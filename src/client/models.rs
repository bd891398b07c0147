//! Wire types exchanged with the Grafana APIs.
//!
//! Optional pointer-like fields are `Option`s that are skipped when unset, so
//! "not sent" and "sent as empty string" stay distinguishable on the wire.

use serde::{Deserialize, Serialize};

/// A Grafana Cloud stack as returned by the Cloud API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub id: i64,
    #[serde(default)]
    pub org_id: i64,
    #[serde(default)]
    pub org_slug: String,
    #[serde(default)]
    pub org_name: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub region_slug: String,

    #[serde(default, rename = "hmInstancePromId")]
    pub prometheus_id: i64,
    #[serde(default, rename = "hmInstancePromUrl")]
    pub prometheus_url: String,
    #[serde(default, rename = "hmInstancePromName")]
    pub prometheus_name: String,
    #[serde(default, rename = "hmInstancePromStatus")]
    pub prometheus_status: String,

    #[serde(default, rename = "hlInstanceId")]
    pub logs_id: i64,
    #[serde(default, rename = "hlInstanceUrl")]
    pub logs_url: String,
    #[serde(default, rename = "hlInstanceName")]
    pub logs_name: String,
    #[serde(default, rename = "hlInstanceStatus")]
    pub logs_status: String,

    #[serde(default, rename = "amInstanceId")]
    pub alertmanager_id: i64,
    #[serde(default, rename = "amInstanceName")]
    pub alertmanager_name: String,
    #[serde(default, rename = "amInstanceUrl")]
    pub alertmanager_url: String,
    #[serde(default, rename = "amInstanceStatus")]
    pub alertmanager_status: String,
}

/// Body of a stack creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStackInput {
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of a stack update request. The Cloud API only changes these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStackInput {
    pub name: String,
    pub slug: String,
    pub description: String,
}

/// An OnCall integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub link: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route: Option<DefaultRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Templates>,
}

/// The route alerts take when no other route matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRoute {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_chain_id: Option<String>,
    #[serde(default, rename = "slack", skip_serializing_if = "Option::is_none")]
    pub slack_route: Option<SlackRoute>,
}

/// Slack destination of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Alert rendering templates of an integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<SlackTemplate>,
}

/// Slack message templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Body of an integration creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIntegrationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_route: Option<DefaultRoute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<Templates>,
}

/// Body of an integration update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateIntegrationOptions {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_route: Option<DefaultRoute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<Templates>,
}

/// A Grafana folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub uid: String,
    pub title: String,
    /// Path of the folder relative to the Grafana root URL.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: i64,
}

/// Body of a folder creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFolderInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub title: String,
}

/// Body of a folder update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFolderInput {
    pub title: String,
    /// Skip Grafana's optimistic version check.
    pub overwrite: bool,
}
