//! Grafana Provider
//!
//! Declarative management of Grafana resources: describe the desired state of
//! a Grafana Cloud stack, an OnCall integration or a dashboard folder as JSON,
//! and the provider plans, creates, refreshes, updates, imports and deletes the
//! remote object to match.
//!
//! # Overview
//!
//! - **Schemas**: every resource type declares its attributes, defaults,
//!   validators and which attributes force replacement ([`schema`])
//! - **State**: an opaque id plus attributes, stored between runs ([`state`])
//! - **Planning**: a pure diff of desired against prior state, with computed
//!   values carried over and empty blocks normalized away ([`plan`])
//! - **Reconciliation**: a generic lifecycle over the [`Resource`] trait,
//!   including drift detection and conflict handling ([`reconciler`])
//! - **Readiness**: bounded exponential backoff until a new stack answers
//!   HTTP 200 ([`readiness`])
//! - **Clients**: typed Grafana Cloud, OnCall and folder APIs ([`client`])
//! - **Logging**: `tracing` output on stderr ([`logging`])
//!
//! # Quick Start
//!
//! ```
//! use grafana_provider::{Provider, ProviderConfig, ResourceState};
//! use serde_json::json;
//!
//! let config = ProviderConfig::from_value(&json!({
//!     "url": "https://grafana.example.com",
//!     "auth": "admin:admin",
//! }))?
//! .with_env_fallback();
//! let provider = Provider::from_config(&config)?;
//!
//! let desired = ResourceState::from_value(json!({"title": "Ops"}))?;
//! let plan = provider.plan("grafana_folder", None, &desired)?;
//! assert!(plan.has_changes());
//! # Ok::<(), grafana_provider::ProviderError>(())
//! ```
//!
//! # Resource Types
//!
//! | Type | Needs | Id |
//! |------|-------|----|
//! | `grafana_cloud_stack` | `cloud_api_key` | numeric stack id |
//! | `grafana_oncall_integration` | `oncall_access_token` | integration id |
//! | `grafana_folder` | `url` and `auth` | numeric folder id |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod readiness;
pub mod reconciler;
pub mod resources;
pub mod schema;
pub mod state;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::Provider;
pub use reconciler::{Reconciler, Resource, ResourceHandler};
pub use schema::ProviderSchema;
pub use state::ResourceState;
pub use types::{AttributeChange, ImportedResource, PlanResult};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;

pub use serde_json;
pub use tracing;
