//! Remote API clients.
//!
//! Resources talk to Grafana through the traits in this module. Each trait
//! covers one API surface and reports failures as an [`ApiError`], so the
//! reconciler dispatches on what went wrong rather than on message text.
//!
//! [`HttpClient`] implements all three traits over `reqwest`; tests use the
//! in-memory fakes from [`crate::testing`].

mod http;
#[allow(missing_docs)]
pub mod models;

pub use http::{Credentials, HttpClient};

use async_trait::async_trait;
use thiserror::Error;

use models::{
    CreateFolderInput, CreateIntegrationOptions, CreateStackInput, Folder, Integration, Stack,
    UpdateFolderInput, UpdateIntegrationOptions, UpdateStackInput,
};

/// Classified failure of a remote API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The object collides with an existing one (HTTP 409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The object does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other failure: connection errors, unexpected statuses, bad bodies.
    #[error("{0}")]
    Transport(String),
}

impl ApiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            404 => Self::NotFound(body),
            409 => Self::Conflict(body),
            _ => Self::Transport(format!("status: {}, body: {}", status, body)),
        }
    }
}

/// Grafana Cloud stack management.
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Create a stack.
    async fn create_stack(&self, input: &CreateStackInput) -> Result<Stack, ApiError>;

    /// Fetch a stack by numeric id.
    async fn stack(&self, id: i64) -> Result<Stack, ApiError>;

    /// Update the mutable fields of a stack.
    async fn update_stack(&self, id: i64, input: &UpdateStackInput) -> Result<(), ApiError>;

    /// Delete a stack. The Cloud API addresses deletions by slug.
    async fn delete_stack(&self, slug: &str) -> Result<(), ApiError>;
}

/// Grafana OnCall integration management.
#[async_trait]
pub trait IntegrationApi: Send + Sync {
    /// Create an integration.
    async fn create_integration(
        &self,
        options: &CreateIntegrationOptions,
    ) -> Result<Integration, ApiError>;

    /// Fetch an integration by id.
    async fn integration(&self, id: &str) -> Result<Integration, ApiError>;

    /// Update an integration.
    async fn update_integration(
        &self,
        id: &str,
        options: &UpdateIntegrationOptions,
    ) -> Result<Integration, ApiError>;

    /// Delete an integration.
    async fn delete_integration(&self, id: &str) -> Result<(), ApiError>;
}

/// Grafana folder management.
#[async_trait]
pub trait FolderApi: Send + Sync {
    /// Create a folder.
    async fn create_folder(&self, input: &CreateFolderInput) -> Result<Folder, ApiError>;

    /// Fetch a folder by numeric id.
    async fn folder(&self, id: i64) -> Result<Folder, ApiError>;

    /// Update a folder, addressed by uid.
    async fn update_folder(&self, uid: &str, input: &UpdateFolderInput)
        -> Result<Folder, ApiError>;

    /// Delete a folder, addressed by uid.
    async fn delete_folder(&self, uid: &str) -> Result<(), ApiError>;
}
