//! Error types for the Grafana provider.

use thiserror::Error;

use crate::client::ApiError;
use crate::readiness::ReadinessError;
use crate::state::ResourceState;

/// Errors returned by provider and reconciler operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The desired state is invalid or asks for a change that cannot be applied.
    ///
    /// Raised before any remote call is made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The remote API rejected a call. The API error is kept as-is.
    #[error("{resource_type} {id}: {source}")]
    Api {
        /// Resource type the call was made for.
        resource_type: String,
        /// Identifier of the resource, or `<new>` during creation.
        id: String,
        /// The error reported by the API client.
        #[source]
        source: ApiError,
    },

    /// The resource was created or updated but never became reachable.
    ///
    /// The refreshed state is carried along so the caller keeps tracking the
    /// resource.
    #[error("error waiting for {resource_type} {id} to be ready: {source}")]
    Readiness {
        /// Resource type that was being waited on.
        resource_type: String,
        /// Identifier of the resource.
        id: String,
        /// Authoritative state read back after the mutating call.
        state: Box<ResourceState>,
        /// Why the wait ended.
        #[source]
        source: ReadinessError,
    },
}

impl ProviderError {
    /// Wrap an API error with the resource it was raised for.
    pub fn api(resource_type: impl Into<String>, id: impl ToString, source: ApiError) -> Self {
        Self::Api {
            resource_type: resource_type.into(),
            id: id.to_string(),
            source,
        }
    }

    /// Get the error message as a string.
    ///
    /// Returns the inner message for message-carrying variants and the full
    /// display text otherwise.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::AlreadyExists(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this error reports a create conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether this error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::Api {
                    source: ApiError::NotFound(_),
                    ..
                }
        )
    }

    /// State that was committed before the error, if any.
    ///
    /// Only readiness failures carry one: the remote object exists even though
    /// the operation as a whole failed.
    pub fn partial_state(&self) -> Option<&ResourceState> {
        match self {
            Self::Readiness { state, .. } => Some(state),
            _ => None,
        }
    }
}
