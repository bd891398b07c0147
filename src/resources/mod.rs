//! The resource kinds managed by this provider.
//!
//! Each kind implements [`Resource`](crate::reconciler::Resource) over one of
//! the API traits in [`crate::client`], and is registered with a
//! [`Provider`](crate::provider::Provider) wrapped in a
//! [`Reconciler`](crate::reconciler::Reconciler).

mod cloud_stack;
mod folder;
mod oncall_integration;

pub use cloud_stack::{CloudStack, StackModel};
pub use folder::{Folder, FolderModel};
pub use oncall_integration::{
    DefaultRouteBlock, IntegrationModel, OnCallIntegration, RouteSlackBlock, SlackTemplateBlock,
    TemplatesBlock, INTEGRATION_TYPES,
};

/// Empty strings from the API mean "unset".
fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
