//! `grafana_folder`: a dashboard folder.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::non_empty;
use crate::client::models::{CreateFolderInput, Folder as RemoteFolder, UpdateFolderInput};
use crate::client::{ApiError, FolderApi};
use crate::reconciler::Resource;
use crate::schema::{Attribute, Schema, Validator};

const TYPE_NAME: &str = "grafana_folder";

/// Local state of a folder. The numeric id is the resource identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderModel {
    /// Unique identifier; generated by Grafana when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Folder title.
    pub title: String,
    /// Full URL of the folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Manages folders through a [`FolderApi`].
#[derive(Clone)]
pub struct Folder {
    api: Arc<dyn FolderApi>,
    grafana_url: String,
}

impl Folder {
    /// Create the resource kind. `grafana_url` is the root URL folder paths
    /// are resolved against.
    pub fn new(api: Arc<dyn FolderApi>, grafana_url: impl Into<String>) -> Self {
        Self {
            api,
            grafana_url: grafana_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Schema of `grafana_folder`.
    pub fn resource_schema() -> Schema {
        Schema::v0()
            .with_description("A Grafana dashboard folder.")
            .with_attribute(
                "uid",
                Attribute::optional_computed_string()
                    .with_description("Unique identifier.")
                    .with_force_new()
                    .with_empty_as_unset(),
            )
            .with_attribute(
                "title",
                Attribute::required_string()
                    .with_description("The title of the folder.")
                    .with_validator(Validator::NotEmpty),
            )
            .with_attribute(
                "url",
                Attribute::computed_string().with_description("The full URL of the folder."),
            )
    }

    async fn uid(&self, id: i64, model: Option<&FolderModel>) -> Result<String, ApiError> {
        match model.and_then(|m| m.uid.clone()) {
            Some(uid) => Ok(uid),
            None => Ok(self.api.folder(id).await?.uid),
        }
    }
}

#[async_trait]
impl Resource for Folder {
    type Id = i64;
    type Model = FolderModel;
    type Remote = RemoteFolder;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Self::resource_schema()
    }

    fn mutable_attributes(&self) -> &'static [&'static str] {
        &["title"]
    }

    fn natural_key(&self, model: &FolderModel) -> String {
        model.uid.clone().unwrap_or_else(|| model.title.clone())
    }

    async fn create(&self, model: &FolderModel) -> Result<i64, ApiError> {
        let input = CreateFolderInput {
            uid: model.uid.clone(),
            title: model.title.clone(),
        };
        Ok(self.api.create_folder(&input).await?.id)
    }

    async fn get(&self, id: &i64) -> Result<RemoteFolder, ApiError> {
        self.api.folder(*id).await
    }

    fn flatten(&self, folder: RemoteFolder) -> FolderModel {
        let url = non_empty(folder.url).map(|path| format!("{}{}", self.grafana_url, path));
        FolderModel {
            uid: non_empty(folder.uid),
            title: folder.title,
            url,
        }
    }

    async fn update(&self, id: &i64, model: &FolderModel) -> Result<(), ApiError> {
        let uid = self.uid(*id, Some(model)).await?;
        let input = UpdateFolderInput {
            title: model.title.clone(),
            overwrite: true,
        };
        self.api.update_folder(&uid, &input).await.map(|_| ())
    }

    async fn delete(&self, id: &i64, model: Option<&FolderModel>) -> Result<(), ApiError> {
        let uid = self.uid(*id, model).await?;
        self.api.delete_folder(&uid).await
    }
}
