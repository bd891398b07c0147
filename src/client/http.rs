use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{
    CreateFolderInput, CreateIntegrationOptions, CreateStackInput, Folder, Integration, Stack,
    UpdateFolderInput, UpdateIntegrationOptions, UpdateStackInput,
};
use super::{ApiError, FolderApi, IntegrationApi, StackApi};
use crate::error::ProviderError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How requests are authenticated.
#[derive(Clone)]
pub enum Credentials {
    /// `Authorization: Bearer <token>` (Cloud API keys, Grafana service accounts).
    Bearer(String),
    /// HTTP basic auth.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `Authorization: <token>` as expected by the OnCall API.
    Token(String),
}

impl Credentials {
    /// Interpret a Grafana `auth` setting: `user:password` or a token.
    pub fn from_grafana_auth(auth: &str) -> Self {
        match auth.split_once(':') {
            Some((username, password)) => Self::Basic {
                username: username.to_string(),
                password: password.to_string(),
            },
            None => Self::Bearer(auth.to_string()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Basic { username, .. } => write!(f, "Basic({}:<redacted>)", username),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
        }
    }
}

/// JSON-over-HTTP client for one Grafana API base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl HttpClient {
    /// Build a client rooted at `base_url`.
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, ProviderError> {
        let mut parsed = Url::parse(base_url).map_err(|e| {
            ProviderError::Configuration(format!("invalid API url '{}': {}", base_url, e))
        })?;
        // Url::join drops the last path segment unless it ends with '/'.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("grafana-provider/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: parsed,
            credentials,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport(format!("invalid request path '{}': {}", path, e)))?;
        debug!(%method, %url, "Sending API request");

        let builder = self.http.request(method, url);
        Ok(match &self.credentials {
            Credentials::Bearer(token) => builder.bearer_auth(token),
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            },
            Credentials::Token(token) => builder.header(AUTHORIZATION, token),
        })
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), body))
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        self.execute(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Transport(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl StackApi for HttpClient {
    async fn create_stack(&self, input: &CreateStackInput) -> Result<Stack, ApiError> {
        let req = self.request(Method::POST, "api/instances")?.json(input);
        self.json(req).await
    }

    async fn stack(&self, id: i64) -> Result<Stack, ApiError> {
        let req = self.request(Method::GET, &format!("api/instances/{}", id))?;
        self.json(req).await
    }

    async fn update_stack(&self, id: i64, input: &UpdateStackInput) -> Result<(), ApiError> {
        let req = self
            .request(Method::POST, &format!("api/instances/{}", id))?
            .json(input);
        self.execute(req).await.map(|_| ())
    }

    async fn delete_stack(&self, slug: &str) -> Result<(), ApiError> {
        let req = self.request(Method::DELETE, &format!("api/instances/{}", slug))?;
        self.execute(req).await.map(|_| ())
    }
}

#[async_trait]
impl IntegrationApi for HttpClient {
    async fn create_integration(
        &self,
        options: &CreateIntegrationOptions,
    ) -> Result<Integration, ApiError> {
        let req = self
            .request(Method::POST, "api/v1/integrations/")?
            .json(options);
        self.json(req).await
    }

    async fn integration(&self, id: &str) -> Result<Integration, ApiError> {
        let req = self.request(Method::GET, &format!("api/v1/integrations/{}/", id))?;
        self.json(req).await
    }

    async fn update_integration(
        &self,
        id: &str,
        options: &UpdateIntegrationOptions,
    ) -> Result<Integration, ApiError> {
        let req = self
            .request(Method::PUT, &format!("api/v1/integrations/{}/", id))?
            .json(options);
        self.json(req).await
    }

    async fn delete_integration(&self, id: &str) -> Result<(), ApiError> {
        let req = self.request(Method::DELETE, &format!("api/v1/integrations/{}/", id))?;
        self.execute(req).await.map(|_| ())
    }
}

#[async_trait]
impl FolderApi for HttpClient {
    async fn create_folder(&self, input: &CreateFolderInput) -> Result<Folder, ApiError> {
        let req = self.request(Method::POST, "api/folders")?.json(input);
        self.json(req).await
    }

    async fn folder(&self, id: i64) -> Result<Folder, ApiError> {
        let req = self.request(Method::GET, &format!("api/folders/id/{}", id))?;
        self.json(req).await
    }

    async fn update_folder(
        &self,
        uid: &str,
        input: &UpdateFolderInput,
    ) -> Result<Folder, ApiError> {
        let req = self
            .request(Method::PUT, &format!("api/folders/{}", uid))?
            .json(input);
        self.json(req).await
    }

    async fn delete_folder(&self, uid: &str) -> Result<(), ApiError> {
        let req = self.request(Method::DELETE, &format!("api/folders/{}", uid))?;
        self.execute(req).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = HttpClient::new(
            "https://oncall-prod-us-central-0.grafana.net/oncall",
            Credentials::Token("t".to_string()),
        )
        .unwrap();
        let url = client
            .base_url()
            .join("api/v1/integrations/ABC/")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://oncall-prod-us-central-0.grafana.net/oncall/api/v1/integrations/ABC/"
        );
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        let err = HttpClient::new("not a url", Credentials::Bearer("k".to_string())).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_grafana_auth_forms() {
        assert!(matches!(
            Credentials::from_grafana_auth("admin:secret"),
            Credentials::Basic { ref username, .. } if username == "admin"
        ));
        assert!(matches!(
            Credentials::from_grafana_auth("glsa_token"),
            Credentials::Bearer(_)
        ));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let shown = format!("{:?}", Credentials::from_grafana_auth("admin:secret"));
        assert!(!shown.contains("secret"));
        assert!(shown.contains("admin"));
    }
}
