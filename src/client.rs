//! HTTP client for the FBA planner API.
//!
//! [`RemoteBackend`] lets an editing session run against a server instead of
//! an in-process database. The base URL comes from `FBA_PLANNER_URL`
//! (default: `http://127.0.0.1:8080/api`).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::models::*;
use crate::session::{PricingEngine, ProjectStore, SettingsStore};

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl From<ClientError> for Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Invalid(body) => Error::Validation(body),
            other => Error::Remote(other.to_string()),
        }
    }
}

/// Session backend that talks to a running `fbap serve`.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    base_url: String,
    client: Client,
}

impl RemoteBackend {
    pub fn from_env() -> Self {
        Self::new(SessionConfig::from_env().server_url)
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url)
    }

    /// Handle response, converting HTTP errors to ClientError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(body)),
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    Err(ClientError::Invalid(body))
                }
                _ => Err(ClientError::Server(format!("{}: {}", status, body))),
            }
        }
    }

    pub async fn calculate(
        &self,
        document: &CalculatorDocument,
    ) -> Result<CalculationResult, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/calculate")
            .json(document)
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ============================================================
    // Settings
    // ============================================================

    pub async fn get_settings(&self) -> Result<Settings, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/settings")
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn update_settings(&self, settings: &Settings) -> Result<Settings, ClientError> {
        let response = self
            .request(reqwest::Method::PUT, "/settings")
            .json(settings)
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ============================================================
    // Projects
    // ============================================================

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/projects")
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// The server-built forest.
    pub async fn get_project_tree(&self) -> Result<ProjectForest, ClientError> {
        let response = self
            .request(reqwest::Method::GET, "/projects/tree")
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn get_project(&self, id: Uuid) -> Result<ProjectSnapshot, ClientError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/projects/{}", id))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn create_project(
        &self,
        input: &SaveProjectInput,
    ) -> Result<ProjectSnapshot, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/projects")
            .json(input)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn update_project(
        &self,
        id: Uuid,
        input: &SaveProjectInput,
    ) -> Result<ProjectSnapshot, ClientError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/projects/{}", id))
            .json(input)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn create_branch(
        &self,
        parent_id: Uuid,
        input: &CreateBranchInput,
    ) -> Result<ProjectSnapshot, ClientError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/projects/{}/branch", parent_id))
            .json(input)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn delete_project(&self, id: Uuid) -> Result<DeletedProjects, ClientError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/projects/{}", id))
            .send()
            .await?;
        self.handle_response(response).await
    }
}

#[async_trait]
impl PricingEngine for RemoteBackend {
    async fn calculate(&self, document: &CalculatorDocument) -> crate::Result<CalculationResult> {
        Ok(RemoteBackend::calculate(self, document).await?)
    }
}

#[async_trait]
impl SettingsStore for RemoteBackend {
    async fn get_settings(&self) -> crate::Result<Settings> {
        Ok(RemoteBackend::get_settings(self).await?)
    }

    async fn update_settings(&self, settings: Settings) -> crate::Result<Settings> {
        Ok(RemoteBackend::update_settings(self, &settings).await?)
    }
}

#[async_trait]
impl ProjectStore for RemoteBackend {
    async fn list_projects(&self) -> crate::Result<Vec<ProjectSummary>> {
        Ok(RemoteBackend::list_projects(self).await?)
    }

    async fn get_project(&self, id: Uuid) -> crate::Result<ProjectSnapshot> {
        Ok(RemoteBackend::get_project(self, id).await?)
    }

    async fn create_project(
        &self,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> crate::Result<ProjectSnapshot> {
        let input = SaveProjectInput {
            meta,
            input: document,
        };
        Ok(RemoteBackend::create_project(self, &input).await?)
    }

    async fn update_project(
        &self,
        id: Uuid,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> crate::Result<ProjectSnapshot> {
        let input = SaveProjectInput {
            meta,
            input: document,
        };
        Ok(RemoteBackend::update_project(self, id, &input).await?)
    }

    async fn create_branch(
        &self,
        parent_id: Uuid,
        meta: ProjectMeta,
    ) -> crate::Result<ProjectSnapshot> {
        Ok(RemoteBackend::create_branch(self, parent_id, &CreateBranchInput { meta }).await?)
    }

    async fn delete_project(&self, id: Uuid) -> crate::Result<DeletedProjects> {
        Ok(RemoteBackend::delete_project(self, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_session_errors() {
        let err: Error = ClientError::Invalid("adPercentage is required".into()).into();
        assert_eq!(err, Error::Validation("adPercentage is required".into()));

        let err: Error = ClientError::NotFound("Project not found".into()).into();
        assert!(matches!(err, Error::Remote(msg) if msg.contains("Project not found")));
    }

    #[test]
    fn new_keeps_the_base_url() {
        let backend = RemoteBackend::new("http://localhost:9999/api");
        assert_eq!(backend.base_url(), "http://localhost:9999/api");
    }
}
