//! Collaborators an editing session talks to.
//!
//! [`RemoteBackend`](crate::client::RemoteBackend) reaches them over HTTP;
//! [`LocalBackend`] calls the pricing engine and the database in process.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::*;
use crate::pricing;

#[async_trait]
pub trait PricingEngine: Send + Sync + 'static {
    /// Fails with [`Error::Validation`] for malformed input, [`Error::Remote`] otherwise.
    async fn calculate(&self, document: &CalculatorDocument) -> Result<CalculationResult>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    async fn get_settings(&self) -> Result<Settings>;
    async fn update_settings(&self, settings: Settings) -> Result<Settings>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync + 'static {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>>;
    async fn get_project(&self, id: Uuid) -> Result<ProjectSnapshot>;
    async fn create_project(
        &self,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> Result<ProjectSnapshot>;
    async fn update_project(
        &self,
        id: Uuid,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> Result<ProjectSnapshot>;
    async fn create_branch(&self, parent_id: Uuid, meta: ProjectMeta) -> Result<ProjectSnapshot>;
    /// Delete `id` and all of its descendants.
    async fn delete_project(&self, id: Uuid) -> Result<DeletedProjects>;
}

/// Everything a session needs.
pub trait Backend: PricingEngine + SettingsStore + ProjectStore {}

impl<T: PricingEngine + SettingsStore + ProjectStore> Backend for T {}

/// In-process backend over a [`Database`].
#[derive(Clone)]
pub struct LocalBackend {
    db: Database,
}

impl LocalBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn store_error(e: anyhow::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(err) => err,
        Err(e) => Error::remote(format!("{e:#}")),
    }
}

fn missing(id: Uuid) -> Error {
    Error::remote(format!("project {id} not found"))
}

#[async_trait]
impl PricingEngine for LocalBackend {
    async fn calculate(&self, document: &CalculatorDocument) -> Result<CalculationResult> {
        pricing::calculate(document)
    }
}

#[async_trait]
impl SettingsStore for LocalBackend {
    async fn get_settings(&self) -> Result<Settings> {
        self.db.get_settings().map_err(store_error)
    }

    async fn update_settings(&self, settings: Settings) -> Result<Settings> {
        self.db.update_settings(settings).map_err(store_error)
    }
}

#[async_trait]
impl ProjectStore for LocalBackend {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.db.get_project_summaries().map_err(store_error)
    }

    async fn get_project(&self, id: Uuid) -> Result<ProjectSnapshot> {
        self.db
            .get_project(id)
            .map_err(store_error)?
            .ok_or_else(|| missing(id))
    }

    async fn create_project(
        &self,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> Result<ProjectSnapshot> {
        self.db
            .create_project(SaveProjectInput {
                meta,
                input: document,
            })
            .map_err(store_error)
    }

    async fn update_project(
        &self,
        id: Uuid,
        meta: ProjectMeta,
        document: CalculatorDocument,
    ) -> Result<ProjectSnapshot> {
        self.db
            .update_project(
                id,
                SaveProjectInput {
                    meta,
                    input: document,
                },
            )
            .map_err(store_error)?
            .ok_or_else(|| missing(id))
    }

    async fn create_branch(&self, parent_id: Uuid, meta: ProjectMeta) -> Result<ProjectSnapshot> {
        self.db
            .create_branch(parent_id, CreateBranchInput { meta })
            .map_err(store_error)?
            .ok_or_else(|| missing(parent_id))
    }

    async fn delete_project(&self, id: Uuid) -> Result<DeletedProjects> {
        let deleted_ids = self.db.delete_project_cascade(id).map_err(store_error)?;
        if deleted_ids.is_empty() {
            return Err(missing(id));
        }
        Ok(DeletedProjects { deleted_ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LocalBackend {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        LocalBackend::new(db)
    }

    #[tokio::test]
    async fn domain_errors_survive_the_store_boundary() {
        let backend = backend();
        let err = backend
            .create_project(ProjectMeta::new("", ""), CalculatorDocument::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn missing_projects_are_remote_errors() {
        let backend = backend();
        let err = backend.get_project(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Remote(msg) if msg.contains("not found")));

        let err = backend.delete_project(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }
}
