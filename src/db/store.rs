//! Persistence port for projects and their setup/result artifacts.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{Project, Setup, SimulationResult, VersionStatus};
use crate::types::{AccountId, ArtifactRef, ProjectRef, VersionRef};

/// Storage operations the lifecycle engine and the result pipeline rely on.
///
/// Project writes are whole-aggregate replacements except for
/// [`ProjectStore::set_version_status`], which touches a single field.
/// Nothing here is transactional across calls.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn fetch_project(&self, id: &ProjectRef) -> CoreResult<Project>;

    async fn list_projects(&self, account: &AccountId) -> CoreResult<Vec<Project>>;

    async fn create_project(&self, project: &Project) -> CoreResult<()>;

    /// Replace the stored aggregate. `NotFound` if it does not exist.
    async fn update_project(&self, project: &Project) -> CoreResult<()>;

    /// Delete the project and every setup/result artifact its versions reference.
    async fn delete_project(&self, id: &ProjectRef) -> CoreResult<()>;

    /// Overwrite one version's status. `NotFound` if the project or ordinal is absent.
    async fn set_version_status(&self, id: &VersionRef, status: VersionStatus) -> CoreResult<()>;

    async fn create_setup(&self, setup: &Setup) -> CoreResult<ArtifactRef>;

    async fn fetch_setup(&self, id: &ArtifactRef) -> CoreResult<Setup>;

    async fn delete_setup(&self, id: &ArtifactRef) -> CoreResult<()>;

    async fn create_result(&self, result: &SimulationResult) -> CoreResult<ArtifactRef>;

    async fn fetch_result(&self, id: &ArtifactRef) -> CoreResult<SimulationResult>;

    async fn update_result(&self, id: &ArtifactRef, result: &SimulationResult) -> CoreResult<()>;

    async fn delete_result(&self, id: &ArtifactRef) -> CoreResult<()>;
}
