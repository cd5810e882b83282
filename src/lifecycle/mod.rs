//! Version lifecycle engine.
//!
//! Owns every structural change to a project's version history and keeps the
//! history converging toward "only the latest version is open for editing".
//! Writes are read-modify-write over the whole project document and are not
//! isolated from concurrent writers (last writer wins).

pub mod repair;

pub use repair::{holds_single_open_version, plan_repair, RepairAction};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::ProjectStore;
use crate::error::{CoreError, CoreResult};
use crate::model::{Project, Settings, Setup, SimulationResult, Version, VersionStatus};
use crate::types::{AccountId, ArtifactRef, ProjectRef, VersionRef};

/// Contents a new version is created from.
struct VersionPrototype {
    settings: Settings,
    setup: Setup,
}

impl VersionPrototype {
    fn blank() -> Self {
        Self {
            settings: Settings::default(),
            setup: Setup::empty(),
        }
    }
}

pub struct VersionLifecycle {
    store: Arc<dyn ProjectStore>,
}

impl VersionLifecycle {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Insert a project and give it its first open version.
    pub async fn create_project(
        &self,
        account: AccountId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> CoreResult<Project> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::Validation("project name can not be empty".to_string()));
        }

        let project = Project::new(account, name, description);
        let id = ProjectRef::new(project.account.clone(), project.id.clone());

        self.store.create_project(&project).await?;
        info!("Created project {}", id);

        self.ensure_single_editable_version(&id).await?;
        self.store.fetch_project(&id).await
    }

    pub async fn fetch_project(&self, id: &ProjectRef) -> CoreResult<Project> {
        self.store.fetch_project(id).await
    }

    pub async fn list_projects(&self, account: &AccountId) -> CoreResult<Vec<Project>> {
        self.store.list_projects(account).await
    }

    pub async fn update_project_details(
        &self,
        id: &ProjectRef,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> CoreResult<Project> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::Validation("project name can not be empty".to_string()));
        }

        let mut project = self.store.fetch_project(id).await?;
        project.name = name;
        project.description = description.into();
        self.store.update_project(&project).await?;
        Ok(project)
    }

    /// Delete a project together with every version's setup and result.
    pub async fn delete_project(&self, id: &ProjectRef) -> CoreResult<()> {
        self.store.delete_project(id).await?;
        info!("Deleted project {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Append a blank version (status `New`) and repair the history.
    pub async fn create_version(&self, id: &ProjectRef) -> CoreResult<Version> {
        let project = self.store.fetch_project(id).await?;
        let version = self.append_version(project, VersionPrototype::blank()).await?;
        self.ensure_single_editable_version(id).await?;
        Ok(version)
    }

    /// Append a version that copies `source`'s settings and setup, with an
    /// empty result, and repair the history.
    pub async fn create_version_from(&self, source: &VersionRef) -> CoreResult<Version> {
        let id = source.project_ref();
        let project = self.store.fetch_project(&id).await?;
        let version = self.fork_version(project, source).await?;
        self.ensure_single_editable_version(&id).await?;
        Ok(version)
    }

    /// Fork the latest version, or create the first one if there is none.
    pub async fn create_version_from_latest(&self, id: &ProjectRef) -> CoreResult<Version> {
        let project = self.store.fetch_project(id).await?;
        match project.latest() {
            None => self.create_version(id).await,
            Some(latest) => self.create_version_from(&id.version(latest.id)).await,
        }
    }

    /// Replace a version's settings and mark it `Edited`.
    pub async fn update_version(&self, id: &VersionRef, settings: Settings) -> CoreResult<Version> {
        let mut project = self.store.fetch_project(&id.project_ref()).await?;
        let version = project
            .versions
            .get_mut(id.version.index())
            .ok_or_else(|| CoreError::not_found(format!("version {}", id)))?;

        version.settings = settings;
        version.status = VersionStatus::Edited;
        version.updated_at = Utc::now();
        let updated = version.clone();

        self.store.update_project(&project).await?;
        debug!("Updated settings of version {}", id);
        Ok(updated)
    }

    pub async fn update_version_timestamp(&self, id: &VersionRef) -> CoreResult<()> {
        let mut project = self.store.fetch_project(&id.project_ref()).await?;
        let version = project
            .versions
            .get_mut(id.version.index())
            .ok_or_else(|| CoreError::not_found(format!("version {}", id)))?;

        version.updated_at = Utc::now();
        self.store.update_project(&project).await
    }

    pub async fn fetch_version(&self, id: &VersionRef) -> CoreResult<Version> {
        let project = self.store.fetch_project(&id.project_ref()).await?;
        project
            .version(id.version)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("version {}", id)))
    }

    pub async fn fetch_version_status(&self, id: &VersionRef) -> CoreResult<VersionStatus> {
        Ok(self.fetch_version(id).await?.status)
    }

    /// Record a new status for one version, then repair the history.
    ///
    /// This is the only way `Running`, `Success` and `Failure` get recorded.
    pub async fn set_version_status(&self, id: &VersionRef, status: VersionStatus) -> CoreResult<()> {
        self.store.set_version_status(id, status).await?;
        debug!("Version {} is now {}", id, status);
        self.ensure_single_editable_version(&id.project_ref()).await
    }

    /// Drive the project to "at most the latest version is modifiable".
    ///
    /// Each pass re-reads the project, plans one corrective action and
    /// applies it; the loop ends on the first pass that needs nothing.
    pub async fn ensure_single_editable_version(&self, id: &ProjectRef) -> CoreResult<()> {
        let mut budget: Option<usize> = None;

        loop {
            let project = self.store.fetch_project(id).await?;
            let remaining = budget.get_or_insert(project.versions.len() + 2);

            let action = plan_repair(&project.versions);
            if action == RepairAction::None {
                return Ok(());
            }

            if *remaining == 0 {
                warn!("Version history of {} did not converge", id);
                return Err(CoreError::Internal(format!(
                    "version history of {} did not converge",
                    id
                )));
            }
            *remaining -= 1;

            match action {
                RepairAction::CreateInitial => {
                    let version = self.append_version(project, VersionPrototype::blank()).await?;
                    info!("Created initial version {} for {}", version.id, id);
                }
                RepairAction::ForkLatest => {
                    let Some(latest) = project.latest() else {
                        continue;
                    };
                    let source = id.version(latest.id);
                    let version = self.fork_version(project, &source).await?;
                    info!("Opened version {} of {} from closed {}", version.id, id, source.version);
                }
                RepairAction::Discard(stale) => {
                    self.store
                        .set_version_status(&id.version(stale), VersionStatus::Discarded)
                        .await?;
                    info!("Discarded stale open version {} of {}", stale, id);
                }
                RepairAction::None => return Ok(()),
            }
        }
    }

    async fn fork_version(&self, project: Project, source: &VersionRef) -> CoreResult<Version> {
        let existing = project
            .version(source.version)
            .ok_or_else(|| CoreError::not_found(format!("version {}", source)))?;

        let setup = self.store.fetch_setup(&existing.setup_id).await?;
        let prototype = VersionPrototype {
            settings: existing.settings.clone(),
            setup,
        };
        self.append_version(project, prototype).await
    }

    /// Create the child artifacts, append the version and write the project back.
    async fn append_version(&self, mut project: Project, prototype: VersionPrototype) -> CoreResult<Version> {
        let setup_id = self.store.create_setup(&prototype.setup).await?;
        let result_id = match self.store.create_result(&SimulationResult::empty()).await {
            Ok(result_id) => result_id,
            Err(e) => {
                self.remove_orphans(&setup_id, None).await;
                return Err(e);
            }
        };

        let version = Version {
            id: project.next_version_id(),
            status: VersionStatus::New,
            settings: prototype.settings,
            setup_id,
            result_id,
            updated_at: Utc::now(),
        };
        project.versions.push(version.clone());

        if let Err(e) = self.store.update_project(&project).await {
            self.remove_orphans(&version.setup_id, Some(&version.result_id)).await;
            return Err(e);
        }

        Ok(version)
    }

    /// Delete artifacts created for a version that was never stored.
    async fn remove_orphans(&self, setup_id: &ArtifactRef, result_id: Option<&ArtifactRef>) {
        if let Err(e) = self.store.delete_setup(setup_id).await {
            warn!("Failed to remove orphaned setup {}: {}", setup_id, e);
        }
        if let Some(result_id) = result_id {
            if let Err(e) = self.store.delete_result(result_id).await {
                warn!("Failed to remove orphaned result {}: {}", result_id, e);
            }
        }
    }
}
