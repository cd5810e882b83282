// SurrealDB implementation of the project store.
//
// Projects are addressed by (project_id, account) so a caller can never reach
// another account's project by guessing an id. Artifacts are addressed by
// their record key only.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use surrealdb::RecordId;

use crate::db::connection::Db;
use crate::db::schema::*;
use crate::db::store::ProjectStore;
use crate::error::{CoreError, CoreResult};
use crate::model::{Project, Setup, SimulationResult, VersionStatus};
use crate::types::{AccountId, ArtifactRef, ProjectRef, VersionRef};

/// Project store backed by SurrealDB.
#[derive(Clone)]
pub struct SurrealStore {
    db: Db,
}

impl SurrealStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn create_artifact(&self, table: &'static str, body: Value) -> CoreResult<ArtifactRef> {
        let id = ArtifactRef::generate();

        self.db
            .query("CREATE type::thing($tb, $key) CONTENT $content RETURN NONE")
            .bind(("tb", table))
            .bind(("key", id.as_str().to_string()))
            .bind(("content", ArtifactDocument::new(body)))
            .await?
            .check()?;

        Ok(id)
    }

    async fn fetch_artifact(&self, table: &'static str, id: &ArtifactRef) -> CoreResult<Value> {
        let mut res = self
            .db
            .query("SELECT * OMIT id FROM type::thing($tb, $key)")
            .bind(("tb", table))
            .bind(("key", id.as_str().to_string()))
            .await?;

        let docs: Vec<ArtifactDocument> = res.take(0)?;
        docs.into_iter()
            .next()
            .map(|doc| doc.body)
            .ok_or_else(|| CoreError::not_found(format!("{} {}", table, id)))
    }

    async fn update_artifact(
        &self,
        table: &'static str,
        id: &ArtifactRef,
        body: Value,
    ) -> CoreResult<()> {
        let mut res = self
            .db
            .query("UPDATE type::thing($tb, $key) SET body = $body, updated_at = $now RETURN VALUE id")
            .bind(("tb", table))
            .bind(("key", id.as_str().to_string()))
            .bind(("body", body))
            .bind(("now", Utc::now()))
            .await?;

        let touched: Vec<RecordId> = res.take(0)?;
        if touched.is_empty() {
            return Err(CoreError::not_found(format!("{} {}", table, id)));
        }
        Ok(())
    }

    async fn delete_artifact(&self, table: &'static str, id: &ArtifactRef) -> CoreResult<()> {
        self.db
            .query("DELETE type::thing($tb, $key)")
            .bind(("tb", table))
            .bind(("key", id.as_str().to_string()))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for SurrealStore {
    async fn fetch_project(&self, id: &ProjectRef) -> CoreResult<Project> {
        let mut res = self
            .db
            .query(
                r#"
                SELECT * OMIT id FROM project
                WHERE project_id = $project_id
                  AND account = $account
                LIMIT 1
                "#,
            )
            .bind(("project_id", id.project.as_str().to_string()))
            .bind(("account", id.account.as_str().to_string()))
            .await?;

        let docs: Vec<ProjectDocument> = res.take(0)?;
        docs.into_iter()
            .next()
            .map(Project::from)
            .ok_or_else(|| CoreError::not_found(format!("project {}", id)))
    }

    async fn list_projects(&self, account: &AccountId) -> CoreResult<Vec<Project>> {
        let mut res = self
            .db
            .query(
                r#"
                SELECT * OMIT id FROM project
                WHERE account = $account
                ORDER BY name
                "#,
            )
            .bind(("account", account.as_str().to_string()))
            .await?;

        let docs: Vec<ProjectDocument> = res.take(0)?;
        Ok(docs.into_iter().map(Project::from).collect())
    }

    async fn create_project(&self, project: &Project) -> CoreResult<()> {
        self.db
            .query("CREATE type::thing($tb, $key) CONTENT $content RETURN NONE")
            .bind(("tb", PROJECT_TABLE))
            .bind(("key", project.id.as_str().to_string()))
            .bind(("content", ProjectDocument::from(project)))
            .await?
            .check()?;
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> CoreResult<()> {
        let mut res = self
            .db
            .query(
                r#"
                UPDATE project CONTENT $content
                WHERE project_id = $project_id
                  AND account = $account
                RETURN VALUE project_id
                "#,
            )
            .bind(("content", ProjectDocument::from(project)))
            .bind(("project_id", project.id.as_str().to_string()))
            .bind(("account", project.account.as_str().to_string()))
            .await?;

        let touched: Vec<String> = res.take(0)?;
        if touched.is_empty() {
            return Err(CoreError::not_found(format!(
                "project {}/{}",
                project.account, project.id
            )));
        }
        Ok(())
    }

    async fn delete_project(&self, id: &ProjectRef) -> CoreResult<()> {
        let project = self.fetch_project(id).await?;

        for version in &project.versions {
            self.delete_setup(&version.setup_id).await?;
            self.delete_result(&version.result_id).await?;
        }

        self.db
            .query(
                r#"
                DELETE project
                WHERE project_id = $project_id
                  AND account = $account
                "#,
            )
            .bind(("project_id", id.project.as_str().to_string()))
            .bind(("account", id.account.as_str().to_string()))
            .await?
            .check()?;

        tracing::debug!("Deleted project {} with {} versions", id, project.versions.len());
        Ok(())
    }

    async fn set_version_status(&self, id: &VersionRef, status: VersionStatus) -> CoreResult<()> {
        // The ordinal is a plain integer, so formatting it into the path is safe.
        let query = format!(
            r#"
            UPDATE project SET versions[{idx}].status = $status
            WHERE project_id = $project_id
              AND account = $account
              AND array::len(versions) > {idx}
            RETURN VALUE project_id
            "#,
            idx = id.version.index()
        );

        let mut res = self
            .db
            .query(query)
            .bind(("status", status))
            .bind(("project_id", id.project.as_str().to_string()))
            .bind(("account", id.account.as_str().to_string()))
            .await?;

        let touched: Vec<String> = res.take(0)?;
        if touched.is_empty() {
            return Err(CoreError::not_found(format!("version {}", id)));
        }
        Ok(())
    }

    async fn create_setup(&self, setup: &Setup) -> CoreResult<ArtifactRef> {
        self.create_artifact(SETUP_TABLE, setup.body.clone()).await
    }

    async fn fetch_setup(&self, id: &ArtifactRef) -> CoreResult<Setup> {
        let body = self.fetch_artifact(SETUP_TABLE, id).await?;
        Ok(Setup { body })
    }

    async fn delete_setup(&self, id: &ArtifactRef) -> CoreResult<()> {
        self.delete_artifact(SETUP_TABLE, id).await
    }

    async fn create_result(&self, result: &SimulationResult) -> CoreResult<ArtifactRef> {
        self.create_artifact(RESULT_TABLE, result.body.clone()).await
    }

    async fn fetch_result(&self, id: &ArtifactRef) -> CoreResult<SimulationResult> {
        let body = self.fetch_artifact(RESULT_TABLE, id).await?;
        Ok(SimulationResult { body })
    }

    async fn update_result(&self, id: &ArtifactRef, result: &SimulationResult) -> CoreResult<()> {
        self.update_artifact(RESULT_TABLE, id, result.body.clone()).await
    }

    async fn delete_result(&self, id: &ArtifactRef) -> CoreResult<()> {
        self.delete_artifact(RESULT_TABLE, id).await
    }
}
