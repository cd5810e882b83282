use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Project, Version};
use crate::types::{AccountId, ProjectId};

pub const PROJECT_TABLE: &str = "project";
pub const SETUP_TABLE: &str = "setup";
pub const RESULT_TABLE: &str = "result";

/// Persisted representation of a project (table: `project`).
///
/// The record key equals `project_id`; it is repeated as a plain field so
/// reads never have to decode the record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub project_id: ProjectId,
    pub account: AccountId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered version history; index equals the version ordinal.
    #[serde(default)]
    pub versions: Vec<Version>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Project> for ProjectDocument {
    fn from(project: &Project) -> Self {
        Self {
            project_id: project.id.clone(),
            account: project.account.clone(),
            name: project.name.clone(),
            description: project.description.clone(),
            versions: project.versions.clone(),
            updated_at: Utc::now(),
        }
    }
}

impl From<ProjectDocument> for Project {
    fn from(doc: ProjectDocument) -> Self {
        Self {
            id: doc.project_id,
            account: doc.account,
            name: doc.name,
            description: doc.description,
            versions: doc.versions,
        }
    }
}

/// Persisted setup or result artifact (tables: `setup`, `result`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDocument {
    pub body: Value,
    pub updated_at: DateTime<Utc>,
}

impl ArtifactDocument {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            updated_at: Utc::now(),
        }
    }
}
