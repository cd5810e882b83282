use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{AccountId, ArtifactRef, ProjectId, VersionId};

/// Lifecycle state of a single version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    New,
    Edited,
    Running,
    Success,
    Failure,
    Discarded,
}

impl VersionStatus {
    /// The version may still be changed and may be the project's open version.
    pub fn is_modifiable(self) -> bool {
        matches!(self, Self::New | Self::Edited)
    }

    /// A run may be started against the version.
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::New | Self::Edited | Self::Failure | Self::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Edited => "edited",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Discarded => "discarded",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a simulation is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationEngine {
    #[default]
    Local,
    Remote,
}

/// Which simulation library the setup targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputingLibrary {
    #[default]
    Shield,
    Fluka,
}

/// User-facing simulation settings attached to a version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub simulation_engine: SimulationEngine,
    #[serde(default)]
    pub computing_library: ComputingLibrary,
}

/// One entry in a project's version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub status: VersionStatus,
    pub settings: Settings,
    /// Reference into the `setup` table; never embedded.
    pub setup_id: ArtifactRef,
    /// Reference into the `result` table; never embedded.
    pub result_id: ArtifactRef,
    pub updated_at: DateTime<Utc>,
}

/// A project together with its ordered, append-only version history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub account: AccountId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub versions: Vec<Version>,
}

impl Project {
    /// A project without any version; the repair procedure adds version 0.
    pub fn new(account: AccountId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: ProjectId::generate(),
            account,
            name: name.into(),
            description: description.into(),
            versions: Vec::new(),
        }
    }

    pub fn version(&self, id: VersionId) -> Option<&Version> {
        self.versions.get(id.index())
    }

    pub fn latest(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Ordinal the next appended version will receive.
    pub fn next_version_id(&self) -> VersionId {
        VersionId(self.versions.len() as u32)
    }
}

/// Structured simulation configuration backing a version.
///
/// The body is opaque to the core; only the model converter interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub body: Value,
}

impl Setup {
    pub fn empty() -> Self {
        Self {
            body: Value::Object(Default::default()),
        }
    }
}

impl Default for Setup {
    fn default() -> Self {
        Self::empty()
    }
}

/// Structured output of a simulation run, as produced by the result parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub body: Value,
}

impl SimulationResult {
    pub fn empty() -> Self {
        Self {
            body: Value::Object(Default::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.body {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }
}

impl Default for SimulationResult {
    fn default() -> Self {
        Self::empty()
    }
}
