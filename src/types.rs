//! NewType wrappers for the identifiers that key projects, versions and artifacts.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing an account id where a project id is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Identifier of the account that owns a project.
    ///
    /// Every project lookup is scoped by account, so a project id alone is
    /// never enough to reach a project.
    AccountId
);

newtype_string!(
    /// Identifier of a project, unique across accounts.
    ProjectId
);

newtype_string!(
    /// Opaque reference to a setup or result artifact stored outside the
    /// project document.
    ArtifactRef
);

impl ProjectId {
    /// Generate a fresh random project id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl ArtifactRef {
    /// Generate a fresh random artifact reference.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Ordinal position of a version inside its project.
///
/// Versions are append-only, so the ordinal doubles as the version's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u32);

impl VersionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for VersionId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of a project: the owning account plus the project id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub account: AccountId,
    pub project: ProjectId,
}

impl ProjectRef {
    pub fn new(account: impl Into<AccountId>, project: impl Into<ProjectId>) -> Self {
        Self {
            account: account.into(),
            project: project.into(),
        }
    }

    /// Key of the version at `version` inside this project.
    pub fn version(&self, version: impl Into<VersionId>) -> VersionRef {
        VersionRef {
            account: self.account.clone(),
            project: self.project.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.project)
    }
}

/// Composite key of a single version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    pub account: AccountId,
    pub project: ProjectId,
    pub version: VersionId,
}

impl VersionRef {
    pub fn project_ref(&self) -> ProjectRef {
        ProjectRef {
            account: self.account.clone(),
            project: self.project.clone(),
        }
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.account, self.project, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ref_round_trips_to_project_ref() {
        let project = ProjectRef::new("acc", "proj");
        let version = project.version(3);

        assert_eq!(version.version, VersionId(3));
        assert_eq!(version.project_ref(), project);
        assert_eq!(version.to_string(), "acc/proj@3");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(ProjectId::generate(), ProjectId::generate());
        assert_ne!(ArtifactRef::generate(), ArtifactRef::generate());
    }

    #[test]
    fn test_newtype_serializes_transparently() {
        let id = AccountId::new("acc-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"acc-1\"");
        assert_eq!(serde_json::to_string(&VersionId(7)).unwrap(), "7");
    }
}
