// jobmesh-extension/src/model.rs
// ============================================================================
// Module: Extension Model
// Description: Manifest tree, remote metadata, and release descriptions.
// Purpose: Define the persisted and exchanged shapes of extension data.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The manifest is a tree: owners hold projects, projects hold installed
//! releases and point at one active tag. Projects are addressed by their
//! command name, which is unique across the manifest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Installed extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Last write time.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Repository owners with installed projects.
    #[serde(default)]
    pub repository_owners: Vec<RepositoryOwner>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            updated_at: OffsetDateTime::UNIX_EPOCH,
            repository_owners: Vec::new(),
        }
    }
}

impl Manifest {
    /// Finds the project serving `command_name`.
    #[must_use]
    pub fn find_by_command(
        &self,
        command_name: &str,
    ) -> Option<(&RepositoryOwner, &RepositoryProject)> {
        self.repository_owners.iter().find_map(|owner| {
            owner
                .projects
                .iter()
                .find(|project| project.command_name == command_name)
                .map(|project| (owner, project))
        })
    }

    /// Finds the project serving `command_name`, mutably.
    pub fn find_by_command_mut(&mut self, command_name: &str) -> Option<&mut RepositoryProject> {
        self.repository_owners
            .iter_mut()
            .flat_map(|owner| owner.projects.iter_mut())
            .find(|project| project.command_name == command_name)
    }

    /// Finds a project by owner and project name.
    pub fn project_mut(
        &mut self,
        owner_name: &str,
        project_name: &str,
    ) -> Option<&mut RepositoryProject> {
        self.repository_owners
            .iter_mut()
            .filter(|owner| owner.name == owner_name)
            .flat_map(|owner| owner.projects.iter_mut())
            .find(|project| project.name == project_name)
    }

    /// Returns true when `owner/project@tag` is installed.
    #[must_use]
    pub fn is_installed(&self, owner_name: &str, project_name: &str, tag_name: &str) -> bool {
        self.repository_owners
            .iter()
            .filter(|owner| owner.name == owner_name)
            .flat_map(|owner| owner.projects.iter())
            .filter(|project| project.name == project_name)
            .any(|project| project.release(tag_name).is_some())
    }

    /// Returns every installed project with its owner.
    #[must_use]
    pub fn projects(&self) -> Vec<(&RepositoryOwner, &RepositoryProject)> {
        self.repository_owners
            .iter()
            .flat_map(|owner| owner.projects.iter().map(move |project| (owner, project)))
            .collect()
    }
}

/// Repository owner on a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOwner {
    /// Owner name.
    pub name: String,
    /// Provider name, for example `github`.
    pub provider: String,
    /// Installed projects.
    #[serde(default)]
    pub projects: Vec<RepositoryProject>,
}

/// Installed extension project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryProject {
    /// Project (repository) name.
    pub name: String,
    /// Command used to invoke the extension.
    pub command_name: String,
    /// Directory holding one binary per installed tag.
    pub local_dir_path: PathBuf,
    /// Tag run by the command.
    pub active_tag_name: String,
    /// Installed releases in install order.
    #[serde(default)]
    pub releases: Vec<RepositoryRelease>,
}

impl RepositoryProject {
    /// Returns the installed release with `tag_name`.
    #[must_use]
    pub fn release(&self, tag_name: &str) -> Option<&RepositoryRelease> {
        self.releases.iter().find(|release| release.tag_name == tag_name)
    }

    /// Returns the active release.
    #[must_use]
    pub fn active_release(&self) -> Option<&RepositoryRelease> {
        self.release(&self.active_tag_name)
    }

    /// Returns the binary path of `tag_name`.
    #[must_use]
    pub fn binary_path(&self, tag_name: &str) -> PathBuf {
        self.local_dir_path.join(tag_name)
    }
}

/// Installed release of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRelease {
    /// Release tag.
    pub tag_name: String,
    /// API path describing this release.
    pub current_api_path: String,
    /// API path describing the latest release.
    pub upgrade_api_path: String,
    /// Release assets.
    #[serde(default)]
    pub assets: Vec<RepositoryAsset>,
}

/// Downloadable release asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryAsset {
    /// Asset file name.
    pub name: String,
    /// Download URL.
    pub url: String,
}

// ============================================================================
// SECTION: Remote Metadata
// ============================================================================

/// Identity parsed from a remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Provider name, for example `github`.
    pub provider_name: String,
    /// Repository owner.
    pub owner_name: String,
    /// Repository name.
    pub project_name: String,
    /// Default command name.
    pub command_name: String,
    /// Install directory relative to the extension root.
    pub local_dir_path: PathBuf,
    /// Requested tag; empty for latest.
    pub tag_name: String,
    /// API path of the requested tag; empty for latest.
    pub current_api_path: String,
    /// API path of the latest release.
    pub upgrade_api_path: String,
}

impl RemoteMetadata {
    /// Returns the API path to download: the pinned tag when set, otherwise
    /// the latest release.
    #[must_use]
    pub fn download_api_path(&self) -> &str {
        if self.current_api_path.is_empty() {
            &self.upgrade_api_path
        } else {
            &self.current_api_path
        }
    }
}
