// jobmesh-extension/src/manager.rs
// ============================================================================
// Module: Extension Manager
// Description: Install, upgrade, activate, uninstall, rename, and run.
// Purpose: Maintain the extension manifest and installed binaries.
// Dependencies: crate::{error, fs, model, provider, runner}, jobmesh-core
// ============================================================================

//! ## Overview
//! The manager keeps one YAML manifest under its root directory. Every
//! mutating operation loads the manifest, validates the request against it,
//! touches binaries through the [`ExtensionFs`] seam, and flushes the
//! rebuilt manifest with an atomic write. Binaries live at
//! `<root>/<provider host>/<owner>/<repo>/<tag>`.
//!
//! Invariants:
//! - Command names are unique across the manifest.
//! - Every project has at least one release and its active tag is installed.
//! - Operations are serialized within one manager.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use jobmesh_core::Clock;
use jobmesh_core::OperationContext;
use tracing::info;
use tracing::warn;

use crate::error::ExtensionError;
use crate::fs::BINARY_MODE;
use crate::fs::DIRECTORY_MODE;
use crate::fs::ExtensionFs;
use crate::fs::MANIFEST_MODE;
use crate::model::Manifest;
use crate::model::RemoteMetadata;
use crate::model::RepositoryOwner;
use crate::model::RepositoryProject;
use crate::model::RepositoryRelease;
use crate::provider::ProviderRegistry;
use crate::provider::ReleaseClient;
use crate::runner::CommandRunner;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Manifest file name under the extension root.
pub const MANIFEST_FILE_NAME: &str = "manifest.yaml";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Extension manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtensionManagerConfig {
    /// Root directory holding the manifest and binaries.
    pub root: PathBuf,
    /// Command names owned by the host program.
    pub reserved_commands: Vec<String>,
}

/// Outcome of an install or upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExtension {
    /// Repository owner.
    pub owner_name: String,
    /// Repository name.
    pub project_name: String,
    /// Command name.
    pub command_name: String,
    /// Active tag after the operation.
    pub tag_name: String,
    /// Binary of the active tag.
    pub binary_path: PathBuf,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Extension lifecycle manager.
pub struct ExtensionManager {
    /// Root directory.
    root: PathBuf,
    /// Reserved command names.
    reserved: BTreeSet<String>,
    /// Filesystem seam.
    fs: Arc<dyn ExtensionFs>,
    /// Parsers and clients.
    providers: ProviderRegistry,
    /// Process seam.
    runner: Arc<dyn CommandRunner>,
    /// Clock for manifest timestamps.
    clock: Arc<dyn Clock>,
    /// Serializes manifest read-modify-write cycles.
    lock: Mutex<()>,
}

impl ExtensionManager {
    /// Creates a manager.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Config`] when the root is empty or no
    /// provider is registered.
    pub fn new(
        config: ExtensionManagerConfig,
        fs: Arc<dyn ExtensionFs>,
        providers: ProviderRegistry,
        runner: Arc<dyn CommandRunner>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ExtensionError> {
        if config.root.as_os_str().is_empty() {
            return Err(ExtensionError::Config("extension root is empty".to_string()));
        }
        if providers.providers().is_empty() {
            return Err(ExtensionError::Config("no extension provider registered".to_string()));
        }
        Ok(Self {
            root: config.root,
            reserved: config.reserved_commands.into_iter().collect(),
            fs,
            providers,
            runner,
            clock,
            lock: Mutex::new(()),
        })
    }

    /// Returns the manifest path.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    /// Loads the manifest; a missing manifest is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Manifest`] when the manifest cannot be read
    /// or decoded.
    pub fn load_manifest(&self) -> Result<Manifest, ExtensionError> {
        let path = self.manifest_path();
        let bytes = self
            .fs
            .read(&path)
            .map_err(|err| ExtensionError::Manifest(format!("error loading manifest: {err}")))?;
        match bytes {
            None => Ok(Manifest::default()),
            Some(bytes) => serde_yaml::from_slice(&bytes)
                .map_err(|err| ExtensionError::Manifest(format!("error decoding manifest: {err}"))),
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Installs the release named by `remote_path`.
    ///
    /// `command_name` overrides the command derived from the repository.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::EmptyRemotePath`],
    /// [`ExtensionError::UnrecognizedRemotePath`], a reserved or conflicting
    /// command, an already installed release, or client, filesystem, and
    /// manifest failures.
    pub fn install(
        &self,
        ctx: &OperationContext,
        remote_path: &str,
        command_name: Option<&str>,
    ) -> Result<InstalledExtension, ExtensionError> {
        if remote_path.trim().is_empty() {
            return Err(ExtensionError::EmptyRemotePath);
        }
        let _guard = self.guard()?;
        let mut metadata = self.providers.parse(remote_path)?;
        let mut manifest = self.load_manifest()?;
        let client = self.providers.client(&metadata.provider_name)?;
        let release = client.download_release(ctx, metadata.download_api_path())?;
        metadata.tag_name.clone_from(&release.tag_name);
        metadata.current_api_path.clone_from(&release.current_api_path);
        metadata.upgrade_api_path.clone_from(&release.upgrade_api_path);
        if let Some(command_name) = command_name.map(str::trim).filter(|name| !name.is_empty()) {
            metadata.command_name = command_name.to_string();
        }

        self.check_reserved(&metadata.command_name)?;
        check_command_owner(
            &manifest,
            &metadata.command_name,
            &metadata.owner_name,
            &metadata.project_name,
        )?;
        if manifest.is_installed(&metadata.owner_name, &metadata.project_name, &metadata.tag_name) {
            return Err(ExtensionError::Conflict(format!(
                "[{}/{}@{}] is already installed",
                metadata.owner_name, metadata.project_name, metadata.tag_name
            )));
        }

        let local_dir = self.root.join(&metadata.local_dir_path);
        let binary_path = self.install_binary(ctx, client.as_ref(), &local_dir, &release)?;
        let project = upsert_release(&mut manifest, &metadata, local_dir, release);
        let installed = InstalledExtension {
            owner_name: metadata.owner_name,
            project_name: metadata.project_name,
            command_name: project.command_name.clone(),
            tag_name: project.active_tag_name.clone(),
            binary_path,
        };
        self.flush(manifest)?;
        info!(command = %installed.command_name, tag = %installed.tag_name, "extension installed");
        Ok(installed)
    }

    /// Moves an extension to its latest release.
    ///
    /// When the latest release is already installed it only becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::EmptyCommandName`], not installed, corrupted
    /// manifest, or client, filesystem, and manifest failures.
    pub fn upgrade(
        &self,
        ctx: &OperationContext,
        command_name: &str,
    ) -> Result<InstalledExtension, ExtensionError> {
        require(command_name, ExtensionError::EmptyCommandName)?;
        let _guard = self.guard()?;
        let mut manifest = self.load_manifest()?;
        let (owner, project) =
            manifest.find_by_command(command_name).ok_or_else(|| not_installed(command_name))?;
        let client = self.providers.client(&owner.provider)?;
        let current = project
            .active_release()
            .ok_or_else(|| {
                ExtensionError::Manifest(format!(
                    "manifest file is corrupted based on [{command_name}]"
                ))
            })?;
        let upgrade = client.download_release(ctx, &current.upgrade_api_path)?;
        let metadata = RemoteMetadata {
            provider_name: owner.provider.clone(),
            owner_name: owner.name.clone(),
            project_name: project.name.clone(),
            command_name: project.command_name.clone(),
            local_dir_path: project.local_dir_path.clone(),
            tag_name: upgrade.tag_name.clone(),
            current_api_path: upgrade.current_api_path.clone(),
            upgrade_api_path: upgrade.upgrade_api_path.clone(),
        };
        let local_dir = project.local_dir_path.clone();
        let already_installed = project.release(&upgrade.tag_name).is_some();

        let binary_path = if already_installed {
            local_dir.join(&upgrade.tag_name)
        } else {
            self.install_binary(ctx, client.as_ref(), &local_dir, &upgrade)?
        };
        let project = upsert_release(&mut manifest, &metadata, local_dir, upgrade);
        let installed = InstalledExtension {
            owner_name: metadata.owner_name,
            project_name: metadata.project_name,
            command_name: project.command_name.clone(),
            tag_name: project.active_tag_name.clone(),
            binary_path,
        };
        self.flush(manifest)?;
        info!(command = %installed.command_name, tag = %installed.tag_name, "extension upgraded");
        Ok(installed)
    }

    /// Makes an installed tag the active one.
    ///
    /// # Errors
    ///
    /// Returns empty argument errors, not installed command or tag, or
    /// manifest failures.
    pub fn activate(
        &self,
        ctx: &OperationContext,
        command_name: &str,
        tag_name: &str,
    ) -> Result<(), ExtensionError> {
        require(command_name, ExtensionError::EmptyCommandName)?;
        require(tag_name, ExtensionError::EmptyTagName)?;
        ctx.check().map_err(|err| ExtensionError::Run(err.message))?;
        let _guard = self.guard()?;
        let mut manifest = self.load_manifest()?;
        let project =
            manifest.find_by_command_mut(command_name).ok_or_else(|| not_installed(command_name))?;
        if project.release(tag_name).is_none() {
            return Err(ExtensionError::NotFound(format!("tag [{tag_name}] is not installed")));
        }
        project.active_tag_name = tag_name.to_string();
        self.flush(manifest)?;
        info!(command = command_name, tag = tag_name, "extension activated");
        Ok(())
    }

    /// Removes one tag, or every tag when `tag_name` is `None`.
    ///
    /// The project disappears with its last release; when the active tag is
    /// removed the first remaining release becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::EmptyCommandName`], not installed command or
    /// tag, or filesystem and manifest failures.
    pub fn uninstall(
        &self,
        ctx: &OperationContext,
        command_name: &str,
        tag_name: Option<&str>,
    ) -> Result<(), ExtensionError> {
        require(command_name, ExtensionError::EmptyCommandName)?;
        ctx.check().map_err(|err| ExtensionError::Run(err.message))?;
        let _guard = self.guard()?;
        let mut manifest = self.load_manifest()?;
        let (_, project) =
            manifest.find_by_command(command_name).ok_or_else(|| not_installed(command_name))?;
        let project_name = project.name.clone();
        let local_dir = project.local_dir_path.clone();
        let tags: Vec<String> = match tag_name.map(str::trim).filter(|tag| !tag.is_empty()) {
            Some(tag) => {
                if project.release(tag).is_none() {
                    return Err(ExtensionError::NotFound(format!("tag [{tag}] is not installed")));
                }
                vec![tag.to_string()]
            }
            None => project.releases.iter().map(|release| release.tag_name.clone()).collect(),
        };

        for tag in &tags {
            self.fs
                .remove_file(&local_dir.join(tag))
                .map_err(|err| ExtensionError::Io(err.to_string()))?;
        }
        let removed_project = remove_releases(&mut manifest, command_name, &tags);
        if removed_project {
            self.fs.remove_dir_all(&local_dir).map_err(|err| ExtensionError::Io(err.to_string()))?;
        }
        self.flush(manifest)?;
        info!(
            command = command_name,
            project = %project_name,
            tags = ?tags,
            "extension uninstalled"
        );
        Ok(())
    }

    /// Changes the command name of an installed extension.
    ///
    /// Renaming to the current name is a no-op.
    ///
    /// # Errors
    ///
    /// Returns empty argument errors, a reserved or used target, not installed
    /// source, or manifest failures.
    pub fn rename(
        &self,
        ctx: &OperationContext,
        source: &str,
        target: &str,
    ) -> Result<(), ExtensionError> {
        require(source, ExtensionError::EmptyCommandName)?;
        require(target, ExtensionError::EmptyCommandName)?;
        self.check_reserved(target)?;
        if source == target {
            return Ok(());
        }
        ctx.check().map_err(|err| ExtensionError::Run(err.message))?;
        let _guard = self.guard()?;
        let mut manifest = self.load_manifest()?;
        let (owner, project) =
            manifest.find_by_command(source).ok_or_else(|| not_installed(source))?;
        check_command_owner(&manifest, target, &owner.name.clone(), &project.name.clone())?;
        if let Some(project) = manifest.find_by_command_mut(source) {
            project.command_name = target.to_string();
        }
        self.flush(manifest)?;
        info!(source, target, "extension renamed");
        Ok(())
    }

    /// Runs the active binary of an extension with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::EmptyCommandName`], not installed command, a
    /// missing binary, or [`ExtensionError::Run`] when the process fails or
    /// exits non-zero.
    pub fn run(
        &self,
        ctx: &OperationContext,
        command_name: &str,
        args: &[String],
    ) -> Result<(), ExtensionError> {
        require(command_name, ExtensionError::EmptyCommandName)?;
        ctx.check().map_err(|err| ExtensionError::Run(err.message))?;
        let manifest = {
            let _guard = self.guard()?;
            self.load_manifest()?
        };
        let (_, project) =
            manifest.find_by_command(command_name).ok_or_else(|| not_installed(command_name))?;
        let binary = project.binary_path(&project.active_tag_name);
        if !self.fs.is_file(&binary) {
            return Err(ExtensionError::NotFound(format!(
                "binary for [{command_name}@{}] is missing",
                project.active_tag_name
            )));
        }
        let code = self
            .runner
            .run(&binary, args)
            .map_err(|err| ExtensionError::Run(format!("[{command_name}]: {err}")))?;
        if code != 0 {
            warn!(command = command_name, code, "extension exited with failure");
            return Err(ExtensionError::Run(format!("[{command_name}] exited with code {code}")));
        }
        Ok(())
    }

    /// Lists installed extensions as `(command, owner/repo, active tag)`.
    ///
    /// # Errors
    ///
    /// Returns manifest failures.
    pub fn list(&self) -> Result<Vec<(String, String, String)>, ExtensionError> {
        let manifest = self.load_manifest()?;
        Ok(manifest
            .projects()
            .into_iter()
            .map(|(owner, project)| {
                (
                    project.command_name.clone(),
                    format!("{}/{}", owner.name, project.name),
                    project.active_tag_name.clone(),
                )
            })
            .collect())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Acquires the operation lock.
    fn guard(&self) -> Result<MutexGuard<'_, ()>, ExtensionError> {
        self.lock
            .lock()
            .map_err(|_| ExtensionError::Manifest("extension manager mutex poisoned".to_string()))
    }

    /// Rejects reserved command names.
    fn check_reserved(&self, command_name: &str) -> Result<(), ExtensionError> {
        if self.reserved.contains(command_name) {
            return Err(ExtensionError::ReservedCommand(command_name.to_string()));
        }
        Ok(())
    }

    /// Downloads and writes the binary of `release`.
    fn install_binary(
        &self,
        ctx: &OperationContext,
        client: &dyn ReleaseClient,
        local_dir: &Path,
        release: &RepositoryRelease,
    ) -> Result<PathBuf, ExtensionError> {
        validate_tag(&release.tag_name)?;
        let bytes = client.download_asset(ctx, &release.current_api_path)?;
        self.fs
            .create_dir_all(local_dir, DIRECTORY_MODE)
            .map_err(|err| ExtensionError::Io(err.to_string()))?;
        let binary_path = local_dir.join(&release.tag_name);
        self.fs
            .write_atomic(&binary_path, &bytes, BINARY_MODE)
            .map_err(|err| ExtensionError::Io(format!("{}: {err}", binary_path.display())))?;
        Ok(binary_path)
    }

    /// Stamps and atomically writes the manifest.
    fn flush(&self, mut manifest: Manifest) -> Result<(), ExtensionError> {
        manifest.updated_at = self.clock.now();
        let text = serde_yaml::to_string(&manifest)
            .map_err(|err| ExtensionError::Manifest(format!("error encoding manifest: {err}")))?;
        self.fs
            .create_dir_all(&self.root, DIRECTORY_MODE)
            .map_err(|err| ExtensionError::Manifest(format!("error updating manifest: {err}")))?;
        self.fs
            .write_atomic(&self.manifest_path(), text.as_bytes(), MANIFEST_MODE)
            .map_err(|err| ExtensionError::Manifest(format!("error updating manifest: {err}")))
    }
}

// ============================================================================
// SECTION: Manifest Rebuilding
// ============================================================================

/// Adds `release` to the project of `metadata` and activates it, creating
/// the owner and project when missing.
fn upsert_release<'a>(
    manifest: &'a mut Manifest,
    metadata: &RemoteMetadata,
    local_dir: PathBuf,
    release: RepositoryRelease,
) -> &'a RepositoryProject {
    let owner_index = if let Some(index) = manifest
        .repository_owners
        .iter()
        .position(|owner| {
            owner.name == metadata.owner_name && owner.provider == metadata.provider_name
        })
    {
        index
    } else {
        manifest.repository_owners.push(RepositoryOwner {
            name: metadata.owner_name.clone(),
            provider: metadata.provider_name.clone(),
            projects: Vec::new(),
        });
        manifest.repository_owners.len() - 1
    };
    let projects = &mut manifest.repository_owners[owner_index].projects;
    let project_index = if let Some(index) =
        projects.iter().position(|project| project.name == metadata.project_name)
    {
        index
    } else {
        projects.push(RepositoryProject {
            name: metadata.project_name.clone(),
            command_name: metadata.command_name.clone(),
            local_dir_path: local_dir,
            active_tag_name: String::new(),
            releases: Vec::new(),
        });
        projects.len() - 1
    };
    let project = &mut projects[project_index];
    project.active_tag_name.clone_from(&release.tag_name);
    if project.release(&release.tag_name).is_none() {
        project.releases.push(release);
    }
    project
}

/// Removes `tags` from the project serving `command_name`; returns true when
/// the project was removed.
fn remove_releases(manifest: &mut Manifest, command_name: &str, tags: &[String]) -> bool {
    let mut removed_project = false;
    for owner in &mut manifest.repository_owners {
        owner.projects.retain_mut(|project| {
            if project.command_name != command_name {
                return true;
            }
            project.releases.retain(|release| !tags.contains(&release.tag_name));
            if project.releases.is_empty() {
                removed_project = true;
                return false;
            }
            if project.active_release().is_none()
                && let Some(first) = project.releases.first()
            {
                project.active_tag_name.clone_from(&first.tag_name);
            }
            true
        });
    }
    manifest.repository_owners.retain(|owner| !owner.projects.is_empty());
    removed_project
}

/// Fails when `command_name` is served by a project other than
/// `owner_name/project_name`.
fn check_command_owner(
    manifest: &Manifest,
    command_name: &str,
    owner_name: &str,
    project_name: &str,
) -> Result<(), ExtensionError> {
    match manifest.find_by_command(command_name) {
        Some((owner, project)) if owner.name != owner_name || project.name != project_name => {
            Err(ExtensionError::Conflict(format!(
                "command [{command_name}] is already used by [{}/{}@{}]",
                owner.name, project.name, project.active_tag_name
            )))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fails with `error` when `value` is blank.
fn require(value: &str, error: ExtensionError) -> Result<(), ExtensionError> {
    if value.trim().is_empty() { Err(error) } else { Ok(()) }
}

/// Builds the not installed error of a command.
fn not_installed(command_name: &str) -> ExtensionError {
    ExtensionError::NotFound(format!(
        "extension with command name [{command_name}] is not installed"
    ))
}

/// Rejects tags that would escape the project directory.
fn validate_tag(tag_name: &str) -> Result<(), ExtensionError> {
    if tag_name.is_empty()
        || tag_name == "."
        || tag_name == ".."
        || tag_name.contains(['/', '\\'])
    {
        return Err(ExtensionError::Client(format!("invalid release tag [{tag_name}]")));
    }
    Ok(())
}
