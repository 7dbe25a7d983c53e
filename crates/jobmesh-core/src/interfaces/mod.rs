// jobmesh-core/src/interfaces/mod.rs
// ============================================================================
// Module: Jobmesh Interfaces
// Description: Backend-agnostic contracts for storage, plugins, and peers.
// Purpose: Define the seams the resolver and reconciler depend on.
// Dependencies: crate::core, serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Interfaces describe how Jobmesh integrates with persistence, task
//! plugins, template compilation, peer registries, and secret encryption
//! without embedding backend details. Every implementation must be
//! `Send + Sync` so batch work can fan out across scoped threads.
//!
//! Batch repository writes return a [`WriteOutcome`] on success and reserve
//! the `Err` side for fatal failures that stopped the whole batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::Downstream;
use crate::core::DomainError;
use crate::core::Job;
use crate::core::JobName;
use crate::core::Namespace;
use crate::core::NamespaceName;
use crate::core::OperationContext;
use crate::core::Project;
use crate::core::ProjectName;
use crate::core::ResourceUrn;
use crate::core::Secret;
use crate::core::SecretName;
use crate::core::Spec;
use crate::core::StringMap;
use crate::core::Tenant;
use crate::core::TenantDetails;
use crate::core::Upstream;
use crate::core::WithUpstream;
use crate::core::errors::ENTITY_PLUGIN;

// ============================================================================
// SECTION: Job Repository
// ============================================================================

/// Job rejected by a batch write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedJob {
    /// Rejected job.
    pub job: Job,
    /// Per-job failure.
    pub error: DomainError,
}

/// Result of a batch write that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Jobs persisted by the write.
    pub accepted: Vec<Job>,
    /// Jobs rejected individually.
    pub skipped: Vec<SkippedJob>,
}

impl WriteOutcome {
    /// Records an accepted job.
    pub fn accept(&mut self, job: Job) {
        self.accepted.push(job);
    }

    /// Records a rejected job.
    pub fn skip(&mut self, job: Job, error: DomainError) {
        self.skipped.push(SkippedJob { job, error });
    }
}

/// Persistence of jobs and their upstream edges.
pub trait JobRepository: Send + Sync {
    /// Inserts new jobs; `(project, name)` conflicts are skipped per job.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the batch could not run at all.
    fn add(&self, ctx: &OperationContext, jobs: Vec<Job>) -> Result<WriteOutcome, DomainError>;

    /// Updates existing jobs; missing identities are skipped as not found.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the batch could not run at all.
    fn update(&self, ctx: &OperationContext, jobs: Vec<Job>) -> Result<WriteOutcome, DomainError>;

    /// Soft-deletes a job and its outgoing edges.
    ///
    /// # Errors
    ///
    /// Returns not found when the job does not exist.
    fn delete(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
        clean_history: bool,
    ) -> Result<(), DomainError>;

    /// Replaces every edge of the listed jobs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error when the transaction fails; nothing is written then.
    fn replace_upstreams(
        &self,
        ctx: &OperationContext,
        jobs: &[WithUpstream],
    ) -> Result<(), DomainError>;

    /// Fetches one job.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss.
    fn get_by_job_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Job, DomainError>;

    /// Fetches every job of a tenant namespace.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_all_by_tenant(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
    ) -> Result<Vec<Job>, DomainError>;

    /// Fetches every job of a project.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_all_by_project_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
    ) -> Result<Vec<Job>, DomainError>;

    /// Fetches every spec of a tenant namespace.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_all_specs_by_tenant(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
    ) -> Result<Vec<Spec>, DomainError> {
        Ok(self.get_all_by_tenant(ctx, tenant)?.into_iter().map(|job| job.spec().clone()).collect())
    }

    /// Fetches every job writing the destination.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_all_by_resource_destination(
        &self,
        ctx: &OperationContext,
        destination: &ResourceUrn,
    ) -> Result<Vec<Job>, DomainError>;

    /// Resolves local static and inferred links for a batch of jobs.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn resolve_upstreams(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        names: &[JobName],
    ) -> Result<BTreeMap<JobName, Vec<Upstream>>, DomainError>;

    /// Fetches jobs in the project whose sources include the URN.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_downstream_by_destination(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        destination: &ResourceUrn,
    ) -> Result<Vec<Downstream>, DomainError>;

    /// Fetches jobs depending on the named job.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_downstream_by_job_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Downstream>, DomainError>;

    /// Fetches the persisted edges of a job.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_upstreams(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Upstream>, DomainError>;
}

// ============================================================================
// SECTION: Tenant Repository
// ============================================================================

/// Persistence of projects, namespaces, and secrets.
pub trait TenantRepository: Send + Sync {
    /// Inserts or replaces a project.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn save_project(&self, project: &Project) -> Result<(), DomainError>;

    /// Fetches a project.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss.
    fn get_project(&self, name: &ProjectName) -> Result<Project, DomainError>;

    /// Lists every project.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_all_projects(&self) -> Result<Vec<Project>, DomainError>;

    /// Inserts or replaces a namespace.
    ///
    /// # Errors
    ///
    /// Returns not found when the project does not exist.
    fn save_namespace(&self, namespace: &Namespace) -> Result<(), DomainError>;

    /// Fetches a namespace.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss.
    fn get_namespace(
        &self,
        project: &ProjectName,
        name: &NamespaceName,
    ) -> Result<Namespace, DomainError>;

    /// Lists the namespaces of a project.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_all_namespaces(&self, project: &ProjectName) -> Result<Vec<Namespace>, DomainError>;

    /// Inserts a secret.
    ///
    /// # Errors
    ///
    /// Returns already exists when the name is taken in the same scope.
    fn save_secret(&self, secret: &Secret) -> Result<(), DomainError>;

    /// Replaces an existing secret.
    ///
    /// # Errors
    ///
    /// Returns not found when the secret does not exist in the scope.
    fn update_secret(&self, secret: &Secret) -> Result<(), DomainError>;

    /// Fetches a secret from exactly the tenant scope.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss.
    fn get_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<Secret, DomainError>;

    /// Lists the secrets visible to a tenant; see [`Secret::is_project_scoped`].
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    fn get_secrets(&self, tenant: &Tenant) -> Result<Vec<Secret>, DomainError>;

    /// Deletes a secret from exactly the tenant scope.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss.
    fn delete_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<(), DomainError>;
}

/// Resolves a tenant into its details.
pub trait TenantDetailsGetter: Send + Sync {
    /// Loads project, namespace, and decrypted secrets.
    ///
    /// # Errors
    ///
    /// Returns not found when the project or namespace is missing.
    fn get_details(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
    ) -> Result<TenantDetails, DomainError>;
}

/// Symmetric secret encryption.
pub trait SecretCipher: Send + Sync {
    /// Encrypts plaintext.
    ///
    /// # Errors
    ///
    /// Returns an internal error when encryption fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DomainError>;

    /// Decrypts ciphertext.
    ///
    /// # Errors
    ///
    /// Returns an internal error when decryption fails.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DomainError>;
}

// ============================================================================
// SECTION: Plugins
// ============================================================================

/// Plugin role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    /// Primary task plugin.
    #[default]
    Task,
    /// Hook plugin.
    Hook,
}

/// Descriptive plugin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name; matches the task name.
    pub name: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Plugin role.
    #[serde(default, rename = "plugintype")]
    pub plugin_type: PluginType,
    /// Plugin version.
    #[serde(default, rename = "pluginversion")]
    pub plugin_version: String,
    /// Container image.
    #[serde(default)]
    pub image: String,
    /// Container entrypoint.
    #[serde(default)]
    pub entrypoint: String,
}

/// Request for a destination computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRequest {
    /// Compiled task config.
    pub config: StringMap,
    /// Compiled assets.
    pub assets: StringMap,
}

/// Request for a source computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRequest {
    /// Compiled task config.
    pub config: StringMap,
    /// Compiled assets.
    pub assets: StringMap,
    /// Whether the plugin may skip side effects.
    pub dry_run: bool,
}

/// Plugin call failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// The plugin reported an error.
    #[error("plugin call failed: {0}")]
    Call(String),
}

/// Capability that derives destination and sources.
pub trait DependencyMod: Send + Sync {
    /// Computes the destination string.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the plugin fails.
    fn generate_destination(
        &self,
        ctx: &OperationContext,
        request: &DestinationRequest,
    ) -> Result<String, PluginError>;

    /// Computes the source strings.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the plugin fails.
    fn generate_dependencies(
        &self,
        ctx: &OperationContext,
        request: &DependencyRequest,
    ) -> Result<Vec<String>, PluginError>;
}

/// Registered plugin and its optional capabilities.
#[derive(Clone, Default)]
pub struct Plugin {
    /// Descriptive metadata, when the plugin ships it.
    pub info: Option<PluginInfo>,
    /// Dependency capability, when the plugin implements it.
    pub dependency_mod: Option<Arc<dyn DependencyMod>>,
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("info", &self.info)
            .field("dependency_mod", &self.dependency_mod.is_some())
            .finish()
    }
}

/// Plugin lookup keyed by task name.
pub trait PluginRepository: Send + Sync {
    /// Returns the plugin registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns not found when no plugin is registered.
    fn get_by_name(&self, name: &str) -> Result<Plugin, DomainError>;
}

/// Plugin service failure modes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginServiceError {
    /// No plugin registered for the task.
    #[error("plugin {0} not found")]
    NotFound(String),
    /// Plugin ships no descriptive metadata.
    #[error("yaml mod not found for plugin {0}")]
    YamlModMissing(String),
    /// Plugin does not implement the dependency capability.
    #[error("upstream mod not found for plugin {0}")]
    UpstreamModMissing(String),
    /// Plugin call or compilation failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<PluginServiceError> for DomainError {
    fn from(error: PluginServiceError) -> Self {
        match error {
            PluginServiceError::NotFound(_) => Self::not_found(ENTITY_PLUGIN, error.to_string()),
            PluginServiceError::YamlModMissing(_) | PluginServiceError::UpstreamModMissing(_) => {
                Self::failed_precondition(ENTITY_PLUGIN, error.to_string())
            }
            PluginServiceError::Domain(inner) => inner,
        }
    }
}

// ============================================================================
// SECTION: Templates
// ============================================================================

/// Template compilation over string maps.
pub trait TemplateCompiler: Send + Sync {
    /// Renders every value of `templates` against `context`.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for malformed templates or missing
    /// variables.
    fn compile(
        &self,
        templates: &StringMap,
        context: &serde_json::Value,
    ) -> Result<StringMap, DomainError>;
}

// ============================================================================
// SECTION: Peer Registries
// ============================================================================

/// Peer registry able to resolve upstreams unknown locally.
pub trait ResourceManager: Send + Sync {
    /// Returns the configured peer name.
    fn name(&self) -> &str;

    /// Returns the peer host tagged onto resolved links.
    fn host(&self) -> &str;

    /// Looks up producers for one unresolved link.
    ///
    /// # Errors
    ///
    /// Returns an error when the peer is unreachable, answers with a non-200
    /// status, or returns an undecodable body.
    fn fetch_upstreams(
        &self,
        ctx: &OperationContext,
        unresolved: &Upstream,
    ) -> Result<Vec<Upstream>, DomainError>;
}

// ============================================================================
// SECTION: Clock and Logs
// ============================================================================

/// Injectable wall clock.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Severity of a user-facing progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose detail.
    Debug,
    /// Progress information.
    Info,
    /// Recoverable problem.
    Warning,
    /// Failure.
    Error,
}

/// Sink for user-facing progress lines returned to the caller.
pub trait LogWriter: Send + Sync {
    /// Writes a line.
    fn write(&self, level: LogLevel, message: String);
}
