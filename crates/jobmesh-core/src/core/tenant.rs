// jobmesh-core/src/core/tenant.rs
// ============================================================================
// Module: Jobmesh Tenant Model
// Description: Projects, namespaces, secrets, and tenant scopes.
// Purpose: Provide validated tenant value types and config lookup.
// Dependencies: base64, serde, sha2
// ============================================================================

//! ## Overview
//! A [`Tenant`] is a `(project, namespace)` pair scoping every job operation.
//! The namespace may be empty for project-scoped operations such as listing
//! project-wide secrets. [`TenantDetails`] bundles a tenant with its project
//! and namespace configuration and the decrypted secrets visible to it; it is
//! the only place plaintext secrets live and it is consumed by the plugin
//! service during config compilation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::core::errors::DomainError;
use crate::core::errors::ENTITY_NAMESPACE;
use crate::core::errors::ENTITY_PROJECT;
use crate::core::errors::ENTITY_SECRET;
use crate::core::errors::ENTITY_TENANT;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Project config key for the artifact storage path.
pub const PROJECT_STORAGE_PATH_KEY: &str = "STORAGE_PATH";
/// Project config key for the scheduler host.
pub const PROJECT_SCHEDULER_HOST_KEY: &str = "SCHEDULER_HOST";
/// Name prefix reserved for system-defined secrets.
pub const SYSTEM_SECRET_PREFIX: &str = "_OPTIMUS_";

/// Config map shared by projects and namespaces.
pub type ConfigMap = BTreeMap<String, String>;

// ============================================================================
// SECTION: Names
// ============================================================================

/// Non-empty project name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectName(String);

impl ProjectName {
    /// Creates a validated project name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_PROJECT, "project name is empty"));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for ProjectName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProjectName {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectName> for String {
    fn from(value: ProjectName) -> Self {
        value.0
    }
}

/// Namespace name; empty marks a project-scoped value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Creates a validated, non-empty namespace name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_NAMESPACE, "namespace name is empty"));
        }
        Ok(Self(name))
    }

    /// Returns the empty namespace used for project-scoped values.
    #[must_use]
    pub const fn project_scope() -> Self {
        Self(String::new())
    }

    /// Returns true for the project-scoped (empty) namespace.
    #[must_use]
    pub fn is_project_scope(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tenant
// ============================================================================

/// `(project, namespace)` scope for job operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tenant {
    /// Owning project.
    project_name: ProjectName,
    /// Namespace inside the project; empty for project scope.
    #[serde(default)]
    namespace_name: NamespaceName,
}

impl Tenant {
    /// Creates a tenant from raw names; an empty namespace yields project scope.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the project name is empty.
    pub fn new(project: &str, namespace: &str) -> Result<Self, DomainError> {
        let project_name = ProjectName::new(project)
            .map_err(|err| DomainError::invalid_argument(ENTITY_TENANT, err.message))?;
        let namespace_name = if namespace.trim().is_empty() {
            NamespaceName::project_scope()
        } else {
            NamespaceName::new(namespace)?
        };
        Ok(Self {
            project_name,
            namespace_name,
        })
    }

    /// Creates a tenant from validated parts.
    #[must_use]
    pub const fn from_parts(project_name: ProjectName, namespace_name: NamespaceName) -> Self {
        Self {
            project_name,
            namespace_name,
        }
    }

    /// Returns the project name.
    #[must_use]
    pub const fn project_name(&self) -> &ProjectName {
        &self.project_name
    }

    /// Returns the namespace name.
    #[must_use]
    pub const fn namespace_name(&self) -> &NamespaceName {
        &self.namespace_name
    }

    /// Fails when the tenant is project scoped.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the namespace is empty.
    pub fn require_namespace(&self) -> Result<(), DomainError> {
        if self.namespace_name.is_project_scope() {
            return Err(DomainError::invalid_argument(
                ENTITY_TENANT,
                format!("namespace is required for project {}", self.project_name),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_name, self.namespace_name)
    }
}

// ============================================================================
// SECTION: Project and Namespace
// ============================================================================

/// Project with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name.
    name: ProjectName,
    /// Project configuration.
    config: ConfigMap,
}

impl Project {
    /// Creates a validated project.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the config is empty or a
    /// mandatory key is missing.
    pub fn new(name: ProjectName, config: ConfigMap) -> Result<Self, DomainError> {
        if config.is_empty() {
            return Err(DomainError::invalid_argument(
                ENTITY_PROJECT,
                "missing mandatory configuration",
            ));
        }
        for key in [PROJECT_STORAGE_PATH_KEY, PROJECT_SCHEDULER_HOST_KEY] {
            if config.get(key).is_none_or(|value| value.is_empty()) {
                return Err(DomainError::invalid_argument(
                    ENTITY_PROJECT,
                    format!("missing mandatory configuration: {key}"),
                ));
            }
        }
        Ok(Self { name, config })
    }

    /// Returns the project name.
    #[must_use]
    pub const fn name(&self) -> &ProjectName {
        &self.name
    }

    /// Returns the project configuration.
    #[must_use]
    pub const fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// Looks up a config value.
    #[must_use]
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

/// Namespace with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name, unique within the project.
    name: NamespaceName,
    /// Owning project.
    project_name: ProjectName,
    /// Namespace configuration.
    config: ConfigMap,
}

impl Namespace {
    /// Creates a namespace.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the namespace name is empty.
    pub fn new(
        name: NamespaceName,
        project_name: ProjectName,
        config: ConfigMap,
    ) -> Result<Self, DomainError> {
        if name.is_project_scope() {
            return Err(DomainError::invalid_argument(ENTITY_NAMESPACE, "namespace name is empty"));
        }
        Ok(Self {
            name,
            project_name,
            config,
        })
    }

    /// Returns the namespace name.
    #[must_use]
    pub const fn name(&self) -> &NamespaceName {
        &self.name
    }

    /// Returns the owning project name.
    #[must_use]
    pub const fn project_name(&self) -> &ProjectName {
        &self.project_name
    }

    /// Returns the namespace configuration.
    #[must_use]
    pub const fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// Returns the tenant this namespace represents.
    #[must_use]
    pub fn tenant(&self) -> Tenant {
        Tenant::from_parts(self.project_name.clone(), self.name.clone())
    }
}

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// Secret origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    /// Created by a user.
    UserDefined,
    /// Created by the system; name carries the reserved prefix.
    SystemDefined,
}

impl SecretType {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserDefined => "user",
            Self::SystemDefined => "system",
        }
    }

    /// Parses a persisted label.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for unknown labels.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.to_ascii_lowercase().as_str() {
            "user" | "user_defined" => Ok(Self::UserDefined),
            "system" | "system_defined" => Ok(Self::SystemDefined),
            other => Err(DomainError::invalid_argument(
                ENTITY_SECRET,
                format!("unknown secret type {other}"),
            )),
        }
    }
}

/// Non-empty secret name, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretName(String);

impl SecretName {
    /// Creates a validated secret name.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the name is empty.
    pub fn new(name: &str) -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_SECRET, "secret name is empty"));
        }
        Ok(Self(name.to_uppercase()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the secret type implied by the name.
    #[must_use]
    pub fn secret_type(&self) -> SecretType {
        if self.0.starts_with(SYSTEM_SECRET_PREFIX) {
            SecretType::SystemDefined
        } else {
            SecretType::UserDefined
        }
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Plaintext secret; only lives inside tenant details.
#[derive(Clone, PartialEq, Eq)]
pub struct PlainTextSecret {
    /// Secret name.
    name: SecretName,
    /// Plaintext value.
    value: String,
}

impl PlainTextSecret {
    /// Creates a plaintext secret.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the value is empty.
    pub fn new(name: SecretName, value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::invalid_argument(
                ENTITY_SECRET,
                format!("empty value for secret {name}"),
            ));
        }
        Ok(Self { name, value })
    }

    /// Returns the secret name.
    #[must_use]
    pub const fn name(&self) -> &SecretName {
        &self.name
    }

    /// Returns the plaintext value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for PlainTextSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTextSecret").field("name", &self.name).field("value", &"***").finish()
    }
}

/// Stored secret holding base64-encoded ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Secret name.
    name: SecretName,
    /// Secret origin.
    secret_type: SecretType,
    /// Base64-encoded ciphertext.
    encoded_value: String,
    /// Owning tenant; empty namespace means project scoped.
    tenant: Tenant,
}

impl Secret {
    /// Creates a secret from raw ciphertext bytes.
    #[must_use]
    pub fn from_ciphertext(name: SecretName, ciphertext: &[u8], tenant: Tenant) -> Self {
        let secret_type = name.secret_type();
        Self {
            name,
            secret_type,
            encoded_value: STANDARD.encode(ciphertext),
            tenant,
        }
    }

    /// Creates a secret from an already encoded value read from storage.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the value is not valid base64.
    pub fn from_encoded(
        name: SecretName,
        secret_type: SecretType,
        encoded_value: impl Into<String>,
        tenant: Tenant,
    ) -> Result<Self, DomainError> {
        let encoded_value = encoded_value.into();
        STANDARD.decode(encoded_value.as_bytes()).map_err(|err| {
            DomainError::invalid_argument(ENTITY_SECRET, format!("invalid encoding: {err}"))
        })?;
        Ok(Self {
            name,
            secret_type,
            encoded_value,
            tenant,
        })
    }

    /// Returns the secret name.
    #[must_use]
    pub const fn name(&self) -> &SecretName {
        &self.name
    }

    /// Returns the secret type.
    #[must_use]
    pub const fn secret_type(&self) -> SecretType {
        self.secret_type
    }

    /// Returns the base64-encoded ciphertext.
    #[must_use]
    pub fn encoded_value(&self) -> &str {
        &self.encoded_value
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Returns true when the secret is visible to every namespace.
    #[must_use]
    pub fn is_project_scoped(&self) -> bool {
        self.tenant.namespace_name().is_project_scope()
    }

    /// Decodes the ciphertext bytes.
    ///
    /// # Errors
    ///
    /// Returns an internal error when stored data is not valid base64.
    pub fn ciphertext(&self) -> Result<Vec<u8>, DomainError> {
        STANDARD.decode(self.encoded_value.as_bytes()).map_err(|err| {
            DomainError::internal(ENTITY_SECRET, format!("corrupt secret {}: {err}", self.name))
        })
    }

    /// Returns the listing view with a digest instead of the value.
    #[must_use]
    pub fn info(&self) -> SecretInfo {
        let digest = Sha256::digest(self.encoded_value.as_bytes());
        let digest = digest.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
        SecretInfo {
            name: self.name.clone(),
            secret_type: self.secret_type,
            digest,
            namespace_name: self.tenant.namespace_name().clone(),
        }
    }
}

/// Listing view of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretInfo {
    /// Secret name.
    pub name: SecretName,
    /// Secret origin.
    pub secret_type: SecretType,
    /// Hex SHA-256 digest of the stored ciphertext.
    pub digest: String,
    /// Owning namespace; empty for project scope.
    pub namespace_name: NamespaceName,
}

// ============================================================================
// SECTION: Tenant Details
// ============================================================================

/// Tenant with project, namespace, and decrypted secrets.
#[derive(Debug, Clone)]
pub struct TenantDetails {
    /// Project record.
    project: Project,
    /// Namespace record.
    namespace: Namespace,
    /// Secrets visible to the namespace, decrypted.
    secrets: Vec<PlainTextSecret>,
}

impl TenantDetails {
    /// Bundles tenant details.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the namespace does not belong
    /// to the project.
    pub fn new(
        project: Project,
        namespace: Namespace,
        secrets: Vec<PlainTextSecret>,
    ) -> Result<Self, DomainError> {
        if namespace.project_name() != project.name() {
            return Err(DomainError::invalid_argument(
                ENTITY_TENANT,
                format!(
                    "namespace {} does not belong to project {}",
                    namespace.name(),
                    project.name()
                ),
            ));
        }
        Ok(Self {
            project,
            namespace,
            secrets,
        })
    }

    /// Returns the tenant scope.
    #[must_use]
    pub fn tenant(&self) -> Tenant {
        self.namespace.tenant()
    }

    /// Returns the project.
    #[must_use]
    pub const fn project(&self) -> &Project {
        &self.project
    }

    /// Returns the namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Looks up a config key; namespace values override project values.
    #[must_use]
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.namespace
            .config()
            .get(key)
            .or_else(|| self.project.config().get(key))
            .map(String::as_str)
    }

    /// Returns project config overlaid with namespace config.
    #[must_use]
    pub fn merged_config(&self) -> ConfigMap {
        let mut merged = self.project.config().clone();
        for (key, value) in self.namespace.config() {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Returns plaintext secrets keyed by name.
    #[must_use]
    pub fn secrets_map(&self) -> BTreeMap<String, String> {
        self.secrets
            .iter()
            .map(|secret| (secret.name().as_str().to_string(), secret.value().to_string()))
            .collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
