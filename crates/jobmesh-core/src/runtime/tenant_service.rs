// jobmesh-core/src/runtime/tenant_service.rs
// ============================================================================
// Module: Jobmesh Tenant Service
// Description: Project, namespace, and secret management plus tenant details.
// Purpose: Assemble the tenant view the plugin service compiles against.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! [`TenantService`] owns secret encryption at the service boundary: secrets
//! are encrypted before they reach the repository and decrypted only when
//! tenant details are assembled for template compilation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::debug;
use tracing::error;

use crate::core::DomainError;
use crate::core::Namespace;
use crate::core::OperationContext;
use crate::core::PlainTextSecret;
use crate::core::Project;
use crate::core::Secret;
use crate::core::SecretInfo;
use crate::core::SecretName;
use crate::core::Tenant;
use crate::core::TenantDetails;
use crate::core::errors::ENTITY_SECRET;
use crate::interfaces::SecretCipher;
use crate::interfaces::TenantDetailsGetter;
use crate::interfaces::TenantRepository;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Tenant management service.
#[derive(Clone)]
pub struct TenantService {
    /// Tenant persistence.
    repo: Arc<dyn TenantRepository>,
    /// Secret encryption.
    cipher: Arc<dyn SecretCipher>,
}

impl TenantService {
    /// Creates a tenant service.
    #[must_use]
    pub fn new(repo: Arc<dyn TenantRepository>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { repo, cipher }
    }

    /// Saves a project.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository fails.
    pub fn save_project(&self, project: &Project) -> Result<(), DomainError> {
        self.repo.save_project(project)
    }

    /// Saves a namespace under an existing project.
    ///
    /// # Errors
    ///
    /// Returns not found when the project does not exist.
    pub fn save_namespace(&self, namespace: &Namespace) -> Result<(), DomainError> {
        self.repo.get_project(namespace.project_name())?;
        self.repo.save_namespace(namespace)
    }

    /// Encrypts and stores a new secret.
    ///
    /// # Errors
    ///
    /// Returns already exists when the name is taken in the scope.
    pub fn save_secret(
        &self,
        tenant: &Tenant,
        secret: &PlainTextSecret,
    ) -> Result<(), DomainError> {
        let stored = self.encrypt(tenant, secret)?;
        self.repo.save_secret(&stored)
    }

    /// Encrypts and replaces an existing secret.
    ///
    /// # Errors
    ///
    /// Returns not found when the secret does not exist in the scope.
    pub fn update_secret(
        &self,
        tenant: &Tenant,
        secret: &PlainTextSecret,
    ) -> Result<(), DomainError> {
        let stored = self.encrypt(tenant, secret)?;
        self.repo.update_secret(&stored)
    }

    /// Deletes a secret.
    ///
    /// # Errors
    ///
    /// Returns not found when the secret does not exist in the scope.
    pub fn delete_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<(), DomainError> {
        self.repo.delete_secret(tenant, name)
    }

    /// Decrypts one secret.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss and internal on decryption failure.
    pub fn get_secret(
        &self,
        tenant: &Tenant,
        name: &SecretName,
    ) -> Result<PlainTextSecret, DomainError> {
        let secret = self.repo.get_secret(tenant, name)?;
        self.decrypt(&secret)
    }

    /// Decrypts every secret visible to the tenant.
    ///
    /// # Errors
    ///
    /// Returns internal on decryption failure.
    pub fn get_secrets(&self, tenant: &Tenant) -> Result<Vec<PlainTextSecret>, DomainError> {
        self.repo.get_secrets(tenant)?.iter().map(|secret| self.decrypt(secret)).collect()
    }

    /// Lists secrets without values.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository fails.
    pub fn get_secrets_info(&self, tenant: &Tenant) -> Result<Vec<SecretInfo>, DomainError> {
        Ok(self.repo.get_secrets(tenant)?.iter().map(Secret::info).collect())
    }

    /// Encrypts a plaintext secret into its stored form.
    fn encrypt(&self, tenant: &Tenant, secret: &PlainTextSecret) -> Result<Secret, DomainError> {
        let ciphertext = self.cipher.encrypt(secret.value().as_bytes()).inspect_err(|err| {
            error!(secret = %secret.name(), error = %err, "secret encryption failed");
        })?;
        Ok(Secret::from_ciphertext(secret.name().clone(), &ciphertext, tenant.clone()))
    }

    /// Decrypts a stored secret.
    fn decrypt(&self, secret: &Secret) -> Result<PlainTextSecret, DomainError> {
        let plaintext = self.cipher.decrypt(&secret.ciphertext()?)?;
        let value = String::from_utf8(plaintext).map_err(|_| {
            DomainError::internal(
                ENTITY_SECRET,
                format!("secret {} is not valid utf-8", secret.name()),
            )
        })?;
        PlainTextSecret::new(secret.name().clone(), value)
    }
}

impl TenantDetailsGetter for TenantService {
    fn get_details(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
    ) -> Result<TenantDetails, DomainError> {
        ctx.check()?;
        tenant.require_namespace()?;
        let project = self.repo.get_project(tenant.project_name())?;
        let namespace = self.repo.get_namespace(tenant.project_name(), tenant.namespace_name())?;
        let secrets = self.get_secrets(tenant)?;
        debug!(tenant = %tenant, secrets = secrets.len(), "loaded tenant details");
        TenantDetails::new(project, namespace, secrets)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
