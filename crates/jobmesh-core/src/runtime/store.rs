// jobmesh-core/src/runtime/store.rs
// ============================================================================
// Module: Jobmesh In-Memory Stores
// Description: In-memory job and tenant repositories for tests and demos.
// Purpose: Provide deterministic store implementations without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides in-memory implementations of [`JobRepository`] and
//! [`TenantRepository`] that mirror the soft-delete and edge-replacement
//! semantics of the persistent stores. They are not intended for production.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::Downstream;
use crate::core::DomainError;
use crate::core::FullName;
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
use crate::core::Tenant;
use crate::core::Upstream;
use crate::core::UpstreamType;
use crate::core::WithUpstream;
use crate::core::errors::ENTITY_JOB;
use crate::core::errors::ENTITY_NAMESPACE;
use crate::core::errors::ENTITY_PROJECT;
use crate::core::errors::ENTITY_SECRET;
use crate::interfaces::JobRepository;
use crate::interfaces::TenantRepository;
use crate::interfaces::WriteOutcome;

// ============================================================================
// SECTION: Job Store
// ============================================================================

/// Stored job row.
#[derive(Debug, Clone)]
struct JobRecord {
    /// Persisted job.
    job: Job,
    /// Soft-delete marker.
    deleted: bool,
}

/// Mutable state behind the job store mutex.
#[derive(Debug, Default)]
struct JobState {
    /// Jobs keyed by full name.
    jobs: BTreeMap<FullName, JobRecord>,
    /// Edges keyed by consumer full name.
    upstreams: BTreeMap<FullName, Vec<Upstream>>,
    /// Recorded run counts keyed by full name.
    runs: BTreeMap<FullName, u64>,
}

impl JobState {
    /// Iterates over live jobs.
    fn live(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values().filter(|record| !record.deleted).map(|record| &record.job)
    }

    /// Returns a live job by key.
    fn live_job(&self, key: &FullName) -> Option<&Job> {
        self.jobs.get(key).filter(|record| !record.deleted).map(|record| &record.job)
    }
}

/// In-memory job repository for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobRepository {
    /// Store state protected by a mutex.
    state: Arc<Mutex<JobState>>,
}

impl InMemoryJobRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a run of a job, for history purging.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the store mutex is poisoned.
    pub fn record_run(&self, project: &ProjectName, name: &JobName) -> Result<(), DomainError> {
        let mut guard = self.lock()?;
        *guard.runs.entry(FullName::new(project, name)).or_default() += 1;
        Ok(())
    }

    /// Returns the number of recorded runs of a job.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the store mutex is poisoned.
    pub fn run_count(&self, project: &ProjectName, name: &JobName) -> Result<u64, DomainError> {
        let guard = self.lock()?;
        Ok(guard.runs.get(&FullName::new(project, name)).copied().unwrap_or_default())
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, JobState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::internal(ENTITY_JOB, "job store mutex poisoned"))
    }
}

impl JobRepository for InMemoryJobRepository {
    fn add(&self, ctx: &OperationContext, jobs: Vec<Job>) -> Result<WriteOutcome, DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        let mut outcome = WriteOutcome::default();
        for job in jobs {
            let key = job.full_name();
            if guard.live_job(&key).is_some() {
                let error =
                    DomainError::already_exists(ENTITY_JOB, format!("job {key} already exists"));
                outcome.skip(job, error);
                continue;
            }
            guard.jobs.insert(
                key,
                JobRecord {
                    job: job.clone(),
                    deleted: false,
                },
            );
            outcome.accept(job);
        }
        drop(guard);
        Ok(outcome)
    }

    fn update(&self, ctx: &OperationContext, jobs: Vec<Job>) -> Result<WriteOutcome, DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        let mut outcome = WriteOutcome::default();
        for job in jobs {
            let key = job.full_name();
            let Some(existing) = guard.live_job(&key) else {
                let error = DomainError::not_found(ENTITY_JOB, format!("job {key} not found"));
                outcome.skip(job, error);
                continue;
            };
            if existing.tenant().namespace_name() != job.tenant().namespace_name() {
                let error = DomainError::invalid_argument(
                    ENTITY_JOB,
                    format!(
                        "job {key} already exists in namespace {}",
                        existing.tenant().namespace_name()
                    ),
                );
                outcome.skip(job, error);
                continue;
            }
            guard.jobs.insert(
                key,
                JobRecord {
                    job: job.clone(),
                    deleted: false,
                },
            );
            outcome.accept(job);
        }
        drop(guard);
        Ok(outcome)
    }

    fn delete(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
        clean_history: bool,
    ) -> Result<(), DomainError> {
        ctx.check()?;
        let key = FullName::new(project, name);
        let mut guard = self.lock()?;
        match guard.jobs.get_mut(&key) {
            Some(record) if !record.deleted => record.deleted = true,
            _ => return Err(DomainError::not_found(ENTITY_JOB, format!("job {key} not found"))),
        }
        guard.upstreams.remove(&key);
        if clean_history {
            guard.runs.remove(&key);
        }
        drop(guard);
        Ok(())
    }

    fn replace_upstreams(
        &self,
        ctx: &OperationContext,
        jobs: &[WithUpstream],
    ) -> Result<(), DomainError> {
        ctx.check()?;
        let mut guard = self.lock()?;
        for with_upstream in jobs {
            guard
                .upstreams
                .insert(with_upstream.job().full_name(), with_upstream.upstreams().to_vec());
        }
        drop(guard);
        Ok(())
    }

    fn get_by_job_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Job, DomainError> {
        ctx.check()?;
        let key = FullName::new(project, name);
        let guard = self.lock()?;
        guard
            .live_job(&key)
            .cloned()
            .ok_or_else(|| DomainError::not_found(ENTITY_JOB, format!("job {key} not found")))
    }

    fn get_all_by_tenant(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
    ) -> Result<Vec<Job>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(guard.live().filter(|job| job.tenant() == tenant).cloned().collect())
    }

    fn get_all_by_project_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
    ) -> Result<Vec<Job>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(guard.live().filter(|job| job.project_name() == project).cloned().collect())
    }

    fn get_all_by_resource_destination(
        &self,
        ctx: &OperationContext,
        destination: &ResourceUrn,
    ) -> Result<Vec<Job>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(guard.live().filter(|job| job.destination() == Some(destination)).cloned().collect())
    }

    fn resolve_upstreams(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        names: &[JobName],
    ) -> Result<BTreeMap<JobName, Vec<Upstream>>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        let mut resolved = BTreeMap::new();
        for name in names {
            let Some(consumer) = guard.live_job(&FullName::new(project, name)) else {
                continue;
            };
            let mut links = Vec::new();
            for declared in consumer.static_upstream_names() {
                let Ok((upstream_project, upstream_name)) = declared.parts() else {
                    continue;
                };
                let upstream_project = upstream_project.unwrap_or_else(|| project.clone());
                let key = FullName::new(&upstream_project, &upstream_name);
                if let Some(producer) = guard.live_job(&key) {
                    links.push(Upstream::resolved_to_job(producer, UpstreamType::Static));
                }
            }
            for source in consumer.sources() {
                for producer in guard.live() {
                    if producer.destination() == Some(source)
                        && producer.full_name() != consumer.full_name()
                    {
                        links.push(Upstream::resolved_to_job(producer, UpstreamType::Inferred));
                    }
                }
            }
            resolved.insert(name.clone(), links);
        }
        drop(guard);
        Ok(resolved)
    }

    fn get_downstream_by_destination(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        destination: &ResourceUrn,
    ) -> Result<Vec<Downstream>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(guard
            .live()
            .filter(|job| job.project_name() == project && job.sources().contains(destination))
            .map(Downstream::from_job)
            .collect())
    }

    fn get_downstream_by_job_name(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Downstream>, DomainError> {
        ctx.check()?;
        let target = FullName::new(project, name);
        let guard = self.lock()?;
        let destination = guard.live_job(&target).and_then(|job| job.destination().cloned());
        let mut seen: BTreeSet<FullName> = BTreeSet::new();
        let mut downstream = Vec::new();
        for consumer in guard.live() {
            let consumer_name = consumer.full_name();
            if consumer_name == target {
                continue;
            }
            let by_edge = guard.upstreams.get(&consumer_name).is_some_and(|links| {
                links
                    .iter()
                    .any(|link| link.is_resolved() && link.full_name().as_ref() == Some(&target))
            });
            let by_name = consumer.static_upstream_names().iter().any(|declared| {
                declared.parts().is_ok_and(|(upstream_project, upstream_name)| {
                    let upstream_project =
                        upstream_project.unwrap_or_else(|| consumer.project_name().clone());
                    FullName::new(&upstream_project, &upstream_name) == target
                })
            });
            let by_source = destination
                .as_ref()
                .is_some_and(|destination| consumer.sources().contains(destination));
            if (by_edge || by_name || by_source) && seen.insert(consumer_name) {
                downstream.push(Downstream::from_job(consumer));
            }
        }
        drop(guard);
        Ok(downstream)
    }

    fn get_upstreams(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Upstream>, DomainError> {
        ctx.check()?;
        let guard = self.lock()?;
        Ok(guard.upstreams.get(&FullName::new(project, name)).cloned().unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Tenant Store
// ============================================================================

/// Mutable state behind the tenant store mutex.
#[derive(Debug, Default)]
struct TenantState {
    /// Projects keyed by name.
    projects: BTreeMap<ProjectName, Project>,
    /// Namespaces keyed by project and name.
    namespaces: BTreeMap<(ProjectName, NamespaceName), Namespace>,
    /// Secrets keyed by owning tenant and name.
    secrets: BTreeMap<(Tenant, SecretName), Secret>,
}

/// In-memory tenant repository for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTenantRepository {
    /// Store state protected by a mutex.
    state: Arc<Mutex<TenantState>>,
}

impl InMemoryTenantRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, TenantState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::internal(ENTITY_PROJECT, "tenant store mutex poisoned"))
    }
}

impl TenantRepository for InMemoryTenantRepository {
    fn save_project(&self, project: &Project) -> Result<(), DomainError> {
        self.lock()?.projects.insert(project.name().clone(), project.clone());
        Ok(())
    }

    fn get_project(&self, name: &ProjectName) -> Result<Project, DomainError> {
        self.lock()?
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(ENTITY_PROJECT, format!("project {name} not found"))
            })
    }

    fn get_all_projects(&self) -> Result<Vec<Project>, DomainError> {
        Ok(self.lock()?.projects.values().cloned().collect())
    }

    fn save_namespace(&self, namespace: &Namespace) -> Result<(), DomainError> {
        let mut guard = self.lock()?;
        if !guard.projects.contains_key(namespace.project_name()) {
            return Err(DomainError::not_found(
                ENTITY_PROJECT,
                format!("project {} not found", namespace.project_name()),
            ));
        }
        guard
            .namespaces
            .insert(
                (namespace.project_name().clone(), namespace.name().clone()),
                namespace.clone(),
            );
        drop(guard);
        Ok(())
    }

    fn get_namespace(
        &self,
        project: &ProjectName,
        name: &NamespaceName,
    ) -> Result<Namespace, DomainError> {
        self.lock()?
            .namespaces
            .get(&(project.clone(), name.clone()))
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(
                    ENTITY_NAMESPACE,
                    format!("namespace {project}/{name} not found"),
                )
            })
    }

    fn get_all_namespaces(&self, project: &ProjectName) -> Result<Vec<Namespace>, DomainError> {
        Ok(self
            .lock()?
            .namespaces
            .values()
            .filter(|namespace| namespace.project_name() == project)
            .cloned()
            .collect())
    }

    fn save_secret(&self, secret: &Secret) -> Result<(), DomainError> {
        let mut guard = self.lock()?;
        let key = (secret.tenant().clone(), secret.name().clone());
        if guard.secrets.contains_key(&key) {
            return Err(DomainError::already_exists(
                ENTITY_SECRET,
                format!("secret {} already exists", secret.name()),
            ));
        }
        guard.secrets.insert(key, secret.clone());
        drop(guard);
        Ok(())
    }

    fn update_secret(&self, secret: &Secret) -> Result<(), DomainError> {
        let mut guard = self.lock()?;
        let key = (secret.tenant().clone(), secret.name().clone());
        let Some(existing) = guard.secrets.get_mut(&key) else {
            return Err(DomainError::not_found(
                ENTITY_SECRET,
                format!("secret {} not found", secret.name()),
            ));
        };
        *existing = secret.clone();
        drop(guard);
        Ok(())
    }

    fn get_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<Secret, DomainError> {
        self.lock()?
            .secrets
            .get(&(tenant.clone(), name.clone()))
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(ENTITY_SECRET, format!("secret {name} not found"))
            })
    }

    fn get_secrets(&self, tenant: &Tenant) -> Result<Vec<Secret>, DomainError> {
        let guard = self.lock()?;
        Ok(guard
            .secrets
            .values()
            .filter(|secret| secret.tenant().project_name() == tenant.project_name())
            .filter(|secret| {
                tenant.namespace_name().is_project_scope()
                    || secret.is_project_scoped()
                    || secret.tenant().namespace_name() == tenant.namespace_name()
            })
            .cloned()
            .collect())
    }

    fn delete_secret(&self, tenant: &Tenant, name: &SecretName) -> Result<(), DomainError> {
        self.lock()?
            .secrets
            .remove(&(tenant.clone(), name.clone()))
            .map(|_| ())
            .ok_or_else(|| {
                DomainError::not_found(ENTITY_SECRET, format!("secret {name} not found"))
            })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
