// jobmesh-core/src/runtime/job_service.rs
// ============================================================================
// Module: Jobmesh Job Service
// Description: Reconciler for batch job specification submissions.
// Purpose: Validate, derive, persist, and resolve jobs per tenant.
// Dependencies: crate::{core, interfaces, runtime}, tracing
// ============================================================================

//! ## Overview
//! [`JobService`] drives every batch through the same pipeline: tenant
//! details, validation, plugin derivation, repository write, upstream
//! resolution, and edge replacement. Batches are best effort per job; every
//! item is attempted and the failures come back as one [`MultiError`].
//!
//! Within one call the repository write happens before resolution, and
//! resolution happens before the edge rewrite. Deletes are isolated: a
//! downstream-safety violation fails that delete without side effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::Downstream;
use crate::core::DomainError;
use crate::core::ErrorCollector;
use crate::core::FullName;
use crate::core::Job;
use crate::core::JobFilter;
use crate::core::JobName;
use crate::core::MultiError;
use crate::core::NamespaceName;
use crate::core::OperationContext;
use crate::core::ProjectName;
use crate::core::Spec;
use crate::core::Tenant;
use crate::core::TenantDetails;
use crate::core::Upstream;
use crate::core::UpstreamType;
use crate::core::errors::ENTITY_JOB;
use crate::core::job::group_by_namespace;
use crate::core::job::join_full_names;
use crate::interfaces::JobRepository;
use crate::interfaces::LogLevel;
use crate::interfaces::LogWriter;
use crate::interfaces::PluginInfo;
use crate::interfaces::PluginServiceError;
use crate::interfaces::TenantDetailsGetter;
use crate::interfaces::WriteOutcome;
use crate::runtime::events::EVENT_JOB_CREATED;
use crate::runtime::events::EVENT_JOB_DELETED;
use crate::runtime::events::EVENT_JOB_UPDATED;
use crate::runtime::events::EVENT_UPSTREAMS_REPLACED;
use crate::runtime::events::JobEvent;
use crate::runtime::events::JobEventSink;
use crate::runtime::plugin_service::PluginService;
use crate::runtime::resolver::UpstreamResolver;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default cap on concurrent job derivations.
pub const DEFAULT_GENERATION_CONCURRENCY: usize = 16;

/// Job service tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobServiceConfig {
    /// Maximum jobs derived concurrently.
    pub generation_concurrency: usize,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            generation_concurrency: DEFAULT_GENERATION_CONCURRENCY,
        }
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of a single delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Downstream consumers of the job.
    pub affected_downstream: Vec<FullName>,
    /// Failure, when the job was not deleted.
    pub error: Option<DomainError>,
}

impl DeleteOutcome {
    /// Converts into a result carrying the downstream list on success.
    ///
    /// # Errors
    ///
    /// Returns the delete failure.
    pub fn into_result(self) -> Result<Vec<FullName>, DomainError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.affected_downstream),
        }
    }
}

/// Specs partitioned against the persisted state.
#[derive(Debug, Default)]
struct SpecDiff {
    /// Names only present in the submission.
    to_add: Vec<Spec>,
    /// Names present in both with a different spec.
    to_update: Vec<Spec>,
    /// Names present in both with an equal spec.
    unchanged: Vec<Spec>,
    /// Names only present in the persisted state.
    to_delete: Vec<Spec>,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Reconciler for job specifications.
#[derive(Clone)]
pub struct JobService {
    /// Job registry.
    repo: Arc<dyn JobRepository>,
    /// Destination and source derivation.
    plugins: PluginService,
    /// Upstream resolution.
    resolver: UpstreamResolver,
    /// Tenant details lookup.
    tenants: Arc<dyn TenantDetailsGetter>,
    /// Lifecycle event sink.
    events: Arc<dyn JobEventSink>,
    /// Tuning.
    config: JobServiceConfig,
}

impl JobService {
    /// Creates a job service.
    #[must_use]
    pub fn new(
        repo: Arc<dyn JobRepository>,
        plugins: PluginService,
        resolver: UpstreamResolver,
        tenants: Arc<dyn TenantDetailsGetter>,
        events: Arc<dyn JobEventSink>,
        config: JobServiceConfig,
    ) -> Self {
        Self {
            repo,
            plugins,
            resolver,
            tenants,
            events,
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Batch writes
    // ------------------------------------------------------------------------

    /// Adds new jobs to a tenant.
    ///
    /// # Errors
    ///
    /// Returns every per-job failure, unknown static upstream, and fatal
    /// step failure in one aggregation. Jobs accepted before a failure stay
    /// persisted.
    pub fn add(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
    ) -> Result<(), MultiError> {
        let mut errors = MultiError::new("add specs errors");
        let details = match self.tenants.get_details(ctx, tenant) {
            Ok(details) => details,
            Err(err) => {
                error!(tenant = %tenant, error = %err, "failed to load tenant details");
                errors.append(err);
                return errors.into_result();
            }
        };
        let added = self.bulk_add(ctx, &details, specs, log, &mut errors);
        if !added.is_empty() {
            self.resolve_and_save(ctx, tenant, added, log, &mut errors);
        }
        errors.into_result()
    }

    /// Updates existing jobs of a tenant.
    ///
    /// # Errors
    ///
    /// Returns every per-job failure, including identities not yet present,
    /// in one aggregation.
    pub fn update(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
    ) -> Result<(), MultiError> {
        let mut errors = MultiError::new("update specs errors");
        let details = match self.tenants.get_details(ctx, tenant) {
            Ok(details) => details,
            Err(err) => {
                error!(tenant = %tenant, error = %err, "failed to load tenant details");
                errors.append(err);
                return errors.into_result();
            }
        };
        let updated = self.bulk_update(ctx, &details, specs, log, &mut errors);
        if !updated.is_empty() {
            self.resolve_and_save(ctx, tenant, updated, log, &mut errors);
        }
        errors.into_result()
    }

    /// Deletes one job unless other jobs depend on it.
    ///
    /// The returned outcome lists the direct downstream consumers both when
    /// the delete is blocked and when it is forced.
    #[must_use]
    pub fn delete(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        name: &JobName,
        clean_history: bool,
        force: bool,
    ) -> DeleteOutcome {
        let project = tenant.project_name();
        let downstream = match self.repo.get_downstream_by_job_name(ctx, project, name) {
            Ok(downstream) => downstream,
            Err(err) => {
                error!(job = %name, error = %err, "failed to load downstream jobs");
                return DeleteOutcome {
                    affected_downstream: Vec::new(),
                    error: Some(err),
                };
            }
        };
        let affected_downstream: Vec<FullName> =
            downstream.iter().map(Downstream::full_name).collect();
        if !affected_downstream.is_empty() && !force {
            let message = format!(
                "{} depends on this job. consider do force delete to proceed.",
                join_full_names(&affected_downstream)
            );
            warn!(job = %name, "{message}");
            return DeleteOutcome {
                affected_downstream,
                error: Some(DomainError::failed_precondition(ENTITY_JOB, message)),
            };
        }
        if let Err(err) = self.repo.delete(ctx, project, name, clean_history) {
            error!(job = %name, error = %err, "failed to delete job");
            return DeleteOutcome {
                affected_downstream,
                error: Some(err),
            };
        }
        info!(job = %FullName::new(project, name), forced = force, "deleted job");
        let deleted = [FullName::new(project, name)];
        self.events.record(&JobEvent::new(EVENT_JOB_DELETED, tenant, &deleted));
        DeleteOutcome {
            affected_downstream,
            error: None,
        }
    }

    /// Reconciles a tenant's jobs against a complete desired set.
    ///
    /// # Errors
    ///
    /// Returns every skipped or failed item in one aggregation.
    pub fn replace_all(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
    ) -> Result<(), MultiError> {
        let mut errors = MultiError::new("replace all specs errors");
        let existing = match self.repo.get_all_by_tenant(ctx, tenant) {
            Ok(existing) => existing,
            Err(err) => {
                errors.append(err);
                return errors.into_result();
            }
        };
        let diff = differentiate(&existing, specs);
        log.write(
            LogLevel::Info,
            format!(
                "[{}] found {} new, {} modified, and {} deleted job specs",
                tenant.namespace_name(),
                diff.to_add.len(),
                diff.to_update.len(),
                diff.to_delete.len()
            ),
        );
        let details = match self.tenants.get_details(ctx, tenant) {
            Ok(details) => details,
            Err(err) => {
                error!(tenant = %tenant, error = %err, "failed to load tenant details");
                errors.append(err);
                return errors.into_result();
            }
        };

        let mut changed = self.bulk_add(ctx, &details, diff.to_add, log, &mut errors);
        changed.extend(self.bulk_update(ctx, &details, diff.to_update, log, &mut errors));
        self.bulk_delete(ctx, tenant, &diff.to_delete, log, &mut errors);
        if !changed.is_empty() {
            self.resolve_and_save(ctx, tenant, changed, log, &mut errors);
        }
        errors.into_result()
    }

    /// Re-resolves the upstreams of every job of a tenant.
    ///
    /// Specs, destinations, and sources are left untouched.
    ///
    /// # Errors
    ///
    /// Returns resolution errors; the edge rewrite still happens unless the
    /// local resolution itself fails.
    pub fn refresh(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        log: &dyn LogWriter,
    ) -> Result<(), MultiError> {
        let mut errors = MultiError::new("refresh all specs errors");
        match self.repo.get_all_by_tenant(ctx, tenant) {
            Ok(jobs) if jobs.is_empty() => debug!(tenant = %tenant, "no jobs to refresh"),
            Ok(jobs) => self.resolve_and_save(ctx, tenant, jobs, log, &mut errors),
            Err(err) => errors.append(err),
        }
        errors.into_result()
    }

    /// Re-resolves the upstreams of the project jobs matching the filters.
    ///
    /// Empty namespace or job name lists match everything.
    ///
    /// # Errors
    ///
    /// Returns resolution errors per namespace in one aggregation.
    pub fn refresh_project(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        namespace_names: Vec<NamespaceName>,
        job_names: Vec<JobName>,
        log: &dyn LogWriter,
    ) -> Result<(), MultiError> {
        let mut errors = MultiError::new("refresh all specs errors");
        let filter = JobFilter {
            project_name: Some(project.clone()),
            namespace_names,
            job_names,
            resource_destination: None,
        };
        let jobs = match self.get_by_filter(ctx, &filter) {
            Ok(jobs) => jobs,
            Err(err) => {
                errors.append(err);
                return errors.into_result();
            }
        };
        for (namespace, jobs) in group_by_namespace(jobs) {
            let tenant = Tenant::from_parts(project.clone(), namespace);
            self.resolve_and_save(ctx, &tenant, jobs, log, &mut errors);
        }
        errors.into_result()
    }

    /// Dry-runs a complete desired set without writing.
    ///
    /// Runs the diff, job derivation, delete-safety checks, and a cycle
    /// check over the tenant's resulting job graph.
    ///
    /// # Errors
    ///
    /// Returns every problem found in one aggregation.
    pub fn validate(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
    ) -> Result<(), MultiError> {
        let mut errors = MultiError::new("validate specs errors");
        let details = match self.tenants.get_details(ctx, tenant) {
            Ok(details) => details,
            Err(err) => {
                errors.append(err);
                return errors.into_result();
            }
        };
        let existing =
            errors.append_result(self.repo.get_all_by_tenant(ctx, tenant)).unwrap_or_default();
        let diff = differentiate(&existing, specs);
        log.write(
            LogLevel::Info,
            format!(
                "[{}] found {} new, {} modified, and {} deleted job specs",
                tenant.namespace_name(),
                diff.to_add.len(),
                diff.to_update.len(),
                diff.to_delete.len()
            ),
        );

        let mut incoming = diff.to_add;
        incoming.extend(diff.to_update);
        let mut jobs = self.generate_jobs(ctx, &details, incoming, log, &mut errors);
        self.check_delete_safety(ctx, tenant, &diff.to_delete, log, &mut errors);

        let unchanged: BTreeSet<&JobName> = diff.unchanged.iter().map(Spec::name).collect();
        jobs.extend(existing.into_iter().filter(|job| unchanged.contains(job.name())));
        if let Some(cycle) = find_cycle(&jobs) {
            let path: Vec<&str> = cycle.iter().map(FullName::as_str).collect();
            errors.append(DomainError::failed_precondition(
                ENTITY_JOB,
                format!("a cycle dependency encountered in the tree: {}", path.join(" -> ")),
            ));
        }
        errors.into_result()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Returns one job of a tenant's project.
    ///
    /// # Errors
    ///
    /// Returns not found on a miss.
    pub fn get(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        name: &JobName,
    ) -> Result<Job, DomainError> {
        self.repo.get_by_job_name(ctx, tenant.project_name(), name)
    }

    /// Returns jobs matching a filter.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when neither a project nor a
    /// destination is given.
    pub fn get_by_filter(
        &self,
        ctx: &OperationContext,
        filter: &JobFilter,
    ) -> Result<Vec<Job>, DomainError> {
        let candidates = if let Some(destination) = &filter.resource_destination {
            self.repo.get_all_by_resource_destination(ctx, destination)?
        } else if let Some(project) = &filter.project_name {
            match filter.namespace_names.as_slice() {
                [namespace] => {
                    let tenant = Tenant::from_parts(project.clone(), namespace.clone());
                    self.repo.get_all_by_tenant(ctx, &tenant)?
                }
                _ => self.repo.get_all_by_project_name(ctx, project)?,
            }
        } else {
            return Err(DomainError::invalid_argument(
                ENTITY_JOB,
                "project name or resource destination is required",
            ));
        };
        Ok(candidates.into_iter().filter(|job| filter.matches(job)).collect())
    }

    /// Returns the consumers of a job.
    ///
    /// With `local_only`, consumers are found by the job's destination;
    /// otherwise by the persisted and declared links to the job.
    ///
    /// # Errors
    ///
    /// Returns not found when the job does not exist.
    pub fn get_downstream(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        name: &JobName,
        local_only: bool,
    ) -> Result<Vec<Downstream>, DomainError> {
        let job = self.get(ctx, tenant, name)?;
        if local_only {
            return match job.destination() {
                Some(destination) => {
                    self.repo.get_downstream_by_destination(ctx, job.project_name(), destination)
                }
                None => Ok(Vec::new()),
            };
        }
        self.repo.get_downstream_by_job_name(ctx, job.project_name(), job.name())
    }

    /// Returns the persisted upstream links of a job.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository fails.
    pub fn get_upstreams(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        name: &JobName,
    ) -> Result<Vec<Upstream>, DomainError> {
        self.repo.get_upstreams(ctx, tenant.project_name(), name)
    }

    /// Returns the plugin metadata of a task.
    ///
    /// # Errors
    ///
    /// Returns not found or yaml-missing plugin errors.
    pub fn task_info(&self, task_name: &str) -> Result<PluginInfo, DomainError> {
        self.plugins.info(task_name).map_err(DomainError::from)
    }

    // ------------------------------------------------------------------------
    // Pipeline steps
    // ------------------------------------------------------------------------

    /// Derives and inserts jobs; returns the accepted ones.
    fn bulk_add(
        &self,
        ctx: &OperationContext,
        details: &TenantDetails,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) -> Vec<Job> {
        let jobs = self.generate_jobs(ctx, details, specs, log, errors);
        if jobs.is_empty() {
            debug!("no jobs to be added");
            return Vec::new();
        }
        let accepted = self.fold_write(self.repo.add(ctx, jobs), details, "add", log, errors);
        if !accepted.is_empty() {
            let names: Vec<FullName> = accepted.iter().map(Job::full_name).collect();
            log.write(
                LogLevel::Debug,
                format!(
                    "[{}] successfully added {} jobs",
                    details.namespace().name(),
                    accepted.len()
                ),
            );
            self.events.record(&JobEvent::new(EVENT_JOB_CREATED, &details.tenant(), &names));
        }
        accepted
    }

    /// Derives and updates jobs; returns the accepted ones.
    fn bulk_update(
        &self,
        ctx: &OperationContext,
        details: &TenantDetails,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) -> Vec<Job> {
        let jobs = self.generate_jobs(ctx, details, specs, log, errors);
        if jobs.is_empty() {
            debug!("no jobs to be updated");
            return Vec::new();
        }
        let accepted = self.fold_write(self.repo.update(ctx, jobs), details, "update", log, errors);
        if !accepted.is_empty() {
            let names: Vec<FullName> = accepted.iter().map(Job::full_name).collect();
            log.write(
                LogLevel::Debug,
                format!(
                    "[{}] successfully updated {} jobs",
                    details.namespace().name(),
                    accepted.len()
                ),
            );
            self.events.record(&JobEvent::new(EVENT_JOB_UPDATED, &details.tenant(), &names));
        }
        accepted
    }

    /// Folds a batch write outcome into the batch errors.
    fn fold_write(
        &self,
        result: Result<WriteOutcome, DomainError>,
        details: &TenantDetails,
        verb: &str,
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) -> Vec<Job> {
        let namespace = details.namespace().name();
        match result {
            Ok(outcome) => {
                for skipped in outcome.skipped {
                    log.write(
                        LogLevel::Error,
                        format!(
                            "[{namespace}] {verb} job {} failed: {}",
                            skipped.job.name(),
                            skipped.error
                        ),
                    );
                    errors.append(skipped.error);
                }
                outcome.accepted
            }
            Err(err) => {
                error!(namespace = %namespace, error = %err, "{verb} jobs failed");
                log.write(
                    LogLevel::Error,
                    format!("[{namespace}] {verb} jobs failure found: {err}"),
                );
                errors.append(err);
                Vec::new()
            }
        }
    }

    /// Deletes jobs missing from a desired set, cascading through consumers
    /// that are themselves being deleted.
    fn bulk_delete(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        to_delete: &[Spec],
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) {
        let project = tenant.project_name();
        let namespace = tenant.namespace_name();
        let deleting: BTreeSet<FullName> =
            to_delete.iter().map(|spec| FullName::new(project, spec.name())).collect();
        let mut deleted: BTreeSet<FullName> = BTreeSet::new();
        let mut deleted_names = Vec::new();
        for spec in to_delete {
            let full_name = FullName::new(project, spec.name());
            if deleted.contains(&full_name) {
                continue;
            }
            let Some(downstream) =
                self.safe_downstream(ctx, tenant, spec.name(), &deleting, log, errors)
            else {
                continue;
            };
            log.write(LogLevel::Debug, format!("[{namespace}] deleting job {}", spec.name()));
            let mut failed = false;
            for consumer in downstream.iter().rev() {
                let consumer_name = consumer.full_name();
                if deleted.contains(&consumer_name) {
                    continue;
                }
                match self.repo.delete(ctx, &consumer.project_name, &consumer.name, false) {
                    Ok(()) => {
                        deleted.insert(consumer_name.clone());
                        deleted_names.push(consumer_name);
                    }
                    Err(err) => {
                        log.write(
                            LogLevel::Error,
                            format!(
                                "[{}] deleting job {} failed: {err}",
                                consumer.namespace_name, consumer.name
                            ),
                        );
                        errors.append(err);
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                warn!(job = %full_name, "deletion skipped");
                continue;
            }
            match self.repo.delete(ctx, project, spec.name(), false) {
                Ok(()) => {
                    deleted.insert(full_name.clone());
                    deleted_names.push(full_name);
                }
                Err(err) => {
                    log.write(
                        LogLevel::Error,
                        format!("[{namespace}] deleting job {} failed: {err}", spec.name()),
                    );
                    errors.append(err);
                }
            }
        }
        if !deleted_names.is_empty() {
            log.write(
                LogLevel::Debug,
                format!("[{namespace}] successfully deleted {} jobs", deleted_names.len()),
            );
            self.events.record(&JobEvent::new(EVENT_JOB_DELETED, tenant, &deleted_names));
        }
    }

    /// Runs the delete-safety check for every job of a desired-set removal.
    fn check_delete_safety(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        to_delete: &[Spec],
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) {
        let deleting: BTreeSet<FullName> = to_delete
            .iter()
            .map(|spec| FullName::new(tenant.project_name(), spec.name()))
            .collect();
        for spec in to_delete {
            let _ = self.safe_downstream(ctx, tenant, spec.name(), &deleting, log, errors);
        }
    }

    /// Returns the transitive downstream of a job when every consumer is
    /// itself being deleted; records the violation otherwise.
    fn safe_downstream(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        name: &JobName,
        deleting: &BTreeSet<FullName>,
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) -> Option<Vec<Downstream>> {
        let namespace = tenant.namespace_name();
        let downstream = match self.all_downstream(ctx, tenant.project_name(), name) {
            Ok(downstream) => downstream,
            Err(err) => {
                log.write(
                    LogLevel::Error,
                    format!("[{namespace}] pre-delete check for job {name} failed: {err}"),
                );
                errors.append(err);
                return None;
            }
        };
        let blocking: Vec<FullName> = downstream
            .iter()
            .map(Downstream::full_name)
            .filter(|consumer| !deleting.contains(consumer))
            .collect();
        if blocking.is_empty() {
            return Some(downstream);
        }
        let message = format!(
            "deletion of job {name} will fail. job is being used by {}",
            join_full_names(&blocking)
        );
        log.write(LogLevel::Error, format!("[{namespace}] {message}"));
        errors.append(DomainError::failed_precondition(ENTITY_JOB, message));
        None
    }

    /// Collects downstream consumers transitively, visiting each job once.
    fn all_downstream(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        name: &JobName,
    ) -> Result<Vec<Downstream>, DomainError> {
        let mut visited = BTreeSet::from([FullName::new(project, name)]);
        let mut pending = vec![(project.clone(), name.clone())];
        let mut collected = Vec::new();
        while let Some((project, name)) = pending.pop() {
            for consumer in self.repo.get_downstream_by_job_name(ctx, &project, &name)? {
                if visited.insert(consumer.full_name()) {
                    pending.push((consumer.project_name.clone(), consumer.name.clone()));
                    collected.push(consumer);
                }
            }
        }
        Ok(collected)
    }

    /// Resolves a batch and rewrites its edges.
    fn resolve_and_save(
        &self,
        ctx: &OperationContext,
        tenant: &Tenant,
        jobs: Vec<Job>,
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) {
        debug!(tenant = %tenant, jobs = jobs.len(), "resolving upstreams");
        let outcome = match self.resolver.resolve(ctx, tenant.project_name(), jobs, log) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(tenant = %tenant, error = %err, "upstream resolution failed");
                errors.append(err);
                return;
            }
        };
        errors.extend(outcome.upstream_errors);
        if let Err(err) = self.repo.replace_upstreams(ctx, &outcome.with_upstreams) {
            error!(tenant = %tenant, error = %err, "replacing upstreams failed");
            errors.append(err);
            return;
        }
        let names: Vec<FullName> =
            outcome.with_upstreams.iter().map(|job| job.job().full_name()).collect();
        self.events.record(&JobEvent::new(EVENT_UPSTREAMS_REPLACED, tenant, &names));
    }

    /// Validates specs and derives jobs concurrently, preserving input order.
    fn generate_jobs(
        &self,
        ctx: &OperationContext,
        details: &TenantDetails,
        specs: Vec<Spec>,
        log: &dyn LogWriter,
        errors: &mut MultiError,
    ) -> Vec<Job> {
        if specs.is_empty() {
            return Vec::new();
        }
        let collector = ErrorCollector::new();
        let slots: Vec<Mutex<Option<Job>>> = specs.iter().map(|_| Mutex::new(None)).collect();
        let cursor = AtomicUsize::new(0);
        let workers = self.config.generation_concurrency.clamp(1, specs.len());
        let tenant = details.tenant();
        let namespace = details.namespace().name();
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(spec) = specs.get(index) else {
                            break;
                        };
                        match self.generate_job(ctx, details, spec) {
                            Ok(job) => {
                                log.write(
                                    LogLevel::Debug,
                                    format!("[{namespace}] processing job {}", spec.name()),
                                );
                                if let Some(slot) = slots.get(index)
                                    && let Ok(mut guard) = slot.lock()
                                {
                                    *guard = Some(job);
                                }
                            }
                            Err(err) => {
                                log.write(
                                    LogLevel::Error,
                                    format!(
                                        "[{namespace}] unable to generate job {}: {err}",
                                        spec.name()
                                    ),
                                );
                                collector.push(err);
                            }
                        }
                    }
                });
            }
        });
        debug!(tenant = %tenant, specs = specs.len(), "generated jobs");
        errors.extend(collector.into_multi(""));
        slots.into_iter().filter_map(|slot| slot.into_inner().ok().flatten()).collect()
    }

    /// Validates one spec and derives its destination and sources.
    fn generate_job(
        &self,
        ctx: &OperationContext,
        details: &TenantDetails,
        spec: &Spec,
    ) -> Result<Job, DomainError> {
        let tenant = details.tenant();
        let full_name = FullName::new(tenant.project_name(), spec.name());
        ctx.check()?;
        spec.validate().map_err(|err| {
            let kind = err.kind().unwrap_or(crate::core::ErrorKind::InvalidArgument);
            DomainError::new(kind, ENTITY_JOB, format!("[{full_name}] invalid spec: {err}"))
        })?;
        let unable = |err: PluginServiceError| {
            let err = DomainError::from(err);
            DomainError::internal(
                ENTITY_JOB,
                format!("unable to generate {full_name}: {}", err.message),
            )
        };
        let destination = match self.plugins.generate_destination(ctx, details, spec.task()) {
            Ok(destination) => destination,
            Err(PluginServiceError::UpstreamModMissing(_)) => None,
            Err(err) => return Err(unable(err)),
        };
        let sources = match self.plugins.generate_upstreams(ctx, details, spec, true) {
            Ok(sources) => sources,
            Err(PluginServiceError::UpstreamModMissing(_)) => Vec::new(),
            Err(err) => return Err(unable(err)),
        };
        Ok(Job::new(tenant, spec.clone(), destination, sources))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Partitions incoming specs against persisted jobs by name.
fn differentiate(existing: &[Job], incoming: Vec<Spec>) -> SpecDiff {
    let existing_specs: BTreeMap<&JobName, &Spec> =
        existing.iter().map(|job| (job.name(), job.spec())).collect();
    let incoming_names: BTreeSet<JobName> =
        incoming.iter().map(|spec| spec.name().clone()).collect();
    let mut diff = SpecDiff::default();
    for spec in incoming {
        match existing_specs.get(spec.name()) {
            None => diff.to_add.push(spec),
            Some(current) if **current != spec => diff.to_update.push(spec),
            Some(_) => diff.unchanged.push(spec),
        }
    }
    diff.to_delete = existing_specs
        .into_iter()
        .filter(|(name, _)| !incoming_names.contains(*name))
        .map(|(_, spec)| spec.clone())
        .collect();
    diff
}

/// Finds a dependency cycle among jobs of one submission.
///
/// Links are matched by producer destination first and full name second;
/// links to jobs outside the set are ignored.
fn find_cycle(jobs: &[Job]) -> Option<Vec<FullName>> {
    let mut by_identifier: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, job) in jobs.iter().enumerate() {
        by_identifier.entry(job.full_name().as_str().to_string()).or_default().push(index);
        if let Some(destination) = job.destination() {
            by_identifier.entry(destination.as_str().to_string()).or_default().push(index);
        }
    }
    let parents: Vec<Vec<usize>> = jobs
        .iter()
        .map(|job| {
            let (links, _) = job.unresolved_upstreams();
            let mut parents = Vec::new();
            for link in links {
                let resource = link.resource.as_ref().map(|urn| urn.as_str().to_string());
                let name = link.full_name().map(|name| name.as_str().to_string());
                let matched = match link.upstream_type {
                    UpstreamType::Inferred => resource.and_then(|key| by_identifier.get(&key)),
                    _ => name.and_then(|key| by_identifier.get(&key)),
                };
                parents.extend(matched.into_iter().flatten().copied());
            }
            parents
        })
        .collect();

    // 0 = unvisited, 1 = on stack, 2 = done
    let mut state = vec![0_u8; jobs.len()];
    let mut stack: Vec<usize> = Vec::new();
    for root in 0..jobs.len() {
        if let Some(cycle) = visit(root, &parents, &mut state, &mut stack) {
            return Some(
                cycle.into_iter().filter_map(|index| jobs.get(index)).map(Job::full_name).collect(),
            );
        }
    }
    None
}

/// Depth-first walk returning the first back-edge path.
fn visit(
    node: usize,
    parents: &[Vec<usize>],
    state: &mut [u8],
    stack: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    match state.get(node).copied() {
        Some(2) | None => return None,
        Some(1) => {
            let start = stack.iter().position(|entry| *entry == node).unwrap_or_default();
            let mut cycle = stack.get(start..).map(<[usize]>::to_vec).unwrap_or_default();
            cycle.push(node);
            return Some(cycle);
        }
        Some(_) => {}
    }
    state[node] = 1;
    stack.push(node);
    for parent in parents.get(node).map(Vec::as_slice).unwrap_or_default() {
        if let Some(cycle) = visit(*parent, parents, state, stack) {
            return Some(cycle);
        }
    }
    stack.pop();
    state[node] = 2;
    None
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test assertions use unwrap/expect for clarity."
    )]

    use std::collections::BTreeMap;

    use time::macros::datetime;

    use super::*;
    use crate::core::ErrorKind;
    use crate::core::StringMap;
    use crate::core::UpstreamState;
    use crate::interfaces::FixedClock;
    use crate::runtime::BufferedLogWriter;
    use crate::runtime::ExternalUpstreamResolver;
    use crate::runtime::InMemoryJobRepository;
    use crate::runtime::InMemoryTenantRepository;
    use crate::runtime::InternalUpstreamResolver;
    use crate::runtime::NoopJobEventSink;
    use crate::runtime::SimpleTemplateCompiler;
    use crate::runtime::TenantService;
    use crate::runtime::testing;

    /// Service wired to in-memory stores.
    struct Fixture {
        repo: Arc<InMemoryJobRepository>,
        service: JobService,
        log: BufferedLogWriter,
        ctx: OperationContext,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryJobRepository::new());
        let tenants = TenantService::new(
            Arc::new(InMemoryTenantRepository::new()),
            Arc::new(testing::PlainTextCipher),
        );
        tenants.save_project(&testing::project()).unwrap();
        tenants.save_namespace(&testing::namespace()).unwrap();
        let plugins = PluginService::new(
            Arc::new(testing::FakePlugins::new()),
            Arc::new(SimpleTemplateCompiler::new()),
            Arc::new(FixedClock(datetime!(2022-10-10 02:00 UTC))),
        );
        let resolver = UpstreamResolver::new(
            InternalUpstreamResolver::new(repo.clone()),
            ExternalUpstreamResolver::empty(),
        );
        let service = JobService::new(
            repo.clone(),
            plugins,
            resolver,
            Arc::new(tenants),
            Arc::new(NoopJobEventSink),
            JobServiceConfig::default(),
        );
        Fixture {
            repo,
            service,
            log: BufferedLogWriter::new(),
            ctx: OperationContext::background(),
        }
    }

    fn producing(name: &str, destination: &str, sources: &str, upstream_names: &[&str]) -> Spec {
        let config = StringMap::from([("DESTINATION".to_string(), destination.to_string())]);
        let spec = testing::spec_with(name, testing::ECHO_TASK, config, upstream_names);
        if sources.is_empty() {
            return spec;
        }
        crate::core::SpecBuilder::from_spec(spec)
            .with_assets(BTreeMap::from([("SOURCES".to_string(), sources.to_string())]))
            .build()
            .unwrap()
    }

    fn name(value: &str) -> JobName {
        JobName::new(value).unwrap()
    }

    #[test]
    fn add_resolves_inferred_upstream() {
        let f = fixture();
        let tenant = testing::tenant();
        let job_b = producing("job-b", "bq://p.ds.b", "", &[]);
        f.service.add(&f.ctx, &tenant, vec![job_b], &f.log).unwrap();
        f.service
            .add(
                &f.ctx,
                &tenant,
                vec![producing("job-a", "bq://p.ds.a", "bq://p.ds.b", &[])],
                &f.log,
            )
            .unwrap();
        let links = f.service.get_upstreams(&f.ctx, &tenant, &name("job-a")).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "job-b");
        assert_eq!(links[0].upstream_type, UpstreamType::Inferred);
        assert_eq!(links[0].state, UpstreamState::Resolved);
        assert_eq!(links[0].host, "");
    }

    #[test]
    fn add_reports_unknown_static_upstream_but_persists() {
        let f = fixture();
        let tenant = testing::tenant();
        let err = f
            .service
            .add(
                &f.ctx,
                &tenant,
                vec![producing("job-a", "bq://p.ds.a", "", &["job-missing"])],
                &f.log,
            )
            .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert!(f.service.get(&f.ctx, &tenant, &name("job-a")).is_ok());
        let links = f.service.get_upstreams(&f.ctx, &tenant, &name("job-a")).unwrap();
        assert_eq!(links[0].state, UpstreamState::Unresolved);
    }

    #[test]
    fn plugin_failure_skips_only_that_job() {
        let f = fixture();
        let tenant = testing::tenant();
        let failing = testing::spec_with(
            "job-bad",
            testing::ECHO_TASK,
            StringMap::from([("FAIL".to_string(), "1".to_string())]),
            &[],
        );
        let bare = testing::spec_with("job-bare", testing::BARE_TASK, StringMap::new(), &[]);
        let err = f.service.add(&f.ctx, &tenant, vec![failing, bare], &f.log).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err.errors()[0].message.contains("proj/job-bad"));
        let bare_job = f.service.get(&f.ctx, &tenant, &name("job-bare")).unwrap();
        assert!(bare_job.destination().is_none());
    }

    #[test]
    fn update_requires_existing_job() {
        let f = fixture();
        let err = f
            .service
            .update(&f.ctx, &testing::tenant(), vec![producing("job-a", "bq://a", "", &[])], &f.log)
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn delete_blocked_by_downstream_then_forced() {
        let f = fixture();
        let tenant = testing::tenant();
        f.service
            .add(
                &f.ctx,
                &tenant,
                vec![
                    producing("job-a", "bq://p.ds.a", "", &[]),
                    producing("job-b", "bq://p.ds.b", "bq://p.ds.a", &[]),
                ],
                &f.log,
            )
            .unwrap();
        let blocked = f.service.delete(&f.ctx, &tenant, &name("job-a"), false, false);
        let err = blocked.error.clone().unwrap();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        assert!(err.message.contains("proj/job-b"));
        assert_eq!(blocked.affected_downstream[0].as_str(), "proj/job-b");
        assert!(f.service.get(&f.ctx, &tenant, &name("job-a")).is_ok());

        let forced =
            f.service.delete(&f.ctx, &tenant, &name("job-a"), false, true).into_result().unwrap();
        assert_eq!(forced.len(), 1);
        assert!(f.service.get(&f.ctx, &tenant, &name("job-a")).is_err());
    }

    #[test]
    fn replace_all_is_idempotent_and_cascades_deletes() {
        let f = fixture();
        let tenant = testing::tenant();
        let initial = vec![
            producing("job-a", "bq://p.ds.a", "", &[]),
            producing("job-b", "bq://p.ds.b", "bq://p.ds.a", &[]),
            producing("job-c", "bq://p.ds.c", "", &[]),
        ];
        let snapshot = |f: &Fixture| {
            let jobs = f.repo.get_all_by_tenant(&f.ctx, &tenant).unwrap();
            let links: Vec<_> = jobs
                .iter()
                .map(|job| f.repo.get_upstreams(&f.ctx, job.project_name(), job.name()).unwrap())
                .collect();
            (jobs, links)
        };
        f.service.replace_all(&f.ctx, &tenant, initial.clone(), &f.log).unwrap();
        let first = snapshot(&f);
        f.service.replace_all(&f.ctx, &tenant, initial, &f.log).unwrap();
        assert_eq!(snapshot(&f), first);
        assert_eq!(first.0.len(), 3);
        assert_eq!(first.1[1][0].name, "job-a");
        assert!(
            f.log
                .messages()
                .iter()
                .any(|line| line == "[ns] found 0 new, 0 modified, and 0 deleted job specs")
        );

        f.service
            .replace_all(&f.ctx, &tenant, vec![producing("job-c", "bq://p.ds.c2", "", &[])], &f.log)
            .unwrap();
        let remaining = f.repo.get_all_by_tenant(&f.ctx, &tenant).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].destination().unwrap().as_str(), "bq://p.ds.c2");
    }

    #[test]
    fn replace_all_keeps_jobs_with_outside_consumers() {
        let f = fixture();
        let tenant = testing::tenant();
        f.service
            .replace_all(
                &f.ctx,
                &tenant,
                vec![
                    producing("job-a", "bq://p.ds.a", "", &[]),
                    producing("job-b", "bq://p.ds.b", "bq://p.ds.a", &[]),
                ],
                &f.log,
            )
            .unwrap();
        let err = f
            .service
            .replace_all(
                &f.ctx,
                &tenant,
                vec![producing("job-b", "bq://p.ds.b", "bq://p.ds.a", &[])],
                &f.log,
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::FailedPrecondition));
        assert!(err.errors()[0].message.starts_with("deletion of job job-a will fail"));
        assert!(f.service.get(&f.ctx, &tenant, &name("job-a")).is_ok());
    }

    #[test]
    fn validate_detects_cycles_without_writing() {
        let f = fixture();
        let tenant = testing::tenant();
        let err = f
            .service
            .validate(
                &f.ctx,
                &tenant,
                vec![
                    producing("job-a", "bq://a", "bq://b", &[]),
                    producing("job-b", "bq://b", "", &["job-a"]),
                ],
                &f.log,
            )
            .unwrap_err();
        assert!(err.errors().iter().any(|e| e.message.contains("cycle dependency")));
        assert!(f.repo.get_all_by_tenant(&f.ctx, &tenant).unwrap().is_empty());
    }

    #[test]
    fn refresh_keeps_specs_and_rewrites_edges() {
        let f = fixture();
        let tenant = testing::tenant();
        let job_a = producing("job-a", "bq://p.ds.a", "", &["job-b"]);
        let _ = f.service.add(&f.ctx, &tenant, vec![job_a], &f.log);
        let job_b = producing("job-b", "bq://p.ds.b", "", &[]);
        f.service.add(&f.ctx, &tenant, vec![job_b], &f.log).unwrap();
        let before = f.service.get(&f.ctx, &tenant, &name("job-a")).unwrap();
        f.service.refresh(&f.ctx, &tenant, &f.log).unwrap();
        let links = f.service.get_upstreams(&f.ctx, &tenant, &name("job-a")).unwrap();
        assert_eq!(links[0].state, UpstreamState::Resolved);
        assert_eq!(f.service.get(&f.ctx, &tenant, &name("job-a")).unwrap(), before);
    }

    #[test]
    fn get_by_filter_requires_scope() {
        let f = fixture();
        assert!(f.service.get_by_filter(&f.ctx, &JobFilter::default()).is_err());
    }

    #[test]
    fn downstream_listing_local_uses_destination() {
        let f = fixture();
        let tenant = testing::tenant();
        f.service
            .add(
                &f.ctx,
                &tenant,
                vec![
                    producing("job-a", "bq://p.ds.a", "", &[]),
                    producing("job-b", "bq://p.ds.b", "bq://p.ds.a", &[]),
                ],
                &f.log,
            )
            .unwrap();
        let local = f.service.get_downstream(&f.ctx, &tenant, &name("job-a"), true).unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].name.as_str(), "job-b");
    }

    #[test]
    fn find_cycle_ignores_acyclic_graphs() {
        let a = testing::job_with("job-a", Some("bq://a"), &[], &[]);
        let b = testing::job_with("job-b", Some("bq://b"), &["bq://a"], &[]);
        assert!(find_cycle(&[a, b]).is_none());
    }
}
