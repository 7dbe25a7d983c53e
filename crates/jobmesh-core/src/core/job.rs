// jobmesh-core/src/core/job.rs
// ============================================================================
// Module: Jobmesh Jobs
// Description: Job records, resource URNs, full names, and downstream views.
// Purpose: Bind a spec to its tenant and derived destination and sources.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Job`] is a [`Spec`] bound to a [`Tenant`] together with the
//! destination and sources derived by the plugin service. Jobs reference
//! each other only by [`FullName`] and [`ResourceUrn`], never by pointer, so
//! upstream graphs may contain cycles without hazard.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::DomainError;
use crate::core::errors::ENTITY_JOB;
use crate::core::errors::MultiError;
use crate::core::spec::JobName;
use crate::core::spec::Spec;
use crate::core::spec::SpecUpstreamName;
use crate::core::spec::TaskName;
use crate::core::tenant::NamespaceName;
use crate::core::tenant::ProjectName;
use crate::core::tenant::Tenant;
use crate::core::upstream::Upstream;

// ============================================================================
// SECTION: Identities
// ============================================================================

/// Opaque, non-empty resource identifier such as `bigquery://p.ds.t`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUrn(String);

impl ResourceUrn {
    /// Creates a validated resource URN.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error when the value is empty.
    pub fn new(urn: impl Into<String>) -> Result<Self, DomainError> {
        let urn = urn.into();
        if urn.is_empty() {
            return Err(DomainError::invalid_argument(ENTITY_JOB, "resource urn is empty"));
        }
        Ok(Self(urn))
    }

    /// Returns the URN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cross-project job identity `project/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FullName(String);

impl FullName {
    /// Builds a full name from its parts.
    #[must_use]
    pub fn new(project: &ProjectName, name: &JobName) -> Self {
        Self(format!("{project}/{name}"))
    }

    /// Returns the full name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Joins full names with `, ` for user-facing messages.
#[must_use]
pub fn join_full_names(names: &[FullName]) -> String {
    names.iter().map(FullName::as_str).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// SECTION: Job State
// ============================================================================

/// Scheduling state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is scheduled.
    #[default]
    Enabled,
    /// Job is paused.
    Disabled,
    /// Unrecognized persisted value.
    Unknown,
}

impl JobState {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Unknown => "unknown",
        }
    }

    /// Parses persisted state; unknown labels map to [`JobState::Unknown`].
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "enabled" => Self::Enabled,
            "disabled" => Self::Disabled,
            _ => Self::Unknown,
        }
    }

    /// Parses external input.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error for unknown labels.
    pub fn parse_strict(value: &str) -> Result<Self, DomainError> {
        match Self::parse_lenient(value) {
            Self::Unknown => Err(DomainError::invalid_argument(
                ENTITY_JOB,
                format!("invalid job state {value}"),
            )),
            state => Ok(state),
        }
    }
}

// ============================================================================
// SECTION: Job
// ============================================================================

/// Spec bound to a tenant with plugin-derived destination and sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Owning tenant.
    tenant: Tenant,
    /// Job specification.
    spec: Spec,
    /// Destination resource; absent when the plugin declines.
    destination: Option<ResourceUrn>,
    /// Source resources consumed by the job.
    sources: Vec<ResourceUrn>,
}

impl Job {
    /// Creates a job.
    #[must_use]
    pub const fn new(
        tenant: Tenant,
        spec: Spec,
        destination: Option<ResourceUrn>,
        sources: Vec<ResourceUrn>,
    ) -> Self {
        Self {
            tenant,
            spec,
            destination,
            sources,
        }
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Returns the spec.
    #[must_use]
    pub const fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Returns the job name.
    #[must_use]
    pub const fn name(&self) -> &JobName {
        self.spec.name()
    }

    /// Returns the owning project name.
    #[must_use]
    pub const fn project_name(&self) -> &ProjectName {
        self.tenant.project_name()
    }

    /// Returns `project/name`.
    #[must_use]
    pub fn full_name(&self) -> FullName {
        FullName::new(self.project_name(), self.name())
    }

    /// Returns the destination.
    #[must_use]
    pub const fn destination(&self) -> Option<&ResourceUrn> {
        self.destination.as_ref()
    }

    /// Returns the sources.
    #[must_use]
    pub fn sources(&self) -> &[ResourceUrn] {
        &self.sources
    }

    /// Returns the declared static upstream names.
    #[must_use]
    pub fn static_upstream_names(&self) -> &[SpecUpstreamName] {
        &self.spec.upstream().upstream_names
    }

    /// Returns one unresolved link per static name and per source.
    ///
    /// Malformed static names are reported in the second element; the
    /// remaining links are still produced.
    pub fn unresolved_upstreams(&self) -> (Vec<Upstream>, Result<(), MultiError>) {
        let mut errors = MultiError::new(format!("unresolved upstreams of {}", self.full_name()));
        let mut upstreams = Vec::new();
        for name in self.static_upstream_names() {
            match name.parts() {
                Ok((project, job)) => {
                    let project = project.unwrap_or_else(|| self.project_name().clone());
                    upstreams.push(Upstream::unresolved_static(job, project));
                }
                Err(err) => errors.append(err),
            }
        }
        for source in &self.sources {
            upstreams.push(Upstream::unresolved_inferred(source.clone()));
        }
        (upstreams, errors.into_result())
    }
}

/// Groups jobs by namespace, preserving input order inside each group.
#[must_use]
pub fn group_by_namespace(jobs: Vec<Job>) -> BTreeMap<NamespaceName, Vec<Job>> {
    let mut grouped: BTreeMap<NamespaceName, Vec<Job>> = BTreeMap::new();
    for job in jobs {
        grouped.entry(job.tenant().namespace_name().clone()).or_default().push(job);
    }
    grouped
}

// ============================================================================
// SECTION: Downstream
// ============================================================================

/// Consumer view of a job that depends on another job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Downstream {
    /// Consumer job name.
    pub name: JobName,
    /// Consumer project.
    pub project_name: ProjectName,
    /// Consumer namespace.
    pub namespace_name: NamespaceName,
    /// Consumer task.
    pub task_name: TaskName,
}

impl Downstream {
    /// Returns the consumer full name.
    #[must_use]
    pub fn full_name(&self) -> FullName {
        FullName::new(&self.project_name, &self.name)
    }

    /// Builds the downstream view of a job.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            name: job.name().clone(),
            project_name: job.project_name().clone(),
            namespace_name: job.tenant().namespace_name().clone(),
            task_name: job.spec().task().name.clone(),
        }
    }
}

// ============================================================================
// SECTION: Filter
// ============================================================================

/// Query filter over persisted jobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobFilter {
    /// Required project scope.
    pub project_name: Option<ProjectName>,
    /// Restrict to these namespaces; empty means all.
    pub namespace_names: Vec<NamespaceName>,
    /// Restrict to these job names; empty means all.
    pub job_names: Vec<JobName>,
    /// Restrict to jobs writing this destination.
    pub resource_destination: Option<ResourceUrn>,
}

impl JobFilter {
    /// Returns true when the job passes every set criterion.
    #[must_use]
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(project) = &self.project_name
            && job.project_name() != project
        {
            return false;
        }
        if !self.namespace_names.is_empty()
            && !self.namespace_names.contains(job.tenant().namespace_name())
        {
            return false;
        }
        if !self.job_names.is_empty() && !self.job_names.contains(job.name()) {
            return false;
        }
        if let Some(destination) = &self.resource_destination
            && job.destination() != Some(destination)
        {
            return false;
        }
        true
    }
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

    use super::*;
    use crate::core::spec::ScheduleBuilder;
    use crate::core::spec::ScheduleDate;
    use crate::core::spec::SpecBuilder;
    use crate::core::spec::SpecUpstream;
    use crate::core::spec::StringMap;
    use crate::core::spec::Task;
    use crate::core::spec::Version;
    use crate::core::spec::Owner;
    use crate::core::upstream::UpstreamState;
    use crate::core::upstream::UpstreamType;
    use crate::core::window::WindowConfig;

    fn job_with_upstreams(names: &[&str], sources: &[&str]) -> Job {
        let schedule =
            ScheduleBuilder::new(ScheduleDate::new("2022-10-01").unwrap()).build().unwrap();
        let upstream = SpecUpstream {
            upstream_names: names
                .iter()
                .map(|name| SpecUpstreamName::new(*name).unwrap())
                .collect(),
            http_upstreams: Vec::new(),
        };
        let spec = SpecBuilder::new(
            Version::new(1).unwrap(),
            JobName::new("job-a").unwrap(),
            Owner::new("owner").unwrap(),
            schedule,
            WindowConfig::new("24h", "0", "d"),
            Task::new(TaskName::new("bq2bq").unwrap(), StringMap::new()),
        )
        .with_upstream(upstream)
        .build()
        .unwrap();
        Job::new(
            Tenant::new("proj1", "ns1").unwrap(),
            spec,
            Some(ResourceUrn::new("bq://p.ds.a").unwrap()),
            sources.iter().map(|urn| ResourceUrn::new(*urn).unwrap()).collect(),
        )
    }

    #[test]
    fn unresolved_upstreams_cover_static_and_sources() {
        let job = job_with_upstreams(&["job-b", "proj2/job-x"], &["bq://p.ds.c"]);
        let (upstreams, result) = job.unresolved_upstreams();
        assert!(result.is_ok());
        assert_eq!(upstreams.len(), 3);
        assert!(upstreams.iter().all(|upstream| upstream.state == UpstreamState::Unresolved));
        assert_eq!(upstreams[0].full_name().unwrap().as_str(), "proj1/job-b");
        assert_eq!(upstreams[1].full_name().unwrap().as_str(), "proj2/job-x");
        assert_eq!(upstreams[2].upstream_type, UpstreamType::Inferred);
        assert_eq!(upstreams[2].resource.as_ref().unwrap().as_str(), "bq://p.ds.c");
    }

    #[test]
    fn filter_matches_by_namespace_and_destination() {
        let job = job_with_upstreams(&[], &[]);
        let mut filter = JobFilter {
            project_name: Some(ProjectName::new("proj1").unwrap()),
            ..JobFilter::default()
        };
        assert!(filter.matches(&job));
        filter.namespace_names = vec![NamespaceName::new("other").unwrap()];
        assert!(!filter.matches(&job));
        filter.namespace_names.clear();
        filter.resource_destination = Some(ResourceUrn::new("bq://p.ds.a").unwrap());
        assert!(filter.matches(&job));
    }

    #[test]
    fn job_state_parse() {
        assert_eq!(JobState::parse_lenient("DISABLED"), JobState::Disabled);
        assert_eq!(JobState::parse_lenient("paused"), JobState::Unknown);
        assert!(JobState::parse_strict("paused").is_err());
    }
}
