// jobmesh-core/src/core/upstream.rs
// ============================================================================
// Module: Jobmesh Upstream Links
// Description: Upstream link type, state, de-duplication, and merging.
// Purpose: Model producer-consumer edges with resolved/unresolved status.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`Upstream`] is one producer-consumer edge seen from the consumer.
//! Its [`UpstreamType`] is intrinsic (`static` when declared by name,
//! `inferred` when discovered through a consumed resource) while its
//! [`UpstreamState`] is extrinsic and flips to `resolved` once a concrete
//! producer job is matched, locally or on a peer registry.
//!
//! [`deduplicate`] and [`merge_with_resolved`] keep a job's link list free of
//! duplicates: resolved links are keyed by producer full name with static
//! links preferred over inferred ones, unresolved static links by their
//! declared full name, and unresolved inferred links by resource URN.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::errors::DomainError;
use crate::core::errors::ENTITY_JOB;
use crate::core::job::FullName;
use crate::core::job::Job;
use crate::core::job::ResourceUrn;
use crate::core::spec::JobName;
use crate::core::tenant::NamespaceName;
use crate::core::tenant::ProjectName;
use crate::core::tenant::Tenant;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// How a link was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpstreamType {
    /// Declared by name in the spec.
    Static,
    /// Discovered through a consumed resource URN.
    Inferred,
    /// Unrecognized persisted value.
    Unknown,
}

impl UpstreamType {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Inferred => "inferred",
            Self::Unknown => "unknown",
        }
    }

    /// Parses persisted state; unknown labels map to [`UpstreamType::Unknown`].
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "static" => Self::Static,
            "inferred" => Self::Inferred,
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
                format!("unknown type for upstream: {value}"),
            )),
            kind => Ok(kind),
        }
    }
}

impl From<String> for UpstreamType {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<UpstreamType> for String {
    fn from(value: UpstreamType) -> Self {
        value.as_str().to_string()
    }
}

/// Whether a link currently points at a known job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpstreamState {
    /// Matched to a concrete producer.
    Resolved,
    /// No producer known.
    Unresolved,
    /// Unrecognized persisted value.
    Unknown,
}

impl UpstreamState {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::Unknown => "unknown",
        }
    }

    /// Parses persisted state; unknown labels map to [`UpstreamState::Unknown`].
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "resolved" => Self::Resolved,
            "unresolved" => Self::Unresolved,
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
                format!("unknown state for upstream: {value}"),
            )),
            state => Ok(state),
        }
    }
}

impl From<String> for UpstreamState {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<UpstreamState> for String {
    fn from(value: UpstreamState) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// SECTION: Upstream
// ============================================================================

/// Producer-consumer edge seen from the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    /// Producer job name; empty for an unresolved inferred link.
    pub name: String,
    /// Peer registry host; empty for local producers.
    pub host: String,
    /// Producer destination, or the consumed URN when unresolved inferred.
    pub resource: Option<ResourceUrn>,
    /// Producer project; absent for an unresolved inferred link.
    pub project_name: Option<ProjectName>,
    /// Producer namespace; empty when unknown.
    pub namespace_name: NamespaceName,
    /// Producer task name; empty when unknown.
    pub task_name: String,
    /// How the link was discovered.
    pub upstream_type: UpstreamType,
    /// Whether the link is matched.
    pub state: UpstreamState,
    /// True when the producer lives on a peer registry.
    pub external: bool,
}

impl Upstream {
    /// Creates a resolved link to a concrete producer.
    #[must_use]
    pub fn resolved(
        name: &JobName,
        host: impl Into<String>,
        resource: Option<ResourceUrn>,
        tenant: &Tenant,
        upstream_type: UpstreamType,
        task_name: impl Into<String>,
        external: bool,
    ) -> Self {
        Self {
            name: name.as_str().to_string(),
            host: host.into(),
            resource,
            project_name: Some(tenant.project_name().clone()),
            namespace_name: tenant.namespace_name().clone(),
            task_name: task_name.into(),
            upstream_type,
            state: UpstreamState::Resolved,
            external,
        }
    }

    /// Creates a local resolved link to a producer job.
    #[must_use]
    pub fn resolved_to_job(producer: &Job, upstream_type: UpstreamType) -> Self {
        Self::resolved(
            producer.name(),
            "",
            producer.destination().cloned(),
            producer.tenant(),
            upstream_type,
            producer.spec().task().name.as_str(),
            false,
        )
    }

    /// Creates an unresolved static link keeping the declared identity.
    #[must_use]
    pub fn unresolved_static(name: JobName, project_name: ProjectName) -> Self {
        Self {
            name: name.as_str().to_string(),
            host: String::new(),
            resource: None,
            project_name: Some(project_name),
            namespace_name: NamespaceName::project_scope(),
            task_name: String::new(),
            upstream_type: UpstreamType::Static,
            state: UpstreamState::Unresolved,
            external: false,
        }
    }

    /// Creates an unresolved inferred link keeping the consumed URN.
    #[must_use]
    pub fn unresolved_inferred(resource: ResourceUrn) -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            resource: Some(resource),
            project_name: None,
            namespace_name: NamespaceName::project_scope(),
            task_name: String::new(),
            upstream_type: UpstreamType::Inferred,
            state: UpstreamState::Unresolved,
            external: false,
        }
    }

    /// Returns `project/name` when both parts are known.
    #[must_use]
    pub fn full_name(&self) -> Option<FullName> {
        let project = self.project_name.as_ref()?;
        let name = JobName::new(self.name.as_str()).ok()?;
        Some(FullName::new(project, &name))
    }

    /// Returns true when the link is resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state == UpstreamState::Resolved
    }

    /// Returns the de-duplication key of the link.
    fn identity(&self) -> String {
        match (self.state, self.upstream_type) {
            (UpstreamState::Resolved, _) | (_, UpstreamType::Static) => self
                .full_name()
                .map_or_else(|| format!("name:{}", self.name), |name| format!("name:{name}")),
            _ => format!(
                "resource:{}",
                self.resource.as_ref().map_or("", ResourceUrn::as_str)
            ),
        }
    }
}

// ============================================================================
// SECTION: Job With Upstream
// ============================================================================

/// Job paired with its de-duplicated upstream links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithUpstream {
    /// Consumer job.
    job: Job,
    /// Upstream links.
    upstreams: Vec<Upstream>,
}

impl WithUpstream {
    /// Pairs a job with links, de-duplicating them.
    #[must_use]
    pub fn new(job: Job, upstreams: Vec<Upstream>) -> Self {
        Self {
            job,
            upstreams: deduplicate(upstreams),
        }
    }

    /// Pairs a job with the unresolved form of every declared link.
    #[must_use]
    pub fn unresolved(job: Job) -> Self {
        let (upstreams, _) = job.unresolved_upstreams();
        Self::new(job, upstreams)
    }

    /// Returns the job.
    #[must_use]
    pub const fn job(&self) -> &Job {
        &self.job
    }

    /// Returns the links.
    #[must_use]
    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    /// Returns the unresolved links.
    #[must_use]
    pub fn unresolved_upstreams(&self) -> Vec<&Upstream> {
        self.upstreams.iter().filter(|upstream| !upstream.is_resolved()).collect()
    }

    /// Splits into job and links.
    #[must_use]
    pub fn into_parts(self) -> (Job, Vec<Upstream>) {
        (self.job, self.upstreams)
    }
}

// ============================================================================
// SECTION: De-duplication and Merge
// ============================================================================

/// Removes duplicate links, preferring static over inferred for the same
/// resolved producer. First-seen order is preserved.
#[must_use]
pub fn deduplicate(upstreams: Vec<Upstream>) -> Vec<Upstream> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut result: Vec<Upstream> = Vec::with_capacity(upstreams.len());
    for upstream in upstreams {
        let key = format!("{}|{}", upstream.state.as_str(), upstream.identity());
        match positions.get(&key) {
            Some(&idx) => {
                let existing = &mut result[idx];
                if existing.upstream_type == UpstreamType::Inferred
                    && upstream.upstream_type == UpstreamType::Static
                {
                    *existing = upstream;
                }
            }
            None => {
                positions.insert(key, result.len());
                result.push(upstream);
            }
        }
    }
    result
}

/// Replaces unresolved entries with matching resolved ones.
///
/// An unresolved inferred entry is replaced by every resolved link whose
/// resource equals its URN; an unresolved static entry by the resolved link
/// with the same full name. Unmatched entries stay unresolved.
#[must_use]
pub fn merge_with_resolved(unresolved: Vec<Upstream>, resolved: &[Upstream]) -> Vec<Upstream> {
    let mut by_resource: BTreeMap<&str, Vec<&Upstream>> = BTreeMap::new();
    let mut by_full_name: BTreeMap<FullName, &Upstream> = BTreeMap::new();
    for upstream in resolved.iter().filter(|upstream| upstream.is_resolved()) {
        if let Some(resource) = &upstream.resource {
            by_resource.entry(resource.as_str()).or_default().push(upstream);
        }
        if let Some(full_name) = upstream.full_name() {
            by_full_name.entry(full_name).or_insert(upstream);
        }
    }
    let mut merged = Vec::with_capacity(unresolved.len());
    for entry in unresolved {
        if entry.is_resolved() {
            merged.push(entry);
            continue;
        }
        let by_urn = match (&entry.upstream_type, &entry.resource) {
            (UpstreamType::Inferred, Some(resource)) => by_resource.get(resource.as_str()),
            _ => None,
        };
        if let Some(producers) = by_urn {
            merged.extend(producers.iter().map(|producer| {
                let mut link = (*producer).clone();
                link.upstream_type = UpstreamType::Inferred;
                link
            }));
            continue;
        }
        let by_name = match entry.upstream_type {
            UpstreamType::Static => entry.full_name().and_then(|name| by_full_name.get(&name)),
            _ => None,
        };
        if let Some(producer) = by_name {
            let mut link = (*producer).clone();
            link.upstream_type = UpstreamType::Static;
            merged.push(link);
            continue;
        }
        merged.push(entry);
    }
    deduplicate(merged)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
