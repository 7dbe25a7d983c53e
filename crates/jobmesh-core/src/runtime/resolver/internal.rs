// jobmesh-core/src/runtime/resolver/internal.rs
// ============================================================================
// Module: Jobmesh Internal Upstream Resolver
// Description: Resolution of upstream links against the local registry.
// Purpose: Replace unresolved links with locally known producers.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! The single-job path issues one lookup per source and per static name; the
//! batch path asks the repository for every job at once. Both merge with the
//! unresolved list using [`merge_with_resolved`]: inferred entries match by
//! URN first, static entries by full name second, and unmatched entries stay
//! unresolved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use tracing::debug;

use crate::core::DomainError;
use crate::core::Job;
use crate::core::MultiError;
use crate::core::OperationContext;
use crate::core::ProjectName;
use crate::core::Upstream;
use crate::core::UpstreamType;
use crate::core::WithUpstream;
use crate::core::errors::ENTITY_JOB;
use crate::core::upstream::merge_with_resolved;
use crate::interfaces::JobRepository;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolver over the local job repository.
#[derive(Clone)]
pub struct InternalUpstreamResolver {
    /// Local job registry.
    repo: Arc<dyn JobRepository>,
}

impl InternalUpstreamResolver {
    /// Creates an internal resolver.
    #[must_use]
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self { repo }
    }

    /// Resolves one job with per-link lookups.
    ///
    /// Lookup failures are collected in the second element; the affected
    /// links stay unresolved.
    pub fn resolve(
        &self,
        ctx: &OperationContext,
        job: Job,
    ) -> (WithUpstream, Result<(), MultiError>) {
        let mut errors = MultiError::new("internal upstream resolution errors");
        let (unresolved, declared) = job.unresolved_upstreams();
        errors.absorb(declared);

        let mut resolved = Vec::new();
        for source in job.sources() {
            let producers = errors
                .append_result(self.repo.get_all_by_resource_destination(ctx, source))
                .unwrap_or_default();
            resolved.extend(
                producers
                    .iter()
                    .filter(|producer| producer.full_name() != job.full_name())
                    .map(|producer| Upstream::resolved_to_job(producer, UpstreamType::Inferred)),
            );
        }
        for declared in job.static_upstream_names() {
            let Some((project, name)) = errors.append_result(declared.parts()) else {
                continue;
            };
            let project = project.unwrap_or_else(|| job.project_name().clone());
            let lookup = self.repo.get_by_job_name(ctx, &project, &name);
            if let Some(producer) = errors.append_result(lookup) {
                resolved.push(Upstream::resolved_to_job(&producer, UpstreamType::Static));
            }
        }

        let merged = merge_with_resolved(unresolved, &resolved);
        (WithUpstream::new(job, merged), errors.into_result())
    }

    /// Resolves a batch of jobs of one project with a single repository query.
    ///
    /// # Errors
    ///
    /// Returns an internal error when the repository query fails.
    pub fn bulk_resolve(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        jobs: Vec<Job>,
    ) -> Result<Vec<WithUpstream>, DomainError> {
        let names: Vec<_> = jobs.iter().map(|job| job.name().clone()).collect();
        let mut known = self.repo.resolve_upstreams(ctx, project, &names).map_err(|err| {
            DomainError::internal(
                ENTITY_JOB,
                format!("unable to resolve upstream: {}", err.message),
            )
        })?;
        let resolved = jobs
            .into_iter()
            .map(|job| {
                let local = known.remove(job.name()).unwrap_or_default();
                let (unresolved, _) = job.unresolved_upstreams();
                debug!(job = %job.full_name(), local = local.len(), "merged local upstreams");
                WithUpstream::new(job, merge_with_resolved(unresolved, &local))
            })
            .collect();
        Ok(resolved)
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
    use crate::core::UpstreamState;
    use crate::runtime::InMemoryJobRepository;
    use crate::runtime::testing::job_with;

    fn seeded() -> (Arc<InMemoryJobRepository>, InternalUpstreamResolver) {
        let repo = Arc::new(InMemoryJobRepository::new());
        repo.add(
            &OperationContext::background(),
            vec![
                job_with("job-b", Some("bq://p.ds.b"), &[], &[]),
                job_with("job-c", Some("bq://p.ds.c"), &[], &[]),
            ],
        )
        .unwrap();
        let resolver = InternalUpstreamResolver::new(repo.clone());
        (repo, resolver)
    }

    #[test]
    fn single_path_resolves_and_keeps_unmatched() {
        let (_, resolver) = seeded();
        let consumer =
            job_with("job-a", None, &["bq://p.ds.b", "bq://elsewhere"], &["job-c", "job-z"]);
        let (with_upstream, errors) = resolver.resolve(&OperationContext::background(), consumer);
        let links = with_upstream.upstreams();
        assert_eq!(links.len(), 4);
        assert!(links.iter().any(|l| l.name == "job-b" && l.state == UpstreamState::Resolved));
        assert!(links.iter().any(|l| l.name == "job-c" && l.state == UpstreamState::Resolved));
        assert!(links.iter().any(|l| l.name == "job-z" && l.state == UpstreamState::Unresolved));
        assert!(links.iter().any(|l| {
            l.upstream_type == UpstreamType::Inferred
                && l.state == UpstreamState::Unresolved
                && l.resource.as_ref().map(|urn| urn.as_str()) == Some("bq://elsewhere")
        }));
        assert_eq!(errors.unwrap_err().len(), 1);
    }

    #[test]
    fn bulk_path_matches_single_path() {
        let (_, resolver) = seeded();
        let ctx = OperationContext::background();
        let consumer = job_with("job-a", None, &["bq://p.ds.b"], &["job-c"]);
        let (single, _) = resolver.resolve(&ctx, consumer.clone());
        let project = ProjectName::new("proj").unwrap();
        let bulk = resolver.bulk_resolve(&ctx, &project, vec![consumer]).unwrap();
        assert_eq!(bulk[0].upstreams().len(), single.upstreams().len());
        assert!(bulk[0].unresolved_upstreams().is_empty());
    }

    #[test]
    fn static_and_inferred_to_same_producer_collapse() {
        let (_, resolver) = seeded();
        let consumer = job_with("job-a", None, &["bq://p.ds.b"], &["job-b"]);
        let bulk = resolver
            .bulk_resolve(
                &OperationContext::background(),
                &ProjectName::new("proj").unwrap(),
                vec![consumer],
            )
            .unwrap();
        assert_eq!(bulk[0].upstreams().len(), 1);
        assert_eq!(bulk[0].upstreams()[0].upstream_type, UpstreamType::Static);
    }
}
