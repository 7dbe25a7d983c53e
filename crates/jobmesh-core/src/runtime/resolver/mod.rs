// jobmesh-core/src/runtime/resolver/mod.rs
// ============================================================================
// Module: Jobmesh Upstream Resolver
// Description: Composite local-then-peer upstream resolution.
// Purpose: Produce final upstream lists and per-link errors for the reconciler.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! The composite resolver bulk-resolves locally, sends the union of links
//! still unresolved to the peers once, merges the answers per job, and
//! reports one not-found error per static link left unresolved. Unresolved
//! inferred links are tolerated silently. Only a failing local query is
//! fatal.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod external;
pub mod internal;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

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
use crate::interfaces::LogLevel;
use crate::interfaces::LogWriter;

pub use external::ExternalResolution;
pub use external::ExternalUpstreamResolver;
pub use internal::InternalUpstreamResolver;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a composite resolution.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Jobs with their final links.
    pub with_upstreams: Vec<WithUpstream>,
    /// Unknown static upstreams and peer failures.
    pub upstream_errors: MultiError,
}

/// Composite resolver used by the reconciler.
#[derive(Clone)]
pub struct UpstreamResolver {
    /// Local resolver.
    internal: InternalUpstreamResolver,
    /// Peer resolver.
    external: ExternalUpstreamResolver,
}

impl UpstreamResolver {
    /// Creates a composite resolver.
    #[must_use]
    pub const fn new(
        internal: InternalUpstreamResolver,
        external: ExternalUpstreamResolver,
    ) -> Self {
        Self { internal, external }
    }

    /// Resolves a batch of jobs of one project.
    ///
    /// # Errors
    ///
    /// Returns an error only when the local repository query fails.
    pub fn resolve(
        &self,
        ctx: &OperationContext,
        project: &ProjectName,
        jobs: Vec<Job>,
        log: &dyn LogWriter,
    ) -> Result<ResolveOutcome, DomainError> {
        let mut upstream_errors = MultiError::new("upstream resolution errors");
        if jobs.is_empty() {
            return Ok(ResolveOutcome {
                with_upstreams: Vec::new(),
                upstream_errors,
            });
        }
        let local = self.internal.bulk_resolve(ctx, project, jobs)?;

        let mut seen = BTreeSet::new();
        let pending: Vec<Upstream> = local
            .iter()
            .flat_map(WithUpstream::unresolved_upstreams)
            .filter(|upstream| seen.insert(lookup_key(upstream)))
            .cloned()
            .collect();
        let external = self.external.fetch_external(ctx, pending);
        if !external.errors.is_empty() {
            log.write(
                LogLevel::Error,
                format!("[{project}] upstream resolution failed: {}", external.errors),
            );
        }
        upstream_errors.extend(external.errors);

        let mut with_upstreams = Vec::with_capacity(local.len());
        for with_upstream in local {
            let (job, links) = with_upstream.into_parts();
            let merged = WithUpstream::new(job, merge_with_resolved(links, &external.resolved));
            for missing in merged.unresolved_upstreams() {
                if missing.upstream_type == UpstreamType::Static {
                    let upstream_name = missing
                        .full_name()
                        .map_or_else(|| missing.name.clone(), |name| name.to_string());
                    upstream_errors.append(DomainError::not_found(
                        ENTITY_JOB,
                        format!(
                            "[{}] error: {upstream_name} unknown upstream",
                            merged.job().full_name()
                        ),
                    ));
                }
            }
            log.write(
                LogLevel::Debug,
                format!(
                    "[{}] job {} upstream resolved",
                    merged.job().tenant().namespace_name(),
                    merged.job().name()
                ),
            );
            debug!(
                job = %merged.job().full_name(),
                links = merged.upstreams().len(),
                "resolved upstreams"
            );
            with_upstreams.push(merged);
        }
        Ok(ResolveOutcome {
            with_upstreams,
            upstream_errors,
        })
    }
}

/// Identifying token of an unresolved link.
fn lookup_key(upstream: &Upstream) -> String {
    match upstream.upstream_type {
        UpstreamType::Inferred => {
            format!("inferred:{}", upstream.resource.as_ref().map_or("", |urn| urn.as_str()))
        }
        _ => format!(
            "static:{}",
            upstream.full_name().map_or_else(|| upstream.name.clone(), |name| name.to_string())
        ),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
