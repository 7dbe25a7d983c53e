// jobmesh-core/src/runtime/resolver/external.rs
// ============================================================================
// Module: Jobmesh External Upstream Resolver
// Description: Resolution of unresolved links through peer registries.
// Purpose: Ask every configured peer about links unknown locally.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! Each unresolved link is sent to every configured [`ResourceManager`]. A
//! peer failure is recorded and treated as "this peer does not know"; it
//! never fails the batch. Lookups run on scoped worker threads whose count
//! is capped by the configured concurrency.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::warn;

use crate::core::DomainError;
use crate::core::ErrorCollector;
use crate::core::MultiError;
use crate::core::OperationContext;
use crate::core::Upstream;
use crate::core::UpstreamState;
use crate::core::errors::ENTITY_RESOURCE_MANAGER;
use crate::interfaces::ResourceManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default cap on concurrent peer lookups.
pub const DEFAULT_PEER_CONCURRENCY: usize = 8;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of an external lookup round.
#[derive(Debug, Clone, Default)]
pub struct ExternalResolution {
    /// Links resolved by at least one peer.
    pub resolved: Vec<Upstream>,
    /// Links no peer could resolve, in input order.
    pub unresolved: Vec<Upstream>,
    /// Peer failures.
    pub errors: MultiError,
}

/// Resolver over peer registries.
#[derive(Clone)]
pub struct ExternalUpstreamResolver {
    /// Configured peers.
    managers: Vec<Arc<dyn ResourceManager>>,
    /// Maximum concurrent lookups.
    max_concurrency: usize,
}

impl ExternalUpstreamResolver {
    /// Creates a resolver over the given peers.
    #[must_use]
    pub fn new(managers: Vec<Arc<dyn ResourceManager>>, max_concurrency: usize) -> Self {
        Self {
            managers,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Creates a resolver with no peers.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), DEFAULT_PEER_CONCURRENCY)
    }

    /// Returns the number of configured peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.managers.len()
    }

    /// Looks up every unresolved link on every peer.
    ///
    /// With no peers the input is returned unchanged and without errors.
    #[must_use]
    pub fn fetch_external(
        &self,
        ctx: &OperationContext,
        unresolved: Vec<Upstream>,
    ) -> ExternalResolution {
        let mut resolution = ExternalResolution {
            errors: MultiError::new("external upstream resolution errors"),
            ..ExternalResolution::default()
        };
        if self.managers.is_empty() || unresolved.is_empty() {
            resolution.unresolved = unresolved;
            return resolution;
        }

        let collector = ErrorCollector::new();
        let slots: Vec<Mutex<Option<Vec<Upstream>>>> =
            unresolved.iter().map(|_| Mutex::new(None)).collect();
        let cursor = AtomicUsize::new(0);
        let workers = self.max_concurrency.min(unresolved.len());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(upstream) = unresolved.get(index) else {
                            break;
                        };
                        let found = self.lookup(ctx, upstream, &collector);
                        if let Some(slot) = slots.get(index)
                            && let Ok(mut guard) = slot.lock()
                        {
                            *guard = Some(found);
                        }
                    }
                });
            }
        });

        for (upstream, slot) in unresolved.into_iter().zip(slots) {
            let found = slot.into_inner().ok().flatten().unwrap_or_default();
            if found.is_empty() {
                resolution.unresolved.push(upstream);
            } else {
                resolution.resolved.extend(found);
            }
        }
        resolution.errors.extend(collector.into_multi(""));
        resolution
    }

    /// Asks every peer about one link.
    fn lookup(
        &self,
        ctx: &OperationContext,
        upstream: &Upstream,
        collector: &ErrorCollector,
    ) -> Vec<Upstream> {
        let mut found = Vec::new();
        for manager in &self.managers {
            if let Err(err) = ctx.check() {
                collector.push(err);
                break;
            }
            match manager.fetch_upstreams(ctx, upstream) {
                Ok(upstreams) => {
                    debug!(peer = manager.name(), found = upstreams.len(), "peer lookup finished");
                    found.extend(upstreams.into_iter().map(|mut resolved| {
                        resolved.upstream_type = upstream.upstream_type;
                        resolved.state = UpstreamState::Resolved;
                        resolved.host = manager.host().to_string();
                        resolved.external = true;
                        resolved
                    }));
                }
                Err(err) => {
                    warn!(peer = manager.name(), error = %err, "peer lookup failed");
                    collector.push(DomainError::new(
                        err.kind,
                        ENTITY_RESOURCE_MANAGER,
                        format!("resource manager {}: {}", manager.name(), err.message),
                    ));
                }
            }
        }
        found
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
