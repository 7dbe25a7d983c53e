// jobmesh-core/src/runtime/mod.rs
// ============================================================================
// Module: Jobmesh Runtime
// Description: Services and in-memory adapters built on the core interfaces.
// Purpose: Provide the reconciler, resolvers, plugin and tenant services.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime wires the core types to the interface seams: the job service
//! reconciler, the local and peer upstream resolvers, plugin-driven job
//! derivation, tenant management, lifecycle event sinks, and in-memory
//! stores for tests and embedding.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cipher;
pub mod events;
pub mod job_service;
pub mod log_writer;
pub mod plugin_service;
pub mod resolver;
pub mod store;
pub mod template;
pub mod tenant_service;
#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cipher::AesGcmCipher;
pub use events::FileJobEventSink;
pub use events::JobEvent;
pub use events::JobEventSink;
pub use events::NoopJobEventSink;
pub use events::StderrJobEventSink;
pub use job_service::DeleteOutcome;
pub use job_service::JobService;
pub use job_service::JobServiceConfig;
pub use log_writer::BufferedLogWriter;
pub use plugin_service::PluginService;
pub use resolver::ExternalUpstreamResolver;
pub use resolver::InternalUpstreamResolver;
pub use resolver::ResolveOutcome;
pub use resolver::UpstreamResolver;
pub use store::InMemoryJobRepository;
pub use store::InMemoryTenantRepository;
pub use template::SimpleTemplateCompiler;
pub use tenant_service::TenantService;
