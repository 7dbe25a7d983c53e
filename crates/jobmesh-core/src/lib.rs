// jobmesh-core/src/lib.rs
// ============================================================================
// Module: Jobmesh Core Library
// Description: Public API surface for the Jobmesh job registry core.
// Purpose: Expose core types, interfaces, and runtime services.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Jobmesh core accepts declarative job specifications per tenant, derives
//! each job's destination and sources through task plugins, and resolves the
//! producer-consumer graph against the local registry and peer registries.
//! It is storage-agnostic and integrates through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Clock;
pub use interfaces::DependencyMod;
pub use interfaces::DependencyRequest;
pub use interfaces::DestinationRequest;
pub use interfaces::FixedClock;
pub use interfaces::JobRepository;
pub use interfaces::LogLevel;
pub use interfaces::LogWriter;
pub use interfaces::Plugin;
pub use interfaces::PluginError;
pub use interfaces::PluginInfo;
pub use interfaces::PluginRepository;
pub use interfaces::PluginServiceError;
pub use interfaces::PluginType;
pub use interfaces::ResourceManager;
pub use interfaces::SecretCipher;
pub use interfaces::SkippedJob;
pub use interfaces::SystemClock;
pub use interfaces::TemplateCompiler;
pub use interfaces::TenantDetailsGetter;
pub use interfaces::TenantRepository;
pub use interfaces::WriteOutcome;
pub use runtime::AesGcmCipher;
pub use runtime::BufferedLogWriter;
pub use runtime::DeleteOutcome;
pub use runtime::ExternalUpstreamResolver;
pub use runtime::FileJobEventSink;
pub use runtime::InMemoryJobRepository;
pub use runtime::InMemoryTenantRepository;
pub use runtime::InternalUpstreamResolver;
pub use runtime::JobEvent;
pub use runtime::JobEventSink;
pub use runtime::JobService;
pub use runtime::JobServiceConfig;
pub use runtime::NoopJobEventSink;
pub use runtime::PluginService;
pub use runtime::ResolveOutcome;
pub use runtime::SimpleTemplateCompiler;
pub use runtime::StderrJobEventSink;
pub use runtime::TenantService;
pub use runtime::UpstreamResolver;
