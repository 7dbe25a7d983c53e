// jobmesh-core/src/core/mod.rs
// ============================================================================
// Module: Jobmesh Core Types
// Description: Tenant, spec, job, and upstream value types.
// Purpose: Provide validated, serializable types shared by every component.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Jobmesh core types describe tenants, job specifications, jobs with their
//! derived resources, and upstream links. They carry no I/O and are the
//! canonical source of truth for the repository, resolver, and reconciler.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod context;
pub mod errors;
pub mod job;
pub mod spec;
pub mod tenant;
pub mod upstream;
pub mod window;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::OperationContext;
pub use errors::DomainError;
pub use errors::ErrorCollector;
pub use errors::ErrorKind;
pub use errors::MultiError;
pub use job::Downstream;
pub use job::FullName;
pub use job::Job;
pub use job::JobFilter;
pub use job::JobState;
pub use job::ResourceUrn;
pub use spec::Alert;
pub use spec::EventType;
pub use spec::Hook;
pub use spec::HttpUpstream;
pub use spec::JobName;
pub use spec::Metadata;
pub use spec::Owner;
pub use spec::ResourceConfig;
pub use spec::ResourceMetadata;
pub use spec::Retry;
pub use spec::Schedule;
pub use spec::ScheduleBuilder;
pub use spec::ScheduleDate;
pub use spec::Spec;
pub use spec::SpecBuilder;
pub use spec::SpecUpstream;
pub use spec::SpecUpstreamName;
pub use spec::StringMap;
pub use spec::Task;
pub use spec::TaskName;
pub use spec::Version;
pub use tenant::ConfigMap;
pub use tenant::Namespace;
pub use tenant::NamespaceName;
pub use tenant::PlainTextSecret;
pub use tenant::Project;
pub use tenant::ProjectName;
pub use tenant::Secret;
pub use tenant::SecretInfo;
pub use tenant::SecretName;
pub use tenant::SecretType;
pub use tenant::Tenant;
pub use tenant::TenantDetails;
pub use upstream::Upstream;
pub use upstream::UpstreamState;
pub use upstream::UpstreamType;
pub use upstream::WithUpstream;
pub use window::Window;
pub use window::WindowConfig;
