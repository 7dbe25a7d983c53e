// jobmesh-providers/src/lib.rs
// ============================================================================
// Module: Jobmesh Providers
// Description: Plugin registry and peer registry clients.
// Purpose: Supply concrete plugin and resource manager implementations.
// Dependencies: jobmesh-core, reqwest, serde, serde_yaml
// ============================================================================

//! ## Overview
//! This crate ships the in-process [`PluginRegistry`], which registers task
//! plugins and loads their descriptors from YAML, and the
//! [`HttpResourceManager`], which looks up unknown upstreams on a peer
//! registry over HTTP.
//! Invariants:
//! - Plugins are looked up by task name; a missing name is `NotFound`.
//! - Peer responses are size-bounded and a non-200 status is an error.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpResourceManager;
pub use http::HttpResourceManagerConfig;
pub use http::HttpResourceManagerError;
pub use registry::ConfigDependencyMod;
pub use registry::PluginDescriptor;
pub use registry::PluginRegistry;
pub use registry::RegistryError;
