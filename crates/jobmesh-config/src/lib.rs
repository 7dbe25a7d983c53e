// jobmesh-config/src/lib.rs
// ============================================================================
// Module: Jobmesh Config
// Description: Configuration loading, validation, and runtime wiring.
// Purpose: Turn one TOML file into a ready-to-use registry runtime.
// Dependencies: jobmesh-core, jobmesh-providers, jobmesh-store-sqlite,
//               jobmesh-extension, serde, toml
// ============================================================================

//! ## Overview
//! The configuration file selects the storage backend, peer registries,
//! resolver fan-out, plugin descriptor directory, extension root, event
//! sink, and the app key sealing tenant secrets.
//! [`JobmeshConfig::build_runtime`] wires them into a [`JobmeshRuntime`].
//!
//! ```toml
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/jobmesh/jobmesh.db"
//!
//! [[resource_managers]]
//! name = "upstream-registry"
//! host = "https://registry.example.com"
//!
//! [events]
//! sink = "stderr"
//!
//! [secrets]
//! app_key = "Yjo4a0jn1NvYdq79SADC/KaVv9Wu0Ffc"
//! ```

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod wiring;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::EventSinkType;
pub use config::EventsConfig;
pub use config::ExtensionsConfig;
pub use config::JobmeshConfig;
pub use config::PluginsConfig;
pub use config::ResolverConfig;
pub use config::SecretsConfig;
pub use config::ServiceConfig;
pub use config::StoreBackend;
pub use config::StoreConfig;
pub use wiring::JobmeshRuntime;
