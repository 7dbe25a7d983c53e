// jobmesh-extension/src/lib.rs
// ============================================================================
// Module: Jobmesh Extension
// Description: Lifecycle manager for externally published CLI extensions.
// Purpose: Install, upgrade, activate, uninstall, rename, and run extensions.
// Dependencies: jobmesh-core, reqwest, serde_yaml, time
// ============================================================================

//! ## Overview
//! Extensions are standalone binaries published as release assets. The
//! [`ExtensionManager`] resolves a remote path through a registered provider,
//! downloads the asset for the current platform, and records it in a YAML
//! manifest kept next to the binaries.
//! Invariants:
//! - Command names are unique and never shadow a reserved command.
//! - The manifest is only replaced by atomic writes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod fs;
pub mod manager;
pub mod model;
pub mod provider;
pub mod runner;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::ENTITY_EXTENSION;
pub use error::ExtensionError;
pub use fs::ExtensionFs;
pub use fs::MemoryFs;
pub use fs::OsFs;
pub use manager::ExtensionManager;
pub use manager::ExtensionManagerConfig;
pub use manager::InstalledExtension;
pub use manager::MANIFEST_FILE_NAME;
pub use model::Manifest;
pub use model::RemoteMetadata;
pub use model::RepositoryAsset;
pub use model::RepositoryOwner;
pub use model::RepositoryProject;
pub use model::RepositoryRelease;
pub use provider::ProviderRegistry;
pub use provider::ReleaseClient;
pub use provider::RemotePathParser;
pub use provider::github::GithubClient;
pub use provider::github::GithubClientConfig;
pub use provider::github::GithubParser;
pub use runner::CommandRunner;
pub use runner::ProcessRunner;
