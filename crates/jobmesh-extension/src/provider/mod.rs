// jobmesh-extension/src/provider/mod.rs
// ============================================================================
// Module: Extension Providers
// Description: Remote path parsers and release clients keyed by provider.
// Purpose: Let the manager install from any registered hosting provider.
// Dependencies: crate::{error, model}
// ============================================================================

//! ## Overview
//! A provider contributes a [`RemotePathParser`] that recognises its remote
//! paths and a [`ReleaseClient`] that downloads release descriptions and
//! assets. Parsers are tried in registration order; a parser that does not
//! recognise a path answers [`ExtensionError::UnrecognizedRemotePath`] and the
//! next one is tried.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod github;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use jobmesh_core::OperationContext;

use crate::error::ExtensionError;
use crate::model::RemoteMetadata;
use crate::model::RepositoryRelease;

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Recognises remote paths of one provider.
pub trait RemotePathParser: Send + Sync {
    /// Returns the provider name.
    fn provider(&self) -> &str;

    /// Parses `remote_path` into remote metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::UnrecognizedRemotePath`] when the path does
    /// not belong to this provider, and another error when it does but is
    /// malformed.
    fn parse(&self, remote_path: &str) -> Result<RemoteMetadata, ExtensionError>;
}

/// Downloads releases of one provider.
pub trait ReleaseClient: Send + Sync {
    /// Fetches the release described by `api_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Client`] when the request or decoding fails.
    fn download_release(
        &self,
        ctx: &OperationContext,
        api_path: &str,
    ) -> Result<RepositoryRelease, ExtensionError>;

    /// Downloads the asset of the release at `api_path` built for the
    /// current platform.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Client`] when no asset matches the platform
    /// or the download fails.
    fn download_asset(
        &self,
        ctx: &OperationContext,
        api_path: &str,
    ) -> Result<Vec<u8>, ExtensionError>;
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Parsers and clients keyed by provider name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    /// Parsers in registration order.
    parsers: Vec<Arc<dyn RemotePathParser>>,
    /// Clients by provider name.
    clients: BTreeMap<String, Arc<dyn ReleaseClient>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider's parser and client.
    pub fn register(&mut self, parser: Arc<dyn RemotePathParser>, client: Arc<dyn ReleaseClient>) {
        self.clients.insert(parser.provider().to_string(), client);
        self.parsers.push(parser);
    }

    /// Parses `remote_path` with the first parser that recognises it.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::UnrecognizedRemotePath`] when no parser
    /// recognises the path, or the first parser error otherwise.
    pub fn parse(&self, remote_path: &str) -> Result<RemoteMetadata, ExtensionError> {
        for parser in &self.parsers {
            match parser.parse(remote_path) {
                Err(ExtensionError::UnrecognizedRemotePath(_)) => {}
                other => return other,
            }
        }
        Err(ExtensionError::UnrecognizedRemotePath(remote_path.to_string()))
    }

    /// Returns the client of `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::NotFound`] when no client is registered.
    pub fn client(&self, provider: &str) -> Result<Arc<dyn ReleaseClient>, ExtensionError> {
        self.clients
            .get(provider)
            .cloned()
            .ok_or_else(|| {
                let message = format!("client for provider [{provider}] is not registered");
                ExtensionError::NotFound(message)
            })
    }

    /// Returns the registered provider names.
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.parsers.iter().map(|parser| parser.provider()).collect()
    }
}

// ============================================================================
// SECTION: Platform
// ============================================================================

/// Returns the `<os>-<arch>` suffix release assets are matched against.
///
/// Names follow the common release convention (`linux`, `darwin`,
/// `windows`; `amd64`, `arm64`, `386`).
#[must_use]
pub fn current_dist() -> String {
    dist_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// Maps Rust platform names onto release asset names.
#[must_use]
pub fn dist_for(os: &str, arch: &str) -> String {
    let os = match os {
        "macos" => "darwin",
        other => other,
    };
    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    format!("{os}-{arch}")
}
