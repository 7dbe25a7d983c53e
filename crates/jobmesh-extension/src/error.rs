// jobmesh-extension/src/error.rs
// ============================================================================
// Module: Extension Errors
// Description: Failure modes of extension lifecycle operations.
// Purpose: Give callers typed errors with stable messages.
// Dependencies: jobmesh-core, thiserror
// ============================================================================

//! ## Overview
//! Every extension operation returns [`ExtensionError`]. Validation failures
//! carry the offending input; I/O, client, and manifest failures carry the
//! underlying message as a string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use jobmesh_core::DomainError;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Entity label used when converting into [`DomainError`].
pub const ENTITY_EXTENSION: &str = "extension";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Extension lifecycle errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    /// Remote path argument is empty.
    #[error("remote path is empty")]
    EmptyRemotePath,
    /// Command name argument is empty.
    #[error("command name is empty")]
    EmptyCommandName,
    /// Tag name argument is empty.
    #[error("tag name is empty")]
    EmptyTagName,
    /// No registered parser accepts the remote path.
    #[error("remote path [{0}] is not recognized")]
    UnrecognizedRemotePath(String),
    /// A parser accepted the remote path but found it malformed.
    #[error("error parsing remote path [{path}]: {message}")]
    InvalidRemotePath {
        /// Remote path as given.
        path: String,
        /// Failure detail.
        message: String,
    },
    /// Command name is reserved by the host program.
    #[error("command [{0}] is reserved")]
    ReservedCommand(String),
    /// Operation conflicts with the current manifest.
    #[error("{0}")]
    Conflict(String),
    /// Extension, tag, or provider is not installed or registered.
    #[error("{0}")]
    NotFound(String),
    /// Manifest could not be read, decoded, or written.
    #[error("manifest error: {0}")]
    Manifest(String),
    /// Filesystem failure.
    #[error("extension io error: {0}")]
    Io(String),
    /// Release client failure.
    #[error("release client error: {0}")]
    Client(String),
    /// Extension process failure.
    #[error("extension run failed: {0}")]
    Run(String),
    /// Manager was misconfigured.
    #[error("invalid extension config: {0}")]
    Config(String),
}

impl From<ExtensionError> for DomainError {
    fn from(error: ExtensionError) -> Self {
        match error {
            ExtensionError::EmptyRemotePath
            | ExtensionError::EmptyCommandName
            | ExtensionError::EmptyTagName
            | ExtensionError::UnrecognizedRemotePath(_)
            | ExtensionError::InvalidRemotePath { .. }
            | ExtensionError::Config(_) => {
                Self::invalid_argument(ENTITY_EXTENSION, error.to_string())
            }
            ExtensionError::ReservedCommand(_) | ExtensionError::Conflict(_) => {
                Self::failed_precondition(ENTITY_EXTENSION, error.to_string())
            }
            ExtensionError::NotFound(_) => Self::not_found(ENTITY_EXTENSION, error.to_string()),
            ExtensionError::Manifest(_)
            | ExtensionError::Io(_)
            | ExtensionError::Client(_)
            | ExtensionError::Run(_) => Self::internal(ENTITY_EXTENSION, error.to_string()),
        }
    }
}
