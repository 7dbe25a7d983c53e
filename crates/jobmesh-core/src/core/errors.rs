// jobmesh-core/src/core/errors.rs
// ============================================================================
// Module: Jobmesh Domain Errors
// Description: Typed domain errors and ordered error aggregation.
// Purpose: Carry error kind and entity context across component boundaries.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every leaf operation in Jobmesh fails with a [`DomainError`] that carries an
//! [`ErrorKind`], the entity it concerns, and a human readable message.
//! Batch operations never stop at the first failure; they accumulate child
//! errors into a [`MultiError`] whose status kind is the highest priority kind
//! among its children.
//!
//! [`ErrorCollector`] is the thread-safe accumulation point used when batch
//! work runs on scoped worker threads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Entities
// ============================================================================

/// Entity label for job errors.
pub const ENTITY_JOB: &str = "job";
/// Entity label for project errors.
pub const ENTITY_PROJECT: &str = "project";
/// Entity label for namespace errors.
pub const ENTITY_NAMESPACE: &str = "namespace";
/// Entity label for secret errors.
pub const ENTITY_SECRET: &str = "secret";
/// Entity label for tenant errors.
pub const ENTITY_TENANT: &str = "tenant";
/// Entity label for plugin errors.
pub const ENTITY_PLUGIN: &str = "plugin";
/// Entity label for window errors.
pub const ENTITY_WINDOW: &str = "window";
/// Entity label for peer resource manager errors.
pub const ENTITY_RESOURCE_MANAGER: &str = "resource_manager";
/// Entity label for operation context errors.
pub const ENTITY_CONTEXT: &str = "context";

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Error classification shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// User-supplied value violates an invariant.
    InvalidArgument,
    /// Lookup miss.
    NotFound,
    /// Uniqueness conflict on write.
    AlreadyExists,
    /// Operation rejected because of current state.
    FailedPrecondition,
    /// Unexpected wrapped failure.
    Internal,
}

impl ErrorKind {
    /// Returns the aggregation priority; higher wins.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::InvalidArgument => 1,
            Self::NotFound => 2,
            Self::AlreadyExists => 3,
            Self::FailedPrecondition => 4,
            Self::Internal => 5,
        }
    }

    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::AlreadyExists => "resource already exists",
            Self::FailedPrecondition => "failed precondition",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Domain Error
// ============================================================================

/// Typed error carrying a kind, the concerned entity, and a message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} for entity {entity}: {message}")]
pub struct DomainError {
    /// Error classification.
    pub kind: ErrorKind,
    /// Entity label, for example `job`.
    pub entity: String,
    /// Human readable detail.
    pub message: String,
}

impl DomainError {
    /// Creates a new domain error.
    #[must_use]
    pub fn new(kind: ErrorKind, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, entity, message)
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, entity, message)
    }

    /// Creates an already exists error.
    #[must_use]
    pub fn already_exists(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, entity, message)
    }

    /// Creates a failed precondition error.
    #[must_use]
    pub fn failed_precondition(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, entity, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, entity, message)
    }

    /// Returns true when the error has the provided kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Re-labels the error with a different entity while keeping the kind.
    #[must_use]
    pub fn with_entity(self, entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            ..self
        }
    }
}

// ============================================================================
// SECTION: Multi Error
// ============================================================================

/// Ordered aggregation of domain errors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiError {
    /// Short description of the batch the errors belong to.
    title: String,
    /// Child errors in the order they were appended.
    errors: Vec<DomainError>,
}

impl MultiError {
    /// Creates an empty aggregation with a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            errors: Vec::new(),
        }
    }

    /// Appends a single error.
    pub fn append(&mut self, error: impl Into<DomainError>) {
        self.errors.push(error.into());
    }

    /// Appends every child of another aggregation, flattening it.
    pub fn extend(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Appends the error side of a result, discarding the success value.
    pub fn append_result<T, E: Into<DomainError>>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.append(err);
                None
            }
        }
    }

    /// Appends the error side of a multi-error result.
    pub fn absorb(&mut self, result: Result<(), Self>) {
        if let Err(other) = result {
            self.extend(other);
        }
    }

    /// Returns the aggregation title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the accumulated errors.
    #[must_use]
    pub fn errors(&self) -> &[DomainError] {
        &self.errors
    }

    /// Returns the number of accumulated errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true when nothing was accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the status kind by priority, or `None` when empty.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.errors.iter().map(|err| err.kind).max_by_key(|kind| kind.priority())
    }

    /// Returns true when any child has the provided kind.
    #[must_use]
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|err| err.kind == kind)
    }

    /// Converts the aggregation into a result that is `Ok` iff empty.
    ///
    /// # Errors
    ///
    /// Returns the aggregation itself when it holds at least one error.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.title)?;
        for err in &self.errors {
            write!(f, "\n {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl From<MultiError> for DomainError {
    fn from(error: MultiError) -> Self {
        let kind = error.kind().unwrap_or(ErrorKind::Internal);
        let entity = error.errors.first().map_or_else(String::new, |err| err.entity.clone());
        Self::new(kind, entity, error.to_string())
    }
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Thread-safe error accumulator shared by batch workers.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    /// Accumulated errors guarded by a mutex.
    errors: Mutex<Vec<DomainError>>,
}

impl ErrorCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error; safe to call from multiple threads.
    pub fn push(&self, error: impl Into<DomainError>) {
        let error = error.into();
        match self.errors.lock() {
            Ok(mut guard) => guard.push(error),
            Err(poisoned) => poisoned.into_inner().push(error),
        }
    }

    /// Consumes the collector into an ordered [`MultiError`].
    #[must_use]
    pub fn into_multi(self, title: impl Into<String>) -> MultiError {
        let errors = match self.errors.into_inner() {
            Ok(errors) => errors,
            Err(poisoned) => poisoned.into_inner(),
        };
        MultiError {
            title: title.into(),
            errors,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
