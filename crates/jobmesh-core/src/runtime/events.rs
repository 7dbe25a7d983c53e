// jobmesh-core/src/runtime/events.rs
// ============================================================================
// Module: Jobmesh Job Events
// Description: Structured job lifecycle events and sinks.
// Purpose: Record registry writes without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The reconciler emits one [`JobEvent`] per persisted change. Sinks decide
//! where events go: JSON lines on stderr, an append-only file, or nowhere.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::FullName;
use crate::core::Tenant;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event identifier for a created job.
pub const EVENT_JOB_CREATED: &str = "job_created";
/// Event identifier for an updated job.
pub const EVENT_JOB_UPDATED: &str = "job_updated";
/// Event identifier for a deleted job.
pub const EVENT_JOB_DELETED: &str = "job_deleted";
/// Event identifier for a replaced upstream set.
pub const EVENT_UPSTREAMS_REPLACED: &str = "upstreams_replaced";

/// Job lifecycle event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Project of the affected jobs.
    pub project_name: String,
    /// Namespace of the affected jobs.
    pub namespace_name: String,
    /// Affected job full names.
    pub jobs: Vec<String>,
}

impl JobEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: &'static str, tenant: &Tenant, jobs: &[FullName]) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            project_name: tenant.project_name().as_str().to_string(),
            namespace_name: tenant.namespace_name().as_str().to_string(),
            jobs: jobs.iter().map(|name| name.as_str().to_string()).collect(),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for job lifecycle events.
pub trait JobEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &JobEvent);
}

/// Sink that logs JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrJobEventSink;

impl JobEventSink for StderrJobEventSink {
    fn record(&self, event: &JobEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
#[derive(Debug)]
pub struct FileJobEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileJobEventSink {
    /// Opens the event log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl JobEventSink for FileJobEventSink {
    fn record(&self, event: &JobEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJobEventSink;

impl JobEventSink for NoopJobEventSink {
    fn record(&self, _event: &JobEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
