// jobmesh-core/src/runtime/log_writer.rs
// ============================================================================
// Module: Jobmesh Log Writer
// Description: In-memory collector for user-facing progress lines.
// Purpose: Return reconciler progress to the caller alongside errors.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`BufferedLogWriter`] keeps lines in arrival order so a caller can render
//! them after an operation completes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use crate::interfaces::LogLevel;
use crate::interfaces::LogWriter;

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Thread-safe buffer of progress lines.
#[derive(Debug, Default)]
pub struct BufferedLogWriter {
    /// Collected lines.
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl BufferedLogWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the collected lines.
    #[must_use]
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        match self.lines.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the messages only.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, message)| message).collect()
    }
}

impl LogWriter for BufferedLogWriter {
    fn write(&self, level: LogLevel, message: String) {
        match self.lines.lock() {
            Ok(mut guard) => guard.push((level, message)),
            Err(poisoned) => poisoned.into_inner().push((level, message)),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
