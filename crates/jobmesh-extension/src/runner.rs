// jobmesh-extension/src/runner.rs
// ============================================================================
// Module: Extension Runner
// Description: Process execution seam for installed extensions.
// Purpose: Run extension binaries with inherited stdio.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`CommandRunner`] executes an extension binary and reports its exit code.
//! [`ProcessRunner`] spawns a child process that inherits the caller's
//! stdin, stdout, and stderr.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Executes extension binaries.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and returns its exit code.
    ///
    /// A process terminated by a signal reports `-1`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the process cannot be spawned.
    fn run(&self, program: &Path, args: &[String]) -> io::Result<i32>;
}

/// Runner spawning child processes with inherited stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[String]) -> io::Result<i32> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}
