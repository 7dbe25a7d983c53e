// system-tests/src/config/env.rs
// ============================================================================
// Module: Scenario Environment
// Description: Environment overrides for registry scenarios.
// Purpose: Let CI relocate databases and tune peer timeouts.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Every override is optional. A variable that is set must be UTF-8 and
//! non-blank; anything else is rejected rather than ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Peer timeout used when none is configured.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Recognized scenario overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTestEnv {
    /// Directory receiving per-scenario database directories.
    RunRoot,
    /// Peer lookup timeout in milliseconds.
    PeerTimeoutMs,
    /// Selects the `delete` journal instead of WAL.
    DeleteJournal,
}

impl SystemTestEnv {
    /// Every override, in documentation order.
    pub const ALL: [Self; 3] = [Self::RunRoot, Self::PeerTimeoutMs, Self::DeleteJournal];

    /// Returns the variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunRoot => "JOBMESH_SYSTEM_TEST_RUN_ROOT",
            Self::PeerTimeoutMs => "JOBMESH_SYSTEM_TEST_PEER_TIMEOUT_MS",
            Self::DeleteJournal => "JOBMESH_SYSTEM_TEST_DELETE_JOURNAL",
        }
    }

    /// Reads this override; unset yields `None`.
    fn value(self) -> Result<Option<String>, String> {
        let Some(value) = read_env_strict(self.as_str())? else {
            return Ok(None);
        };
        if value.trim().is_empty() {
            return Err(format!("{} is set but blank", self.as_str()));
        }
        Ok(Some(value.trim().to_string()))
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Scenario settings after applying overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemTestConfig {
    /// Parent directory for scenario databases; system temp dir when unset.
    pub run_root: Option<PathBuf>,
    /// Peer lookup timeout.
    pub peer_timeout: Duration,
    /// Use the `delete` journal mode.
    pub delete_journal: bool,
}

impl Default for SystemTestConfig {
    fn default() -> Self {
        Self {
            run_root: None,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            delete_journal: false,
        }
    }
}

impl SystemTestConfig {
    /// Applies the process environment over the defaults.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first malformed override.
    pub fn load() -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(root) = SystemTestEnv::RunRoot.value()? {
            config.run_root = Some(PathBuf::from(root));
        }
        if let Some(raw) = SystemTestEnv::PeerTimeoutMs.value()? {
            config.peer_timeout = parse_millis(SystemTestEnv::PeerTimeoutMs, &raw)?;
        }
        if let Some(raw) = SystemTestEnv::DeleteJournal.value()? {
            config.delete_journal = parse_flag(SystemTestEnv::DeleteJournal, &raw)?;
        }
        Ok(config)
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Reads a variable, failing on non-UTF-8 content.
///
/// # Errors
///
/// Returns a message when the value is not UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(format!("{name} is not UTF-8")),
    }
}

/// Parses a non-zero millisecond count.
fn parse_millis(key: SystemTestEnv, raw: &str) -> Result<Duration, String> {
    match raw.parse::<u64>() {
        Ok(0) => Err(format!("{} must be at least 1 ms", key.as_str())),
        Ok(millis) => Ok(Duration::from_millis(millis)),
        Err(_) => Err(format!("{} expects milliseconds, got {raw}", key.as_str())),
    }
}

/// Parses `1`/`0`/`true`/`false`, ignoring case.
fn parse_flag(key: SystemTestEnv, raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(format!("{} expects true or false, got {raw}", key.as_str())),
    }
}
