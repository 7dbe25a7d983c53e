// jobmesh-config/src/config.rs
// ============================================================================
// Module: Jobmesh Config Model
// Description: TOML configuration model, loader, and validation.
// Purpose: Parse and validate the registry configuration file.
// Dependencies: jobmesh-core, jobmesh-extension, jobmesh-providers,
//               jobmesh-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`JobmeshConfig`] is read from an explicit path, the `JOBMESH_CONFIG`
//! environment variable, or `jobmesh.toml` in the working directory. Loading
//! is fail-closed: oversized files, over-long paths, non UTF-8 content, and
//! unknown keys are rejected before validation runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use jobmesh_core::JobServiceConfig;
use jobmesh_core::runtime::cipher::APP_KEY_LEN;
use jobmesh_core::runtime::resolver::external::DEFAULT_PEER_CONCURRENCY;
use jobmesh_extension::GithubClientConfig;
use jobmesh_extension::provider::github::DEFAULT_GITHUB_API;
use jobmesh_providers::HttpResourceManagerConfig;
use jobmesh_store_sqlite::SqliteStoreConfig;
use jobmesh_store_sqlite::SqliteStoreMode;
use jobmesh_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default config filename.
pub const DEFAULT_CONFIG_NAME: &str = "jobmesh.toml";
/// Environment variable override for the config path.
pub const CONFIG_ENV_VAR: &str = "JOBMESH_CONFIG";
/// Maximum allowed config file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 512 * 1024;
/// Maximum total path length for config-related paths.
pub const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
pub const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Upper bound on peer and generation fan-out.
pub const MAX_CONCURRENCY: usize = 256;
/// Default busy timeout of the `SQLite` store.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default timeout of one peer lookup.
const DEFAULT_PEER_TIMEOUT_MS: u64 = 5_000;
/// Commands extensions may never claim.
const DEFAULT_RESERVED_COMMANDS: [&str; 6] =
    ["job", "plugin", "project", "namespace", "extension", "version"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Config errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O error.
    #[error("config io error: {0}")]
    Io(String),
    /// Parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// A component could not be built from valid configuration.
    #[error("config wiring error: {0}")]
    Wiring(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Registry configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobmeshConfig {
    /// Job and tenant storage.
    #[serde(default)]
    pub store: StoreConfig,
    /// Peer registries consulted for unknown upstreams.
    #[serde(default)]
    pub resource_managers: Vec<HttpResourceManagerConfig>,
    /// Upstream resolution tuning.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Job service tuning.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Plugin descriptor loading.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Extension manager settings.
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    /// Job lifecycle event sink.
    #[serde(default)]
    pub events: EventsConfig,
    /// Secret encryption.
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-memory repositories; state is lost on exit.
    #[default]
    Memory,
    /// `SQLite` repositories.
    Sqlite,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database path, required for `sqlite`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` store config, or `None` for other backends.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `sqlite` has no path.
    pub fn sqlite(&self) -> Result<Option<SqliteStoreConfig>, ConfigError> {
        if self.backend != StoreBackend::Sqlite {
            return Ok(None);
        }
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
        Ok(Some(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }))
    }
}

/// `[resolver]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Maximum peers queried at once.
    pub peer_concurrency: usize,
    /// Upper bound on one peer lookup, in milliseconds.
    pub peer_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            peer_concurrency: DEFAULT_PEER_CONCURRENCY,
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
        }
    }
}

/// `[service]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Maximum jobs derived concurrently.
    pub generation_concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            generation_concurrency: JobServiceConfig::default().generation_concurrency,
        }
    }
}

/// `[plugins]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginsConfig {
    /// Directory of YAML plugin descriptors.
    pub dir: Option<PathBuf>,
}

/// `[extensions]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtensionsConfig {
    /// Extension root directory.
    pub root: Option<PathBuf>,
    /// GitHub API base URL.
    pub github_api: String,
    /// Commands extensions may not claim.
    pub reserved_commands: Vec<String>,
    /// GitHub releases client settings.
    pub github: GithubClientConfig,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            root: None,
            github_api: DEFAULT_GITHUB_API.to_string(),
            reserved_commands: DEFAULT_RESERVED_COMMANDS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            github: GithubClientConfig::default(),
        }
    }
}

/// Event sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkType {
    /// Drop events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to a file.
    File,
}

/// `[events]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Sink type.
    pub sink: EventSinkType,
    /// Output path, required for `file`.
    pub path: Option<PathBuf>,
}

/// `[secrets]` section.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// App key sealing tenant secrets; only its first 32 bytes are used.
    pub app_key: Option<String>,
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl JobmeshConfig {
    /// Loads configuration from disk and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved, "config path")?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses configuration from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(sqlite) = self.store.sqlite()? {
            validate_path(&sqlite.path, "store path")?;
        }

        let mut names = BTreeSet::new();
        for manager in &self.resource_managers {
            if manager.name.trim().is_empty() {
                return Err(ConfigError::Invalid("resource manager name is required".to_string()));
            }
            if manager.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "resource manager {} requires host",
                    manager.name
                )));
            }
            if manager.max_response_bytes == 0 {
                return Err(ConfigError::Invalid(format!(
                    "resource manager {} max_response_bytes must be positive",
                    manager.name
                )));
            }
            if !names.insert(manager.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate resource manager {}",
                    manager.name
                )));
            }
        }

        check_concurrency("resolver.peer_concurrency", self.resolver.peer_concurrency)?;
        if self.resolver.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "resolver.peer_timeout_ms must be positive".to_string(),
            ));
        }
        check_concurrency("service.generation_concurrency", self.service.generation_concurrency)?;

        if let Some(dir) = &self.plugins.dir {
            validate_path(dir, "plugins dir")?;
        }

        if let Some(root) = &self.extensions.root {
            validate_path(root, "extensions root")?;
        }
        let api = self.extensions.github_api.trim();
        if !(api.starts_with("https://") || api.starts_with("http://")) {
            return Err(ConfigError::Invalid(
                "extensions.github_api must be an http(s) url".to_string(),
            ));
        }
        if self.extensions.reserved_commands.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "reserved command names must be non-empty".to_string(),
            ));
        }

        match (self.events.sink, &self.events.path) {
            (EventSinkType::File, None) => {
                return Err(ConfigError::Invalid("file event sink requires path".to_string()));
            }
            (EventSinkType::File, Some(path)) => validate_path(path, "events path")?,
            _ => {}
        }

        if let Some(key) = &self.secrets.app_key
            && key.len() < APP_KEY_LEN
        {
            return Err(ConfigError::Invalid(format!(
                "secrets.app_key must be at least {APP_KEY_LEN} bytes"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from explicit input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates path length and components; `label` prefixes the message.
fn validate_path(path: &Path, label: &str) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{label} is empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{label} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{label} component too long")));
        }
    }
    Ok(())
}

/// Checks a fan-out bound.
fn check_concurrency(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_CONCURRENCY {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_CONCURRENCY}"
        )));
    }
    Ok(())
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
