// jobmesh-providers/src/registry.rs
// ============================================================================
// Module: Plugin Registry
// Description: In-process task plugin registry with YAML descriptors.
// Purpose: Resolve task names to plugin metadata and dependency capabilities.
// Dependencies: jobmesh-core, serde, serde_yaml, tracing
// ============================================================================

//! ## Overview
//! Plugins are registered in-process under their task name. Descriptive
//! metadata can be loaded from YAML descriptor files; a descriptor may also
//! declare a config-driven dependency capability that reads the destination
//! and sources straight from compiled task config. Plugins registered without
//! metadata surface `YamlModMissing` through the plugin service.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use jobmesh_core::DependencyMod;
use jobmesh_core::DependencyRequest;
use jobmesh_core::DestinationRequest;
use jobmesh_core::DomainError;
use jobmesh_core::OperationContext;
use jobmesh_core::Plugin;
use jobmesh_core::PluginError;
use jobmesh_core::PluginInfo;
use jobmesh_core::PluginRepository;
use jobmesh_core::StringMap;
use jobmesh_core::core::errors::ENTITY_PLUGIN;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum descriptor file size in bytes.
pub const MAX_DESCRIPTOR_BYTES: u64 = 64 * 1024;
/// File extensions treated as plugin descriptors.
const DESCRIPTOR_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
/// Default config key holding the destination.
const DEFAULT_DESTINATION_KEY: &str = "DESTINATION";
/// Default config key holding comma-separated sources.
const DEFAULT_SOURCES_KEY: &str = "SOURCES";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Plugin registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Descriptor file could not be read.
    #[error("plugin descriptor io error: {0}")]
    Io(String),
    /// Descriptor YAML could not be decoded.
    #[error("plugin descriptor parse error: {0}")]
    Parse(String),
    /// Registration was rejected.
    #[error("invalid plugin registration: {0}")]
    Invalid(String),
}

impl From<RegistryError> for DomainError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Invalid(_) | RegistryError::Parse(_) => {
                Self::invalid_argument(ENTITY_PLUGIN, error.to_string())
            }
            RegistryError::Io(_) => Self::internal(ENTITY_PLUGIN, error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Config keys read by [`ConfigDependencyMod`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DependencyDescriptor {
    /// Config key holding the destination URN.
    #[serde(default = "default_destination_key")]
    pub destination_key: String,
    /// Config or asset key holding comma-separated source URNs.
    #[serde(default = "default_sources_key")]
    pub sources_key: String,
}

impl Default for DependencyDescriptor {
    fn default() -> Self {
        Self {
            destination_key: default_destination_key(),
            sources_key: default_sources_key(),
        }
    }
}

/// YAML plugin descriptor.
///
/// ```yaml
/// name: bq2bq
/// description: BigQuery to BigQuery transformation
/// plugintype: task
/// pluginversion: 0.3.1
/// image: example/bq2bq:0.3.1
/// entrypoint: /opt/bq2bq
/// dependency:
///   destination_key: DESTINATION
///   sources_key: SOURCES
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDescriptor {
    /// Plugin metadata.
    #[serde(flatten)]
    pub info: PluginInfo,
    /// Optional config-driven dependency capability.
    #[serde(default)]
    pub dependency: Option<DependencyDescriptor>,
}

impl PluginDescriptor {
    /// Decodes and validates a descriptor from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Parse`] for malformed YAML and
    /// [`RegistryError::Invalid`] when the name is empty.
    pub fn from_yaml(text: &str) -> Result<Self, RegistryError> {
        let descriptor: Self =
            serde_yaml::from_str(text).map_err(|err| RegistryError::Parse(err.to_string()))?;
        if descriptor.info.name.trim().is_empty() {
            return Err(RegistryError::Invalid("plugin name is empty".to_string()));
        }
        Ok(descriptor)
    }

    /// Reads and decodes a descriptor file, enforcing the size limit.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] when the file is unreadable or too large,
    /// and the [`Self::from_yaml`] errors otherwise.
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let file = fs::File::open(path)
            .map_err(|err| RegistryError::Io(format!("{}: {err}", path.display())))?;
        let mut text = String::new();
        file.take(MAX_DESCRIPTOR_BYTES + 1)
            .read_to_string(&mut text)
            .map_err(|err| RegistryError::Io(format!("{}: {err}", path.display())))?;
        if u64::try_from(text.len()).unwrap_or(u64::MAX) > MAX_DESCRIPTOR_BYTES {
            return Err(RegistryError::Io(format!(
                "{}: descriptor exceeds size limit",
                path.display()
            )));
        }
        Self::from_yaml(&text).map_err(|err| match err {
            RegistryError::Parse(message) => {
                RegistryError::Parse(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Converts the descriptor into a registrable plugin.
    #[must_use]
    pub fn into_plugin(self) -> Plugin {
        Plugin {
            info: Some(self.info),
            dependency_mod: self
                .dependency
                .map(|dependency| {
                    Arc::new(ConfigDependencyMod::new(dependency)) as Arc<dyn DependencyMod>
                }),
        }
    }
}

/// Default for [`DependencyDescriptor::destination_key`].
fn default_destination_key() -> String {
    DEFAULT_DESTINATION_KEY.to_string()
}

/// Default for [`DependencyDescriptor::sources_key`].
fn default_sources_key() -> String {
    DEFAULT_SOURCES_KEY.to_string()
}

// ============================================================================
// SECTION: Config Dependency Capability
// ============================================================================

/// Dependency capability that reads compiled task config.
///
/// The destination is the value of the destination key. Sources are the
/// comma-separated value of the sources key, taken from config first and
/// from assets otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDependencyMod {
    /// Keys to read.
    keys: DependencyDescriptor,
}

impl ConfigDependencyMod {
    /// Creates the capability over the given keys.
    #[must_use]
    pub const fn new(keys: DependencyDescriptor) -> Self {
        Self {
            keys,
        }
    }
}

impl Default for ConfigDependencyMod {
    fn default() -> Self {
        Self::new(DependencyDescriptor::default())
    }
}

impl DependencyMod for ConfigDependencyMod {
    fn generate_destination(
        &self,
        ctx: &OperationContext,
        request: &DestinationRequest,
    ) -> Result<String, PluginError> {
        ctx.check().map_err(|err| PluginError::Call(err.message))?;
        Ok(request
            .config
            .get(&self.keys.destination_key)
            .map(|value| value.trim().to_string())
            .unwrap_or_default())
    }

    fn generate_dependencies(
        &self,
        ctx: &OperationContext,
        request: &DependencyRequest,
    ) -> Result<Vec<String>, PluginError> {
        ctx.check().map_err(|err| PluginError::Call(err.message))?;
        let raw = lookup(&request.config, &self.keys.sources_key)
            .or_else(|| lookup(&request.assets, &self.keys.sources_key))
            .unwrap_or_default();
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|urn| !urn.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Returns a non-empty map value.
fn lookup<'a>(map: &'a StringMap, key: &str) -> Option<&'a str> {
    map.get(key).map(String::as_str).filter(|value| !value.trim().is_empty())
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// In-process plugin registry keyed by task name.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    /// Registered plugins.
    plugins: BTreeMap<String, Plugin>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from every descriptor in `dir`.
    ///
    /// # Errors
    ///
    /// Returns the [`Self::load_dir`] errors.
    pub fn from_dir(dir: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.load_dir(dir)?;
        Ok(registry)
    }

    /// Registers a plugin under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Invalid`] for an empty or duplicate name, or
    /// when the plugin metadata names a different task.
    pub fn register(&mut self, name: &str, plugin: Plugin) -> Result<(), RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::Invalid("plugin name is empty".to_string()));
        }
        if let Some(info) = &plugin.info
            && info.name != name
        {
            return Err(RegistryError::Invalid(format!(
                "plugin {name} carries info for {}",
                info.name
            )));
        }
        if self.plugins.contains_key(name) {
            return Err(RegistryError::Invalid(format!("plugin {name} already registered")));
        }
        debug!(plugin = name, has_info = plugin.info.is_some(), "plugin registered");
        self.plugins.insert(name.to_string(), plugin);
        Ok(())
    }

    /// Registers a decoded descriptor.
    ///
    /// # Errors
    ///
    /// Returns the [`Self::register`] errors.
    pub fn register_descriptor(
        &mut self,
        descriptor: PluginDescriptor,
    ) -> Result<(), RegistryError> {
        let name = descriptor.info.name.clone();
        self.register(&name, descriptor.into_plugin())
    }

    /// Attaches a dependency capability to a registered plugin.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Invalid`] when no plugin is registered under
    /// `name`.
    pub fn attach_dependency_mod(
        &mut self,
        name: &str,
        dependency_mod: Arc<dyn DependencyMod>,
    ) -> Result<(), RegistryError> {
        let plugin = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| RegistryError::Invalid(format!("plugin {name} not registered")))?;
        plugin.dependency_mod = Some(dependency_mod);
        Ok(())
    }

    /// Loads every `.yaml`/`.yml` descriptor in `dir`, in file name order.
    ///
    /// Returns the number of plugins registered.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] when the directory cannot be listed and
    /// the descriptor or registration errors of the first failing file.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RegistryError> {
        let entries = fs::read_dir(dir)
            .map_err(|err| RegistryError::Io(format!("{}: {err}", dir.display())))?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| RegistryError::Io(err.to_string()))?.path();
            if path.is_file() && is_descriptor(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in &paths {
            self.register_descriptor(PluginDescriptor::from_file(path)?)?;
        }
        info!(dir = %dir.display(), count = paths.len(), "plugin descriptors loaded");
        Ok(paths.len())
    }

    /// Returns the registered task names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl PluginRepository for PluginRegistry {
    fn get_by_name(&self, name: &str) -> Result<Plugin, DomainError> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(ENTITY_PLUGIN, format!("plugin {name} not found"))
            })
    }
}

/// Returns true for descriptor file extensions.
fn is_descriptor(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DESCRIPTOR_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
        })
}
