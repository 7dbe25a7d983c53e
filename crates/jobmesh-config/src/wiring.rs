// jobmesh-config/src/wiring.rs
// ============================================================================
// Module: Jobmesh Config Wiring
// Description: Builds runtime components from validated configuration.
// Purpose: Keep embedding programs free of construction details.
// Dependencies: jobmesh-core, jobmesh-extension, jobmesh-providers,
//               jobmesh-store-sqlite, tracing
// ============================================================================

//! ## Overview
//! Builders turn a validated [`JobmeshConfig`] into repositories, peer
//! clients, the plugin registry, the event sink, the extension manager, and
//! finally a wired [`JobmeshRuntime`]. Each builder reports a
//! [`ConfigError::Wiring`] when a component refuses its settings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use jobmesh_core::AesGcmCipher;
use jobmesh_core::Clock;
use jobmesh_core::ExternalUpstreamResolver;
use jobmesh_core::FileJobEventSink;
use jobmesh_core::InMemoryJobRepository;
use jobmesh_core::InMemoryTenantRepository;
use jobmesh_core::InternalUpstreamResolver;
use jobmesh_core::JobEventSink;
use jobmesh_core::JobRepository;
use jobmesh_core::JobService;
use jobmesh_core::JobServiceConfig;
use jobmesh_core::NoopJobEventSink;
use jobmesh_core::PluginRepository;
use jobmesh_core::PluginService;
use jobmesh_core::ResourceManager;
use jobmesh_core::SecretCipher;
use jobmesh_core::SimpleTemplateCompiler;
use jobmesh_core::StderrJobEventSink;
use jobmesh_core::TenantRepository;
use jobmesh_core::TenantService;
use jobmesh_core::UpstreamResolver;
use jobmesh_extension::ExtensionManager;
use jobmesh_extension::ExtensionManagerConfig;
use jobmesh_extension::GithubClient;
use jobmesh_extension::GithubParser;
use jobmesh_extension::OsFs;
use jobmesh_extension::ProcessRunner;
use jobmesh_extension::ProviderRegistry;
use jobmesh_providers::HttpResourceManager;
use jobmesh_providers::PluginRegistry;
use jobmesh_store_sqlite::SqliteJobStore;
use tracing::info;

use crate::config::ConfigError;
use crate::config::EventSinkType;
use crate::config::JobmeshConfig;

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Fully wired registry runtime.
pub struct JobmeshRuntime {
    /// Job specification service.
    pub job_service: JobService,
    /// Tenant service shared with the job service.
    pub tenant_service: Arc<TenantService>,
    /// Job repository backing the job service.
    pub job_repository: Arc<dyn JobRepository>,
    /// Tenant repository backing the tenant service.
    pub tenant_repository: Arc<dyn TenantRepository>,
}

// ============================================================================
// SECTION: Builders
// ============================================================================

impl JobmeshConfig {
    /// Builds the job and tenant repositories of the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Wiring`] when the store cannot be opened.
    pub fn build_repositories(
        &self,
    ) -> Result<(Arc<dyn JobRepository>, Arc<dyn TenantRepository>), ConfigError> {
        if let Some(sqlite) = self.store.sqlite()? {
            info!(path = %sqlite.path.display(), "opening sqlite job store");
            let store = SqliteJobStore::new(sqlite)
                .map_err(|err| ConfigError::Wiring(err.to_string()))?;
            let store = Arc::new(store);
            let jobs: Arc<dyn JobRepository> = store.clone();
            let tenants: Arc<dyn TenantRepository> = store;
            return Ok((jobs, tenants));
        }
        info!("using in-memory repositories");
        Ok((Arc::new(InMemoryJobRepository::new()), Arc::new(InMemoryTenantRepository::new())))
    }

    /// Builds one HTTP client per configured peer registry.
    ///
    /// Each peer timeout is capped by `resolver.peer_timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Wiring`] when a peer client rejects its
    /// settings.
    pub fn build_resource_managers(&self) -> Result<Vec<Arc<dyn ResourceManager>>, ConfigError> {
        self.resource_managers
            .iter()
            .map(|peer| {
                let mut peer = peer.clone();
                peer.timeout_ms = peer.timeout_ms.min(self.resolver.peer_timeout_ms);
                let manager = HttpResourceManager::new(peer)
                    .map_err(|err| ConfigError::Wiring(err.to_string()))?;
                Ok(Arc::new(manager) as Arc<dyn ResourceManager>)
            })
            .collect()
    }

    /// Builds the plugin registry, loading descriptors from `plugins.dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Wiring`] when a descriptor is invalid.
    pub fn build_plugin_registry(&self) -> Result<PluginRegistry, ConfigError> {
        match &self.plugins.dir {
            Some(dir) => {
                let registry = PluginRegistry::from_dir(dir)
                    .map_err(|err| ConfigError::Wiring(err.to_string()))?;
                info!(dir = %dir.display(), plugins = registry.len(), "loaded plugin descriptors");
                Ok(registry)
            }
            None => Ok(PluginRegistry::new()),
        }
    }

    /// Builds the configured job event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Wiring`] when the event file cannot be opened.
    pub fn build_event_sink(&self) -> Result<Arc<dyn JobEventSink>, ConfigError> {
        let sink: Arc<dyn JobEventSink> = match (self.events.sink, &self.events.path) {
            (EventSinkType::None, _) => Arc::new(NoopJobEventSink),
            (EventSinkType::Stderr, _) => Arc::new(StderrJobEventSink),
            (EventSinkType::File, Some(path)) => {
                let file = FileJobEventSink::new(path)
                    .map_err(|err| ConfigError::Wiring(err.to_string()))?;
                Arc::new(file)
            }
            (EventSinkType::File, None) => {
                return Err(ConfigError::Invalid("file event sink requires path".to_string()));
            }
        };
        Ok(sink)
    }

    /// Builds the secret cipher keyed by `secrets.app_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] without an app key and
    /// [`ConfigError::Wiring`] when the key is rejected.
    pub fn build_secret_cipher(&self) -> Result<Arc<dyn SecretCipher>, ConfigError> {
        let key = self
            .secrets
            .app_key
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("secrets.app_key is required".to_string()))?;
        let cipher = AesGcmCipher::new(key).map_err(|err| ConfigError::Wiring(err.to_string()))?;
        Ok(Arc::new(cipher))
    }

    /// Builds the extension manager on the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] without `extensions.root` and
    /// [`ConfigError::Wiring`] when the manager cannot be built.
    pub fn build_extension_manager(
        &self,
        clock: Arc<dyn Clock>,
    ) -> Result<ExtensionManager, ConfigError> {
        let root = self
            .extensions
            .root
            .clone()
            .ok_or_else(|| ConfigError::Invalid("extensions root is required".to_string()))?;
        let client = GithubClient::new(self.extensions.github.clone())
            .map_err(|err| ConfigError::Wiring(err.to_string()))?;
        let mut providers = ProviderRegistry::new();
        let parser = GithubParser::new(self.extensions.github_api.clone());
        providers.register(Arc::new(parser), Arc::new(client));
        ExtensionManager::new(
            ExtensionManagerConfig {
                root,
                reserved_commands: self.extensions.reserved_commands.clone(),
            },
            Arc::new(OsFs),
            providers,
            Arc::new(ProcessRunner),
            clock,
        )
        .map_err(|err| ConfigError::Wiring(err.to_string()))
    }

    /// Wires the job service, tenant service, and repositories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any component fails to build.
    pub fn build_runtime(
        &self,
        clock: Arc<dyn Clock>,
        plugins: Arc<dyn PluginRepository>,
    ) -> Result<JobmeshRuntime, ConfigError> {
        let (job_repository, tenant_repository) = self.build_repositories()?;
        let cipher = self.build_secret_cipher()?;
        let tenant_service = Arc::new(TenantService::new(Arc::clone(&tenant_repository), cipher));
        let managers = self.build_resource_managers()?;
        let peer_count = managers.len();
        let resolver = UpstreamResolver::new(
            InternalUpstreamResolver::new(Arc::clone(&job_repository)),
            ExternalUpstreamResolver::new(managers, self.resolver.peer_concurrency),
        );
        let job_service = JobService::new(
            Arc::clone(&job_repository),
            PluginService::new(plugins, Arc::new(SimpleTemplateCompiler), clock),
            resolver,
            tenant_service.clone(),
            self.build_event_sink()?,
            JobServiceConfig {
                generation_concurrency: self.service.generation_concurrency,
            },
        );
        info!(
            backend = ?self.store.backend,
            peers = peer_count,
            generation_concurrency = self.service.generation_concurrency,
            "jobmesh runtime wired"
        );
        Ok(JobmeshRuntime {
            job_service,
            tenant_service,
            job_repository,
            tenant_repository,
        })
    }
}
