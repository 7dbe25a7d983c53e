// jobmesh-core/src/runtime/testing.rs
// ============================================================================
// Module: Jobmesh Runtime Test Fixtures
// Description: Shared builders and fakes for runtime unit tests.
// Purpose: Keep test setup short and consistent across runtime modules.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only fixtures.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::ConfigMap;
use crate::core::DomainError;
use crate::core::Job;
use crate::core::JobName;
use crate::core::Namespace;
use crate::core::NamespaceName;
use crate::core::OperationContext;
use crate::core::Owner;
use crate::core::Project;
use crate::core::ProjectName;
use crate::core::ResourceUrn;
use crate::core::ScheduleBuilder;
use crate::core::ScheduleDate;
use crate::core::Spec;
use crate::core::SpecBuilder;
use crate::core::SpecUpstream;
use crate::core::SpecUpstreamName;
use crate::core::StringMap;
use crate::core::Task;
use crate::core::TaskName;
use crate::core::Tenant;
use crate::core::TenantDetails;
use crate::core::Version;
use crate::core::WindowConfig;
use crate::core::errors::ENTITY_PLUGIN;
use crate::core::tenant::PROJECT_SCHEDULER_HOST_KEY;
use crate::core::tenant::PROJECT_STORAGE_PATH_KEY;
use crate::interfaces::DependencyMod;
use crate::interfaces::DependencyRequest;
use crate::interfaces::DestinationRequest;
use crate::interfaces::Plugin;
use crate::interfaces::PluginError;
use crate::interfaces::PluginInfo;
use crate::interfaces::PluginRepository;
use crate::interfaces::PluginType;
use crate::interfaces::SecretCipher;

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Task name served by [`EchoDependencyMod`].
pub const ECHO_TASK: &str = "echo";
/// Task name registered without any capability.
pub const BARE_TASK: &str = "bare";

pub fn tenant() -> Tenant {
    Tenant::new("proj", "ns").unwrap()
}

pub fn spec_with(name: &str, task: &str, config: StringMap, upstream_names: &[&str]) -> Spec {
    let schedule = ScheduleBuilder::new(ScheduleDate::new("2022-10-01").unwrap())
        .with_interval("0 2 * * *")
        .build()
        .unwrap();
    let upstream = SpecUpstream {
        upstream_names: upstream_names
            .iter()
            .map(|name| SpecUpstreamName::new(*name).unwrap())
            .collect(),
        http_upstreams: Vec::new(),
    };
    SpecBuilder::new(
        Version::new(1).unwrap(),
        JobName::new(name).unwrap(),
        Owner::new("data-eng").unwrap(),
        schedule,
        WindowConfig::new("24h", "0", "d"),
        Task::new(TaskName::new(task).unwrap(), config),
    )
    .with_upstream(upstream)
    .build()
    .unwrap()
}

pub fn spec(name: &str) -> Spec {
    spec_with(name, ECHO_TASK, StringMap::new(), &[])
}

pub fn job(name: &str) -> Job {
    Job::new(tenant(), spec(name), None, Vec::new())
}

pub fn job_with(
    name: &str,
    destination: Option<&str>,
    sources: &[&str],
    upstream_names: &[&str],
) -> Job {
    Job::new(
        tenant(),
        spec_with(name, ECHO_TASK, StringMap::new(), upstream_names),
        destination.map(|urn| ResourceUrn::new(urn).unwrap()),
        sources.iter().map(|urn| ResourceUrn::new(*urn).unwrap()).collect(),
    )
}

pub fn project() -> Project {
    Project::new(
        ProjectName::new("proj").unwrap(),
        ConfigMap::from([
            (PROJECT_STORAGE_PATH_KEY.to_string(), "gs://bucket".to_string()),
            (PROJECT_SCHEDULER_HOST_KEY.to_string(), "http://airflow".to_string()),
            ("DATASET".to_string(), "ds".to_string()),
        ]),
    )
    .unwrap()
}

pub fn namespace() -> Namespace {
    Namespace::new(
        NamespaceName::new("ns").unwrap(),
        ProjectName::new("proj").unwrap(),
        ConfigMap::new(),
    )
    .unwrap()
}

pub fn tenant_details() -> TenantDetails {
    TenantDetails::new(project(), namespace(), Vec::new()).unwrap()
}

// ============================================================================
// SECTION: Fake Plugins
// ============================================================================

/// Dependency capability echoing compiled config and assets.
///
/// Destination is the `DESTINATION` config value; sources are the
/// comma-separated `SOURCES` asset. A `FAIL` config key makes calls fail.
pub struct EchoDependencyMod;

impl DependencyMod for EchoDependencyMod {
    fn generate_destination(
        &self,
        _ctx: &OperationContext,
        request: &DestinationRequest,
    ) -> Result<String, PluginError> {
        if request.config.contains_key("FAIL") {
            return Err(PluginError::Call("destination failed".to_string()));
        }
        Ok(request.config.get("DESTINATION").cloned().unwrap_or_default())
    }

    fn generate_dependencies(
        &self,
        _ctx: &OperationContext,
        request: &DependencyRequest,
    ) -> Result<Vec<String>, PluginError> {
        if request.config.contains_key("FAIL") {
            return Err(PluginError::Call("dependencies failed".to_string()));
        }
        Ok(request
            .assets
            .get("SOURCES")
            .map(|sources| {
                sources
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Plugin repository with the echo and bare plugins.
pub struct FakePlugins {
    /// Registered plugins.
    plugins: BTreeMap<String, Plugin>,
}

impl FakePlugins {
    pub fn new() -> Self {
        let echo = Plugin {
            info: Some(PluginInfo {
                name: ECHO_TASK.to_string(),
                description: "echo".to_string(),
                plugin_type: PluginType::Task,
                plugin_version: "0.1.0".to_string(),
                image: "example/echo:latest".to_string(),
                entrypoint: "/bin/echo".to_string(),
            }),
            dependency_mod: Some(Arc::new(EchoDependencyMod)),
        };
        let plugins = BTreeMap::from([
            (ECHO_TASK.to_string(), echo),
            (BARE_TASK.to_string(), Plugin::default()),
        ]);
        Self { plugins }
    }
}

impl PluginRepository for FakePlugins {
    fn get_by_name(&self, name: &str) -> Result<Plugin, DomainError> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| {
                DomainError::not_found(ENTITY_PLUGIN, format!("plugin {name} not found"))
            })
    }
}

// ============================================================================
// SECTION: Cipher
// ============================================================================

/// Cipher that stores secret bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextCipher;

impl SecretCipher for PlainTextCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DomainError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DomainError> {
        Ok(ciphertext.to_vec())
    }
}
