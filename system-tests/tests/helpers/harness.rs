// system-tests/tests/helpers/harness.rs
// ============================================================================
// Module: Scenario Harness
// Description: Persistent registry runtime wired from a TOML document.
// Purpose: Run scenarios against the SQLite store and real peer clients.
// Dependencies: system-tests, jobmesh-config, jobmesh-core, jobmesh-providers
// ============================================================================

//! ## Overview
//! [`Harness`] writes nothing but a database file: configuration is rendered
//! as TOML, validated through [`JobmeshConfig::from_toml`], and wired with
//! [`JobmeshConfig::build_runtime`]. Projects `proj`, `proj1`, and `proj2`
//! each get namespace `ns`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use jobmesh_config::JobmeshConfig;
use jobmesh_config::JobmeshRuntime;
use jobmesh_core::BufferedLogWriter;
use jobmesh_core::FixedClock;
use jobmesh_core::JobName;
use jobmesh_core::Namespace;
use jobmesh_core::NamespaceName;
use jobmesh_core::OperationContext;
use jobmesh_core::Owner;
use jobmesh_core::Project;
use jobmesh_core::ProjectName;
use jobmesh_core::ScheduleBuilder;
use jobmesh_core::ScheduleDate;
use jobmesh_core::Spec;
use jobmesh_core::SpecBuilder;
use jobmesh_core::SpecUpstream;
use jobmesh_core::SpecUpstreamName;
use jobmesh_core::StringMap;
use jobmesh_core::Task;
use jobmesh_core::TaskName;
use jobmesh_core::Tenant;
use jobmesh_core::Version;
use jobmesh_core::WindowConfig;
use jobmesh_providers::PluginDescriptor;
use jobmesh_providers::PluginRegistry;
use system_tests::config::SystemTestConfig;
use tempfile::TempDir;
use time::macros::datetime;

/// Task served by the descriptor-only plugin.
pub const TASK: &str = "bq2bq";
/// Namespace seeded in every project.
pub const NAMESPACE: &str = "ns";

const DESCRIPTOR: &str = "name: bq2bq\nplugintype: task\ndependency: {}\n";
const PROJECTS: [&str; 3] = ["proj", "proj1", "proj2"];
const APP_KEY: &str = "Yjo4a0jn1NvYdq79SADC/KaVv9Wu0Ffc";

/// Persistent runtime plus its backing directory.
pub struct Harness {
    /// Wired runtime.
    pub runtime: JobmeshRuntime,
    /// Rendered configuration.
    pub config: JobmeshConfig,
    /// Collected service log lines.
    pub log: BufferedLogWriter,
    /// Database directory; removed on drop.
    dir: TempDir,
}

impl Harness {
    /// Builds a runtime with no peer registries.
    pub fn new() -> Self {
        Self::with_peers(&[])
    }

    /// Builds a runtime that consults the given peer hosts.
    pub fn with_peers(peer_hosts: &[&str]) -> Self {
        let settings = SystemTestConfig::load().expect("system test env");
        let dir = match &settings.run_root {
            Some(root) => {
                std::fs::create_dir_all(root).expect("create run root");
                tempfile::tempdir_in(root).expect("scenario dir")
            }
            None => tempfile::tempdir().expect("scenario dir"),
        };
        let journal = if settings.delete_journal { "delete" } else { "wal" };
        let mut toml = format!(
            "[store]\nbackend = \"sqlite\"\npath = \"{}\"\njournal_mode = \"{journal}\"\n\n\
             [resolver]\npeer_timeout_ms = {}\n\n[secrets]\napp_key = \"{APP_KEY}\"\n",
            dir.path().join("jobmesh.db").display(),
            settings.peer_timeout.as_millis(),
        );
        for (index, host) in peer_hosts.iter().enumerate() {
            write!(
                toml,
                "\n[[resource_managers]]\nname = \"peer-{index}\"\nhost = \"{host}\"\n"
            )
            .expect("render peer");
        }
        let config = JobmeshConfig::from_toml(&toml).expect("scenario config");
        let mut plugins = PluginRegistry::new();
        let descriptor = PluginDescriptor::from_yaml(DESCRIPTOR).expect("descriptor");
        plugins.register_descriptor(descriptor).expect("register");
        let runtime = config
            .build_runtime(Arc::new(FixedClock(datetime!(2026-02-01 00:00 UTC))), Arc::new(plugins))
            .expect("wire runtime");
        for project in PROJECTS {
            seed_tenant(&runtime, project);
        }
        Self {
            runtime,
            config,
            log: BufferedLogWriter::new(),
            dir,
        }
    }

    /// Rebuilds the runtime over the same database.
    pub fn reopen(self) -> Self {
        let Self {
            runtime,
            config,
            dir,
            ..
        } = self;
        drop(runtime);
        let mut plugins = PluginRegistry::new();
        let descriptor = PluginDescriptor::from_yaml(DESCRIPTOR).expect("descriptor");
        plugins.register_descriptor(descriptor).expect("register");
        let runtime = config
            .build_runtime(Arc::new(FixedClock(datetime!(2026-02-01 00:00 UTC))), Arc::new(plugins))
            .expect("rewire runtime");
        Self {
            runtime,
            config,
            log: BufferedLogWriter::new(),
            dir,
        }
    }
}

fn seed_tenant(runtime: &JobmeshRuntime, project: &str) {
    let name = ProjectName::new(project).expect("project name");
    let config = BTreeMap::from([
        ("STORAGE_PATH".to_string(), format!("gs://{project}-bucket")),
        ("SCHEDULER_HOST".to_string(), "http://scheduler.internal".to_string()),
    ]);
    let project = Project::new(name.clone(), config).expect("project");
    runtime.tenant_service.save_project(&project).expect("save project");
    let namespace_name = NamespaceName::new(NAMESPACE).expect("namespace");
    let namespace = Namespace::new(namespace_name, name, BTreeMap::new()).expect("namespace");
    runtime.tenant_service.save_namespace(&namespace).expect("save namespace");
}

/// Background context for scenario calls.
pub fn ctx() -> OperationContext {
    OperationContext::background()
}

/// Tenant `project/ns`.
pub fn tenant(project: &str) -> Tenant {
    Tenant::new(project, NAMESPACE).expect("tenant")
}

/// Job name.
pub fn name(value: &str) -> JobName {
    JobName::new(value).expect("job name")
}

/// Spec whose plugin-derived destination and sources come from task config.
pub fn spec(job: &str, destination: &str, sources: &[&str], upstream_names: &[&str]) -> Spec {
    let mut config = StringMap::new();
    config.insert("DESTINATION".to_string(), destination.to_string());
    if !sources.is_empty() {
        config.insert("SOURCES".to_string(), sources.join(","));
    }
    let schedule = ScheduleBuilder::new(ScheduleDate::new("2022-10-01").expect("start date"))
        .with_interval("0 2 * * *")
        .build()
        .expect("schedule");
    SpecBuilder::new(
        Version::new(1).expect("version"),
        name(job),
        Owner::new("data-eng").expect("owner"),
        schedule,
        WindowConfig::new("24h", "0", "d"),
        Task::new(TaskName::new(TASK).expect("task name"), config),
    )
    .with_upstream(SpecUpstream {
        upstream_names: upstream_names
            .iter()
            .map(|name| SpecUpstreamName::new(*name).expect("upstream"))
            .collect(),
        http_upstreams: Vec::new(),
    })
    .build()
    .expect("spec")
}
