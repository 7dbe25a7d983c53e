// jobmesh-providers/tests/plugin_registry_unit.rs
// ============================================================================
// Module: Plugin Registry Unit Tests
// Description: Registration, descriptor loading, and the config capability.
// Purpose: Validate plugin lookup and YAML descriptor handling.
// ============================================================================

//! ## Overview
//! Covers plugin registration rules, descriptor directory loading, and how
//! the config-driven dependency capability feeds the plugin service.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::fs;
use std::sync::Arc;

use jobmesh_core::DependencyMod;
use jobmesh_core::DependencyRequest;
use jobmesh_core::DestinationRequest;
use jobmesh_core::ErrorKind;
use jobmesh_core::OperationContext;
use jobmesh_core::Plugin;
use jobmesh_core::PluginRepository;
use jobmesh_core::PluginType;
use jobmesh_core::StringMap;
use jobmesh_providers::ConfigDependencyMod;
use jobmesh_providers::PluginDescriptor;
use jobmesh_providers::PluginRegistry;
use jobmesh_providers::RegistryError;
use jobmesh_providers::registry::DependencyDescriptor;
use jobmesh_providers::registry::MAX_DESCRIPTOR_BYTES;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Descriptor with a dependency capability.
const BQ2BQ_YAML: &str = r#"
name: bq2bq
description: BigQuery to BigQuery transformation
plugintype: task
pluginversion: "0.3.1"
image: example/bq2bq:0.3.1
entrypoint: /opt/bq2bq
dependency:
  destination_key: TABLE_ID
"#;

/// Hook descriptor without a dependency capability.
const NOTIFY_YAML: &str = r"
name: notify
plugintype: hook
";

/// Builds a string map from pairs.
fn map(pairs: &[(&str, &str)]) -> StringMap {
    pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

#[test]
fn descriptor_decodes_info_and_capability() {
    let descriptor = PluginDescriptor::from_yaml(BQ2BQ_YAML).unwrap();
    assert_eq!(descriptor.info.name, "bq2bq");
    assert_eq!(descriptor.info.plugin_type, PluginType::Task);
    assert_eq!(descriptor.info.plugin_version, "0.3.1");
    let dependency = descriptor.dependency.unwrap();
    assert_eq!(dependency.destination_key, "TABLE_ID");
    assert_eq!(dependency.sources_key, "SOURCES");

    let hook = PluginDescriptor::from_yaml(NOTIFY_YAML).unwrap();
    assert_eq!(hook.info.plugin_type, PluginType::Hook);
    assert!(hook.dependency.is_none());
}

#[test]
fn descriptor_requires_name() {
    assert!(matches!(
        PluginDescriptor::from_yaml("name: ''\n"),
        Err(RegistryError::Invalid(_))
    ));
    assert!(matches!(
        PluginDescriptor::from_yaml("description: x\n"),
        Err(RegistryError::Parse(_))
    ));
}

#[test]
fn oversized_descriptor_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.yaml");
    let padding = "#".repeat(usize::try_from(MAX_DESCRIPTOR_BYTES).unwrap() + 1);
    fs::write(&path, format!("name: big\n{padding}\n")).unwrap();
    assert!(matches!(PluginDescriptor::from_file(&path), Err(RegistryError::Io(_))));
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn load_dir_registers_yaml_files_only() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bq2bq.yaml"), BQ2BQ_YAML).unwrap();
    fs::write(dir.path().join("notify.yml"), NOTIFY_YAML).unwrap();
    fs::write(dir.path().join("README.md"), "ignored").unwrap();

    let registry = PluginRegistry::from_dir(dir.path()).unwrap();
    assert_eq!(registry.names(), vec!["bq2bq", "notify"]);

    let bq2bq = registry.get_by_name("bq2bq").unwrap();
    assert!(bq2bq.info.is_some());
    assert!(bq2bq.dependency_mod.is_some());
    assert!(registry.get_by_name("notify").unwrap().dependency_mod.is_none());
}

#[test]
fn duplicate_descriptor_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.yaml"), NOTIFY_YAML).unwrap();
    fs::write(dir.path().join("b.yaml"), NOTIFY_YAML).unwrap();
    let err = PluginRegistry::from_dir(dir.path()).unwrap_err();
    assert_eq!(err, RegistryError::Invalid("plugin notify already registered".to_string()));
}

#[test]
fn missing_plugin_is_not_found() {
    let err = PluginRegistry::new().get_by_name("ghost").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, "plugin ghost not found");
}

#[test]
fn register_checks_name_agreement() {
    let mut registry = PluginRegistry::new();
    registry.register("bare", Plugin::default()).unwrap();
    assert!(registry.register(" ", Plugin::default()).is_err());

    let descriptor = PluginDescriptor::from_yaml(NOTIFY_YAML).unwrap();
    let err = registry.register("other", descriptor.into_plugin()).unwrap_err();
    assert_eq!(err, RegistryError::Invalid("plugin other carries info for notify".to_string()));
}

#[test]
fn attach_dependency_mod_upgrades_plugin() {
    let mut registry = PluginRegistry::new();
    registry.register_descriptor(PluginDescriptor::from_yaml(NOTIFY_YAML).unwrap()).unwrap();
    registry.attach_dependency_mod("notify", Arc::new(ConfigDependencyMod::default())).unwrap();
    assert!(registry.get_by_name("notify").unwrap().dependency_mod.is_some());
    let orphan = Arc::new(ConfigDependencyMod::default());
    assert!(registry.attach_dependency_mod("ghost", orphan).is_err());
}

// ============================================================================
// SECTION: Config Capability
// ============================================================================

#[test]
fn config_capability_reads_destination_and_sources() {
    let capability = ConfigDependencyMod::new(DependencyDescriptor {
        destination_key: "TABLE_ID".to_string(),
        sources_key: "INPUTS".to_string(),
    });
    let ctx = OperationContext::background();
    let config = map(&[
        ("TABLE_ID", " bigquery://p:d.t "),
        ("INPUTS", "bigquery://p:d.a, ,bigquery://p:d.b"),
    ]);

    let destination = capability
        .generate_destination(&ctx, &DestinationRequest {
            config: config.clone(),
            assets: StringMap::new(),
        })
        .unwrap();
    assert_eq!(destination, "bigquery://p:d.t");

    let sources = capability
        .generate_dependencies(&ctx, &DependencyRequest {
            config,
            assets: StringMap::new(),
            dry_run: true,
        })
        .unwrap();
    assert_eq!(sources, vec!["bigquery://p:d.a".to_string(), "bigquery://p:d.b".to_string()]);
}

#[test]
fn config_capability_falls_back_to_assets() {
    let capability = ConfigDependencyMod::default();
    let sources = capability
        .generate_dependencies(&OperationContext::background(), &DependencyRequest {
            config: map(&[("SOURCES", "")]),
            assets: map(&[("SOURCES", "gcs://bucket/a")]),
            dry_run: false,
        })
        .unwrap();
    assert_eq!(sources, vec!["gcs://bucket/a".to_string()]);

    let destination = capability
        .generate_destination(&OperationContext::background(), &DestinationRequest {
            config: StringMap::new(),
            assets: StringMap::new(),
        })
        .unwrap();
    assert!(destination.is_empty());
}
