// jobmesh-core/src/runtime/plugin_service.rs
// ============================================================================
// Module: Jobmesh Plugin Service
// Description: Destination and source derivation through task plugins.
// Purpose: Compile task config and assets, then call the plugin capability.
// Dependencies: crate::core, crate::interfaces, serde_json, time, tracing
// ============================================================================

//! ## Overview
//! Task config is compiled against project config (flattened under the
//! `GLOBAL__` prefix and nested under `proj`) and secrets (nested under
//! `secret`). Assets additionally see `DSTART`, `DEND`, `EXECUTION_TIME`, and
//! `JOB_DESTINATION`. The destination is computed before assets compile; a
//! destination failure leaves `JOB_DESTINATION` empty and compilation
//! proceeds.
//!
//! A plugin without the dependency capability yields
//! [`PluginServiceError::UpstreamModMissing`], which callers match on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use tracing::warn;

use crate::core::DomainError;
use crate::core::OperationContext;
use crate::core::ResourceUrn;
use crate::core::Spec;
use crate::core::Task;
use crate::core::TenantDetails;
use crate::core::errors::ENTITY_PLUGIN;
use crate::core::errors::ENTITY_WINDOW;
use crate::interfaces::Clock;
use crate::interfaces::DependencyMod;
use crate::interfaces::DependencyRequest;
use crate::interfaces::DestinationRequest;
use crate::interfaces::PluginInfo;
use crate::interfaces::PluginRepository;
use crate::interfaces::PluginServiceError;
use crate::interfaces::TemplateCompiler;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix for project config keys in the template context.
pub const PROJECT_CONFIG_PREFIX: &str = "GLOBAL__";
/// Context key for the nested project config map.
pub const PROJECT_CONTEXT_KEY: &str = "proj";
/// Context key for the nested secret map.
pub const SECRET_CONTEXT_KEY: &str = "secret";
/// Asset context key for the window start.
pub const DSTART_KEY: &str = "DSTART";
/// Asset context key for the window end.
pub const DEND_KEY: &str = "DEND";
/// Asset context key for the evaluation time.
pub const EXECUTION_TIME_KEY: &str = "EXECUTION_TIME";
/// Asset context key for the computed destination.
pub const JOB_DESTINATION_KEY: &str = "JOB_DESTINATION";

// ============================================================================
// SECTION: Service
// ============================================================================

/// Plugin-backed destination and source derivation.
#[derive(Clone)]
pub struct PluginService {
    /// Plugin lookup.
    plugins: Arc<dyn PluginRepository>,
    /// Template compiler for config and assets.
    compiler: Arc<dyn TemplateCompiler>,
    /// Clock used for window boundaries.
    clock: Arc<dyn Clock>,
}

impl PluginService {
    /// Creates a plugin service.
    #[must_use]
    pub fn new(
        plugins: Arc<dyn PluginRepository>,
        compiler: Arc<dyn TemplateCompiler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            plugins,
            compiler,
            clock,
        }
    }

    /// Returns the descriptive metadata of a task plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginServiceError::NotFound`] for unknown tasks and
    /// [`PluginServiceError::YamlModMissing`] when the plugin ships no info.
    pub fn info(&self, task_name: &str) -> Result<PluginInfo, PluginServiceError> {
        let plugin = self
            .plugins
            .get_by_name(task_name)
            .map_err(|_| PluginServiceError::NotFound(task_name.to_string()))?;
        plugin.info.ok_or_else(|| PluginServiceError::YamlModMissing(task_name.to_string()))
    }

    /// Computes the destination of a task.
    ///
    /// Returns `None` when the plugin reports an empty destination.
    ///
    /// # Errors
    ///
    /// Returns [`PluginServiceError::UpstreamModMissing`] when the plugin
    /// lacks the capability, or a domain error when compilation or the plugin
    /// call fails.
    pub fn generate_destination(
        &self,
        ctx: &OperationContext,
        details: &TenantDetails,
        task: &Task,
    ) -> Result<Option<ResourceUrn>, PluginServiceError> {
        ctx.check()?;
        let dependency_mod = self.dependency_mod(task.name.as_str())?;
        let context = config_context(details);
        self.destination_with(ctx, dependency_mod.as_ref(), task, &context)
    }

    /// Computes the sources of a spec.
    ///
    /// # Errors
    ///
    /// Returns [`PluginServiceError::UpstreamModMissing`] when the plugin
    /// lacks the capability, or a domain error when the window, compilation,
    /// or the plugin call fails.
    pub fn generate_upstreams(
        &self,
        ctx: &OperationContext,
        details: &TenantDetails,
        spec: &Spec,
        dry_run: bool,
    ) -> Result<Vec<ResourceUrn>, PluginServiceError> {
        ctx.check()?;
        let task = spec.task();
        let dependency_mod = self.dependency_mod(task.name.as_str())?;
        let now = self.clock.now();
        let config_context = config_context(details);

        let derived = self.destination_with(ctx, dependency_mod.as_ref(), task, &config_context);
        let destination = match derived {
            Ok(destination) => {
                destination.map(|urn| urn.as_str().to_string()).unwrap_or_default()
            }
            Err(err) => {
                warn!(
                    job = %spec.name(),
                    error = %err,
                    "destination unavailable for asset compilation"
                );
                String::new()
            }
        };
        let asset_context = asset_context(config_context.clone(), spec, now, destination)?;
        let config = self.compiler.compile(&task.config, &config_context)?;
        let assets = self.compiler.compile(spec.assets(), &asset_context)?;

        ctx.check()?;
        let request = DependencyRequest {
            config,
            assets,
            dry_run,
        };
        let dependencies = dependency_mod.generate_dependencies(ctx, &request).map_err(|err| {
            DomainError::internal(ENTITY_PLUGIN, format!("failed to generate dependencies: {err}"))
        })?;
        debug!(job = %spec.name(), sources = dependencies.len(), "generated sources");
        let mut sources = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            sources.push(ResourceUrn::new(dependency)?);
        }
        Ok(sources)
    }

    /// Looks up the dependency capability of a plugin.
    fn dependency_mod(
        &self,
        task_name: &str,
    ) -> Result<Arc<dyn DependencyMod>, PluginServiceError> {
        let plugin = self
            .plugins
            .get_by_name(task_name)
            .map_err(|_| PluginServiceError::NotFound(task_name.to_string()))?;
        plugin
            .dependency_mod
            .ok_or_else(|| PluginServiceError::UpstreamModMissing(task_name.to_string()))
    }

    /// Compiles task config and calls the destination capability.
    fn destination_with(
        &self,
        ctx: &OperationContext,
        dependency_mod: &dyn DependencyMod,
        task: &Task,
        context: &Value,
    ) -> Result<Option<ResourceUrn>, PluginServiceError> {
        let config = self.compiler.compile(&task.config, context)?;
        ctx.check()?;
        let request = DestinationRequest {
            config,
            assets: Default::default(),
        };
        let destination = dependency_mod.generate_destination(ctx, &request).map_err(|err| {
            DomainError::internal(ENTITY_PLUGIN, format!("failed to generate destination: {err}"))
        })?;
        if destination.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(ResourceUrn::new(destination)?))
    }
}

// ============================================================================
// SECTION: Contexts
// ============================================================================

/// Builds the config compilation context.
fn config_context(details: &TenantDetails) -> Value {
    let mut root = Map::new();
    let mut project = Map::new();
    for (key, value) in details.merged_config() {
        root.insert(format!("{PROJECT_CONFIG_PREFIX}{key}"), Value::String(value.clone()));
        project.insert(key, Value::String(value));
    }
    let secrets: Map<String, Value> =
        details.secrets_map().into_iter().map(|(key, value)| (key, Value::String(value))).collect();
    root.insert(PROJECT_CONTEXT_KEY.to_string(), Value::Object(project));
    root.insert(SECRET_CONTEXT_KEY.to_string(), Value::Object(secrets));
    Value::Object(root)
}

/// Extends the config context with window and destination variables.
fn asset_context(
    mut context: Value,
    spec: &Spec,
    now: OffsetDateTime,
    destination: String,
) -> Result<Value, DomainError> {
    let window = spec.window().for_version(spec.version().get())?;
    let (start, end) = window.bounds(now)?;
    let format = |instant: OffsetDateTime| {
        instant
            .format(&Rfc3339)
            .map_err(|err| {
                DomainError::internal(ENTITY_WINDOW, format!("failed to format time: {err}"))
            })
    };
    if let Value::Object(map) = &mut context {
        map.insert(DSTART_KEY.to_string(), Value::String(format(start)?));
        map.insert(DEND_KEY.to_string(), Value::String(format(end)?));
        map.insert(EXECUTION_TIME_KEY.to_string(), Value::String(format(now)?));
        map.insert(JOB_DESTINATION_KEY.to_string(), Value::String(destination));
    }
    Ok(context)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test assertions use unwrap/expect for clarity."
    )]

    use time::macros::datetime;

    use super::*;
    use crate::core::StringMap;
    use crate::interfaces::FixedClock;
    use crate::runtime::SimpleTemplateCompiler;
    use crate::runtime::testing;

    fn service() -> PluginService {
        PluginService::new(
            Arc::new(testing::FakePlugins::new()),
            Arc::new(SimpleTemplateCompiler::new()),
            Arc::new(FixedClock(datetime!(2022-10-10 02:00 UTC))),
        )
    }

    fn config(pairs: &[(&str, &str)]) -> StringMap {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn info_reports_missing_yaml() {
        let service = service();
        assert_eq!(service.info(testing::ECHO_TASK).unwrap().image, "example/echo:latest");
        assert!(matches!(
            service.info(testing::BARE_TASK),
            Err(PluginServiceError::YamlModMissing(_))
        ));
        assert!(matches!(service.info("ghost"), Err(PluginServiceError::NotFound(_))));
    }

    #[test]
    fn destination_compiles_project_config() {
        let spec = testing::spec_with(
            "job-a",
            testing::ECHO_TASK,
            config(&[("DESTINATION", "bq://p.{{ .GLOBAL__DATASET }}.a")]),
            &[],
        );
        let urn = service()
            .generate_destination(
                &OperationContext::background(),
                &testing::tenant_details(),
                spec.task(),
            )
            .unwrap();
        assert_eq!(urn.unwrap().as_str(), "bq://p.ds.a");
    }

    #[test]
    fn missing_capability_is_a_sentinel() {
        let spec = testing::spec_with("job-a", testing::BARE_TASK, StringMap::new(), &[]);
        let err = service()
            .generate_destination(
                &OperationContext::background(),
                &testing::tenant_details(),
                spec.task(),
            )
            .unwrap_err();
        assert!(matches!(err, PluginServiceError::UpstreamModMissing(_)));
    }

    #[test]
    fn assets_see_window_and_destination() {
        let spec = crate::core::SpecBuilder::from_spec(testing::spec_with(
            "job-a",
            testing::ECHO_TASK,
            config(&[("DESTINATION", "bq://p.ds.a")]),
            &[],
        ))
        .with_assets(config(&[("SOURCES", "bq://{{ .DSTART | Date }},{{ .JOB_DESTINATION }}_raw")]))
        .build()
        .unwrap();
        let sources = service()
            .generate_upstreams(
                &OperationContext::background(),
                &testing::tenant_details(),
                &spec,
                true,
            )
            .unwrap();
        let sources: Vec<&str> = sources.iter().map(ResourceUrn::as_str).collect();
        assert_eq!(sources, vec!["bq://2022-10-09", "bq://p.ds.a_raw"]);
    }

    #[test]
    fn plugin_failure_surfaces() {
        let spec = testing::spec_with("job-a", testing::ECHO_TASK, config(&[("FAIL", "yes")]), &[]);
        let err = service()
            .generate_upstreams(
                &OperationContext::background(),
                &testing::tenant_details(),
                &spec,
                true,
            )
            .unwrap_err();
        let err = DomainError::from(err);
        assert!(err.message.contains("failed to generate dependencies"));
    }
}
