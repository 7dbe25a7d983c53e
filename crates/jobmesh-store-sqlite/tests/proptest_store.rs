//! `SQLite` store property-based tests.
//!
//! ## Purpose
//! A job assembled through the spec builders must read back from the store
//! exactly as it was written, whatever mix of optional fields it carries.
//!
//! ## What is covered
//! - Scalar columns, JSON columns, and string-array columns round-trip.
//! - Updates replace every column of a live row.
//!
//! ## What is intentionally out of scope
//! - Upstream edges (covered by the unit tests).
// jobmesh-store-sqlite/tests/proptest_store.rs
// ============================================================================
// Module: SQLite Store Property-Based Tests
// Description: Builder to store to read-back equality for jobs.
// Purpose: Catch fields dropped or reshaped by the column layout.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use jobmesh_core::Alert;
use jobmesh_core::EventType;
use jobmesh_core::Hook;
use jobmesh_core::HttpUpstream;
use jobmesh_core::Job;
use jobmesh_core::JobName;
use jobmesh_core::JobRepository;
use jobmesh_core::Metadata;
use jobmesh_core::OperationContext;
use jobmesh_core::Owner;
use jobmesh_core::ResourceConfig;
use jobmesh_core::ResourceMetadata;
use jobmesh_core::ResourceUrn;
use jobmesh_core::Retry;
use jobmesh_core::ScheduleBuilder;
use jobmesh_core::ScheduleDate;
use jobmesh_core::SpecBuilder;
use jobmesh_core::SpecUpstream;
use jobmesh_core::SpecUpstreamName;
use jobmesh_core::StringMap;
use jobmesh_core::Task;
use jobmesh_core::TaskName;
use jobmesh_core::Tenant;
use jobmesh_core::Version;
use jobmesh_core::WindowConfig;
use jobmesh_store_sqlite::SqliteJobStore;
use jobmesh_store_sqlite::SqliteStoreConfig;
use proptest::prelude::*;
use tempfile::TempDir;

/// Optional spec parts drawn per case.
#[derive(Debug, Clone)]
struct Parts {
    /// Free-form description.
    description: String,
    /// Labels.
    labels: StringMap,
    /// Optional schedule end date.
    end_date: Option<String>,
    /// Optional retry policy.
    retry: Option<Retry>,
    /// Depends-on-past flag.
    depends_on_past: bool,
    /// Catch-up flag.
    catch_up: bool,
    /// Task config.
    task_config: StringMap,
    /// Hook names.
    hooks: Vec<String>,
    /// Channels of a single failure alert; empty means no alert.
    alert_channels: Vec<String>,
    /// Declared static upstreams.
    upstream_names: Vec<String>,
    /// Name of an optional HTTP sensor.
    http_upstream: Option<String>,
    /// Assets.
    assets: StringMap,
    /// Requested CPU; present means metadata is set.
    cpu: Option<String>,
    /// Destination URN.
    destination: Option<String>,
    /// Source URNs.
    sources: Vec<String>,
}

fn string_map() -> impl Strategy<Value = StringMap> {
    prop::collection::btree_map("[a-z_]{1,8}", "[a-zA-Z0-9 ./:-]{1,16}", 0..4)
}

fn parts() -> impl Strategy<Value = Parts> {
    (
        (
            "[a-zA-Z0-9 ,.]{0,40}",
            string_map(),
            prop::option::of(prop::sample::select(vec!["2023-01-01", "2030-12-31"])),
            prop::option::of((0u32..5, 0i64..600_000_000_000, any::<bool>())),
            any::<bool>(),
            any::<bool>(),
            string_map(),
        ),
        (
            prop::collection::vec("[a-z]{1,8}", 0..3),
            prop::collection::vec("[a-z#-]{1,12}", 0..3),
            prop::collection::vec("([a-z0-9]{1,6}/)?job-[a-z]{1,6}", 0..4),
            prop::option::of("[a-z]{1,10}"),
            string_map(),
            prop::option::of("[0-9]{1,3}m"),
            prop::option::of("bq://[a-z]{1,6}\\.[a-z]{1,6}"),
            prop::collection::vec("bq://[a-z]{1,6}\\.[a-z]{1,6}", 0..4),
        ),
    )
        .prop_map(
            |(
                (description, labels, end_date, retry, depends_on_past, catch_up, task_config),
                (
                    hooks,
                    alert_channels,
                    upstream_names,
                    http_upstream,
                    assets,
                    cpu,
                    destination,
                    sources,
                ),
            )| Parts {
                description,
                labels,
                end_date: end_date.map(str::to_string),
                retry: retry.map(|(count, delay_ns, exponential_backoff)| Retry {
                    count,
                    delay_ns,
                    exponential_backoff,
                }),
                depends_on_past,
                catch_up,
                task_config,
                hooks,
                alert_channels,
                upstream_names,
                http_upstream,
                assets,
                cpu,
                destination,
                sources,
            },
        )
}

fn build_job(name: &str, parts: Parts) -> Job {
    let mut schedule = ScheduleBuilder::new(ScheduleDate::new("2022-10-01").unwrap())
        .with_interval("0 2 * * *")
        .with_depends_on_past(parts.depends_on_past)
        .with_catch_up(parts.catch_up);
    if let Some(end_date) = parts.end_date {
        schedule = schedule.with_end_date(ScheduleDate::new(end_date).unwrap());
    }
    if let Some(retry) = parts.retry {
        schedule = schedule.with_retry(retry);
    }
    let hooks = parts.hooks.into_iter().map(|hook| Hook::new(hook, StringMap::new()).unwrap());
    let alerts = if parts.alert_channels.is_empty() {
        Vec::new()
    } else {
        vec![Alert::new(EventType::Failure, parts.alert_channels, StringMap::new())]
    };
    let upstream = SpecUpstream {
        upstream_names: parts
            .upstream_names
            .iter()
            .map(|declared| SpecUpstreamName::new(declared.as_str()).unwrap())
            .collect(),
        http_upstreams: parts
            .http_upstream
            .into_iter()
            .map(|sensor| HttpUpstream {
                name: sensor.clone(),
                url: format!("https://{sensor}.internal/ready"),
                headers: StringMap::new(),
                params: StringMap::new(),
            })
            .collect(),
    };
    let mut spec = SpecBuilder::new(
        Version::new(1).unwrap(),
        JobName::new(name).unwrap(),
        Owner::new("data-eng").unwrap(),
        schedule.build().unwrap(),
        WindowConfig::new("24h", "0", "d"),
        Task::new(TaskName::new("bq2bq").unwrap(), parts.task_config),
    )
    .with_description(parts.description)
    .with_labels(parts.labels)
    .with_hooks(hooks.collect())
    .with_alerts(alerts)
    .with_upstream(upstream)
    .with_assets(parts.assets);
    if let Some(cpu) = parts.cpu {
        spec = spec.with_metadata(Metadata {
            resource: Some(ResourceMetadata {
                request: Some(ResourceConfig {
                    cpu,
                    memory: "128Mi".to_string(),
                }),
                limit: None,
            }),
            scheduler: StringMap::new(),
        });
    }
    Job::new(
        Tenant::new("proj", "ns").unwrap(),
        spec.build().unwrap(),
        parts.destination.map(|urn| ResourceUrn::new(urn).unwrap()),
        parts.sources.into_iter().map(|urn| ResourceUrn::new(urn).unwrap()).collect(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn stored_job_reads_back_unchanged(parts in parts()) {
        let dir = TempDir::new().unwrap();
        let store = SqliteJobStore::new(SqliteStoreConfig::for_path(dir.path().join("jobs.db")))
            .unwrap();
        let ctx = OperationContext::background();
        let job = build_job("job-a", parts);
        let outcome = store.add(&ctx, vec![job.clone()]).unwrap();
        prop_assert_eq!(outcome.accepted.len(), 1);
        let stored = store.get_by_job_name(&ctx, job.project_name(), job.name()).unwrap();
        prop_assert_eq!(stored, job);
    }

    #[test]
    fn update_replaces_every_column(first in parts(), second in parts()) {
        let dir = TempDir::new().unwrap();
        let store = SqliteJobStore::new(SqliteStoreConfig::for_path(dir.path().join("jobs.db")))
            .unwrap();
        let ctx = OperationContext::background();
        store.add(&ctx, vec![build_job("job-a", first)]).unwrap();
        let replacement = build_job("job-a", second);
        store.update(&ctx, vec![replacement.clone()]).unwrap();
        let listed = store.get_all_by_tenant(&ctx, replacement.tenant()).unwrap();
        prop_assert_eq!(listed, vec![replacement]);
    }
}
