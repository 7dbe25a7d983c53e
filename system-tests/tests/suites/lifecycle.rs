// system-tests/tests/suites/lifecycle.rs
// ============================================================================
// Module: Lifecycle Scenarios
// Description: Delete safety, partial batches, and restarts.
// Purpose: Verify reconciler outcomes persisted in SQLite.
// Dependencies: jobmesh-core, helpers
// ============================================================================

use jobmesh_core::ErrorKind;
use jobmesh_core::Spec;
use jobmesh_core::UpstreamState;
use jobmesh_core::UpstreamType;

use crate::helpers::harness::Harness;
use crate::helpers::harness::ctx;
use crate::helpers::harness::name;
use crate::helpers::harness::spec;
use crate::helpers::harness::tenant;

#[test]
fn delete_is_blocked_by_downstream() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;
    let proj = tenant("proj");
    service
        .add(
            &ctx(),
            &proj,
            vec![
                spec("job-a", "bigquery://proj.ds.a", &[], &[]),
                spec("job-b", "bigquery://proj.ds.b", &["bigquery://proj.ds.a"], &[]),
            ],
            &harness.log,
        )
        .expect("add jobs");

    let outcome = service.delete(&ctx(), &proj, &name("job-a"), false, false);

    let err = outcome.error.clone().expect("delete blocked");
    assert_eq!(err.kind, ErrorKind::FailedPrecondition);
    assert!(err.message.contains("proj/job-b"));
    assert!(err.message.contains("consider do force delete to proceed"));
    assert_eq!(outcome.affected_downstream.len(), 1);
    assert_eq!(outcome.affected_downstream[0].as_str(), "proj/job-b");
    assert!(service.get(&ctx(), &proj, &name("job-a")).is_ok());
}

#[test]
fn forced_delete_removes_job_and_reports_downstream() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;
    let proj = tenant("proj");
    service
        .add(
            &ctx(),
            &proj,
            vec![
                spec("job-a", "bigquery://proj.ds.a", &[], &[]),
                spec("job-b", "bigquery://proj.ds.b", &["bigquery://proj.ds.a"], &[]),
            ],
            &harness.log,
        )
        .expect("add jobs");

    let affected = service
        .delete(&ctx(), &proj, &name("job-a"), true, true)
        .into_result()
        .expect("forced delete");

    assert_eq!(affected.len(), 1);
    let missing = service.get(&ctx(), &proj, &name("job-a")).expect_err("job deleted");
    assert_eq!(missing.kind, ErrorKind::NotFound);
}

#[test]
fn forced_delete_leaves_consumer_links_unresolved_on_refresh() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;
    let proj = tenant("proj");
    service
        .add(
            &ctx(),
            &proj,
            vec![
                spec("job-a", "bigquery://proj.ds.a", &[], &[]),
                spec("job-b", "bigquery://proj.ds.b", &["bigquery://proj.ds.a"], &["job-a"]),
            ],
            &harness.log,
        )
        .expect("add jobs");
    let before = service.get_upstreams(&ctx(), &proj, &name("job-b")).expect("links");
    assert!(before.iter().all(|link| link.state == UpstreamState::Resolved));

    service
        .delete(&ctx(), &proj, &name("job-a"), false, true)
        .into_result()
        .expect("forced delete");
    let err = service.refresh(&ctx(), &proj, &harness.log).expect_err("dangling static name");

    assert!(err.contains(ErrorKind::NotFound));
    let links = service.get_upstreams(&ctx(), &proj, &name("job-b")).expect("links");
    let summary: Vec<(&str, UpstreamType, UpstreamState)> =
        links.iter().map(|link| (link.name.as_str(), link.upstream_type, link.state)).collect();
    assert_eq!(
        summary,
        vec![
            ("job-a", UpstreamType::Static, UpstreamState::Unresolved),
            ("", UpstreamType::Inferred, UpstreamState::Unresolved),
        ]
    );
    assert_eq!(links[1].resource.as_ref().map(|urn| urn.as_str()), Some("bigquery://proj.ds.a"));
}

#[test]
fn partial_batch_keeps_valid_jobs() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;
    let proj = tenant("proj");
    let mut raw = serde_json::to_value(spec("job-bad", "bigquery://proj.ds.bad", &[], &[]))
        .expect("encode spec");
    raw["owner"] = serde_json::Value::String(String::new());
    let invalid: Spec = serde_json::from_value(raw).expect("decode spec");

    let err = service
        .add(
            &ctx(),
            &proj,
            vec![invalid, spec("job-good", "bigquery://proj.ds.good", &[], &[])],
            &harness.log,
        )
        .expect_err("invalid spec reported");

    assert_eq!(err.len(), 1);
    assert!(err.to_string().contains("proj/job-bad"));
    let stored =
        harness.runtime.job_repository.get_all_by_tenant(&ctx(), &proj).expect("stored jobs");
    let names: Vec<&str> = stored.iter().map(|job| job.name().as_str()).collect();
    assert_eq!(names, vec!["job-good"]);
}

#[test]
fn jobs_and_links_survive_restart() {
    let harness = Harness::new();
    let proj = tenant("proj");
    harness
        .runtime
        .job_service
        .add(
            &ctx(),
            &proj,
            vec![
                spec("job-a", "bigquery://proj.ds.a", &[], &[]),
                spec("job-b", "bigquery://proj.ds.b", &["bigquery://proj.ds.a"], &[]),
            ],
            &harness.log,
        )
        .expect("add jobs");

    let harness = harness.reopen();
    let service = &harness.runtime.job_service;

    let job = service.get(&ctx(), &proj, &name("job-b")).expect("job after restart");
    assert_eq!(job.destination().map(|urn| urn.as_str()), Some("bigquery://proj.ds.b"));
    let upstreams = service.get_upstreams(&ctx(), &proj, &name("job-b")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].name, "job-a");
}
