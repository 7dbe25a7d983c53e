// system-tests/tests/suites/resolution.rs
// ============================================================================
// Module: Resolution Scenarios
// Description: Upstream resolution across namespaces, projects, and peers.
// Purpose: Verify persisted links after add and refresh.
// Dependencies: jobmesh-core, helpers
// ============================================================================

use jobmesh_core::UpstreamState;
use jobmesh_core::UpstreamType;

use crate::helpers::harness::Harness;
use crate::helpers::harness::ctx;
use crate::helpers::harness::name;
use crate::helpers::harness::spec;
use crate::helpers::harness::tenant;
use crate::helpers::peer::FakePeer;
use crate::helpers::peer::PeerJob;
use crate::helpers::peer::free_addr;

#[test]
fn inferred_upstream_resolves_within_project() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;
    let proj1 = tenant("proj1");

    service
        .add(&ctx(), &proj1, vec![spec("job-b", "bigquery://proj1.ds.b", &[], &[])], &harness.log)
        .expect("add producer");
    service
        .add(
            &ctx(),
            &proj1,
            vec![spec("job-a", "bigquery://proj1.ds.a", &["bigquery://proj1.ds.b"], &[])],
            &harness.log,
        )
        .expect("add consumer");

    let upstreams = service.get_upstreams(&ctx(), &proj1, &name("job-a")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    let link = &upstreams[0];
    assert_eq!(link.name, "job-b");
    assert_eq!(link.resource.as_ref().map(|urn| urn.as_str()), Some("bigquery://proj1.ds.b"));
    assert_eq!(link.project_name.as_ref().map(|project| project.as_str()), Some("proj1"));
    assert_eq!(link.upstream_type, UpstreamType::Inferred);
    assert_eq!(link.state, UpstreamState::Resolved);
    assert_eq!(link.host, "");
    assert!(!link.external);

    let downstream =
        service.get_downstream(&ctx(), &proj1, &name("job-b"), true).expect("downstream");
    assert_eq!(downstream.len(), 1);
    assert_eq!(downstream[0].name.as_str(), "job-a");
}

#[test]
fn static_upstream_resolves_across_projects() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;

    service
        .add(
            &ctx(),
            &tenant("proj2"),
            vec![spec("job-x", "bigquery://proj2.ds.x", &[], &[])],
            &harness.log,
        )
        .expect("add producer");
    service
        .add(
            &ctx(),
            &tenant("proj1"),
            vec![spec("job-y", "bigquery://proj1.ds.y", &[], &["proj2/job-x"])],
            &harness.log,
        )
        .expect("add consumer");

    let upstreams =
        service.get_upstreams(&ctx(), &tenant("proj1"), &name("job-y")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    let link = &upstreams[0];
    assert_eq!(link.name, "job-x");
    assert_eq!(link.project_name.as_ref().map(|project| project.as_str()), Some("proj2"));
    assert_eq!(link.upstream_type, UpstreamType::Static);
    assert!(link.is_resolved());
    assert!(!link.external);
}

#[test]
fn unknown_static_upstream_is_reported_and_kept() {
    let harness = Harness::new();
    let service = &harness.runtime.job_service;

    let err = service
        .add(
            &ctx(),
            &tenant("proj1"),
            vec![spec("job-y", "bigquery://proj1.ds.y", &[], &["proj2/job-missing"])],
            &harness.log,
        )
        .expect_err("unknown upstream");

    assert_eq!(err.len(), 1);
    assert!(err.to_string().contains("proj2/job-missing unknown upstream"));
    let upstreams =
        service.get_upstreams(&ctx(), &tenant("proj1"), &name("job-y")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].state, UpstreamState::Unresolved);
}

#[test]
fn static_upstream_resolves_through_peer() {
    let peer = FakePeer::start(vec![PeerJob::new("proj2", "ns", "job-x", "bigquery://proj2.ds.x")]);
    let harness = Harness::with_peers(&[peer.host()]);
    let service = &harness.runtime.job_service;

    service
        .add(
            &ctx(),
            &tenant("proj1"),
            vec![spec("job-y", "bigquery://proj1.ds.y", &[], &["proj2/job-x"])],
            &harness.log,
        )
        .expect("add with external upstream");

    let upstreams =
        service.get_upstreams(&ctx(), &tenant("proj1"), &name("job-y")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    let link = &upstreams[0];
    assert_eq!(link.name, "job-x");
    assert_eq!(link.host, peer.host());
    assert_eq!(link.project_name.as_ref().map(|project| project.as_str()), Some("proj2"));
    assert_eq!(link.upstream_type, UpstreamType::Static);
    assert_eq!(link.state, UpstreamState::Resolved);
    assert!(link.external);
    let requests = peer.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("job_name=job-x"));
    assert!(requests[0].contains("project_name=proj2"));
}

#[test]
fn inferred_upstream_resolves_through_peer() {
    let peer = FakePeer::start(vec![PeerJob::new(
        "ext-proj",
        "ext-ns",
        "ext-job",
        "bigquery://ext.ds.events",
    )]);
    let harness = Harness::with_peers(&[peer.host()]);
    let service = &harness.runtime.job_service;

    service
        .add(
            &ctx(),
            &tenant("proj1"),
            vec![spec("job-c", "bigquery://proj1.ds.c", &["bigquery://ext.ds.events"], &[])],
            &harness.log,
        )
        .expect("add with external upstream");

    let upstreams =
        service.get_upstreams(&ctx(), &tenant("proj1"), &name("job-c")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    let link = &upstreams[0];
    assert_eq!(link.name, "ext-job");
    assert_eq!(link.namespace_name.as_str(), "ext-ns");
    assert_eq!(link.upstream_type, UpstreamType::Inferred);
    assert!(link.external);
    assert!(peer.requests().iter().any(|url| url.contains("resource_destination=")));
}

#[test]
fn refresh_resolves_after_peer_recovers() {
    let addr = free_addr();
    let host = format!("http://{addr}");
    let harness = Harness::with_peers(&[&host]);
    let service = &harness.runtime.job_service;
    let proj1 = tenant("proj1");
    let job = spec("job-d", "bigquery://proj1.ds.d", &[], &["proj2/job-late"]);

    let err =
        service.add(&ctx(), &proj1, vec![job.clone()], &harness.log).expect_err("peer offline");
    assert!(err.to_string().contains("proj2/job-late unknown upstream"));
    let upstreams = service.get_upstreams(&ctx(), &proj1, &name("job-d")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].state, UpstreamState::Unresolved);

    let late = PeerJob::new("proj2", "ns", "job-late", "bigquery://proj2.ds.late");
    let peer = FakePeer::start_on(addr, vec![late]);
    service.refresh(&ctx(), &proj1, &harness.log).expect("refresh");

    let upstreams = service.get_upstreams(&ctx(), &proj1, &name("job-d")).expect("upstreams");
    assert_eq!(upstreams.len(), 1);
    assert_eq!(upstreams[0].name, "job-late");
    assert_eq!(upstreams[0].host, peer.host());
    assert!(upstreams[0].external);
    assert!(upstreams[0].is_resolved());
    let stored = service.get(&ctx(), &proj1, &name("job-d")).expect("stored job");
    assert_eq!(stored.spec(), &job);
}
