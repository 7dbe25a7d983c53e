// jobmesh-providers/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared fake peer server and link builders.
// Purpose: Keep provider tests short and deterministic.
// Dependencies: jobmesh-core, tiny_http
// ============================================================================

//! ## Overview
//! Fake peer registries built on `tiny_http` that answer a fixed number of
//! requests and report what they received.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::thread;
use std::thread::JoinHandle;

use jobmesh_core::JobName;
use jobmesh_core::ProjectName;
use jobmesh_core::ResourceUrn;
use jobmesh_core::Upstream;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Fake Peer
// ============================================================================

/// Request observed by the fake peer.
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    /// Request path and query.
    pub url: String,
    /// Request headers, lowercased names.
    pub headers: BTreeMap<String, String>,
}

/// Starts a peer answering one request with `status` and `body`.
pub fn spawn_peer(status: u16, body: &str) -> (String, JoinHandle<CapturedRequest>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let body = body.to_string();
    let handle = thread::spawn(move || {
        let mut captured = CapturedRequest::default();
        if let Ok(request) = server.recv() {
            captured.url = request.url().to_string();
            for header in request.headers() {
                captured.headers.insert(
                    header.field.as_str().as_str().to_ascii_lowercase(),
                    header.value.as_str().to_string(),
                );
            }
            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let response =
                Response::from_string(body).with_status_code(status).with_header(content_type);
            let _ = request.respond(response);
        }
        captured
    });
    (format!("http://{addr}"), handle)
}

// ============================================================================
// SECTION: Links
// ============================================================================

/// Unresolved static link to `project/name`.
pub fn static_link(project: &str, name: &str) -> Upstream {
    Upstream::unresolved_static(JobName::new(name).unwrap(), ProjectName::new(project).unwrap())
}

/// Unresolved inferred link on `urn`.
pub fn inferred_link(urn: &str) -> Upstream {
    Upstream::unresolved_inferred(ResourceUrn::new(urn).unwrap())
}

/// Lookup response with one job.
pub fn single_job_body(
    project: &str,
    namespace: &str,
    name: &str,
    task: &str,
    destination: &str,
) -> String {
    serde_json::json!({
        "jobSpecificationResponses": [
            {
                "projectName": project,
                "namespaceName": namespace,
                "job": {
                    "version": 1,
                    "name": name,
                    "taskName": task,
                    "destination": destination,
                    "owner": "data-eng"
                }
            }
        ]
    })
    .to_string()
}
