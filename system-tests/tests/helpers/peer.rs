// system-tests/tests/helpers/peer.rs
// ============================================================================
// Module: Fake Peer Registry
// Description: HTTP peer answering job lookups with a fixed catalogue.
// Purpose: Exercise external resolution over real sockets.
// Dependencies: tiny_http, serde_json
// ============================================================================

//! ## Overview
//! A [`FakePeer`] serves `GET /api/v1beta1/jobs` from an in-memory list of
//! producer jobs, matching `job_name`/`project_name` and
//! `resource_destination` query parameters. It keeps serving until stopped
//! or dropped.

use std::net::SocketAddr;
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// Producer job published by a fake peer.
#[derive(Debug, Clone)]
pub struct PeerJob {
    /// Producer project.
    pub project: String,
    /// Producer namespace.
    pub namespace: String,
    /// Producer job name.
    pub name: String,
    /// Producer task name.
    pub task: String,
    /// Produced resource.
    pub destination: String,
}

impl PeerJob {
    pub fn new(project: &str, namespace: &str, name: &str, destination: &str) -> Self {
        Self {
            project: project.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            task: "bq2bq".to_string(),
            destination: destination.to_string(),
        }
    }
}

/// Reserves a loopback address nobody is listening on.
pub fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    listener.local_addr().expect("probe address")
}

/// Running fake peer registry.
pub struct FakePeer {
    /// Bound server.
    server: Arc<Server>,
    /// Serving thread.
    handle: Option<JoinHandle<()>>,
    /// Request URLs received so far.
    requests: Arc<Mutex<Vec<String>>>,
    /// Base URL of the peer.
    host: String,
}

impl FakePeer {
    /// Starts a peer on an ephemeral port.
    pub fn start(jobs: Vec<PeerJob>) -> Self {
        Self::start_on("127.0.0.1:0".parse().expect("loopback address"), jobs)
    }

    /// Starts a peer on a fixed address.
    pub fn start_on(addr: SocketAddr, jobs: Vec<PeerJob>) -> Self {
        let server = Arc::new(Server::http(addr).expect("start fake peer"));
        let bound = server.server_addr().to_ip().expect("peer ip address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let url = request.url().to_string();
                    requests.lock().expect("requests lock").push(url.clone());
                    let (status, body) = answer(&url, &jobs);
                    let content_type =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .expect("header");
                    let response = Response::from_string(body)
                        .with_status_code(status)
                        .with_header(content_type);
                    let _ = request.respond(response);
                }
            })
        };
        Self {
            server,
            handle: Some(handle),
            requests,
            host: format!("http://{bound}"),
        }
    }

    /// Returns the base URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the request URLs received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Stops serving and joins the worker.
    pub fn stop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FakePeer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds the lookup answer for one request URL.
fn answer(url: &str, jobs: &[PeerJob]) -> (u16, String) {
    let Some(query) = url.strip_prefix("/api/v1beta1/jobs") else {
        return (404, "{}".to_string());
    };
    let params: Vec<(String, String)> = query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), decode(value)))
        .collect();
    let param = |key: &str| {
        params.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    };
    let matches: Vec<serde_json::Value> = jobs
        .iter()
        .filter(|job| {
            param("resource_destination").is_none_or(|urn| urn == job.destination)
                && param("job_name").is_none_or(|name| name == job.name)
                && param("project_name").is_none_or(|project| project == job.project)
        })
        .filter(|_| !params.is_empty())
        .map(|job| {
            serde_json::json!({
                "projectName": job.project,
                "namespaceName": job.namespace,
                "job": {
                    "name": job.name,
                    "taskName": job.task,
                    "destination": job.destination,
                }
            })
        })
        .collect();
    (200, serde_json::json!({ "jobSpecificationResponses": matches }).to_string())
}

/// Decodes the percent escapes produced by form encoding.
fn decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while let Some(byte) = bytes.get(index) {
        match byte {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = value
                    .get(index + 1..index + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(decoded) = hex {
                    out.push(decoded);
                    index += 2;
                } else {
                    out.push(b'%');
                }
            }
            other => out.push(*other),
        }
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
