// jobmesh-providers/src/http.rs
// ============================================================================
// Module: HTTP Resource Manager
// Description: Peer registry client over the job lookup HTTP API.
// Purpose: Resolve upstreams unknown locally against a peer registry.
// Dependencies: jobmesh-core, reqwest, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! [`HttpResourceManager`] issues bounded `GET {host}/api/v1beta1/jobs`
//! requests. Static links filter by `job_name` and `project_name`; inferred
//! links filter by `resource_destination`. Configured headers are sent with
//! every request, redirects are not followed, and response bodies are capped.
//! Each returned job becomes a resolved external upstream tagged with the
//! peer host.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use jobmesh_core::DomainError;
use jobmesh_core::JobName;
use jobmesh_core::OperationContext;
use jobmesh_core::ResourceManager;
use jobmesh_core::ResourceUrn;
use jobmesh_core::Tenant;
use jobmesh_core::Upstream;
use jobmesh_core::UpstreamType;
use jobmesh_core::core::errors::ENTITY_RESOURCE_MANAGER;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Peer job lookup endpoint path.
pub const JOBS_API_PATH: &str = "/api/v1beta1/jobs";
/// Query parameter for the producer job name.
const QUERY_JOB_NAME: &str = "job_name";
/// Query parameter for the producer project.
const QUERY_PROJECT_NAME: &str = "project_name";
/// Query parameter for the producer destination.
const QUERY_RESOURCE_DESTINATION: &str = "resource_destination";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for one peer registry.
///
/// # Invariants
/// - `host` is a non-empty absolute `http`/`https` URL.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - `timeout_ms` applies to the full request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpResourceManagerConfig {
    /// Peer name used in logs and errors.
    pub name: String,
    /// Peer base URL.
    pub host: String,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpResourceManagerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            headers: BTreeMap::new(),
            timeout_ms: 5_000,
            max_response_bytes: 4 * 1024 * 1024,
            user_agent: "jobmesh/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Peer client errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpResourceManagerError {
    /// Configuration was rejected.
    #[error("invalid resource manager config: {0}")]
    Config(String),
    /// The request could not be sent or read.
    #[error("request to {peer} failed: {message}")]
    Request {
        /// Peer name.
        peer: String,
        /// Failure detail.
        message: String,
    },
    /// The peer answered with a non-200 status.
    #[error("unexpected response status from {peer}: {status}")]
    Status {
        /// Peer name.
        peer: String,
        /// HTTP status code.
        status: u16,
    },
    /// The response body could not be decoded.
    #[error("unable to decode response from {peer}: {message}")]
    Decode {
        /// Peer name.
        peer: String,
        /// Failure detail.
        message: String,
    },
}

impl From<HttpResourceManagerError> for DomainError {
    fn from(error: HttpResourceManagerError) -> Self {
        match error {
            HttpResourceManagerError::Config(_) => {
                Self::invalid_argument(ENTITY_RESOURCE_MANAGER, error.to_string())
            }
            _ => Self::internal(ENTITY_RESOURCE_MANAGER, error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Lookup response envelope.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobSpecificationsResponse {
    /// Matching jobs.
    #[serde(default)]
    job_specification_responses: Vec<JobSpecificationResponse>,
}

/// One matching job with its tenant.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobSpecificationResponse {
    /// Producer project.
    #[serde(default)]
    project_name: String,
    /// Producer namespace.
    #[serde(default)]
    namespace_name: String,
    /// Producer job; other spec fields are ignored.
    #[serde(default)]
    job: Option<PeerJob>,
}

/// Subset of the peer job spec used for links.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerJob {
    /// Job name.
    #[serde(default)]
    name: String,
    /// Task name.
    #[serde(default)]
    task_name: String,
    /// Destination URN.
    #[serde(default)]
    destination: String,
}

// ============================================================================
// SECTION: Resource Manager
// ============================================================================

/// Peer registry client.
///
/// # Invariants
/// - Redirects are not followed.
/// - Responses exceeding configured limits fail.
#[derive(Debug)]
pub struct HttpResourceManager {
    /// Peer configuration.
    config: HttpResourceManagerConfig,
    /// Parsed lookup endpoint.
    endpoint: Url,
    /// Prepared request headers.
    headers: HeaderMap,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl HttpResourceManager {
    /// Creates a peer client after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpResourceManagerError::Config`] for an empty or malformed
    /// host, invalid headers, or when the HTTP client cannot be built.
    pub fn new(config: HttpResourceManagerConfig) -> Result<Self, HttpResourceManagerError> {
        let endpoint = endpoint_url(&config.host)?;
        let headers = header_map(&config.headers)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|_| HttpResourceManagerError::Config("http client build failed".to_string()))?;
        Ok(Self {
            config,
            endpoint,
            headers,
            client,
        })
    }

    /// Returns the peer configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpResourceManagerConfig {
        &self.config
    }

    /// Builds the lookup URL for one unresolved link.
    #[must_use]
    pub fn lookup_url(&self, unresolved: &Upstream) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            match unresolved.upstream_type {
                UpstreamType::Inferred => {
                    if let Some(resource) = &unresolved.resource {
                        query.append_pair(QUERY_RESOURCE_DESTINATION, resource.as_str());
                    }
                }
                _ => {
                    if !unresolved.name.is_empty() {
                        query.append_pair(QUERY_JOB_NAME, &unresolved.name);
                    }
                    if let Some(project) = &unresolved.project_name {
                        query.append_pair(QUERY_PROJECT_NAME, project.as_str());
                    }
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    /// Sends the lookup request and decodes the envelope.
    fn fetch(
        &self,
        ctx: &OperationContext,
        unresolved: &Upstream,
    ) -> Result<JobSpecificationsResponse, HttpResourceManagerError> {
        let url = self.lookup_url(unresolved);
        let mut request = self.client.get(url.clone()).headers(self.headers.clone());
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining.min(Duration::from_millis(self.config.timeout_ms)));
        }
        debug!(peer = %self.config.name, url = %url, "peer lookup request");
        let mut response = request.send().map_err(|err| self.request_error(&err.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(HttpResourceManagerError::Status {
                peer: self.config.name.clone(),
                status,
            });
        }
        let body = self.read_response_limited(&mut response)?;
        serde_json::from_slice(&body).map_err(|err| HttpResourceManagerError::Decode {
            peer: self.config.name.clone(),
            message: err.to_string(),
        })
    }

    /// Reads a response body while enforcing the size limit.
    fn read_response_limited(
        &self,
        response: &mut Response,
    ) -> Result<Vec<u8>, HttpResourceManagerError> {
        let max_bytes = self.config.max_response_bytes;
        let expected_len = response.content_length();
        let max_bytes_u64 = u64::try_from(max_bytes)
            .map_err(|_| self.request_error("response size limit exceeds u64"))?;
        if let Some(expected) = expected_len
            && expected > max_bytes_u64
        {
            return Err(self.request_error("http response exceeds size limit"));
        }
        let mut buf = Vec::new();
        let mut handle = response.take(max_bytes_u64.saturating_add(1));
        handle.read_to_end(&mut buf).map_err(|_| self.request_error("failed to read response"))?;
        if buf.len() > max_bytes {
            return Err(self.request_error("http response exceeds size limit"));
        }
        if let Some(expected) = expected_len {
            let expected = usize::try_from(expected)
                .map_err(|_| self.request_error("invalid response length"))?;
            if buf.len() < expected {
                return Err(self.request_error("http response truncated"));
            }
        }
        Ok(buf)
    }

    /// Builds a request error for this peer.
    fn request_error(&self, message: &str) -> HttpResourceManagerError {
        HttpResourceManagerError::Request {
            peer: self.config.name.clone(),
            message: message.to_string(),
        }
    }

    /// Converts one response entry into a resolved external link.
    fn to_upstream(
        &self,
        entry: JobSpecificationResponse,
        upstream_type: UpstreamType,
    ) -> Option<Upstream> {
        let job = entry.job?;
        let tenant = Tenant::new(&entry.project_name, &entry.namespace_name).ok()?;
        let name = JobName::new(job.name).ok()?;
        let resource = if job.destination.trim().is_empty() {
            None
        } else {
            ResourceUrn::new(job.destination).ok()
        };
        Some(Upstream::resolved(
            &name,
            self.config.host.clone(),
            resource,
            &tenant,
            upstream_type,
            job.task_name,
            true,
        ))
    }
}

impl ResourceManager for HttpResourceManager {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn host(&self) -> &str {
        &self.config.host
    }

    fn fetch_upstreams(
        &self,
        ctx: &OperationContext,
        unresolved: &Upstream,
    ) -> Result<Vec<Upstream>, DomainError> {
        ctx.check()?;
        let response = self.fetch(ctx, unresolved)?;
        let total = response.job_specification_responses.len();
        let upstreams: Vec<Upstream> = response
            .job_specification_responses
            .into_iter()
            .filter_map(|entry| self.to_upstream(entry, unresolved.upstream_type))
            .collect();
        if upstreams.len() < total {
            warn!(
                peer = %self.config.name,
                dropped = total - upstreams.len(),
                "peer returned jobs without identity"
            );
        }
        Ok(upstreams)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses the peer host into the lookup endpoint.
fn endpoint_url(host: &str) -> Result<Url, HttpResourceManagerError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(HttpResourceManagerError::Config("host is empty".to_string()));
    }
    let base = Url::parse(host)
        .map_err(|err| HttpResourceManagerError::Config(format!("invalid host {host}: {err}")))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(HttpResourceManagerError::Config(format!("unsupported scheme in host {host}")));
    }
    if base.cannot_be_a_base() || base.host_str().is_none() {
        return Err(HttpResourceManagerError::Config(format!("invalid host {host}")));
    }
    if !base.username().is_empty() || base.password().is_some() {
        return Err(HttpResourceManagerError::Config("host must not embed credentials".to_string()));
    }
    let joined = format!("{}{JOBS_API_PATH}", base.as_str().trim_end_matches('/'));
    Url::parse(&joined)
        .map_err(|err| HttpResourceManagerError::Config(format!("invalid host {host}: {err}")))
}

/// Converts configured headers into a header map.
fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, HttpResourceManagerError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| HttpResourceManagerError::Config(format!("invalid header name {key}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| {
                HttpResourceManagerError::Config(format!("invalid header value for {key}"))
            })?;
        map.insert(name, value);
    }
    Ok(map)
}
