// jobmesh-extension/src/provider/github.rs
// ============================================================================
// Module: GitHub Extension Provider
// Description: GitHub remote path parser and releases API client.
// Purpose: Install extensions published as GitHub release assets.
// Dependencies: reqwest, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Remote paths look like `github.com/<owner>/<repo>[@<tag>]`, optionally
//! prefixed with `https://`. The command name is the repository name without
//! the `jobmesh-extension-` prefix. Releases are read from the releases API
//! and the asset whose name ends with the current `<os>-<arch>` is
//! downloaded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use jobmesh_core::OperationContext;
use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::Response;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use serde::Deserialize;
use tracing::debug;

use crate::error::ExtensionError;
use crate::model::RemoteMetadata;
use crate::model::RepositoryAsset;
use crate::model::RepositoryRelease;
use crate::provider::ReleaseClient;
use crate::provider::RemotePathParser;
use crate::provider::current_dist;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Provider name.
pub const GITHUB_PROVIDER: &str = "github";
/// Host segment of GitHub remote paths.
const GITHUB_HOST: &str = "github.com";
/// Public GitHub API base URL.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
/// Repository prefix stripped to obtain the command name.
pub const EXTENSION_REPO_PREFIX: &str = "jobmesh-extension-";

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Parser for GitHub remote paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubParser {
    /// API base used to build release API paths.
    api_base: String,
}

impl Default for GithubParser {
    fn default() -> Self {
        Self::new(DEFAULT_GITHUB_API)
    }
}

impl GithubParser {
    /// Creates a parser building API paths under `api_base`.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

impl RemotePathParser for GithubParser {
    fn provider(&self) -> &str {
        GITHUB_PROVIDER
    }

    fn parse(&self, remote_path: &str) -> Result<RemoteMetadata, ExtensionError> {
        let trimmed = remote_path.trim();
        if trimmed.is_empty() {
            return Err(ExtensionError::EmptyRemotePath);
        }
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let Some(rest) =
            without_scheme.strip_prefix(GITHUB_HOST).and_then(|rest| rest.strip_prefix('/'))
        else {
            return Err(ExtensionError::UnrecognizedRemotePath(remote_path.to_string()));
        };
        let invalid = |message: &str| ExtensionError::InvalidRemotePath {
            path: remote_path.to_string(),
            message: message.to_string(),
        };

        let (repository, tag_name) = match rest.split_once('@') {
            Some((repository, tag)) if tag.trim().is_empty() => {
                return Err(invalid(&format!("empty tag after {repository}")));
            }
            Some((repository, tag)) => (repository, tag.trim()),
            None => (rest, ""),
        };
        let segments: Vec<&str> = repository.trim_end_matches('/').split('/').collect();
        let [owner_name, project_name] = segments.as_slice() else {
            return Err(invalid("expected github.com/<owner>/<repo>"));
        };
        if owner_name.is_empty() || project_name.is_empty() {
            return Err(invalid("owner and repo must be non-empty"));
        }
        let command_name = project_name.strip_prefix(EXTENSION_REPO_PREFIX).unwrap_or(project_name);
        if command_name.is_empty() {
            return Err(invalid("repo name has no command after the extension prefix"));
        }

        let repo_api = format!("{}/repos/{owner_name}/{project_name}", self.api_base);
        let current_api_path = if tag_name.is_empty() {
            String::new()
        } else {
            format!("{repo_api}/releases/tags/{tag_name}")
        };
        Ok(RemoteMetadata {
            provider_name: GITHUB_PROVIDER.to_string(),
            owner_name: (*owner_name).to_string(),
            project_name: (*project_name).to_string(),
            command_name: command_name.to_string(),
            local_dir_path: PathBuf::from(GITHUB_HOST).join(owner_name).join(project_name),
            tag_name: tag_name.to_string(),
            current_api_path,
            upgrade_api_path: format!("{repo_api}/releases/latest"),
        })
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Configuration of the GitHub releases client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GithubClientConfig {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum release description size, in bytes.
    pub max_release_bytes: usize,
    /// Maximum asset size, in bytes.
    pub max_asset_bytes: usize,
    /// User agent string; GitHub rejects requests without one.
    pub user_agent: String,
    /// Optional API token.
    pub token: Option<String>,
}

impl Default for GithubClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_release_bytes: 1024 * 1024,
            max_asset_bytes: 256 * 1024 * 1024,
            user_agent: "jobmesh-extension/0.1".to_string(),
            token: None,
        }
    }
}

/// Release description returned by the releases API.
#[derive(Debug, Deserialize)]
struct GithubRelease {
    /// Release tag.
    tag_name: String,
    /// Release assets.
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

/// Asset entry of a release.
#[derive(Debug, Deserialize)]
struct GithubAsset {
    /// Asset file name.
    name: String,
    /// Public download URL.
    browser_download_url: String,
}

/// GitHub releases API client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    /// Client configuration.
    config: GithubClientConfig,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl GithubClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Config`] when the HTTP client cannot be
    /// built.
    pub fn new(config: GithubClientConfig) -> Result<Self, ExtensionError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(5))
            .build()
            .map_err(|_| ExtensionError::Config("http client build failed".to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Sends a GET and checks the status.
    fn get(
        &self,
        ctx: &OperationContext,
        url: &str,
        accept: &str,
    ) -> Result<Response, ExtensionError> {
        ctx.check().map_err(|err| ExtensionError::Client(err.message))?;
        if url.trim().is_empty() {
            return Err(ExtensionError::Client("api path is empty".to_string()));
        }
        let mut request: RequestBuilder = self.client.get(url).header(ACCEPT, accept);
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining.min(Duration::from_millis(self.config.timeout_ms)));
        }
        debug!(url, "github request");
        let response = request
            .send()
            .map_err(|err| ExtensionError::Client(format!("request to {url} failed: {err}")))?;
        if !response.status().is_success() {
            return Err(ExtensionError::Client(format!(
                "unexpected response status from {url}: {}",
                response.status().as_u16()
            )));
        }
        Ok(response)
    }
}

impl ReleaseClient for GithubClient {
    fn download_release(
        &self,
        ctx: &OperationContext,
        api_path: &str,
    ) -> Result<RepositoryRelease, ExtensionError> {
        let mut response = self.get(ctx, api_path, "application/vnd.github+json")?;
        let body = read_response_limited(&mut response, self.config.max_release_bytes)?;
        let release: GithubRelease = serde_json::from_slice(&body)
            .map_err(|err| {
                ExtensionError::Client(format!("unable to decode release from {api_path}: {err}"))
            })?;
        let repo_api = api_path
            .find("/releases")
            .and_then(|index| api_path.get(..index))
            .unwrap_or(api_path);
        Ok(RepositoryRelease {
            current_api_path: format!("{repo_api}/releases/tags/{}", release.tag_name),
            upgrade_api_path: format!("{repo_api}/releases/latest"),
            tag_name: release.tag_name,
            assets: release
                .assets
                .into_iter()
                .map(|asset| RepositoryAsset {
                    name: asset.name,
                    url: asset.browser_download_url,
                })
                .collect(),
        })
    }

    fn download_asset(
        &self,
        ctx: &OperationContext,
        api_path: &str,
    ) -> Result<Vec<u8>, ExtensionError> {
        let release = self.download_release(ctx, api_path)?;
        let dist = current_dist();
        let asset = release
            .assets
            .iter()
            .find(|asset| asset.name.ends_with(&dist))
            .ok_or_else(|| ExtensionError::Client(format!("asset for [{dist}] is not found")))?;
        let mut response = self.get(ctx, &asset.url, "application/octet-stream")?;
        read_response_limited(&mut response, self.config.max_asset_bytes)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a response body while enforcing a size limit.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, ExtensionError> {
    let max_bytes_u64 = u64::try_from(max_bytes).map_err(|_| {
        ExtensionError::Client("response size limit exceeds u64".to_string())
    })?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(ExtensionError::Client("http response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|_| ExtensionError::Client("failed to read response".to_string()))?;
    if buf.len() > max_bytes {
        return Err(ExtensionError::Client("http response exceeds size limit".to_string()));
    }
    Ok(buf)
}
