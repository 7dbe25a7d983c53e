// jobmesh-extension/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Fake release client, fake runner, and manager builders.
// Purpose: Drive the extension manager without network or processes.
// Dependencies: jobmesh-core, jobmesh-extension
// ============================================================================

//! ## Overview
//! A scripted [`FakeClient`] serves releases by API path and records asset
//! downloads; [`FakeRunner`] records invocations and returns a fixed code.

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
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use jobmesh_core::FixedClock;
use jobmesh_core::OperationContext;
use jobmesh_extension::ExtensionError;
use jobmesh_extension::ExtensionManager;
use jobmesh_extension::ExtensionManagerConfig;
use jobmesh_extension::GithubParser;
use jobmesh_extension::MemoryFs;
use jobmesh_extension::ProviderRegistry;
use jobmesh_extension::ReleaseClient;
use jobmesh_extension::RepositoryRelease;
use jobmesh_extension::runner::CommandRunner;
use time::macros::datetime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// API base used by the test parser.
pub const API: &str = "https://api.test";
/// Extension root used by manager tests.
pub const ROOT: &str = "/home/user/.jobmesh/extensions";

/// Returns the repo API path of `owner/repo`.
pub fn repo_api(owner: &str, repo: &str) -> String {
    format!("{API}/repos/{owner}/{repo}")
}

/// Builds a release of `owner/repo` at `tag`.
pub fn release(owner: &str, repo: &str, tag: &str) -> RepositoryRelease {
    let base = repo_api(owner, repo);
    RepositoryRelease {
        tag_name: tag.to_string(),
        current_api_path: format!("{base}/releases/tags/{tag}"),
        upgrade_api_path: format!("{base}/releases/latest"),
        assets: Vec::new(),
    }
}

// ============================================================================
// SECTION: Fake Client
// ============================================================================

/// Release client answering from a table keyed by API path.
#[derive(Default)]
pub struct FakeClient {
    /// Releases by API path.
    releases: Mutex<BTreeMap<String, RepositoryRelease>>,
    /// Asset API paths downloaded so far.
    downloads: Mutex<Vec<String>>,
}

impl FakeClient {
    /// Serves `release` for its tag path, and for the latest path when
    /// `latest` is set.
    pub fn publish(&self, release: RepositoryRelease, latest: bool) {
        let mut releases = self.releases.lock().unwrap();
        if latest {
            releases.insert(release.upgrade_api_path.clone(), release.clone());
        }
        releases.insert(release.current_api_path.clone(), release);
    }

    /// Returns the asset API paths downloaded so far.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl ReleaseClient for FakeClient {
    fn download_release(
        &self,
        ctx: &OperationContext,
        api_path: &str,
    ) -> Result<RepositoryRelease, ExtensionError> {
        ctx.check().map_err(|err| ExtensionError::Client(err.message))?;
        self.releases
            .lock()
            .unwrap()
            .get(api_path)
            .cloned()
            .ok_or_else(|| {
                ExtensionError::Client(format!("unexpected response status from {api_path}: 404"))
            })
    }

    fn download_asset(
        &self,
        ctx: &OperationContext,
        api_path: &str,
    ) -> Result<Vec<u8>, ExtensionError> {
        let release = self.download_release(ctx, api_path)?;
        self.downloads.lock().unwrap().push(api_path.to_string());
        Ok(format!("binary {}", release.tag_name).into_bytes())
    }
}

// ============================================================================
// SECTION: Fake Runner
// ============================================================================

/// Runner recording invocations.
pub struct FakeRunner {
    /// Exit code returned by every run.
    code: i32,
    /// Recorded `(program, args)` pairs.
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeRunner {
    /// Creates a runner returning `code`.
    pub fn new(code: i32) -> Self {
        Self {
            code,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded invocations.
    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &Path, args: &[String]) -> io::Result<i32> {
        self.calls.lock().unwrap().push((program.to_path_buf(), args.to_vec()));
        Ok(self.code)
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Manager wired to in-memory fakes.
pub struct Harness {
    /// Manager under test.
    pub manager: ExtensionManager,
    /// Backing filesystem.
    pub fs: Arc<MemoryFs>,
    /// Scripted release client.
    pub client: Arc<FakeClient>,
    /// Recording runner.
    pub runner: Arc<FakeRunner>,
}

/// Builds a harness with `reserved` commands and a runner exiting `code`.
pub fn harness_with(reserved: &[&str], code: i32) -> Harness {
    let fs = Arc::new(MemoryFs::new());
    let client = Arc::new(FakeClient::default());
    let runner = Arc::new(FakeRunner::new(code));
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(GithubParser::new(API)), client.clone());
    let manager = ExtensionManager::new(
        ExtensionManagerConfig {
            root: PathBuf::from(ROOT),
            reserved_commands: reserved.iter().map(|name| (*name).to_string()).collect(),
        },
        fs.clone(),
        providers,
        runner.clone(),
        Arc::new(FixedClock(datetime!(2026-01-02 03:04:05 UTC))),
    )
    .unwrap();
    Harness {
        manager,
        fs,
        client,
        runner,
    }
}

/// Builds a harness reserving `job` and `extension`.
pub fn harness() -> Harness {
    harness_with(&["job", "extension"], 0)
}
