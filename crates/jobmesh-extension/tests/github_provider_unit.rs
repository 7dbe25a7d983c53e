// jobmesh-extension/tests/github_provider_unit.rs
// ============================================================================
// Module: GitHub Provider Unit Tests
// Description: Remote path parsing and the releases client.
// Purpose: Validate path rules and release/asset downloads over HTTP.
// ============================================================================

//! ## Overview
//! Parser cases run in memory; client cases run against a `tiny_http` server
//! standing in for the releases API.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use jobmesh_core::OperationContext;
use jobmesh_extension::ExtensionError;
use jobmesh_extension::GithubClient;
use jobmesh_extension::GithubClientConfig;
use jobmesh_extension::GithubParser;
use jobmesh_extension::ProviderRegistry;
use jobmesh_extension::ReleaseClient;
use jobmesh_extension::RemotePathParser;
use jobmesh_extension::provider::current_dist;
use jobmesh_extension::provider::dist_for;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Fake API
// ============================================================================

type Routes = BTreeMap<String, (u16, Vec<u8>)>;

/// Serves `count` requests from the routes built for the server base URL;
/// returns the base and the requested paths.
fn serve(count: usize, build: impl FnOnce(&str) -> Routes) -> (String, JoinHandle<Vec<String>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr().to_ip().unwrap());
    let routes = build(&base);
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0 .. count {
            let Ok(request) = server.recv() else { break };
            let path = request.url().to_string();
            let (status, body) = routes.get(&path).cloned().unwrap_or((404, b"{}".to_vec()));
            seen.push(path);
            let _ = request.respond(Response::from_data(body).with_status_code(status));
        }
        seen
    });
    (base, handle)
}

fn release_body(base: &str, tag: &str, asset: &str) -> Vec<u8> {
    serde_json::json!({
        "tag_name": tag,
        "assets": [
            {
                "name": "checksums.txt",
                "browser_download_url": format!("{base}/download/checksums")
            },
            { "name": asset, "browser_download_url": format!("{base}/download/{tag}") }
        ]
    })
    .to_string()
    .into_bytes()
}

fn client() -> GithubClient {
    GithubClient::new(GithubClientConfig {
        timeout_ms: 2_000,
        ..GithubClientConfig::default()
    })
    .unwrap()
}

// ============================================================================
// SECTION: Parser
// ============================================================================

#[test]
fn parses_pinned_remote_path() {
    let parser = GithubParser::new("https://api.test/");
    let metadata = parser.parse("github.com/acme/jobmesh-extension-lint@v1.2.0").unwrap();

    assert_eq!(metadata.provider_name, "github");
    assert_eq!(metadata.owner_name, "acme");
    assert_eq!(metadata.project_name, "jobmesh-extension-lint");
    assert_eq!(metadata.command_name, "lint");
    assert_eq!(metadata.tag_name, "v1.2.0");
    assert_eq!(metadata.local_dir_path, PathBuf::from("github.com/acme/jobmesh-extension-lint"));
    assert_eq!(
        metadata.current_api_path,
        "https://api.test/repos/acme/jobmesh-extension-lint/releases/tags/v1.2.0"
    );
    assert_eq!(
        metadata.upgrade_api_path,
        "https://api.test/repos/acme/jobmesh-extension-lint/releases/latest"
    );
    assert_eq!(metadata.download_api_path(), metadata.current_api_path);
}

#[test]
fn parses_latest_remote_path_with_scheme() {
    let metadata = GithubParser::default().parse("https://github.com/acme/formatter").unwrap();

    assert_eq!(metadata.command_name, "formatter");
    assert!(metadata.tag_name.is_empty());
    assert!(metadata.current_api_path.is_empty());
    assert_eq!(
        metadata.download_api_path(),
        "https://api.github.com/repos/acme/formatter/releases/latest"
    );
}

#[test]
fn rejects_malformed_remote_paths() {
    let parser = GithubParser::default();

    assert_eq!(parser.parse("").unwrap_err(), ExtensionError::EmptyRemotePath);
    assert!(matches!(
        parser.parse("gitlab.com/acme/tool"),
        Err(ExtensionError::UnrecognizedRemotePath(_))
    ));
    for path in [
        "github.com/acme",
        "github.com/acme/tool/extra",
        "github.com/acme/tool@",
        "github.com//tool",
        "github.com/acme/jobmesh-extension-",
    ] {
        assert!(
            matches!(parser.parse(path), Err(ExtensionError::InvalidRemotePath { .. })),
            "expected invalid path for {path}"
        );
    }
}

#[test]
fn registry_skips_unrecognizing_parsers() {
    struct Never;
    impl RemotePathParser for Never {
        fn provider(&self) -> &str {
            "never"
        }
        fn parse(
            &self,
            remote_path: &str,
        ) -> Result<jobmesh_extension::RemoteMetadata, ExtensionError> {
            Err(ExtensionError::UnrecognizedRemotePath(remote_path.to_string()))
        }
    }

    let github = Arc::new(client());
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(Never), github.clone());
    registry.register(Arc::new(GithubParser::default()), github);

    assert_eq!(registry.parse("github.com/acme/tool").unwrap().provider_name, "github");
    assert!(matches!(
        registry.parse("example.com/x"),
        Err(ExtensionError::UnrecognizedRemotePath(_))
    ));
    assert_eq!(registry.providers(), vec!["never", "github"]);
    let err = registry.client("gitlab").err().unwrap();
    assert_eq!(err.to_string(), "client for provider [gitlab] is not registered");
}

#[test]
fn dist_names_follow_release_convention() {
    assert_eq!(dist_for("linux", "x86_64"), "linux-amd64");
    assert_eq!(dist_for("macos", "aarch64"), "darwin-arm64");
    assert_eq!(dist_for("windows", "x86"), "windows-386");
    assert_eq!(dist_for("freebsd", "riscv64"), "freebsd-riscv64");
}

// ============================================================================
// SECTION: Client
// ============================================================================

#[test]
fn download_release_derives_api_paths() {
    let (base, handle) = serve(1, |base| {
        let mut routes = Routes::new();
        routes.insert(
            "/repos/acme/tool/releases/latest".to_string(),
            (200, release_body(base, "v2.0.0", "tool-linux-amd64")),
        );
        routes
    });
    let api_path = format!("{base}/repos/acme/tool/releases/latest");

    let release = client().download_release(&OperationContext::background(), &api_path).unwrap();

    assert_eq!(release.tag_name, "v2.0.0");
    assert_eq!(release.current_api_path, format!("{base}/repos/acme/tool/releases/tags/v2.0.0"));
    assert_eq!(release.upgrade_api_path, api_path);
    assert_eq!(release.assets.len(), 2);
    assert_eq!(handle.join().unwrap(), vec!["/repos/acme/tool/releases/latest".to_string()]);
}

#[test]
fn download_asset_picks_current_platform() {
    let asset_name = format!("tool-{}", current_dist());
    let (base, handle) = serve(2, |base| {
        let mut routes = Routes::new();
        routes.insert(
            "/repos/acme/tool/releases/tags/v1.0.0".to_string(),
            (200, release_body(base, "v1.0.0", &asset_name)),
        );
        routes.insert("/download/v1.0.0".to_string(), (200, b"\x7fELF binary".to_vec()));
        routes
    });

    let bytes = client()
        .download_asset(
            &OperationContext::background(),
            &format!("{base}/repos/acme/tool/releases/tags/v1.0.0"),
        )
        .unwrap();

    assert_eq!(bytes, b"\x7fELF binary");
    assert_eq!(handle.join().unwrap()[1], "/download/v1.0.0");
}

#[test]
fn download_asset_requires_platform_asset() {
    let (base, handle) = serve(1, |base| {
        let mut routes = Routes::new();
        routes.insert(
            "/repos/acme/tool/releases/latest".to_string(),
            (200, release_body(base, "v1.0.0", "tool-plan9-mips")),
        );
        routes
    });

    let err = client()
        .download_asset(
            &OperationContext::background(),
            &format!("{base}/repos/acme/tool/releases/latest"),
        )
        .unwrap_err();

    assert_eq!(err, ExtensionError::Client(format!("asset for [{}] is not found", current_dist())));
    handle.join().unwrap();
}

#[test]
fn non_success_status_is_a_client_error() {
    let (base, handle) = serve(1, |_| Routes::new());

    let err = client()
        .download_release(
            &OperationContext::background(),
            &format!("{base}/repos/acme/tool/releases/tags/v9"),
        )
        .unwrap_err();

    assert!(matches!(err, ExtensionError::Client(ref message) if message.ends_with(": 404")));
    handle.join().unwrap();
}

#[test]
fn oversized_release_is_rejected() {
    let (base, handle) = serve(1, |base| {
        let mut routes = Routes::new();
        routes.insert(
            "/repos/acme/tool/releases/latest".to_string(),
            (200, release_body(base, "v1.0.0", "tool")),
        );
        routes
    });
    let small = GithubClient::new(GithubClientConfig {
        max_release_bytes: 16,
        ..GithubClientConfig::default()
    })
    .unwrap();

    let err = small
        .download_release(
            &OperationContext::background(),
            &format!("{base}/repos/acme/tool/releases/latest"),
        )
        .unwrap_err();

    assert_eq!(err, ExtensionError::Client("http response exceeds size limit".to_string()));
    handle.join().unwrap();
}

#[test]
fn empty_api_path_and_cancelled_context_fail_before_sending() {
    let ctx = OperationContext::background();
    assert!(matches!(
        client().download_release(&ctx, ""),
        Err(ExtensionError::Client(ref m)) if m == "api path is empty"
    ));

    ctx.cancel();
    let err = client()
        .download_release(&ctx, "http://127.0.0.1:9/repos/a/b/releases/latest")
        .unwrap_err();
    assert_eq!(err, ExtensionError::Client("context canceled".to_string()));
}
