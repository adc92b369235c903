//! Integration tests for the prerender pipeline.
//!
//! These tests exercise setup, validation, output mapping, and server
//! supervision without requiring Chrome or node on the host: the serve
//! command is overridden with plain unix utilities where a process is
//! needed at all.

mod common;

use std::path::Path;
use std::time::Duration;

use spa_prerender::prelude::*;
use spa_prerender::{route_output_path, StaticServer};

/// Test configuration validation end to end through the builder.
#[test]
fn test_config_validation() {
    common::init_logging();

    // No routes should fail.
    let result = PrerenderConfigBuilder::new().build();
    assert!(result.is_err());

    // Routes must be absolute paths.
    let result = PrerenderConfigBuilder::new().routes(["about"]).build();
    assert!(result.is_err());

    // Output directory must not alias the serve directory.
    let result = PrerenderConfigBuilder::new()
        .routes(["/"])
        .serve_dir("build")
        .out_dir("build")
        .build();
    assert!(result.is_err());

    // Valid config should succeed.
    let result = PrerenderConfigBuilder::new()
        .routes(["/", "/about"])
        .navigation_timeout(Duration::from_secs(5))
        .ready_selector("#pageLoaded")
        .build();
    assert!(result.is_ok());
}

/// Test the route-to-file mapping for both layout modes.
#[test]
fn test_output_layout_mapping() {
    let out = Path::new("static-pages");

    // Root is pinned to index.html in both modes.
    assert_eq!(
        route_output_path(out, "/", OutputLayout::Nested),
        out.join("index.html")
    );
    assert_eq!(
        route_output_path(out, "/", OutputLayout::Flat),
        out.join("index.html")
    );

    // Nested: directories mirror the route.
    assert_eq!(
        route_output_path(out, "/about", OutputLayout::Nested),
        out.join("about").join("index.html")
    );
    assert_eq!(
        route_output_path(out, "/blog/post", OutputLayout::Nested),
        out.join("blog").join("post").join("index.html")
    );

    // Flat: one file per route, separators flattened.
    assert_eq!(
        route_output_path(out, "/about", OutputLayout::Flat),
        out.join("about.html")
    );
    assert_eq!(
        route_output_path(out, "/blog/post", OutputLayout::Flat),
        out.join("blog-post.html")
    );
}

/// Test that a missing build directory aborts before anything is spawned.
#[test]
fn test_run_rejects_missing_build() {
    common::init_logging();
    let fixture = common::BuildFixture::new();

    let config = PrerenderConfigBuilder::new()
        .routes(["/"])
        .serve_dir(fixture.root.path().join("no-such-build"))
        .out_dir(&fixture.out_dir)
        .build()
        .unwrap();

    let result = run(&config);
    assert!(matches!(result, Err(PrerenderError::Configuration(_))));
    // Nothing was written: the run failed before the output tree was touched.
    assert!(!fixture.out_dir.exists());
}

/// Test that a server which never answers readiness polls fails the run
/// with `ServerStartTimeout` and leaves no snapshots behind.
#[cfg(unix)]
#[test]
fn test_run_fails_when_server_never_ready() {
    common::init_logging();
    let fixture = common::BuildFixture::new();

    // `sleep` holds the process slot but never binds the port.
    let config = PrerenderConfigBuilder::new()
        .routes(["/", "/about"])
        .serve_dir(&fixture.build_dir)
        .out_dir(&fixture.out_dir)
        .serve_command(["sleep", "60"])
        .build()
        .unwrap();

    let result = run(&config);
    assert!(matches!(
        result,
        Err(PrerenderError::ServerStartTimeout { .. })
    ));

    // The output tree was cleared/created but no route was rendered.
    assert!(fixture.out_dir.exists());
    let entries: Vec<_> = std::fs::read_dir(&fixture.out_dir).unwrap().collect();
    assert!(entries.is_empty(), "no snapshot should exist: {:?}", entries);
}

/// Test that server teardown survives repeated invocation and drop.
#[cfg(unix)]
#[test]
fn test_server_teardown_is_idempotent() {
    common::init_logging();

    let cmd: Vec<String> = ["sleep", "60"].iter().map(|s| s.to_string()).collect();
    let mut server =
        StaticServer::spawn(Some(&cmd), Path::new("."), 0).expect("spawn placeholder server");
    assert!(server.is_running());

    server.terminate();
    assert!(!server.is_running());
    server.terminate();

    drop(server);
}

/// Test that a spawn failure surfaces as an I/O error, not a panic.
#[test]
fn test_server_spawn_failure_is_io_error() {
    common::init_logging();

    let cmd: Vec<String> = ["this-binary-does-not-exist-anywhere"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let result = StaticServer::spawn(Some(&cmd), Path::new("."), 0);
    assert!(matches!(result, Err(PrerenderError::Io(_))));
}
