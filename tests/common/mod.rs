//! Shared helpers for integration tests.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// Initialize test logging (idempotent).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A minimal built application: a temp dir holding `build/index.html`.
pub struct BuildFixture {
    /// Keeps the temp dir alive for the duration of the test.
    pub root: TempDir,
    pub build_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl BuildFixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let build_dir = root.path().join("build");
        let out_dir = root.path().join("static-pages");
        fs::create_dir_all(&build_dir).expect("create build dir");
        fs::write(
            build_dir.join("index.html"),
            "<!doctype html><html><head><title>app</title></head><body><div id=\"root\"></div></body></html>",
        )
        .expect("write index.html");
        Self {
            root,
            build_dir,
            out_dir,
        }
    }
}
