//! Output tree writer.
//!
//! Maps each route to exactly one file under the output directory and
//! persists rendered markup there. The mapping is a pure function of the
//! route and the layout mode, so callers (and tests) can predict every
//! path without running a browser.
//!
//! # Layout rules
//!
//! | Route | Nested | Flat |
//! |-------|--------|------|
//! | `/` | `index.html` | `index.html` |
//! | `/about` | `about/index.html` | `about.html` |
//! | `/blog/post` | `blog/post/index.html` | `blog-post.html` |

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::OutputLayout;
use crate::error::Result;

/// One route plus its derived output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTask {
    /// The route path as configured (e.g. `/about`).
    pub route: String,
    /// Destination file, absolute or relative per `out_dir`.
    pub output_path: PathBuf,
}

impl RouteTask {
    /// Derive the task for `route` under `out_dir` with `layout`.
    pub fn derive(out_dir: &Path, route: &str, layout: OutputLayout) -> Self {
        Self {
            route: route.to_string(),
            output_path: route_output_path(out_dir, route, layout),
        }
    }
}

/// Compute the destination file for a route.
///
/// The root route is pinned to `out_dir/index.html` in both modes so the
/// served entry point is always replaced by its snapshot.
pub fn route_output_path(out_dir: &Path, route: &str, layout: OutputLayout) -> PathBuf {
    let trimmed = route.trim_start_matches('/');
    if trimmed.is_empty() {
        return out_dir.join("index.html");
    }

    match layout {
        OutputLayout::Nested => out_dir.join(trimmed).join("index.html"),
        OutputLayout::Flat => out_dir.join(format!("{}.html", trimmed.replace('/', "-"))),
    }
}

/// Remove any previous output tree and recreate the directory.
///
/// Runs once per pipeline, before the first route renders, so stale
/// snapshots from earlier runs can never leak into the new tree.
pub fn clear_out_dir(out_dir: &Path) -> Result<()> {
    if out_dir.exists() {
        fs::remove_dir_all(out_dir)?;
        log::info!("cleaned existing output directory {:?}", out_dir);
    }
    fs::create_dir_all(out_dir)?;
    Ok(())
}

/// Persist one rendered route.
///
/// Creates intermediate directories as needed. Failures are returned to
/// the caller, which logs them per route; earlier writes are never rolled
/// back.
pub fn write_route(task: &RouteTask, content: &str) -> Result<()> {
    if let Some(parent) = task.output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&task.output_path, content)?;
    log::info!("saved static page {:?}", task.output_path);
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_route_pinned_in_both_modes() {
        let out = Path::new("out");
        assert_eq!(
            route_output_path(out, "/", OutputLayout::Nested),
            out.join("index.html")
        );
        assert_eq!(
            route_output_path(out, "/", OutputLayout::Flat),
            out.join("index.html")
        );
    }

    #[test]
    fn test_nested_single_segment() {
        let out = Path::new("out");
        assert_eq!(
            route_output_path(out, "/about", OutputLayout::Nested),
            out.join("about").join("index.html")
        );
    }

    #[test]
    fn test_nested_multi_segment() {
        let out = Path::new("out");
        assert_eq!(
            route_output_path(out, "/blog/post", OutputLayout::Nested),
            out.join("blog").join("post").join("index.html")
        );
    }

    #[test]
    fn test_flat_single_segment() {
        let out = Path::new("out");
        assert_eq!(
            route_output_path(out, "/about", OutputLayout::Flat),
            out.join("about.html")
        );
    }

    #[test]
    fn test_flat_multi_segment_flattens_separators() {
        let out = Path::new("out");
        assert_eq!(
            route_output_path(out, "/blog/post", OutputLayout::Flat),
            out.join("blog-post.html")
        );
    }

    #[test]
    fn test_derive_keeps_route() {
        let task = RouteTask::derive(Path::new("out"), "/about", OutputLayout::Nested);
        assert_eq!(task.route, "/about");
        assert_eq!(task.output_path, Path::new("out/about/index.html"));
    }

    #[test]
    fn test_write_route_creates_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let task = RouteTask::derive(tmp.path(), "/deep/nested/page", OutputLayout::Nested);

        write_route(&task, "<html></html>").unwrap();

        let written = fs::read_to_string(&task.output_path).unwrap();
        assert_eq!(written, "<html></html>");
    }

    #[test]
    fn test_clear_out_dir_removes_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("static-pages");
        fs::create_dir_all(out.join("stale")).unwrap();
        fs::write(out.join("stale").join("index.html"), "old").unwrap();

        clear_out_dir(&out).unwrap();

        assert!(out.exists());
        assert!(!out.join("stale").exists());
    }

    #[test]
    fn test_clear_out_dir_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("fresh");
        clear_out_dir(&out).unwrap();
        assert!(out.is_dir());
    }
}
