//! Pipeline orchestration.
//!
//! Ties the components together for one run: allocate a port, spawn and
//! supervise the static server, launch the browser, render every route in
//! order, write the output tree, and tear everything down. Teardown is
//! explicit at the end of the happy path and backstopped by `Drop` on the
//! server and session, so neither process survives an early return.
//!
//! Routes are processed strictly sequentially in configuration order. A
//! failure inside one route is logged and recorded in the summary; it
//! never aborts the remaining routes. Only setup failures (no port, server
//! never ready, browser refused to launch, bad preflight) abort the run.

use std::path::PathBuf;
use std::time::Instant;

use crate::config::PrerenderConfig;
use crate::error::{PrerenderError, Result};
use crate::output::{self, RouteTask};
use crate::port;
use crate::render::Renderer;
use crate::server::StaticServer;
use crate::session::BrowserSession;

/// Hook applied to each route's markup before it is written.
///
/// Receives the route and the serialized HTML; returns the HTML to
/// persist. An `Err` counts as a per-route failure for that route only.
pub type PostProcess<'a> = &'a dyn Fn(&str, &str) -> Result<String>;

/// Outcome of one route within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOutcome {
    /// The route as configured.
    pub route: String,
    /// Resolved HTTP status, when a render result was produced.
    pub status: Option<u16>,
    /// Where the snapshot was written; `None` for short-circuited or
    /// failed routes.
    pub output: Option<PathBuf>,
}

impl RouteOutcome {
    /// Whether this route produced a persisted snapshot.
    pub fn is_written(&self) -> bool {
        self.output.is_some()
    }
}

/// Summary of a completed run.
///
/// The run itself succeeded (all setup phases passed and every route was
/// attempted); individual routes may still have failed or short-circuited.
#[derive(Debug, Clone)]
pub struct PrerenderSummary {
    /// Per-route outcomes, in configuration order.
    pub outcomes: Vec<RouteOutcome>,
    /// Port the static server ran on.
    pub port: u16,
}

impl PrerenderSummary {
    /// Number of routes whose snapshot was written.
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_written()).count()
    }

    /// Number of routes that produced no file.
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.written()
    }
}

/// Run the full pipeline for `config`.
///
/// # Errors
///
/// Fatal setup conditions only: [`PrerenderError::Configuration`] from
/// preflight, [`PrerenderError::PortUnavailable`],
/// [`PrerenderError::Io`] on spawn or output-tree preparation,
/// [`PrerenderError::ServerStartTimeout`], and
/// [`PrerenderError::BrowserLaunch`]. Per-route failures are contained
/// and reported through the summary.
pub fn run(config: &PrerenderConfig) -> Result<PrerenderSummary> {
    run_with(config, None)
}

/// Like [`run`], with an optional per-route post-processing hook.
pub fn run_with(
    config: &PrerenderConfig,
    post_process: Option<PostProcess<'_>>,
) -> Result<PrerenderSummary> {
    let started = Instant::now();

    preflight(config)?;
    output::clear_out_dir(&config.out_dir)?;

    let port = port::allocate(config.port)?;

    let mut server = StaticServer::spawn(config.serve_command.as_deref(), &config.serve_dir, port)?;
    if let Err(e) = server.wait_until_ready() {
        server.terminate();
        return Err(e);
    }

    let mut session = match BrowserSession::launch(config.chrome_path.as_deref()) {
        Ok(session) => session,
        Err(e) => {
            server.terminate();
            return Err(e);
        }
    };

    let renderer = Renderer::new(&session, config, server.root_url());
    let mut outcomes = Vec::with_capacity(config.routes.len());

    for route in &config.routes {
        outcomes.push(process_route(config, &renderer, route, post_process));
    }

    // Explicit teardown; Drop only backstops the error paths above.
    session.close();
    server.terminate();

    let summary = PrerenderSummary { outcomes, port };
    log::info!(
        "prerender finished: {} written, {} skipped, {:?}",
        summary.written(),
        summary.skipped(),
        started.elapsed()
    );
    Ok(summary)
}

/// Render and persist one route, containing every failure.
fn process_route(
    config: &PrerenderConfig,
    renderer: &Renderer<'_>,
    route: &str,
    post_process: Option<PostProcess<'_>>,
) -> RouteOutcome {
    let result = match renderer.render(route) {
        Ok(result) => result,
        Err(e) => {
            log::error!("route {} failed: {}", route, e);
            return RouteOutcome {
                route: route.to_string(),
                status: None,
                output: None,
            };
        }
    };

    if result.content.is_empty() {
        log::warn!("route {} produced no content (status {})", route, result.status);
        return RouteOutcome {
            route: route.to_string(),
            status: Some(result.status),
            output: None,
        };
    }

    let content = match post_process {
        Some(hook) => match hook(route, &result.content) {
            Ok(content) => content,
            Err(e) => {
                log::error!("post-processing failed for {}: {}", route, e);
                return RouteOutcome {
                    route: route.to_string(),
                    status: Some(result.status),
                    output: None,
                };
            }
        },
        None => result.content,
    };

    let task = RouteTask::derive(&config.out_dir, route, config.layout);
    match output::write_route(&task, &content) {
        Ok(()) => RouteOutcome {
            route: route.to_string(),
            status: Some(result.status),
            output: Some(task.output_path),
        },
        Err(e) => {
            log::error!("failed to write {:?}: {}", task.output_path, e);
            RouteOutcome {
                route: route.to_string(),
                status: Some(result.status),
                output: None,
            }
        }
    }
}

/// Validate the environment before any process is spawned.
fn preflight(config: &PrerenderConfig) -> Result<()> {
    if !config.serve_dir.is_dir() {
        return Err(PrerenderError::Configuration(format!(
            "serve directory {:?} does not exist; build the application first",
            config.serve_dir
        )));
    }
    if !config.serve_dir.join("index.html").is_file() {
        return Err(PrerenderError::Configuration(format!(
            "serve directory {:?} has no index.html entry point",
            config.serve_dir
        )));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrerenderConfigBuilder;

    fn config_for(serve_dir: &std::path::Path, out_dir: &std::path::Path) -> PrerenderConfig {
        PrerenderConfigBuilder::new()
            .routes(["/"])
            .serve_dir(serve_dir)
            .out_dir(out_dir)
            .build()
            .unwrap()
    }

    #[test]
    fn test_preflight_rejects_missing_serve_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(&tmp.path().join("no-such-build"), &tmp.path().join("out"));
        assert!(matches!(
            preflight(&config),
            Err(PrerenderError::Configuration(_))
        ));
    }

    #[test]
    fn test_preflight_rejects_missing_index() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        let config = config_for(&build, &tmp.path().join("out"));
        assert!(matches!(
            preflight(&config),
            Err(PrerenderError::Configuration(_))
        ));
    }

    #[test]
    fn test_preflight_accepts_valid_build() {
        let tmp = tempfile::tempdir().unwrap();
        let build = tmp.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("index.html"), "<html></html>").unwrap();
        let config = config_for(&build, &tmp.path().join("out"));
        assert!(preflight(&config).is_ok());
    }

    #[test]
    fn test_summary_counters() {
        let summary = PrerenderSummary {
            outcomes: vec![
                RouteOutcome {
                    route: "/".to_string(),
                    status: Some(200),
                    output: Some(PathBuf::from("out/index.html")),
                },
                RouteOutcome {
                    route: "/missing".to_string(),
                    status: Some(400),
                    output: None,
                },
                RouteOutcome {
                    route: "/broken".to_string(),
                    status: None,
                    output: None,
                },
            ],
            port: 5050,
        };
        assert_eq!(summary.written(), 1);
        assert_eq!(summary.skipped(), 2);
    }
}
