//! Configuration for a prerender run.
//!
//! This module provides [`PrerenderConfig`] and [`PrerenderConfigBuilder`]
//! for describing one pipeline run: which routes to snapshot, where the
//! built application lives, where output goes, and how the browser and
//! static server behave.
//!
//! The configuration is constructed once and passed by reference into
//! [`pipeline::run`](crate::pipeline::run); the pipeline never mutates it
//! and no process-wide state survives between runs.
//!
//! # Example
//!
//! ```rust
//! use spa_prerender::{OutputLayout, PrerenderConfigBuilder};
//!
//! let config = PrerenderConfigBuilder::new()
//!     .routes(["/", "/about"])
//!     .serve_dir("build")
//!     .out_dir("static-pages")
//!     .layout(OutputLayout::Nested)
//!     .storage_assertion("theme", "dark")
//!     .build()
//!     .expect("invalid configuration");
//!
//! assert_eq!(config.routes.len(), 2);
//! ```
//!
//! # Environment Configuration
//!
//! When the `env-config` feature is enabled, [`env::from_env`] loads the
//! configuration from environment variables and an optional `app.env` file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PrerenderError, Result};

/// Default serve directory (the application's build output).
pub const DEFAULT_SERVE_DIR: &str = "build";

/// Default output directory for rendered snapshots.
pub const DEFAULT_OUT_DIR: &str = "static-pages";

/// Default navigation timeout per route.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the optional readiness-selector wait.
///
/// Deliberately much longer than the navigation timeout: an application
/// that exposes a readiness marker is expected to need extra time for
/// client-side rendering after the network goes quiet.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);

/// How rendered routes are laid out under the output directory.
///
/// The root route `/` always maps to `out_dir/index.html` regardless of
/// layout mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// `/about` renders to `out_dir/about/index.html`. Interior separators
    /// become nested directories (`/blog/post` → `blog/post/index.html`).
    #[default]
    Nested,
    /// `/about` renders to `out_dir/about.html`. Interior separators are
    /// flattened (`/blog/post` → `blog-post.html`).
    Flat,
}

/// Immutable input for one pipeline run.
///
/// Build via [`PrerenderConfigBuilder`], which validates the combination
/// of fields. Fields are public for read access by the pipeline components.
#[derive(Debug, Clone)]
pub struct PrerenderConfig {
    /// Ordered route paths to snapshot. Rendered and written in this order.
    pub routes: Vec<String>,

    /// Directory of already-built static assets, served locally during
    /// rendering. Must contain an `index.html` entry point.
    pub serve_dir: PathBuf,

    /// Directory the rendered tree is written into. Cleared at the start
    /// of every run.
    pub out_dir: PathBuf,

    /// Output layout mode. See [`OutputLayout`].
    pub layout: OutputLayout,

    /// Externally supplied port. When set, used verbatim without probing.
    pub port: Option<u16>,

    /// Explicit Chrome/Chromium binary path. When `None`, the binary is
    /// auto-detected by `headless_chrome`.
    pub chrome_path: Option<PathBuf>,

    /// Insert a visible `prerendered` marker node as the first child of
    /// `<body>` in every snapshot.
    pub tag_output: bool,

    /// Key/value pairs that must be observable in the page's
    /// `localStorage`. Pre-seeded before navigation and verified after;
    /// mismatches are logged, never fatal.
    pub storage: BTreeMap<String, String>,

    /// Optional CSS selector for an application readiness marker
    /// (e.g. `#pageLoaded`). Waited on after navigation; timeout is
    /// non-fatal.
    pub ready_selector: Option<String>,

    /// Use the mobile user-agent variant instead of the desktop one.
    pub mobile: bool,

    /// Per-route navigation timeout (navigate + network quiescence).
    pub navigation_timeout: Duration,

    /// Timeout for the readiness-selector wait.
    pub ready_timeout: Duration,

    /// Override of the static-server command line. `{dir}` and `{port}`
    /// placeholders are expanded at spawn time. Defaults to
    /// `npx serve -s {dir} -l {port}`.
    pub serve_command: Option<Vec<String>>,
}

impl PrerenderConfig {
    /// Start building a configuration.
    pub fn builder() -> PrerenderConfigBuilder {
        PrerenderConfigBuilder::new()
    }
}

/// Builder for [`PrerenderConfig`] with validation.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use spa_prerender::PrerenderConfigBuilder;
///
/// let config = PrerenderConfigBuilder::new()
///     .routes(["/"])
///     .navigation_timeout(Duration::from_secs(30))
///     .ready_selector("#pageLoaded")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.navigation_timeout, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct PrerenderConfigBuilder {
    routes: Vec<String>,
    serve_dir: PathBuf,
    out_dir: PathBuf,
    layout: OutputLayout,
    port: Option<u16>,
    chrome_path: Option<PathBuf>,
    tag_output: bool,
    storage: BTreeMap<String, String>,
    ready_selector: Option<String>,
    mobile: bool,
    navigation_timeout: Duration,
    ready_timeout: Duration,
    serve_command: Option<Vec<String>>,
}

impl Default for PrerenderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrerenderConfigBuilder {
    /// Create a builder with defaults matching a typical CRA/Vite build.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            serve_dir: PathBuf::from(DEFAULT_SERVE_DIR),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            layout: OutputLayout::Nested,
            port: None,
            chrome_path: None,
            tag_output: false,
            storage: BTreeMap::new(),
            ready_selector: None,
            mobile: false,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            serve_command: None,
        }
    }

    /// Set the ordered route list.
    pub fn routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes = routes.into_iter().map(Into::into).collect();
        self
    }

    /// Append a single route.
    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.routes.push(route.into());
        self
    }

    /// Set the serve directory (built application).
    pub fn serve_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.serve_dir = dir.into();
        self
    }

    /// Set the output directory.
    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    /// Set the output layout mode.
    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Supply an external port, skipping the allocator's probe.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Override the Chrome/Chromium binary path.
    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    /// Mark every snapshot with a visible `prerendered` node.
    pub fn tag_output(mut self, tag: bool) -> Self {
        self.tag_output = tag;
        self
    }

    /// Add one storage assertion (localStorage key/value).
    pub fn storage_assertion(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.storage.insert(key.into(), value.into());
        self
    }

    /// Replace the full storage-assertion map.
    pub fn storage(mut self, storage: BTreeMap<String, String>) -> Self {
        self.storage = storage;
        self
    }

    /// Set the readiness-marker selector.
    pub fn ready_selector(mut self, selector: impl Into<String>) -> Self {
        self.ready_selector = Some(selector.into());
        self
    }

    /// Render with the mobile user agent.
    pub fn mobile(mut self, mobile: bool) -> Self {
        self.mobile = mobile;
        self
    }

    /// Set the per-route navigation timeout.
    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set the readiness-selector timeout.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Override the static-server command (`{dir}`/`{port}` placeholders).
    pub fn serve_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.serve_command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PrerenderError::Configuration`] when:
    /// - no routes were given, or a route does not start with `/`
    /// - a timeout is zero
    /// - the output directory equals the serve directory (the run would
    ///   delete the build it is about to serve)
    /// - an empty serve-command override was given
    pub fn build(self) -> Result<PrerenderConfig> {
        if self.routes.is_empty() {
            return Err(PrerenderError::Configuration(
                "at least one route is required".to_string(),
            ));
        }
        if let Some(bad) = self.routes.iter().find(|r| !r.starts_with('/')) {
            return Err(PrerenderError::Configuration(format!(
                "route {:?} must start with '/'",
                bad
            )));
        }
        if self.navigation_timeout.is_zero() || self.ready_timeout.is_zero() {
            return Err(PrerenderError::Configuration(
                "timeouts must be non-zero".to_string(),
            ));
        }
        if self.out_dir == self.serve_dir {
            return Err(PrerenderError::Configuration(
                "out_dir must differ from serve_dir (the output tree is cleared before rendering)"
                    .to_string(),
            ));
        }
        if let Some(cmd) = &self.serve_command {
            if cmd.is_empty() {
                return Err(PrerenderError::Configuration(
                    "serve_command override must not be empty".to_string(),
                ));
            }
        }

        Ok(PrerenderConfig {
            routes: self.routes,
            serve_dir: self.serve_dir,
            out_dir: self.out_dir,
            layout: self.layout,
            port: self.port,
            chrome_path: self.chrome_path,
            tag_output: self.tag_output,
            storage: self.storage,
            ready_selector: self.ready_selector,
            mobile: self.mobile,
            navigation_timeout: self.navigation_timeout,
            ready_timeout: self.ready_timeout,
            serve_command: self.serve_command,
        })
    }
}

// ============================================================================
// Environment-based configuration (feature-gated)
// ============================================================================

/// Environment-based configuration loading.
///
/// Available with the `env-config` feature. Reads an optional `app.env`
/// file (via `dotenvy`) and the following variables:
///
/// | Variable | Maps to |
/// |----------|---------|
/// | `PRERENDER_ROUTES` | comma-separated route list (required) |
/// | `PRERENDER_SERVE_DIR` | serve directory |
/// | `PRERENDER_OUT_DIR` | output directory |
/// | `PRERENDER_FLAT_OUTPUT` | `true`/`1` selects [`OutputLayout::Flat`] |
/// | `PRERENDER_PORT` | explicit port |
/// | `PRERENDER_TAG` | `true`/`1` enables output tagging |
/// | `PRERENDER_READY_SELECTOR` | readiness-marker selector |
/// | `PRERENDER_TIMEOUT_MS` | navigation timeout in milliseconds |
/// | `CHROME_PATH` | browser binary override |
#[cfg(feature = "env-config")]
pub mod env {
    use super::*;

    /// Default environment file name.
    pub const ENV_FILE_NAME: &str = "app.env";

    /// Load environment variables from the `app.env` file.
    ///
    /// Called automatically by [`from_env`]; call it explicitly if you need
    /// the file loaded earlier.
    pub fn load_env_file() -> std::result::Result<std::path::PathBuf, dotenvy::Error> {
        dotenvy::from_filename(ENV_FILE_NAME)
    }

    /// Read the browser binary override from `CHROME_PATH`, if set.
    pub fn chrome_path_from_env() -> Option<PathBuf> {
        std::env::var("CHROME_PATH").ok().map(PathBuf::from)
    }

    /// Load a full configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`PrerenderError::Configuration`] when `PRERENDER_ROUTES` is
    /// missing or any value fails to parse or validate.
    pub fn from_env() -> Result<PrerenderConfig> {
        match load_env_file() {
            Ok(path) => log::info!("loaded environment from {:?}", path),
            Err(e) => log::debug!(
                "no {} file loaded ({}); using process environment and defaults",
                ENV_FILE_NAME,
                e
            ),
        }

        let routes = std::env::var("PRERENDER_ROUTES").map_err(|_| {
            PrerenderError::Configuration(
                "PRERENDER_ROUTES is required (comma-separated route list)".to_string(),
            )
        })?;

        let mut builder = PrerenderConfigBuilder::new()
            .routes(routes.split(',').map(|r| r.trim().to_string()));

        if let Ok(dir) = std::env::var("PRERENDER_SERVE_DIR") {
            builder = builder.serve_dir(dir);
        }
        if let Ok(dir) = std::env::var("PRERENDER_OUT_DIR") {
            builder = builder.out_dir(dir);
        }
        if parse_bool_var("PRERENDER_FLAT_OUTPUT") {
            builder = builder.layout(OutputLayout::Flat);
        }
        if let Ok(port) = std::env::var("PRERENDER_PORT") {
            let port: u16 = port.parse().map_err(|e| {
                PrerenderError::Configuration(format!("invalid PRERENDER_PORT: {}", e))
            })?;
            builder = builder.port(port);
        }
        if parse_bool_var("PRERENDER_TAG") {
            builder = builder.tag_output(true);
        }
        if let Ok(selector) = std::env::var("PRERENDER_READY_SELECTOR") {
            builder = builder.ready_selector(selector);
        }
        if let Ok(ms) = std::env::var("PRERENDER_TIMEOUT_MS") {
            let ms: u64 = ms.parse().map_err(|e| {
                PrerenderError::Configuration(format!("invalid PRERENDER_TIMEOUT_MS: {}", e))
            })?;
            builder = builder.navigation_timeout(Duration::from_millis(ms));
        }
        if let Some(path) = chrome_path_from_env() {
            builder = builder.chrome_path(path);
        }

        builder.build()
    }

    fn parse_bool_var(name: &str) -> bool {
        matches!(
            std::env::var(name).as_deref(),
            Ok("1") | Ok("true") | Ok("TRUE") | Ok("True")
        )
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = PrerenderConfigBuilder::new().routes(["/"]).build().unwrap();

        assert_eq!(config.serve_dir, PathBuf::from("build"));
        assert_eq!(config.out_dir, PathBuf::from("static-pages"));
        assert_eq!(config.layout, OutputLayout::Nested);
        assert_eq!(config.navigation_timeout, DEFAULT_NAVIGATION_TIMEOUT);
        assert_eq!(config.ready_timeout, DEFAULT_READY_TIMEOUT);
        assert!(config.port.is_none());
        assert!(!config.tag_output);
        assert!(!config.mobile);
        assert!(config.storage.is_empty());
    }

    #[test]
    fn test_empty_routes_rejected() {
        let result = PrerenderConfigBuilder::new().build();
        assert!(matches!(result, Err(PrerenderError::Configuration(_))));
    }

    #[test]
    fn test_route_without_leading_slash_rejected() {
        let result = PrerenderConfigBuilder::new().routes(["about"]).build();
        assert!(matches!(result, Err(PrerenderError::Configuration(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = PrerenderConfigBuilder::new()
            .routes(["/"])
            .navigation_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_out_dir_equal_serve_dir_rejected() {
        let result = PrerenderConfigBuilder::new()
            .routes(["/"])
            .serve_dir("dist")
            .out_dir("dist")
            .build();
        assert!(matches!(result, Err(PrerenderError::Configuration(_))));
    }

    #[test]
    fn test_empty_serve_command_rejected() {
        let result = PrerenderConfigBuilder::new()
            .routes(["/"])
            .serve_command(Vec::<String>::new())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_storage_assertions_accumulate() {
        let config = PrerenderConfigBuilder::new()
            .routes(["/"])
            .storage_assertion("theme", "dark")
            .storage_assertion("lang", "en")
            .build()
            .unwrap();

        assert_eq!(config.storage.len(), 2);
        assert_eq!(config.storage.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn test_layout_default_is_nested() {
        assert_eq!(OutputLayout::default(), OutputLayout::Nested);
    }
}
