//! # spa-prerender
//!
//! Prerendering pipeline for single-page applications using headless Chrome.
//!
//! This crate turns an already-built SPA bundle into a tree of static HTML
//! snapshots: it serves the build directory locally, drives a headless
//! Chrome instance to each configured route, waits for the application to
//! settle, and serializes the resulting DOM to disk. The output can be
//! uploaded to any static host and served to crawlers and users alike.
//!
//! ## Features
//!
//! - **Supervised static server**: spawns `npx serve` (or any override
//!   command) against the build directory, with readiness polling and
//!   escalating teardown
//! - **Port allocation**: bind-probe from a fixed base port, or an
//!   externally supplied port
//! - **Per-route state machine**: fresh tab per route, first-response
//!   capture, network-idle wait, optional readiness selector
//! - **Status resolution**: 304 normalization, in-page status override
//!   marker, metadata-endpoint guard
//! - **Storage assertions**: pre-seed `localStorage` before the app boots
//!   and verify after navigation
//! - **Two output layouts**: nested directory trees (`about/index.html`)
//!   or flat files (`about.html`)
//! - **RAII teardown**: the server and browser never outlive the run
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              pipeline::run                  │
//! └──────┬──────────────┬──────────────┬────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌───────────┐
//! │ StaticServer│ │BrowserSession│ │ OutputTree│
//! │ (npx serve) │ │ (headless    │ │ (layout + │
//! │ + readiness │ │  Chrome)     │ │  writes)  │
//! └──────┬──────┘ └──────┬───────┘ └─────▲─────┘
//!        │               │               │
//!        │        ┌──────▼───────┐       │
//!        └───────▶│   Renderer   │───────┘
//!                 │ (per-route   │
//!                 │  state       │
//!                 │  machine)    │
//!                 └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spa_prerender::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = PrerenderConfigBuilder::new()
//!         .routes(["/", "/about", "/blog/post"])
//!         .serve_dir("build")
//!         .out_dir("static-pages")
//!         .ready_selector("#pageLoaded")
//!         .storage_assertion("theme", "dark")
//!         .build()?;
//!
//!     let summary = run(&config)?;
//!     for outcome in &summary.outcomes {
//!         println!("{} -> {:?} ({:?})", outcome.route, outcome.output, outcome.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Configuration
//!
//! When the `env-config` feature is enabled, the configuration can be
//! loaded from environment variables (and an optional `app.env` file):
//!
//! ```rust,no_run
//! # #[cfg(feature = "env-config")]
//! # fn main() -> spa_prerender::Result<()> {
//! let config = spa_prerender::from_env()?;
//! let summary = spa_prerender::run(&config)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "env-config"))]
//! # fn main() {}
//! ```
//!
//! ### Environment Variables
//!
//! | Variable | Type | Default | Description |
//! |----------|------|---------|-------------|
//! | `PRERENDER_ROUTES` | String | (none) | Comma-separated routes (required) |
//! | `PRERENDER_SERVE_DIR` | String | `build` | Built application directory |
//! | `PRERENDER_OUT_DIR` | String | `static-pages` | Output directory |
//! | `PRERENDER_FLAT_OUTPUT` | bool | false | Use the flat output layout |
//! | `PRERENDER_PORT` | u16 | auto | Explicit server port |
//! | `PRERENDER_TAG` | bool | false | Insert the `prerendered` marker |
//! | `PRERENDER_READY_SELECTOR` | String | (none) | Readiness-marker selector |
//! | `PRERENDER_TIMEOUT_MS` | u64 | 10000 | Navigation timeout (ms) |
//! | `CHROME_PATH` | String | auto | Custom Chrome binary path |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `env-config` | Enable environment-based configuration |
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, PrerenderError>`](Result).
//! Only setup-phase failures abort a run; anything that goes wrong inside
//! a single route is logged and recorded in the run's
//! [`PrerenderSummary`] instead:
//!
//! ```rust,ignore
//! use spa_prerender::{run, PrerenderError};
//!
//! match run(&config) {
//!     Ok(summary) => {
//!         println!("{} written, {} skipped", summary.written(), summary.skipped());
//!     }
//!     Err(PrerenderError::ServerStartTimeout { attempts }) => {
//!         eprintln!("static server never came up ({} polls)", attempts);
//!     }
//!     Err(e) => eprintln!("prerender failed: {}", e),
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/spa-prerender/0.3.1")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod port;
pub mod prelude;
pub mod render;
pub mod server;
pub mod session;

// ============================================================================
// Re-exports (Public API)
// ============================================================================

// Core types
pub use config::{OutputLayout, PrerenderConfig, PrerenderConfigBuilder};
pub use error::{PrerenderError, Result};
pub use output::{route_output_path, RouteTask};
pub use pipeline::{run, run_with, PrerenderSummary, RouteOutcome};
pub use render::{RenderResult, Renderer};
pub use server::StaticServer;
pub use session::BrowserSession;

// Feature-gated re-exports
#[cfg(feature = "env-config")]
pub use config::env::{chrome_path_from_env, from_env};
