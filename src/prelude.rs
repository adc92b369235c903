//! Convenient imports for common usage patterns.
//!
//! This module re-exports the most commonly used types from
//! `spa-prerender`, allowing you to quickly get started with a single
//! import.
//!
//! # Usage
//!
//! ```rust,ignore
//! use spa_prerender::prelude::*;
//! ```
//!
//! This imports:
//!
//! - [`PrerenderConfig`] - Run configuration
//! - [`PrerenderConfigBuilder`] - Configuration builder
//! - [`OutputLayout`] - Output tree layout mode
//! - [`PrerenderError`] - Error type
//! - [`Result`] - Result type alias
//! - [`PrerenderSummary`] / [`RouteOutcome`] - Run results
//! - [`RenderResult`] - Per-route render outcome
//! - [`run`] / [`run_with`] - Pipeline entry points
//!
//! # Example
//!
//! ```rust,ignore
//! use spa_prerender::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = PrerenderConfigBuilder::new()
//!         .routes(["/", "/about"])
//!         .serve_dir("build")
//!         .build()?;
//!
//!     let summary = run(&config)?;
//!     println!("{} routes written", summary.written());
//!     Ok(())
//! }
//! ```

// Core types
pub use crate::config::{OutputLayout, PrerenderConfig, PrerenderConfigBuilder};
pub use crate::error::{PrerenderError, Result};
pub use crate::pipeline::{run, run_with, PrerenderSummary, RouteOutcome};
pub use crate::render::RenderResult;

// Feature-gated exports
#[cfg(feature = "env-config")]
pub use crate::config::env::{chrome_path_from_env, from_env};
