//! Error types for the prerender pipeline.
//!
//! This module provides [`PrerenderError`], a unified error type for all
//! pipeline operations, and a convenient [`Result`] type alias.
//!
//! # Fatality
//!
//! Only setup-phase conditions surface as errors: port exhaustion, the
//! static server never answering, the browser failing to launch, invalid
//! configuration, and I/O faults while preparing the output tree. Per-route
//! degradations (navigation timeout, readiness timeout, storage mismatch,
//! a failed write for one route) are logged inside the route loop and never
//! unwind past it.
//!
//! # Example
//!
//! ```rust
//! use spa_prerender::{PrerenderError, Result};
//!
//! fn check_port(port: Option<u16>) -> Result<u16> {
//!     port.ok_or(PrerenderError::PortUnavailable { start: 5050, count: 100 })
//! }
//!
//! match check_port(None) {
//!     Ok(p) => println!("using port {}", p),
//!     Err(e) => eprintln!("setup failed: {}", e),
//! }
//! ```

/// Errors that can occur while running the prerender pipeline.
///
/// Each variant corresponds to a fatal setup condition; see the module
/// docs for how non-fatal per-route degradations are handled instead.
#[derive(Debug, thiserror::Error)]
pub enum PrerenderError {
    /// No local port could be bound within the probe range.
    ///
    /// Returned by the port allocator when no externally supplied port was
    /// given and every candidate in `[start, start + count)` failed the
    /// bind/release probe.
    #[error("no free port in range {start}..{} ({count} candidates probed)", .start + .count)]
    PortUnavailable {
        /// First candidate port probed.
        start: u16,
        /// Number of candidates probed.
        count: u16,
    },

    /// The static file server never answered the readiness poll.
    ///
    /// The supervisor polls the server's root URL with plain GETs at a
    /// fixed interval; if no 2xx response arrives within the attempt
    /// budget, the whole run aborts before any route is rendered.
    #[error("static server did not become ready after {attempts} poll attempts")]
    ServerStartTimeout {
        /// Number of readiness polls issued before giving up.
        attempts: u32,
    },

    /// Headless Chrome failed to launch.
    ///
    /// Typically the binary is missing, the override path is wrong, or the
    /// host forbids the process from starting (e.g. missing shared
    /// libraries in a minimal container).
    #[error("failed to launch headless browser: {0}")]
    BrowserLaunch(String),

    /// A page-context operation failed mid-route.
    ///
    /// Raised when the tab itself becomes unusable (cannot open, cannot
    /// serialize). The pipeline contains this within the failing route's
    /// iteration; it never aborts the remaining routes.
    #[error("page context operation failed: {0}")]
    Page(String),

    /// Invalid configuration provided.
    ///
    /// Produced by [`PrerenderConfigBuilder::build`](crate::config::PrerenderConfigBuilder::build)
    /// and by pipeline preflight checks (e.g. a serve directory without an
    /// `index.html` entry point).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem or process I/O failure during setup.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<String> for PrerenderError {
    fn from(msg: String) -> Self {
        PrerenderError::Configuration(msg)
    }
}

impl From<&str> for PrerenderError {
    fn from(msg: &str) -> Self {
        PrerenderError::Configuration(msg.to_string())
    }
}

/// Result type alias using [`PrerenderError`].
pub type Result<T> = std::result::Result<T, PrerenderError>;

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let error: PrerenderError = "test error".into();
        match error {
            PrerenderError::Configuration(msg) => assert_eq!(msg, "test error"),
            _ => panic!("expected Configuration variant"),
        }

        let error: PrerenderError = "another error".to_string().into();
        assert!(matches!(error, PrerenderError::Configuration(_)));
    }

    #[test]
    fn test_error_display() {
        let error = PrerenderError::PortUnavailable {
            start: 5050,
            count: 100,
        };
        assert_eq!(
            error.to_string(),
            "no free port in range 5050..5150 (100 candidates probed)"
        );

        let error = PrerenderError::ServerStartTimeout { attempts: 40 };
        assert_eq!(
            error.to_string(),
            "static server did not become ready after 40 poll attempts"
        );

        let error = PrerenderError::BrowserLaunch("chrome not found".to_string());
        assert_eq!(
            error.to_string(),
            "failed to launch headless browser: chrome not found"
        );
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<PrerenderError>();
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PrerenderError>();
    }
}
