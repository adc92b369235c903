//! Static file server supervision.
//!
//! The pipeline does not serve files itself; it spawns an external static
//! server (by default `npx serve`) pointed at the build directory and owns
//! that process for the duration of the run. On unix the child is detached
//! into its own process group so that the whole serve tree (`npx` plus
//! whatever it execs) can be terminated as a unit.
//!
//! # Lifecycle
//!
//! ```text
//! spawn() ──▶ Starting ──▶ wait_until_ready() ──▶ Ready ──▶ terminate() ──▶ Terminated
//!                │                                              ▲
//!                └── readiness poll exhausted ──────────────────┘  (fatal ServerStartTimeout)
//! ```
//!
//! Termination escalates: graceful signal to the process group, a bounded
//! grace window, then a forceful kill. It is idempotent and tolerates a
//! process that already exited; the `Drop` impl invokes it as a backstop so
//! the server is released on every exit path.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use crate::error::{PrerenderError, Result};

/// Interval between readiness polls.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Maximum number of readiness polls before the run fails.
pub const READY_MAX_ATTEMPTS: u32 = 40;

/// Per-request timeout for a single readiness poll.
const READY_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a graceful termination may take before escalating.
const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Poll interval while waiting out the termination grace window.
const TERMINATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Build the serve command line, expanding `{dir}` and `{port}`.
///
/// `override_command` replaces the default `npx serve -s {dir} -l {port}`
/// verbatim; both forms get placeholder expansion, so an override can keep
/// the substitution points it needs.
pub fn build_serve_command(
    override_command: Option<&[String]>,
    serve_dir: &Path,
    port: u16,
) -> Vec<String> {
    let default: Vec<String> = ["npx", "serve", "-s", "{dir}", "-l", "{port}"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let template: Vec<String> = match override_command {
        Some(cmd) => cmd.to_vec(),
        None => default,
    };

    let dir = serve_dir.to_string_lossy();
    template
        .into_iter()
        .map(|token| {
            token
                .replace("{dir}", &dir)
                .replace("{port}", &port.to_string())
        })
        .collect()
}

/// Supervised static file server process.
///
/// Owns the spawned child exclusively; exists from spawn until teardown.
/// Exactly one instance exists per pipeline run.
pub struct StaticServer {
    /// `None` after termination (taking it makes teardown idempotent).
    child: Option<Child>,
    /// Process id at spawn time, retained for liveness checks after reaping.
    pid: u32,
    port: u16,
}

impl StaticServer {
    /// Spawn the server command bound to `port`, serving `serve_dir`.
    ///
    /// The child's stdio is nulled; its output is not part of the
    /// pipeline's logging. On unix the child becomes leader of a new
    /// process group.
    ///
    /// # Errors
    ///
    /// [`PrerenderError::Configuration`] if the command line is empty;
    /// [`PrerenderError::Io`] if the command cannot be spawned (e.g. the
    /// executable is missing).
    pub fn spawn(
        override_command: Option<&[String]>,
        serve_dir: &Path,
        port: u16,
    ) -> Result<Self> {
        let argv = build_serve_command(override_command, serve_dir, port);
        let Some((program, args)) = argv.split_first() else {
            return Err(PrerenderError::Configuration(
                "serve command must not be empty".to_string(),
            ));
        };
        log::info!("starting static server: {}", argv.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            log::error!("failed to spawn static server {:?}: {}", argv[0], e);
            PrerenderError::Io(e)
        })?;

        let pid = child.id();
        log::debug!("static server spawned (pid {}, port {})", pid, port);

        Ok(Self {
            child: Some(child),
            pid,
            port,
        })
    }

    /// The port the server was asked to bind.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL of the served build.
    pub fn root_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Block until the server answers a GET on its root URL with a 2xx.
    ///
    /// Polls every [`READY_POLL_INTERVAL`], up to [`READY_MAX_ATTEMPTS`]
    /// attempts.
    ///
    /// # Errors
    ///
    /// [`PrerenderError::ServerStartTimeout`] when the attempt budget is
    /// exhausted. The caller is expected to tear the server down; this
    /// method does not.
    pub fn wait_until_ready(&self) -> Result<()> {
        let url = format!("{}/", self.root_url());
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(READY_REQUEST_TIMEOUT))
            .build()
            .into();

        for attempt in 1..=READY_MAX_ATTEMPTS {
            match agent.get(&url).call() {
                Ok(response) if response.status().is_success() => {
                    log::info!(
                        "static server ready on port {} (attempt {})",
                        self.port,
                        attempt
                    );
                    return Ok(());
                }
                Ok(response) => {
                    log::debug!(
                        "readiness poll {}/{}: unexpected status {}",
                        attempt,
                        READY_MAX_ATTEMPTS,
                        response.status()
                    );
                }
                Err(e) => {
                    log::trace!(
                        "readiness poll {}/{} failed: {}",
                        attempt,
                        READY_MAX_ATTEMPTS,
                        e
                    );
                }
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }

        Err(PrerenderError::ServerStartTimeout {
            attempts: READY_MAX_ATTEMPTS,
        })
    }

    /// Whether the server process (group) still appears to be running.
    ///
    /// Best effort: uses a null signal probe on unix, `try_wait` semantics
    /// do not apply once the child has been reaped.
    pub fn is_running(&self) -> bool {
        #[cfg(unix)]
        {
            // Signal 0 performs permission/liveness checks without delivery.
            unsafe { libc::kill(self.pid as i32, 0) == 0 }
        }
        #[cfg(not(unix))]
        {
            self.child.is_some()
        }
    }

    /// Terminate the server with an escalating policy.
    ///
    /// Sends a graceful signal to the whole process group, waits up to the
    /// grace window for exit, then force-kills the group and reaps the
    /// child. Safe to call repeatedly and on an already-exited process.
    pub fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            log::trace!("static server already terminated");
            return;
        };

        // Already exited on its own? Just reap.
        if let Ok(Some(status)) = child.try_wait() {
            log::debug!("static server exited before teardown ({})", status);
            return;
        }

        log::debug!("terminating static server process group {}", self.pid);
        signal_group(self.pid, GroupSignal::Term, &mut child);

        let deadline = std::time::Instant::now() + TERMINATION_GRACE;
        while std::time::Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!("static server terminated gracefully ({})", status);
                    return;
                }
                Ok(None) => std::thread::sleep(TERMINATION_POLL_INTERVAL),
                Err(e) => {
                    log::warn!("error while waiting for static server exit: {}", e);
                    break;
                }
            }
        }

        log::warn!(
            "static server did not exit within {:?}, escalating to kill",
            TERMINATION_GRACE
        );
        signal_group(self.pid, GroupSignal::Kill, &mut child);
        let _ = child.wait();
        log::debug!("static server killed");
    }
}

impl Drop for StaticServer {
    /// Backstop teardown so the server never outlives the run.
    fn drop(&mut self) {
        self.terminate();
    }
}

enum GroupSignal {
    Term,
    Kill,
}

/// Deliver a signal to the child's process group, falling back to the
/// child alone where process groups are unavailable.
fn signal_group(pid: u32, signal: GroupSignal, child: &mut Child) {
    #[cfg(unix)]
    {
        let signum = match signal {
            GroupSignal::Term => libc::SIGTERM,
            GroupSignal::Kill => libc::SIGKILL,
        };
        // The child was spawned as a group leader, so its pid is the pgid.
        // ESRCH (group already gone) is expected and ignored.
        let rc = unsafe { libc::killpg(pid as i32, signum) };
        if rc != 0 {
            log::trace!(
                "killpg({}, {}) failed: {}",
                pid,
                signum,
                std::io::Error::last_os_error()
            );
        }
        let _ = child;
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        if matches!(signal, GroupSignal::Term | GroupSignal::Kill) {
            let _ = child.kill();
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_serve_command_expansion() {
        let argv = build_serve_command(None, &PathBuf::from("build"), 5050);
        assert_eq!(argv, vec!["npx", "serve", "-s", "build", "-l", "5050"]);
    }

    #[test]
    fn test_override_serve_command_expansion() {
        let override_cmd: Vec<String> = ["python3", "-m", "http.server", "{port}", "-d", "{dir}"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let argv = build_serve_command(Some(&override_cmd), &PathBuf::from("dist"), 8080);
        assert_eq!(
            argv,
            vec!["python3", "-m", "http.server", "8080", "-d", "dist"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_is_idempotent() {
        // A child that would outlive the test unless terminated.
        let cmd: Vec<String> = ["sleep", "30"].iter().map(|s| s.to_string()).collect();
        let mut server =
            StaticServer::spawn(Some(&cmd), &PathBuf::from("."), 0).expect("spawn sleep");
        assert!(server.is_running());

        server.terminate();
        assert!(!server.is_running());

        // Second and third invocations must be no-ops.
        server.terminate();
        server.terminate();
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_terminates_process() {
        let cmd: Vec<String> = ["sleep", "30"].iter().map(|s| s.to_string()).collect();
        let server = StaticServer::spawn(Some(&cmd), &PathBuf::from("."), 0).expect("spawn sleep");
        let pid = server.pid;
        drop(server);

        // After drop the process group leader must be gone.
        let alive = unsafe { libc::kill(pid as i32, 0) == 0 };
        assert!(!alive, "server process should not survive drop");
    }

    #[test]
    fn test_spawn_empty_command_rejected() {
        let result = StaticServer::spawn(Some(&[]), &PathBuf::from("."), 0);
        assert!(matches!(
            result,
            Err(crate::PrerenderError::Configuration(_))
        ));
    }

    #[test]
    fn test_spawn_missing_executable_errors() {
        let cmd: Vec<String> = ["definitely-not-a-real-binary-xyz"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = StaticServer::spawn(Some(&cmd), &PathBuf::from("."), 0);
        assert!(matches!(result, Err(crate::PrerenderError::Io(_))));
    }
}
