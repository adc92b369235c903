//! Per-route render state machine.
//!
//! One route's processing is a strict sequence inside a fresh tab:
//!
//! ```text
//! Created ─▶ (pre-seed storage) ─▶ Navigating ─▶ ReadinessWait? ─▶ Verifying
//!        ─▶ status resolution ─▶ base inject ─▶ tag? ─▶ Serializing ─▶ Closed
//! ```
//!
//! Degradations along the way (navigation timeout, missing readiness
//! marker, storage mismatches) are logged and the route proceeds with a
//! best-effort snapshot; two guards short-circuit to a fixed result
//! instead (no captured response → `400`, metadata-endpoint response →
//! `403`). The tab is closed unconditionally, whichever path was taken.
//!
//! # First response wins
//!
//! The first network response observed for the tab is retained in a
//! single-assignment slot and treated as the canonical navigation
//! response, even if navigation later times out. This is a deliberate
//! tie-break that lets a timed-out route still produce a partial result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::Tab;

use crate::config::PrerenderConfig;
use crate::error::{PrerenderError, Result};
use crate::session::BrowserSession;

/// Desktop user agent applied to every page context by default.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Mobile user agent applied when the mobile variant is requested.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 8.0.0; Pixel 2 XL \
     Build/OPD1.170816.004) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/68.0.3440.75 Mobile Safari/537.36";

/// Response header value identifying a cloud metadata endpoint.
///
/// A page whose navigation response carries `metadata-flavor: Google` is
/// never serialized; the route short-circuits to 403 to prevent metadata
/// exfiltration through the snapshot tree.
pub const METADATA_FLAVOR_SENTINEL: &str = "Google";

/// Poll interval while waiting for the network-idle lifecycle signal.
const NETWORK_IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll interval while waiting for the readiness marker to become visible.
const READY_MARKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The outcome of rendering one route: resolved HTTP status plus the
/// serialized markup (empty when a guard short-circuited).
///
/// Produced exactly once per route and consumed exactly once by the
/// output writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    /// Resolved HTTP status (after 304 normalization and any override).
    pub status: u16,
    /// Serialized outer HTML of the document root, possibly empty.
    pub content: String,
}

/// What the navigation response capture retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    /// Original HTTP status of the first response.
    pub status: u16,
    /// Value of the `metadata-flavor` header, if present (any casing).
    pub metadata_flavor: Option<String>,
}

impl CapturedResponse {
    /// Extract status and the metadata header from a serialized CDP
    /// `Network.Response` payload.
    ///
    /// Going through JSON keeps this independent of the generated
    /// protocol structs' exact field types.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let status = value.get("status")?.as_u64()? as u16;
        let metadata_flavor = value
            .get("headers")
            .and_then(|h| h.as_object())
            .and_then(|map| {
                map.iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("metadata-flavor"))
                    .and_then(|(_, v)| v.as_str().map(str::to_string))
            });
        Some(Self {
            status,
            metadata_flavor,
        })
    }
}

/// Latch tracking the `networkIdle` lifecycle signal for one tab.
///
/// Chrome replays the current loader's lifecycle state when a listener
/// attaches, so a fresh subscription can observe the `about:blank`
/// document's `networkIdle` before the route's navigation has started.
/// [`arm`](Self::arm) discards any signal observed so far; callers arm the
/// latch immediately before navigating and only trust it afterwards.
#[derive(Debug, Clone, Default)]
pub struct NetworkIdleLatch {
    idle: Arc<AtomicBool>,
}

impl NetworkIdleLatch {
    /// Record one lifecycle event by name.
    pub fn observe(&self, name: &str) {
        if name == "networkIdle" {
            self.idle.store(true, Ordering::SeqCst);
        }
    }

    /// Discard anything observed so far.
    pub fn arm(&self) {
        self.idle.store(false, Ordering::SeqCst);
    }

    /// Whether `networkIdle` was observed since the last [`arm`](Self::arm).
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }
}

/// Whether a storage read-back satisfies the expected value.
///
/// An absent key and inaccessible storage both read as `None` and count
/// as mismatches.
pub fn storage_value_matches(observed: Option<&str>, expected: &str) -> bool {
    observed == Some(expected)
}

/// How the resolved status was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDecision {
    /// Serialize the page and record this status.
    Serialize(u16),
    /// Skip serialization entirely; record this status with empty content.
    ShortCircuit(u16),
}

/// Resolve the effective HTTP status for a route.
///
/// Rules, in order:
/// 1. no captured response → short-circuit 400
/// 2. metadata-endpoint response → short-circuit 403, override ignored
/// 3. 304 normalizes to 200 (repeat same-origin visits hit the browser
///    cache)
/// 4. an in-page override applies only when the (normalized) status is 200
pub fn resolve_status(
    captured: Option<&CapturedResponse>,
    override_code: Option<u16>,
) -> StatusDecision {
    let Some(response) = captured else {
        return StatusDecision::ShortCircuit(400);
    };

    if response
        .metadata_flavor
        .as_deref()
        .is_some_and(|flavor| flavor == METADATA_FLAVOR_SENTINEL)
    {
        return StatusDecision::ShortCircuit(403);
    }

    let mut status = response.status;
    if status == 304 {
        status = 200;
    }
    if status == 200 {
        if let Some(code) = override_code {
            status = code;
        }
    }
    StatusDecision::Serialize(status)
}

// ============================================================================
// In-page scripts
// ============================================================================

/// Quote a string as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Script that writes every storage assertion and reads each key back,
/// returning whether all read-backs matched.
pub fn storage_seed_script(storage: &std::collections::BTreeMap<String, String>) -> String {
    let entries: Vec<String> = storage
        .iter()
        .map(|(k, v)| format!("[{}, {}]", js_string(k), js_string(v)))
        .collect();
    format!(
        "(() => {{\n\
         \x20 let ok = true;\n\
         \x20 try {{\n\
         \x20   for (const [key, value] of [{entries}]) {{\n\
         \x20     localStorage.setItem(key, value);\n\
         \x20     if (localStorage.getItem(key) !== value) {{ ok = false; }}\n\
         \x20   }}\n\
         \x20 }} catch (e) {{ ok = false; }}\n\
         \x20 return ok;\n\
         }})()",
        entries = entries.join(", ")
    )
}

/// Script reading one storage key, `null` when absent or inaccessible.
pub fn storage_read_script(key: &str) -> String {
    format!(
        "(() => {{ try {{ return localStorage.getItem({}); }} catch (e) {{ return null; }} }})()",
        js_string(key)
    )
}

/// Script injecting a `<base>` element pointing at `origin`, patching an
/// existing relative base instead of duplicating it.
///
/// This has no effect on the serialized output's standalone correctness
/// but lets relative resources resolve during any verification render.
pub fn base_inject_script(origin: &str) -> String {
    format!(
        "(() => {{\n\
         \x20 const origin = {origin};\n\
         \x20 const bases = document.head.querySelectorAll('base');\n\
         \x20 if (bases.length) {{\n\
         \x20   const existing = bases[0].getAttribute('href') || '';\n\
         \x20   if (existing.startsWith('/')) {{\n\
         \x20     bases[0].setAttribute('href', origin + existing);\n\
         \x20   }}\n\
         \x20 }} else {{\n\
         \x20   const base = document.createElement('base');\n\
         \x20   base.setAttribute('href', origin);\n\
         \x20   document.head.insertAdjacentElement('afterbegin', base);\n\
         \x20 }}\n\
         }})()",
        origin = js_string(origin)
    )
}

/// Script checking that the readiness marker is present and visible:
/// attached to the document, not `display: none` or `visibility: hidden`,
/// and laid out with a non-empty box.
pub fn ready_visible_script(selector: &str) -> String {
    format!(
        "(() => {{\n\
         \x20 const el = document.querySelector({selector});\n\
         \x20 if (!el) return false;\n\
         \x20 const style = window.getComputedStyle(el);\n\
         \x20 if (style.display === 'none' || style.visibility === 'hidden') return false;\n\
         \x20 const rect = el.getBoundingClientRect();\n\
         \x20 return rect.width > 0 && rect.height > 0;\n\
         }})()",
        selector = js_string(selector)
    )
}

/// Script inserting the visible `prerendered` marker as the first child of
/// `<body>`.
pub const TAG_SCRIPT: &str = "(() => {\n\
      const div = document.createElement('div');\n\
      div.textContent = 'prerendered';\n\
      document.body.insertBefore(div, document.body.firstChild);\n\
    })()";

/// Script reading the in-page status override marker, `null` when absent.
pub const STATUS_OVERRIDE_SCRIPT: &str = "(() => {\n\
      const el = document.querySelector('meta[name=\"render:status_code\"]');\n\
      if (!el) return null;\n\
      const code = parseInt(el.getAttribute('content') || '', 10);\n\
      return Number.isNaN(code) ? null : code;\n\
    })()";

/// Select the user agent for this run.
pub fn user_agent(mobile: bool) -> &'static str {
    if mobile {
        MOBILE_USER_AGENT
    } else {
        DESKTOP_USER_AGENT
    }
}

// ============================================================================
// Renderer
// ============================================================================

/// Drives the per-route state machine against one browser session.
pub struct Renderer<'a> {
    session: &'a BrowserSession,
    config: &'a PrerenderConfig,
    /// Scheme + host (+ port) the local server is reachable at.
    base_url: String,
}

impl<'a> Renderer<'a> {
    /// Create a renderer for `session` serving at `base_url`
    /// (e.g. `http://127.0.0.1:5050`).
    pub fn new(session: &'a BrowserSession, config: &'a PrerenderConfig, base_url: String) -> Self {
        Self {
            session,
            config,
            base_url,
        }
    }

    /// Render one route to a [`RenderResult`].
    ///
    /// Opens a fresh tab, runs the state machine, and closes the tab on
    /// every path. Errors returned here are per-route; the pipeline logs
    /// and contains them.
    pub fn render(&self, route: &str) -> Result<RenderResult> {
        let url = format!("{}{}", self.base_url, route);
        log::info!("rendering {}", url);

        let tab = self.session.new_tab()?;
        let outcome = self.render_in_tab(&tab, &url);
        close_tab_safely(&tab);
        outcome
    }

    fn render_in_tab(&self, tab: &Arc<Tab>, url: &str) -> Result<RenderResult> {
        let started = Instant::now();
        tab.set_default_timeout(self.config.navigation_timeout);

        tab.set_user_agent(user_agent(self.config.mobile), None, None)
            .map_err(|e| PrerenderError::Page(format!("failed to set user agent: {}", e)))?;

        self.attach_console_relay(tab, url);
        let response_slot = self.attach_response_capture(tab)?;
        let network_idle = self.attach_network_idle_flag(tab)?;

        // Pre-seed storage before the application can boot.
        self.preseed_storage(tab, url);

        // A replayed about:blank lifecycle state may already have latched;
        // arm so only the route's own navigation counts.
        network_idle.arm();

        // Navigating: degraded outcomes keep whatever the slot captured.
        match tab.navigate_to(url).and_then(|t| t.wait_until_navigated()) {
            Ok(_) => {
                self.wait_for_network_idle(&network_idle, started, url);
            }
            Err(e) => {
                log::warn!("navigation degraded for {}: {}", url, e);
            }
        }

        // ReadinessWait: timeout logged, never fatal, response kept.
        if let Some(selector) = &self.config.ready_selector {
            self.wait_for_ready_marker(tab, selector, url);
        }

        // Verifying: sequenced, awaited read per key.
        self.verify_storage(tab, url);

        let captured = response_slot.lock().ok().and_then(|guard| guard.clone());
        if captured.is_none() {
            log::error!("no response captured for {}", url);
        }
        let override_code = self.read_status_override(tab);

        let status = match resolve_status(captured.as_ref(), override_code) {
            StatusDecision::ShortCircuit(status) => {
                if status == 403 {
                    log::warn!("metadata endpoint response for {}; refusing to serialize", url);
                }
                return Ok(RenderResult {
                    status,
                    content: String::new(),
                });
            }
            StatusDecision::Serialize(status) => status,
        };

        self.inject_base_href(tab, url);

        if self.config.tag_output {
            if let Err(e) = tab.evaluate(TAG_SCRIPT, false) {
                log::warn!("failed to insert prerender tag on {}: {}", url, e);
            }
        }

        // Serializing: outer HTML of the document root.
        let content = tab
            .get_content()
            .map_err(|e| PrerenderError::Page(format!("failed to serialize {}: {}", url, e)))?;

        log::info!(
            "rendered {} (status {}, {} bytes, {:?})",
            url,
            status,
            content.len(),
            started.elapsed()
        );
        Ok(RenderResult { status, content })
    }

    /// Forward the page's own logging output onto the pipeline's logger.
    ///
    /// The subscription is scoped to the tab and detaches when the tab
    /// closes.
    fn attach_console_relay(&self, tab: &Arc<Tab>, url: &str) {
        if let Err(e) = tab.enable_log() {
            log::debug!("console relay unavailable for {}: {}", url, e);
            return;
        }
        let relay_url = url.to_string();
        let result = tab.add_event_listener(Arc::new(move |event: &Event| {
            if let Event::LogEntryAdded(entry) = event {
                let entry = &entry.params.entry;
                log::debug!(
                    "browser [{:?}] {}: {}",
                    entry.level,
                    relay_url,
                    entry.text
                );
            }
        }));
        if let Err(e) = result {
            log::debug!("console relay listener failed for {}: {}", url, e);
        }
    }

    /// Install the single-assignment first-response capture.
    fn attach_response_capture(
        &self,
        tab: &Arc<Tab>,
    ) -> Result<Arc<Mutex<Option<CapturedResponse>>>> {
        let slot: Arc<Mutex<Option<CapturedResponse>>> = Arc::new(Mutex::new(None));
        let handler_slot = Arc::clone(&slot);

        tab.register_response_handling(
            "first-response",
            Box::new(move |params, _fetch_body| {
                let Ok(mut guard) = handler_slot.lock() else {
                    return;
                };
                if guard.is_some() {
                    // First response wins; later events for the same
                    // navigation are ignored.
                    return;
                }
                match serde_json::to_value(&params.response) {
                    Ok(value) => {
                        if let Some(captured) = CapturedResponse::from_json(&value) {
                            log::trace!("captured first response: status {}", captured.status);
                            *guard = Some(captured);
                        }
                    }
                    Err(e) => log::debug!("unreadable network response payload: {}", e),
                }
            }),
        )
        .map_err(|e| PrerenderError::Page(format!("failed to register response capture: {}", e)))?;

        Ok(slot)
    }

    /// Enable lifecycle events and expose a latch set on `networkIdle`.
    ///
    /// The caller must [`arm`](NetworkIdleLatch::arm) the latch right
    /// before navigating; see [`NetworkIdleLatch`].
    fn attach_network_idle_flag(&self, tab: &Arc<Tab>) -> Result<NetworkIdleLatch> {
        tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })
            .map_err(|e| {
                PrerenderError::Page(format!("failed to enable lifecycle events: {}", e))
            })?;

        let latch = NetworkIdleLatch::default();
        let observer = latch.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| {
            if let Event::PageLifecycleEvent(lifecycle) = event {
                observer.observe(&lifecycle.params.name);
            }
        }))
        .map_err(|e| PrerenderError::Page(format!("failed to attach lifecycle listener: {}", e)))?;

        Ok(latch)
    }

    /// Wait out the remaining navigation budget for network quiescence.
    fn wait_for_network_idle(&self, latch: &NetworkIdleLatch, started: Instant, url: &str) {
        let deadline = started + self.config.navigation_timeout;
        while Instant::now() < deadline {
            if latch.is_idle() {
                log::debug!("network idle on {} after {:?}", url, started.elapsed());
                return;
            }
            std::thread::sleep(NETWORK_IDLE_POLL_INTERVAL);
        }
        log::warn!(
            "network did not go idle on {} within {:?}; proceeding with partial render",
            url,
            self.config.navigation_timeout
        );
    }

    /// Wait for the readiness marker to be visibly rendered, polling
    /// within the readiness budget. Mere DOM presence is not enough; the
    /// element must have a laid-out, non-hidden box. Timeout is logged,
    /// never fatal.
    fn wait_for_ready_marker(&self, tab: &Arc<Tab>, selector: &str, url: &str) {
        let script = ready_visible_script(selector);
        let deadline = Instant::now() + self.config.ready_timeout;
        while Instant::now() < deadline {
            let visible = tab
                .evaluate(&script, false)
                .ok()
                .and_then(|r| r.value)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if visible {
                log::debug!("readiness marker {} visible on {}", selector, url);
                return;
            }
            std::thread::sleep(READY_MARKER_POLL_INTERVAL);
        }
        log::warn!(
            "readiness marker {} not visible on {} within {:?}",
            selector,
            url,
            self.config.ready_timeout
        );
    }

    /// Pre-seed storage assertions: register an on-new-document writer so
    /// the values exist when the application boots on the target origin,
    /// and run an immediate write + read-back on the current document.
    /// Mismatches are logged, never fatal at this stage.
    fn preseed_storage(&self, tab: &Arc<Tab>, url: &str) {
        if self.config.storage.is_empty() {
            return;
        }
        let script = storage_seed_script(&self.config.storage);

        if let Err(e) = tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: script.clone(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        }) {
            log::warn!("failed to register storage seed script for {}: {}", url, e);
        }

        match tab.evaluate(&script, false) {
            Ok(result) => {
                let confirmed = result.value.and_then(|v| v.as_bool()).unwrap_or(false);
                if confirmed {
                    log::debug!("storage keys seeded for {}", url);
                } else {
                    log::warn!("storage pre-seed read-back mismatch for {}", url);
                }
            }
            Err(e) => log::warn!("storage pre-seed not evaluable for {}: {}", url, e),
        }
    }

    /// Re-read every storage assertion after navigation, one awaited
    /// evaluation per key, in key order.
    fn verify_storage(&self, tab: &Arc<Tab>, url: &str) {
        for (key, expected) in &self.config.storage {
            let observed = tab
                .evaluate(&storage_read_script(key), false)
                .ok()
                .and_then(|r| r.value)
                .and_then(|v| v.as_str().map(str::to_string));

            if storage_value_matches(observed.as_deref(), expected) {
                log::debug!("storage check {} = {:?} ok on {}", key, expected, url);
            } else {
                log::warn!(
                    "storage mismatch on {}: key {} expected {:?}, observed {:?}",
                    url,
                    key,
                    expected,
                    observed
                );
            }
        }
    }

    /// Read the in-page status override marker, if any.
    fn read_status_override(&self, tab: &Arc<Tab>) -> Option<u16> {
        tab.evaluate(STATUS_OVERRIDE_SCRIPT, false)
            .ok()
            .and_then(|r| r.value)
            .and_then(|v| v.as_u64())
            .and_then(|code| u16::try_from(code).ok())
    }

    /// Inject (or patch) the `<base>` element at the route's origin.
    fn inject_base_href(&self, tab: &Arc<Tab>, url: &str) {
        let origin = match url::Url::parse(url) {
            Ok(parsed) => parsed.origin().ascii_serialization(),
            Err(e) => {
                log::warn!("cannot derive origin of {}: {}", url, e);
                return;
            }
        };
        if let Err(e) = tab.evaluate(&base_inject_script(&origin), false) {
            log::warn!("base injection failed for {}: {}", url, e);
        }
    }
}

/// Close a tab, tolerating failure.
///
/// The snapshot (or short-circuit result) is already decided by the time
/// this runs; a close failure only means Chrome will reap the target when
/// the session ends.
fn close_tab_safely(tab: &Arc<Tab>) {
    if let Err(e) = tab.close(true) {
        log::warn!("failed to close tab (session teardown will reap it): {}", e);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
