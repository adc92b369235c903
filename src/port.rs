//! Local port allocation for the static file server.
//!
//! When the configuration supplies a port it is used verbatim, with no
//! probing; the caller is trusted to have reserved it. Otherwise a bounded
//! range of candidates starting at [`BASE_PORT`] is probed by binding and
//! immediately releasing a listener; the first bindable candidate wins.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::error::{PrerenderError, Result};

/// First candidate port probed when no explicit port is supplied.
pub const BASE_PORT: u16 = 5050;

/// Number of candidate ports probed before giving up.
pub const PROBE_RANGE: u16 = 100;

/// Pick a usable local port.
///
/// Returns `explicit` unchanged when given. Otherwise probes
/// `BASE_PORT..BASE_PORT + PROBE_RANGE` and returns the first port that can
/// be bound and released. The probe has no side effects beyond the
/// transient bind.
///
/// # Errors
///
/// [`PrerenderError::PortUnavailable`] when the entire probe range is
/// exhausted.
///
/// # Example
///
/// ```rust
/// use spa_prerender::port;
///
/// // Explicit port is passed through without probing.
/// assert_eq!(port::allocate(Some(3000)).unwrap(), 3000);
///
/// // Otherwise the allocator finds a bindable port in the probe range.
/// let p = port::allocate(None).unwrap();
/// assert!(p >= port::BASE_PORT && p < port::BASE_PORT + port::PROBE_RANGE);
/// ```
pub fn allocate(explicit: Option<u16>) -> Result<u16> {
    if let Some(port) = explicit {
        log::debug!("using externally supplied port {}", port);
        return Ok(port);
    }

    for candidate in BASE_PORT..BASE_PORT + PROBE_RANGE {
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, candidate);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Release immediately; the server process binds it next.
                drop(listener);
                log::debug!("allocated port {} after probe", candidate);
                return Ok(candidate);
            }
            Err(e) => {
                log::trace!("port {} unavailable: {}", candidate, e);
            }
        }
    }

    Err(PrerenderError::PortUnavailable {
        start: BASE_PORT,
        count: PROBE_RANGE,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_port_returned_unchanged() {
        // No probing happens: even an absurd value is passed through.
        assert_eq!(allocate(Some(1)).unwrap(), 1);
        assert_eq!(allocate(Some(65535)).unwrap(), 65535);
    }

    #[test]
    fn test_probe_finds_bindable_port() {
        let port = allocate(None).expect("probe range should contain a free port");
        assert!((BASE_PORT..BASE_PORT + PROBE_RANGE).contains(&port));

        // The returned port must actually be bindable afterwards.
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        TcpListener::bind(addr).expect("allocated port should be bindable");
    }

    #[test]
    fn test_probe_skips_occupied_port() {
        // Occupy the base port, then allocate: the result must differ.
        let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, BASE_PORT);
        if let Ok(_guard) = TcpListener::bind(addr) {
            let port = allocate(None).unwrap();
            assert_ne!(port, BASE_PORT);
        }
        // If BASE_PORT was already taken by another process the premise
        // still holds; nothing further to assert.
    }
}
