//! Peer-address discovery via inbound PUNCH packets (§4.8). The host and the
//! viewer treat a freshly observed source address differently: the host
//! requires the address to actually *change* before reacting (a new viewer
//! attaching, or a NAT remapping), while the viewer simply trusts whatever
//! the last packet said, since it has no notion of "attach" of its own.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

type SharedAddr = Arc<Mutex<Option<SocketAddr>>>;

/// Host-side: the one attached viewer's address, if any has been observed
/// yet. [`ViewerAddress::observe`] reports whether the address just changed,
/// which the sender pipeline uses to force the next video frame to be a
/// keyframe so the (possibly new) viewer can start decoding immediately.
#[derive(Clone)]
pub struct ViewerAddress {
    inner: SharedAddr,
}

impl Default for ViewerAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerAddress {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// The underlying shared slot, for handing to a [`crate::transport::DestSink`].
    pub fn shared(&self) -> SharedAddr {
        self.inner.clone()
    }

    pub fn get(&self) -> Option<SocketAddr> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an inbound packet's source address. Returns `true` if it
    /// differs from whatever was previously recorded — including the very
    /// first observation, which always counts as a change.
    pub fn observe(&self, source: SocketAddr) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if *guard == Some(source) {
            false
        } else {
            *guard = Some(source);
            true
        }
    }
}

/// Viewer-side: the host's address, always overwritten with whatever source
/// the most recent inbound packet carried. Purely informational — tolerates
/// the host's address changing under a symmetric NAT without any special
/// "is this a new host" logic, since a viewer only ever talks to one host.
#[derive(Clone)]
pub struct HostAddress {
    inner: SharedAddr,
}

impl HostAddress {
    pub fn new(initial: SocketAddr) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(initial))),
        }
    }

    pub fn shared(&self) -> SharedAddr {
        self.inner.clone()
    }

    /// Always set (constructed with an initial address and never cleared).
    pub fn get(&self) -> SocketAddr {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .expect("HostAddress is always populated")
    }

    pub fn observe(&self, source: SocketAddr) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        ([127, 0, 0, 1], port).into()
    }

    #[test]
    fn viewer_address_adopts_first_observation() {
        let v = ViewerAddress::new();
        assert!(v.observe(addr(1000)));
        assert_eq!(v.get(), Some(addr(1000)));
    }

    #[test]
    fn viewer_address_ignores_repeated_source() {
        let v = ViewerAddress::new();
        assert!(v.observe(addr(1000)));
        assert!(!v.observe(addr(1000)));
    }

    #[test]
    fn viewer_address_adopts_differing_source() {
        let v = ViewerAddress::new();
        v.observe(addr(1000));
        assert!(v.observe(addr(2000)));
        assert_eq!(v.get(), Some(addr(2000)));
    }

    #[test]
    fn host_address_always_adopts_latest_source() {
        let h = HostAddress::new(addr(1000));
        assert_eq!(h.get(), addr(1000));
        h.observe(addr(3000));
        assert_eq!(h.get(), addr(3000));
        // Re-observing the same address is harmless, and intentionally not
        // reported as a change — the viewer has no "new host attached" event.
        h.observe(addr(3000));
        assert_eq!(h.get(), addr(3000));
    }
}
