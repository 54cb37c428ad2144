//! The embedded WebSocket broadcaster (a secondary, browser-facing mirror of
//! the encoded video stream) is an external collaborator, out of scope for
//! this crate. This module is only the seam the video encoder worker pushes
//! encoded units through.

/// Receives every encoded video unit as it's produced, alongside whether it
/// carries a keyframe (a WebSocket client attaching mid-stream needs to wait
/// for one, the same as the UDP viewer does).
pub trait FrameBroadcast: Send {
    fn broadcast(&mut self, encoded: &[u8], is_keyframe: bool);
}

/// Default for binaries that don't wire up a broadcaster.
pub struct NoopBroadcast;

impl FrameBroadcast for NoopBroadcast {
    fn broadcast(&mut self, _encoded: &[u8], _is_keyframe: bool) {}
}
