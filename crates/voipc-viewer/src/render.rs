//! GL rendering and any on-screen overlay are external collaborators out of
//! scope for the core (§1): the real implementation owns a window and a
//! texture upload path this crate doesn't have. This module is the
//! demonstration [`FrameSink`](voipc_session::render::FrameSink) that lets the
//! binary run end to end — it logs the frames it receives rather than
//! drawing them.

use std::time::Duration;

use tracing::info;
use voipc_session::pacing::RateLimiter;
use voipc_session::render::{DisplayFrame, FrameSink};

/// Logs one line per presented frame, rate-limited so a 60fps stream doesn't
/// flood the log.
pub struct LoggingFrameSink {
    limiter: RateLimiter,
    frames_seen: u64,
}

impl LoggingFrameSink {
    pub fn new() -> Self {
        Self {
            limiter: RateLimiter::new(Duration::from_secs(1)),
            frames_seen: 0,
        }
    }
}

impl Default for LoggingFrameSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for LoggingFrameSink {
    fn present(&mut self, frame: &DisplayFrame) {
        self.frames_seen += 1;
        if self.limiter.allow() {
            info!(
                width = frame.width,
                height = frame.height,
                frames_seen = self.frames_seen,
                "presenting frame"
            );
        }
    }
}
