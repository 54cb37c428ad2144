//! Decoded-frame double buffer (written by the video decoder worker, read by
//! the control/render thread) and the presentation seam. GL rendering and
//! the overlay menu are external collaborators (out of scope); this module
//! only defines the mutex-protected handoff and the trait the render thread
//! calls into.

use std::sync::{Arc, Mutex};

/// The latest decoded frame available for display.
#[derive(Clone)]
pub struct DisplayFrame {
    pub width: u32,
    pub height: u32,
    pub i420_data: Arc<Vec<u8>>,
}

/// Single-slot mutex-protected handoff: the decoder worker calls `set` on
/// every decoded frame, the render thread calls `get` each tick. Cleared on
/// stream timeout so a stale frame doesn't linger on screen.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<DisplayFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, frame: DisplayFrame) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }

    pub fn get(&self) -> Option<DisplayFrame> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Presents a decoded frame. The real implementation (GL texture upload,
/// IMGUI-style overlay) lives outside this crate's scope; the viewer binary
/// supplies it.
pub trait FrameSink: Send {
    fn present(&mut self, frame: &DisplayFrame);
}

/// Does nothing — used by callers that only care about the pipeline's
/// network/decode behavior, not actual presentation.
pub struct NoopFrameSink;

impl FrameSink for NoopFrameSink {
    fn present(&mut self, _frame: &DisplayFrame) {}
}
