//! Screen capture is an external collaborator out of scope for the core
//! (§1): the real implementation lives behind platform-specific portals and
//! GPU frame-grabbers this crate doesn't own. This module is the
//! demonstration backend that satisfies `voipc_session::capture::CaptureSource`
//! so the binary can actually run end to end — a moving test pattern in
//! place of a captured screen, generated at the configured fps.

use std::time::Duration;

use voipc_session::capture::{CapturedFrame, CaptureSource};
use voipc_session::pacing::Ticker;

/// I420 planar frame generator: a vertical bar sweeping left to right across
/// a mid-gray field, timed to the configured fps so the sender pipeline
/// sees a steady stream of "new" frames rather than re-encoding a static
/// image every control-thread tick.
pub struct SyntheticCapture {
    width: u32,
    height: u32,
    frame: Vec<u8>,
    ticker: Ticker,
    tick_count: u64,
    pending: bool,
}

impl SyntheticCapture {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let y_size = (width * height) as usize;
        let uv_size = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        Self {
            width,
            height,
            frame: vec![0u8; y_size + 2 * uv_size],
            ticker: Ticker::new(interval),
            tick_count: 0,
            pending: false,
        }
    }

    fn render(&mut self) {
        let (w, h) = (self.width as usize, self.height as usize);
        let y_size = w * h;
        let bar = (self.tick_count as usize * 4) % w.max(1);

        let (y_plane, uv_plane) = self.frame.split_at_mut(y_size);
        for row in 0..h {
            let line = &mut y_plane[row * w..(row + 1) * w];
            for (col, px) in line.iter_mut().enumerate() {
                *px = if col.abs_diff(bar) < 8 { 235 } else { 60 };
            }
        }
        uv_plane.fill(128);
    }
}

impl CaptureSource for SyntheticCapture {
    fn poll(&mut self) {
        if self.ticker.tick() {
            self.tick_count += 1;
            self.render();
            self.pending = true;
        }
    }

    fn get_frame(&mut self) -> Option<CapturedFrame<'_>> {
        if self.pending {
            self.pending = false;
            Some(CapturedFrame {
                width: self.width,
                height: self.height,
                i420_data: &self.frame,
            })
        } else {
            None
        }
    }
}
