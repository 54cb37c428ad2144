//! Screen/window capture is an external collaborator (out of scope: capture
//! itself, camera-portal permission acquisition, the OS window layer). This
//! module defines only the interface the sender's control thread polls.

/// One captured video frame. Borrowed from the capture collaborator's
/// internal ring buffer; valid only until the next [`CaptureSource::poll`].
pub struct CapturedFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub i420_data: &'a [u8],
}

/// Drives a capture event loop and exposes the latest frame. The host binary
/// supplies the real implementation (platform screen capture); this crate
/// ships no default backend.
pub trait CaptureSource: Send {
    /// Pump the capture event loop once. Cheap to call every control-thread
    /// tick.
    fn poll(&mut self);

    /// The most recently captured frame, if any new one has arrived since
    /// the last call.
    fn get_frame(&mut self) -> Option<CapturedFrame<'_>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A capture source that hands out one fixed-size gray frame forever —
    /// exercises the resolution-change and steady-state encode paths
    /// without a real capture backend.
    pub struct StaticCapture {
        pub width: u32,
        pub height: u32,
        frame: Vec<u8>,
    }

    impl StaticCapture {
        pub fn new(width: u32, height: u32) -> Self {
            let y = (width * height) as usize;
            let uv = (width.div_ceil(2) * height.div_ceil(2)) as usize;
            Self {
                width,
                height,
                frame: vec![128u8; y + 2 * uv],
            }
        }
    }

    impl CaptureSource for StaticCapture {
        fn poll(&mut self) {}

        fn get_frame(&mut self) -> Option<CapturedFrame<'_>> {
            Some(CapturedFrame {
                width: self.width,
                height: self.height,
                i420_data: &self.frame,
            })
        }
    }
}
