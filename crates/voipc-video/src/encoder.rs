//! Software H.264 encoder wrapping FFmpeg's `libx264`, tuned for real-time
//! screen share rather than offline quality: frequent keyframes for loss
//! recovery, no B-frames so there's no reference reordering latency, and
//! repeated SPS/PPS so a mid-stream-joining viewer can resync on any
//! keyframe rather than waiting for the session's very first one.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, encoder};
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Dictionary, Rational};
use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("failed to initialize FFmpeg");
    });
}

/// Group-of-pictures size: a keyframe at least every 10 frames bounds how
/// long a viewer stays undecodable after any single lost frame.
const GOP_SIZE: u32 = 10;

/// An encoded H.264 access unit as handed to the packetizer.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
    pub pts: i64,
}

/// Software H.264 encoder (`libx264`, `ultrafast`/`zerolatency`).
///
/// `width`/`height` must already be even (see [`crate::round_down_even`]);
/// the caller closes and reopens this encoder on any resolution change.
pub struct Encoder {
    encoder: encoder::Video,
    width: u32,
    height: u32,
    frame_index: i64,
}

// SAFETY: the FFmpeg encoder context holds raw pointers and isn't Send by
// default, but every call into it happens from the single video encoder
// worker thread that owns this value.
unsafe impl Send for Encoder {}

impl Encoder {
    /// Open a new encoder for `width`x`height` at `fps`, targeting
    /// `bitrate_bps` bits per second (see [`crate::bitrate_for_resolution`]).
    pub fn new(width: u32, height: u32, fps: u32, bitrate_bps: u64) -> Result<Self> {
        if width % 2 != 0 || height % 2 != 0 {
            return Err(anyhow!(
                "H.264 encoder: width and height must be even (got {width}x{height})"
            ));
        }

        init_ffmpeg();

        let codec = encoder::find_by_name("libx264")
            .ok_or_else(|| anyhow!("libx264 codec not found (is FFmpeg built with x264?)"))?;

        let mut enc = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("failed to create H.264 encoder context")?;

        enc.set_width(width);
        enc.set_height(height);
        enc.set_format(Pixel::YUV420P);
        enc.set_time_base(Rational::new(1, fps as i32));
        enc.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        enc.set_bit_rate(bitrate_bps as usize);
        enc.set_max_b_frames(0);
        enc.set_gop(GOP_SIZE);

        let mut opts = Dictionary::new();
        opts.set("preset", "ultrafast");
        opts.set("tune", "zerolatency");
        opts.set("repeat_headers", "1");

        let enc = enc
            .open_with(opts)
            .context("libx264: failed to open encoder")?;

        Ok(Self {
            encoder: enc,
            width,
            height,
            frame_index: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encode an I420 frame (Y + U + V planes, `width*height*3/2` bytes).
    /// `force_keyframe` is set on the new-viewer handshake so the next
    /// emitted frame carries an IDR with SPS/PPS.
    pub fn encode(&mut self, i420_data: &[u8], force_keyframe: bool) -> Result<Vec<EncodedFrame>> {
        let expected_size = self.width as usize * self.height as usize * 3 / 2;
        if i420_data.len() < expected_size {
            return Err(anyhow!(
                "H.264 encoder: I420 data too short (got {}, expected {})",
                i420_data.len(),
                expected_size
            ));
        }

        let mut frame = Video::new(Pixel::YUV420P, self.width, self.height);
        let pts = self.frame_index;
        frame.set_pts(Some(pts));
        frame.set_kind(if force_keyframe {
            ffmpeg::picture::Type::I
        } else {
            ffmpeg::picture::Type::None
        });

        copy_i420_into_frame(i420_data, self.width as usize, self.height as usize, &mut frame);

        self.encoder
            .send_frame(&frame)
            .context("H.264 encoder: failed to send frame")?;
        self.frame_index += 1;

        self.drain()
    }

    fn drain(&mut self) -> Result<Vec<EncodedFrame>> {
        let mut frames = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            frames.push(EncodedFrame {
                data: packet.data().unwrap_or(&[]).to_vec(),
                is_keyframe: packet.is_key(),
                pts: packet.pts().unwrap_or(self.frame_index),
            });
        }
        Ok(frames)
    }
}

fn copy_i420_into_frame(i420: &[u8], width: usize, height: usize, frame: &mut Video) {
    let uv_w = width.div_ceil(2);
    let uv_h = height.div_ceil(2);
    let y_size = width * height;
    let uv_size = uv_w * uv_h;

    let y_stride = frame.stride(0);
    let y_dst = frame.data_mut(0);
    for row in 0..height {
        let src = row * width;
        let dst = row * y_stride;
        y_dst[dst..dst + width].copy_from_slice(&i420[src..src + width]);
    }

    let u_stride = frame.stride(1);
    let u_dst = frame.data_mut(1);
    let u_base = y_size;
    for row in 0..uv_h {
        let src = u_base + row * uv_w;
        let dst = row * u_stride;
        u_dst[dst..dst + uv_w].copy_from_slice(&i420[src..src + uv_w]);
    }

    let v_stride = frame.stride(2);
    let v_dst = frame.data_mut(2);
    let v_base = y_size + uv_size;
    for row in 0..uv_h {
        let src = v_base + row * uv_w;
        let dst = row * v_stride;
        v_dst[dst..dst + uv_w].copy_from_slice(&i420[src..src + uv_w]);
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        let _ = self.encoder.send_eof();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::nal::is_keyframe_unit;

    fn gray_i420(width: u32, height: u32) -> Vec<u8> {
        let y_size = (width * height) as usize;
        let uv_size = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        vec![128u8; y_size + 2 * uv_size]
    }

    #[test]
    fn encoder_rejects_odd_dimensions() {
        assert!(Encoder::new(641, 480, 30, 1_000_000).is_err());
    }

    #[test]
    fn encoder_opens_with_even_dimensions() {
        let enc = Encoder::new(640, 480, 30, 1_000_000).unwrap();
        assert_eq!((enc.width(), enc.height()), (640, 480));
    }

    #[test]
    fn forced_keyframe_produces_idr_with_start_code() {
        let mut enc = Encoder::new(64, 64, 30, 500_000).unwrap();
        let frames = enc.encode(&gray_i420(64, 64), true).unwrap();
        assert!(!frames.is_empty());
        assert!(frames[0].is_keyframe);
        assert!(is_keyframe_unit(&frames[0].data));
    }

    #[test]
    fn encode_decode_roundtrip_preserves_gray_level() {
        let mut enc = Encoder::new(64, 64, 30, 500_000).unwrap();
        let i420 = gray_i420(64, 64);
        let encoded = enc.encode(&i420, true).unwrap();
        assert!(!encoded.is_empty());

        let mut dec = Decoder::new().unwrap();
        let decoded = dec.decode(&encoded[0].data).unwrap();
        assert!(!decoded.is_empty());
        assert_eq!((decoded[0].width, decoded[0].height), (64, 64));

        let y_size = 64 * 64;
        let avg: f64 = decoded[0].i420_data[..y_size]
            .iter()
            .map(|&b| b as f64)
            .sum::<f64>()
            / y_size as f64;
        assert!(avg > 100.0 && avg < 160.0, "decoded gray level {avg} drifted too far from 128");
    }
}
