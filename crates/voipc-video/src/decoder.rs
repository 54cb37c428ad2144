//! Software H.264 decoder wrapping FFmpeg. The decoder itself has no notion
//! of the wire protocol's keyframe gating — that lives in the receiver
//! pipeline, which withholds packets from this decoder until it has seen an
//! IDR/SPS/PPS unit (see [`crate::nal::is_keyframe_unit`]).

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::codec::{self, decoder};
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video;
use std::sync::Once;

static FFMPEG_INIT: Once = Once::new();

fn init_ffmpeg() {
    FFMPEG_INIT.call_once(|| {
        ffmpeg::init().expect("failed to initialize FFmpeg");
    });
}

/// A decoded frame in I420 (Y + U + V planar) format.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub i420_data: Vec<u8>,
}

/// Software H.264 decoder. One instance per incoming video stream.
pub struct Decoder {
    decoder: decoder::Video,
}

// SAFETY: raw FFmpeg pointers inside; only ever touched from the video
// decoder worker thread that owns this value.
unsafe impl Send for Decoder {}

impl Decoder {
    pub fn new() -> Result<Self> {
        init_ffmpeg();

        let codec = decoder::find(codec::Id::H264)
            .ok_or_else(|| anyhow!("H.264 decoder: H264 codec not found"))?;

        let decoder = codec::context::Context::new_with_codec(codec)
            .decoder()
            .open_as(codec)
            .context("H.264 decoder: failed to open decoder")?
            .video()?;

        Ok(Self { decoder })
    }

    /// Feed one Annex-B access unit. Returns zero or more decoded frames —
    /// FFmpeg may buffer internally before yielding the first one.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<DecodedFrame>> {
        let packet = ffmpeg::Packet::copy(data);
        self.decoder
            .send_packet(&packet)
            .context("H.264 decoder: failed to send packet")?;

        let mut frames = Vec::new();
        let mut decoded = Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let width = decoded.width();
            let height = decoded.height();
            let i420_data = if decoded.format() == Pixel::YUV420P {
                extract_i420(&decoded)
            } else {
                convert_to_i420(&decoded)?
            };
            frames.push(DecodedFrame { width, height, i420_data });
        }
        Ok(frames)
    }
}

fn extract_i420(frame: &Video) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let y_size = width * height;
    let uv_w = width.div_ceil(2);
    let uv_h = height.div_ceil(2);
    let uv_size = uv_w * uv_h;

    let mut out = Vec::with_capacity(y_size + 2 * uv_size);

    let y_stride = frame.stride(0);
    let y_plane = frame.data(0);
    for row in 0..height {
        let start = row * y_stride;
        out.extend_from_slice(&y_plane[start..start + width]);
    }

    let u_stride = frame.stride(1);
    let u_plane = frame.data(1);
    for row in 0..uv_h {
        let start = row * u_stride;
        out.extend_from_slice(&u_plane[start..start + uv_w]);
    }

    let v_stride = frame.stride(2);
    let v_plane = frame.data(2);
    for row in 0..uv_h {
        let start = row * v_stride;
        out.extend_from_slice(&v_plane[start..start + uv_w]);
    }

    out
}

fn convert_to_i420(frame: &Video) -> Result<Vec<u8>> {
    let width = frame.width();
    let height = frame.height();

    let mut scaler = ffmpeg::software::scaling::context::Context::get(
        frame.format(),
        width,
        height,
        Pixel::YUV420P,
        width,
        height,
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .context("H.264 decoder: failed to create scaler context")?;

    let mut out_frame = Video::empty();
    scaler
        .run(frame, &mut out_frame)
        .context("H.264 decoder: failed to convert to I420")?;

    Ok(extract_i420(&out_frame))
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.decoder.send_eof();
        let mut frame = Video::empty();
        while self.decoder.receive_frame(&mut frame).is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_opens() {
        assert!(Decoder::new().is_ok());
    }
}
