//! Stereo Opus codec wrappers, the audio jitter buffer, and cpal-based
//! capture/playback demonstration backends.

pub mod capture;
pub mod decoder;
pub mod device;
pub mod encoder;
pub mod jitter;
pub mod playback;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use jitter::JitterBuffer;

/// Fixed audio format for the whole pipeline: 48kHz stereo S16LE-equivalent
/// f32 samples, 20ms frames.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: usize = 2;
pub const OPUS_FRAME_SIZE: usize = 960;
pub const OPUS_BITRATE: i32 = 128_000;
pub const OPUS_COMPLEXITY: i32 = 5;
