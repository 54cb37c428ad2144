use anyhow::Result;
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Bitrate, Channels, SampleRate};

use crate::{OPUS_BITRATE, OPUS_COMPLEXITY, OPUS_FRAME_SIZE, OPUS_SAMPLE_RATE};

/// Max encoded packet size. libopus recommends 4000 bytes as a generous
/// upper bound; real packets at 128kbps/20ms land far below this.
const ENCODE_BUFFER_SIZE: usize = 4000;

/// Wraps the Opus encoder configured for stereo screen-share audio.
pub struct Encoder {
    inner: OpusEncoder,
}

impl Encoder {
    /// Create a new Opus encoder: 48kHz stereo, `Application::Audio` (tuned
    /// for music/general audio rather than voice), 128kbps, complexity 5.
    pub fn new() -> Result<Self> {
        let mut encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)?;
        encoder.set_bitrate(Bitrate::BitsPerSecond(OPUS_BITRATE))?;
        encoder.set_complexity(OPUS_COMPLEXITY)?;
        Ok(Self { inner: encoder })
    }

    /// Encode one 20ms frame of interleaved stereo PCM f32 samples.
    ///
    /// `pcm` must contain exactly `OPUS_FRAME_SIZE * 2` interleaved samples
    /// (960 samples per channel).
    pub fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>> {
        assert_eq!(
            pcm.len(),
            OPUS_FRAME_SIZE * 2,
            "PCM frame must be exactly {} interleaved stereo samples",
            OPUS_FRAME_SIZE * 2
        );

        let mut output = vec![0u8; ENCODE_BUFFER_SIZE];
        let len = self.inner.encode_float(pcm, &mut output)?;
        output.truncate(len);
        Ok(output)
    }

    pub fn frame_size(&self) -> usize {
        OPUS_FRAME_SIZE
    }

    pub fn sample_rate(&self) -> u32 {
        OPUS_SAMPLE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_silent_frame_to_nonempty_packet() {
        let mut encoder = Encoder::new().unwrap();
        let pcm = vec![0.0f32; OPUS_FRAME_SIZE * 2];
        let packet = encoder.encode(&pcm).unwrap();
        assert!(!packet.is_empty());
        assert!(packet.len() <= ENCODE_BUFFER_SIZE);
    }

    #[test]
    #[should_panic(expected = "exactly")]
    fn rejects_wrong_frame_length() {
        let mut encoder = Encoder::new().unwrap();
        let pcm = vec![0.0f32; 100];
        let _ = encoder.encode(&pcm);
    }
}
