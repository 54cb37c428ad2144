use anyhow::Result;
use audiopus::coder::Decoder as OpusDecoder;
use audiopus::packet::Packet;
use audiopus::{Channels, MutSignals, SampleRate};

/// libopus's maximum frame duration (120ms) bounds the decode buffer,
/// sized generously above the steady-state 960-sample/20ms frame this
/// pipeline actually produces.
const MAX_DECODE_SAMPLES_PER_CHANNEL: usize = 5760;

/// Wraps the Opus decoder. One decoder instance per incoming audio stream.
pub struct Decoder {
    inner: OpusDecoder,
}

impl Decoder {
    pub fn new() -> Result<Self> {
        let decoder = OpusDecoder::new(SampleRate::Hz48000, Channels::Stereo)?;
        Ok(Self { inner: decoder })
    }

    /// Decode an Opus packet into interleaved stereo PCM f32 samples.
    ///
    /// Returns `OPUS_FRAME_SIZE * 2` interleaved samples on the steady-state
    /// path. No forward-error-concealment is requested.
    pub fn decode(&mut self, opus_data: &[u8]) -> Result<Vec<f32>> {
        let mut output = vec![0.0f32; MAX_DECODE_SAMPLES_PER_CHANNEL * 2];
        let packet = Packet::try_from(opus_data)?;
        let signals = MutSignals::try_from(&mut output)?;
        let samples = self.inner.decode_float(Some(packet), signals, false)?;
        output.truncate(samples * 2);
        Ok(output)
    }
}
