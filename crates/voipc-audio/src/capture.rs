use anyhow::Result;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tracing::{error, info, warn};

use crate::device;
use crate::AUDIO_CHANNELS;

/// The sample rate Opus expects. We force the capture device to this rate
/// so samples match the encoder without resampling.
const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Handle to an active audio capture stream.
///
/// Captures interleaved stereo PCM f32 samples and writes them into a
/// lock-free ring buffer that the encoder thread reads from.
pub struct CaptureStream {
    stream: cpal::Stream,
    sample_rate: u32,
}

/// Size of the capture ring buffer in samples (~200ms at 48kHz stereo).
const CAPTURE_BUFFER_SIZE: usize = (48_000 / 5) * AUDIO_CHANNELS;

/// Start capturing audio from the given device (or default).
///
/// Returns the capture stream handle and a ring buffer consumer that
/// provides interleaved stereo PCM f32 samples, regardless of the
/// underlying device's channel count.
pub fn start_capture(
    device_name: Option<&str>,
) -> Result<(CaptureStream, ringbuf::HeapCons<f32>)> {
    let device = device::get_input_device(device_name)?;
    let config = device.default_input_config()?;
    let channels = config.channels() as usize;
    let sample_format = config.sample_format();

    let rb = HeapRb::<f32>::new(CAPTURE_BUFFER_SIZE);
    let (mut producer, consumer) = rb.split();

    let (stream_config, actual_rate) = {
        let fallback_rate = config.sample_rate().0;
        if fallback_rate == TARGET_SAMPLE_RATE {
            let cfg = StreamConfig {
                channels: config.channels(),
                sample_rate: cpal::SampleRate(TARGET_SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };
            (cfg, TARGET_SAMPLE_RATE)
        } else {
            let test = StreamConfig {
                channels: config.channels(),
                sample_rate: cpal::SampleRate(TARGET_SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };
            match device.build_input_stream(
                &test,
                |_: &[f32], _: &cpal::InputCallbackInfo| {},
                |_| {},
                None,
            ) {
                Ok(_dropped) => {
                    info!(
                        "device default is {}Hz, overriding to {}Hz",
                        fallback_rate, TARGET_SAMPLE_RATE
                    );
                    let cfg = StreamConfig {
                        channels: config.channels(),
                        sample_rate: cpal::SampleRate(TARGET_SAMPLE_RATE),
                        buffer_size: cpal::BufferSize::Default,
                    };
                    (cfg, TARGET_SAMPLE_RATE)
                }
                Err(_) => {
                    warn!(
                        "device does not support {}Hz, using default {}Hz — audio quality may be degraded",
                        TARGET_SAMPLE_RATE, fallback_rate
                    );
                    let cfg = StreamConfig {
                        channels: config.channels(),
                        sample_rate: config.sample_rate(),
                        buffer_size: cpal::BufferSize::Default,
                    };
                    (cfg, fallback_rate)
                }
            }
        }
    };

    info!(
        device = device.name().unwrap_or_default(),
        sample_rate = actual_rate,
        channels,
        "starting audio capture"
    );

    // The encoder always wants interleaved stereo: duplicate a mono source
    // across both channels, take the device's first two channels otherwise.
    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    for &sample in data {
                        let _ = producer.push_iter([sample, sample].into_iter());
                    }
                } else {
                    for chunk in data.chunks(channels) {
                        let _ = producer.push_iter([chunk[0], chunk[1]].into_iter());
                    }
                }
            },
            move |err| {
                error!("audio capture error: {}", err);
            },
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let to_f32 = |s: i16| s as f32 / i16::MAX as f32;
                if channels == 1 {
                    for &sample in data {
                        let s = to_f32(sample);
                        let _ = producer.push_iter([s, s].into_iter());
                    }
                } else {
                    for chunk in data.chunks(channels) {
                        let _ = producer
                            .push_iter([to_f32(chunk[0]), to_f32(chunk[1])].into_iter());
                    }
                }
            },
            move |err| {
                error!("audio capture error: {}", err);
            },
            None,
        )?,
        format => anyhow::bail!("unsupported sample format: {:?}", format),
    };

    stream.play()?;

    Ok((CaptureStream { stream, sample_rate: actual_rate }, consumer))
}

impl CaptureStream {
    /// The hardware sample rate of the capture device.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Pause the capture stream (e.g., when the source is muted).
    pub fn pause(&self) -> Result<()> {
        self.stream.pause()?;
        Ok(())
    }

    /// Resume the capture stream.
    pub fn play(&self) -> Result<()> {
        self.stream.play()?;
        Ok(())
    }
}
