use anyhow::Result;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;
use tracing::{error, info, warn};

use crate::device;
use crate::AUDIO_CHANNELS;

/// The sample rate Opus produces. We force the playback device to this rate
/// so decoded samples play back at the correct speed.
const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Handle to an active audio playback stream.
pub struct PlaybackStream {
    #[allow(dead_code)] // held to keep the stream alive
    stream: cpal::Stream,
    sample_rate: u32,
}

/// Size of the playback ring buffer in samples (~200ms at 48kHz stereo).
const PLAYBACK_BUFFER_SIZE: usize = (48_000 / 5) * AUDIO_CHANNELS;

/// Start playing audio through the given device (or default).
///
/// Returns the playback stream handle and a ring buffer producer that the
/// jitter buffer's consumer side writes interleaved stereo PCM into.
pub fn start_playback(
    device_name: Option<&str>,
) -> Result<(PlaybackStream, ringbuf::HeapProd<f32>)> {
    let device = device::get_output_device(device_name)?;
    let config = device.default_output_config()?;
    let channels = config.channels() as usize;

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
            match device.build_output_stream(
                &test,
                |_: &mut [f32], _: &cpal::OutputCallbackInfo| {},
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
        "starting audio playback"
    );

    let rb = HeapRb::<f32>::new(PLAYBACK_BUFFER_SIZE);
    let (producer, mut consumer) = rb.split();

    // The jitter buffer always produces interleaved stereo; fold down to
    // mono by averaging channel pairs if the output device itself is mono,
    // otherwise duplicate stereo across any additional device channels.
    let stream = match config.sample_format() {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if channels == 2 {
                    let read = consumer.pop_slice(data);
                    fade_and_silence(data, read);
                } else if channels == 1 {
                    let mono_frames = data.len();
                    let mut underrun_at = mono_frames;
                    let mut last = 0.0f32;
                    for (i, slot) in data.iter_mut().enumerate() {
                        let (l, r) = (consumer.pop_iter().next(), consumer.pop_iter().next());
                        *slot = match (l, r) {
                            (Some(l), Some(r)) => {
                                last = (l + r) * 0.5;
                                last
                            }
                            _ => {
                                if underrun_at == mono_frames {
                                    underrun_at = i;
                                }
                                faded(last, i - underrun_at)
                            }
                        };
                    }
                } else {
                    let mono_frames = data.len() / channels;
                    let mut underrun_at = mono_frames;
                    let mut last = [0.0f32; 2];
                    for (i, frame) in data.chunks_mut(channels).enumerate() {
                        let (l, r) = (consumer.pop_iter().next(), consumer.pop_iter().next());
                        let sample = match (l, r) {
                            (Some(l), Some(r)) => {
                                last = [l, r];
                                [l, r]
                            }
                            _ => {
                                if underrun_at == mono_frames {
                                    underrun_at = i;
                                }
                                let f = fade_factor(i - underrun_at);
                                [last[0] * f, last[1] * f]
                            }
                        };
                        for (ch, out) in frame.iter_mut().enumerate() {
                            *out = sample[ch % 2];
                        }
                    }
                }
            },
            move |err| {
                error!("audio playback error: {}", err);
            },
            None,
        )?,
        format => anyhow::bail!("unsupported output sample format: {:?}", format),
    };

    stream.play()?;

    Ok((PlaybackStream { stream, sample_rate: actual_rate }, producer))
}

const FADE_SAMPLES: usize = 32;

fn fade_factor(distance: usize) -> f32 {
    if distance < FADE_SAMPLES {
        1.0 - (distance as f32 / FADE_SAMPLES as f32)
    } else {
        0.0
    }
}

fn faded(last: f32, distance: usize) -> f32 {
    last * fade_factor(distance)
}

/// Fade the tail of `data` to zero starting at `read` samples (stereo
/// passthrough underrun), avoiding an audible click on buffer exhaustion.
fn fade_and_silence(data: &mut [f32], read: usize) {
    if read < data.len() && read > 0 {
        let fade_len = (data.len() - read).min(FADE_SAMPLES);
        let fade_start = read.saturating_sub(fade_len);
        for (i, slot) in data[fade_start..read].iter_mut().enumerate() {
            *slot *= 1.0 - (i as f32 / fade_len as f32);
        }
    }
    for slot in &mut data[read..] {
        *slot = 0.0;
    }
}

// SAFETY: PlaybackStream only holds the cpal::Stream handle to keep it alive.
// We never call methods on it from multiple threads. The cpal Stream's !Send/!Sync
// markers are overly conservative for our use case (hold-only, no cross-thread access).
unsafe impl Send for PlaybackStream {}
unsafe impl Sync for PlaybackStream {}

impl PlaybackStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
