//! Receiver pipeline (§4.6): four threads sharing one UDP socket.
//!
//! - **Network intake** — blocking-poll `recv`, demuxes by `packet_type`,
//!   feeds the video/audio [`ReassemblyBuffer`]s, enqueues completed frames.
//! - **Video decoder worker** — decrypts, validates the NAL start code,
//!   gates on the first keyframe, feeds the external H.264 decoder.
//! - **Audio decoder worker** — decrypts, feeds the external Opus decoder,
//!   writes PCM into the jitter buffer.
//! - **Control/render thread** (this function) — emits PUNCH at 2 Hz,
//!   estimates receive bandwidth, presents the latest decoded frame, and
//!   detects the 2 s stream timeout.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use voipc_audio::{Decoder as AudioDecoder, JitterBuffer};
use voipc_crypto::CipherContext;
use voipc_protocol::{
    PacketHeader, PacketType, Packetizer, ReassemblyBuffer, ReassemblyResult, StreamMetadata,
    HEADER_SIZE,
};
use voipc_queue::{channel, Popped, QueueReceiver, QueueSender};
use voipc_video::{nal, Decoder as VideoDecoder};

use crate::pacing::{RateLimiter, Ticker};
use crate::render::{DisplayFrame, FrameSink, FrameSlot};
use crate::session::HostAddress;
use crate::transport::{bind, DestSink};

const PUNCH_INTERVAL: Duration = Duration::from_millis(500);
const BANDWIDTH_WINDOW: Duration = Duration::from_secs(1);
/// §4.6: no packet of any type for this long resets the stream.
const STREAM_TIMEOUT: Duration = Duration::from_secs(2);
const WARN_RATE_LIMIT: Duration = Duration::from_secs(2);
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(1);
const RENDER_TICK_INTERVAL: Duration = Duration::from_millis(1);
/// Comfortably above one chunk plus header; a single datagram never exceeds
/// [`voipc_protocol::MAX_PACKET_PAYLOAD`] plus [`HEADER_SIZE`].
const RECV_BUF_SIZE: usize = 2048;

pub struct ReceiverConfig {
    pub port: u16,
    /// Where the initial PUNCH is aimed; the receiver tracks the host's
    /// observed source address separately once packets start arriving.
    pub host_addr: SocketAddr,
    pub password: Option<String>,
}

/// One reassembled media unit, handed from the network intake thread to the
/// matching decoder worker. Plain owned bytes — the reassembler's buffer is
/// copied out before this is enqueued so the queue holds an immutable
/// snapshot, per §4.4.
struct EncodedUnit {
    frame_id: u32,
    data: Vec<u8>,
}

/// Runs the receiver pipeline until `running` is cleared, blocking the
/// calling thread as the control/render thread. Spawns the network intake
/// and decoder workers and joins them, in creation order, before returning.
pub fn run_receiver(
    config: ReceiverConfig,
    mut frame_sink: Box<dyn FrameSink>,
    jitter: Arc<Mutex<JitterBuffer>>,
    metadata: Arc<Mutex<Option<StreamMetadata>>>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let socket = Arc::new(bind(config.port)?);
    info!(port = config.port, "receiver socket bound");

    let host_addr = HostAddress::new(config.host_addr);
    let frame_slot = FrameSlot::new();
    let bytes_received = Arc::new(AtomicU64::new(0));
    let last_packet = Arc::new(Mutex::new(Instant::now()));
    let reset_watermarks = Arc::new(AtomicBool::new(false));

    let cipher = match &config.password {
        Some(p) if !p.is_empty() => Some(CipherContext::from_password(p)?),
        _ => None,
    };

    let (video_tx, video_rx) = channel::<EncodedUnit>();
    let (audio_tx, audio_rx) = channel::<EncodedUnit>();

    let intake_handle = {
        let socket = socket.clone();
        let host_addr = host_addr.clone();
        let metadata = metadata.clone();
        let bytes_received = bytes_received.clone();
        let last_packet = last_packet.clone();
        let reset_watermarks = reset_watermarks.clone();
        let running = running.clone();
        thread::Builder::new().name("network-intake".into()).spawn(move || {
            network_intake_worker(
                socket,
                host_addr,
                metadata,
                video_tx,
                audio_tx,
                bytes_received,
                last_packet,
                reset_watermarks,
                running,
            )
        })?
    };

    let video_handle = {
        let cipher = cipher.clone();
        let frame_slot = frame_slot.clone();
        thread::Builder::new()
            .name("video-decoder-worker".into())
            .spawn(move || video_decoder_worker(video_rx, cipher, frame_slot))?
    };

    let audio_handle = {
        let cipher = cipher.clone();
        thread::Builder::new()
            .name("audio-decoder-worker".into())
            .spawn(move || audio_decoder_worker(audio_rx, cipher, jitter))?
    };

    control_render_loop(
        socket,
        &host_addr,
        frame_slot.clone(),
        frame_sink.as_mut(),
        bytes_received,
        last_packet,
        reset_watermarks,
        &running,
    );

    if let Err(e) = intake_handle.join() {
        error!(error = ?e, "network-intake panicked");
    }
    if let Err(e) = video_handle.join() {
        error!(error = ?e, "video-decoder-worker panicked");
    }
    if let Err(e) = audio_handle.join() {
        error!(error = ?e, "audio-decoder-worker panicked");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn network_intake_worker(
    socket: Arc<UdpSocket>,
    host_addr: HostAddress,
    metadata: Arc<Mutex<Option<StreamMetadata>>>,
    video_tx: QueueSender<EncodedUnit>,
    audio_tx: QueueSender<EncodedUnit>,
    bytes_received: Arc<AtomicU64>,
    last_packet: Arc<Mutex<Instant>>,
    reset_watermarks: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    let mut video_reassembler = ReassemblyBuffer::new();
    let mut audio_reassembler = ReassemblyBuffer::new();
    let mut recv_buf = [0u8; RECV_BUF_SIZE];
    let mut drop_limiter = RateLimiter::new(WARN_RATE_LIMIT);

    while running.load(Ordering::Relaxed) {
        if reset_watermarks.swap(false, Ordering::Relaxed) {
            video_reassembler.reset();
            audio_reassembler.reset();
            debug!("reassembler watermarks reset after stream timeout");
        }

        match socket.recv_from(&mut recv_buf) {
            Ok((len, source)) => {
                bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                *last_packet.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();

                let Ok(header) = PacketHeader::from_bytes(&recv_buf[..len]) else {
                    // Too short, or an unknown packet_type: both are
                    // silently ignored per §6/§8.
                    continue;
                };
                let payload = &recv_buf[HEADER_SIZE..len];

                match header.packet_type {
                    PacketType::Keepalive | PacketType::Punch => {
                        host_addr.observe(source);
                    }
                    PacketType::Metadata => {
                        host_addr.observe(source);
                        match StreamMetadata::from_bytes(payload) {
                            Ok(meta) => {
                                *metadata.lock().unwrap_or_else(|e| e.into_inner()) = Some(meta);
                            }
                            Err(e) => {
                                if drop_limiter.allow() {
                                    warn!(error = %e, "malformed metadata packet");
                                }
                            }
                        }
                    }
                    PacketType::Video => {
                        host_addr.observe(source);
                        if video_reassembler.accept(&header, payload) == ReassemblyResult::Complete
                        {
                            let frame_id = video_reassembler.active_frame_id().unwrap_or(header.frame_id);
                            let _ = video_tx.push(EncodedUnit {
                                frame_id,
                                data: video_reassembler.frame().to_vec(),
                            });
                        }
                    }
                    PacketType::Audio => {
                        host_addr.observe(source);
                        if audio_reassembler.accept(&header, payload) == ReassemblyResult::Complete
                        {
                            let frame_id = audio_reassembler.active_frame_id().unwrap_or(header.frame_id);
                            let _ = audio_tx.push(EncodedUnit {
                                frame_id,
                                data: audio_reassembler.frame().to_vec(),
                            });
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(RECV_POLL_INTERVAL);
            }
            Err(e) => {
                if drop_limiter.allow() {
                    warn!(error = %e, "network intake recv error");
                }
            }
        }
    }

    video_tx.close().ok();
    audio_tx.close().ok();
}

fn video_decoder_worker(
    rx: QueueReceiver<EncodedUnit>,
    cipher: Option<CipherContext>,
    frame_slot: FrameSlot,
) {
    let mut decoder = match VideoDecoder::new() {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "video-decoder-worker: failed to initialize H.264 decoder");
            return;
        }
    };
    let mut warn_limiter = RateLimiter::new(WARN_RATE_LIMIT);
    // §3 decoder gating: silently drop until the first IDR/SPS/PPS is seen.
    let mut seen_keyframe = false;

    loop {
        let mut unit = match rx.pop() {
            Ok(Popped::Work(unit)) => unit,
            Ok(Popped::Shutdown) | Err(_) => break,
        };

        if let Some(cipher) = &cipher {
            cipher.decrypt_in_place(unit.frame_id, &mut unit.data);
        }

        if !nal::has_valid_start_code(&unit.data) {
            if warn_limiter.allow() {
                if cipher.is_some() {
                    warn!(
                        frame_id = unit.frame_id,
                        "decryption failed: no valid NAL start code, dropping frame"
                    );
                } else {
                    warn!(frame_id = unit.frame_id, "video frame missing NAL start code, dropping");
                }
            }
            continue;
        }

        if !seen_keyframe {
            if nal::is_keyframe_unit(&unit.data) {
                seen_keyframe = true;
                debug!(frame_id = unit.frame_id, "first keyframe observed, decoder now live");
            } else {
                continue;
            }
        }

        match decoder.decode(&unit.data) {
            Ok(frames) => {
                for frame in frames {
                    frame_slot.set(DisplayFrame {
                        width: frame.width,
                        height: frame.height,
                        i420_data: Arc::new(frame.i420_data),
                    });
                }
            }
            Err(e) => {
                if warn_limiter.allow() {
                    warn!(error = %e, "video decode failed");
                }
            }
        }
    }
}

fn audio_decoder_worker(
    rx: QueueReceiver<EncodedUnit>,
    cipher: Option<CipherContext>,
    jitter: Arc<Mutex<JitterBuffer>>,
) {
    let mut decoder = match AudioDecoder::new() {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "audio-decoder-worker: failed to initialize Opus decoder");
            return;
        }
    };
    let mut warn_limiter = RateLimiter::new(WARN_RATE_LIMIT);

    loop {
        let mut unit = match rx.pop() {
            Ok(Popped::Work(unit)) => unit,
            Ok(Popped::Shutdown) | Err(_) => break,
        };

        if let Some(cipher) = &cipher {
            cipher.decrypt_in_place(unit.frame_id, &mut unit.data);
        }

        match decoder.decode(&unit.data) {
            Ok(pcm) => {
                jitter.lock().unwrap_or_else(|e| e.into_inner()).write(&pcm);
            }
            Err(e) => {
                if warn_limiter.allow() {
                    warn!(error = %e, "audio decode failed");
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn control_render_loop(
    socket: Arc<UdpSocket>,
    host_addr: &HostAddress,
    frame_slot: FrameSlot,
    frame_sink: &mut dyn FrameSink,
    bytes_received: Arc<AtomicU64>,
    last_packet: Arc<Mutex<Instant>>,
    reset_watermarks: Arc<AtomicBool>,
    running: &AtomicBool,
) {
    let packetizer = Packetizer::new();
    // Punches whatever address the host was most recently observed at —
    // under a symmetric NAT this may drift from the configured address.
    let mut punch_dest = DestSink::new(socket.clone(), host_addr.shared());
    let mut punch_ticker = Ticker::new(PUNCH_INTERVAL);
    let mut bandwidth_ticker = Ticker::new(BANDWIDTH_WINDOW);
    let mut last_bytes = 0u64;
    let mut timed_out = false;

    while running.load(Ordering::Relaxed) {
        if punch_ticker.tick() {
            let _ = packetizer.send_frame(&mut punch_dest, PacketType::Punch, &[]);
        }

        if bandwidth_ticker.tick() {
            let now_bytes = bytes_received.load(Ordering::Relaxed);
            let bps = now_bytes.saturating_sub(last_bytes) * 8;
            last_bytes = now_bytes;
            debug!(bits_per_second = bps, "receive bandwidth estimate");
        }

        let elapsed = last_packet.lock().unwrap_or_else(|e| e.into_inner()).elapsed();
        if elapsed >= STREAM_TIMEOUT {
            if !timed_out {
                info!("stream timeout: clearing displayed frame and resetting reassemblers");
                frame_slot.clear();
                reset_watermarks.store(true, Ordering::Relaxed);
                timed_out = true;
            }
        } else {
            timed_out = false;
        }

        if let Some(frame) = frame_slot.get() {
            frame_sink.present(&frame);
        }

        thread::sleep(RENDER_TICK_INTERVAL);
    }
}
