//! `voipc-viewer`: receives and presents the stream published by a
//! `voipc-host`. CLI entry point wiring §2A's configuration layer to
//! `voipc_session::run_receiver`.

mod config;
mod render;

use std::fs;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ringbuf::traits::Producer;
use tracing::info;

use config::ViewerConfig;
use voipc_audio::JitterBuffer;
use voipc_session::receiver::{run_receiver, ReceiverConfig};

/// Demo screen-and-voice subscriber. GL presentation itself is an external
/// collaborator (see crate docs); this binary drives the core pipeline and
/// logs what it would have drawn, while playing the decoded audio for real.
#[derive(Parser)]
#[command(name = "voipc-viewer", about = "VoIPC viewer: receives and presents a stream")]
struct Args {
    /// Path to a TOML config file; CLI flags below override its values.
    #[arg(short, long)]
    config: Option<String>,

    /// Host address to aim the initial PUNCH at (e.g. "203.0.113.5").
    #[arg(long)]
    host_ip: Option<String>,

    /// UDP port both endpoints bind (default 9999).
    #[arg(long)]
    port: Option<u16>,

    /// Shared password; empty disables decryption.
    #[arg(long)]
    password: Option<String>,

    /// Speaker/headphone device name; unset selects the platform default.
    #[arg(long)]
    audio_output: Option<String>,
}

/// How many interleaved stereo samples the pump thread drains from the
/// jitter buffer per iteration: one Opus frame's worth (20ms at 48kHz).
/// The interval must match this chunk's real-time duration (20ms) — pumping
/// faster drains the jitter buffer quicker than playback consumes it,
/// forcing perpetual underrun/rebuffering.
const PUMP_CHUNK_SAMPLES: usize = 960 * 2;
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("voipc_viewer=info,voipc_session=info"))
                .unwrap(),
        )
        .init();

    let mut config = if let Some(path) = &args.config {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        toml::from_str(&content).with_context(|| format!("failed to parse config file: {path}"))?
    } else {
        ViewerConfig::with_port_default()
    };

    if let Some(host_ip) = args.host_ip {
        config.host_ip = Some(host_ip);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if let Some(audio_output) = args.audio_output {
        config.audio_output = Some(audio_output);
    }

    let host_ip = config
        .host_ip
        .as_ref()
        .context("host IP is required (--host-ip or config file)")?;
    let host_addr: SocketAddr = format!("{host_ip}:{}", config.port)
        .parse()
        .with_context(|| format!("invalid host address: {host_ip}:{}", config.port))?;

    info!(
        host = %host_addr,
        port = config.port,
        decrypted = !config.password.is_empty(),
        "voipc-viewer starting"
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let jitter = Arc::new(Mutex::new(JitterBuffer::new(48_000, 2)));
    let metadata = Arc::new(Mutex::new(None));

    let playback = match voipc_audio::playback::start_playback(config.audio_output.as_deref()) {
        Ok((stream, producer)) => Some((stream, producer)),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output device available, running video-only");
            None
        }
    };

    let pump_handle = playback.map(|(stream, mut producer)| {
        let jitter = jitter.clone();
        let running = running.clone();
        let handle = thread::Builder::new()
            .name("audio-playback-pump".into())
            .spawn(move || {
                let mut scratch = [0.0f32; PUMP_CHUNK_SAMPLES];
                while running.load(Ordering::Relaxed) {
                    jitter.lock().unwrap_or_else(|e| e.into_inner()).read(&mut scratch);
                    producer.push_slice(&scratch);
                    thread::sleep(PUMP_INTERVAL);
                }
            })
            .expect("failed to spawn audio-playback-pump thread");
        (stream, handle)
    });

    let receiver_config = ReceiverConfig {
        port: config.port,
        host_addr,
        password: if config.password.is_empty() { None } else { Some(config.password) },
    };

    let result = run_receiver(
        receiver_config,
        Box::new(render::LoggingFrameSink::new()),
        jitter,
        metadata,
        running,
    );

    if let Some((stream, handle)) = pump_handle {
        handle.join().ok();
        drop(stream);
    }

    result
}
