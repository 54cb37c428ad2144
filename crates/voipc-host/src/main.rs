//! `voipc-host`: captures, encodes, and publishes the stream a `voipc-viewer`
//! connects to. CLI entry point wiring §2A's configuration layer to
//! `voipc_session::run_sender`.

mod capture;
mod config;

use std::fs;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use config::HostConfig;
use voipc_session::sender::{run_sender, SenderConfig};

/// Demo screen-and-voice publisher. Screen capture itself is an external
/// collaborator (see crate docs); this binary drives the core pipeline
/// against a synthetic test pattern plus the real system microphone.
#[derive(Parser)]
#[command(name = "voipc-host", about = "VoIPC host: captures and publishes a stream")]
struct Args {
    /// Path to a TOML config file; CLI flags below override its values.
    #[arg(short, long)]
    config: Option<String>,

    /// Viewer address to aim the initial PUNCH at (e.g. "203.0.113.5").
    #[arg(long)]
    target_ip: Option<String>,

    /// UDP port both endpoints bind (default 9999).
    #[arg(long)]
    port: Option<u16>,

    /// Shared password; empty disables encryption.
    #[arg(long)]
    password: Option<String>,

    /// Capture/encode frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Microphone device name; unset selects the platform default.
    #[arg(long)]
    audio_source: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("voipc_host=info,voipc_session=info"))
                .unwrap(),
        )
        .init();

    let mut config = if let Some(path) = &args.config {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        toml::from_str(&content).with_context(|| format!("failed to parse config file: {path}"))?
    } else {
        HostConfig::with_port_default()
    };

    if let Some(target_ip) = args.target_ip {
        config.target_ip = Some(target_ip);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(audio_source) = args.audio_source {
        config.audio_source = Some(audio_source);
    }

    let target_ip = config
        .target_ip
        .as_ref()
        .context("target IP is required (--target-ip or config file)")?;
    let peer_addr: SocketAddr = format!("{target_ip}:{}", config.port)
        .parse()
        .with_context(|| format!("invalid target address: {target_ip}:{}", config.port))?;

    info!(
        target = %peer_addr,
        port = config.port,
        fps = config.fps,
        encrypted = !config.password.is_empty(),
        "voipc-host starting"
    );

    let capture = Box::new(capture::SyntheticCapture::new(1280, 720, config.fps));

    let (audio_capture_handle, audio_consumer) =
        match voipc_audio::capture::start_capture(config.audio_source.as_deref()) {
            Ok((stream, consumer)) => (Some(stream), Some(consumer)),
            Err(e) => {
                tracing::warn!(error = %e, "no audio capture device available, streaming video only");
                (None, None)
            }
        };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let os_name = std::env::consts::OS.to_string();
    let device_name = gethostname::gethostname().to_string_lossy().into_owned();

    let sender_config = SenderConfig {
        port: config.port,
        peer_addr,
        fps: config.fps,
        password: if config.password.is_empty() { None } else { Some(config.password) },
        os_name,
        device_name,
    };

    let result = run_sender(
        sender_config,
        capture,
        audio_consumer,
        Box::new(voipc_session::broadcast::NoopBroadcast),
        running,
    );

    drop(audio_capture_handle);
    result
}
