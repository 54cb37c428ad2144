use std::net::SocketAddr;

use thiserror::Error;

/// Fallible setup operations this crate exposes directly. Per-packet runtime
/// failures (transient I/O, fragment loss, decryption failure) are not
/// modeled as errors — per the error-handling policy, they're logged
/// rate-limited at their origin and the pipeline keeps running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    SocketBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
