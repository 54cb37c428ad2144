//! Single UDP socket, bound once per endpoint and shared by every thread in
//! the pipeline: the control thread punches and discovers addresses, the
//! media workers send through a [`voipc_protocol::PacketSink`] built on top
//! of the same socket.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

use voipc_protocol::PacketSink;

use crate::error::SessionError;

/// Raised above the OS default so a keyframe burst doesn't get dropped by a
/// full kernel buffer.
const SOCKET_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Bind the shared UDP socket: `SO_REUSEADDR`, non-blocking, ~4 MiB send and
/// receive buffers, bound to `0.0.0.0:port`.
pub fn bind(port: u16) -> Result<UdpSocket, SessionError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let to_err = |source: io::Error| SessionError::SocketBind { addr, source };

    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
    .map_err(to_err)?;

    socket.set_reuse_address(true).map_err(to_err)?;
    let _ = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE);
    let _ = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE);
    socket.bind(&addr.into()).map_err(to_err)?;
    socket.set_nonblocking(true).map_err(to_err)?;

    Ok(socket.into())
}

/// Sends to a fixed, unchanging destination — used for the initial PUNCH a
/// host or viewer aims at the peer address it was configured with.
#[derive(Clone)]
pub struct FixedDestSink {
    socket: Arc<UdpSocket>,
    dest: SocketAddr,
}

impl FixedDestSink {
    pub fn new(socket: Arc<UdpSocket>, dest: SocketAddr) -> Self {
        Self { socket, dest }
    }
}

impl PacketSink for FixedDestSink {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        self.socket.send_to(packet, self.dest).map(|_| ())
    }
}

/// Sends to whatever destination is currently recorded in a shared,
/// mutex-protected slot — used once the peer's address has been discovered
/// (or may change) via inbound PUNCH packets. Sending before a destination
/// is known is a no-op, not an error: there is simply nowhere to send yet.
#[derive(Clone)]
pub struct DestSink {
    socket: Arc<UdpSocket>,
    dest: Arc<Mutex<Option<SocketAddr>>>,
}

impl DestSink {
    pub fn new(socket: Arc<UdpSocket>, dest: Arc<Mutex<Option<SocketAddr>>>) -> Self {
        Self { socket, dest }
    }
}

impl PacketSink for DestSink {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        let dest = *self.dest.lock().unwrap_or_else(|e| e.into_inner());
        match dest {
            Some(addr) => self.socket.send_to(packet, addr).map(|_| ()),
            None => Ok(()),
        }
    }
}
