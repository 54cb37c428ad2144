//! Splits an encoded frame into MTU-sized chunks and hands them to a
//! [`PacketSink`] for transmission, pacing bursts so the kernel UDP send
//! buffer never gets hammered with an entire frame at once.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::header::{PacketHeader, PacketType, HEADER_SIZE, MAX_PACKET_PAYLOAD};

/// Number of chunks sent before the packetizer yields the thread briefly.
const PACING_BURST: usize = 10;
const PACING_PAUSE: Duration = Duration::from_micros(200);

/// Destination for a framed, header-prefixed packet. Implemented by the
/// session layer's UDP socket wrapper; kept as a trait so the packetizer can
/// be exercised in tests without a real socket.
pub trait PacketSink {
    fn send_packet(&mut self, packet: &[u8]) -> io::Result<()>;
}

/// Splits `payload` into `PacketHeader`-prefixed chunks no larger than
/// [`MAX_PACKET_PAYLOAD`]. Pure and allocation-only — used directly by tests,
/// and internally by [`Packetizer::send_frame`] before pacing is applied.
pub fn fragment(frame_id: u32, packet_type: PacketType, payload: &[u8]) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        let header = PacketHeader {
            frame_id,
            chunk_id: 0,
            total_chunks: 1,
            payload_size: 0,
            packet_type,
        };
        return vec![header.to_bytes().to_vec()];
    }

    let total_chunks = payload.len().div_ceil(MAX_PACKET_PAYLOAD);
    let mut chunks = Vec::with_capacity(total_chunks);

    for (chunk_id, slice) in payload.chunks(MAX_PACKET_PAYLOAD).enumerate() {
        let header = PacketHeader {
            frame_id,
            chunk_id: chunk_id as u16,
            total_chunks: total_chunks as u16,
            payload_size: slice.len() as u32,
            packet_type,
        };
        let mut packet = Vec::with_capacity(HEADER_SIZE + slice.len());
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(slice);
        chunks.push(packet);
    }

    chunks
}

/// Assigns frame ids and serializes full fragmented transmissions.
///
/// The send mutex is held for the entire burst of a frame, not just per
/// chunk: two media types racing to interleave their fragments on the wire
/// would make supersession at the receiver's `Reassembler` ambiguous, so a
/// frame is sent start-to-finish before the next one (of any type) begins.
pub struct Packetizer {
    next_frame_id: AtomicU32,
    send_lock: Mutex<()>,
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Packetizer {
    pub fn new() -> Self {
        Self {
            next_frame_id: AtomicU32::new(0),
            send_lock: Mutex::new(()),
        }
    }

    /// Reserve the next monotonic frame id without sending anything.
    pub fn next_frame_id(&self) -> u32 {
        self.next_frame_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Fragment and send `payload` as one logical frame through `sink`,
    /// pausing briefly every [`PACING_BURST`] chunks.
    pub fn send_frame(
        &self,
        sink: &mut dyn PacketSink,
        packet_type: PacketType,
        payload: &[u8],
    ) -> io::Result<u32> {
        let frame_id = self.next_frame_id();
        self.send_with_id(sink, frame_id, packet_type, payload)?;
        Ok(frame_id)
    }

    /// Fragment and send `payload` as the logical frame `frame_id`, already
    /// claimed via [`Packetizer::next_frame_id`]. Needed when the caller must
    /// encrypt the payload before fragmentation — encryption needs the
    /// frame_id for its IV, so the id has to be claimed up front rather than
    /// left to [`Packetizer::send_frame`].
    pub fn send_with_id(
        &self,
        sink: &mut dyn PacketSink,
        frame_id: u32,
        packet_type: PacketType,
        payload: &[u8],
    ) -> io::Result<()> {
        let _guard = self.send_lock.lock().unwrap_or_else(|e| e.into_inner());

        let chunks = fragment(frame_id, packet_type, payload);
        for (i, chunk) in chunks.iter().enumerate() {
            sink.send_packet(chunk)?;
            if (i + 1) % PACING_BURST == 0 {
                thread::sleep(PACING_PAUSE);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink {
        packets: Vec<Vec<u8>>,
    }

    impl PacketSink for CollectingSink {
        fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
            self.packets.push(packet.to_vec());
            Ok(())
        }
    }

    #[test]
    fn fragment_single_chunk_for_small_payload() {
        let payload = vec![7u8; 100];
        let chunks = fragment(1, PacketType::Audio, &payload);
        assert_eq!(chunks.len(), 1);
        let header = PacketHeader::from_bytes(&chunks[0]).unwrap();
        assert_eq!(header.total_chunks, 1);
        assert_eq!(header.payload_size, 100);
    }

    #[test]
    fn fragment_splits_large_payload_across_chunks() {
        let payload = vec![3u8; MAX_PACKET_PAYLOAD * 3 + 17];
        let chunks = fragment(5, PacketType::Video, &payload);
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            let header = PacketHeader::from_bytes(chunk).unwrap();
            assert_eq!(header.frame_id, 5);
            assert_eq!(header.chunk_id as usize, i);
            assert_eq!(header.total_chunks as usize, 4);
        }
        let last = PacketHeader::from_bytes(&chunks[3]).unwrap();
        assert_eq!(last.payload_size, 17);
    }

    #[test]
    fn fragment_exact_multiple_of_mtu() {
        let payload = vec![1u8; MAX_PACKET_PAYLOAD * 2];
        let chunks = fragment(0, PacketType::Video, &payload);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            let header = PacketHeader::from_bytes(chunk).unwrap();
            assert_eq!(header.payload_size as usize, MAX_PACKET_PAYLOAD);
        }
    }

    #[test]
    fn fragment_empty_payload_produces_one_zero_length_chunk() {
        let chunks = fragment(9, PacketType::Keepalive, &[]);
        assert_eq!(chunks.len(), 1);
        let header = PacketHeader::from_bytes(&chunks[0]).unwrap();
        assert_eq!(header.payload_size, 0);
        assert_eq!(header.total_chunks, 1);
    }

    #[test]
    fn packetizer_assigns_increasing_frame_ids() {
        let packetizer = Packetizer::new();
        let a = packetizer.next_frame_id();
        let b = packetizer.next_frame_id();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn send_with_id_uses_the_given_frame_id() {
        let packetizer = Packetizer::new();
        let mut sink = CollectingSink { packets: Vec::new() };
        let claimed = packetizer.next_frame_id();
        packetizer
            .send_with_id(&mut sink, claimed, PacketType::Audio, &[1, 2, 3])
            .unwrap();
        let header = PacketHeader::from_bytes(&sink.packets[0]).unwrap();
        assert_eq!(header.frame_id, claimed);
        // The counter was only advanced once, by the explicit next_frame_id() call.
        assert_eq!(packetizer.next_frame_id(), claimed + 1);
    }

    #[test]
    fn send_frame_delivers_all_chunks_to_sink() {
        let packetizer = Packetizer::new();
        let mut sink = CollectingSink { packets: Vec::new() };
        let payload = vec![2u8; MAX_PACKET_PAYLOAD * 2 + 5];
        let frame_id = packetizer
            .send_frame(&mut sink, PacketType::Video, &payload)
            .unwrap();
        assert_eq!(sink.packets.len(), 3);
        for packet in &sink.packets {
            let header = PacketHeader::from_bytes(packet).unwrap();
            assert_eq!(header.frame_id, frame_id);
        }
    }
}
