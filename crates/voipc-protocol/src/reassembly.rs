//! Receiver-side fragment reassembly, one [`ReassemblyBuffer`] per media
//! type. Only a single frame is ever in flight per buffer: a packet bearing a
//! higher `frame_id` than the one currently being assembled abandons the
//! partial frame outright, matching the sender never retransmitting a frame
//! once a newer one has started.

use crate::header::PacketHeader;

/// Fixed backing size, allocated once and reused for the lifetime of the
/// buffer. Frames larger than this are not supported and are dropped.
pub const REASSEMBLY_BUFFER_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyResult {
    /// The chunk completed its frame; the caller should read out the frame.
    Complete,
    /// The chunk was accepted but the frame is still incomplete.
    Partial,
    /// The chunk was discarded: duplicate, from an already-superseded frame,
    /// or otherwise not actionable.
    Ignored,
}

pub struct ReassemblyBuffer {
    buffer: Vec<u8>,
    active_frame_id: Option<u32>,
    total_chunks: u16,
    received_chunks: u16,
    received_mask: Vec<bool>,
    frame_len: usize,
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self {
            buffer: vec![0u8; REASSEMBLY_BUFFER_SIZE],
            active_frame_id: None,
            total_chunks: 0,
            received_chunks: 0,
            received_mask: Vec::new(),
            frame_len: 0,
        }
    }

    /// Discard whatever frame is in progress and wait for the next one.
    /// Called on stream timeout so a stale watermark doesn't reject the
    /// first frame of a freshly reconnected stream.
    pub fn reset(&mut self) {
        self.active_frame_id = None;
        self.total_chunks = 0;
        self.received_chunks = 0;
        self.received_mask.clear();
        self.frame_len = 0;
    }

    fn start_frame(&mut self, header: &PacketHeader) {
        self.active_frame_id = Some(header.frame_id);
        self.total_chunks = header.total_chunks;
        self.received_chunks = 0;
        self.received_mask = vec![false; header.total_chunks as usize];
        self.frame_len = 0;
    }

    /// Feed one chunk (header already parsed, `payload` is the bytes after
    /// the header) into the buffer.
    pub fn accept(&mut self, header: &PacketHeader, payload: &[u8]) -> ReassemblyResult {
        match self.active_frame_id {
            None => self.start_frame(header),
            Some(active) if header.frame_id > active => self.start_frame(header),
            Some(active) if header.frame_id < active => return ReassemblyResult::Ignored,
            Some(_) => {
                if header.total_chunks != self.total_chunks {
                    // Sender restarted the same frame id with a different
                    // shape; treat as a fresh frame rather than corrupt data.
                    self.start_frame(header);
                }
            }
        }

        let chunk_id = header.chunk_id as usize;
        if chunk_id >= self.received_mask.len() {
            return ReassemblyResult::Ignored;
        }
        if self.received_mask[chunk_id] {
            return ReassemblyResult::Ignored;
        }

        let offset = chunk_id * crate::header::MAX_PACKET_PAYLOAD;
        let end = offset + payload.len();
        if end > self.buffer.len() {
            return ReassemblyResult::Ignored;
        }
        self.buffer[offset..end].copy_from_slice(payload);
        self.received_mask[chunk_id] = true;
        self.received_chunks += 1;
        self.frame_len = self.frame_len.max(end);

        if self.received_chunks == self.total_chunks {
            ReassemblyResult::Complete
        } else {
            ReassemblyResult::Partial
        }
    }

    /// The id of the frame that was most recently completed or is in
    /// progress, if any.
    pub fn active_frame_id(&self) -> Option<u32> {
        self.active_frame_id
    }

    /// Bytes of the completed frame. Only meaningful immediately after
    /// [`ReassemblyBuffer::accept`] returns [`ReassemblyResult::Complete`].
    pub fn frame(&self) -> &[u8] {
        &self.buffer[..self.frame_len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{PacketType, HEADER_SIZE};
    use crate::packetizer::fragment;

    fn accept_all(buffer: &mut ReassemblyBuffer, chunks: &[Vec<u8>]) -> ReassemblyResult {
        let mut last = ReassemblyResult::Ignored;
        for chunk in chunks {
            let header = PacketHeader::from_bytes(chunk).unwrap();
            last = buffer.accept(&header, &chunk[HEADER_SIZE..]);
        }
        last
    }

    #[test]
    fn single_chunk_frame_completes_immediately() {
        let payload = vec![9u8; 50];
        let chunks = fragment(1, PacketType::Audio, &payload);
        let mut buffer = ReassemblyBuffer::new();
        let result = accept_all(&mut buffer, &chunks);
        assert_eq!(result, ReassemblyResult::Complete);
        assert_eq!(buffer.frame(), &payload[..]);
    }

    #[test]
    fn multi_chunk_frame_is_partial_then_complete() {
        let payload = vec![4u8; crate::header::MAX_PACKET_PAYLOAD * 3 + 10];
        let chunks = fragment(2, PacketType::Video, &payload);
        let mut buffer = ReassemblyBuffer::new();
        for chunk in &chunks[..chunks.len() - 1] {
            let header = PacketHeader::from_bytes(chunk).unwrap();
            let result = buffer.accept(&header, &chunk[HEADER_SIZE..]);
            assert_eq!(result, ReassemblyResult::Partial);
        }
        let last = chunks.last().unwrap();
        let header = PacketHeader::from_bytes(last).unwrap();
        let result = buffer.accept(&header, &last[HEADER_SIZE..]);
        assert_eq!(result, ReassemblyResult::Complete);
        assert_eq!(buffer.frame(), &payload[..]);
    }

    #[test]
    fn higher_frame_id_supersedes_in_progress_frame() {
        let old_payload = vec![1u8; crate::header::MAX_PACKET_PAYLOAD * 2];
        let old_chunks = fragment(1, PacketType::Video, &old_payload);
        let mut buffer = ReassemblyBuffer::new();
        let header0 = PacketHeader::from_bytes(&old_chunks[0]).unwrap();
        buffer.accept(&header0, &old_chunks[0][HEADER_SIZE..]);

        let new_payload = vec![2u8; 30];
        let new_chunks = fragment(2, PacketType::Video, &new_payload);
        let result = accept_all(&mut buffer, &new_chunks);
        assert_eq!(result, ReassemblyResult::Complete);
        assert_eq!(buffer.frame(), &new_payload[..]);
    }

    #[test]
    fn lower_frame_id_is_ignored() {
        let payload = vec![1u8; 20];
        let chunks = fragment(10, PacketType::Audio, &payload);
        let mut buffer = ReassemblyBuffer::new();
        accept_all(&mut buffer, &chunks);

        let stale = fragment(3, PacketType::Audio, &vec![9u8; 20]);
        let header = PacketHeader::from_bytes(&stale[0]).unwrap();
        let result = buffer.accept(&header, &stale[0][HEADER_SIZE..]);
        assert_eq!(result, ReassemblyResult::Ignored);
        assert_eq!(buffer.active_frame_id(), Some(10));
    }

    #[test]
    fn duplicate_chunk_is_ignored() {
        let payload = vec![5u8; crate::header::MAX_PACKET_PAYLOAD + 1];
        let chunks = fragment(1, PacketType::Video, &payload);
        let mut buffer = ReassemblyBuffer::new();
        let header0 = PacketHeader::from_bytes(&chunks[0]).unwrap();
        buffer.accept(&header0, &chunks[0][HEADER_SIZE..]);
        let result = buffer.accept(&header0, &chunks[0][HEADER_SIZE..]);
        assert_eq!(result, ReassemblyResult::Ignored);
    }

    #[test]
    fn reset_clears_in_progress_frame() {
        let payload = vec![1u8; crate::header::MAX_PACKET_PAYLOAD * 2];
        let chunks = fragment(5, PacketType::Video, &payload);
        let mut buffer = ReassemblyBuffer::new();
        let header0 = PacketHeader::from_bytes(&chunks[0]).unwrap();
        buffer.accept(&header0, &chunks[0][HEADER_SIZE..]);
        buffer.reset();
        assert_eq!(buffer.active_frame_id(), None);

        // After reset, even a lower frame id than the one abandoned is
        // accepted, since there's no active watermark anymore.
        let fresh = fragment(1, PacketType::Video, &vec![2u8; 5]);
        let result = accept_all(&mut buffer, &fresh);
        assert_eq!(result, ReassemblyResult::Complete);
    }
}
