//! Fixed 16-byte packet header, little-endian on the wire.
//!
//! ```text
//!  0  frame_id      u32  monotonic per sender
//!  4  chunk_id      u16  0..total_chunks-1
//!  6  total_chunks  u16
//!  8  payload_size  u32  bytes of payload in THIS chunk
//! 12  packet_type   u8
//! 13  padding[3]    zeroes
//! 16  payload       payload_size bytes
//! ```

use crate::error::ProtocolError;

/// Headroom under the common 1500-byte MTU.
pub const MAX_PACKET_PAYLOAD: usize = 1400;

pub const HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Video = 0,
    Metadata = 1,
    Keepalive = 2,
    Punch = 3,
    Audio = 4,
}

impl PacketType {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0 => Ok(Self::Video),
            1 => Ok(Self::Metadata),
            2 => Ok(Self::Keepalive),
            3 => Ok(Self::Punch),
            4 => Ok(Self::Audio),
            // Unknown types must be ignored by callers, not rejected outright;
            // returning an error here lets the caller decide (trace-log and skip).
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub frame_id: u32,
    pub chunk_id: u16,
    pub total_chunks: u16,
    pub payload_size: u32,
    pub packet_type: PacketType,
}

impl PacketHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.chunk_id.to_le_bytes());
        buf[6..8].copy_from_slice(&self.total_chunks.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[12] = self.packet_type as u8;
        // buf[13..16] already zero-initialized padding.
        buf
    }

    /// Parse a header from the front of `data`. A packet shorter than
    /// [`HEADER_SIZE`] is rejected — callers must silently ignore these.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: HEADER_SIZE,
                got: data.len(),
            });
        }
        let frame_id = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let chunk_id = u16::from_le_bytes(data[4..6].try_into().unwrap());
        let total_chunks = u16::from_le_bytes(data[6..8].try_into().unwrap());
        let payload_size = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let packet_type = PacketType::from_byte(data[12])?;
        Ok(Self {
            frame_id,
            chunk_id,
            total_chunks,
            payload_size,
            packet_type,
        })
    }
}
