use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("packet too short: expected at least {expected} bytes, got {got}")]
    PacketTooShort { expected: usize, got: usize },

    #[error("unknown UDP packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("metadata payload size {got} out of tolerant range [{expected_min}, {expected_max}]")]
    MetadataSizeOutOfRange {
        got: usize,
        expected_min: usize,
        expected_max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_too_short_display() {
        let e = ProtocolError::PacketTooShort { expected: 16, got: 5 };
        let msg = e.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains('5'));
    }

    #[test]
    fn unknown_packet_type_display() {
        let e = ProtocolError::UnknownPacketType(0xAB);
        let msg = e.to_string();
        assert!(msg.contains("0xab"));
    }

    #[test]
    fn metadata_size_out_of_range_display() {
        let e = ProtocolError::MetadataSizeOutOfRange {
            got: 10,
            expected_min: 96,
            expected_max: 100,
        };
        let msg = e.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("96"));
    }
}
