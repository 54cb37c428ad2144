//! Stream metadata announced alongside video, sent every 30 frames so a
//! viewer that joins mid-stream (or drops a metadata packet) resyncs quickly.

use crate::error::ProtocolError;

const NAME_LEN: usize = 32;
const FORMAT_LEN: usize = 16;

pub const STREAM_METADATA_SIZE: usize =
    NAME_LEN + NAME_LEN + 4 + 4 + 4 + FORMAT_LEN + FORMAT_LEN;

/// How many frames elapse between unsolicited metadata retransmits.
pub const METADATA_RESEND_INTERVAL_FRAMES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    pub os_name: String,
    pub device_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format_name: String,
    pub color_space: String,
}

fn write_fixed(buf: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (len - n), 0);
}

fn read_fixed(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

impl StreamMetadata {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(STREAM_METADATA_SIZE);
        write_fixed(&mut buf, &self.os_name, NAME_LEN);
        write_fixed(&mut buf, &self.device_name, NAME_LEN);
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.fps.to_le_bytes());
        write_fixed(&mut buf, &self.format_name, FORMAT_LEN);
        write_fixed(&mut buf, &self.color_space, FORMAT_LEN);
        buf
    }

    /// Decode is tolerant of payloads up to 4 bytes shorter than the current
    /// wire size, so a sender built against an older/newer metadata layout
    /// within a few fields of this one still interoperates.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let expected_min = STREAM_METADATA_SIZE.saturating_sub(4);
        let expected_max = STREAM_METADATA_SIZE;
        if data.len() < expected_min || data.len() > expected_max {
            return Err(ProtocolError::MetadataSizeOutOfRange {
                got: data.len(),
                expected_min,
                expected_max,
            });
        }

        let mut padded = vec![0u8; STREAM_METADATA_SIZE];
        padded[..data.len()].copy_from_slice(data);

        let mut off = 0;
        let os_name = read_fixed(&padded[off..off + NAME_LEN]);
        off += NAME_LEN;
        let device_name = read_fixed(&padded[off..off + NAME_LEN]);
        off += NAME_LEN;
        let width = u32::from_le_bytes(padded[off..off + 4].try_into().unwrap());
        off += 4;
        let height = u32::from_le_bytes(padded[off..off + 4].try_into().unwrap());
        off += 4;
        let fps = u32::from_le_bytes(padded[off..off + 4].try_into().unwrap());
        off += 4;
        let format_name = read_fixed(&padded[off..off + FORMAT_LEN]);
        off += FORMAT_LEN;
        let color_space = read_fixed(&padded[off..off + FORMAT_LEN]);

        Ok(Self {
            os_name,
            device_name,
            width,
            height,
            fps,
            format_name,
            color_space,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StreamMetadata {
        StreamMetadata {
            os_name: "linux".into(),
            device_name: "host-01".into(),
            width: 1920,
            height: 1080,
            fps: 60,
            format_name: "h264".into(),
            color_space: "yuv420p".into(),
        }
    }

    #[test]
    fn roundtrip() {
        let meta = sample();
        let bytes = meta.to_bytes();
        assert_eq!(bytes.len(), STREAM_METADATA_SIZE);
        let decoded = StreamMetadata::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn names_longer_than_field_are_truncated() {
        let meta = StreamMetadata {
            os_name: "a".repeat(100),
            ..sample()
        };
        let bytes = meta.to_bytes();
        let decoded = StreamMetadata::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.os_name, "a".repeat(NAME_LEN));
    }

    #[test]
    fn tolerates_slightly_short_payload() {
        let meta = sample();
        let mut bytes = meta.to_bytes();
        bytes.truncate(STREAM_METADATA_SIZE - 4);
        let decoded = StreamMetadata::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.os_name, meta.os_name);
        assert_eq!(decoded.width, meta.width);
    }

    #[test]
    fn rejects_payload_far_too_short() {
        let result = StreamMetadata::from_bytes(&[0u8; 4]);
        assert!(matches!(result, Err(ProtocolError::MetadataSizeOutOfRange { .. })));
    }

    #[test]
    fn rejects_payload_longer_than_layout() {
        let mut bytes = sample().to_bytes();
        bytes.push(0);
        let result = StreamMetadata::from_bytes(&bytes);
        assert!(matches!(result, Err(ProtocolError::MetadataSizeOutOfRange { .. })));
    }
}
