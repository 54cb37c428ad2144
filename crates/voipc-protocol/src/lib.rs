//! Wire protocol: packet headers, stream metadata, fragmentation, and
//! receiver-side reassembly for the UDP media transport.

pub mod error;
pub mod header;
pub mod metadata;
pub mod packetizer;
pub mod reassembly;

pub use error::ProtocolError;
pub use header::{PacketHeader, PacketType, HEADER_SIZE, MAX_PACKET_PAYLOAD};
pub use metadata::{StreamMetadata, METADATA_RESEND_INTERVAL_FRAMES, STREAM_METADATA_SIZE};
pub use packetizer::{fragment, PacketSink, Packetizer};
pub use reassembly::{ReassemblyBuffer, ReassemblyResult, REASSEMBLY_BUFFER_SIZE};
