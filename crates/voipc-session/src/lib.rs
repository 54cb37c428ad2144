//! Sender and receiver pipelines (§4.5-§4.8): the thread topology that
//! couples capture -> encode -> packetize -> encrypt -> transmit on one end
//! and receive -> reassemble -> decrypt -> decode -> present on the other,
//! plus the session manager (viewer/host address discovery via PUNCH).

pub mod broadcast;
pub mod capture;
pub mod error;
pub mod pacing;
pub mod receiver;
pub mod render;
pub mod sender;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use receiver::{run_receiver, ReceiverConfig};
pub use sender::{run_sender, SenderConfig};
pub use session::{HostAddress, ViewerAddress};
