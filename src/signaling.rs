//! WebSocket signaling relay for a two-peer WebRTC session

mod actor;
mod messages;
mod server;
mod session;
mod types;

pub use actor::RelayHandle;
pub use messages::{SdpKind, ServerMessage, SignalingMessage};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use session::{RelaySession, RelayStats};
pub use types::{ConnectionId, ConnectionState, OutboundMessage, SignalingError};
