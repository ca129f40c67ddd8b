use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message, Utf8Bytes};

/// Signaling relay errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("peer is gone: {0}")]
    PeerGone(ConnectionId),

    #[error("internal error: {0}")]
    Internal(String),
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one accepted WebSocket connection.
///
/// Never reused within a process, so a reconnecting peer always shows up as a
/// fresh identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer_{:08x}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Readiness of a connection. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Advance to `next`; returns false (and stays put) on a backwards move.
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if next <= *self {
            return false;
        }
        *self = next;
        true
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A WebSocket data frame on its way to a peer.
///
/// Wraps the tungstenite message so text and binary payloads are forwarded
/// exactly as received. Cloning is cheap (refcounted bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage(Message);

impl OutboundMessage {
    pub fn text(s: impl Into<Utf8Bytes>) -> Self {
        Self(Message::Text(s.into()))
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Self(Message::Binary(b.into()))
    }

    /// Accepts data frames only; control frames yield `None`.
    pub fn from_frame(msg: Message) -> Option<Self> {
        match msg {
            Message::Text(_) | Message::Binary(_) => Some(Self(msg)),
            _ => None,
        }
    }

    /// Raw payload bytes, used for ingress decoding.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes.as_ref(),
            _ => &[],
        }
    }

    /// Get the inner message for the WebSocket sink
    pub fn into_inner(self) -> Message {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

#[derive(Debug)]
pub(crate) struct PeerState {
    pub state: ConnectionState,
    /// Writer channel of the connection task; fails once that task is gone.
    pub tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl PeerState {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            state: ConnectionState::Open,
            tx,
        }
    }

    /// Queue a frame. A dead writer moves the peer to `closing`.
    pub fn send(&mut self, id: ConnectionId, msg: OutboundMessage) -> Result<(), SignalingError> {
        if !self.state.is_open() {
            return Err(SignalingError::PeerGone(id));
        }
        if self.tx.send(msg).is_err() {
            self.state.advance(ConnectionState::Closing);
            return Err(SignalingError::PeerGone(id));
        }
        Ok(())
    }
}

/// Single-item buffer for the latest unrelayed offer or answer, tagged with
/// the connection that sent it.
#[derive(Debug, Default)]
pub(crate) struct PendingSlot(Option<(ConnectionId, OutboundMessage)>);

impl PendingSlot {
    /// Store, overwriting whatever was buffered.
    pub fn fill(&mut self, from: ConnectionId, msg: OutboundMessage) {
        self.0 = Some((from, msg));
    }

    /// Take the buffered frame for delivery to `to`. A frame is never handed
    /// back to its own sender; it stays buffered instead.
    pub fn take_for(&mut self, to: ConnectionId) -> Option<(ConnectionId, OutboundMessage)> {
        let deliverable = matches!(&self.0, Some((from, _)) if *from != to);
        if deliverable { self.0.take() } else { None }
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn is_filled(&self) -> bool {
        self.0.is_some()
    }
}
