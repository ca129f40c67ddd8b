use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::session::{RelaySession, RelayStats};
use super::types::{ConnectionId, OutboundMessage, SignalingError};

/// Commands sent to the relay actor
pub(crate) enum RelayCommand {
    Connect {
        id: ConnectionId,
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
    },
    /// Fired once per connection by its grace timer
    GraceElapsed {
        id: ConnectionId,
    },
    Frame {
        id: ConnectionId,
        frame: OutboundMessage,
    },
    Closing {
        id: ConnectionId,
    },
    Disconnect {
        id: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
}

/// Owns the [`RelaySession`] and applies commands strictly in arrival order.
///
/// Grace timers hold a weak sender only, so the actor still stops once every
/// [`RelayHandle`] is dropped.
pub(crate) async fn relay_actor(
    mut rx: mpsc::Receiver<RelayCommand>,
    self_tx: mpsc::WeakSender<RelayCommand>,
    grace_delay: Duration,
) {
    let mut session = RelaySession::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Connect { id, peer_tx } => {
                session.connect(id, peer_tx);
                schedule_grace(self_tx.clone(), id, grace_delay);
            }

            RelayCommand::GraceElapsed { id } => session.grace_elapsed(id),

            RelayCommand::Frame { id, frame } => session.handle_frame(id, frame),

            RelayCommand::Closing { id } => session.mark_closing(id),

            RelayCommand::Disconnect { id } => {
                session.disconnect(id);
            }

            RelayCommand::Stats { reply } => {
                let _ = reply.send(session.stats());
            }
        }
    }

    debug!("Relay actor stopped");
}

fn schedule_grace(tx: mpsc::WeakSender<RelayCommand>, id: ConnectionId, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(tx) = tx.upgrade() {
            let _ = tx.send(RelayCommand::GraceElapsed { id }).await;
        }
    });
}

/// Handle to communicate with the relay actor
#[derive(Clone)]
pub struct RelayHandle {
    pub(crate) tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Spawn a relay actor on the current runtime.
    pub fn spawn(grace_delay: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<RelayCommand>(1024);
        tokio::spawn(relay_actor(rx, tx.downgrade(), grace_delay));
        Self { tx }
    }

    /// Register an upgraded connection and its outbound channel
    pub async fn connect(&self, id: ConnectionId, peer_tx: mpsc::UnboundedSender<OutboundMessage>) {
        let _ = self.tx.send(RelayCommand::Connect { id, peer_tx }).await;
    }

    /// Hand a received text or binary frame to the relay
    pub async fn frame(&self, id: ConnectionId, frame: OutboundMessage) {
        let _ = self.tx.send(RelayCommand::Frame { id, frame }).await;
    }

    /// The connection received or started a close handshake
    pub async fn closing(&self, id: ConnectionId) {
        let _ = self.tx.send(RelayCommand::Closing { id }).await;
    }

    /// The connection is gone
    pub async fn disconnect(&self, id: ConnectionId) {
        let _ = self.tx.send(RelayCommand::Disconnect { id }).await;
    }

    pub async fn stats(&self) -> Result<RelayStats, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(RelayCommand::Stats { reply: reply_tx }).await;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    const GRACE: Duration = Duration::from_millis(100);
    const OFFER: &str = r#"{"sdp":{"type":"offer","sdp":"v=0"}}"#;

    #[tokio::test(start_paused = true)]
    async fn peer_ready_waits_for_grace_delay() {
        let handle = RelayHandle::spawn(GRACE);
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();

        handle.connect(ConnectionId::from(1), a_tx).await;
        handle.connect(ConnectionId::from(2), b_tx).await;
        handle.stats().await.unwrap();
        assert!(matches!(b_rx.try_recv(), Err(TryRecvError::Empty)));

        tokio::time::sleep(GRACE * 2).await;
        handle.stats().await.unwrap();

        assert_eq!(b_rx.try_recv().unwrap(), OutboundMessage::text(r#"{"type":"peer-ready"}"#));
        assert_eq!(a_rx.try_recv().unwrap(), OutboundMessage::text(r#"{"type":"peer-ready"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_timer_is_noop_after_disconnect() {
        let handle = RelayHandle::spawn(GRACE);
        let (a_tx, _a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from(1);
        let b = ConnectionId::from(2);

        handle.connect(a, a_tx).await;
        tokio::time::sleep(GRACE * 2).await;
        handle.frame(a, OutboundMessage::text(OFFER)).await;

        handle.connect(b, b_tx).await;
        handle.disconnect(b).await;
        tokio::time::sleep(GRACE * 2).await;

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.peers, 1);
        // b's disconnect is a peer leaving: the offer is stale
        assert!(!stats.pending_offer);
        assert!(matches!(b_rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_then_disconnect_counts_once() {
        let handle = RelayHandle::spawn(GRACE);
        let (a_tx, _a_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from(7);

        handle.connect(a, a_tx).await;
        handle.closing(a).await;
        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.peers, 1);
        assert_eq!(stats.open_peers, 0);

        handle.disconnect(a).await;
        handle.disconnect(a).await;
        assert_eq!(handle.stats().await.unwrap(), RelayStats::default());
    }
}
