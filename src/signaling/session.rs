use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{SdpKind, ServerMessage, SignalingMessage};
use super::types::{ConnectionId, ConnectionState, OutboundMessage, PeerState, PendingSlot};

/// Point-in-time view of the relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStats {
    pub peers: usize,
    pub open_peers: usize,
    pub pending_offer: bool,
    pub pending_answer: bool,
}

/// Session state of the relay: the peer set and the two pending slots.
///
/// Every handler runs to completion before the next one starts; the owner
/// (the relay actor) guarantees that ordering.
#[derive(Debug, Default)]
pub struct RelaySession {
    peers: HashMap<ConnectionId, PeerState>,
    pending_offer: PendingSlot,
    pending_answer: PendingSlot,
}

impl RelaySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly upgraded connection.
    ///
    /// Notifications and buffered replay wait for [`grace_elapsed`](Self::grace_elapsed).
    pub fn connect(&mut self, id: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        self.peers.insert(id, PeerState::new(tx));
        info!("Peer {} connected. Total peers: {}", id, self.peers.len());
    }

    /// Deferred post-connect step for `id`.
    ///
    /// Announces `peer-ready` both ways when another open peer exists, then
    /// hands over any buffered offer and answer. A no-op once `id` is no
    /// longer open.
    pub fn grace_elapsed(&mut self, id: ConnectionId) {
        let still_open = self.peers.get(&id).is_some_and(|p| p.state.is_open());
        if !still_open {
            debug!("Peer {} gone before grace delay elapsed", id);
            return;
        }

        let others = self.open_peers_except(id);
        if !others.is_empty() {
            info!("Notifying {} about {} existing peer(s)", id, others.len());
            let ready = OutboundMessage::from(ServerMessage::PeerReady.to_json());
            self.send_to(id, ready.clone());
            for other in others {
                self.send_to(other, ready.clone());
            }
        }

        // descriptions buffered by `id` itself stay for the next peer; a
        // failed hand-over keeps the description buffered
        if let Some((from, offer)) = self.pending_offer.take_for(id) {
            info!("Replaying pending offer from {} to {}", from, id);
            if !self.send_to(id, offer.clone()) {
                self.pending_offer.fill(from, offer);
            }
        }
        if let Some((from, answer)) = self.pending_answer.take_for(id) {
            info!("Replaying pending answer from {} to {}", from, id);
            if !self.send_to(id, answer.clone()) {
                self.pending_answer.fill(from, answer);
            }
        }
    }

    /// Handle a data frame received from `from`.
    pub fn handle_frame(&mut self, from: ConnectionId, frame: OutboundMessage) {
        let msg = SignalingMessage::decode(frame.as_bytes());

        match msg {
            SignalingMessage::Ready => {
                let others = self.open_peers_except(from);
                debug!("Peer {} is ready, notifying {} peer(s)", from, others.len());
                let ready = OutboundMessage::from(ServerMessage::PeerReady.to_json());
                for other in others {
                    self.send_to(other, ready.clone());
                }
            }

            SignalingMessage::PeerReady
            | SignalingMessage::SessionDescription { .. }
            | SignalingMessage::IceCandidate { .. }
            | SignalingMessage::Opaque => {
                let bufferable = msg.bufferable_kind();
                let others = self.open_peers_except(from);
                debug!(
                    "Received {} from {}. Relaying to {} peer(s)",
                    msg.label(),
                    from,
                    others.len()
                );

                let delivered = others
                    .into_iter()
                    .filter(|&other| self.send_to(other, frame.clone()))
                    .count();

                if delivered > 0 {
                    // the relayed description supersedes anything buffered
                    match bufferable {
                        Some(SdpKind::Offer) => self.pending_offer.clear(),
                        Some(SdpKind::Answer) => self.pending_answer.clear(),
                        _ => {}
                    }
                    return;
                }

                match bufferable {
                    Some(SdpKind::Offer) => {
                        info!("No other peers connected, storing pending offer from {}", from);
                        self.pending_offer.fill(from, frame);
                    }
                    Some(SdpKind::Answer) => {
                        info!("No other peers connected, storing pending answer from {}", from);
                        self.pending_answer.fill(from, frame);
                    }
                    _ => debug!("No other peers connected, dropping {} from {}", msg.label(), from),
                }
            }
        }
    }

    /// The peer started closing; it stops being a relay target.
    pub fn mark_closing(&mut self, id: ConnectionId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.state.advance(ConnectionState::Closing);
        }
    }

    /// Remove `id` and drop any half-finished negotiation.
    ///
    /// Returns false if `id` was already removed; a repeated close changes
    /// nothing.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let Some(mut peer) = self.peers.remove(&id) else {
            return false;
        };
        peer.state.advance(ConnectionState::Closed);

        if self.pending_offer.is_filled() || self.pending_answer.is_filled() {
            info!("Clearing pending session descriptions after {} left", id);
        }
        self.pending_offer.clear();
        self.pending_answer.clear();

        info!("Peer {} disconnected. Total peers: {}", id, self.peers.len());
        true
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            peers: self.peers.len(),
            open_peers: self.peers.values().filter(|p| p.state.is_open()).count(),
            pending_offer: self.pending_offer.is_filled(),
            pending_answer: self.pending_answer.is_filled(),
        }
    }

    fn open_peers_except(&self, id: ConnectionId) -> Vec<ConnectionId> {
        self.peers
            .iter()
            .filter(|(other, peer)| **other != id && peer.state.is_open())
            .map(|(other, _)| *other)
            .collect()
    }

    /// Send to one peer; failures are logged and reported as `false`.
    fn send_to(&mut self, id: ConnectionId, msg: OutboundMessage) -> bool {
        let Some(peer) = self.peers.get_mut(&id) else {
            return false;
        };
        match peer.send(id, msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("Send to {} failed ({}), state: {}", id, e, peer.state);
                false
            }
        }
    }
}
