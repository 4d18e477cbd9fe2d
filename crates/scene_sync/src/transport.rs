//! # Packet Transport
//!
//! The boundary to whatever actually moves bytes between participants.
//! Connection setup, sockets and reliability live behind
//! [`PacketTransport`]; the engine only hands it envelopes to deliver.
//!
//! [`LoopbackHub`] is an in-process implementation used for tests and
//! soak runs: every connected participant gets an unbounded channel of
//! encoded envelopes.

use crate::error::TransportError;
use crate::protocol::{self, Envelope, Outbound, Target};
use crate::types::PeerId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Receiving end of a participant's connection to the hub.
pub type Inbound = mpsc::UnboundedReceiver<Vec<u8>>;

/// Delivers outbound packets on behalf of a participant.
#[async_trait]
pub trait PacketTransport: Send + Sync {
    /// Sends one packet from `from` to its target.
    async fn send(&self, from: &PeerId, outbound: Outbound) -> Result<(), TransportError>;
}

/// In-process broadcast bus.
///
/// Broadcasts reach every connected participant except the sender; directed
/// packets reach exactly one. Per-recipient ordering is preserved.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    peers: Arc<DashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a participant and returns its inbound byte stream.
    /// Reconnecting under the same id replaces the previous stream.
    pub fn connect(&self, peer: PeerId) -> Inbound {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!("🔗 {} connected to loopback hub", peer);
        self.peers.insert(peer, tx);
        rx
    }

    /// Drops a participant; its inbound stream ends.
    pub fn disconnect(&self, peer: &PeerId) -> bool {
        debug!("🔗 {} disconnected from loopback hub", peer);
        self.peers.remove(peer).is_some()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn deliver(&self, to: &PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let sender = self
            .peers
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::PeerNotConnected(to.clone()))?;
        sender
            .send(bytes)
            .map_err(|_| TransportError::ChannelClosed(to.to_string()))
    }
}

#[async_trait]
impl PacketTransport for LoopbackHub {
    async fn send(&self, from: &PeerId, outbound: Outbound) -> Result<(), TransportError> {
        let name = outbound.packet.name();
        let bytes = protocol::encode(&Envelope::new(from.clone(), outbound.packet))?;

        match outbound.target {
            Target::Peer(peer) => {
                trace!("➡️ {} {} -> {}", name, from, peer);
                self.deliver(&peer, bytes)
            }
            Target::Broadcast => {
                let recipients: Vec<_> = self
                    .peers
                    .iter()
                    .filter(|entry| entry.key() != from)
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect();
                trace!("📡 {} {} -> {} peers", name, from, recipients.len());
                for (peer, sender) in recipients {
                    if sender.send(bytes.clone()).is_err() {
                        debug!("Dropping {} for {}: channel closed", name, peer);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Packet;
    use crate::types::EntityRef;

    fn delete(entity: &str) -> Packet {
        Packet::DeleteEntity {
            entity: EntityRef::from(entity),
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = LoopbackHub::new();
        let server = PeerId::server();
        let mut server_rx = hub.connect(server.clone());
        let mut a_rx = hub.connect(PeerId::new("peer-A"));
        let mut b_rx = hub.connect(PeerId::new("peer-B"));

        hub.send(&server, Outbound::broadcast(delete("ent_1"))).await.unwrap();

        for rx in [&mut a_rx, &mut b_rx] {
            let envelope = protocol::decode(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(envelope.from, Some(server.clone()));
            assert_eq!(envelope.packet, delete("ent_1"));
        }
        assert!(server_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_directed_send() {
        let hub = LoopbackHub::new();
        let mut a_rx = hub.connect(PeerId::new("peer-A"));
        let mut b_rx = hub.connect(PeerId::new("peer-B"));

        hub.send(
            &PeerId::server(),
            Outbound::to(PeerId::new("peer-B"), delete("ent_2")),
        )
        .await
        .unwrap();

        assert!(b_rx.recv().await.is_some());
        assert!(a_rx.try_recv().is_err());

        let err = hub
            .send(&PeerId::server(), Outbound::to(PeerId::new("peer-Z"), delete("ent_2")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::PeerNotConnected(_)));
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let hub = LoopbackHub::new();
        let peer = PeerId::new("peer-A");
        let mut rx = hub.connect(peer.clone());
        assert!(hub.disconnect(&peer));
        assert!(!hub.is_connected(&peer));
        assert!(rx.recv().await.is_none());
    }
}
