//! Peer bookkeeping: identity handshake, peer list and authority release.

use crate::error::SyncError;
use crate::events::{PeerEvent, SimEvent};
use crate::protocol::{Outbound, Packet};
use crate::sim::Simulation;
use crate::types::{PeerId, Role};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Participants this simulation currently knows about, excluding itself.
#[derive(Debug, Default, Clone)]
pub struct PeerTable {
    peers: BTreeSet<PeerId>,
}

impl PeerTable {
    pub fn insert(&mut self, peer: PeerId) -> bool {
        self.peers.insert(peer)
    }

    pub fn remove(&mut self, peer: &PeerId) -> bool {
        self.peers.remove(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Simulation {
    /// Transport reports a new connection.
    ///
    /// On the server this hands the newcomer its identity, the peer list and
    /// the initial snapshot, and announces it to everyone else.
    pub fn on_peer_connected(&mut self, peer: PeerId) -> Result<(), SyncError> {
        self.peers.insert(peer.clone());
        info!("🔌 Peer {} connected", peer);

        if self.config.role == Role::Server {
            let snapshot = self.build_snapshot()?;
            let mut peers: Vec<PeerId> = self.peers.iter().cloned().collect();
            peers.push(self.local_peer().clone());
            peers.sort();

            self.push_outbound(Outbound::to(
                peer.clone(),
                Packet::Handshake {
                    peer_id: peer.clone(),
                },
            ));
            self.push_outbound(Outbound::to(peer.clone(), Packet::PeerListSnapshot { peers }));
            self.push_outbound(Outbound::to(peer.clone(), snapshot));
            self.push_outbound(Outbound::broadcast(Packet::PeerConnected {
                peer_id: peer.clone(),
            }));
        }

        self.bus.emit(&SimEvent::Peer(PeerEvent::Connected(peer)));
        Ok(())
    }

    /// Transport reports a dropped connection. The peer's authority is
    /// discarded locally without announcing it.
    pub fn on_peer_disconnected(&mut self, peer: &PeerId) {
        self.forget_peer(peer);
        if self.config.role == Role::Server {
            self.push_outbound(Outbound::broadcast(Packet::PeerDisconnected {
                peer_id: peer.clone(),
            }));
        }
    }

    fn forget_peer(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
        let owned = self.tree.entities_with_authority(peer);
        if !owned.is_empty() {
            debug!("Releasing authority of {} over {} entities", peer, owned.len());
            let released = self.guarded(owned.clone(), |sim| {
                for eref in &owned {
                    sim.tree.set_authority(eref, None)?;
                }
                Ok(())
            });
            if let Err(err) = released {
                debug!("Authority release for {} incomplete: {}", peer, err);
            }
        }
        info!("🔌 Peer {} disconnected", peer);
        self.bus
            .emit(&SimEvent::Peer(PeerEvent::Disconnected(peer.clone())));
    }

    pub(crate) fn handle_handshake(
        &mut self,
        from: Option<PeerId>,
        peer_id: PeerId,
    ) -> Result<(), SyncError> {
        if self.config.role == Role::Server {
            debug!("Ignoring handshake from {:?} on the server", from);
            return Ok(());
        }
        info!("🤝 Assigned identity {}", peer_id);
        self.values.set_local_peer(peer_id.clone());
        self.config.local_peer = peer_id.clone();
        self.bus
            .emit(&SimEvent::Peer(PeerEvent::IdentityAssigned(peer_id)));
        Ok(())
    }

    pub(crate) fn handle_peer_connected(&mut self, peer_id: PeerId) -> Result<(), SyncError> {
        if &peer_id == self.local_peer() {
            return Ok(());
        }
        if self.peers.insert(peer_id.clone()) {
            info!("🔌 Peer {} joined", peer_id);
            self.bus.emit(&SimEvent::Peer(PeerEvent::Connected(peer_id)));
        }
        Ok(())
    }

    pub(crate) fn handle_peer_disconnected(&mut self, peer_id: PeerId) -> Result<(), SyncError> {
        if &peer_id != self.local_peer() {
            self.forget_peer(&peer_id);
        }
        Ok(())
    }

    pub(crate) fn handle_peer_list(&mut self, peers: Vec<PeerId>) -> Result<(), SyncError> {
        let local = self.local_peer().clone();
        self.peers = PeerTable::default();
        for peer in peers.iter().filter(|p| **p != local) {
            self.peers.insert(peer.clone());
        }
        self.bus
            .emit(&SimEvent::Peer(PeerEvent::ListReceived(peers)));
        Ok(())
    }
}
