//! Inbound packet routing and outbound event pumping.

use super::core::Simulation;
use crate::error::SyncError;
use crate::events::SimEvent;
use crate::protocol::{self, Envelope, Outbound, Packet, Target};
use crate::types::{EntityRef, WireValue};
use tracing::{debug, trace, warn};

impl Simulation {
    /// Applies one inbound packet.
    ///
    /// A packet that references missing state fails with
    /// [`SyncError::Violation`]; it is dropped and counted, and later packets
    /// are unaffected.
    pub fn receive(&mut self, envelope: Envelope) -> Result<(), SyncError> {
        self.stats.packets_received += 1;
        let name = envelope.packet.name();

        if envelope.from.as_ref() == Some(self.local_peer()) {
            trace!("🔁 Ignoring own {} packet", name);
            return Ok(());
        }

        let result = self.dispatch(envelope);
        if let Err(err) = &result {
            self.stats.packets_dropped += 1;
            if err.is_violation() {
                warn!("⚠️ Dropping {} packet: {}", name, err);
            } else {
                warn!("❌ Failed to apply {} packet: {}", name, err);
            }
        }
        result
    }

    /// Decodes and applies one inbound packet.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> Result<(), SyncError> {
        match protocol::decode(bytes) {
            Ok(envelope) => self.receive(envelope),
            Err(err) => {
                self.stats.packets_received += 1;
                self.stats.packets_dropped += 1;
                warn!("❌ Undecodable packet ({} bytes): {}", bytes.len(), err);
                Err(err.into())
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<(), SyncError> {
        let Envelope { from, packet } = envelope;
        trace!("📨 {} from {:?}", packet.name(), from);
        match packet {
            Packet::Handshake { peer_id } => self.handle_handshake(from, peer_id),
            Packet::PeerConnected { peer_id } => self.handle_peer_connected(peer_id),
            Packet::PeerDisconnected { peer_id } => self.handle_peer_disconnected(peer_id),
            Packet::PeerListSnapshot { peers } => self.handle_peer_list(peers),
            Packet::InitialNetworkSnapshot {
                world_entities,
                prefab_entities,
            } => self.handle_initial_snapshot(world_entities, prefab_entities),
            Packet::SpawnEntity { parent, definition } => self.handle_spawn_entity(parent, definition),
            Packet::DeleteEntity { entity } => self.handle_delete_entity(entity),
            Packet::ReparentEntity {
                entity,
                old_parent,
                parent,
            } => self.handle_reparent_entity(entity, old_parent, parent),
            Packet::RenameEntity {
                entity,
                name,
                old_name,
            } => self.handle_rename_entity(entity, name, old_name),
            Packet::EntityEnableChanged { entity, enabled } => {
                self.handle_enable_changed(entity, enabled)
            }
            Packet::EntityAuthorityChanged { entity, authority } => {
                self.handle_authority_changed(entity, authority)
            }
            Packet::SpawnBehavior { entity, definition } => {
                self.handle_spawn_behavior(entity, definition)
            }
            Packet::DeleteBehavior { entity, behavior } => {
                self.handle_delete_behavior(entity, behavior)
            }
            Packet::ReportValues { reports } => self.handle_report_values(from, reports),
            Packet::CustomMessage { channel, data } => {
                self.bus.emit(&SimEvent::Custom {
                    from,
                    channel,
                    data,
                });
                Ok(())
            }
        }
    }

    /// Queues an opaque message for collaborator subsystems on other peers.
    pub fn send_custom(&mut self, target: Target, channel: impl Into<String>, data: WireValue) {
        self.push_outbound(Outbound {
            target,
            packet: Packet::CustomMessage {
                channel: channel.into(),
                data,
            },
        });
    }

    pub(crate) fn push_outbound(&mut self, outbound: Outbound) {
        self.stats.packets_sent += 1;
        debug!("📤 Queued {} for {:?}", outbound.packet.name(), outbound.target);
        self.outbox.push(outbound);
    }

    /// Runs an inbound mutation with `refs` in the ignore set, then routes
    /// its events while they are still suppressed.
    pub(crate) fn guarded<T>(
        &mut self,
        refs: Vec<EntityRef>,
        op: impl FnOnce(&mut Self) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let _guard = self.ignore.guard(refs);
        let result = op(self);
        self.pump();
        result
    }

    /// Drains queued tree events and value changes: maps them to outbound
    /// packets, marks dirty values and notifies subscribers.
    pub(crate) fn pump(&mut self) {
        for event in self.tree.drain_events() {
            if let Some(packet) = self.structural_outbound(&event) {
                self.push_outbound(Outbound::broadcast(packet));
            }
            self.bus.emit(&SimEvent::Tree(event));
        }
        for change in self.values.drain_changes() {
            // Writes made while handling an inbound packet (behavior setup
            // during a remote spawn or snapshot finalization) stay local.
            if self.ignore.contains(&change.owner) {
                trace!("🔇 Not reporting {} written under inbound handling", change.id);
            } else {
                self.dirty.mark(&change.id, change.clock);
            }
            self.bus.emit(&SimEvent::ValueChanged(change));
        }
    }
}
