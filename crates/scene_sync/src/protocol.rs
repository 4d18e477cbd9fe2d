//! # Wire Protocol
//!
//! Every message is a [`Packet`] wrapped in an [`Envelope`] naming its
//! sender. Envelopes travel as JSON; packets are tagged with a `type` field.
//!
//! ```json
//! {"from":"peer-A","packet":{"type":"RenameEntity","entity":"ent_1","name":"Ship","old_name":"Boat"}}
//! ```

use crate::error::ProtocolError;
use crate::tree::{BehaviorDefinition, EntityDefinition};
use crate::types::{BehaviorRef, EntityRef, PeerId, ValueId, WireValue};
use serde::{Deserialize, Serialize};

/// One entry of a `ReportValues` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueReport {
    pub identifier: ValueId,
    pub value: WireValue,
    pub clock: u64,
}

/// Replication operations exchanged between participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    /// Assigns the receiving peer its identity.
    Handshake { peer_id: PeerId },
    PeerConnected { peer_id: PeerId },
    PeerDisconnected { peer_id: PeerId },
    PeerListSnapshot { peers: Vec<PeerId> },
    /// Full state sent once on connect.
    InitialNetworkSnapshot {
        world_entities: Vec<EntityDefinition>,
        prefab_entities: Vec<EntityDefinition>,
    },
    SpawnEntity {
        parent: EntityRef,
        definition: EntityDefinition,
    },
    DeleteEntity { entity: EntityRef },
    ReparentEntity {
        entity: EntityRef,
        old_parent: EntityRef,
        parent: EntityRef,
    },
    RenameEntity {
        entity: EntityRef,
        name: String,
        old_name: String,
    },
    EntityEnableChanged { entity: EntityRef, enabled: bool },
    EntityAuthorityChanged {
        entity: EntityRef,
        authority: Option<PeerId>,
    },
    SpawnBehavior {
        entity: EntityRef,
        definition: BehaviorDefinition,
    },
    DeleteBehavior {
        entity: EntityRef,
        behavior: BehaviorRef,
    },
    ReportValues { reports: Vec<ValueReport> },
    /// Opaque pass-through for collaborator subsystems.
    CustomMessage { channel: String, data: WireValue },
}

impl Packet {
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Handshake { .. } => "Handshake",
            Packet::PeerConnected { .. } => "PeerConnected",
            Packet::PeerDisconnected { .. } => "PeerDisconnected",
            Packet::PeerListSnapshot { .. } => "PeerListSnapshot",
            Packet::InitialNetworkSnapshot { .. } => "InitialNetworkSnapshot",
            Packet::SpawnEntity { .. } => "SpawnEntity",
            Packet::DeleteEntity { .. } => "DeleteEntity",
            Packet::ReparentEntity { .. } => "ReparentEntity",
            Packet::RenameEntity { .. } => "RenameEntity",
            Packet::EntityEnableChanged { .. } => "EntityEnableChanged",
            Packet::EntityAuthorityChanged { .. } => "EntityAuthorityChanged",
            Packet::SpawnBehavior { .. } => "SpawnBehavior",
            Packet::DeleteBehavior { .. } => "DeleteBehavior",
            Packet::ReportValues { .. } => "ReportValues",
            Packet::CustomMessage { .. } => "CustomMessage",
        }
    }
}

/// A packet plus the identity of its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<PeerId>,
    pub packet: Packet,
}

impl Envelope {
    pub fn new(from: PeerId, packet: Packet) -> Self {
        Self {
            from: Some(from),
            packet,
        }
    }

    /// An envelope with no declared sender; treated as coming from the server.
    pub fn anonymous(packet: Packet) -> Self {
        Self { from: None, packet }
    }
}

/// Where an outbound packet should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every other connected participant.
    Broadcast,
    Peer(PeerId),
}

/// A packet queued by the simulation for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub packet: Packet,
}

impl Outbound {
    pub fn broadcast(packet: Packet) -> Self {
        Self {
            target: Target::Broadcast,
            packet,
        }
    }

    pub fn to(peer: PeerId, packet: Packet) -> Self {
        Self {
            target: Target::Peer(peer),
            packet,
        }
    }
}

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(envelope).map_err(ProtocolError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_packet_wire_shape() {
        let envelope = Envelope::new(
            PeerId::new("peer-A"),
            Packet::RenameEntity {
                entity: EntityRef::from("ent_1"),
                name: "Ship".to_string(),
                old_name: "Boat".to_string(),
            },
        );
        let value: serde_json::Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "from": "peer-A",
                "packet": {"type": "RenameEntity", "entity": "ent_1", "name": "Ship", "old_name": "Boat"}
            })
        );
    }

    #[test]
    fn test_decode_definition_with_defaults() {
        let bytes = br#"{"packet":{"type":"SpawnEntity","parent":"root:world",
            "definition":{"ref":"ent_1","name":"Ship","values":{"hull":{"value":3}},
            "behaviors":[{"ref":"behavior_1","type_uri":"behaviors/engine"}]}}}"#;
        let envelope = decode(bytes).unwrap();
        assert_eq!(envelope.from, None);
        match envelope.packet {
            Packet::SpawnEntity { parent, definition } => {
                assert_eq!(parent, EntityRef::from("root:world"));
                assert!(definition.enabled);
                assert_eq!(definition.values["hull"].clock, 0);
                assert_eq!(definition.behaviors[0].bref, Some(BehaviorRef::from("behavior_1")));
                assert!(definition.children.is_empty());
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(decode(b"not json"), Err(ProtocolError::Decode(_))));
        assert!(matches!(
            decode(br#"{"packet":{"type":"Teleport"}}"#),
            Err(ProtocolError::Decode(_))
        ));
    }
}
