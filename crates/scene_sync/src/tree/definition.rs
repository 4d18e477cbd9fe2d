//! Serializable entity and behavior definitions.
//!
//! A definition is the recursive shape used both to spawn entities locally
//! and to transfer them over the wire.

use crate::error::ProtocolError;
use crate::types::{BehaviorRef, EntityRef, PeerId, WireValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Initial value of a field, with the clock and originator of its last write.
///
/// A missing originator means the value was seeded authoritatively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub value: WireValue,
    #[serde(default)]
    pub clock: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator: Option<PeerId>,
}

impl FieldInit {
    pub fn new(value: impl Into<WireValue>) -> Self {
        Self {
            value: value.into(),
            clock: 0,
            originator: None,
        }
    }
}

/// Construction data for a behavior attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDefinition {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub bref: Option<BehaviorRef>,
    pub type_uri: String,
    #[serde(default)]
    pub values: BTreeMap<String, FieldInit>,
}

impl BehaviorDefinition {
    pub fn new(type_uri: impl Into<String>) -> Self {
        Self {
            bref: None,
            type_uri: type_uri.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_ref(mut self, bref: impl Into<BehaviorRef>) -> Self {
        self.bref = Some(bref.into());
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.values.insert(field.into(), FieldInit::new(value));
        self
    }
}

fn default_enabled() -> bool {
    true
}

/// Recursive construction data for an entity and its subtree.
///
/// # Examples
///
/// ```rust
/// use scene_sync::tree::{BehaviorDefinition, EntityDefinition};
///
/// let ship = EntityDefinition::new("Ship")
///     .with_ref("ent_1")
///     .with_type("ship")
///     .with_value("hull", 100)
///     .with_behavior(BehaviorDefinition::new("behaviors/engine").with_ref("behavior_1"))
///     .with_child(EntityDefinition::new("Turret"));
///
/// assert_eq!(ship.children.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub eref: Option<EntityRef>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<PeerId>,
    #[serde(default)]
    pub values: BTreeMap<String, FieldInit>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorDefinition>,
    #[serde(default)]
    pub children: Vec<EntityDefinition>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            eref: None,
            name: name.into(),
            entity_type: None,
            enabled: true,
            authority: None,
            values: BTreeMap::new(),
            behaviors: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_ref(mut self, eref: impl Into<EntityRef>) -> Self {
        self.eref = Some(eref.into());
        self
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.values.insert(field.into(), FieldInit::new(value));
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorDefinition) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn with_child(mut self, child: EntityDefinition) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_authority(mut self, peer: PeerId) -> Self {
        self.authority = Some(peer);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Fills every missing entity and behavior ref in the subtree with a fresh one.
    pub fn assign_refs(&mut self) {
        if self.eref.is_none() {
            self.eref = Some(EntityRef::new());
        }
        for behavior in &mut self.behaviors {
            if behavior.bref.is_none() {
                behavior.bref = Some(BehaviorRef::new());
            }
        }
        for child in &mut self.children {
            child.assign_refs();
        }
    }

    /// Inbound definitions must name every ref explicitly.
    pub fn require_refs(&self) -> Result<(), ProtocolError> {
        if self.eref.is_none() {
            return Err(ProtocolError::MissingRef(self.name.clone()));
        }
        if let Some(behavior) = self.behaviors.iter().find(|b| b.bref.is_none()) {
            return Err(ProtocolError::MissingRef(behavior.type_uri.clone()));
        }
        self.children.iter().try_for_each(EntityDefinition::require_refs)
    }

    /// Every explicit entity ref in the subtree, pre-order.
    pub fn entity_refs(&self) -> Vec<EntityRef> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, out: &mut Vec<EntityRef>) {
        if let Some(eref) = &self.eref {
            out.push(eref.clone());
        }
        for child in &self.children {
            child.collect_refs(out);
        }
    }
}
