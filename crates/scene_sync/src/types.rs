//! # Core Type Definitions
//!
//! Identifier types shared by every layer of the replication engine.
//!
//! ## Key Types
//!
//! - [`PeerId`] - Identity of a participant (server or client), ordered lexicographically
//! - [`EntityRef`] - Stable, never-reused reference to an entity
//! - [`BehaviorRef`] - Stable reference to a behavior attached to an entity
//! - [`ValueId`] - Derived identifier of a replicated field
//! - [`RootTree`] - Which logical tree an entity lives in
//!
//! Wrapper types keep the different kinds of references from being confused with
//! each other, while still serializing as plain strings on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wire-safe representation of any replicated value.
pub type WireValue = serde_json::Value;

/// Identity of a participant in a replication session.
///
/// Peer ids are compared as strings when two writes race at the same clock,
/// so the ordering of this type is part of the conflict-resolution contract.
///
/// # Examples
///
/// ```rust
/// use scene_sync::PeerId;
///
/// let a = PeerId::new("peer-A");
/// let b = PeerId::new("peer-B");
/// assert!(a < b);
/// assert_eq!(PeerId::server().as_str(), "server");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Identity used for the authoritative side and for packets that do not name a sender.
    pub const SERVER: &'static str = "server";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel "server" identity.
    pub fn server() -> Self {
        Self(Self::SERVER.to_string())
    }

    /// Creates a random client identity.
    pub fn random() -> Self {
        Self(format!("peer-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_server(&self) -> bool {
        self.0 == Self::SERVER
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stable reference to an entity.
///
/// Fresh references are UUID v4 strings, so a reference allocated by one
/// participant never collides with one allocated by another and is never
/// reused. Definitions may also carry explicit references (for example
/// `"ent_1"`), which are honoured verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    /// Allocates a new globally unique reference.
    pub fn new() -> Self {
        Self(format!("ent_{}", Uuid::new_v4().simple()))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(s: &str) -> Self {
        Self::from_raw(s)
    }
}

/// Stable reference to a behavior attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorRef(String);

impl BehaviorRef {
    /// Allocates a new globally unique reference.
    pub fn new() -> Self {
        Self(format!("bhv_{}", Uuid::new_v4().simple()))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BehaviorRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BehaviorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BehaviorRef {
    fn from(s: &str) -> Self {
        Self::from_raw(s)
    }
}

/// Identifier of a replicated field.
///
/// Derived deterministically from the owning entity, the optional owning
/// behavior and the field name, so any participant can recompute it without
/// a lookup table.
///
/// # Examples
///
/// ```rust
/// use scene_sync::{BehaviorRef, EntityRef, ValueId};
///
/// let id = ValueId::derive(&EntityRef::from("ent_1"), Some(&BehaviorRef::from("behavior_1")), "speed");
/// assert_eq!(id.as_str(), "ent_1/behavior_1/speed");
///
/// let id = ValueId::derive(&EntityRef::from("ent_1"), None, "label");
/// assert_eq!(id.as_str(), "ent_1/label");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueId(String);

impl ValueId {
    pub fn derive(entity: &EntityRef, behavior: Option<&BehaviorRef>, field: &str) -> Self {
        match behavior {
            Some(behavior) => Self(format!("{}/{}/{}", entity, behavior, field)),
            None => Self(format!("{}/{}", entity, field)),
        }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValueId {
    fn from(s: &str) -> Self {
        Self::from_raw(s)
    }
}

/// The logical tree an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RootTree {
    /// The live simulated world.
    World,
    /// Template library that peers keep in sync but do not simulate.
    Prefabs,
    /// Purely local entities, never replicated.
    Local,
}

impl RootTree {
    pub const ALL: [RootTree; 3] = [RootTree::World, RootTree::Prefabs, RootTree::Local];

    /// The fixed reference of this tree's root entity.
    pub fn root_ref(self) -> EntityRef {
        EntityRef::from_raw(match self {
            RootTree::World => "root:world",
            RootTree::Prefabs => "root:prefabs",
            RootTree::Local => "root:local",
        })
    }

    pub fn is_replicated(self) -> bool {
        !matches!(self, RootTree::Local)
    }
}

/// Role of a simulation instance in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authoritative side: hands out identities and initial snapshots.
    Server,
    Client,
}

impl Default for Role {
    fn default() -> Self {
        Self::Client
    }
}
