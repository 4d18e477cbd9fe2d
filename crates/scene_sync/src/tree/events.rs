use crate::types::{BehaviorRef, EntityRef, PeerId, RootTree};
use serde::Serialize;

/// Structural change raised by the entity tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum TreeEvent {
    DescendantSpawned {
        root: RootTree,
        parent: EntityRef,
        entity: EntityRef,
        inert: bool,
    },
    EntityFinalized {
        root: RootTree,
        entity: EntityRef,
    },
    /// `cascaded` is set for descendants destroyed as part of an ancestor's destruction.
    DescendantDestroyed {
        root: RootTree,
        parent: EntityRef,
        entity: EntityRef,
        cascaded: bool,
    },
    Reparented {
        root: RootTree,
        entity: EntityRef,
        old_parent: EntityRef,
        parent: EntityRef,
    },
    Renamed {
        root: RootTree,
        entity: EntityRef,
        name: String,
        old_name: String,
    },
    EnableChanged {
        root: RootTree,
        entity: EntityRef,
        enabled: bool,
    },
    AuthorityChanged {
        root: RootTree,
        entity: EntityRef,
        authority: Option<PeerId>,
    },
    /// `owner_spawning` is set while the owner is still being built from its definition.
    BehaviorAttached {
        root: RootTree,
        entity: EntityRef,
        behavior: BehaviorRef,
        owner_spawning: bool,
    },
    BehaviorDetached {
        root: RootTree,
        entity: EntityRef,
        behavior: BehaviorRef,
        cascaded: bool,
    },
}

impl TreeEvent {
    pub fn root(&self) -> RootTree {
        match self {
            TreeEvent::DescendantSpawned { root, .. }
            | TreeEvent::EntityFinalized { root, .. }
            | TreeEvent::DescendantDestroyed { root, .. }
            | TreeEvent::Reparented { root, .. }
            | TreeEvent::Renamed { root, .. }
            | TreeEvent::EnableChanged { root, .. }
            | TreeEvent::AuthorityChanged { root, .. }
            | TreeEvent::BehaviorAttached { root, .. }
            | TreeEvent::BehaviorDetached { root, .. } => *root,
        }
    }

    /// The entity the event is about.
    pub fn entity(&self) -> &EntityRef {
        match self {
            TreeEvent::DescendantSpawned { entity, .. }
            | TreeEvent::EntityFinalized { entity, .. }
            | TreeEvent::DescendantDestroyed { entity, .. }
            | TreeEvent::Reparented { entity, .. }
            | TreeEvent::Renamed { entity, .. }
            | TreeEvent::EnableChanged { entity, .. }
            | TreeEvent::AuthorityChanged { entity, .. }
            | TreeEvent::BehaviorAttached { entity, .. }
            | TreeEvent::BehaviorDetached { entity, .. } => entity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TreeEvent::DescendantSpawned { .. } => "descendant_spawned",
            TreeEvent::EntityFinalized { .. } => "entity_finalized",
            TreeEvent::DescendantDestroyed { .. } => "descendant_destroyed",
            TreeEvent::Reparented { .. } => "reparented",
            TreeEvent::Renamed { .. } => "renamed",
            TreeEvent::EnableChanged { .. } => "enable_changed",
            TreeEvent::AuthorityChanged { .. } => "authority_changed",
            TreeEvent::BehaviorAttached { .. } => "behavior_attached",
            TreeEvent::BehaviorDetached { .. } => "behavior_detached",
        }
    }
}
