use crate::types::{BehaviorRef, EntityRef, PeerId, RootTree, ValueId};
use serde::Serialize;

/// Lifecycle state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityState {
    /// Being constructed from its definition.
    Spawning,
    /// Structurally present, behaviors not yet set up.
    Inert,
    /// Behaviors set up; fully live.
    Finalized,
}

/// A node of the entity tree.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) eref: EntityRef,
    pub(crate) name: String,
    pub(crate) entity_type: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) parent: Option<EntityRef>,
    pub(crate) children: Vec<EntityRef>,
    pub(crate) behaviors: Vec<BehaviorRef>,
    pub(crate) fields: Vec<String>,
    pub(crate) authority: Option<PeerId>,
    pub(crate) root: RootTree,
    pub(crate) state: EntityState,
}

impl Entity {
    pub(crate) fn root_entity(root: RootTree) -> Self {
        let name = match root {
            RootTree::World => "World",
            RootTree::Prefabs => "Prefabs",
            RootTree::Local => "Local",
        };
        Self {
            eref: root.root_ref(),
            name: name.to_string(),
            entity_type: None,
            enabled: true,
            parent: None,
            children: Vec::new(),
            behaviors: Vec::new(),
            fields: Vec::new(),
            authority: None,
            root,
            state: EntityState::Finalized,
        }
    }

    pub fn eref(&self) -> &EntityRef {
        &self.eref
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// `None` only for root entities.
    pub fn parent(&self) -> Option<&EntityRef> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[EntityRef] {
        &self.children
    }

    pub fn behaviors(&self) -> &[BehaviorRef] {
        &self.behaviors
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    pub fn field_id(&self, field: &str) -> ValueId {
        ValueId::derive(&self.eref, None, field)
    }

    /// Participant allowed to originate writes; `None` when unclaimed.
    pub fn authority(&self) -> Option<&PeerId> {
        self.authority.as_ref()
    }

    pub fn root(&self) -> RootTree {
        self.root
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
