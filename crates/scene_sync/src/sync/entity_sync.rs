//! Structural synchronization: entity spawn, destroy, reparent, rename,
//! enable and authority changes.

use crate::error::SyncError;
use crate::protocol::Packet;
use crate::sim::Simulation;
use crate::tree::{EntityDefinition, SpawnMode, TreeEvent};
use crate::types::{EntityRef, PeerId};
use tracing::{debug, trace};

impl Simulation {
    /// Maps a tree event to the packet announcing it, if any.
    ///
    /// Nothing is sent for the local tree, for refs in the ignore set, for
    /// descendants destroyed along with an ancestor, or for behaviors
    /// attached while their owner is still being built. Everything except
    /// renames waits for the running state.
    pub(crate) fn structural_outbound(&self, event: &TreeEvent) -> Option<Packet> {
        if !event.root().is_replicated() {
            return None;
        }
        if self.ignore.contains(event.entity()) {
            trace!("🔇 Suppressed {} for {}", event.name(), event.entity());
            return None;
        }
        let running = self.is_running();

        match event {
            TreeEvent::DescendantSpawned { parent, entity, .. } if running => {
                match self.tree.to_definition(entity, &self.values) {
                    Ok(definition) => Some(Packet::SpawnEntity {
                        parent: parent.clone(),
                        definition,
                    }),
                    Err(err) => {
                        debug!("Skipping spawn announcement for {}: {}", entity, err);
                        None
                    }
                }
            }
            TreeEvent::DescendantDestroyed {
                entity,
                cascaded: false,
                ..
            } if running => Some(Packet::DeleteEntity {
                entity: entity.clone(),
            }),
            TreeEvent::Reparented {
                entity,
                old_parent,
                parent,
                ..
            } if running => Some(Packet::ReparentEntity {
                entity: entity.clone(),
                old_parent: old_parent.clone(),
                parent: parent.clone(),
            }),
            TreeEvent::Renamed {
                entity,
                name,
                old_name,
                ..
            } => Some(Packet::RenameEntity {
                entity: entity.clone(),
                name: name.clone(),
                old_name: old_name.clone(),
            }),
            TreeEvent::EnableChanged {
                entity, enabled, ..
            } if running => Some(Packet::EntityEnableChanged {
                entity: entity.clone(),
                enabled: *enabled,
            }),
            TreeEvent::AuthorityChanged {
                entity, authority, ..
            } if running => Some(Packet::EntityAuthorityChanged {
                entity: entity.clone(),
                authority: authority.clone(),
            }),
            TreeEvent::BehaviorAttached {
                entity,
                behavior,
                owner_spawning: false,
                ..
            } if running => match self.tree.behavior_definition(behavior, &self.values) {
                Ok(definition) => Some(Packet::SpawnBehavior {
                    entity: entity.clone(),
                    definition,
                }),
                Err(err) => {
                    debug!("Skipping behavior announcement for {}: {}", behavior, err);
                    None
                }
            },
            TreeEvent::BehaviorDetached {
                entity,
                behavior,
                cascaded: false,
                ..
            } if running => Some(Packet::DeleteBehavior {
                entity: entity.clone(),
                behavior: behavior.clone(),
            }),
            _ => None,
        }
    }

    /// Fails with a violation unless `eref` names a replicated entity here.
    pub(crate) fn require_entity(
        &self,
        operation: &'static str,
        eref: &EntityRef,
    ) -> Result<(), SyncError> {
        match self.tree.get(eref) {
            Some(entity) if entity.root().is_replicated() => Ok(()),
            _ => Err(SyncError::violation(operation, eref)),
        }
    }

    pub(crate) fn handle_spawn_entity(
        &mut self,
        parent: EntityRef,
        definition: EntityDefinition,
    ) -> Result<(), SyncError> {
        self.require_entity("SpawnEntity", &parent)?;
        definition.require_refs()?;

        let mode = if self.is_running() {
            SpawnMode::Live
        } else {
            SpawnMode::Inert
        };
        let refs = definition.entity_refs();
        let eref = self.guarded(refs, |sim| {
            Ok(sim
                .tree
                .spawn(&parent, definition, mode, &mut sim.values, &sim.types)?)
        })?;
        if mode == SpawnMode::Inert {
            self.pending_finalize.push(eref.clone());
        }
        debug!("📥 Remote spawn of {} under {}", eref, parent);
        Ok(())
    }

    pub(crate) fn handle_delete_entity(&mut self, entity: EntityRef) -> Result<(), SyncError> {
        self.require_entity("DeleteEntity", &entity)?;
        let refs = self.tree.subtree(&entity);
        self.guarded(refs, |sim| Ok(sim.tree.destroy(&entity, &mut sim.values)?))
    }

    pub(crate) fn handle_reparent_entity(
        &mut self,
        entity: EntityRef,
        old_parent: EntityRef,
        parent: EntityRef,
    ) -> Result<(), SyncError> {
        self.require_entity("ReparentEntity", &entity)?;
        self.require_entity("ReparentEntity", &parent)?;
        let current = self.tree.get(&entity).and_then(|e| e.parent().cloned());
        if current.as_ref() != Some(&old_parent) {
            debug!(
                "Reparent of {} expected parent {} but found {:?}",
                entity, old_parent, current
            );
        }
        self.guarded(vec![entity.clone()], |sim| {
            sim.tree.reparent(&entity, &parent)?;
            Ok(())
        })
    }

    pub(crate) fn handle_rename_entity(
        &mut self,
        entity: EntityRef,
        name: String,
        old_name: String,
    ) -> Result<(), SyncError> {
        self.require_entity("RenameEntity", &entity)?;
        trace!("Rename {} from '{}' to '{}'", entity, old_name, name);
        self.guarded(vec![entity.clone()], |sim| {
            sim.tree.rename(&entity, &name)?;
            Ok(())
        })
    }

    pub(crate) fn handle_enable_changed(
        &mut self,
        entity: EntityRef,
        enabled: bool,
    ) -> Result<(), SyncError> {
        self.require_entity("EntityEnableChanged", &entity)?;
        self.guarded(vec![entity.clone()], |sim| {
            Ok(sim.tree.set_enabled(&entity, enabled)?)
        })
    }

    pub(crate) fn handle_authority_changed(
        &mut self,
        entity: EntityRef,
        authority: Option<PeerId>,
    ) -> Result<(), SyncError> {
        self.require_entity("EntityAuthorityChanged", &entity)?;
        self.guarded(vec![entity.clone()], |sim| {
            Ok(sim.tree.set_authority(&entity, authority)?)
        })
    }
}
