//! Behavior attach/detach synchronization.

use crate::error::{ProtocolError, SyncError};
use crate::sim::Simulation;
use crate::tree::BehaviorDefinition;
use crate::types::{BehaviorRef, EntityRef};
use tracing::debug;

impl Simulation {
    pub(crate) fn handle_spawn_behavior(
        &mut self,
        entity: EntityRef,
        definition: BehaviorDefinition,
    ) -> Result<(), SyncError> {
        self.require_entity("SpawnBehavior", &entity)?;
        if definition.bref.is_none() {
            return Err(ProtocolError::MissingRef(definition.type_uri).into());
        }
        let bref = self.guarded(vec![entity.clone()], |sim| {
            Ok(sim
                .tree
                .attach_behavior(&entity, definition, &mut sim.values, &sim.types)?)
        })?;
        debug!("📥 Remote behavior {} attached to {}", bref, entity);
        Ok(())
    }

    pub(crate) fn handle_delete_behavior(
        &mut self,
        entity: EntityRef,
        behavior: BehaviorRef,
    ) -> Result<(), SyncError> {
        self.require_entity("DeleteBehavior", &entity)?;
        let attached = self
            .tree
            .behavior(&behavior)
            .is_some_and(|b| b.owner() == &entity);
        if !attached {
            return Err(SyncError::violation("DeleteBehavior", &behavior));
        }
        self.guarded(vec![entity.clone()], |sim| {
            Ok(sim.tree.detach_behavior(&entity, &behavior, &mut sim.values)?)
        })
    }
}
