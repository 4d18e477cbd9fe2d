//! Initial snapshot transfer and deferred finalization.
//!
//! A snapshot is applied in two phases. Every entity is first spawned inert
//! so the whole tree is structurally present; behaviors are only set up once
//! the simulation is running, in snapshot order. Setup code can therefore
//! look up siblings and parents by name regardless of the order in which
//! they were listed.

use crate::error::SyncError;
use crate::protocol::Packet;
use crate::sim::Simulation;
use crate::tree::{EntityDefinition, SpawnMode};
use crate::types::{EntityRef, RootTree};
use tracing::{info, warn};

impl Simulation {
    /// Serializes the world and prefab trees for a newly connected peer.
    pub fn build_snapshot(&self) -> Result<Packet, SyncError> {
        Ok(Packet::InitialNetworkSnapshot {
            world_entities: self.root_definitions(RootTree::World)?,
            prefab_entities: self.root_definitions(RootTree::Prefabs)?,
        })
    }

    fn root_definitions(&self, root: RootTree) -> Result<Vec<EntityDefinition>, SyncError> {
        let Some(root_entity) = self.tree.get(&root.root_ref()) else {
            return Ok(Vec::new());
        };
        root_entity
            .children()
            .iter()
            .map(|child| {
                self.tree
                    .to_definition(child, &self.values)
                    .map_err(SyncError::from)
            })
            .collect()
    }

    pub(crate) fn handle_initial_snapshot(
        &mut self,
        world: Vec<EntityDefinition>,
        prefabs: Vec<EntityDefinition>,
    ) -> Result<(), SyncError> {
        for definition in world.iter().chain(prefabs.iter()) {
            definition.require_refs()?;
        }
        let refs: Vec<EntityRef> = world
            .iter()
            .chain(prefabs.iter())
            .flat_map(EntityDefinition::entity_refs)
            .collect();
        let total = refs.len();

        let entries = world
            .into_iter()
            .map(|d| (RootTree::World, d))
            .chain(prefabs.into_iter().map(|d| (RootTree::Prefabs, d)));

        let spawned = self.guarded(refs, |sim| {
            let mut spawned = Vec::new();
            for (root, definition) in entries {
                let name = definition.name.clone();
                match sim.tree.spawn(
                    &root.root_ref(),
                    definition,
                    SpawnMode::Inert,
                    &mut sim.values,
                    &sim.types,
                ) {
                    Ok(eref) => spawned.push(eref),
                    Err(err) => warn!("❌ Skipping snapshot entity '{}': {}", name, err),
                }
            }
            Ok(spawned)
        })?;

        info!(
            "📦 Applied initial snapshot: {} top-level entities, {} total",
            spawned.len(),
            total
        );
        self.pending_finalize.extend(spawned);

        if self.is_running() {
            self.finalize_pending()?;
        }
        Ok(())
    }

    /// Finalizes every pending inert subtree, in the order received.
    ///
    /// Every subtree is attempted; the first failure is returned.
    pub(crate) fn finalize_pending(&mut self) -> Result<(), SyncError> {
        let pending = std::mem::take(&mut self.pending_finalize);
        if pending.is_empty() {
            return Ok(());
        }
        let refs: Vec<EntityRef> = pending
            .iter()
            .flat_map(|eref| self.tree.subtree(eref))
            .collect();

        self.guarded(refs, |sim| {
            let mut first_error = None;
            for eref in &pending {
                if !sim.tree.contains(eref) {
                    continue;
                }
                if let Err(err) = sim.tree.finalize(eref, &mut sim.values) {
                    first_error.get_or_insert(err);
                }
            }
            info!("✅ Finalized {} deferred entities", pending.len());
            first_error.map_or(Ok(()), |err| Err(err.into()))
        })
    }
}
