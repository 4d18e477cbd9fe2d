use super::stats::SyncStats;
use crate::config::SimulationConfig;
use crate::error::{SyncError, ValueError};
use crate::events::{EventBus, SimEvent, Subscription};
use crate::protocol::Outbound;
use crate::sync::{DirtyBuffer, IgnoreSet, PeerTable};
use crate::tree::{
    Behavior, BehaviorDefinition, EntityDefinition, EntityTree, SpawnMode, TypeRegistry,
};
use crate::types::{BehaviorRef, EntityRef, PeerId, Role, RootTree, ValueId, WireValue};
use crate::value::{ClockedValue, ValueRegistry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tracing::info;

/// Whether a simulation is replicating structural changes yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Building the initial scene; spawns, destroys, reparents and enable
    /// toggles are not announced and value reports are held back.
    Setup,
    Running,
    Stopped,
}

/// One simulation instance: the single owner of a tree, its values and
/// all synchronization state.
///
/// All mutation goes through `&mut self`, so a simulation is driven from
/// exactly one execution context. For async use, see
/// [`SimulationSession`](crate::session::SimulationSession).
///
/// # Examples
///
/// ```rust
/// use scene_sync::tree::{EntityDefinition, TypeRegistry};
/// use scene_sync::{RootTree, Simulation, SimulationConfig};
/// use std::sync::Arc;
///
/// let mut sim = Simulation::new(SimulationConfig::server(), Arc::new(TypeRegistry::new()));
/// sim.start().unwrap();
///
/// let ship = sim
///     .spawn(&RootTree::World.root_ref(), EntityDefinition::new("Ship").with_value("hull", 100))
///     .unwrap();
/// assert_eq!(sim.drain_outbox().len(), 1); // SpawnEntity
///
/// let hull = sim.tree().get(&ship).unwrap().field_id("hull");
/// sim.write_value(&hull, 90.into()).unwrap();
/// assert_eq!(sim.tick(), 1); // one ReportValues entry
/// ```
pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) types: Arc<TypeRegistry>,
    pub(crate) tree: EntityTree,
    pub(crate) values: ValueRegistry,
    pub(crate) ignore: IgnoreSet,
    pub(crate) dirty: DirtyBuffer,
    pub(crate) pending_finalize: Vec<EntityRef>,
    pub(crate) peers: PeerTable,
    pub(crate) outbox: Vec<Outbound>,
    pub(crate) bus: EventBus<SimEvent>,
    pub(crate) stats: SyncStats,
    pub(crate) state: RunState,
}

impl Simulation {
    /// Creates a simulation with its own tree and registry.
    ///
    /// # Arguments
    ///
    /// * `config` - Identity, role and batching settings
    /// * `types` - Entity and behavior types this participant knows about
    pub fn new(config: SimulationConfig, types: Arc<TypeRegistry>) -> Self {
        let values = ValueRegistry::new(config.local_peer.clone());
        Self {
            config,
            types,
            tree: EntityTree::new(),
            values,
            ignore: IgnoreSet::new(),
            dirty: DirtyBuffer::new(),
            pending_finalize: Vec::new(),
            peers: PeerTable::default(),
            outbox: Vec::new(),
            bus: EventBus::new(),
            stats: SyncStats::default(),
            state: RunState::Setup,
        }
    }

    // ---- Accessors ----------------------------------------------------------

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn local_peer(&self) -> &PeerId {
        self.values.local_peer()
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn tree(&self) -> &EntityTree {
        &self.tree
    }

    pub fn values(&self) -> &ValueRegistry {
        &self.values
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Refs spawned inert and waiting for [`start`](Self::start).
    pub fn pending_finalize(&self) -> &[EntityRef] {
        &self.pending_finalize
    }

    pub fn value(&self, id: &ValueId) -> Option<&ClockedValue> {
        self.values.get(id)
    }

    /// Reads a value and deserializes its wire form.
    pub fn read<T: DeserializeOwned>(&self, id: &ValueId) -> Option<T> {
        self.values.get(id)?.get().ok()
    }

    /// Downcast a running behavior instance.
    pub fn behavior<T: Behavior>(&self, bref: &BehaviorRef) -> Option<&T> {
        self.tree.behavior(bref)?.instance::<T>()
    }

    /// Registers an observer for every [`SimEvent`].
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SimEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    /// Takes every packet queued since the last call.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    // ---- Lifecycle ----------------------------------------------------------

    /// Enters the running state and finalizes every entity received inert.
    pub fn start(&mut self) -> Result<(), SyncError> {
        if self.is_running() {
            return Ok(());
        }
        self.state = RunState::Running;
        info!("▶️ Simulation {} started", self.local_peer());
        let result = self.finalize_pending();
        self.bus.emit(&SimEvent::Started);
        result
    }

    pub fn stop(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }
        self.state = RunState::Stopped;
        info!("⏹️ Simulation {} stopped", self.local_peer());
        self.bus.emit(&SimEvent::Stopped);
    }

    /// Once-per-tick work: flushes dirty values while running.
    ///
    /// # Returns
    ///
    /// The number of value entries reported.
    pub fn tick(&mut self) -> usize {
        if !self.is_running() {
            return 0;
        }
        self.flush_dirty()
    }

    // ---- Local structural operations ----------------------------------------

    /// Spawns a definition under `parent` and sets up its behaviors.
    pub fn spawn(
        &mut self,
        parent: &EntityRef,
        definition: EntityDefinition,
    ) -> Result<EntityRef, SyncError> {
        self.local(|sim| {
            Ok(sim
                .tree
                .spawn(parent, definition, SpawnMode::Live, &mut sim.values, &sim.types)?)
        })
    }

    /// Spawns directly under a root tree.
    pub fn spawn_in(
        &mut self,
        root: RootTree,
        definition: EntityDefinition,
    ) -> Result<EntityRef, SyncError> {
        self.spawn(&root.root_ref(), definition)
    }

    /// Spawns into the local, never replicated tree.
    pub fn spawn_local(&mut self, definition: EntityDefinition) -> Result<EntityRef, SyncError> {
        self.spawn_in(RootTree::Local, definition)
    }

    pub fn destroy(&mut self, eref: &EntityRef) -> Result<(), SyncError> {
        self.local(|sim| Ok(sim.tree.destroy(eref, &mut sim.values)?))
    }

    /// Moves an entity, returning its previous parent.
    pub fn reparent(&mut self, eref: &EntityRef, parent: &EntityRef) -> Result<EntityRef, SyncError> {
        self.local(|sim| Ok(sim.tree.reparent(eref, parent)?))
    }

    /// Renames an entity, returning its previous name.
    pub fn rename(&mut self, eref: &EntityRef, name: &str) -> Result<String, SyncError> {
        self.local(|sim| Ok(sim.tree.rename(eref, name)?))
    }

    pub fn set_enabled(&mut self, eref: &EntityRef, enabled: bool) -> Result<(), SyncError> {
        self.local(|sim| Ok(sim.tree.set_enabled(eref, enabled)?))
    }

    /// Hands write authority over an entity to a participant; `None` releases it.
    pub fn set_authority(
        &mut self,
        eref: &EntityRef,
        authority: Option<PeerId>,
    ) -> Result<(), SyncError> {
        self.local(|sim| Ok(sim.tree.set_authority(eref, authority)?))
    }

    pub fn attach_behavior(
        &mut self,
        eref: &EntityRef,
        definition: BehaviorDefinition,
    ) -> Result<BehaviorRef, SyncError> {
        self.local(|sim| {
            Ok(sim
                .tree
                .attach_behavior(eref, definition, &mut sim.values, &sim.types)?)
        })
    }

    pub fn detach_behavior(&mut self, eref: &EntityRef, bref: &BehaviorRef) -> Result<(), SyncError> {
        self.local(|sim| Ok(sim.tree.detach_behavior(eref, bref, &mut sim.values)?))
    }

    // ---- Local value writes -------------------------------------------------

    /// Local write; bumps the clock and marks the value for the next report.
    ///
    /// Refused when the owning entity is under another participant's authority.
    pub fn write_value(&mut self, id: &ValueId, value: WireValue) -> Result<u64, SyncError> {
        self.check_authority(id)?;
        self.local(|sim| Ok(sim.values.write(id, value)?))
    }

    /// Local write of a native value into an adapted field.
    pub fn write_native<T: Any + Send + Sync>(
        &mut self,
        id: &ValueId,
        value: T,
    ) -> Result<u64, SyncError> {
        self.check_authority(id)?;
        self.local(|sim| Ok(sim.values.write_native(id, value)?))
    }

    /// Convenience write addressed by entity, optional behavior and field name.
    pub fn write_field(
        &mut self,
        entity: &EntityRef,
        behavior: Option<&BehaviorRef>,
        field: &str,
        value: WireValue,
    ) -> Result<u64, SyncError> {
        self.write_value(&ValueId::derive(entity, behavior, field), value)
    }

    fn check_authority(&self, id: &ValueId) -> Result<(), ValueError> {
        let value = self
            .values
            .get(id)
            .ok_or_else(|| ValueError::NotFound(id.clone()))?;
        let authority = self.tree.get(value.owner()).and_then(|e| e.authority());
        match authority {
            Some(authority) if authority != self.local_peer() => Err(ValueError::NotAuthority {
                id: id.clone(),
                local: self.local_peer().clone(),
                authority: authority.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Runs a local operation, then routes the events it produced.
    fn local<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let result = op(self);
        self.pump();
        result
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("local_peer", self.local_peer())
            .field("role", &self.config.role)
            .field("state", &self.state)
            .field("entities", &self.tree.len())
            .field("values", &self.values.len())
            .finish()
    }
}
