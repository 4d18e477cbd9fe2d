//! The demo scene the soak run replicates, and a fingerprint used to
//! compare replicas.

use scene_sync::tree::{
    Behavior, BehaviorContext, BehaviorDefinition, BehaviorType, EntityDefinition, EntityTypeSpec,
    FieldSpec, TypeRegistry,
};
use scene_sync::{BehaviorRef, EntityRef, PeerId, Simulation, TypeError, ValueId, WireValue};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const SHIP: &str = "ent_ship";
pub const ENGINE: &str = "bhv_engine";

/// Drives the ship; only checks on setup that it has an owner to push.
#[derive(Debug, Default)]
pub struct Engine;

impl Behavior for Engine {
    fn setup(&mut self, ctx: &mut BehaviorContext<'_>) -> Result<(), String> {
        let owner = ctx
            .entity()
            .map(|e| e.name().to_string())
            .ok_or_else(|| "engine has no owner".to_string())?;
        let speed = ctx.read("speed").unwrap_or(WireValue::Null);
        debug!("🚀 Engine on {} online at speed {}", owner, speed);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entity and behavior types shared by every participant.
pub fn demo_types() -> Result<Arc<TypeRegistry>, TypeError> {
    let mut types = TypeRegistry::new();
    types.register_entity_type(EntityTypeSpec::new(
        "ship",
        vec![
            FieldSpec::new("hull", 100),
            FieldSpec::new("heading", 0.0),
            FieldSpec::new("debug_label", "").local_only(),
        ],
    ))?;
    types.register_entity_type(EntityTypeSpec::new("probe", vec![FieldSpec::new("counter", 0)]))?;
    types.register_behavior(BehaviorType::new(
        "behaviors/engine",
        vec![FieldSpec::new("speed", 1.0), FieldSpec::new("throttle", 0.0)],
        || Box::new(Engine),
    ))?;
    types.register_behavior(BehaviorType::data(
        "behaviors/cargo",
        vec![FieldSpec::new("capacity", 10)],
    ))?;
    Ok(Arc::new(types))
}

/// Top-level world entities the server starts with.
pub fn world() -> Vec<EntityDefinition> {
    vec![
        EntityDefinition::new("Ship")
            .with_ref(SHIP)
            .with_type("ship")
            .with_behavior(BehaviorDefinition::new("behaviors/engine").with_ref(ENGINE))
            .with_child(EntityDefinition::new("Turret").with_ref("ent_turret").with_value("angle", 0)),
        EntityDefinition::new("Dock")
            .with_ref("ent_dock")
            .with_behavior(BehaviorDefinition::new("behaviors/cargo").with_ref("bhv_dock_cargo")),
    ]
}

pub fn prefabs() -> Vec<EntityDefinition> {
    vec![EntityDefinition::new("Crate")
        .with_ref("prefab_crate")
        .with_behavior(BehaviorDefinition::new("behaviors/cargo").with_ref("bhv_crate_cargo"))]
}

/// An entity owned and written by a single client.
pub fn probe(peer: &PeerId) -> EntityDefinition {
    EntityDefinition::new(format!("Probe {}", peer))
        .with_ref(probe_ref(peer))
        .with_type("probe")
        .with_authority(peer.clone())
}

pub fn probe_ref(peer: &PeerId) -> EntityRef {
    EntityRef::from_raw(format!("probe_{}", peer))
}

/// The value every participant writes concurrently.
pub fn shared_speed() -> ValueId {
    ValueId::derive(&EntityRef::from(SHIP), Some(&BehaviorRef::from(ENGINE)), "speed")
}

pub fn hull() -> ValueId {
    ValueId::derive(&EntityRef::from(SHIP), None, "hull")
}

/// Replicated state of a simulation, independent of arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    entities: BTreeMap<EntityRef, (Option<EntityRef>, String, bool)>,
    values: BTreeMap<ValueId, (WireValue, u64)>,
}

impl Fingerprint {
    pub fn of(sim: &Simulation) -> Self {
        let entities = sim
            .tree()
            .entities()
            .filter(|e| !e.is_root() && e.root().is_replicated())
            .map(|e| {
                (
                    e.eref().clone(),
                    (e.parent().cloned(), e.name().to_string(), e.enabled()),
                )
            })
            .collect();

        let values = sim
            .values()
            .ids()
            .filter_map(|id| {
                let value = sim.values().get(id)?;
                let replicated_owner = sim
                    .tree()
                    .get(value.owner())
                    .is_some_and(|owner| owner.root().is_replicated());
                if !value.replicated() || !replicated_owner {
                    return None;
                }
                let wire = value.wire().ok()?;
                Some((id.clone(), (wire, value.clock())))
            })
            .collect();

        Self { entities, values }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_sync::{RootTree, SimulationConfig};

    #[test]
    fn test_demo_scene_spawns() {
        let types = demo_types().unwrap();
        let mut sim = Simulation::new(SimulationConfig::server(), types);
        for definition in world() {
            sim.spawn_in(RootTree::World, definition).unwrap();
        }
        for definition in prefabs() {
            sim.spawn_in(RootTree::Prefabs, definition).unwrap();
        }

        assert_eq!(sim.read::<f64>(&shared_speed()), Some(1.0));
        assert_eq!(sim.read::<i64>(&hull()), Some(100));
        let fingerprint = Fingerprint::of(&sim);
        assert_eq!(fingerprint.entity_count(), 4);
        // hull, heading, speed, throttle, angle, two capacities
        assert_eq!(fingerprint.value_count(), 7);
    }

    #[test]
    fn test_fingerprint_ignores_local_tree() {
        let types = demo_types().unwrap();
        let mut sim = Simulation::new(SimulationConfig::server(), types);
        let before = Fingerprint::of(&sim);
        sim.spawn_local(EntityDefinition::new("Gizmo").with_value("size", 1))
            .unwrap();
        assert_eq!(Fingerprint::of(&sim), before);
    }

    #[test]
    fn test_probe_is_owned_by_its_peer() {
        let peer = PeerId::new("peer-1");
        let definition = probe(&peer);
        assert_eq!(definition.authority, Some(peer.clone()));
        assert_eq!(definition.eref, Some(probe_ref(&peer)));
    }
}
