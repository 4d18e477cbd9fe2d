use crate::config::SimulationConfig;
use crate::error::{SyncError, ValueError};
use crate::events::{PeerEvent, SimEvent, Subscription};
use crate::protocol::{Envelope, Outbound, Packet, Target, ValueReport};
use crate::sim::Simulation;
use crate::tree::{
    Behavior, BehaviorContext, BehaviorDefinition, BehaviorType, EntityDefinition, EntityState,
    EntityTypeSpec, FieldSpec, TypeRegistry,
};
use crate::types::{BehaviorRef, EntityRef, PeerId, RootTree, ValueId};
use serde_json::json;
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Fails setup unless a sibling named "B" exists.
struct FollowB;

impl Behavior for FollowB {
    fn setup(&mut self, ctx: &mut BehaviorContext<'_>) -> Result<(), String> {
        ctx.find_sibling("B")
            .map(|_| ())
            .ok_or_else(|| "sibling 'B' not found".to_string())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Writes its own speed during setup.
struct Starter;

impl Behavior for Starter {
    fn setup(&mut self, ctx: &mut BehaviorContext<'_>) -> Result<(), String> {
        ctx.write("speed", json!(5.0)).map(|_| ()).map_err(|e| e.to_string())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn types() -> Arc<TypeRegistry> {
    let mut types = TypeRegistry::new();
    types
        .register_entity_type(EntityTypeSpec::new(
            "ship",
            vec![
                FieldSpec::new("hull", 100),
                FieldSpec::new("debug_label", "").local_only(),
            ],
        ))
        .unwrap();
    types
        .register_behavior(BehaviorType::data(
            "behaviors/engine",
            vec![FieldSpec::new("speed", 1.0)],
        ))
        .unwrap();
    types
        .register_behavior(BehaviorType::new("behaviors/follow-b", vec![], || Box::new(FollowB)))
        .unwrap();
    types
        .register_behavior(BehaviorType::new(
            "behaviors/starter",
            vec![FieldSpec::new("speed", 0.0)],
            || Box::new(Starter),
        ))
        .unwrap();
    Arc::new(types)
}

fn server() -> Simulation {
    Simulation::new(SimulationConfig::server(), types())
}

fn client(peer: &str) -> Simulation {
    Simulation::new(SimulationConfig::client(PeerId::new(peer)), types())
}

fn world() -> EntityRef {
    RootTree::World.root_ref()
}

fn ship() -> EntityDefinition {
    EntityDefinition::new("Ship")
        .with_ref("ent_1")
        .with_type("ship")
        .with_behavior(BehaviorDefinition::new("behaviors/engine").with_ref("behavior_1"))
        .with_child(EntityDefinition::new("Turret").with_ref("ent_2"))
}

fn from(peer: &str, packet: Packet) -> Envelope {
    Envelope::new(PeerId::new(peer), packet)
}

fn snapshot(world_entities: Vec<EntityDefinition>) -> Packet {
    Packet::InitialNetworkSnapshot {
        world_entities,
        prefab_entities: Vec::new(),
    }
}

fn report(id: &str, value: serde_json::Value, clock: u64) -> Packet {
    Packet::ReportValues {
        reports: vec![ValueReport {
            identifier: ValueId::from(id),
            value,
            clock,
        }],
    }
}

fn record(sim: &Simulation) -> (Arc<Mutex<Vec<SimEvent>>>, Subscription) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = sim.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    (events, subscription)
}

fn names(outbox: &[Outbound]) -> Vec<&'static str> {
    outbox.iter().map(|o| o.packet.name()).collect()
}

/// A running client holding the ship, received from the server.
fn client_with_ship(peer: &str) -> Simulation {
    let mut sim = client(peer);
    sim.start().unwrap();
    sim.receive(from("server", snapshot(vec![ship()]))).unwrap();
    assert!(sim.drain_outbox().is_empty());
    sim
}

/// Delivers everything `sender` queued that is addressed to `receiver`.
fn shuttle(sender: &mut Simulation, receiver: &mut Simulation) {
    let local = sender.local_peer().clone();
    for outbound in sender.drain_outbox() {
        let addressed = match &outbound.target {
            Target::Broadcast => true,
            Target::Peer(peer) => peer == receiver.local_peer(),
        };
        if addressed {
            receiver
                .receive(Envelope::new(local.clone(), outbound.packet))
                .unwrap();
        }
    }
}

// ---- Echo suppression -------------------------------------------------------

#[test]
fn test_inbound_structural_changes_are_not_echoed() {
    let mut sim = client("peer-A");
    sim.start().unwrap();

    sim.receive(from(
        "server",
        Packet::SpawnEntity {
            parent: world(),
            definition: ship(),
        },
    ))
    .unwrap();
    sim.receive(from(
        "peer-B",
        Packet::RenameEntity {
            entity: EntityRef::from("ent_1"),
            name: "Flagship".to_string(),
            old_name: "Ship".to_string(),
        },
    ))
    .unwrap();
    sim.receive(from(
        "peer-B",
        Packet::ReparentEntity {
            entity: EntityRef::from("ent_2"),
            old_parent: EntityRef::from("ent_1"),
            parent: world(),
        },
    ))
    .unwrap();
    sim.receive(from(
        "peer-B",
        Packet::SpawnBehavior {
            entity: EntityRef::from("ent_2"),
            definition: BehaviorDefinition::new("behaviors/engine").with_ref("behavior_2"),
        },
    ))
    .unwrap();
    sim.receive(from(
        "peer-B",
        Packet::DeleteBehavior {
            entity: EntityRef::from("ent_2"),
            behavior: BehaviorRef::from("behavior_2"),
        },
    ))
    .unwrap();
    sim.receive(from(
        "peer-B",
        Packet::DeleteEntity {
            entity: EntityRef::from("ent_1"),
        },
    ))
    .unwrap();

    assert!(sim.drain_outbox().is_empty());
    assert!(!sim.tree().contains(&EntityRef::from("ent_1")));
    assert_eq!(
        sim.tree().get(&EntityRef::from("ent_2")).unwrap().parent(),
        Some(&world())
    );
    assert_eq!(sim.stats().packets_received, 6);
    assert_eq!(sim.stats().packets_dropped, 0);
}

#[test]
fn test_local_change_after_inbound_is_announced() {
    let mut sim = client_with_ship("peer-A");
    sim.rename(&EntityRef::from("ent_1"), "Mine").unwrap();
    assert_eq!(names(&sim.drain_outbox()), vec!["RenameEntity"]);
}

#[test]
fn test_own_packets_are_ignored() {
    let mut sim = client("peer-A");
    sim.start().unwrap();
    sim.receive(from(
        "peer-A",
        Packet::SpawnEntity {
            parent: world(),
            definition: ship(),
        },
    ))
    .unwrap();
    assert!(sim.tree().is_empty());
}

fn rover() -> EntityDefinition {
    EntityDefinition::new("Rover")
        .with_ref("ent_r")
        .with_behavior(BehaviorDefinition::new("behaviors/starter").with_ref("behavior_r"))
}

#[test]
fn test_setup_writes_during_inbound_spawn_are_not_reported() {
    let mut sim = client("peer-A");
    sim.start().unwrap();
    let (events, _subscription) = record(&sim);

    sim.receive(from(
        "peer-B",
        Packet::SpawnEntity {
            parent: world(),
            definition: rover(),
        },
    ))
    .unwrap();
    assert_eq!(sim.tick(), 0);
    assert!(sim.drain_outbox().is_empty());

    let speed = ValueId::from("ent_r/behavior_r/speed");
    assert_eq!(sim.read::<f64>(&speed), Some(5.0));
    // Still visible to local subscribers.
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, SimEvent::ValueChanged(change) if change.id == speed)));
}

#[test]
fn test_setup_writes_during_deferred_finalization_are_not_reported() {
    let mut sim = client("peer-A");
    sim.receive(from("server", snapshot(vec![rover()]))).unwrap();
    sim.start().unwrap();

    assert_eq!(sim.tick(), 0);
    assert!(sim.drain_outbox().is_empty());
    assert_eq!(sim.read::<f64>(&ValueId::from("ent_r/behavior_r/speed")), Some(5.0));
}

#[test]
fn test_setup_writes_during_local_spawn_are_reported() {
    let mut sim = client("peer-A");
    sim.start().unwrap();
    sim.spawn(&world(), rover()).unwrap();
    sim.drain_outbox();

    assert_eq!(sim.tick(), 1);
    assert_eq!(names(&sim.drain_outbox()), vec!["ReportValues"]);
}

// ---- Outbound gating ----------------------------------------------------------

#[test]
fn test_setup_phase_only_announces_renames() {
    let mut sim = server();
    let ship = sim.spawn(&world(), ship()).unwrap();
    sim.set_enabled(&ship, false).unwrap();
    sim.rename(&ship, "Flagship").unwrap();
    sim.destroy(&EntityRef::from("ent_2")).unwrap();

    assert_eq!(names(&sim.drain_outbox()), vec!["RenameEntity"]);
}

#[test]
fn test_spawn_announces_whole_subtree_once() {
    let mut sim = server();
    sim.start().unwrap();
    sim.spawn(&world(), ship()).unwrap();

    let outbox = sim.drain_outbox();
    assert_eq!(names(&outbox), vec!["SpawnEntity"]);
    match &outbox[0].packet {
        Packet::SpawnEntity { parent, definition } => {
            assert_eq!(parent, &world());
            assert_eq!(definition.behaviors.len(), 1);
            assert_eq!(definition.children.len(), 1);
            assert!(definition.values.contains_key("hull"));
            assert!(!definition.values.contains_key("debug_label"));
        }
        other => panic!("unexpected packet {:?}", other),
    }
}

#[test]
fn test_destroy_announces_top_entity_only() {
    let mut sim = server();
    sim.start().unwrap();
    let ship = sim.spawn(&world(), ship()).unwrap();
    sim.drain_outbox();

    sim.destroy(&ship).unwrap();
    let outbox = sim.drain_outbox();
    assert_eq!(
        outbox,
        vec![Outbound::broadcast(Packet::DeleteEntity { entity: ship })]
    );
}

#[test]
fn test_local_tree_is_never_replicated() {
    let mut sim = server();
    sim.start().unwrap();
    let gizmo = sim
        .spawn_local(EntityDefinition::new("Gizmo").with_value("size", 1))
        .unwrap();
    sim.rename(&gizmo, "Handle").unwrap();
    sim.write_value(&ValueId::derive(&gizmo, None, "size"), json!(2))
        .unwrap();

    assert_eq!(sim.tick(), 0);
    assert!(sim.drain_outbox().is_empty());
    assert_eq!(sim.tree().get(&gizmo).unwrap().root(), RootTree::Local);
}

#[test]
fn test_attach_and_detach_are_announced_when_running() {
    let mut sim = server();
    sim.start().unwrap();
    let ship = sim.spawn(&world(), ship()).unwrap();
    sim.drain_outbox();

    let bref = sim
        .attach_behavior(&ship, BehaviorDefinition::new("behaviors/engine"))
        .unwrap();
    sim.detach_behavior(&ship, &bref).unwrap();
    assert_eq!(
        names(&sim.drain_outbox()),
        vec!["SpawnBehavior", "DeleteBehavior"]
    );
}

// ---- Protocol violations ------------------------------------------------------

#[test]
fn test_missing_references_are_violations() {
    let mut sim = client_with_ship("peer-A");

    let err = sim
        .receive(from(
            "peer-B",
            Packet::DeleteEntity {
                entity: EntityRef::from("ent_missing"),
            },
        ))
        .unwrap_err();
    assert!(err.is_violation());

    let err = sim
        .receive(from(
            "peer-B",
            Packet::SpawnEntity {
                parent: EntityRef::from("ent_missing"),
                definition: EntityDefinition::new("Orphan").with_ref("ent_9"),
            },
        ))
        .unwrap_err();
    assert!(err.is_violation());

    let err = sim
        .receive(from(
            "peer-B",
            Packet::DeleteBehavior {
                entity: EntityRef::from("ent_2"),
                behavior: BehaviorRef::from("behavior_1"),
            },
        ))
        .unwrap_err();
    assert!(err.is_violation());

    let err = sim
        .receive(from(
            "peer-B",
            Packet::SpawnBehavior {
                entity: EntityRef::from("ent_missing"),
                definition: BehaviorDefinition::new("behaviors/engine").with_ref("behavior_9"),
            },
        ))
        .unwrap_err();
    assert!(err.is_violation());
    assert_eq!(sim.stats().packets_dropped, 4);

    // The connection keeps working.
    sim.receive(from(
        "peer-B",
        Packet::RenameEntity {
            entity: EntityRef::from("ent_1"),
            name: "Still here".to_string(),
            old_name: "Ship".to_string(),
        },
    ))
    .unwrap();
    assert_eq!(
        sim.tree().get(&EntityRef::from("ent_1")).unwrap().name(),
        "Still here"
    );
    assert_eq!(sim.stats().packets_dropped, 4);
}

#[test]
fn test_local_tree_refs_are_violations() {
    let mut sim = client("peer-A");
    sim.start().unwrap();
    let gizmo = sim.spawn_local(EntityDefinition::new("Gizmo")).unwrap();

    let err = sim
        .receive(from(
            "server",
            Packet::DeleteEntity {
                entity: gizmo.clone(),
            },
        ))
        .unwrap_err();
    assert!(err.is_violation());
    assert!(sim.tree().contains(&gizmo));
}

#[test]
fn test_inbound_definition_without_refs_is_rejected() {
    let mut sim = client("peer-A");
    sim.start().unwrap();
    let err = sim
        .receive(from(
            "server",
            Packet::SpawnEntity {
                parent: world(),
                definition: EntityDefinition::new("Anonymous"),
            },
        ))
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
    assert!(sim.tree().is_empty());
}

#[test]
fn test_undecodable_bytes_are_dropped() {
    let mut sim = client("peer-A");
    assert!(sim.receive_bytes(b"not json").is_err());
    assert_eq!(sim.stats().packets_received, 1);
    assert_eq!(sim.stats().packets_dropped, 1);
}

// ---- Initial snapshot ---------------------------------------------------------

fn follower() -> EntityDefinition {
    EntityDefinition::new("A")
        .with_ref("ent_a")
        .with_behavior(BehaviorDefinition::new("behaviors/follow-b").with_ref("behavior_a"))
}

fn target() -> EntityDefinition {
    EntityDefinition::new("B").with_ref("ent_b")
}

#[test]
fn test_snapshot_finalizes_on_start_in_any_order() {
    for order in [vec![follower(), target()], vec![target(), follower()]] {
        let mut sim = client("peer-A");
        sim.receive(from("server", snapshot(order))).unwrap();

        assert_eq!(
            sim.tree().get(&EntityRef::from("ent_a")).unwrap().state(),
            EntityState::Inert
        );
        assert_eq!(sim.pending_finalize().len(), 2);

        sim.start().unwrap();
        assert!(sim.pending_finalize().is_empty());
        assert_eq!(
            sim.tree().get(&EntityRef::from("ent_a")).unwrap().state(),
            EntityState::Finalized
        );
        assert!(sim
            .tree()
            .behavior(&BehaviorRef::from("behavior_a"))
            .unwrap()
            .is_initialized());
        assert!(sim.drain_outbox().is_empty());
    }
}

#[test]
fn test_snapshot_while_running_finalizes_immediately() {
    let mut sim = client("peer-A");
    sim.start().unwrap();
    sim.receive(from("server", snapshot(vec![follower(), target()])))
        .unwrap();

    assert!(sim.pending_finalize().is_empty());
    assert!(sim
        .tree()
        .behavior(&BehaviorRef::from("behavior_a"))
        .unwrap()
        .is_initialized());
}

#[test]
fn test_inbound_spawn_before_start_waits_for_start() {
    let mut sim = client("peer-A");
    sim.receive(from(
        "server",
        Packet::SpawnEntity {
            parent: world(),
            definition: ship(),
        },
    ))
    .unwrap();
    assert_eq!(
        sim.tree().get(&EntityRef::from("ent_2")).unwrap().state(),
        EntityState::Inert
    );

    sim.start().unwrap();
    assert_eq!(
        sim.tree().get(&EntityRef::from("ent_2")).unwrap().state(),
        EntityState::Finalized
    );
}

#[test]
fn test_snapshot_carries_value_clocks() {
    let mut source = server();
    source.start().unwrap();
    source.spawn(&world(), ship()).unwrap();
    let hull = ValueId::from("ent_1/hull");
    source.write_value(&hull, json!(70)).unwrap();
    source.write_value(&hull, json!(60)).unwrap();

    let mut sim = client("peer-A");
    sim.start().unwrap();
    sim.receive(from("server", source.build_snapshot().unwrap()))
        .unwrap();
    assert_eq!(sim.value(&hull).unwrap().clock(), 2);
    assert_eq!(sim.read::<i64>(&hull), Some(60));

    // A delayed report from before the snapshot is stale.
    sim.receive(from("server", report("ent_1/hull", json!(70), 1)))
        .unwrap();
    assert_eq!(sim.read::<i64>(&hull), Some(60));
}

#[test]
fn test_late_joiner_breaks_ties_like_everyone_else() {
    let hull = ValueId::from("ent_1/hull");
    let mut host = server();
    host.spawn(&world(), ship()).unwrap();
    host.start().unwrap();
    host.receive(from("peer-B", report("ent_1/hull", json!(1), 1))).unwrap();
    host.drain_outbox();

    let mut late = client("peer-C");
    late.receive(from("server", host.build_snapshot().unwrap())).unwrap();
    late.start().unwrap();
    assert_eq!(late.value(&hull).unwrap().originator(), Some(&PeerId::new("peer-B")));

    // Same clock, larger originator: accepted everywhere.
    for sim in [&mut host, &mut late] {
        sim.receive(from("peer-D", report("ent_1/hull", json!(2), 1))).unwrap();
    }
    assert_eq!(host.read::<i64>(&hull), Some(2));
    assert_eq!(late.read::<i64>(&hull), Some(2));

    // Same clock, smaller originator: rejected everywhere.
    for sim in [&mut host, &mut late] {
        sim.receive(from("peer-A", report("ent_1/hull", json!(3), 1))).unwrap();
    }
    assert_eq!(host.read::<i64>(&hull), Some(2));
    assert_eq!(late.read::<i64>(&hull), Some(2));
    assert_eq!(late.value(&hull).unwrap().originator(), Some(&PeerId::new("peer-D")));
}

// ---- Value reports --------------------------------------------------------------

#[test]
fn test_report_without_sender_is_attributed_to_server() {
    let mut sim = client_with_ship("peer-A");
    let (events, _subscription) = record(&sim);

    sim.receive(Envelope::anonymous(report("ent_1/hull", json!(50), 1)))
        .unwrap();

    let hull = sim.value(&ValueId::from("ent_1/hull")).unwrap();
    assert_eq!(hull.wire().unwrap(), json!(50));
    assert_eq!(hull.originator(), Some(&PeerId::server()));
    assert_eq!(
        *events.lock().unwrap(),
        vec![SimEvent::ValueApplied {
            id: ValueId::from("ent_1/hull"),
            value: json!(50),
            clock: 1,
            originator: Some(PeerId::server()),
        }]
    );
    assert!(sim.drain_outbox().is_empty());
}

#[test]
fn test_report_conflicts_resolve_deterministically() {
    let mut sim = client_with_ship("peer-A");
    let hull = ValueId::from("ent_1/hull");

    sim.receive(from("server", report("ent_1/hull", json!(50), 1)))
        .unwrap();
    // Same clock, smaller originator: loses the tie.
    sim.receive(from("peer-B", report("ent_1/hull", json!(60), 1)))
        .unwrap();
    assert_eq!(sim.read::<i64>(&hull), Some(50));

    sim.receive(from("peer-B", report("ent_1/hull", json!(70), 3)))
        .unwrap();
    // Older clock: stale.
    sim.receive(from("server", report("ent_1/hull", json!(80), 2)))
        .unwrap();
    assert_eq!(sim.read::<i64>(&hull), Some(70));
    assert_eq!(sim.value(&hull).unwrap().clock(), 3);

    assert_eq!(sim.stats().values_applied, 2);
    assert_eq!(sim.stats().values_rejected, 2);
}

#[test]
fn test_reports_skip_local_only_and_unknown_values() {
    let mut sim = client_with_ship("peer-A");
    sim.receive(from(
        "server",
        Packet::ReportValues {
            reports: vec![
                ValueReport {
                    identifier: ValueId::from("ent_1/debug_label"),
                    value: json!("remote"),
                    clock: 9,
                },
                ValueReport {
                    identifier: ValueId::from("ent_404/hull"),
                    value: json!(1),
                    clock: 9,
                },
            ],
        },
    ))
    .unwrap();

    assert_eq!(
        sim.read::<String>(&ValueId::from("ent_1/debug_label")).as_deref(),
        Some("")
    );
    assert_eq!(sim.stats().values_applied, 0);
    assert_eq!(sim.stats().values_rejected, 0);
    assert_eq!(sim.stats().packets_dropped, 0);
}

// ---- Dirty flush ------------------------------------------------------------------

#[test]
fn test_flush_batches_reports() {
    let mut config = SimulationConfig::server();
    config.max_reports_per_packet = 2;
    let mut sim = Simulation::new(config, types());
    sim.start().unwrap();

    let mut definition = EntityDefinition::new("Crate").with_ref("ent_c");
    for field in ["a", "b", "c", "d", "e"] {
        definition = definition.with_value(field, 0);
    }
    let eref = sim.spawn(&world(), definition).unwrap();
    sim.drain_outbox();

    for field in ["a", "b", "c", "d", "e"] {
        sim.write_field(&eref, None, field, json!(1)).unwrap();
    }
    // Repeated writes collapse into one entry.
    sim.write_field(&eref, None, "a", json!(2)).unwrap();

    assert_eq!(sim.tick(), 5);
    let sizes: Vec<usize> = sim
        .drain_outbox()
        .into_iter()
        .map(|outbound| match outbound.packet {
            Packet::ReportValues { reports } => reports.len(),
            other => panic!("unexpected packet {:?}", other),
        })
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(sim.stats().values_reported, 5);
    assert_eq!(sim.tick(), 0);
}

#[test]
fn test_flush_held_until_running() {
    let mut sim = server();
    sim.spawn(&world(), ship()).unwrap();
    let hull = ValueId::from("ent_1/hull");
    sim.write_value(&hull, json!(90)).unwrap();

    assert_eq!(sim.tick(), 0);
    assert!(sim.drain_outbox().is_empty());

    sim.start().unwrap();
    assert_eq!(sim.tick(), 1);
    assert_eq!(
        sim.drain_outbox(),
        vec![Outbound::broadcast(report("ent_1/hull", json!(90), 1))]
    );
}

#[test]
fn test_flush_skips_values_overwritten_remotely() {
    let mut sim = client_with_ship("peer-A");
    let hull = ValueId::from("ent_1/hull");
    sim.write_value(&hull, json!(10)).unwrap();
    sim.receive(from("peer-B", report("ent_1/hull", json!(20), 5)))
        .unwrap();

    assert_eq!(sim.tick(), 0);
    assert!(sim.drain_outbox().is_empty());
    assert_eq!(sim.read::<i64>(&hull), Some(20));
}

#[test]
fn test_flush_skips_destroyed_values() {
    let mut sim = server();
    sim.start().unwrap();
    let ship = sim.spawn(&world(), ship()).unwrap();
    sim.write_field(&ship, None, "hull", json!(5)).unwrap();
    sim.destroy(&ship).unwrap();
    sim.drain_outbox();

    assert_eq!(sim.tick(), 0);
}

#[test]
fn test_local_writes_raise_value_changed_only() {
    let mut sim = server();
    sim.start().unwrap();
    sim.spawn(&world(), ship()).unwrap();
    let (events, _subscription) = record(&sim);

    sim.write_value(&ValueId::from("ent_1/behavior_1/speed"), json!(3.0))
        .unwrap();
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], SimEvent::ValueChanged(change) if change.clock == 1));
}

// ---- Authority --------------------------------------------------------------------

#[test]
fn test_write_refused_under_foreign_authority() {
    let mut sim = client_with_ship("peer-A");
    sim.receive(from(
        "server",
        Packet::EntityAuthorityChanged {
            entity: EntityRef::from("ent_1"),
            authority: Some(PeerId::new("peer-B")),
        },
    ))
    .unwrap();

    let err = sim
        .write_value(&ValueId::from("ent_1/hull"), json!(1))
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Value(ValueError::NotAuthority { .. })
    ));
    assert_eq!(sim.read::<i64>(&ValueId::from("ent_1/hull")), Some(100));
    assert_eq!(sim.tick(), 0);
}

#[test]
fn test_disconnect_releases_authority_silently() {
    let mut sim = client_with_ship("peer-A");
    sim.receive(from(
        "server",
        Packet::EntityAuthorityChanged {
            entity: EntityRef::from("ent_1"),
            authority: Some(PeerId::new("peer-B")),
        },
    ))
    .unwrap();

    sim.receive(from(
        "server",
        Packet::PeerDisconnected {
            peer_id: PeerId::new("peer-B"),
        },
    ))
    .unwrap();

    assert_eq!(sim.tree().get(&EntityRef::from("ent_1")).unwrap().authority(), None);
    assert!(sim.drain_outbox().is_empty());
    sim.write_value(&ValueId::from("ent_1/hull"), json!(1)).unwrap();
}

#[test]
fn test_local_authority_change_is_announced() {
    let mut sim = server();
    sim.start().unwrap();
    let ship = sim.spawn(&world(), ship()).unwrap();
    sim.drain_outbox();

    sim.set_authority(&ship, Some(PeerId::new("peer-A"))).unwrap();
    assert_eq!(
        sim.drain_outbox(),
        vec![Outbound::broadcast(Packet::EntityAuthorityChanged {
            entity: ship.clone(),
            authority: Some(PeerId::new("peer-A")),
        })]
    );
    // Server no longer holds authority.
    assert!(sim.write_field(&ship, None, "hull", json!(1)).is_err());
}

// ---- Peers --------------------------------------------------------------------------

#[test]
fn test_server_welcomes_new_peer() {
    let mut sim = server();
    sim.spawn(&world(), ship()).unwrap();
    sim.start().unwrap();

    let peer = PeerId::new("peer-A");
    sim.on_peer_connected(peer.clone()).unwrap();
    let outbox = sim.drain_outbox();

    assert_eq!(
        names(&outbox),
        vec![
            "Handshake",
            "PeerListSnapshot",
            "InitialNetworkSnapshot",
            "PeerConnected"
        ]
    );
    assert_eq!(outbox[0].target, Target::Peer(peer.clone()));
    assert_eq!(
        outbox[1].packet,
        Packet::PeerListSnapshot {
            peers: vec![peer.clone(), PeerId::server()],
        }
    );
    assert_eq!(outbox[2].target, Target::Peer(peer.clone()));
    assert_eq!(outbox[3].target, Target::Broadcast);
    assert!(sim.peers().contains(&peer));
}

#[test]
fn test_handshake_assigns_identity() {
    let mut sim = Simulation::new(SimulationConfig::default(), types());
    let (events, _subscription) = record(&sim);

    sim.receive(from(
        "server",
        Packet::Handshake {
            peer_id: PeerId::new("peer-Q"),
        },
    ))
    .unwrap();

    assert_eq!(sim.local_peer(), &PeerId::new("peer-Q"));
    assert_eq!(
        *events.lock().unwrap(),
        vec![SimEvent::Peer(PeerEvent::IdentityAssigned(PeerId::new(
            "peer-Q"
        )))]
    );
}

#[test]
fn test_peer_list_excludes_self() {
    let mut sim = client("peer-A");
    sim.receive(from(
        "server",
        Packet::PeerListSnapshot {
            peers: vec![PeerId::new("peer-A"), PeerId::new("peer-B"), PeerId::server()],
        },
    ))
    .unwrap();
    assert_eq!(sim.peers().len(), 2);
    assert!(!sim.peers().contains(&PeerId::new("peer-A")));

    sim.receive(from(
        "server",
        Packet::PeerDisconnected {
            peer_id: PeerId::new("peer-B"),
        },
    ))
    .unwrap();
    assert_eq!(sim.peers().len(), 1);
}

#[test]
fn test_custom_messages_pass_through() {
    let mut sender = client("peer-A");
    sender.send_custom(Target::Broadcast, "chat", json!({"text": "hi"}));
    let outbox = sender.drain_outbox();
    assert_eq!(names(&outbox), vec!["CustomMessage"]);

    let mut receiver = client("peer-B");
    let (events, _subscription) = record(&receiver);
    for outbound in outbox {
        receiver
            .receive(Envelope::new(PeerId::new("peer-A"), outbound.packet))
            .unwrap();
    }
    assert_eq!(
        *events.lock().unwrap(),
        vec![SimEvent::Custom {
            from: Some(PeerId::new("peer-A")),
            channel: "chat".to_string(),
            data: json!({"text": "hi"}),
        }]
    );
}

// ---- Two participants -----------------------------------------------------------------

#[test]
fn test_server_and_client_converge() {
    let mut server = server();
    server.spawn(&world(), ship()).unwrap();
    server.start().unwrap();

    let mut client = Simulation::new(SimulationConfig::default(), types());
    server.on_peer_connected(PeerId::new("peer-A")).unwrap();
    let outbox = server.drain_outbox();
    for outbound in outbox {
        if outbound.target != Target::Broadcast {
            client
                .receive(Envelope::new(PeerId::server(), outbound.packet))
                .unwrap();
        }
    }
    assert_eq!(client.local_peer(), &PeerId::new("peer-A"));
    assert_eq!(client.pending_finalize().len(), 1);
    client.start().unwrap();

    client
        .reparent(&EntityRef::from("ent_2"), &world())
        .unwrap();
    client
        .write_value(&ValueId::from("ent_1/behavior_1/speed"), json!(4.5))
        .unwrap();
    client.tick();
    shuttle(&mut client, &mut server);

    server.set_enabled(&EntityRef::from("ent_1"), false).unwrap();
    server.tick();
    shuttle(&mut server, &mut client);

    assert_eq!(
        server.build_snapshot().unwrap(),
        client.build_snapshot().unwrap()
    );
    assert_eq!(
        server.read::<f64>(&ValueId::from("ent_1/behavior_1/speed")),
        Some(4.5)
    );
    assert!(!client.tree().get(&EntityRef::from("ent_1")).unwrap().enabled());
    assert!(server.drain_outbox().is_empty());
    assert!(client.drain_outbox().is_empty());
}
