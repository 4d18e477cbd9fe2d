//! # Scene Sync
//!
//! A state replication engine that keeps a hierarchical scene of entities,
//! their behaviors and their field values consistent across one
//! authoritative server and any number of clients.
//!
//! ## Core Features
//!
//! - **Clocked Values**: Every replicated field carries a logical clock; concurrent
//!   writes converge last-writer-wins with a deterministic originator tie-break
//! - **Entity Trees**: World, prefab and local root trees with typed structural events
//! - **Deferred Setup**: Snapshot entities are built inert and set up in order on start
//! - **Echo Suppression**: Inbound changes are never sent back out, via scoped guards
//! - **Batched Reports**: Dirty values are flushed once per tick in bounded packets
//! - **Async Driver**: A tokio session confines each simulation to one task
//!
//! ## Architecture Overview
//!
//! - [`value`] - clocked values, adapters and the per-simulation registry
//! - [`tree`] - entities, behaviors, definitions and the type registry
//! - [`sync`] - structural, behavior, value, snapshot and peer synchronization
//! - [`protocol`] - wire packets and the JSON envelope codec
//! - [`sim`] - the [`Simulation`] that owns all of the above
//! - [`session`] / [`transport`] - async driving and packet delivery
//!
//! ## Quick Start Example
//!
//! ```rust
//! use scene_sync::protocol::{Envelope, Target};
//! use scene_sync::tree::{EntityDefinition, TypeRegistry};
//! use scene_sync::{PeerId, RootTree, Simulation, SimulationConfig, ValueId};
//! use std::sync::Arc;
//!
//! let types = Arc::new(TypeRegistry::new());
//! let mut server = Simulation::new(SimulationConfig::server(), types.clone());
//! let mut client = Simulation::new(SimulationConfig::client(PeerId::new("peer-A")), types);
//! server.start().unwrap();
//! client.start().unwrap();
//!
//! server
//!     .spawn_in(RootTree::World, EntityDefinition::new("Ship").with_ref("ent_1").with_value("hull", 100))
//!     .unwrap();
//! server.write_value(&ValueId::from("ent_1/hull"), 75.into()).unwrap();
//! server.tick();
//!
//! for outbound in server.drain_outbox() {
//!     assert_eq!(outbound.target, Target::Broadcast);
//!     client.receive(Envelope::new(PeerId::server(), outbound.packet)).unwrap();
//! }
//! assert_eq!(client.read::<i64>(&ValueId::from("ent_1/hull")), Some(75));
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod sim;
pub mod sync;
pub mod transport;
pub mod tree;
pub mod types;
pub mod value;

pub use config::SimulationConfig;
pub use error::{ProtocolError, SessionError, SyncError, TransportError, TreeError, TypeError, ValueError};
pub use events::{EventBus, PeerEvent, SimEvent, Subscription};
pub use protocol::{Envelope, Outbound, Packet, Target};
pub use session::{SessionHandle, SimulationSession};
pub use shutdown::ShutdownState;
pub use sim::{RunState, Simulation, SyncStats};
pub use transport::{LoopbackHub, PacketTransport};
pub use types::{BehaviorRef, EntityRef, PeerId, Role, RootTree, ValueId, WireValue};
pub use value::{ApplyOutcome, ClockedValue};
