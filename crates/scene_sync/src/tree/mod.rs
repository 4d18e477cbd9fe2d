//! # Entity Tree
//!
//! Three root trees ([`RootTree`](crate::types::RootTree)) hold every entity
//! of a simulation. Each entity owns values and behaviors; behaviors own
//! values of their own. Every structural mutation queues a [`TreeEvent`].
//!
//! ## Lifecycle
//!
//! ```text
//! spawn(Live)  : Spawning ──────────────► Finalized
//! spawn(Inert) : Spawning ──► Inert ──finalize──► Finalized
//! ```
//!
//! Behavior `setup` only ever runs on the transition into `Finalized`, once
//! the whole spawned subtree is structurally present.

mod behavior;
mod core;
mod definition;
mod entity;
mod events;
mod types;

pub use behavior::{
    AttachedBehavior, Behavior, BehaviorContext, BehaviorFactory, BehaviorType, DataBehavior,
};
pub use self::core::{EntityTree, SpawnMode};
pub use definition::{BehaviorDefinition, EntityDefinition, FieldInit};
pub use entity::{Entity, EntityState};
pub use events::TreeEvent;
pub use types::{EntityTypeSpec, FieldSpec, TypeRegistry};
