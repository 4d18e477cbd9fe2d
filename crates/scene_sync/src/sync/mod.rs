//! # Synchronization Routines
//!
//! Per-concern glue between a [`Simulation`](crate::Simulation) and the wire:
//!
//! - [`entity_sync`] - spawn, destroy, reparent, rename, enable, authority
//! - [`behavior_sync`] - behavior attach and detach
//! - [`value_sync`] - dirty tracking, batched `ReportValues`, remote apply
//! - [`snapshot`] - initial snapshot and deferred finalization
//! - [`peers`] - identity handshake, peer list, authority release
//!
//! ## Echo suppression
//!
//! Every inbound handler runs its mutation inside an [`IgnoreGuard`] over
//! the affected refs and routes the resulting events before the guard is
//! released. The outbound mapping skips anything in the [`IgnoreSet`], so a
//! change received from the network is never sent back out. Value updates
//! need no guard: remote applies never raise a change in the first place.

pub mod behavior_sync;
pub mod entity_sync;
mod ignore;
pub mod peers;
pub mod snapshot;
pub mod value_sync;

pub use ignore::{IgnoreGuard, IgnoreSet};
pub use peers::PeerTable;
pub use value_sync::DirtyBuffer;

#[cfg(test)]
mod tests;
