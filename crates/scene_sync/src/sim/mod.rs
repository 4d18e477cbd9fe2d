//! The simulation instance: single owner of tree, values and sync state.
//!
//! The implementation is split across several files: construction and the
//! local API in `core`, inbound routing and event pumping in `dispatch`,
//! and one file per synchronization concern under [`crate::sync`].

mod core;
mod dispatch;
mod stats;

pub use self::core::{RunState, Simulation};
pub use stats::SyncStats;
