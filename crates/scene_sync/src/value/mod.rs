//! # Clocked Values
//!
//! A clocked value is a single replicated field with a logical clock. Local
//! writes bump the clock by exactly one and stamp the local peer as
//! originator; remote updates go through [`ClockedValue::apply`], which
//! resolves conflicts last-writer-wins with a deterministic tie-break and
//! never re-emits a change.
//!
//! Values live in a [`ValueRegistry`], one per simulation instance.

mod adapter;
mod clocked;
mod registry;

pub use adapter::{Adapter, NativeBox};
pub use clocked::{resolve, ApplyOutcome, ClockedValue, Slot, ValueChange};
pub use registry::ValueRegistry;
