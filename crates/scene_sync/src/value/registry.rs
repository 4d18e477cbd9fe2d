//! Per-simulation index of clocked values.

use super::clocked::{ApplyOutcome, ClockedValue, ValueChange};
use crate::error::ValueError;
use crate::types::{PeerId, ValueId, WireValue};
use std::any::Any;
use std::collections::HashMap;
use tracing::trace;

/// Identifier → value table, plus the local identity used to stamp writes.
///
/// The registry holds no policy: conflict resolution lives in
/// [`ClockedValue::apply`]. Local writes queue a [`ValueChange`] which the
/// owning simulation drains and fans out once per operation.
#[derive(Debug)]
pub struct ValueRegistry {
    local: PeerId,
    values: HashMap<ValueId, ClockedValue>,
    changes: Vec<ValueChange>,
}

impl ValueRegistry {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            values: HashMap::new(),
            changes: Vec::new(),
        }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    /// Replaces the local identity, e.g. after a handshake assigned one.
    pub fn set_local_peer(&mut self, peer: PeerId) {
        self.local = peer;
    }

    /// Registers a value. A second registration under the same id is a construction bug.
    pub fn register(&mut self, value: ClockedValue) -> Result<(), ValueError> {
        if self.values.contains_key(value.id()) {
            return Err(ValueError::Duplicate(value.id().clone()));
        }
        self.values.insert(value.id().clone(), value);
        Ok(())
    }

    pub fn unregister(&mut self, id: &ValueId) -> Option<ClockedValue> {
        self.values.remove(id)
    }

    pub fn get(&self, id: &ValueId) -> Option<&ClockedValue> {
        self.values.get(id)
    }

    pub fn get_mut(&mut self, id: &ValueId) -> Option<&mut ClockedValue> {
        self.values.get_mut(id)
    }

    pub fn contains(&self, id: &ValueId) -> bool {
        self.values.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ValueId> {
        self.values.keys()
    }

    /// Local write from wire form. Returns the new clock.
    pub fn write(&mut self, id: &ValueId, wire: WireValue) -> Result<u64, ValueError> {
        let value = self
            .values
            .get_mut(id)
            .ok_or_else(|| ValueError::NotFound(id.clone()))?;
        let change = value.write(wire, &self.local)?;
        let clock = change.clock;
        self.changes.push(change);
        Ok(clock)
    }

    /// Local write of a native value into an adapted slot. Returns the new clock.
    pub fn write_native<T: Any + Send + Sync>(
        &mut self,
        id: &ValueId,
        native: T,
    ) -> Result<u64, ValueError> {
        let value = self
            .values
            .get_mut(id)
            .ok_or_else(|| ValueError::NotFound(id.clone()))?;
        let change = value.write_native(native, &self.local)?;
        let clock = change.clock;
        self.changes.push(change);
        Ok(clock)
    }

    /// Remote update. `None` when the id is unknown here, which is not an error.
    pub fn apply(
        &mut self,
        id: &ValueId,
        wire: &WireValue,
        clock: u64,
        originator: Option<&PeerId>,
    ) -> Result<Option<ApplyOutcome>, ValueError> {
        let Some(value) = self.values.get_mut(id) else {
            trace!("🔍 Ignoring update for unknown value {}", id);
            return Ok(None);
        };
        let outcome = value.apply(wire, clock, originator)?;
        if !outcome.is_accepted() {
            trace!("⏪ {:?} update for {} at clock {}", outcome, id, clock);
        }
        Ok(Some(outcome))
    }

    /// Takes every change produced by local writes since the last drain.
    pub fn drain_changes(&mut self) -> Vec<ValueChange> {
        std::mem::take(&mut self.changes)
    }
}
