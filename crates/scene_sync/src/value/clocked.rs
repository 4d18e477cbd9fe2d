//! The clocked value and its conflict-resolution rule.

use super::adapter::{Adapter, NativeBox};
use crate::error::ValueError;
use crate::types::{EntityRef, PeerId, ValueId, WireValue};
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::cmp::Ordering;

/// Storage for a value: either already wire-safe, or native behind an adapter.
pub enum Slot {
    Plain(WireValue),
    Adapted { native: NativeBox, adapter: Adapter },
}

impl Slot {
    pub fn plain(value: impl Into<WireValue>) -> Self {
        Self::Plain(value.into())
    }

    /// Builds an adapted slot by decoding an initial wire value.
    pub fn adapted(adapter: Adapter, wire: &WireValue) -> Result<Self, String> {
        let native = adapter.decode(wire)?;
        Ok(Self::Adapted { native, adapter })
    }

    pub fn adapter(&self) -> Option<&Adapter> {
        match self {
            Slot::Plain(_) => None,
            Slot::Adapted { adapter, .. } => Some(adapter),
        }
    }

    fn to_wire(&self) -> Result<WireValue, String> {
        match self {
            Slot::Plain(value) => Ok(value.clone()),
            Slot::Adapted { native, adapter } => adapter.encode(native.as_ref()),
        }
    }

    /// Replaces the stored value. Decoding happens first so a failure leaves the slot untouched.
    fn store_wire(&mut self, wire: &WireValue) -> Result<(), String> {
        match self {
            Slot::Plain(value) => {
                *value = wire.clone();
                Ok(())
            }
            Slot::Adapted { native, adapter } => {
                let decoded = adapter.decode(wire)?;
                *native = decoded;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Slot::Adapted { adapter, .. } => f.debug_tuple("Adapted").field(&adapter.name()).finish(),
        }
    }
}

/// Result of applying a remote update to a clocked value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyOutcome {
    /// The update was stored.
    Accepted,
    /// The incoming clock was older than the stored one.
    Stale,
    /// Equal clocks and the incoming originator lost the tie-break.
    TieLost,
}

impl ApplyOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, ApplyOutcome::Accepted)
    }
}

/// Decides whether a remote update wins over the stored state.
///
/// Equal clocks are broken by originator: an update without an originator is
/// authoritative and always wins; a tracked originator never beats a value
/// that was seeded without one; otherwise the lexicographically larger (or
/// equal) originator wins, so replaying the same update is a no-op accept.
///
/// # Examples
///
/// ```rust
/// use scene_sync::value::{resolve, ApplyOutcome};
/// use scene_sync::PeerId;
///
/// let a = PeerId::new("peer-A");
/// let b = PeerId::new("peer-B");
/// assert_eq!(resolve(3, Some(&a), 3, Some(&b)), ApplyOutcome::Accepted);
/// assert_eq!(resolve(3, Some(&b), 3, Some(&a)), ApplyOutcome::TieLost);
/// assert_eq!(resolve(3, Some(&b), 2, None), ApplyOutcome::Stale);
/// ```
pub fn resolve(
    current_clock: u64,
    current_originator: Option<&PeerId>,
    incoming_clock: u64,
    incoming_originator: Option<&PeerId>,
) -> ApplyOutcome {
    match incoming_clock.cmp(&current_clock) {
        Ordering::Less => ApplyOutcome::Stale,
        Ordering::Greater => ApplyOutcome::Accepted,
        Ordering::Equal => match (incoming_originator, current_originator) {
            (None, _) => ApplyOutcome::Accepted,
            (Some(_), None) => ApplyOutcome::TieLost,
            (Some(incoming), Some(current)) if incoming < current => ApplyOutcome::TieLost,
            (Some(_), Some(_)) => ApplyOutcome::Accepted,
        },
    }
}

/// The single change notification produced by a local write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub id: ValueId,
    pub owner: EntityRef,
    pub value: WireValue,
    pub clock: u64,
    pub originator: PeerId,
}

/// A replicated field: identity, current value, logical clock and originator.
#[derive(Debug)]
pub struct ClockedValue {
    id: ValueId,
    owner: EntityRef,
    slot: Slot,
    clock: u64,
    originator: Option<PeerId>,
    replicated: bool,
}

impl ClockedValue {
    /// Creates a seeded value at clock 0 with no originator.
    pub fn new(id: ValueId, owner: EntityRef, slot: Slot, replicated: bool) -> Self {
        Self {
            id,
            owner,
            slot,
            clock: 0,
            originator: None,
            replicated,
        }
    }

    /// Seeds the value at the clock and originator carried by a definition.
    pub fn at(mut self, clock: u64, originator: Option<PeerId>) -> Self {
        self.clock = clock;
        self.originator = originator;
        self
    }

    pub fn id(&self) -> &ValueId {
        &self.id
    }

    /// Entity that owns this value (directly or through a behavior).
    pub fn owner(&self) -> &EntityRef {
        &self.owner
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn originator(&self) -> Option<&PeerId> {
        self.originator.as_ref()
    }

    pub fn replicated(&self) -> bool {
        self.replicated
    }

    pub fn adapter(&self) -> Option<&Adapter> {
        self.slot.adapter()
    }

    /// Local write from wire form. The only path, with [`write_native`](Self::write_native),
    /// that advances the clock.
    pub fn write(&mut self, wire: WireValue, local: &PeerId) -> Result<ValueChange, ValueError> {
        let id = &self.id;
        self.slot
            .store_wire(&wire)
            .map_err(|reason| adapter_error(id, self.slot.adapter(), reason))?;
        Ok(self.commit(wire, local))
    }

    /// Local write of a native value into an adapted slot.
    pub fn write_native<T: Any + Send + Sync>(
        &mut self,
        value: T,
        local: &PeerId,
    ) -> Result<ValueChange, ValueError> {
        let wire = match &mut self.slot {
            Slot::Adapted { native, adapter } if adapter.accepts::<T>() => {
                let wire = adapter
                    .encode(&value)
                    .map_err(|reason| adapter_error(&self.id, Some(&*adapter), reason))?;
                *native = Box::new(value);
                wire
            }
            Slot::Adapted { adapter, .. } => {
                return Err(ValueError::TypeMismatch {
                    id: self.id.clone(),
                    expected: adapter.native_type(),
                })
            }
            Slot::Plain(_) => {
                return Err(ValueError::TypeMismatch {
                    id: self.id.clone(),
                    expected: "wire value",
                })
            }
        };
        Ok(self.commit(wire, local))
    }

    fn commit(&mut self, wire: WireValue, local: &PeerId) -> ValueChange {
        self.clock += 1;
        self.originator = Some(local.clone());
        ValueChange {
            id: self.id.clone(),
            owner: self.owner.clone(),
            value: wire,
            clock: self.clock,
            originator: local.clone(),
        }
    }

    /// Applies a remote update. Never advances the clock on its own and never emits a change.
    pub fn apply(
        &mut self,
        wire: &WireValue,
        clock: u64,
        originator: Option<&PeerId>,
    ) -> Result<ApplyOutcome, ValueError> {
        let outcome = resolve(self.clock, self.originator.as_ref(), clock, originator);
        if outcome.is_accepted() {
            let id = &self.id;
            self.slot
                .store_wire(wire)
                .map_err(|reason| adapter_error(id, self.slot.adapter(), reason))?;
            self.clock = clock;
            self.originator = originator.cloned();
        }
        Ok(outcome)
    }

    /// Current value in wire form.
    pub fn wire(&self) -> Result<WireValue, ValueError> {
        self.slot
            .to_wire()
            .map_err(|reason| adapter_error(&self.id, self.slot.adapter(), reason))
    }

    /// Current value deserialized from its wire form.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, ValueError> {
        let wire = self.wire()?;
        serde_json::from_value(wire).map_err(|e| ValueError::Adapter {
            id: self.id.clone(),
            adapter: "serde_json",
            reason: e.to_string(),
        })
    }

    /// Borrow the native value of an adapted slot.
    pub fn native<T: Any>(&self) -> Option<&T> {
        match &self.slot {
            Slot::Adapted { native, .. } => native.downcast_ref::<T>(),
            Slot::Plain(_) => None,
        }
    }
}

fn adapter_error(id: &ValueId, adapter: Option<&Adapter>, reason: String) -> ValueError {
    ValueError::Adapter {
        id: id.clone(),
        adapter: adapter.map(Adapter::name).unwrap_or("plain"),
        reason,
    }
}
