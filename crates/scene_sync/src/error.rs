//! Error types for the replication engine.
//!
//! Errors are split by the layer that raises them. [`SyncError`] is what the
//! simulation surfaces; its [`SyncError::Violation`] variant marks a protocol
//! violation that drops a single packet without tearing the connection down.
//! Stale or tie-lost writes are not errors at all, see
//! [`ApplyOutcome`](crate::value::ApplyOutcome).

use crate::types::{BehaviorRef, EntityRef, PeerId, ValueId};

/// Errors raised by clocked values and the value registry.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// Two values were constructed with the same identifier in one registry
    #[error("Duplicate value registration: {0}")]
    Duplicate(ValueId),

    /// Local operation on a value that is not registered
    #[error("Value not found: {0}")]
    NotFound(ValueId),

    /// The adapter could not convert between native and wire form
    #[error("Adapter '{adapter}' failed for {id}: {reason}")]
    Adapter {
        id: ValueId,
        adapter: &'static str,
        reason: String,
    },

    /// A native write used a type the slot does not hold
    #[error("Type mismatch for {id}: expected {expected}")]
    TypeMismatch { id: ValueId, expected: &'static str },

    /// The owning entity is under another participant's authority
    #[error("{local} may not write {id}: authority belongs to {authority}")]
    NotAuthority {
        id: ValueId,
        local: PeerId,
        authority: PeerId,
    },
}

/// Errors raised by the entity tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("Entity not found: {0}")]
    UnknownEntity(EntityRef),

    #[error("Behavior {behavior} not attached to entity {entity}")]
    UnknownBehavior {
        entity: EntityRef,
        behavior: BehaviorRef,
    },

    #[error("Entity ref already in use: {0}")]
    DuplicateEntity(EntityRef),

    #[error("Behavior ref already in use: {0}")]
    DuplicateBehavior(BehaviorRef),

    #[error("Unknown behavior type: {0}")]
    UnknownBehaviorType(String),

    /// Field names are id segments and may not contain `/`
    #[error("Invalid field name '{0}'")]
    InvalidFieldName(String),

    /// Root entities cannot be destroyed, renamed or moved
    #[error("Root entity {0} cannot be modified")]
    RootImmutable(EntityRef),

    #[error("Cannot reparent {entity} into {parent}: different root trees")]
    CrossTreeReparent { entity: EntityRef, parent: EntityRef },

    #[error("Cannot reparent {entity} under its own descendant {parent}")]
    CyclicReparent { entity: EntityRef, parent: EntityRef },

    #[error("Behavior {behavior} on {entity} failed to set up: {reason}")]
    BehaviorSetup {
        entity: EntityRef,
        behavior: BehaviorRef,
        reason: String,
    },

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Errors raised while registering entity or behavior types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("Entity type already registered: {0}")]
    DuplicateEntityType(String),

    #[error("Behavior type already registered: {0}")]
    DuplicateBehaviorType(String),
}

/// Errors raised by the wire codec.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Packet encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Packet decoding failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Inbound definitions must carry explicit refs
    #[error("Definition '{0}' has no ref")]
    MissingRef(String),
}

/// Top-level error surfaced by the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A packet referenced something that does not exist locally.
    /// The packet is dropped; the connection is kept.
    #[error("Protocol violation in {operation}: {reference} does not exist")]
    Violation {
        operation: &'static str,
        reference: String,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl SyncError {
    pub(crate) fn violation(operation: &'static str, reference: impl ToString) -> Self {
        Self::Violation {
            operation,
            reference: reference.to_string(),
        }
    }

    /// True when the error marks a packet that referenced missing state.
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation { .. })
    }
}

/// Errors raised by the packet transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer not connected: {0}")]
    PeerNotConnected(PeerId),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors raised by the async session driver.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session has shut down")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
