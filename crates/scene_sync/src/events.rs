//! # Simulation Events
//!
//! Typed, synchronous publish/subscribe used by collaborators (rendering,
//! physics, editors) to observe a simulation read-only.
//!
//! Listeners are registered with [`EventBus::subscribe`] and stay active
//! for as long as the returned [`Subscription`] is alive. Dispatch happens
//! on the simulation's own execution context, in emission order.

use crate::tree::TreeEvent;
use crate::types::{PeerId, ValueId, WireValue};
use crate::value::ValueChange;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Type alias for event listeners
type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Everything a simulation tells its observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum SimEvent {
    Tree(TreeEvent),
    /// A local write; never raised for remote updates.
    ValueChanged(ValueChange),
    /// A remote update was accepted into the local value.
    ValueApplied {
        id: ValueId,
        value: WireValue,
        clock: u64,
        originator: Option<PeerId>,
    },
    Peer(PeerEvent),
    Custom {
        from: Option<PeerId>,
        channel: String,
        data: WireValue,
    },
    Started,
    Stopped,
}

/// Changes to the set of known participants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "peer")]
pub enum PeerEvent {
    IdentityAssigned(PeerId),
    Connected(PeerId),
    Disconnected(PeerId),
    ListReceived(Vec<PeerId>),
}

/// Synchronous multi-listener event dispatcher.
pub struct EventBus<E> {
    listeners: Arc<DashMap<u64, Listener<E>>>,
    next_id: AtomicU64,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a listener.
    ///
    /// # Returns
    ///
    /// A handle that removes the listener when dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        let listeners: Weak<DashMap<u64, Listener<E>>> = Arc::downgrade(&self.listeners);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(listeners) = listeners.upgrade() {
                    listeners.remove(&id);
                }
            })),
        }
    }

    /// Delivers an event to every listener.
    ///
    /// Listeners are snapshotted first so one may subscribe or unsubscribe
    /// during dispatch.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Handle to a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Keeps the listener registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
