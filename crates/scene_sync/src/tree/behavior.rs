//! Behaviors: named, typed units of logic attached to an entity.

use super::core::EntityTree;
use super::entity::Entity;
use super::types::FieldSpec;
use crate::error::ValueError;
use crate::types::{BehaviorRef, EntityRef, ValueId, WireValue};
use crate::value::ValueRegistry;
use std::any::Any;
use std::fmt;

/// Runtime logic of an attached behavior.
///
/// `setup` runs once the owning entity is finalized, which for snapshot
/// spawns happens only after the whole snapshot has been built. It may
/// therefore look up siblings, parents and children by name.
pub trait Behavior: Send + Any {
    /// Deferred initialization. An error leaves the behavior uninitialized.
    fn setup(&mut self, ctx: &mut BehaviorContext<'_>) -> Result<(), String> {
        let _ = ctx;
        Ok(())
    }

    /// Called before the behavior is detached, explicitly or by entity destruction.
    fn teardown(&mut self, ctx: &mut BehaviorContext<'_>) {
        let _ = ctx;
    }

    /// Get the behavior as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get the behavior as Any for mutable downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Creates behavior instances for a type URI and declares their fields.
pub trait BehaviorFactory: Send + Sync {
    fn type_uri(&self) -> &str;

    fn fields(&self) -> &[FieldSpec];

    fn create(&self) -> Box<dyn Behavior>;
}

type CreateFn = dyn Fn() -> Box<dyn Behavior> + Send + Sync;

/// Closure-backed [`BehaviorFactory`].
pub struct BehaviorType {
    type_uri: String,
    fields: Vec<FieldSpec>,
    create: Box<CreateFn>,
}

impl BehaviorType {
    pub fn new<F>(type_uri: impl Into<String>, fields: Vec<FieldSpec>, create: F) -> Self
    where
        F: Fn() -> Box<dyn Behavior> + Send + Sync + 'static,
    {
        Self {
            type_uri: type_uri.into(),
            fields,
            create: Box::new(create),
        }
    }

    /// A behavior type that only carries values and has no logic.
    pub fn data(type_uri: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self::new(type_uri, fields, || Box::new(DataBehavior))
    }
}

impl BehaviorFactory for BehaviorType {
    fn type_uri(&self) -> &str {
        &self.type_uri
    }

    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn create(&self) -> Box<dyn Behavior> {
        (self.create)()
    }
}

impl fmt::Debug for BehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorType")
            .field("type_uri", &self.type_uri)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Behavior with no logic of its own.
#[derive(Debug, Default)]
pub struct DataBehavior;

impl Behavior for DataBehavior {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Attachment record kept by the tree for every behavior.
pub struct AttachedBehavior {
    pub(crate) bref: BehaviorRef,
    pub(crate) owner: EntityRef,
    pub(crate) type_uri: String,
    pub(crate) fields: Vec<String>,
    pub(crate) instance: Option<Box<dyn Behavior>>,
    pub(crate) initialized: bool,
}

impl AttachedBehavior {
    pub fn bref(&self) -> &BehaviorRef {
        &self.bref
    }

    pub fn owner(&self) -> &EntityRef {
        &self.owner
    }

    pub fn type_uri(&self) -> &str {
        &self.type_uri
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    /// Whether `setup` has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn field_id(&self, field: &str) -> ValueId {
        ValueId::derive(&self.owner, Some(&self.bref), field)
    }

    /// Downcast the running instance.
    pub fn instance<T: Behavior>(&self) -> Option<&T> {
        self.instance.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn instance_mut<T: Behavior>(&mut self) -> Option<&mut T> {
        self.instance.as_mut()?.as_any_mut().downcast_mut::<T>()
    }
}

impl fmt::Debug for AttachedBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedBehavior")
            .field("bref", &self.bref)
            .field("owner", &self.owner)
            .field("type_uri", &self.type_uri)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// What a behavior sees of the world during `setup` and `teardown`.
pub struct BehaviorContext<'a> {
    tree: &'a EntityTree,
    values: &'a mut ValueRegistry,
    entity: EntityRef,
    behavior: BehaviorRef,
}

impl<'a> BehaviorContext<'a> {
    pub(crate) fn new(
        tree: &'a EntityTree,
        values: &'a mut ValueRegistry,
        entity: EntityRef,
        behavior: BehaviorRef,
    ) -> Self {
        Self {
            tree,
            values,
            entity,
            behavior,
        }
    }

    pub fn entity_ref(&self) -> &EntityRef {
        &self.entity
    }

    pub fn behavior_ref(&self) -> &BehaviorRef {
        &self.behavior
    }

    /// The owning entity.
    pub fn entity(&self) -> Option<&Entity> {
        self.tree.get(&self.entity)
    }

    pub fn parent(&self) -> Option<&Entity> {
        let parent = self.entity()?.parent()?;
        self.tree.get(parent)
    }

    pub fn find_sibling(&self, name: &str) -> Option<&Entity> {
        self.tree.find_sibling(&self.entity, name)
    }

    pub fn find_child(&self, name: &str) -> Option<&Entity> {
        self.tree.find_child(&self.entity, name)
    }

    pub fn tree(&self) -> &EntityTree {
        self.tree
    }

    /// Reads a field of this behavior.
    pub fn read(&self, field: &str) -> Option<WireValue> {
        let id = ValueId::derive(&self.entity, Some(&self.behavior), field);
        self.values.get(&id)?.wire().ok()
    }

    /// Reads any value in the simulation.
    pub fn read_value(&self, id: &ValueId) -> Option<WireValue> {
        self.values.get(id)?.wire().ok()
    }

    /// Writes a field of this behavior as a normal local write.
    pub fn write(&mut self, field: &str, value: WireValue) -> Result<u64, ValueError> {
        let id = ValueId::derive(&self.entity, Some(&self.behavior), field);
        if let Some(authority) = self.entity().and_then(|e| e.authority()) {
            if authority != self.values.local_peer() {
                return Err(ValueError::NotAuthority {
                    id,
                    local: self.values.local_peer().clone(),
                    authority: authority.clone(),
                });
            }
        }
        self.values.write(&id, value)
    }
}
