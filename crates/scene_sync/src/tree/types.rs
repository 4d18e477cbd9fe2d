//! Entity and behavior type tables.
//!
//! A [`TypeRegistry`] is built by the embedding application and handed to
//! each simulation at construction, so several simulations with different
//! (or shared) type sets can live in one process.

use super::behavior::BehaviorFactory;
use crate::error::TypeError;
use crate::types::WireValue;
use crate::value::Adapter;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Declaration of a field on an entity type or behavior type.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub default: WireValue,
    pub replicated: bool,
    pub adapter: Option<Adapter>,
}

impl FieldSpec {
    /// A replicated, plain field.
    pub fn new(name: impl Into<String>, default: impl Into<WireValue>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            replicated: true,
            adapter: None,
        }
    }

    /// Field kept only on this participant.
    pub fn local_only(mut self) -> Self {
        self.replicated = false;
        self
    }

    pub fn with_adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = Some(adapter);
        self
    }
}

/// Field layout of an entity type.
#[derive(Debug, Clone)]
pub struct EntityTypeSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl EntityTypeSpec {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// Lookup tables for entity and behavior types, keyed by name and type URI.
#[derive(Default)]
pub struct TypeRegistry {
    entity_types: HashMap<String, EntityTypeSpec>,
    behavior_types: HashMap<String, Arc<dyn BehaviorFactory>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entity_type(&mut self, spec: EntityTypeSpec) -> Result<(), TypeError> {
        if self.entity_types.contains_key(&spec.name) {
            return Err(TypeError::DuplicateEntityType(spec.name));
        }
        debug!("📝 Registered entity type '{}'", spec.name);
        self.entity_types.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn register_behavior<F>(&mut self, factory: F) -> Result<(), TypeError>
    where
        F: BehaviorFactory + 'static,
    {
        let uri = factory.type_uri().to_string();
        if self.behavior_types.contains_key(&uri) {
            return Err(TypeError::DuplicateBehaviorType(uri));
        }
        debug!("📝 Registered behavior type '{}'", uri);
        self.behavior_types.insert(uri, Arc::new(factory));
        Ok(())
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeSpec> {
        self.entity_types.get(name)
    }

    pub fn behavior(&self, type_uri: &str) -> Option<Arc<dyn BehaviorFactory>> {
        self.behavior_types.get(type_uri).cloned()
    }

    pub fn has_behavior(&self, type_uri: &str) -> bool {
        self.behavior_types.contains_key(type_uri)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut behaviors: Vec<_> = self.behavior_types.keys().collect();
        behaviors.sort();
        f.debug_struct("TypeRegistry")
            .field("entity_types", &self.entity_types.keys().collect::<Vec<_>>())
            .field("behavior_types", &behaviors)
            .finish()
    }
}
