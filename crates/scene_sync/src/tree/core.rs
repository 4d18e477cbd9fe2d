use super::behavior::{AttachedBehavior, BehaviorContext};
use super::definition::{BehaviorDefinition, EntityDefinition, FieldInit};
use super::entity::{Entity, EntityState};
use super::events::TreeEvent;
use super::types::{FieldSpec, TypeRegistry};
use crate::error::{TreeError, ValueError};
use crate::types::{BehaviorRef, EntityRef, PeerId, RootTree, ValueId, WireValue};
use crate::value::{Adapter, ClockedValue, Slot, ValueRegistry};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace, warn};

/// How a freshly spawned subtree is brought to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// Behaviors are set up immediately.
    Live,
    /// Left inert until [`EntityTree::finalize`] is called.
    Inert,
}

/// Hierarchical container of entities and their behaviors.
///
/// The tree owns structure only; field values live in the
/// [`ValueRegistry`] passed into each mutating call. Every mutation queues
/// [`TreeEvent`]s which the owner drains with [`drain_events`](Self::drain_events).
pub struct EntityTree {
    entities: HashMap<EntityRef, Entity>,
    behaviors: HashMap<BehaviorRef, AttachedBehavior>,
    events: Vec<TreeEvent>,
}

impl EntityTree {
    /// Creates a tree containing only the three root entities.
    pub fn new() -> Self {
        let entities = RootTree::ALL
            .iter()
            .map(|root| (root.root_ref(), Entity::root_entity(*root)))
            .collect();
        Self {
            entities,
            behaviors: HashMap::new(),
            events: Vec::new(),
        }
    }

    // ---- Lookups ----------------------------------------------------------

    pub fn get(&self, eref: &EntityRef) -> Option<&Entity> {
        self.entities.get(eref)
    }

    pub fn contains(&self, eref: &EntityRef) -> bool {
        self.entities.contains_key(eref)
    }

    pub fn behavior(&self, bref: &BehaviorRef) -> Option<&AttachedBehavior> {
        self.behaviors.get(bref)
    }

    pub fn behavior_mut(&mut self, bref: &BehaviorRef) -> Option<&mut AttachedBehavior> {
        self.behaviors.get_mut(bref)
    }

    pub fn contains_behavior(&self, bref: &BehaviorRef) -> bool {
        self.behaviors.contains_key(bref)
    }

    /// Number of non-root entities.
    pub fn len(&self) -> usize {
        self.entities.len() - RootTree::ALL.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn find_child(&self, parent: &EntityRef, name: &str) -> Option<&Entity> {
        self.get(parent)?
            .children
            .iter()
            .filter_map(|child| self.get(child))
            .find(|child| child.name == name)
    }

    /// Another child of the same parent with the given name.
    pub fn find_sibling(&self, eref: &EntityRef, name: &str) -> Option<&Entity> {
        let parent = self.get(eref)?.parent.as_ref()?;
        self.get(parent)?
            .children
            .iter()
            .filter(|sibling| *sibling != eref)
            .filter_map(|sibling| self.get(sibling))
            .find(|sibling| sibling.name == name)
    }

    /// Resolves a `/`-separated name path below a root, e.g. `"Ship/Turret"`.
    pub fn find_by_path(&self, root: RootTree, path: &str) -> Option<&Entity> {
        let mut current = self.get(&root.root_ref())?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.find_child(&current.eref, segment)?;
        }
        Some(current)
    }

    /// The entity and all its descendants, pre-order. Empty if the ref is unknown.
    pub fn subtree(&self, eref: &EntityRef) -> Vec<EntityRef> {
        let mut out = Vec::new();
        let mut stack = vec![eref.clone()];
        while let Some(current) = stack.pop() {
            if let Some(entity) = self.entities.get(&current) {
                stack.extend(entity.children.iter().rev().cloned());
                out.push(current);
            }
        }
        out
    }

    pub fn entities_with_authority(&self, peer: &PeerId) -> Vec<EntityRef> {
        self.entities
            .values()
            .filter(|e| e.authority.as_ref() == Some(peer))
            .map(|e| e.eref.clone())
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- Spawn ------------------------------------------------------------

    /// Spawns a definition (and its whole subtree) under `parent`.
    ///
    /// All refs and behavior types are validated before anything is built;
    /// a failure part-way through construction leaves the tree and registry
    /// as they were.
    ///
    /// # Returns
    ///
    /// The ref of the top entity of the new subtree.
    pub fn spawn(
        &mut self,
        parent: &EntityRef,
        mut definition: EntityDefinition,
        mode: SpawnMode,
        values: &mut ValueRegistry,
        types: &TypeRegistry,
    ) -> Result<EntityRef, TreeError> {
        let root = self
            .get(parent)
            .ok_or_else(|| TreeError::UnknownEntity(parent.clone()))?
            .root;
        definition.assign_refs();
        self.validate(&definition, types)?;

        let mark = self.events.len();
        let eref = match self.build(parent, &definition, root, values, types) {
            Ok(eref) => eref,
            Err(err) => {
                if let Some(top) = &definition.eref {
                    self.remove_subtree(top, values, false);
                }
                self.events.truncate(mark);
                return Err(err);
            }
        };

        self.events.push(TreeEvent::DescendantSpawned {
            root,
            parent: parent.clone(),
            entity: eref.clone(),
            inert: mode == SpawnMode::Inert,
        });

        match mode {
            SpawnMode::Inert => {
                for member in self.subtree(&eref) {
                    if let Some(entity) = self.entities.get_mut(&member) {
                        entity.state = EntityState::Inert;
                    }
                }
            }
            SpawnMode::Live => {
                if let Err(err) = self.finalize(&eref, values) {
                    self.remove_subtree(&eref, values, false);
                    self.events.truncate(mark);
                    return Err(err);
                }
            }
        }

        debug!("🧬 Spawned entity {} ({}) under {}", definition.name, eref, parent);
        Ok(eref)
    }

    fn validate(&self, def: &EntityDefinition, types: &TypeRegistry) -> Result<(), TreeError> {
        let mut entities = HashSet::new();
        let mut behaviors = HashSet::new();
        self.validate_node(def, types, &mut entities, &mut behaviors)
    }

    fn validate_node(
        &self,
        def: &EntityDefinition,
        types: &TypeRegistry,
        entities: &mut HashSet<EntityRef>,
        behaviors: &mut HashSet<BehaviorRef>,
    ) -> Result<(), TreeError> {
        if let Some(eref) = &def.eref {
            if self.entities.contains_key(eref) || !entities.insert(eref.clone()) {
                return Err(TreeError::DuplicateEntity(eref.clone()));
            }
        }
        check_field_names(&def.values)?;
        for behavior in &def.behaviors {
            check_field_names(&behavior.values)?;
            if let Some(bref) = &behavior.bref {
                if self.behaviors.contains_key(bref) || !behaviors.insert(bref.clone()) {
                    return Err(TreeError::DuplicateBehavior(bref.clone()));
                }
            }
            if !types.has_behavior(&behavior.type_uri) {
                return Err(TreeError::UnknownBehaviorType(behavior.type_uri.clone()));
            }
        }
        for child in &def.children {
            self.validate_node(child, types, entities, behaviors)?;
        }
        Ok(())
    }

    /// Constructs entity, values, children, then behaviors.
    fn build(
        &mut self,
        parent: &EntityRef,
        def: &EntityDefinition,
        root: RootTree,
        values: &mut ValueRegistry,
        types: &TypeRegistry,
    ) -> Result<EntityRef, TreeError> {
        let eref = def.eref.clone().unwrap_or_default();
        self.entities.insert(
            eref.clone(),
            Entity {
                eref: eref.clone(),
                name: def.name.clone(),
                entity_type: def.entity_type.clone(),
                enabled: def.enabled,
                parent: Some(parent.clone()),
                children: Vec::new(),
                behaviors: Vec::new(),
                fields: Vec::new(),
                authority: def.authority.clone(),
                root,
                state: EntityState::Spawning,
            },
        );
        if let Some(parent) = self.entities.get_mut(parent) {
            parent.children.push(eref.clone());
        }

        let specs = def
            .entity_type
            .as_deref()
            .and_then(|name| types.entity_type(name))
            .map(|spec| spec.fields.as_slice())
            .unwrap_or(&[]);
        let fields = construct_values(&eref, None, specs, &def.values, values)?;
        if let Some(entity) = self.entities.get_mut(&eref) {
            entity.fields = fields;
        }

        for child in &def.children {
            self.build(&eref, child, root, values, types)?;
        }
        for behavior in &def.behaviors {
            let bref = self.construct_behavior(&eref, behavior, values, types)?;
            self.events.push(TreeEvent::BehaviorAttached {
                root,
                entity: eref.clone(),
                behavior: bref,
                owner_spawning: true,
            });
        }
        Ok(eref)
    }

    fn construct_behavior(
        &mut self,
        owner: &EntityRef,
        def: &BehaviorDefinition,
        values: &mut ValueRegistry,
        types: &TypeRegistry,
    ) -> Result<BehaviorRef, TreeError> {
        let factory = types
            .behavior(&def.type_uri)
            .ok_or_else(|| TreeError::UnknownBehaviorType(def.type_uri.clone()))?;
        let bref = def.bref.clone().unwrap_or_default();
        let fields = construct_values(owner, Some(&bref), factory.fields(), &def.values, values)?;
        self.behaviors.insert(
            bref.clone(),
            AttachedBehavior {
                bref: bref.clone(),
                owner: owner.clone(),
                type_uri: def.type_uri.clone(),
                fields,
                instance: Some(factory.create()),
                initialized: false,
            },
        );
        if let Some(entity) = self.entities.get_mut(owner) {
            entity.behaviors.push(bref.clone());
        }
        Ok(bref)
    }

    // ---- Finalization -----------------------------------------------------

    /// Sets up every not-yet-finalized entity in the subtree, pre-order.
    ///
    /// Every behavior is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub fn finalize(
        &mut self,
        eref: &EntityRef,
        values: &mut ValueRegistry,
    ) -> Result<(), TreeError> {
        if !self.contains(eref) {
            return Err(TreeError::UnknownEntity(eref.clone()));
        }
        let mut first_error = None;
        for member in self.subtree(eref) {
            let Some(entity) = self.entities.get_mut(&member) else {
                continue;
            };
            if entity.state == EntityState::Finalized {
                continue;
            }
            entity.state = EntityState::Finalized;
            let root = entity.root;
            let behaviors = entity.behaviors.clone();
            for bref in behaviors {
                if let Err(err) = self.setup_behavior(&bref, values) {
                    warn!("❌ {}", err);
                    first_error.get_or_insert(err);
                }
            }
            self.events.push(TreeEvent::EntityFinalized {
                root,
                entity: member,
            });
        }
        first_error.map_or(Ok(()), Err)
    }

    fn setup_behavior(
        &mut self,
        bref: &BehaviorRef,
        values: &mut ValueRegistry,
    ) -> Result<(), TreeError> {
        let Some(attached) = self.behaviors.get_mut(bref) else {
            return Ok(());
        };
        if attached.initialized {
            return Ok(());
        }
        let owner = attached.owner.clone();
        let Some(mut instance) = attached.instance.take() else {
            return Ok(());
        };

        let result = {
            let mut ctx = BehaviorContext::new(self, values, owner.clone(), bref.clone());
            instance.setup(&mut ctx)
        };

        if let Some(attached) = self.behaviors.get_mut(bref) {
            attached.instance = Some(instance);
            attached.initialized = result.is_ok();
        }
        trace!("⚙️ Behavior {} set up on {}", bref, owner);
        result.map_err(|reason| TreeError::BehaviorSetup {
            entity: owner,
            behavior: bref.clone(),
            reason,
        })
    }

    fn teardown_behavior(&mut self, bref: &BehaviorRef, values: &mut ValueRegistry) {
        let Some(attached) = self.behaviors.get_mut(bref) else {
            return;
        };
        if !attached.initialized {
            return;
        }
        let owner = attached.owner.clone();
        let Some(mut instance) = attached.instance.take() else {
            return;
        };
        {
            let mut ctx = BehaviorContext::new(self, values, owner, bref.clone());
            instance.teardown(&mut ctx);
        }
        if let Some(attached) = self.behaviors.get_mut(bref) {
            attached.instance = Some(instance);
            attached.initialized = false;
        }
    }

    // ---- Destroy ----------------------------------------------------------

    /// Destroys an entity, its descendants and all their behaviors.
    ///
    /// Descendants are torn down before their ancestors. Only the top entity's
    /// `DescendantDestroyed` event has `cascaded == false`.
    pub fn destroy(&mut self, eref: &EntityRef, values: &mut ValueRegistry) -> Result<(), TreeError> {
        let entity = self
            .get(eref)
            .ok_or_else(|| TreeError::UnknownEntity(eref.clone()))?;
        if entity.is_root() {
            return Err(TreeError::RootImmutable(eref.clone()));
        }
        self.remove_subtree(eref, values, true);
        debug!("💥 Destroyed entity {}", eref);
        Ok(())
    }

    fn remove_subtree(&mut self, eref: &EntityRef, values: &mut ValueRegistry, emit: bool) {
        let parent = self.get(eref).and_then(|e| e.parent.clone());
        for member in self.subtree(eref).iter().rev() {
            self.remove_entity(member, member != eref, values, emit);
        }
        if let Some(parent) = parent.and_then(|p| self.entities.get_mut(&p)) {
            parent.children.retain(|child| child != eref);
        }
    }

    fn remove_entity(
        &mut self,
        eref: &EntityRef,
        cascaded: bool,
        values: &mut ValueRegistry,
        emit: bool,
    ) {
        let behaviors = match self.entities.get(eref) {
            Some(entity) => entity.behaviors.clone(),
            None => return,
        };
        for bref in behaviors.iter().rev() {
            self.remove_behavior(bref, values, true, emit);
        }
        let Some(entity) = self.entities.remove(eref) else {
            return;
        };
        for field in &entity.fields {
            values.unregister(&ValueId::derive(eref, None, field));
        }
        if emit {
            self.events.push(TreeEvent::DescendantDestroyed {
                root: entity.root,
                parent: entity.parent.unwrap_or_else(|| entity.root.root_ref()),
                entity: entity.eref,
                cascaded,
            });
        }
    }

    fn remove_behavior(
        &mut self,
        bref: &BehaviorRef,
        values: &mut ValueRegistry,
        cascaded: bool,
        emit: bool,
    ) {
        self.teardown_behavior(bref, values);
        let Some(attached) = self.behaviors.remove(bref) else {
            return;
        };
        for field in &attached.fields {
            values.unregister(&attached.field_id(field));
        }
        let root = match self.entities.get_mut(&attached.owner) {
            Some(owner) => {
                owner.behaviors.retain(|b| b != bref);
                owner.root
            }
            None => return,
        };
        if emit {
            self.events.push(TreeEvent::BehaviorDetached {
                root,
                entity: attached.owner,
                behavior: attached.bref,
                cascaded,
            });
        }
    }

    // ---- Narrow structural operations ---------------------------------------

    /// Moves an entity under a new parent in the same root tree.
    ///
    /// # Returns
    ///
    /// The previous parent.
    pub fn reparent(&mut self, eref: &EntityRef, parent: &EntityRef) -> Result<EntityRef, TreeError> {
        let entity = self
            .get(eref)
            .ok_or_else(|| TreeError::UnknownEntity(eref.clone()))?;
        if entity.is_root() {
            return Err(TreeError::RootImmutable(eref.clone()));
        }
        let target = self
            .get(parent)
            .ok_or_else(|| TreeError::UnknownEntity(parent.clone()))?;
        if target.root != entity.root {
            return Err(TreeError::CrossTreeReparent {
                entity: eref.clone(),
                parent: parent.clone(),
            });
        }
        if self.is_self_or_descendant(parent, eref) {
            return Err(TreeError::CyclicReparent {
                entity: eref.clone(),
                parent: parent.clone(),
            });
        }

        let root = entity.root;
        let old_parent = entity.parent.clone().unwrap_or_else(|| root.root_ref());
        if &old_parent == parent {
            return Ok(old_parent);
        }

        if let Some(old) = self.entities.get_mut(&old_parent) {
            old.children.retain(|child| child != eref);
        }
        if let Some(new) = self.entities.get_mut(parent) {
            new.children.push(eref.clone());
        }
        if let Some(entity) = self.entities.get_mut(eref) {
            entity.parent = Some(parent.clone());
        }
        self.events.push(TreeEvent::Reparented {
            root,
            entity: eref.clone(),
            old_parent: old_parent.clone(),
            parent: parent.clone(),
        });
        Ok(old_parent)
    }

    fn is_self_or_descendant(&self, candidate: &EntityRef, ancestor: &EntityRef) -> bool {
        let mut current = Some(candidate);
        while let Some(eref) = current {
            if eref == ancestor {
                return true;
            }
            current = self.entities.get(eref).and_then(|e| e.parent.as_ref());
        }
        false
    }

    /// Renames an entity, returning the old name.
    pub fn rename(&mut self, eref: &EntityRef, name: &str) -> Result<String, TreeError> {
        let entity = self.mutable_entity(eref)?;
        if entity.name == name {
            return Ok(entity.name.clone());
        }
        let old_name = std::mem::replace(&mut entity.name, name.to_string());
        let root = entity.root;
        self.events.push(TreeEvent::Renamed {
            root,
            entity: eref.clone(),
            name: name.to_string(),
            old_name: old_name.clone(),
        });
        Ok(old_name)
    }

    pub fn set_enabled(&mut self, eref: &EntityRef, enabled: bool) -> Result<(), TreeError> {
        let entity = self.mutable_entity(eref)?;
        if entity.enabled == enabled {
            return Ok(());
        }
        entity.enabled = enabled;
        let root = entity.root;
        self.events.push(TreeEvent::EnableChanged {
            root,
            entity: eref.clone(),
            enabled,
        });
        Ok(())
    }

    /// Hands write authority over an entity to a participant, or clears it.
    pub fn set_authority(
        &mut self,
        eref: &EntityRef,
        authority: Option<PeerId>,
    ) -> Result<(), TreeError> {
        let entity = self.mutable_entity(eref)?;
        if entity.authority == authority {
            return Ok(());
        }
        entity.authority = authority.clone();
        let root = entity.root;
        self.events.push(TreeEvent::AuthorityChanged {
            root,
            entity: eref.clone(),
            authority,
        });
        Ok(())
    }

    fn mutable_entity(&mut self, eref: &EntityRef) -> Result<&mut Entity, TreeError> {
        let entity = self
            .entities
            .get_mut(eref)
            .ok_or_else(|| TreeError::UnknownEntity(eref.clone()))?;
        if entity.parent.is_none() {
            return Err(TreeError::RootImmutable(eref.clone()));
        }
        Ok(entity)
    }

    // ---- Behaviors --------------------------------------------------------

    /// Attaches a behavior to an existing entity.
    ///
    /// The behavior is set up immediately when the entity is finalized, and
    /// deferred to the entity's finalization otherwise.
    pub fn attach_behavior(
        &mut self,
        eref: &EntityRef,
        mut definition: BehaviorDefinition,
        values: &mut ValueRegistry,
        types: &TypeRegistry,
    ) -> Result<BehaviorRef, TreeError> {
        let entity = self
            .get(eref)
            .ok_or_else(|| TreeError::UnknownEntity(eref.clone()))?;
        let (state, root) = (entity.state, entity.root);

        let bref = definition.bref.get_or_insert_with(BehaviorRef::new).clone();
        if self.behaviors.contains_key(&bref) {
            return Err(TreeError::DuplicateBehavior(bref));
        }
        if !types.has_behavior(&definition.type_uri) {
            return Err(TreeError::UnknownBehaviorType(definition.type_uri));
        }
        check_field_names(&definition.values)?;

        let bref = self.construct_behavior(eref, &definition, values, types)?;
        if state == EntityState::Finalized {
            if let Err(err) = self.setup_behavior(&bref, values) {
                self.remove_behavior(&bref, values, false, false);
                return Err(err);
            }
        }
        self.events.push(TreeEvent::BehaviorAttached {
            root,
            entity: eref.clone(),
            behavior: bref.clone(),
            owner_spawning: state == EntityState::Spawning,
        });
        debug!("🔗 Attached behavior {} ({}) to {}", bref, definition.type_uri, eref);
        Ok(bref)
    }

    pub fn detach_behavior(
        &mut self,
        eref: &EntityRef,
        bref: &BehaviorRef,
        values: &mut ValueRegistry,
    ) -> Result<(), TreeError> {
        if !self.contains(eref) {
            return Err(TreeError::UnknownEntity(eref.clone()));
        }
        match self.behaviors.get(bref) {
            Some(attached) if &attached.owner == eref => {}
            _ => {
                return Err(TreeError::UnknownBehavior {
                    entity: eref.clone(),
                    behavior: bref.clone(),
                })
            }
        }
        self.remove_behavior(bref, values, false, true);
        debug!("✂️ Detached behavior {} from {}", bref, eref);
        Ok(())
    }

    // ---- Serialization ----------------------------------------------------

    /// Recursive definition of an entity with current replicated values and clocks.
    pub fn to_definition(
        &self,
        eref: &EntityRef,
        values: &ValueRegistry,
    ) -> Result<EntityDefinition, TreeError> {
        let entity = self
            .get(eref)
            .ok_or_else(|| TreeError::UnknownEntity(eref.clone()))?;
        let behaviors = entity
            .behaviors
            .iter()
            .map(|bref| self.behavior_definition(bref, values))
            .collect::<Result<Vec<_>, _>>()?;
        let children = entity
            .children
            .iter()
            .map(|child| self.to_definition(child, values))
            .collect::<Result<Vec<_>, _>>()?;
        let field_ids = entity.fields.iter().map(|f| (f, entity.field_id(f)));
        Ok(EntityDefinition {
            eref: Some(eref.clone()),
            name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
            enabled: entity.enabled,
            authority: entity.authority.clone(),
            values: field_inits(field_ids, values)?,
            behaviors,
            children,
        })
    }

    pub fn behavior_definition(
        &self,
        bref: &BehaviorRef,
        values: &ValueRegistry,
    ) -> Result<BehaviorDefinition, TreeError> {
        let attached = self.behaviors.get(bref).ok_or_else(|| TreeError::UnknownBehavior {
            entity: EntityRef::from_raw(""),
            behavior: bref.clone(),
        })?;
        let field_ids = attached.fields.iter().map(|f| (f, attached.field_id(f)));
        Ok(BehaviorDefinition {
            bref: Some(bref.clone()),
            type_uri: attached.type_uri.clone(),
            values: field_inits(field_ids, values)?,
        })
    }
}

impl Default for EntityTree {
    fn default() -> Self {
        Self::new()
    }
}

fn check_field_names(inits: &BTreeMap<String, FieldInit>) -> Result<(), TreeError> {
    match inits.keys().find(|name| name.contains('/')) {
        Some(name) => Err(TreeError::InvalidFieldName(name.clone())),
        None => Ok(()),
    }
}

fn field_inits<'a>(
    fields: impl Iterator<Item = (&'a String, ValueId)>,
    values: &ValueRegistry,
) -> Result<BTreeMap<String, FieldInit>, ValueError> {
    let mut out = BTreeMap::new();
    for (name, id) in fields {
        let Some(value) = values.get(&id) else {
            continue;
        };
        if !value.replicated() {
            continue;
        }
        out.insert(
            name.clone(),
            FieldInit {
                value: value.wire()?,
                clock: value.clock(),
                originator: value.originator().cloned(),
            },
        );
    }
    Ok(out)
}

/// Registers the values of one entity or behavior. Declared fields come
/// first, in declaration order; undeclared definition values follow as
/// plain replicated fields. On failure nothing stays registered.
fn construct_values(
    owner: &EntityRef,
    behavior: Option<&BehaviorRef>,
    specs: &[FieldSpec],
    inits: &BTreeMap<String, FieldInit>,
    values: &mut ValueRegistry,
) -> Result<Vec<String>, ValueError> {
    let seeded = FieldInit::new(WireValue::Null);
    let declared = specs.iter().map(|spec| {
        let (wire, init) = match inits.get(&spec.name) {
            Some(init) => (&init.value, init),
            None => (&spec.default, &seeded),
        };
        (&spec.name, wire, init, spec.replicated, spec.adapter.as_ref())
    });
    let extra = inits
        .iter()
        .filter(|(name, _)| !specs.iter().any(|spec| &spec.name == *name))
        .map(|(name, init)| (name, &init.value, init, true, None));

    let mut names: Vec<String> = Vec::new();
    for (name, wire, init, replicated, adapter) in declared.chain(extra) {
        let result = build_value(owner, behavior, name, wire, init, replicated, adapter)
            .and_then(|value| values.register(value));
        if let Err(err) = result {
            for registered in &names {
                values.unregister(&ValueId::derive(owner, behavior, registered));
            }
            return Err(err);
        }
        names.push(name.clone());
    }
    Ok(names)
}

fn build_value(
    owner: &EntityRef,
    behavior: Option<&BehaviorRef>,
    field: &str,
    wire: &WireValue,
    init: &FieldInit,
    replicated: bool,
    adapter: Option<&Adapter>,
) -> Result<ClockedValue, ValueError> {
    let id = ValueId::derive(owner, behavior, field);
    let slot = match adapter {
        Some(adapter) => Slot::adapted(adapter.clone(), wire).map_err(|reason| ValueError::Adapter {
            id: id.clone(),
            adapter: adapter.name(),
            reason,
        })?,
        None => Slot::Plain(wire.clone()),
    };
    Ok(ClockedValue::new(id, owner.clone(), slot, replicated).at(init.clock, init.originator.clone()))
}
