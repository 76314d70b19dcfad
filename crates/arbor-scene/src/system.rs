//! Systems: interest filters, active-entity tracking, per-frame processing.
//!
//! A system declares an [`Interest`] in a set of component kinds. The world
//! tells every registered system about each live entity that is added,
//! changed (component attached or cleared), or removed, and the system's
//! [`SystemEntry`] keeps the list of entities that currently match. During a
//! frame, non-passive systems get [`System::process`] called with that list.
//!
//! `process` runs with a [`ProcessContext`], which gives mutable access to
//! entity data but routes structural changes through the world's
//! [`CommandBuffer`]. Those commands are applied right after the system's
//! pass, so the active list never changes underneath a running system.

use std::any::Any;
use std::collections::HashMap;

use tracing::trace;

use crate::command::CommandBuffer;
use crate::component::{AnyComponent, ComponentKind};
use crate::entity::{Entity, EntityId};
use crate::manager::EntityManager;

// ---------------------------------------------------------------------------
// Interest
// ---------------------------------------------------------------------------

/// Which entities a system wants to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Interest {
    /// Every live entity.
    #[default]
    All,
    /// No entity ever.
    Nothing,
    /// Entities carrying every listed kind.
    Components(Vec<ComponentKind>),
}

impl Interest {
    /// Interest in entities carrying all of `kinds`. An empty list means
    /// [`Interest::Nothing`].
    pub fn components<I, K>(kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ComponentKind>,
    {
        let kinds: Vec<ComponentKind> = kinds.into_iter().map(Into::into).collect();
        if kinds.is_empty() {
            Interest::Nothing
        } else {
            Interest::Components(kinds)
        }
    }

    /// Whether `entity` matches this interest.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Interest::All => true,
            Interest::Nothing => false,
            Interest::Components(kinds) => {
                // An entity with fewer components than listed kinds can't match.
                entity.components().len() >= kinds.len()
                    && kinds.iter().all(|k| entity.has_component(k.as_str()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// System trait
// ---------------------------------------------------------------------------

#[doc(hidden)]
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behavior attached to the world.
///
/// Only [`name`](Self::name) and [`interest`](Self::interest) are required;
/// every hook defaults to doing nothing.
pub trait System: AsAny {
    /// Unique name within a world.
    fn name(&self) -> &str;

    /// Read once when the system is registered.
    fn interest(&self) -> Interest;

    /// Run order. Lower runs earlier; ties keep registration order.
    fn priority(&self) -> i32 {
        0
    }

    /// Initial passive flag. Passive systems track membership but are not
    /// processed.
    fn passive(&self) -> bool {
        false
    }

    /// An entity started matching.
    fn inserted(&mut self, _entity: &Entity) {}

    /// An entity stopped matching or left the world.
    fn deleted(&mut self, _entity: &Entity) {}

    /// Per-frame work over the active entities.
    fn process(&mut self, _ctx: &mut ProcessContext<'_>, _entities: &[EntityId], _dt: f64) {}
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// Result of re-checking an entity against a system's interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Inserted,
    Deleted,
    Unchanged,
}

// ---------------------------------------------------------------------------
// SystemEntry
// ---------------------------------------------------------------------------

/// A registered system plus the bookkeeping the world keeps for it.
pub struct SystemEntry {
    name: String,
    interest: Interest,
    priority: i32,
    passive: bool,
    active: Vec<EntityId>,
    system: Box<dyn System>,
}

impl std::fmt::Debug for SystemEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemEntry")
            .field("name", &self.name)
            .field("interest", &self.interest)
            .field("priority", &self.priority)
            .field("passive", &self.passive)
            .field("active", &self.active.len())
            .finish()
    }
}

impl SystemEntry {
    pub fn new(system: Box<dyn System>) -> Self {
        Self {
            name: system.name().to_owned(),
            interest: system.interest(),
            priority: system.priority(),
            passive: system.passive(),
            active: Vec::new(),
            system,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    pub fn set_passive(&mut self, passive: bool) {
        self.passive = passive;
    }

    /// Entities currently matching, in the order they started matching.
    pub fn active_entities(&self) -> &[EntityId] {
        &self.active
    }

    pub fn is_active(&self, id: EntityId) -> bool {
        self.active.contains(&id)
    }

    pub fn is_interested(&self, entity: &Entity) -> bool {
        self.interest.matches(entity)
    }

    /// A live entity was added to the world.
    pub fn added(&mut self, entity: &Entity) -> Membership {
        self.check(entity)
    }

    /// A live entity gained or lost a component.
    pub fn changed(&mut self, entity: &Entity) -> Membership {
        self.check(entity)
    }

    /// An entity left the world. Evicts it regardless of interest.
    pub fn removed(&mut self, entity: &Entity) -> bool {
        match self.active.iter().position(|&id| id == entity.id()) {
            Some(pos) => {
                self.active.remove(pos);
                trace!(system = %self.name, entity = ?entity.id(), "entity removed");
                self.system.deleted(entity);
                true
            }
            None => false,
        }
    }

    fn check(&mut self, entity: &Entity) -> Membership {
        let interested = self.interest.matches(entity);
        let position = self.active.iter().position(|&id| id == entity.id());

        match (interested, position) {
            (true, None) => {
                self.active.push(entity.id());
                trace!(system = %self.name, entity = ?entity.id(), "entity inserted");
                self.system.inserted(entity);
                Membership::Inserted
            }
            (false, Some(pos)) => {
                self.active.remove(pos);
                trace!(system = %self.name, entity = ?entity.id(), "entity deleted");
                self.system.deleted(entity);
                Membership::Deleted
            }
            _ => Membership::Unchanged,
        }
    }

    /// Call the system's `process` with the active list borrowed in place.
    ///
    /// The list cannot change during the pass: structural changes made
    /// through the context are queued and applied after `process` returns.
    pub fn run(&mut self, ctx: &mut ProcessContext<'_>, dt: f64) {
        self.system.process(ctx, &self.active, dt);
    }

    /// Borrow the system as its concrete type.
    pub fn downcast_ref<S: System>(&self) -> Option<&S> {
        self.system.as_ref().as_any().downcast_ref::<S>()
    }

    pub fn downcast_mut<S: System>(&mut self) -> Option<&mut S> {
        self.system.as_mut().as_any_mut().downcast_mut::<S>()
    }
}

// ---------------------------------------------------------------------------
// ProcessContext
// ---------------------------------------------------------------------------

/// What a system can touch while its `process` pass runs.
pub struct ProcessContext<'w> {
    entities: &'w mut HashMap<EntityId, Entity>,
    manager: &'w EntityManager,
    commands: &'w mut CommandBuffer,
    system_name: &'w str,
}

impl<'w> ProcessContext<'w> {
    pub(crate) fn new(
        entities: &'w mut HashMap<EntityId, Entity>,
        manager: &'w EntityManager,
        commands: &'w mut CommandBuffer,
        system_name: &'w str,
    ) -> Self {
        Self {
            entities,
            manager,
            commands,
            system_name,
        }
    }

    /// Name of the system being processed.
    pub fn system_name(&self) -> &str {
        self.system_name
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.manager.contains(id)
    }

    /// Create a detached, not-yet-live entity. Queue
    /// [`add_to_world`](Self::add_to_world) to make it live.
    pub fn create_entity(&mut self, name: Option<&str>) -> EntityId {
        let entity = Entity::new(name);
        let id = entity.id();
        self.entities.insert(id, entity);
        id
    }

    // -- deferred structural changes -------------------------------------

    pub fn add_component<C: AnyComponent>(&mut self, target: EntityId, component: C) {
        self.commands.add_component(target, component, self.system_name);
    }

    pub fn clear_component(&mut self, target: EntityId, kind: impl Into<ComponentKind>) {
        self.commands.clear_component(target, kind, self.system_name);
    }

    pub fn attach_child(&mut self, parent: EntityId, child: EntityId) {
        self.commands.attach_child(parent, child, self.system_name);
    }

    pub fn detach_child(&mut self, parent: EntityId, child: EntityId) {
        self.commands.detach_child(parent, child, self.system_name);
    }

    pub fn add_to_world(&mut self, target: EntityId, recursive: bool) {
        self.commands.add_to_world(target, recursive, self.system_name);
    }

    pub fn remove_from_world(&mut self, target: EntityId, recursive: bool) {
        self.commands.remove_from_world(target, recursive, self.system_name);
    }

    pub fn destroy(&mut self, target: EntityId) {
        self.commands.destroy(target, self.system_name);
    }

    /// Number of commands queued so far in this frame.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
