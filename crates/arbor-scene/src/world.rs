//! The [`World`] owns every entity, the live set, and the registered systems.
//!
//! Entities are created into the world's arena but are not *live* until
//! [`World::add_entity`] is called. Only live entities are reported to
//! systems. Adding or clearing a component on a live entity re-notifies every
//! system before the call returns.
//!
//! Hierarchy and transform operations live in [`crate::hierarchy`].

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::command::CommandBuffer;
use crate::component::{AnyComponent, AttachedComponent, ComponentKind};
use crate::entity::{Entity, EntityId};
use crate::manager::EntityManager;
use crate::system::{ProcessContext, System, SystemEntry};
use crate::SceneError;

/// What happened to a component on a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentChange {
    Added,
    Removed,
}

/// Container for entities, their liveness, and systems.
#[derive(Debug, Default)]
pub struct World {
    pub(crate) entities: HashMap<EntityId, Entity>,
    pub(crate) manager: EntityManager,
    pub(crate) systems: Vec<SystemEntry>,
    commands: CommandBuffer,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Create an entity in the arena. It is not live until
    /// [`add_entity`](Self::add_entity) is called.
    pub fn create_entity(&mut self, name: Option<&str>) -> EntityId {
        let entity = Entity::new(name);
        let id = entity.id();
        self.entities.insert(id, entity);
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable entity access. Structural changes (components, hierarchy)
    /// must go through the world so systems stay in sync.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities in the arena, live or not.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Every entity in the arena, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub(crate) fn require(&self, id: EntityId) -> Result<&Entity, SceneError> {
        self.entities
            .get(&id)
            .ok_or(SceneError::UnknownEntity { entity: id })
    }

    pub(crate) fn require_mut(&mut self, id: EntityId) -> Result<&mut Entity, SceneError> {
        self.entities
            .get_mut(&id)
            .ok_or(SceneError::UnknownEntity { entity: id })
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    pub fn is_live(&self, id: EntityId) -> bool {
        self.manager.contains(id)
    }

    pub fn entity_manager(&self) -> &EntityManager {
        &self.manager
    }

    /// Live ids in the order they became live.
    pub fn live_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.manager.iter()
    }

    pub fn live_count(&self) -> usize {
        self.manager.len()
    }

    /// First live entity named `name`.
    pub fn entity_by_name(&self, name: &str) -> Option<EntityId> {
        self.manager
            .iter()
            .find(|id| self.entities.get(id).is_some_and(|e| e.name() == name))
    }

    /// Make `id` live, and with `recursive` every descendant too.
    ///
    /// Each newly live entity is reported to every system. Entities that are
    /// already live are skipped.
    pub fn add_entity(&mut self, id: EntityId, recursive: bool) -> Result<(), SceneError> {
        let targets = self.liveness_targets(id, recursive)?;
        for target in targets {
            if !self.manager.insert(target) {
                continue;
            }
            debug!(entity = ?target, "entity added to world");
            if let Some(entity) = self.entities.get(&target) {
                for system in &mut self.systems {
                    system.added(entity);
                }
            }
        }
        Ok(())
    }

    /// Make `id` not live, and with `recursive` every descendant too.
    ///
    /// Every system evicts the entity. The entity stays in the arena and
    /// keeps its hierarchy links.
    pub fn remove_entity(&mut self, id: EntityId, recursive: bool) -> Result<(), SceneError> {
        let targets = self.liveness_targets(id, recursive)?;
        for target in targets {
            if !self.manager.remove(target) {
                continue;
            }
            debug!(entity = ?target, "entity removed from world");
            if let Some(entity) = self.entities.get(&target) {
                for system in &mut self.systems {
                    system.removed(entity);
                }
            }
        }
        Ok(())
    }

    fn liveness_targets(&self, id: EntityId, recursive: bool) -> Result<Vec<EntityId>, SceneError> {
        if !self.entities.contains_key(&id) {
            warn!(entity = ?id, "unknown entity");
            return Err(SceneError::UnknownEntity { entity: id });
        }
        let mut targets = vec![id];
        if recursive {
            targets.extend(self.descendants(id));
        }
        Ok(targets)
    }

    /// Remove `id` from the world entirely and hand it back.
    ///
    /// Systems see it removed, its parent forgets it, and its children
    /// become roots. Children are not destroyed.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<Entity, SceneError> {
        self.remove_entity(id, false)?;

        let (parent, children) = {
            let entity = self.require(id)?;
            (entity.parent, entity.children.clone())
        };
        if let Some(parent) = parent {
            if let Some(p) = self.entities.get_mut(&parent) {
                p.children.retain(|&c| c != id);
            }
        }
        for child in children {
            if let Some(c) = self.entities.get_mut(&child) {
                c.parent = None;
                c.set_updated();
            }
        }

        debug!(entity = ?id, "entity destroyed");
        self.entities
            .remove(&id)
            .ok_or(SceneError::UnknownEntity { entity: id })
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    /// Attach `component` to `id`.
    ///
    /// A single-instance kind that is already present is replaced in place.
    /// If the entity is live, systems are re-notified.
    pub fn add_component<C: AnyComponent>(
        &mut self,
        id: EntityId,
        component: C,
    ) -> Result<&AttachedComponent, SceneError> {
        self.add_boxed_component(id, Box::new(component))
    }

    /// Attach a default-constructed `C`.
    pub fn add_default_component<C: AnyComponent + Default>(
        &mut self,
        id: EntityId,
    ) -> Result<&AttachedComponent, SceneError> {
        self.add_component(id, C::default())
    }

    /// Attach an already-boxed component.
    pub fn add_boxed_component(
        &mut self,
        id: EntityId,
        component: Box<dyn AnyComponent>,
    ) -> Result<&AttachedComponent, SceneError> {
        let kind = component.kind();
        let entity = match self.entities.get_mut(&id) {
            Some(entity) => entity,
            None => {
                warn!(entity = ?id, kind = %kind, "add_component on unknown entity");
                return Err(SceneError::UnknownEntity { entity: id });
            }
        };
        entity.components_mut().attach(id, component);

        if self.manager.contains(id) {
            self.changed_entity(id, &kind, ComponentChange::Added);
        }

        self.require(id)?
            .get_component(kind.as_str())
            .ok_or(SceneError::UnknownEntity { entity: id })
    }

    /// Clear the indexed component of `kind` from `id`.
    ///
    /// Returns the removed component, or `None` if the kind was absent (in
    /// which case nobody is notified).
    pub fn clear_component(
        &mut self,
        id: EntityId,
        kind: &str,
    ) -> Result<Option<AttachedComponent>, SceneError> {
        let removed = match self.entities.get_mut(&id) {
            Some(entity) => entity.components_mut().detach(kind),
            None => {
                warn!(entity = ?id, kind = %kind, "clear_component on unknown entity");
                return Err(SceneError::UnknownEntity { entity: id });
            }
        };

        if let Some(component) = &removed {
            if self.manager.contains(id) {
                let kind = component.kind().clone();
                self.changed_entity(id, &kind, ComponentChange::Removed);
            }
        }
        Ok(removed)
    }

    /// Re-notify every system that `id` changed.
    pub fn changed_entity(&mut self, id: EntityId, kind: &ComponentKind, change: ComponentChange) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        tracing::trace!(entity = ?id, kind = %kind, change = ?change, "entity changed");
        for system in &mut self.systems {
            system.changed(entity);
        }
    }

    // -----------------------------------------------------------------------
    // Systems
    // -----------------------------------------------------------------------

    /// Register a system.
    ///
    /// Systems are kept sorted by priority (lower first, ties in registration
    /// order). The new system is immediately told about every live entity.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<(), SceneError> {
        self.add_boxed_system(Box::new(system))
    }

    pub fn add_boxed_system(&mut self, system: Box<dyn System>) -> Result<(), SceneError> {
        let mut entry = SystemEntry::new(system);
        if self.systems.iter().any(|s| s.name() == entry.name()) {
            warn!(system = %entry.name(), "system already registered");
            return Err(SceneError::DuplicateSystem {
                name: entry.name().to_owned(),
            });
        }

        for id in self.manager.iter() {
            if let Some(entity) = self.entities.get(&id) {
                entry.added(entity);
            }
        }

        let index = self
            .systems
            .iter()
            .position(|s| s.priority() > entry.priority())
            .unwrap_or(self.systems.len());
        debug!(
            system = %entry.name(),
            priority = entry.priority(),
            index,
            active = entry.active_entities().len(),
            "system registered"
        );
        self.systems.insert(index, entry);
        Ok(())
    }

    /// Unregister a system by name and hand back its entry.
    pub fn remove_system(&mut self, name: &str) -> Option<SystemEntry> {
        let index = self.systems.iter().position(|s| s.name() == name)?;
        debug!(system = %name, "system removed");
        Some(self.systems.remove(index))
    }

    /// Registered systems in run order.
    pub fn systems(&self) -> &[SystemEntry] {
        &self.systems
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    pub fn system_entry(&self, name: &str) -> Option<&SystemEntry> {
        self.systems.iter().find(|s| s.name() == name)
    }

    pub fn system_entry_mut(&mut self, name: &str) -> Option<&mut SystemEntry> {
        self.systems.iter_mut().find(|s| s.name() == name)
    }

    /// First registered system of type `S`.
    pub fn system<S: System>(&self) -> Option<&S> {
        self.systems.iter().find_map(|s| s.downcast_ref::<S>())
    }

    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems.iter_mut().find_map(|s| s.downcast_mut::<S>())
    }

    /// Active entities of the named system.
    pub fn active_entities(&self, system: &str) -> Option<&[EntityId]> {
        self.system_entry(system).map(|s| s.active_entities())
    }

    /// Toggle a system's passive flag. Returns false if no such system.
    pub fn set_system_passive(&mut self, system: &str, passive: bool) -> bool {
        match self.system_entry_mut(system) {
            Some(entry) => {
                entry.set_passive(passive);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    /// Run the system at `index` (passive or not), then apply the commands it
    /// queued. Returns the number of commands applied.
    pub fn run_system(&mut self, index: usize, dt: f64) -> usize {
        let mut commands = std::mem::take(&mut self.commands);
        {
            let Some(entry) = self.systems.get_mut(index) else {
                self.commands = commands;
                return 0;
            };
            let name = entry.name().to_owned();
            let mut ctx = ProcessContext::new(&mut self.entities, &self.manager, &mut commands, &name);
            entry.run(&mut ctx, dt);
        }
        let applied = commands.apply(self).len();
        self.commands = commands;
        applied
    }

    /// Run every non-passive system once in priority order. Returns the total
    /// number of commands applied.
    pub fn run_systems(&mut self, dt: f64) -> usize {
        let mut applied = 0;
        for index in 0..self.systems.len() {
            if self.systems[index].is_passive() {
                continue;
            }
            applied += self.run_system(index, dt);
        }
        applied
    }

    /// Commands queued outside a system pass.
    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    /// Report from the most recent command application.
    pub fn last_apply_report(&self) -> &crate::command::ApplyReport {
        self.commands.last_apply_report()
    }

    /// Apply commands queued through [`commands_mut`](Self::commands_mut).
    pub fn apply_commands(&mut self) -> usize {
        let mut commands = std::mem::take(&mut self.commands);
        let applied = commands.apply(self).len();
        self.commands = commands;
        applied
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, DynamicComponent};
    use crate::system::Interest;

    #[derive(Debug, PartialEq)]
    struct Light(u8);
    impl Component for Light {
        const KIND: &'static str = "LightComponent";
    }

    #[derive(Debug, Default, PartialEq)]
    struct Mesh;
    impl Component for Mesh {
        const KIND: &'static str = "MeshComponent";
    }

    #[derive(Default)]
    struct Lights {
        processed: Vec<EntityId>,
    }

    impl System for Lights {
        fn name(&self) -> &str {
            "Lights"
        }
        fn interest(&self) -> Interest {
            Interest::components(["LightComponent"])
        }
        fn process(&mut self, _ctx: &mut ProcessContext<'_>, entities: &[EntityId], _dt: f64) {
            self.processed.extend_from_slice(entities);
        }
    }

    struct Named(&'static str, i32);
    impl System for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn interest(&self) -> Interest {
            Interest::Nothing
        }
        fn priority(&self) -> i32 {
            self.1
        }
    }

    #[test]
    fn component_changes_on_live_entity_reach_systems() {
        let mut world = World::new();
        world.add_system(Lights::default()).unwrap();
        let e = world.create_entity(None);
        world.add_entity(e, false).unwrap();

        world.add_component(e, Light(1)).unwrap();
        assert_eq!(world.active_entities("Lights"), Some(&[e][..]));

        world.clear_component(e, "LightComponent").unwrap();
        assert!(world.active_entities("Lights").unwrap().is_empty());
    }

    #[test]
    fn components_on_non_live_entity_do_not_notify() {
        let mut world = World::new();
        world.add_system(Lights::default()).unwrap();
        let e = world.create_entity(None);
        world.add_component(e, Light(1)).unwrap();
        assert!(world.active_entities("Lights").unwrap().is_empty());

        world.add_entity(e, false).unwrap();
        assert_eq!(world.active_entities("Lights").unwrap(), &[e]);
    }

    #[test]
    fn add_component_returns_attached_with_owner() {
        let mut world = World::new();
        let e = world.create_entity(None);
        let attached = world.add_component(e, Light(3)).unwrap();
        assert_eq!(attached.owner(), e);
        assert_eq!(attached.downcast_ref::<Light>(), Some(&Light(3)));

        let attached = world.add_default_component::<Mesh>(e).unwrap();
        assert_eq!(attached.kind().as_str(), "MeshComponent");
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let mut world = World::new();
        let ghost = EntityId::from_raw(u64::MAX - 1);
        assert_eq!(
            world.add_component(ghost, Light(0)).unwrap_err(),
            SceneError::UnknownEntity { entity: ghost }
        );
        assert!(world.clear_component(ghost, "LightComponent").is_err());
        assert!(world.add_entity(ghost, false).is_err());
    }

    #[test]
    fn clearing_absent_kind_is_noop() {
        let mut world = World::new();
        let e = world.create_entity(None);
        assert!(world.clear_component(e, "Nothing").unwrap().is_none());
    }

    #[test]
    fn systems_sorted_by_priority_stably() {
        let mut world = World::new();
        world.add_system(Named("late", 10)).unwrap();
        world.add_system(Named("first", -1)).unwrap();
        world.add_system(Named("mid_a", 0)).unwrap();
        world.add_system(Named("mid_b", 0)).unwrap();
        assert_eq!(world.system_names(), vec!["first", "mid_a", "mid_b", "late"]);
    }

    #[test]
    fn duplicate_system_name_rejected() {
        let mut world = World::new();
        world.add_system(Named("x", 0)).unwrap();
        assert_eq!(
            world.add_system(Named("x", 1)),
            Err(SceneError::DuplicateSystem { name: "x".to_owned() })
        );
        assert_eq!(world.system_count(), 1);
    }

    #[test]
    fn late_registered_system_sees_existing_live_entities() {
        let mut world = World::new();
        let e = world.create_entity(None);
        world.add_component(e, Light(1)).unwrap();
        world.add_entity(e, false).unwrap();

        world.add_system(Lights::default()).unwrap();
        assert_eq!(world.active_entities("Lights").unwrap(), &[e]);
    }

    #[test]
    fn passive_systems_are_not_processed() {
        let mut world = World::new();
        world.add_system(Lights::default()).unwrap();
        let e = world.create_entity(None);
        world.add_component(e, Light(1)).unwrap();
        world.add_entity(e, false).unwrap();

        world.set_system_passive("Lights", true);
        world.run_systems(0.1);
        assert!(world.system::<Lights>().unwrap().processed.is_empty());

        world.set_system_passive("Lights", false);
        world.run_systems(0.1);
        assert_eq!(world.system::<Lights>().unwrap().processed, vec![e]);
    }

    #[test]
    fn remove_entity_evicts_and_keeps_arena_entry() {
        let mut world = World::new();
        world.add_system(Lights::default()).unwrap();
        let e = world.create_entity(None);
        world.add_component(e, Light(1)).unwrap();
        world.add_entity(e, false).unwrap();

        world.remove_entity(e, false).unwrap();
        assert!(!world.is_live(e));
        assert!(world.contains_entity(e));
        assert!(world.active_entities("Lights").unwrap().is_empty());
        // Removing again is a no-op.
        world.remove_entity(e, false).unwrap();
    }

    #[test]
    fn recursive_add_reaches_descendants() {
        let mut world = World::new();
        let root = world.create_entity(None);
        let child = world.create_entity(None);
        let grandchild = world.create_entity(None);
        world.attach_child(root, child).unwrap();
        world.attach_child(child, grandchild).unwrap();

        world.add_entity(root, true).unwrap();
        let live: Vec<EntityId> = world.live_entities().collect();
        assert_eq!(live, vec![root, child, grandchild]);

        world.remove_entity(root, true).unwrap();
        assert_eq!(world.live_count(), 0);
    }

    #[test]
    fn destroy_orphans_children_and_unlinks_parent() {
        let mut world = World::new();
        let parent = world.create_entity(None);
        let middle = world.create_entity(None);
        let leaf = world.create_entity(None);
        world.attach_child(parent, middle).unwrap();
        world.attach_child(middle, leaf).unwrap();
        world.add_entity(parent, true).unwrap();

        let destroyed = world.destroy_entity(middle).unwrap();
        assert_eq!(destroyed.id(), middle);
        assert!(!world.contains_entity(middle));
        assert!(world.entity(parent).unwrap().children().is_empty());
        assert_eq!(world.entity(leaf).unwrap().parent(), None);
        assert!(world.is_live(leaf));
    }

    #[test]
    fn entity_by_name_only_sees_live_entities() {
        let mut world = World::new();
        let hidden = world.create_entity(Some("Camera"));
        assert_eq!(world.entity_by_name("Camera"), None);
        world.add_entity(hidden, false).unwrap();
        assert_eq!(world.entity_by_name("Camera"), Some(hidden));
    }

    #[test]
    fn queued_commands_apply_on_demand() {
        let mut world = World::new();
        let e = world.create_entity(None);
        world
            .commands_mut()
            .add_component(e, DynamicComponent::new("Tag"), "setup");
        assert_eq!(world.apply_commands(), 1);
        assert!(world.entity(e).unwrap().has_component("Tag"));
        assert_eq!(world.last_apply_report().success_count, 1);
    }
}
