//! Entities: identity, name, capability bag, hierarchy links, transforms.
//!
//! Entity ids come from a process-wide counter, so they are unique across
//! every [`World`](crate::world::World) in the process and never reused.
//! Hierarchy links (`parent`, `children`) are stored as ids and maintained
//! by the world; an entity never owns another entity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::component::{AttachedComponent, Component, ComponentBag};
use crate::transform::Transform;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Take the next id from the global counter.
    pub(crate) fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`. The id is not checked against any world.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Number of entity ids handed out so far in this process.
pub fn entity_count() -> u64 {
    NEXT_ENTITY_ID.load(Ordering::Relaxed)
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A scene object.
///
/// Components are attached and detached through the owning
/// [`World`](crate::world::World) so that systems are notified. Reading
/// components, and mutating a component's data in place, is done here.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    components: ComponentBag,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    transform: Transform,
    world_transform: Transform,
    dirty: bool,
    updated: bool,
    /// Excluded from processing by systems that honor it.
    pub skip: bool,
    /// Excluded from rendering by systems that honor it.
    pub hidden: bool,
}

impl Entity {
    pub(crate) fn new(name: Option<&str>) -> Self {
        let id = EntityId::next();
        let name = match name {
            Some(name) => name.to_owned(),
            None => format!("Entity_{}", id.0),
        };
        Self {
            id,
            name,
            components: ComponentBag::new(),
            parent: None,
            children: Vec::new(),
            transform: Transform::IDENTITY,
            world_transform: Transform::IDENTITY,
            dirty: true,
            updated: false,
            skip: false,
            hidden: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // -- components -------------------------------------------------------

    pub fn components(&self) -> &ComponentBag {
        &self.components
    }

    pub(crate) fn components_mut(&mut self) -> &mut ComponentBag {
        &mut self.components
    }

    /// Whether a component of `kind` is attached.
    pub fn has_component(&self, kind: &str) -> bool {
        self.components.contains(kind)
    }

    /// The indexed component of `kind`, if attached.
    pub fn get_component(&self, kind: &str) -> Option<&AttachedComponent> {
        self.components.get(kind)
    }

    /// Mutable access to the indexed component of `kind`.
    ///
    /// Changing a component's data does not notify systems; membership only
    /// depends on which kinds are present.
    pub fn get_component_mut(&mut self, kind: &str) -> Option<&mut AttachedComponent> {
        self.components.get_mut(kind)
    }

    /// Typed lookup.
    pub fn get<T: Component>(&self) -> Option<&T> {
        self.components.get_typed::<T>()
    }

    /// Typed mutable lookup.
    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components.get_typed_mut::<T>()
    }

    // -- hierarchy --------------------------------------------------------

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Child ids in attach order.
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    // -- transforms -------------------------------------------------------

    /// The local transform, relative to the parent.
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Mutable local transform. Marks the entity dirty.
    pub fn transform_mut(&mut self) -> &mut Transform {
        self.dirty = true;
        &mut self.transform
    }

    /// The world transform as of the last world-transform pass.
    pub fn world_transform(&self) -> &Transform {
        &self.world_transform
    }

    /// True when the world transform needs recomputing.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True when the world transform was recomputed in the current pass.
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub(crate) fn clear_updated(&mut self) {
        self.updated = false;
    }

    /// Flag the local transform as changed so the next pass recomputes it.
    pub fn set_updated(&mut self) {
        self.dirty = true;
        self.transform.set_updated();
    }

    /// Recompose the local matrix from its parts.
    pub fn update_transform(&mut self) {
        self.transform.update();
    }

    /// Recompute the world transform from the parent's world transform.
    pub(crate) fn compose_world(&mut self, parent_world: Option<&Transform>) {
        match parent_world {
            Some(parent) => self.world_transform.multiply(parent, &self.transform),
            None => self.world_transform.copy_from(&self.transform),
        }
        self.dirty = false;
        self.updated = true;
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = Entity::new(None);
        let b = Entity::new(None);
        assert!(b.id() > a.id());
        assert!(entity_count() > b.id().to_raw());
    }

    #[test]
    fn default_name_uses_id() {
        let e = Entity::new(None);
        assert_eq!(e.name(), format!("Entity_{}", e.id().to_raw()));
        assert_eq!(e.to_string(), e.name());

        let named = Entity::new(Some("Camera"));
        assert_eq!(named.name(), "Camera");
    }

    #[test]
    fn new_entity_starts_dirty_and_not_updated() {
        let e = Entity::new(None);
        assert!(e.is_dirty());
        assert!(!e.is_updated());
        assert!(e.is_root());
        assert!(!e.skip && !e.hidden);
    }

    #[test]
    fn compose_world_without_parent_copies_local() {
        let mut e = Entity::new(None);
        e.transform_mut().set_translation(Vec3::new(3.0, 0.0, 0.0));
        e.update_transform();
        e.compose_world(None);

        assert!(!e.is_dirty());
        assert!(e.is_updated());
        assert_eq!(e.world_transform().translation(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn set_updated_marks_dirty() {
        let mut e = Entity::new(None);
        e.compose_world(None);
        assert!(!e.is_dirty());
        e.set_updated();
        assert!(e.is_dirty());
        assert!(e.transform().is_dirty());
    }
}
