//! Serializable description of the live scene, for inspection and
//! determinism checks.
//!
//! A [`SceneSnapshot`] lists every live entity in hierarchy order (each live
//! root followed by its live descendants, pre-order) with its links, local
//! transform parts, flags, and component kinds. Component payloads are not
//! captured. [`SceneSnapshot::digest`] hashes the JSON form with blake3, so
//! two runs that build the same scene produce the same digest as long as
//! entity ids match.

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::world::World;

/// One live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub name: String,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub translation: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub skip: bool,
    pub hidden: bool,
    /// Component kinds in bag order.
    pub components: Vec<String>,
}

/// Live entities in hierarchy order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub entities: Vec<EntitySnapshot>,
}

impl SceneSnapshot {
    /// Capture the live scene of `world`.
    pub fn capture(world: &World) -> Self {
        let mut entities = Vec::with_capacity(world.live_count());
        let roots: Vec<EntityId> = world
            .live_entities()
            .filter(|id| {
                world
                    .entity(*id)
                    .and_then(|e| e.parent())
                    .map_or(true, |p| !world.is_live(p))
            })
            .collect();

        for root in roots {
            let _ = world.traverse(root, |entity, _| {
                if !world.is_live(entity.id()) {
                    return false;
                }
                let t = entity.transform();
                entities.push(EntitySnapshot {
                    id: entity.id(),
                    name: entity.name().to_owned(),
                    parent: entity.parent(),
                    children: entity.children().to_vec(),
                    translation: t.translation().to_array(),
                    rotation: t.rotation().to_array(),
                    scale: t.scale().to_array(),
                    skip: entity.skip,
                    hidden: entity.hidden,
                    components: entity
                        .components()
                        .kinds()
                        .map(|k| k.as_str().to_owned())
                        .collect(),
                });
                true
            });
        }

        Self { entities }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// blake3 hash of the compact JSON form, hex encoded.
    pub fn digest(&self) -> String {
        // Serializing plain data with string keys cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn find(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::DynamicComponent;
    use glam::Vec3;

    fn scene() -> (World, EntityId, EntityId) {
        let mut world = World::new();
        let root = world.create_entity(Some("root"));
        let child = world.create_entity(Some("child"));
        world.attach_child(root, child).unwrap();
        world.add_component(child, DynamicComponent::new("Tag")).unwrap();
        world
            .entity_mut(child)
            .unwrap()
            .transform_mut()
            .set_translation(Vec3::new(1.0, 2.0, 3.0));
        world.add_entity(root, true).unwrap();
        (world, root, child)
    }

    #[test]
    fn capture_lists_live_entities_in_hierarchy_order() {
        let (mut world, root, child) = scene();
        world.create_entity(Some("not live"));

        let snap = SceneSnapshot::capture(&world);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.entities[0].id, root);
        assert_eq!(snap.entities[0].children, vec![child]);

        let c = snap.find(child).unwrap();
        assert_eq!(c.parent, Some(root));
        assert_eq!(c.translation, [1.0, 2.0, 3.0]);
        assert_eq!(c.components, vec!["Tag".to_owned()]);
    }

    #[test]
    fn json_round_trip_preserves_snapshot() {
        let (world, _, _) = scene();
        let snap = SceneSnapshot::capture(&world);
        let json = snap.to_json().unwrap();
        assert_eq!(SceneSnapshot::from_json(&json).unwrap(), snap);
    }

    #[test]
    fn digest_tracks_changes() {
        let (mut world, _, child) = scene();
        let before = SceneSnapshot::capture(&world).digest();
        assert_eq!(before, SceneSnapshot::capture(&world).digest());

        world.entity_mut(child).unwrap().hidden = true;
        assert_ne!(before, SceneSnapshot::capture(&world).digest());
    }
}
