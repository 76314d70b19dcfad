//! Parent/child links, hierarchy queries, cloning, and world transforms.
//!
//! Hierarchy links are plain ids on each [`Entity`]; the world keeps both
//! directions consistent. Attaching is rejected when it would create a cycle.
//!
//! World transforms are `parent.world * child.local`, or `local` for a root.

use tracing::{debug, warn};

use crate::entity::{Entity, EntityId};
use crate::world::World;
use crate::SceneError;

/// Options for [`World::clone_hierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneSettings {
    /// Clone descendants too. When false only the given entity is cloned.
    pub clone_hierarchy: bool,
}

impl Default for CloneSettings {
    fn default() -> Self {
        Self {
            clone_hierarchy: true,
        }
    }
}

impl World {
    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// Attach `child` under `parent`, detaching it from any previous parent.
    ///
    /// Fails without touching any link if `child` is `parent` or one of its
    /// ancestors.
    pub fn attach_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SceneError> {
        self.require(parent)?;
        let previous = self.require(child)?.parent;

        if child == parent || self.is_ancestor(child, parent) {
            warn!(parent = ?parent, child = ?child, "attach would create a cycle");
            return Err(SceneError::CyclicAttach { parent, child });
        }

        if let Some(previous) = previous {
            self.unlink(previous, child);
        }

        self.require_mut(parent)?.children.push(child);
        let c = self.require_mut(child)?;
        c.parent = Some(parent);
        c.set_updated();
        Ok(())
    }

    /// Detach `child` from `parent`. Does nothing if it isn't a child.
    pub fn detach_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SceneError> {
        if parent == child {
            warn!(entity = ?parent, "cannot detach an entity from itself");
            return Err(SceneError::DetachSelf { entity: parent });
        }
        self.require(parent)?;
        self.require(child)?;
        self.unlink(parent, child);
        Ok(())
    }

    fn unlink(&mut self, parent: EntityId, child: EntityId) {
        let Some(p) = self.entities.get_mut(&parent) else {
            return;
        };
        let Some(pos) = p.children.iter().position(|&c| c == child) else {
            return;
        };
        p.children.remove(pos);
        if let Some(c) = self.entities.get_mut(&child) {
            c.parent = None;
            c.set_updated();
        }
    }

    /// Whether `ancestor` is on `id`'s parent chain (excluding `id` itself).
    pub fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut current = self.entities.get(&id).and_then(|e| e.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.entities.get(&p).and_then(|e| e.parent);
        }
        false
    }

    /// Top of the hierarchy containing `id`.
    pub fn root_of(&self, id: EntityId) -> Result<EntityId, SceneError> {
        let mut current = self.require(id)?;
        while let Some(parent) = current.parent {
            current = self.require(parent)?;
        }
        Ok(current.id())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Pre-order walk from `root`. Returning false from `visit` skips that
    /// entity's descendants; siblings are still visited.
    pub fn traverse<F>(&self, root: EntityId, mut visit: F) -> Result<(), SceneError>
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        self.require(root)?;
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            if !visit(entity, depth) {
                continue;
            }
            for &child in entity.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        Ok(())
    }

    /// Descendants of `root` in pre-order, `root` excluded.
    pub fn descendants(&self, root: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let _ = self.traverse(root, |e, _| {
            out.push(e.id());
            true
        });
        if !out.is_empty() {
            out.remove(0);
        }
        out
    }

    /// First entity in `root`'s subtree (root included) with id `target`.
    pub fn find_in_hierarchy_by_id(&self, root: EntityId, target: EntityId) -> Option<EntityId> {
        self.find_in_hierarchy(root, |e| e.id() == target)
    }

    /// First entity in `root`'s subtree (root included) named `name`.
    pub fn find_in_hierarchy_by_name(&self, root: EntityId, name: &str) -> Option<EntityId> {
        self.find_in_hierarchy(root, |e| e.name() == name)
    }

    fn find_in_hierarchy<P>(&self, root: EntityId, predicate: P) -> Option<EntityId>
    where
        P: Fn(&Entity) -> bool,
    {
        let mut found = None;
        let _ = self.traverse(root, |e, _| {
            if found.is_some() {
                return false;
            }
            if predicate(e) {
                found = Some(e.id());
                return false;
            }
            true
        });
        found
    }

    // -----------------------------------------------------------------------
    // Cloning
    // -----------------------------------------------------------------------

    /// Clone `source` (and, per `settings`, its descendants) into this world.
    ///
    /// Clones keep names, local transforms, and flags; components are not
    /// copied and clones are not live. `on_cloned` runs for each new entity
    /// once its own cloned children are attached, so it fires leaves first.
    pub fn clone_hierarchy<F>(
        &mut self,
        source: EntityId,
        settings: &CloneSettings,
        mut on_cloned: F,
    ) -> Result<EntityId, SceneError>
    where
        F: FnMut(&mut World, EntityId),
    {
        let clone = self.clone_node(source, settings.clone_hierarchy, &mut on_cloned)?;
        debug!(source = ?source, clone = ?clone, "hierarchy cloned");
        Ok(clone)
    }

    fn clone_node(
        &mut self,
        source: EntityId,
        deep: bool,
        on_cloned: &mut dyn FnMut(&mut World, EntityId),
    ) -> Result<EntityId, SceneError> {
        let (name, transform, skip, hidden, children) = {
            let e = self.require(source)?;
            (
                e.name().to_owned(),
                *e.transform(),
                e.skip,
                e.hidden,
                e.children.clone(),
            )
        };

        let clone = self.create_entity(Some(name.as_str()));
        {
            let c = self.require_mut(clone)?;
            c.transform_mut().copy_from(&transform);
            c.skip = skip;
            c.hidden = hidden;
        }

        if deep {
            for child in children {
                let cloned_child = self.clone_node(child, true, on_cloned)?;
                self.require_mut(clone)?.children.push(cloned_child);
                self.require_mut(cloned_child)?.parent = Some(clone);
            }
        }

        on_cloned(self, clone);
        Ok(clone)
    }

    // -----------------------------------------------------------------------
    // World transforms
    // -----------------------------------------------------------------------

    /// Recompute `id`'s world transform from its parent's cached one.
    ///
    /// With `recursive`, every descendant is recomputed too whether dirty or
    /// not. A local matrix with pending changes is recomposed first. Returns
    /// how many entities were recomputed.
    pub fn update_world_transform(&mut self, id: EntityId, recursive: bool) -> Result<usize, SceneError> {
        self.require(id)?;
        let mut count = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let parent_world = self
                .entities
                .get(&current)
                .and_then(|e| e.parent)
                .and_then(|p| self.entities.get(&p))
                .map(|p| *p.world_transform());

            let Some(entity) = self.entities.get_mut(&current) else {
                continue;
            };
            if entity.transform().is_dirty() {
                entity.update_transform();
            }
            entity.compose_world(parent_world.as_ref());
            count += 1;

            if recursive {
                stack.extend(entity.children.iter().rev().copied());
            }
        }
        Ok(count)
    }

    /// Frame transform pass over live hierarchies.
    ///
    /// Clears `updated` on live entities, recomposes dirty local matrices,
    /// then walks every live root and fully recomputes the subtree under the
    /// first dirty entity of each branch. A live entity whose parent is not
    /// live counts as a root and composes with the parent's cached world
    /// transform. Returns how many world transforms were recomputed.
    pub fn update_transforms(&mut self) -> usize {
        let live: Vec<EntityId> = self.manager.iter().collect();
        let mut roots = Vec::new();
        let mut detached_roots = Vec::new();
        for &id in &live {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            entity.clear_updated();
            if entity.transform().is_dirty() {
                entity.update_transform();
            }
            match entity.parent {
                None => roots.push(id),
                Some(parent) if !self.manager.contains(parent) => detached_roots.push(id),
                Some(_) => {}
            }
        }

        // Parentless roots first; their cascades can reach live entities
        // hanging below a non-live node.
        let mut count = 0;
        for root in roots.into_iter().chain(detached_roots) {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let Some(entity) = self.entities.get(&id) else {
                    continue;
                };
                if entity.is_dirty() {
                    count += self.update_world_transform(id, true).unwrap_or(0);
                } else {
                    stack.extend(
                        entity
                            .children
                            .iter()
                            .rev()
                            .copied()
                            .filter(|c| self.manager.contains(*c)),
                    );
                }
            }
        }
        count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
