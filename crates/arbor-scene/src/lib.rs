//! Arbor Scene -- entities, capability components, systems, and a scene graph.
//!
//! Entities are named objects that carry a bag of components keyed by
//! [`ComponentKind`](component::ComponentKind), sit in a parent/child
//! hierarchy, and own a local and a world [`Transform`](transform::Transform).
//! Systems declare an interest in component kinds; the [`World`](world::World)
//! keeps each system's list of matching live entities up to date as entities
//! come and go and as components are attached or cleared.
//!
//! # Quick Start
//!
//! ```
//! use arbor_scene::prelude::*;
//!
//! #[derive(Debug)]
//! struct Light { intensity: f32 }
//!
//! impl Component for Light {
//!     const KIND: &'static str = "LightComponent";
//! }
//!
//! struct LightSystem;
//!
//! impl System for LightSystem {
//!     fn name(&self) -> &str { "LightSystem" }
//!     fn interest(&self) -> Interest { Interest::components(["LightComponent"]) }
//! }
//!
//! let mut world = World::new();
//! world.add_system(LightSystem).unwrap();
//!
//! let lamp = world.create_entity(Some("lamp"));
//! world.add_component(lamp, Light { intensity: 2.0 }).unwrap();
//! world.add_entity(lamp, false).unwrap();
//!
//! assert_eq!(world.active_entities("LightSystem"), Some(&[lamp][..]));
//! assert_eq!(world.entity(lamp).unwrap().get::<Light>().unwrap().intensity, 2.0);
//! ```

#![deny(unsafe_code)]

pub mod command;
pub mod component;
pub mod entity;
pub mod hierarchy;
pub mod manager;
pub mod snapshot;
pub mod system;
pub mod transform;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by scene operations.
///
/// Every variant is also logged at `warn` level where it is raised; the
/// operation that produced it leaves the world unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// The id does not name an entity in this world.
    #[error("entity {entity:?} does not exist in this world")]
    UnknownEntity { entity: entity::EntityId },

    /// Attaching would make an entity its own ancestor.
    #[error("cannot attach {child:?} under {parent:?}: {child:?} is {parent:?} or one of its ancestors")]
    CyclicAttach {
        parent: entity::EntityId,
        child: entity::EntityId,
    },

    /// An entity cannot be detached from itself.
    #[error("cannot detach entity {entity:?} from itself")]
    DetachSelf { entity: entity::EntityId },

    /// A system with this name is already registered.
    #[error("system '{name}' is already registered")]
    DuplicateSystem { name: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::command::{ApplyReport, Command, CommandBuffer, CommandKind};
    pub use crate::component::{
        AnyComponent, AttachedComponent, Component, ComponentBag, ComponentKind, DynamicComponent,
    };
    pub use crate::entity::{Entity, EntityId};
    pub use crate::hierarchy::CloneSettings;
    pub use crate::manager::EntityManager;
    pub use crate::snapshot::{EntitySnapshot, SceneSnapshot};
    pub use crate::system::{Interest, Membership, ProcessContext, System, SystemEntry};
    pub use crate::transform::Transform;
    pub use crate::world::{ComponentChange, World};
    pub use crate::SceneError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
