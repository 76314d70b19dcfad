//! Arbor Engine -- frame loop, physics, and runtime plumbing for Arbor scenes.
//!
//! This crate builds on [`arbor_scene`] to provide the driver: a
//! fixed-timestep [`TickLoop`](tick::TickLoop) that processes systems in
//! priority order and runs the transform pass, a rapier2d-backed
//! [`PhysicsSystem`](physics::PhysicsSystem), JSON-loadable configuration,
//! and tracing setup.
//!
//! # Quick Start
//!
//! ```
//! use arbor_engine::prelude::*;
//! use glam::Vec3;
//!
//! let mut tick_loop = TickLoop::new(World::new(), TickConfig::default());
//!
//! let world = tick_loop.world_mut();
//! let sun = world.create_entity(Some("sun"));
//! let planet = world.create_entity(Some("planet"));
//! world.attach_child(sun, planet).unwrap();
//! world.entity_mut(sun).unwrap().transform_mut().set_translation(Vec3::new(5.0, 0.0, 0.0));
//! world.entity_mut(planet).unwrap().transform_mut().set_translation(Vec3::new(1.0, 0.0, 0.0));
//! world.add_entity(sun, true).unwrap();
//!
//! tick_loop.run_ticks(1);
//! let planet = tick_loop.world().entity(planet).unwrap();
//! assert_eq!(planet.world_transform().translation(), Vec3::new(6.0, 0.0, 0.0));
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod logging;
pub mod physics;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the scene crate for convenience.
pub use arbor_scene;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use arbor_scene::prelude::*;

    pub use crate::error::EngineError;
    pub use crate::logging::init_tracing;
    pub use crate::physics::{
        BodyPose, BodyType, ColliderShape, ContactEvent, ContactPhase, PhysicsConfig,
        PhysicsSystem, PhysicsWorld, RaycastHit, RigidBody, PHYSICS_SYSTEM_NAME,
    };
    pub use crate::tick::{TickConfig, TickDiagnostics, TickLoop};
}
