//! rapier2d rigid-body physics as a scene system.
//!
//! Entities carrying a [`RigidBody`] component get a rapier body and collider
//! when they start matching the [`PhysicsSystem`], and lose them when they
//! stop. Each frame the system:
//!
//! 1. pushes kinematic and static poses from entity transforms into rapier,
//! 2. steps rapier with the frame's `dt`,
//! 3. writes dynamic body poses back into entity transforms and marks them
//!    updated so the transform pass picks them up,
//! 4. records begin, during, and end contact events for
//!    [`PhysicsSystem::drain_contacts`].
//!
//! Kinematic bodies are written back too, so a kinematic velocity moves the
//! entity. Replacing an entity's [`RigidBody`] with a different shape or
//! body type rebuilds its rapier body on the next frame.
//!
//! Physics works in the xy plane. A body's angle is the entity's rotation
//! about z. Simulated poses are world-space but are written into the local
//! transform, so bodies are expected to be hierarchy roots.
//!
//! # Stepping
//!
//! With `max_sub_steps > 0` the frame's `dt` is consumed in fixed substeps of
//! `1 / step_frequency` seconds. Leftover time carries over to the next
//! frame; substeps beyond `max_sub_steps` are dropped. With
//! `max_sub_steps == 0` rapier steps once with the frame's `dt`.
//!
//! # Determinism
//!
//! rapier2d is compiled with `enhanced-determinism`. Contact events and pose
//! write-back are sorted by entity id, so identical scenes step identically.

use std::collections::{BTreeSet, HashMap};

use arbor_scene::component::Component;
use arbor_scene::entity::{Entity, EntityId};
use arbor_scene::system::{Interest, ProcessContext, System};
use arbor_scene::transform::Transform;
use glam::{EulerRot, Quat, Vec3};
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Name the physics system registers under.
pub const PHYSICS_SYSTEM_NAME: &str = "PhysicsSystem";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Physics settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity in world units per second squared.
    pub gravity: [f32; 2],
    /// Run order relative to other systems.
    pub priority: i32,
    /// Fixed substeps per second.
    pub step_frequency: f64,
    /// Upper bound on substeps per frame. 0 steps once with the frame's dt.
    pub max_sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.81],
            priority: 0,
            step_frequency: 60.0,
            max_sub_steps: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// RigidBody component
// ---------------------------------------------------------------------------

/// How rapier treats a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Simulated by the solver; its pose is written back to the entity.
    Dynamic,
    /// Moved by the entity's transform and velocity.
    Kinematic,
    /// Never moves on its own.
    Static,
}

/// Collider geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Box { half_width: f32, half_height: f32 },
    Circle { radius: f32 },
}

/// Gives an entity a rigid body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub body_type: BodyType,
    pub collider: ColliderShape,
    /// 0.0 = no bounce, 1.0 = perfect bounce.
    pub restitution: f32,
    /// Sensors report contacts but don't collide.
    pub is_sensor: bool,
    /// Initial velocity for dynamic bodies, updated from the solver each
    /// step. For kinematic bodies, the velocity they move at each step.
    pub linear_velocity: [f32; 2],
}

impl Component for RigidBody {
    const KIND: &'static str = "RigidBody";
}

impl RigidBody {
    pub fn dynamic(collider: ColliderShape) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            collider,
            restitution: 0.0,
            is_sensor: false,
            linear_velocity: [0.0, 0.0],
        }
    }

    pub fn kinematic(collider: ColliderShape) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Self::dynamic(collider)
        }
    }

    pub fn fixed(collider: ColliderShape) -> Self {
        Self {
            body_type: BodyType::Static,
            ..Self::dynamic(collider)
        }
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_velocity(mut self, x: f32, y: f32) -> Self {
        self.linear_velocity = [x, y];
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }
}

/// Whether two descriptions build the same rapier body. Velocity is state,
/// not shape, and is ignored.
fn same_body(a: &RigidBody, b: &RigidBody) -> bool {
    a.body_type == b.body_type
        && a.collider == b.collider
        && a.restitution == b.restitution
        && a.is_sensor == b.is_sensor
}

// ---------------------------------------------------------------------------
// Poses, contacts and ray hits
// ---------------------------------------------------------------------------

/// Planar pose read from or pushed into rapier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPose {
    pub translation: [f32; 2],
    /// Radians about z.
    pub angle: f32,
    pub linear_velocity: [f32; 2],
}

impl BodyPose {
    /// Planar pose of a transform: xy translation and rotation about z.
    pub fn from_transform(transform: &Transform, linear_velocity: [f32; 2]) -> Self {
        let t = transform.translation();
        let (angle, _, _) = transform.rotation().to_euler(EulerRot::ZYX);
        Self {
            translation: [t.x, t.y],
            angle,
            linear_velocity,
        }
    }
}

/// Where a pair of bodies is in its contact lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContactPhase {
    /// Touching now, not touching before this step.
    Begin,
    /// Touching before and after this step.
    During,
    /// Touching before, not touching after this step.
    End,
}

/// Contact change between two entities' colliders. `entity_a < entity_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub entity_a: EntityId,
    pub entity_b: EntityId,
    pub phase: ContactPhase,
}

/// Closest collider hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: EntityId,
    /// Hit point in world space.
    pub point: [f32; 2],
    /// Surface normal at the hit point.
    pub normal: [f32; 2],
    /// Distance from the ray start.
    pub distance: f32,
}

// ---------------------------------------------------------------------------
// PhysicsWorld
// ---------------------------------------------------------------------------

/// rapier2d state plus the entity/handle mapping.
pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    entity_to_body: HashMap<EntityId, RigidBodyHandle>,
    collider_to_entity: HashMap<ColliderHandle, EntityId>,
    descriptions: HashMap<EntityId, RigidBody>,
    touching: BTreeSet<(EntityId, EntityId)>,
    step_frequency: f64,
    max_sub_steps: u32,
    accumulator: f64,
    last_substeps: u32,
}

impl PhysicsWorld {
    /// A world that steps once per call with the given `dt`.
    pub fn new(gravity: [f32; 2]) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![gravity[0], gravity[1]],
            integration_params: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            entity_to_body: HashMap::new(),
            collider_to_entity: HashMap::new(),
            descriptions: HashMap::new(),
            touching: BTreeSet::new(),
            step_frequency: 60.0,
            max_sub_steps: 0,
            accumulator: 0.0,
            last_substeps: 0,
        }
    }

    /// A world with gravity and substepping taken from `config`.
    pub fn from_config(config: &PhysicsConfig) -> Self {
        let mut world = Self::new(config.gravity);
        world.set_substepping(config.step_frequency, config.max_sub_steps);
        world
    }

    /// Change fixed-substep settings. A non-positive frequency turns
    /// substepping off.
    pub fn set_substepping(&mut self, step_frequency: f64, max_sub_steps: u32) {
        if step_frequency > 0.0 && step_frequency.is_finite() {
            self.step_frequency = step_frequency;
            self.max_sub_steps = max_sub_steps;
        } else {
            self.max_sub_steps = 0;
        }
        self.accumulator = 0.0;
    }

    pub fn gravity(&self) -> [f32; 2] {
        [self.gravity.x, self.gravity.y]
    }

    /// Takes effect from the next step. Sleeping bodies stay asleep until
    /// something wakes them.
    pub fn set_gravity(&mut self, gravity: [f32; 2]) {
        self.gravity = vector![gravity[0], gravity[1]];
    }

    /// Create a body and collider for `id`. No-op if already registered.
    pub fn register(&mut self, id: EntityId, pose: BodyPose, body: &RigidBody) {
        if self.entity_to_body.contains_key(&id) {
            return;
        }

        let [x, y] = pose.translation;
        let [vx, vy] = pose.linear_velocity;
        let builder = match body.body_type {
            BodyType::Dynamic => RigidBodyBuilder::dynamic().linvel(vector![vx, vy]),
            BodyType::Kinematic => {
                RigidBodyBuilder::kinematic_velocity_based().linvel(vector![vx, vy])
            }
            BodyType::Static => RigidBodyBuilder::fixed(),
        };
        let rb = builder.translation(vector![x, y]).rotation(pose.angle).build();
        let body_handle = self.rigid_body_set.insert(rb);
        self.entity_to_body.insert(id, body_handle);
        self.descriptions.insert(id, body.clone());

        let shape = match &body.collider {
            ColliderShape::Box {
                half_width,
                half_height,
            } => SharedShape::cuboid(*half_width, *half_height),
            ColliderShape::Circle { radius } => SharedShape::ball(*radius),
        };
        let collider = ColliderBuilder::new(shape)
            .restitution(body.restitution)
            .sensor(body.is_sensor)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider_handle =
            self.collider_set
                .insert_with_parent(collider, body_handle, &mut self.rigid_body_set);
        self.collider_to_entity.insert(collider_handle, id);
    }

    /// Remove `id`'s body and colliders. No-op if not registered.
    pub fn unregister(&mut self, id: EntityId) {
        let Some(body_handle) = self.entity_to_body.remove(&id) else {
            return;
        };
        self.rigid_body_set.remove(
            body_handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.collider_to_entity.retain(|_, owner| *owner != id);
        self.descriptions.remove(&id);
        self.touching.retain(|&(a, b)| a != id && b != id);
    }

    /// Rebuild `id`'s body if `body` no longer matches what it was built
    /// from. Returns true when a rebuild happened.
    pub fn sync_body(&mut self, id: EntityId, pose: BodyPose, body: &RigidBody) -> bool {
        let stale = self
            .descriptions
            .get(&id)
            .is_some_and(|current| !same_body(current, body));
        if stale {
            self.unregister(id);
            self.register(id, pose, body);
        }
        stale
    }

    /// The description `id`'s body was built from.
    pub fn registered_body(&self, id: EntityId) -> Option<&RigidBody> {
        self.descriptions.get(&id)
    }

    /// Overwrite a body's pose and velocity.
    pub fn push_pose(&mut self, id: EntityId, pose: BodyPose) {
        let Some(rb) = self
            .entity_to_body
            .get(&id)
            .and_then(|&h| self.rigid_body_set.get_mut(h))
        else {
            return;
        };
        let [x, y] = pose.translation;
        let [vx, vy] = pose.linear_velocity;
        rb.set_translation(vector![x, y], true);
        rb.set_rotation(Rotation::new(pose.angle), true);
        if !rb.is_fixed() {
            rb.set_linvel(vector![vx, vy], true);
        }
    }

    /// Advance the simulation by `dt` seconds and return contact changes,
    /// sorted by entity pair then phase.
    pub fn step(&mut self, dt: f64) -> Vec<ContactEvent> {
        let (substeps, substep_dt) = self.plan_substeps(dt);
        self.last_substeps = substeps;
        self.integration_params.dt = substep_dt as Real;

        let (collision_send, collision_recv) =
            rapier2d::crossbeam::channel::unbounded::<CollisionEvent>();
        let (force_send, _force_recv) =
            rapier2d::crossbeam::channel::unbounded::<ContactForceEvent>();
        let event_handler = ChannelEventCollector::new(collision_send, force_send);

        for _ in 0..substeps {
            self.pipeline.step(
                &self.gravity,
                &self.integration_params,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &event_handler,
            );
        }

        let before = self.touching.clone();
        let mut begun = BTreeSet::new();
        let mut contacts = Vec::new();
        while let Ok(event) = collision_recv.try_recv() {
            let (h1, h2, started) = match event {
                CollisionEvent::Started(h1, h2, _) => (h1, h2, true),
                CollisionEvent::Stopped(h1, h2, _) => (h1, h2, false),
            };
            let a = self.collider_to_entity.get(&h1).copied();
            let b = self.collider_to_entity.get(&h2).copied();
            let (Some(a), Some(b)) = (a, b) else {
                continue;
            };
            let pair = (a.min(b), a.max(b));
            if started {
                if self.touching.insert(pair) {
                    begun.insert(pair);
                    contacts.push(contact(pair, ContactPhase::Begin));
                }
            } else if self.touching.remove(&pair) {
                contacts.push(contact(pair, ContactPhase::End));
            }
        }
        for pair in before.intersection(&self.touching) {
            if !begun.contains(pair) {
                contacts.push(contact(*pair, ContactPhase::During));
            }
        }

        contacts.sort_by_key(|c| (c.entity_a, c.entity_b, c.phase));
        contacts
    }

    fn plan_substeps(&mut self, dt: f64) -> (u32, f64) {
        if self.max_sub_steps == 0 {
            return (1, dt);
        }
        let fixed = 1.0 / self.step_frequency;
        self.accumulator += dt;
        // Tolerate rounding when dt is an exact multiple of the substep.
        let available = ((self.accumulator + 1e-9) / fixed).floor() as u32;
        self.accumulator = (self.accumulator - f64::from(available) * fixed).max(0.0);
        (available.min(self.max_sub_steps), fixed)
    }

    /// Substeps taken by the most recent [`step`](Self::step).
    pub fn last_substep_count(&self) -> u32 {
        self.last_substeps
    }

    /// Closest collider crossed by the segment from `start` to `end`.
    ///
    /// Uses collider positions as of the last step.
    pub fn raycast_closest(&self, start: [f32; 2], end: [f32; 2]) -> Option<RaycastHit> {
        let delta = vector![end[0] - start[0], end[1] - start[1]];
        let length = delta.norm();
        if length <= Real::EPSILON {
            return None;
        }
        let ray = Ray::new(point![start[0], start[1]], delta / length);
        let (handle, hit) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            length,
            true,
            QueryFilter::default(),
        )?;
        let entity = self.collider_to_entity.get(&handle).copied()?;
        let point = ray.point_at(hit.time_of_impact);
        Some(RaycastHit {
            entity,
            point: [point.x, point.y],
            normal: [hit.normal.x, hit.normal.y],
            distance: hit.time_of_impact,
        })
    }

    /// Poses of every dynamic body, sorted by entity id.
    pub fn dynamic_poses(&self) -> Vec<(EntityId, BodyPose)> {
        self.poses_where(|rb| rb.is_dynamic())
    }

    /// Poses of every kinematic body, sorted by entity id.
    pub fn kinematic_poses(&self) -> Vec<(EntityId, BodyPose)> {
        self.poses_where(|rb| rb.is_kinematic())
    }

    fn poses_where(
        &self,
        keep: impl Fn(&rapier2d::dynamics::RigidBody) -> bool,
    ) -> Vec<(EntityId, BodyPose)> {
        let mut poses: Vec<(EntityId, BodyPose)> = self
            .entity_to_body
            .iter()
            .filter_map(|(&id, &handle)| {
                let rb = self.rigid_body_set.get(handle)?;
                if !keep(rb) {
                    return None;
                }
                let t = rb.translation();
                let v = rb.linvel();
                Some((
                    id,
                    BodyPose {
                        translation: [t.x, t.y],
                        angle: rb.rotation().angle(),
                        linear_velocity: [v.x, v.y],
                    },
                ))
            })
            .collect();
        poses.sort_by_key(|(id, _)| *id);
        poses
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.entity_to_body.contains_key(&id)
    }

    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }
}

fn contact((entity_a, entity_b): (EntityId, EntityId), phase: ContactPhase) -> ContactEvent {
    ContactEvent {
        entity_a,
        entity_b,
        phase,
    }
}

// ---------------------------------------------------------------------------
// PhysicsSystem
// ---------------------------------------------------------------------------

/// Scene system that drives a [`PhysicsWorld`].
pub struct PhysicsSystem {
    physics: PhysicsWorld,
    priority: i32,
    contacts: Vec<ContactEvent>,
}

impl PhysicsSystem {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            physics: PhysicsWorld::from_config(config),
            priority: config.priority,
            contacts: Vec::new(),
        }
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn set_gravity(&mut self, gravity: [f32; 2]) {
        debug!(gravity = ?gravity, "gravity changed");
        self.physics.set_gravity(gravity);
    }

    /// See [`PhysicsWorld::raycast_closest`].
    pub fn raycast_closest(&self, start: [f32; 2], end: [f32; 2]) -> Option<RaycastHit> {
        self.physics.raycast_closest(start, end)
    }

    /// Contacts recorded since the last drain, oldest first.
    pub fn drain_contacts(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.contacts)
    }
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        PHYSICS_SYSTEM_NAME
    }

    fn interest(&self) -> Interest {
        Interest::components([RigidBody::KIND])
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn inserted(&mut self, entity: &Entity) {
        let Some(body) = entity.get::<RigidBody>() else {
            return;
        };
        // A dirty entity's world transform is stale; fall back to local.
        let transform = if entity.is_dirty() {
            entity.transform()
        } else {
            entity.world_transform()
        };
        let pose = BodyPose::from_transform(transform, body.linear_velocity);
        self.physics.register(entity.id(), pose, body);
        debug!(entity = ?entity.id(), body_type = ?body.body_type, "rigid body registered");
    }

    fn deleted(&mut self, entity: &Entity) {
        self.physics.unregister(entity.id());
        debug!(entity = ?entity.id(), "rigid body unregistered");
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, entities: &[EntityId], dt: f64) {
        for &id in entities {
            let Some(entity) = ctx.entity(id) else {
                continue;
            };
            let Some(body) = entity.get::<RigidBody>() else {
                continue;
            };
            let pose = BodyPose::from_transform(entity.transform(), body.linear_velocity);
            if self.physics.sync_body(id, pose, body) {
                debug!(entity = ?id, body_type = ?body.body_type, "rigid body rebuilt");
            } else if body.body_type != BodyType::Dynamic {
                self.physics.push_pose(id, pose);
            }
        }

        let contacts = self.physics.step(dt);
        if !contacts.is_empty() {
            trace!(count = contacts.len(), "contacts");
        }
        self.contacts.extend(contacts);

        for (id, pose) in self.physics.dynamic_poses() {
            if let Some(entity) = ctx.entity_mut(id) {
                write_pose(entity, &pose);
                if let Some(body) = entity.get_mut::<RigidBody>() {
                    body.linear_velocity = pose.linear_velocity;
                }
            }
        }
        for (id, pose) in self.physics.kinematic_poses() {
            if let Some(entity) = ctx.entity_mut(id) {
                write_pose(entity, &pose);
            }
        }
    }
}

/// Copy a simulated pose into the entity's local transform, keeping z.
fn write_pose(entity: &mut Entity, pose: &BodyPose) {
    let [x, y] = pose.translation;
    let z = entity.transform().translation().z;
    let transform = entity.transform_mut();
    transform.set_translation(Vec3::new(x, y, z));
    transform.set_rotation(Quat::from_rotation_z(pose.angle));
    entity.set_updated();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
