//! Integration tests for the physics system inside the frame loop.

use arbor_engine::prelude::*;
use glam::Vec3;

fn physics_loop() -> TickLoop {
    let mut tick_loop = TickLoop::new(World::new(), TickConfig::default());
    tick_loop
        .add_system(PhysicsSystem::new(&PhysicsConfig::default()))
        .unwrap();
    tick_loop
}

fn spawn_body(tick_loop: &mut TickLoop, name: &str, at: Vec3, body: RigidBody) -> EntityId {
    let world = tick_loop.world_mut();
    let id = world.create_entity(Some(name));
    world.entity_mut(id).unwrap().transform_mut().set_translation(at);
    world.add_component(id, body).unwrap();
    world.add_entity(id, false).unwrap();
    id
}

fn physics(tick_loop: &TickLoop) -> &PhysicsWorld {
    tick_loop.world().system::<PhysicsSystem>().unwrap().physics()
}

#[test]
fn bodies_follow_system_membership() {
    let mut tick_loop = physics_loop();
    let ball = spawn_body(
        &mut tick_loop,
        "ball",
        Vec3::new(0.0, 5.0, 0.0),
        RigidBody::dynamic(ColliderShape::Circle { radius: 0.5 }),
    );
    assert!(physics(&tick_loop).has_entity(ball));

    tick_loop.world_mut().clear_component(ball, RigidBody::KIND).unwrap();
    assert!(!physics(&tick_loop).has_entity(ball));
    assert_eq!(physics(&tick_loop).body_count(), 0);
}

#[test]
fn falling_body_writes_pose_back() {
    let mut tick_loop = physics_loop();
    let ball = spawn_body(
        &mut tick_loop,
        "ball",
        Vec3::new(0.0, 5.0, 1.0),
        RigidBody::dynamic(ColliderShape::Circle { radius: 0.5 }),
    );

    tick_loop.run_ticks(30);

    let entity = tick_loop.world().entity(ball).unwrap();
    let world_pos = entity.world_transform().translation();
    assert!(world_pos.y < 5.0);
    // z is preserved from the entity.
    assert_eq!(world_pos.z, 1.0);
    assert!(entity.get::<RigidBody>().unwrap().linear_velocity[1] < 0.0);
}

#[test]
fn body_resting_on_floor_reports_contact() {
    let mut tick_loop = physics_loop();
    spawn_body(
        &mut tick_loop,
        "floor",
        Vec3::ZERO,
        RigidBody::fixed(ColliderShape::Box {
            half_width: 10.0,
            half_height: 0.5,
        }),
    );
    let ball = spawn_body(
        &mut tick_loop,
        "ball",
        Vec3::new(0.0, 2.0, 0.0),
        RigidBody::dynamic(ColliderShape::Circle { radius: 0.5 }),
    );

    tick_loop.run_ticks(120);

    let y = tick_loop
        .world()
        .entity(ball)
        .unwrap()
        .world_transform()
        .translation()
        .y;
    assert!(y > 0.5 && y < 1.5, "ball should rest on the floor, y = {y}");

    let contacts = tick_loop
        .world_mut()
        .system_mut::<PhysicsSystem>()
        .unwrap()
        .drain_contacts();
    assert!(contacts
        .iter()
        .any(|c| c.phase == ContactPhase::Begin && (c.entity_a == ball || c.entity_b == ball)));
    // Resting keeps the pair in contact.
    assert_eq!(contacts.last().map(|c| c.phase), Some(ContactPhase::During));
}

#[test]
fn removing_from_world_unregisters_body() {
    let mut tick_loop = physics_loop();
    let ball = spawn_body(
        &mut tick_loop,
        "ball",
        Vec3::ZERO,
        RigidBody::dynamic(ColliderShape::Circle { radius: 0.5 }),
    );
    tick_loop.world_mut().remove_entity(ball, false).unwrap();
    assert!(!physics(&tick_loop).has_entity(ball));

    tick_loop.world_mut().add_entity(ball, false).unwrap();
    assert!(physics(&tick_loop).has_entity(ball));
}

#[test]
fn kinematic_body_follows_entity_transform() {
    let mut tick_loop = physics_loop();
    let paddle = spawn_body(
        &mut tick_loop,
        "paddle",
        Vec3::ZERO,
        RigidBody::kinematic(ColliderShape::Box {
            half_width: 1.0,
            half_height: 0.2,
        }),
    );
    tick_loop
        .world_mut()
        .entity_mut(paddle)
        .unwrap()
        .transform_mut()
        .set_translation(Vec3::new(3.0, 0.0, 0.0));
    tick_loop.tick();

    // With no velocity the written-back pose is the one the scene pushed.
    let pos = tick_loop
        .world()
        .entity(paddle)
        .unwrap()
        .world_transform()
        .translation();
    assert_eq!(pos, Vec3::new(3.0, 0.0, 0.0));
    assert!(physics(&tick_loop).dynamic_poses().is_empty());
    assert_eq!(physics(&tick_loop).kinematic_poses().len(), 1);
}

#[test]
fn kinematic_velocity_moves_the_entity() {
    let mut tick_loop = physics_loop();
    let paddle = spawn_body(
        &mut tick_loop,
        "paddle",
        Vec3::new(0.0, 0.0, 2.0),
        RigidBody::kinematic(ColliderShape::Box {
            half_width: 1.0,
            half_height: 0.2,
        })
        .with_velocity(2.0, 0.0),
    );

    tick_loop.run_ticks(60);

    let pos = tick_loop
        .world()
        .entity(paddle)
        .unwrap()
        .world_transform()
        .translation();
    assert!((pos.x - 2.0).abs() < 1e-3, "x = {}", pos.x);
    assert_eq!(pos.y, 0.0);
    assert_eq!(pos.z, 2.0);
}

#[test]
fn replacing_rigid_body_rebuilds_it() {
    let mut tick_loop = physics_loop();
    let crate_id = spawn_body(
        &mut tick_loop,
        "crate",
        Vec3::new(0.0, 5.0, 0.0),
        RigidBody::dynamic(ColliderShape::Circle { radius: 0.5 }),
    );
    tick_loop.run_ticks(10);

    let anchored = RigidBody::fixed(ColliderShape::Box {
        half_width: 0.5,
        half_height: 0.5,
    });
    tick_loop
        .world_mut()
        .add_component(crate_id, anchored.clone())
        .unwrap();
    tick_loop.tick();
    let y = |tick_loop: &TickLoop| {
        tick_loop
            .world()
            .entity(crate_id)
            .unwrap()
            .world_transform()
            .translation()
            .y
    };
    let settled = y(&tick_loop);
    assert!(settled < 5.0);

    tick_loop.run_ticks(30);
    assert_eq!(y(&tick_loop), settled);
    assert_eq!(physics(&tick_loop).registered_body(crate_id), Some(&anchored));
    assert_eq!(physics(&tick_loop).body_count(), 1);
    assert!(physics(&tick_loop).dynamic_poses().is_empty());
}

#[test]
fn raycast_finds_entity_through_the_system() {
    let mut tick_loop = physics_loop();
    let floor = spawn_body(
        &mut tick_loop,
        "floor",
        Vec3::ZERO,
        RigidBody::fixed(ColliderShape::Box {
            half_width: 10.0,
            half_height: 0.5,
        }),
    );
    tick_loop.tick();

    let system = tick_loop.world().system::<PhysicsSystem>().unwrap();
    let hit = system.raycast_closest([2.0, 5.0], [2.0, -5.0]).unwrap();
    assert_eq!(hit.entity, floor);
    assert!((hit.point[1] - 0.5).abs() < 1e-3);
    assert!((hit.normal[1] - 1.0).abs() < 1e-3);
    assert!(system.raycast_closest([20.0, 5.0], [20.0, -5.0]).is_none());
}

#[test]
fn set_gravity_reverses_fall() {
    let mut tick_loop = physics_loop();
    let balloon = spawn_body(
        &mut tick_loop,
        "balloon",
        Vec3::ZERO,
        RigidBody::dynamic(ColliderShape::Circle { radius: 0.5 }),
    );
    tick_loop
        .world_mut()
        .system_mut::<PhysicsSystem>()
        .unwrap()
        .set_gravity([0.0, 9.81]);

    tick_loop.run_ticks(20);

    let entity = tick_loop.world().entity(balloon).unwrap();
    assert!(entity.world_transform().translation().y > 0.0);
    assert_eq!(physics(&tick_loop).gravity(), [0.0, 9.81]);
}

#[test]
fn fixed_substeps_follow_config() {
    let config = PhysicsConfig {
        step_frequency: 240.0,
        max_sub_steps: 8,
        ..PhysicsConfig::default()
    };
    let mut tick_loop = TickLoop::new(World::new(), TickConfig::default());
    tick_loop.add_system(PhysicsSystem::new(&config)).unwrap();

    tick_loop.tick();
    assert_eq!(physics(&tick_loop).last_substep_count(), 4);
}
