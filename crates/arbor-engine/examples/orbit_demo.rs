//! Orbit demo: a small solar system plus a falling crate.
//!
//! A sun, planet, and moon are chained in a hierarchy; a spin system rotates
//! each body about z every tick, so the moon's world position traces the
//! composed orbit. A crate with a dynamic rigid body drops onto a static
//! floor. Positions and the final scene digest are printed.
//!
//! Run with: `cargo run --example orbit_demo`
//! Set `RUST_LOG=debug` to see registration and membership logs.

use anyhow::Context;
use arbor_engine::prelude::*;
use glam::{Quat, Vec3};

/// Angular speed in radians per second.
#[derive(Debug)]
struct Spin(f32);

impl Component for Spin {
    const KIND: &'static str = "Spin";
}

struct SpinSystem;

impl System for SpinSystem {
    fn name(&self) -> &str {
        "SpinSystem"
    }

    fn interest(&self) -> Interest {
        Interest::components([Spin::KIND])
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>, entities: &[EntityId], dt: f64) {
        for &id in entities {
            let Some(entity) = ctx.entity_mut(id) else {
                continue;
            };
            if entity.skip {
                continue;
            }
            let Some(speed) = entity.get::<Spin>().map(|s| s.0) else {
                continue;
            };
            let rotation = entity.transform().rotation() * Quat::from_rotation_z(speed * dt as f32);
            entity.transform_mut().set_rotation(rotation);
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    init_tracing("warn");

    let config = TickConfig::from_json_str(r#"{ "fixed_dt": 0.016666666666666666, "headless": true }"#)
        .context("tick config")?;
    let mut tick_loop = TickLoop::new(World::new(), config);
    tick_loop.add_system(SpinSystem)?;
    tick_loop.add_system(PhysicsSystem::new(&PhysicsConfig::default()))?;

    let world = tick_loop.world_mut();

    let sun = world.create_entity(Some("sun"));
    let planet = world.create_entity(Some("planet"));
    let moon = world.create_entity(Some("moon"));
    world.attach_child(sun, planet)?;
    world.attach_child(planet, moon)?;
    world.add_component(sun, Spin(0.5))?;
    world.add_component(planet, Spin(2.0))?;
    world
        .entity_mut(planet)
        .context("planet")?
        .transform_mut()
        .set_translation(Vec3::new(10.0, 0.0, 0.0));
    world
        .entity_mut(moon)
        .context("moon")?
        .transform_mut()
        .set_translation(Vec3::new(2.0, 0.0, 0.0));
    world.add_entity(sun, true)?;

    let floor = world.create_entity(Some("floor"));
    world.add_component(
        floor,
        RigidBody::fixed(ColliderShape::Box {
            half_width: 20.0,
            half_height: 0.5,
        }),
    )?;
    world.add_entity(floor, false)?;

    let crate_box = world.create_entity(Some("crate"));
    world
        .entity_mut(crate_box)
        .context("crate")?
        .transform_mut()
        .set_translation(Vec3::new(0.0, 5.0, 0.0));
    world.add_component(
        crate_box,
        RigidBody::dynamic(ColliderShape::Box {
            half_width: 0.5,
            half_height: 0.5,
        })
        .with_restitution(0.2),
    )?;
    world.add_entity(crate_box, false)?;

    for second in 1..=3 {
        tick_loop.run_ticks(60);
        let world = tick_loop.world();
        let moon_pos = world.entity(moon).context("moon")?.world_transform().translation();
        let crate_pos = world
            .entity(crate_box)
            .context("crate")?
            .world_transform()
            .translation();
        println!(
            "t={second}s moon=({:.2}, {:.2}) crate_y={:.2}",
            moon_pos.x, moon_pos.y, crate_pos.y
        );
    }

    let contacts = tick_loop
        .world_mut()
        .system_mut::<PhysicsSystem>()
        .map(|p| p.drain_contacts())
        .unwrap_or_default();
    println!("contacts: {}", contacts.len());

    let diagnostics = tick_loop.last_diagnostics();
    println!(
        "last tick: {:?} total, {} transforms updated",
        diagnostics.total_time, diagnostics.transforms_updated
    );

    let snapshot = SceneSnapshot::capture(tick_loop.world());
    println!("scene digest: {}", snapshot.digest());
    Ok(())
}
