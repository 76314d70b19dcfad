//! Fixed-timestep frame loop.
//!
//! The [`TickLoop`] owns a [`World`] and drives it one frame at a time:
//!
//! 1. every non-passive system runs its `process` pass in priority order,
//!    and the structural commands it queued are applied before the next
//!    system runs;
//! 2. the transform pass recomputes world transforms of dirty hierarchies
//!    (unless disabled in [`TickConfig`]);
//! 3. the tick counter advances.
//!
//! # Example
//!
//! ```
//! use arbor_engine::tick::{TickConfig, TickLoop};
//! use arbor_scene::prelude::*;
//!
//! struct Spinner;
//!
//! impl System for Spinner {
//!     fn name(&self) -> &str { "Spinner" }
//!     fn interest(&self) -> Interest { Interest::All }
//! }
//!
//! let mut tick_loop = TickLoop::new(World::new(), TickConfig::default());
//! tick_loop.add_system(Spinner).unwrap();
//! tick_loop.run_ticks(10);
//!
//! assert_eq!(tick_loop.tick_count(), 10);
//! ```

use std::time::{Duration, Instant};

use arbor_scene::system::System;
use arbor_scene::world::World;
use arbor_scene::SceneError;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Frame loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Run the transform pass after systems each tick.
    pub update_transforms: bool,
    /// No presentation layer; tick as fast as possible.
    pub headless: bool,
}

impl Default for TickConfig {
    /// 60 Hz with the transform pass enabled.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            update_transforms: true,
            headless: false,
        }
    }
}

impl TickConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "fixed_dt must be positive and finite, got {}",
                self.fixed_dt
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: TickConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// What happened during the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per processed system, in run order.
    pub system_times: Vec<(String, Duration)>,
    /// Whole tick, systems and transform pass included.
    pub total_time: Duration,
    /// Time spent in the transform pass.
    pub transform_time: Duration,
    /// World transforms recomputed by the transform pass.
    pub transforms_updated: usize,
    /// Deferred commands applied across all systems.
    pub commands_applied: usize,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// Deterministic fixed-timestep driver for a [`World`].
///
/// Simulation time is `tick_count * fixed_dt` rather than an accumulated sum,
/// so it does not drift.
pub struct TickLoop {
    world: World,
    tick_counter: u64,
    fixed_dt: f64,
    config: TickConfig,
    last_diagnostics: TickDiagnostics,
}

impl TickLoop {
    /// Create a loop at tick 0.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite. Use
    /// [`TickConfig::validate`] to check first.
    pub fn new(world: World, config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            tick_counter: 0,
            fixed_dt: config.fixed_dt,
            config,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register a system with the world.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<(), SceneError> {
        self.world.add_system(system)
    }

    /// Run one frame. Returns the number of deferred commands applied.
    pub fn tick(&mut self) -> usize {
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.world.system_count());
        let mut commands_applied = 0;

        for index in 0..self.world.system_count() {
            let entry = &self.world.systems()[index];
            if entry.is_passive() {
                continue;
            }
            let name = entry.name().to_owned();
            let sys_start = Instant::now();
            commands_applied += self.world.run_system(index, self.fixed_dt);
            system_times.push((name, sys_start.elapsed()));
        }

        let transform_start = Instant::now();
        let transforms_updated = if self.config.update_transforms {
            self.world.update_transforms()
        } else {
            0
        };
        let transform_time = transform_start.elapsed();

        self.tick_counter += 1;

        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            transform_time,
            transforms_updated,
            commands_applied,
        };

        commands_applied
    }

    /// Run `count` ticks. Returns the total number of commands applied.
    pub fn run_ticks(&mut self, count: u64) -> u64 {
        let mut total = 0u64;
        for _ in 0..count {
            total += self.tick() as u64;
        }
        total
    }

    // -- accessors ----------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulation time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Hand the world back, ending the loop.
    pub fn into_world(self) -> World {
        self.world
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    pub fn is_headless(&self) -> bool {
        self.config.headless
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
