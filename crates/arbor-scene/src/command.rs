//! Deferred structural changes issued while systems run.
//!
//! While a system's `process` pass runs it only has mutable access to entity
//! data, not to the world's structure. Structural changes (attaching or
//! clearing components, re-parenting, adding or removing entities) are
//! recorded in a [`CommandBuffer`] and applied in FIFO order once the pass
//! finishes. Applying a command goes through the same world operations as a
//! direct call, so every system is notified exactly as it would be outside a
//! pass.
//!
//! # Example
//!
//! ```
//! use arbor_scene::prelude::*;
//!
//! let mut world = World::new();
//! let e = world.create_entity(Some("crate"));
//!
//! let mut cmds = CommandBuffer::new();
//! cmds.add_component(e, DynamicComponent::new("Breakable"), "setup");
//! cmds.add_to_world(e, false, "setup");
//!
//! let applied = cmds.apply(&mut world);
//! assert!(applied.iter().all(|c| c.applied_successfully));
//! assert!(world.is_live(e));
//! assert!(world.entity(e).unwrap().has_component("Breakable"));
//! ```

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::component::{AnyComponent, ComponentKind};
use crate::entity::EntityId;
use crate::world::World;
use crate::SceneError;

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// The structural change a command performs on its target entity.
pub enum CommandKind {
    /// Attach a component. The payload is moved into the world on apply.
    AddComponent {
        kind: ComponentKind,
        component: Option<Box<dyn AnyComponent>>,
    },
    /// Clear the indexed component of a kind.
    ClearComponent { kind: ComponentKind },
    /// Attach `child` under the target.
    AttachChild { child: EntityId },
    /// Detach `child` from the target.
    DetachChild { child: EntityId },
    /// Make the target live.
    AddToWorld { recursive: bool },
    /// Make the target not live.
    RemoveFromWorld { recursive: bool },
    /// Remove the target from the world entirely.
    Destroy,
}

impl CommandKind {
    /// Short label used in logs and conflict detection.
    pub fn label(&self) -> String {
        match self {
            CommandKind::AddComponent { kind, .. } | CommandKind::ClearComponent { kind } => {
                format!("component:{kind}")
            }
            CommandKind::AttachChild { child } | CommandKind::DetachChild { child } => {
                format!("child:{child}")
            }
            CommandKind::AddToWorld { .. } | CommandKind::RemoveFromWorld { .. } => {
                "liveness".to_owned()
            }
            CommandKind::Destroy => "destroy".to_owned(),
        }
    }
}

impl fmt::Debug for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::AddComponent { kind, component } => f
                .debug_struct("AddComponent")
                .field("kind", kind)
                .field("pending", &component.is_some())
                .finish(),
            CommandKind::ClearComponent { kind } => {
                f.debug_struct("ClearComponent").field("kind", kind).finish()
            }
            CommandKind::AttachChild { child } => {
                f.debug_struct("AttachChild").field("child", child).finish()
            }
            CommandKind::DetachChild { child } => {
                f.debug_struct("DetachChild").field("child", child).finish()
            }
            CommandKind::AddToWorld { recursive } => f
                .debug_struct("AddToWorld")
                .field("recursive", recursive)
                .finish(),
            CommandKind::RemoveFromWorld { recursive } => f
                .debug_struct("RemoveFromWorld")
                .field("recursive", recursive)
                .finish(),
            CommandKind::Destroy => f.write_str("Destroy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A recorded structural change with the name of whoever issued it.
#[derive(Debug)]
pub struct Command {
    /// The entity the change applies to.
    pub target: EntityId,
    pub kind: CommandKind,
    /// Name of the issuing system (or caller label).
    pub issued_by: String,
    /// Position in the buffer at the time it was recorded.
    pub command_index: u32,
    /// Set by [`CommandBuffer::apply`].
    pub applied_successfully: bool,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of the last [`CommandBuffer::apply`].
///
/// `conflict_count` counts (entity, label) pairs targeted by more than one
/// command. Conflicts are applied in order and only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub conflict_count: usize,
    pub failed_count: usize,
    pub success_count: usize,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// FIFO queue of deferred structural changes.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_index: u32,
    last_apply_report: ApplyReport,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arbitrary command.
    pub fn push(&mut self, target: EntityId, kind: CommandKind, issued_by: &str) {
        let command_index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            target,
            kind,
            issued_by: issued_by.to_owned(),
            command_index,
            applied_successfully: false,
        });
    }

    pub fn add_component<C: AnyComponent>(&mut self, target: EntityId, component: C, issued_by: &str) {
        self.add_boxed_component(target, Box::new(component), issued_by);
    }

    pub fn add_boxed_component(
        &mut self,
        target: EntityId,
        component: Box<dyn AnyComponent>,
        issued_by: &str,
    ) {
        let kind = component.kind();
        self.push(
            target,
            CommandKind::AddComponent {
                kind,
                component: Some(component),
            },
            issued_by,
        );
    }

    pub fn clear_component(
        &mut self,
        target: EntityId,
        kind: impl Into<ComponentKind>,
        issued_by: &str,
    ) {
        self.push(
            target,
            CommandKind::ClearComponent { kind: kind.into() },
            issued_by,
        );
    }

    pub fn attach_child(&mut self, parent: EntityId, child: EntityId, issued_by: &str) {
        self.push(parent, CommandKind::AttachChild { child }, issued_by);
    }

    pub fn detach_child(&mut self, parent: EntityId, child: EntityId, issued_by: &str) {
        self.push(parent, CommandKind::DetachChild { child }, issued_by);
    }

    pub fn add_to_world(&mut self, target: EntityId, recursive: bool, issued_by: &str) {
        self.push(target, CommandKind::AddToWorld { recursive }, issued_by);
    }

    pub fn remove_from_world(&mut self, target: EntityId, recursive: bool, issued_by: &str) {
        self.push(target, CommandKind::RemoveFromWorld { recursive }, issued_by);
    }

    pub fn destroy(&mut self, target: EntityId, issued_by: &str) {
        self.push(target, CommandKind::Destroy, issued_by);
    }

    /// Pending commands in recording order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_apply_report
    }

    /// Drop all pending commands without applying them.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_index = 0;
    }

    /// Apply every pending command in FIFO order and return them.
    ///
    /// A failing command is logged and skipped; later commands still run.
    pub fn apply(&mut self, world: &mut World) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.commands);
        self.next_index = 0;

        let mut seen: HashMap<(EntityId, String), Vec<u32>> = HashMap::new();
        for cmd in &commands {
            seen.entry((cmd.target, cmd.kind.label()))
                .or_default()
                .push(cmd.command_index);
        }
        let mut conflict_count = 0;
        for ((entity, label), indices) in &seen {
            if indices.len() > 1 {
                conflict_count += 1;
                warn!(
                    entity = ?entity,
                    label = %label,
                    command_indices = ?indices,
                    "{} commands target the same entity and slot; applied in order",
                    indices.len()
                );
            }
        }

        let mut success_count = 0;
        let mut failed_count = 0;

        for cmd in &mut commands {
            match Self::apply_one(world, cmd.target, &mut cmd.kind) {
                Ok(()) => {
                    cmd.applied_successfully = true;
                    success_count += 1;
                }
                Err(e) => {
                    failed_count += 1;
                    warn!(
                        command_index = cmd.command_index,
                        target = ?cmd.target,
                        issued_by = %cmd.issued_by,
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }

        self.last_apply_report = ApplyReport {
            conflict_count,
            failed_count,
            success_count,
        };

        commands
    }

    fn apply_one(world: &mut World, target: EntityId, kind: &mut CommandKind) -> Result<(), SceneError> {
        match kind {
            CommandKind::AddComponent { component, .. } => match component.take() {
                Some(component) => world.add_boxed_component(target, component).map(|_| ()),
                None => Ok(()),
            },
            CommandKind::ClearComponent { kind } => {
                world.clear_component(target, kind.as_str()).map(|_| ())
            }
            CommandKind::AttachChild { child } => world.attach_child(target, *child),
            CommandKind::DetachChild { child } => world.detach_child(target, *child),
            CommandKind::AddToWorld { recursive } => world.add_entity(target, *recursive),
            CommandKind::RemoveFromWorld { recursive } => world.remove_entity(target, *recursive),
            CommandKind::Destroy => world.destroy_entity(target).map(|_| ()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
