//! Property tests for the deferred command buffer.
//!
//! The same random stream of structural operations is applied to one world
//! directly and to a twin world through a [`CommandBuffer`]. Both worlds must
//! end up with the same hierarchy, liveness and component kinds, and the
//! apply report must count exactly the operations that failed directly.

use arbor_scene::prelude::*;
use proptest::prelude::*;

const N: usize = 6;
const KINDS: [&str; 2] = ["Tag", "Stack"];

#[derive(Debug, Clone)]
enum Op {
    Add(usize, usize),
    Clear(usize, usize),
    Attach(usize, usize),
    Detach(usize, usize),
    AddToWorld(usize, bool),
    RemoveFromWorld(usize, bool),
    Destroy(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..N, 0..2usize).prop_map(|(e, k)| Op::Add(e, k)),
        1 => (0..N, 0..2usize).prop_map(|(e, k)| Op::Clear(e, k)),
        3 => (0..N, 0..N).prop_map(|(p, c)| Op::Attach(p, c)),
        1 => (0..N, 0..N).prop_map(|(p, c)| Op::Detach(p, c)),
        2 => (0..N, any::<bool>()).prop_map(|(e, r)| Op::AddToWorld(e, r)),
        1 => (0..N, any::<bool>()).prop_map(|(e, r)| Op::RemoveFromWorld(e, r)),
        1 => (0..N).prop_map(Op::Destroy),
    ]
}

fn component(k: usize) -> DynamicComponent {
    let c = DynamicComponent::new(KINDS[k]);
    if k == 1 {
        c.multiple()
    } else {
        c
    }
}

fn apply_direct(world: &mut World, ids: &[EntityId], op: &Op) -> bool {
    let result = match *op {
        Op::Add(e, k) => world.add_component(ids[e], component(k)).map(|_| ()),
        Op::Clear(e, k) => world.clear_component(ids[e], KINDS[k]).map(|_| ()),
        Op::Attach(p, c) => world.attach_child(ids[p], ids[c]),
        Op::Detach(p, c) => world.detach_child(ids[p], ids[c]),
        Op::AddToWorld(e, r) => world.add_entity(ids[e], r),
        Op::RemoveFromWorld(e, r) => world.remove_entity(ids[e], r),
        Op::Destroy(e) => world.destroy_entity(ids[e]).map(|_| ()),
    };
    result.is_ok()
}

fn record(buffer: &mut CommandBuffer, ids: &[EntityId], op: &Op) {
    const BY: &str = "proptest";
    match *op {
        Op::Add(e, k) => buffer.add_component(ids[e], component(k), BY),
        Op::Clear(e, k) => buffer.clear_component(ids[e], KINDS[k], BY),
        Op::Attach(p, c) => buffer.attach_child(ids[p], ids[c], BY),
        Op::Detach(p, c) => buffer.detach_child(ids[p], ids[c], BY),
        Op::AddToWorld(e, r) => buffer.add_to_world(ids[e], r, BY),
        Op::RemoveFromWorld(e, r) => buffer.remove_from_world(ids[e], r, BY),
        Op::Destroy(e) => buffer.destroy(ids[e], BY),
    }
}

/// Per-slot view of a world with ids replaced by slot indices.
#[derive(Debug, PartialEq)]
struct Shape {
    exists: bool,
    live: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    kinds: Vec<String>,
}

fn shape(world: &World, ids: &[EntityId]) -> Vec<Shape> {
    let slot = |id: EntityId| ids.iter().position(|x| *x == id);
    ids.iter()
        .map(|&id| match world.entity(id) {
            Some(e) => Shape {
                exists: true,
                live: world.is_live(id),
                parent: e.parent().and_then(slot),
                children: e.children().iter().filter_map(|c| slot(*c)).collect(),
                kinds: e.components().kinds().map(|k| k.as_str().to_owned()).collect(),
            },
            None => Shape {
                exists: false,
                live: false,
                parent: None,
                children: Vec::new(),
                kinds: Vec::new(),
            },
        })
        .collect()
}

fn populate(world: &mut World) -> Vec<EntityId> {
    (0..N).map(|i| world.create_entity(Some(format!("e{i}").as_str()))).collect()
}

proptest! {
    #[test]
    fn buffered_application_matches_direct(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut direct = World::new();
        let direct_ids = populate(&mut direct);
        let mut deferred = World::new();
        let deferred_ids = populate(&mut deferred);

        let mut buffer = CommandBuffer::new();
        let mut failures = 0;
        for op in &ops {
            if !apply_direct(&mut direct, &direct_ids, op) {
                failures += 1;
            }
            record(&mut buffer, &deferred_ids, op);
        }
        prop_assert_eq!(buffer.len(), ops.len());

        let applied = buffer.apply(&mut deferred);
        prop_assert_eq!(applied.len(), ops.len());
        prop_assert!(buffer.is_empty());

        let report = buffer.last_apply_report();
        prop_assert_eq!(report.failed_count, failures);
        prop_assert_eq!(report.success_count, ops.len() - failures);

        let indices: Vec<u32> = applied.iter().map(|c| c.command_index).collect();
        prop_assert_eq!(indices, (0..ops.len() as u32).collect::<Vec<_>>());

        prop_assert_eq!(shape(&direct, &direct_ids), shape(&deferred, &deferred_ids));
    }
}
