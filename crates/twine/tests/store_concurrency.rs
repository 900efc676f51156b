use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use glam::Vec2;
use proptest::prelude::*;
use twine::{Entity, EntityStore};

#[derive(Debug, Clone)]
enum Op {
    Insert(u32),
    Move(u32, f32),
    Remove(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..40).prop_map(Op::Insert),
        (1u32..40, -100.0f32..100.0).prop_map(|(id, x)| Op::Move(id, x)),
        (1u32..40).prop_map(Op::Remove),
    ]
}

fn apply(store: &EntityStore, op: &Op) {
    match *op {
        Op::Insert(id) => {
            store.insert(Entity::player(id, Vec2::ZERO));
        }
        Op::Move(id, x) => {
            store.update_position(&twine::player_name(id), Vec2::new(x, x));
        }
        Op::Remove(id) => {
            if let Some(entity) = store.find_by_name(&twine::player_name(id)) {
                store.remove_by_identity(&entity);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Readers never observe a torn collection while writers race them.
    #[test]
    fn prop_snapshots_stay_consistent(
        writers in prop::collection::vec(prop::collection::vec(op_strategy(), 1..60), 1..4),
        readers in 1usize..4,
    ) {
        let store = EntityStore::new();
        let done = Arc::new(AtomicBool::new(false));

        let reader_handles: Vec<_> = (0..readers)
            .map(|_| {
                let store = store.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut violations = 0;
                    while !done.load(Ordering::SeqCst) {
                        let snapshot = store.snapshot();
                        let names: HashSet<&str> =
                            snapshot.iter().map(|e| e.name.as_str()).collect();
                        if names.len() != snapshot.len() {
                            violations += 1;
                        }
                        if snapshot.iter().any(|e| e.owner == 0 || !e.active) {
                            violations += 1;
                        }
                    }
                    violations
                })
            })
            .collect();

        let writer_handles: Vec<_> = writers
            .clone()
            .into_iter()
            .map(|ops| {
                let store = store.clone();
                thread::spawn(move || {
                    for op in &ops {
                        apply(&store, op);
                    }
                })
            })
            .collect();

        for handle in writer_handles {
            handle.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        for handle in reader_handles {
            prop_assert_eq!(handle.join().unwrap(), 0);
        }

        let inserted: HashSet<String> = writers
            .iter()
            .flatten()
            .filter_map(|op| match op {
                Op::Insert(id) => Some(twine::player_name(*id)),
                _ => None,
            })
            .collect();
        let snapshot = store.snapshot();
        let names: HashSet<&str> = snapshot.iter().map(|e| e.name.as_str()).collect();
        prop_assert_eq!(names.len(), snapshot.len());
        for entity in &snapshot {
            prop_assert!(inserted.contains(&entity.name));
            let found = store.find_by_name(&entity.name);
            prop_assert_eq!(found.as_ref(), Some(entity));
        }
    }
}
