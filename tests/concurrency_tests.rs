//! Integration tests for concurrent writers on separate connections.

mod common;

use common::{TestEnv, title_of};
use refman::{Isbn, Mutation, NewReference, Store, StoreServiceExt, Version, is_version_conflict, positions_from_order};
use std::sync::{Arc, Barrier};
use std::thread;

const WRITERS: usize = 6;

fn book(name: String) -> NewReference {
    NewReference::book(title_of(&name), Isbn::new("0-000").unwrap(), "")
}

#[test]
fn test_racing_adds_with_same_version_one_wins() {
    let mut env = TestEnv::new();
    let category = env.add_category("Contended");
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let root = env.root().to_path_buf();
            let barrier = Arc::clone(&barrier);
            let id = category.id;
            thread::spawn(move || {
                let mut store = Store::open(&root).unwrap();
                barrier.wait();
                store.add_reference(id, &book(format!("writer {}", i)), Version::INITIAL)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(is_version_conflict(err), "unexpected error: {:#}", err);
    }

    let stored = env.store.get_category(category.id).unwrap();
    assert_eq!(stored.references.len(), 1);
    assert_eq!(stored.version.get(), 2);
    env.assert_dense(category.id);
}

#[test]
fn test_racing_renames_one_wins() {
    let mut env = TestEnv::new();
    let category = env.add_category("Original");
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let root = env.root().to_path_buf();
            let barrier = Arc::clone(&barrier);
            let id = category.id;
            thread::spawn(move || {
                let mut store = Store::open(&root).unwrap();
                barrier.wait();
                store
                    .update_title(id, &title_of(&format!("rename {}", i)), Version::INITIAL)
                    .ok()
            })
        })
        .collect();

    let winners: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(winners.len(), 1);

    let stored = env.store.get_category(category.id).unwrap();
    assert_eq!(stored.title, winners[0].title);
    assert_eq!(stored.version.get(), 2);
}

#[test]
fn test_retrying_writers_all_land() {
    let mut env = TestEnv::new();
    let category = env.add_category("Busy");
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let root = env.root().to_path_buf();
            let barrier = Arc::clone(&barrier);
            let id = category.id;
            thread::spawn(move || {
                let mut store = Store::open(&root).unwrap();
                barrier.wait();
                store
                    .apply_with_retry(id, WRITERS * 2, |_| Ok(Mutation::Add(book(format!("writer {}", i)))))
                    .map(|(_, attempts)| attempts)
            })
        })
        .collect();

    for handle in handles {
        let attempts = handle.join().unwrap().unwrap();
        assert!(attempts >= 1);
    }

    let stored = env.store.get_category(category.id).unwrap();
    assert_eq!(stored.references.len(), WRITERS);
    assert_eq!(stored.version.get(), 1 + WRITERS as i64);
    env.assert_dense(category.id);
}

#[test]
fn test_reorders_and_removes_keep_positions_dense() {
    let mut env = TestEnv::new();
    let category = env.category_with_books("Shuffled", 8);
    let barrier = Arc::new(Barrier::new(2));

    let reorderer = {
        let root = env.root().to_path_buf();
        let barrier = Arc::clone(&barrier);
        let id = category.id;
        thread::spawn(move || {
            let mut store = Store::open(&root).unwrap();
            barrier.wait();
            for _ in 0..10 {
                store
                    .apply_with_retry(id, 50, |current| {
                        let mut order = current.reference_ids();
                        order.rotate_left(1);
                        Ok(Mutation::Reorder(positions_from_order(&order)))
                    })
                    .unwrap();
            }
        })
    };

    let remover = {
        let root = env.root().to_path_buf();
        let barrier = Arc::clone(&barrier);
        let id = category.id;
        thread::spawn(move || {
            let mut store = Store::open(&root).unwrap();
            barrier.wait();
            for _ in 0..4 {
                store
                    .apply_with_retry(id, 50, |current| Ok(Mutation::Remove(current.references[0].id)))
                    .unwrap();
            }
        })
    };

    reorderer.join().unwrap();
    remover.join().unwrap();

    let stored = env.store.get_category(category.id).unwrap();
    assert_eq!(stored.references.len(), 4);
    assert_eq!(stored.version.get(), category.version.get() + 14);
    env.assert_dense(category.id);
    assert!(env.store.verify().unwrap().is_clean());
}
