//! Restart behaviour of the sequence allocator.

use proptest::prelude::*;
use recordb_core::{Config, CoreError, RecordStore};
use recordb_testkit::prelude::*;
use std::collections::HashSet;

#[test]
fn ids_survive_clean_restarts() {
    let harness = CrashHarness::new(Config::default().block_size(5));
    let mut seen = HashSet::new();
    for _ in 0..4 {
        let store = harness.open();
        for _ in 0..7 {
            let id = store.sequence().next_key("order").unwrap().id();
            assert!(seen.insert(id), "id {id} issued twice");
        }
        harness.shutdown(store);
    }
    assert_eq!(seen.len(), 28);
    assert_eq!(seen.iter().max(), Some(&28));
}

#[test]
fn crash_skips_at_most_one_block() {
    let harness = CrashHarness::new(Config::default().block_size(100));
    let store = harness.open();
    let last = (0..30)
        .map(|_| store.sequence().next_key("order").unwrap().id())
        .last()
        .unwrap();
    harness.crash(store);

    let store = harness.open();
    let next = store.sequence().next_key("order").unwrap().id();
    assert!(next > last);
    assert!(next - last <= 100);
    assert_eq!(next, 101);
}

#[test]
fn closed_store_refuses_allocation() {
    let store = TestStore::memory();
    store.sequence().next_key("order").unwrap();
    store.close().unwrap();
    assert!(matches!(
        store.sequence().next_key("order"),
        Err(CoreError::IllegalState { .. })
    ));
}

#[test]
fn directory_store_persists_registry_and_counters() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().block_size(10);
    let type_id = {
        let store = RecordStore::open(dir.path(), config.clone()).unwrap();
        let key = store.sequence().next_key("order").unwrap();
        store.sequence().resolve_key(&key).unwrap().type_id
    };

    let store = RecordStore::open(dir.path(), config).unwrap();
    assert_eq!(store.sequence().get_type_name(type_id).unwrap(), "order");
    assert_eq!(store.sequence().next_key("order").unwrap().id(), 2);
}

#[test]
fn rendered_keys_parse_back() {
    with_temp_store(|store| {
        let key = store.entities().create("user", b"alice").unwrap();
        let text = key.render(store.cipher()).unwrap();
        assert_eq!(recordb_core::Key::parse(store.cipher(), &text).unwrap(), key);
    });
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn no_id_is_reissued(
        block in 1u64..20,
        rounds in prop::collection::vec((0usize..30, any::<bool>()), 1..6),
        name in type_name_strategy(),
    ) {
        let harness = CrashHarness::new(Config::default().block_size(block));
        let mut seen = HashSet::new();
        let mut lost_bound = 0;
        for (count, clean) in rounds {
            let store = harness.open();
            for _ in 0..count {
                let id = store.sequence().next_key(&name).unwrap().id();
                prop_assert!(seen.insert(id));
            }
            if clean {
                harness.shutdown(store);
            } else {
                lost_bound += block;
                harness.crash(store);
            }
        }
        let max = seen.iter().max().copied().unwrap_or(0);
        prop_assert!(max <= seen.len() as u64 + lost_bound);
    }
}
