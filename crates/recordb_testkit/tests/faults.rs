//! Journal behaviour when storage misbehaves.

use recordb_core::{Config, CoreError, RecordStore, SortDirection};
use recordb_storage::StorageProvider;
use recordb_testkit::prelude::*;
use recordb_testkit::scenarios::fill_journal;
use std::sync::Arc;

const COUNTERS: &str = "recordb.sequence.counters";

fn open(provider: &Arc<FaultyProvider>, config: Config) -> RecordStore {
    init_tracing();
    let provider: Arc<dyn StorageProvider> = provider.clone();
    RecordStore::open_with_provider(provider, config).unwrap()
}

#[test]
fn record_id_exhaustion_fails_append_cleanly() {
    let provider = Arc::new(FaultyProvider::new());
    let store = open(&provider, Config::default().block_size(2).partition_capacity(10));
    let journal = store.journal("events", "event").unwrap();
    fill_journal(&journal, 2);
    let partitions = journal.all_partitions(SortDirection::Ascending).unwrap();
    let tables = provider.list().unwrap();

    provider.fail_appends(COUNTERS);
    assert!(matches!(
        journal.append("event", b"x"),
        Err(CoreError::Allocation { .. })
    ));
    assert_eq!(journal.all_partitions(SortDirection::Ascending).unwrap(), partitions);
    assert_eq!(journal.approximate_size().unwrap(), 2);
    assert_eq!(provider.list().unwrap(), tables);

    provider.heal(COUNTERS);
    assert_eq!(journal.append("event", b"y").unwrap().id(), 3);
    assert_eq!(journal.approximate_size().unwrap(), 3);
}

#[test]
fn partition_id_exhaustion_fails_append_cleanly() {
    let provider = Arc::new(FaultyProvider::new());
    let store = open(&provider, Config::default().block_size(4).partition_capacity(2));
    let journal = store.journal("events", "event").unwrap();
    fill_journal(&journal, 2);
    assert!(journal.active_partition().is_none());

    // Use up the rest of the partition id block.
    for _ in 0..3 {
        store.sequence().next_key("events.partition").unwrap();
    }
    let partitions = journal.all_partitions(SortDirection::Ascending).unwrap();
    let tables = provider.list().unwrap();

    provider.fail_appends(COUNTERS);
    assert!(matches!(
        journal.append("event", b"x"),
        Err(CoreError::Allocation { .. })
    ));
    assert_eq!(journal.all_partitions(SortDirection::Ascending).unwrap(), partitions);
    assert_eq!(journal.approximate_size().unwrap(), 2);
    assert!(journal.active_partition().is_none());
    assert_eq!(provider.list().unwrap(), tables);
    provider.heal(COUNTERS);
}

#[test]
fn active_partition_readable_while_close_syncs() {
    let provider = Arc::new(FaultyProvider::new());
    let store = open(&provider, Config::default().partition_capacity(10));
    let journal = store.journal("events", "event").unwrap();
    fill_journal(&journal, 3);

    provider.hold_syncs("recordb.events.p");
    let closer = {
        let journal = Arc::clone(&journal);
        std::thread::spawn(move || journal.close_active_partition())
    };
    provider.wait_for_held_sync();

    let active = journal.active_partition().unwrap();
    assert!(!active.closed);
    assert_eq!(active.size, 3);

    provider.release_syncs();
    assert!(closer.join().unwrap().unwrap());
    assert!(journal.active_partition().is_none());
    assert!(journal.all_partitions(SortDirection::Ascending).unwrap()[0].closed);
}
