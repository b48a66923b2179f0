//! S5 / properties 1 and 2 — a backfilled `happened_at` only makes a memory
//! visible to `at_time` from that point on, and the version history of an
//! edited memory replays in `transaction_time` order.

#[path = "support/mod.rs"]
mod support;

use chrono::Duration;
use daemon_core::Store;
use support::{draft, open_engine};
use tempfile::TempDir;

#[test]
fn at_time_respects_backfilled_valid_time() {
    let (engine, _dir) = open_engine();
    let t0 = chrono::Utc::now() - Duration::days(7);

    let mut d = draft("fact", "Migrated auth to JWT");
    d.happened_at = Some(t0);
    let id = engine.remember(d).unwrap();

    let memory = engine.get_memory(id).unwrap();
    assert!(memory.valid_time <= memory.transaction_time + Duration::seconds(1));
    assert_eq!(memory.valid_time, t0);

    assert!(engine.at_time(id, t0 - Duration::seconds(1)).unwrap().is_none());
    let at_t0 = engine.at_time(id, t0).unwrap();
    assert_eq!(at_t0.unwrap().id, id);
}

#[test]
fn version_history_replays_in_transaction_time_order() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let id = store.put_memory(draft("decision", "v1 content")).unwrap();
    store.update_content(id, Some("v2 content".to_string()), None, None, None).unwrap();
    store.update_content(id, Some("v3 content".to_string()), None, None, None).unwrap();

    let versions = store.versions(id).unwrap();
    assert_eq!(versions.len(), 2, "one snapshot per prior edit");
    assert!(versions[0].transaction_time <= versions[1].transaction_time);
    assert_eq!(versions[0].content, "v1 content");
    assert_eq!(versions[1].content, "v2 content");

    let current = store.get_memory(id).unwrap().unwrap();
    assert_eq!(current.content, "v3 content");

    let at_v1 = store.at_time(id, versions[0].transaction_time).unwrap().unwrap();
    assert_eq!(at_v1.content, "v1 content");
}
