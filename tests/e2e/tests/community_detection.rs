//! S6 / property 9 — two densely `related_to`-linked clusters resolve into
//! distinct communities, and every non-archived memory ends up in exactly
//! one community at level 0.

#[path = "support/mod.rs"]
mod support;

use std::collections::HashSet;

use daemon_core::Relationship;
use support::{draft, open_engine};

#[test]
fn two_clusters_resolve_into_separate_communities() {
    let (engine, _dir) = open_engine();

    let auth_ids: Vec<i64> = (0..5)
        .map(|i| engine.remember(draft("learning", &format!("Auth note {i}: JWT, sessions, login"))).unwrap())
        .collect();
    let storage_ids: Vec<i64> = (0..5)
        .map(|i| engine.remember(draft("learning", &format!("Storage note {i}: S3, buckets, blobs"))).unwrap())
        .collect();

    for w in auth_ids.windows(2) {
        engine.link(w[0], w[1], Relationship::RelatedTo).unwrap();
    }
    for w in storage_ids.windows(2) {
        engine.link(w[0], w[1], Relationship::RelatedTo).unwrap();
    }

    engine.rebuild_communities(3, 1.0).unwrap();
    let at_level0 = engine.communities(0).unwrap();
    assert!(at_level0.len() >= 2, "expected at least two level-0 communities, got {}", at_level0.len());

    let mut covered: HashSet<i64> = HashSet::new();
    for c in &at_level0 {
        for &m in &c.members {
            assert!(covered.insert(m), "memory {m} appears in more than one level-0 community");
        }
    }
    for id in auth_ids.iter().chain(storage_ids.iter()) {
        assert!(covered.contains(id), "memory {id} missing from any community");
    }
}
