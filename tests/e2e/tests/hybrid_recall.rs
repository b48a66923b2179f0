//! S2 — hybrid recall surfaces lexical matches ahead of an unrelated memory
//! and is idempotent across repeated calls against the same index state.

#[path = "support/mod.rs"]
mod support;

use daemon_core::RetrieveParams;
use support::{draft, open_engine};

#[test]
fn auth_related_memories_outrank_an_unrelated_one() {
    let (engine, _dir) = open_engine();

    let m1 = engine.remember(draft("decision", "Use JWT for auth")).unwrap();
    let m2 = engine.remember(draft("decision", "PostgreSQL for sessions")).unwrap();
    let m3 = engine.remember(draft("warning", "Rate limit auth endpoints")).unwrap();

    let params = RetrieveParams {
        topic: "auth security".to_string(),
        auto_zoom: true,
        ..Default::default()
    };
    let (results, _) = engine.recall(params).unwrap();
    let ids: Vec<i64> = results.iter().map(|r| r.memory.id).collect();

    assert!(ids.contains(&m1) && ids.contains(&m3), "both auth memories should surface: {ids:?}");
    let m2_rank = ids.iter().position(|&id| id == m2);
    let m1_rank = ids.iter().position(|&id| id == m1).unwrap();
    let m3_rank = ids.iter().position(|&id| id == m3).unwrap();
    if let Some(m2_rank) = m2_rank {
        assert!(m1_rank < m2_rank || m3_rank < m2_rank, "an auth memory should outrank the unrelated one");
    }
}

#[test]
fn repeated_recall_is_idempotent() {
    let (engine, _dir) = open_engine();
    engine.remember(draft("decision", "Use JWT for auth")).unwrap();
    engine.remember(draft("warning", "Rate limit auth endpoints")).unwrap();

    let params = RetrieveParams {
        topic: "auth security".to_string(),
        auto_zoom: true,
        ..Default::default()
    };
    let (first, _) = engine.recall(params.clone()).unwrap();
    let (second, _) = engine.recall(params).unwrap();

    let first_ids: Vec<i64> = first.iter().map(|r| r.memory.id).collect();
    let second_ids: Vec<i64> = second.iter().map(|r| r.memory.id).collect();
    assert_eq!(first_ids, second_ids);
}
