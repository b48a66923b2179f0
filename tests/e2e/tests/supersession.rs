//! S4 / properties 4 and 7 — supersession hides the superseded memory from
//! default recall, a supersedes cycle is rejected, and the per-file
//! diversity cap holds.

#[path = "support/mod.rs"]
mod support;

use daemon_core::{MemoryFilter, Relationship, RetrieveParams};
use support::{draft, open_engine};

#[test]
fn superseded_memory_is_hidden_unless_archived_is_included() {
    let (engine, _dir) = open_engine();
    let old = engine.remember(draft("decision", "Use sessions for auth state")).unwrap();
    let new = engine.remember(draft("decision", "Use JWT for auth state")).unwrap();

    engine.link(new, old, Relationship::Supersedes).unwrap();

    let hidden = engine.get_memory(old).unwrap();
    assert_eq!(hidden.superseded_by, Some(new));

    let (results, _) = engine
        .recall(RetrieveParams {
            topic: "auth state".to_string(),
            auto_zoom: true,
            ..Default::default()
        })
        .unwrap();
    let ids: Vec<i64> = results.iter().map(|r| r.memory.id).collect();
    assert!(ids.contains(&new));
    assert!(!ids.contains(&old), "superseded memory should be excluded by default: {ids:?}");

    let (with_archived, _) = engine
        .recall(RetrieveParams {
            topic: "auth state".to_string(),
            auto_zoom: true,
            filters: MemoryFilter { include_archived: true, ..Default::default() },
            ..Default::default()
        })
        .unwrap();
    let ids_with_archived: Vec<i64> = with_archived.iter().map(|r| r.memory.id).collect();
    assert!(ids_with_archived.contains(&old), "include_archived should surface the superseded memory too");
}

#[test]
fn supersedes_cycle_is_rejected() {
    let (engine, _dir) = open_engine();
    let a = engine.remember(draft("decision", "a")).unwrap();
    let b = engine.remember(draft("decision", "b")).unwrap();

    engine.link(a, b, Relationship::Supersedes).unwrap();
    let result = engine.link(b, a, Relationship::Supersedes);
    assert!(result.is_err());
}

#[test]
fn diversity_filter_caps_results_sharing_a_file() {
    let (engine, _dir) = open_engine();
    for i in 0..5 {
        let mut d = draft("learning", &format!("Observation {i} about the auth module"));
        d.file_path = Some("src/auth.rs".to_string());
        engine.remember(d).unwrap();
    }

    let (results, _) = engine
        .recall(RetrieveParams {
            topic: "auth module observation".to_string(),
            auto_zoom: true,
            limit: Some(20),
            ..Default::default()
        })
        .unwrap();

    let from_auth_file = results.iter().filter(|r| r.memory.file_path.as_deref() == Some("src/auth.rs")).count();
    assert!(from_auth_file <= engine.config().diversity_cap, "got {from_auth_file} results sharing one file");
}
