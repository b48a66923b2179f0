//! S3 / property 6 — recording a failed outcome on a memory boosts its
//! fused retrieval score by at least 1.4x, holding the query and index
//! otherwise constant.

#[path = "support/mod.rs"]
mod support;

use daemon_core::RetrieveParams;
use support::{draft, open_engine};

#[test]
fn worked_false_outcome_boosts_recall_score() {
    let (engine, _dir) = open_engine();
    let m1 = engine.remember(draft("decision", "Cache session tokens in Redis")).unwrap();

    let params = || RetrieveParams {
        topic: "session caching".to_string(),
        auto_zoom: true,
        ..Default::default()
    };

    let (before, _) = engine.recall(params()).unwrap();
    let baseline = before.iter().find(|r| r.memory.id == m1).map(|r| r.fused_score).expect("m1 should be recalled");

    engine.record_outcome(m1, false, Some("regressed under load".to_string())).unwrap();

    let (after, _) = engine.recall(params()).unwrap();
    let boosted = after.iter().find(|r| r.memory.id == m1).expect("m1 should still be recalled");

    assert!(boosted.fused_score >= baseline * 1.4, "boosted {} should be >= 1.4x baseline {}", boosted.fused_score, baseline);
    assert!(boosted.boosts_applied.iter().any(|b| b.starts_with("worked=false")));
    assert_eq!(after[0].memory.id, m1, "the failed decision should rank first");
}
